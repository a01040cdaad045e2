//! Payout reports derived from a pool snapshot.

use anyhow::Result;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use clap::ValueEnum;
use cocoon_pool_settlement::{
    ClaimProof, EpochId, EpochStatus, ParticipantId, PoolState, Timestamp,
    distribution::{Hash, correlation_id},
    format_amount,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    fs::{File, create_dir_all},
    io::Write,
    path::Path,
};
use tabled::Tabled;
use tracing::info;

/// Unified output format for exported reports
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[value(name = "csv")]
    Csv,
    #[value(name = "json")]
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

/// Trait for types that can be exported to various formats
pub trait Exportable {
    fn export(&self, format: OutputFormat) -> Result<String>;
}

/// One paid distribution record
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PayoutRecord {
    #[tabled(rename = "Paid at")]
    pub paid_at: String,
    #[serde(skip)]
    #[tabled(skip)]
    pub paid_at_unix: Timestamp,
    #[tabled(rename = "Epoch")]
    pub epoch: EpochId,
    #[tabled(rename = "Participant")]
    pub participant: ParticipantId,
    #[tabled(rename = "Amount")]
    pub amount: String,
    #[tabled(skip)]
    pub amount_base_units: u64,
    #[tabled(rename = "Modifier")]
    pub modifier: String,
    #[tabled(rename = "Paid via")]
    pub paid_via: String,
    #[tabled(rename = "Correlation id")]
    pub correlation_id: String,
}

/// Which paid records a report covers. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutFilter {
    pub epoch: Option<EpochId>,
    pub participant: Option<ParticipantId>,
    /// Calendar year (UTC) of the payout
    pub year: Option<i32>,
}

impl PayoutFilter {
    fn matches_year(&self, paid_at: Timestamp) -> bool {
        self.year
            .is_none_or(|year| utc(paid_at).is_some_and(|date| date.year() == year))
    }
}

fn utc(timestamp: Timestamp) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayoutReport {
    pub records: Vec<PayoutRecord>,
}

impl PayoutReport {
    /// Paid records across all epochs matching `filter`, oldest payout first.
    pub fn from_state(state: &PoolState, filter: &PayoutFilter) -> Self {
        let mut records: Vec<PayoutRecord> = state
            .distribution
            .epochs()
            .filter(|e| filter.epoch.is_none_or(|id| e.id == id))
            .flat_map(|e| {
                e.distributions
                    .iter()
                    .filter(move |(id, record)| {
                        record.paid && filter.participant.as_ref().is_none_or(|p| p == *id)
                    })
                    .map(move |(id, record)| {
                        let paid_at = record.paid_at.unwrap_or_default();
                        PayoutRecord {
                            paid_at: utc(paid_at)
                                .map(|date| date.to_rfc3339_opts(SecondsFormat::Secs, true))
                                .unwrap_or_default(),
                            paid_at_unix: paid_at,
                            epoch: e.id,
                            participant: id.clone(),
                            amount: format_amount(record.amount),
                            amount_base_units: record.amount,
                            modifier: record.modifier.to_string(),
                            paid_via: record
                                .paid_via
                                .map(|channel| channel.to_string())
                                .unwrap_or_default(),
                            correlation_id: correlation_id(e.id, id),
                        }
                    })
            })
            .filter(|record| filter.matches_year(record.paid_at_unix))
            .collect();
        records.sort_by_key(|record| record.paid_at_unix);
        Self { records }
    }

    pub fn total(&self) -> u64 {
        self.records
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.amount_base_units))
    }
}

impl Exportable for PayoutReport {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => to_csv_string(&self.records),
            OutputFormat::Json => to_json_string(&self.records, false),
            OutputFormat::JsonPretty => to_json_string(&self.records, true),
        }
    }
}

/// Lifetime payout totals for one participant
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct ParticipantSummary {
    #[tabled(rename = "Participant")]
    pub participant: ParticipantId,
    #[tabled(rename = "Payouts")]
    pub payouts: u32,
    #[tabled(rename = "Total")]
    pub total: String,
    #[tabled(skip)]
    pub total_base_units: u64,
    #[tabled(rename = "First epoch")]
    pub first_epoch: EpochId,
    #[tabled(rename = "Last epoch")]
    pub last_epoch: EpochId,
}

pub fn summarize(report: &PayoutReport) -> Vec<ParticipantSummary> {
    let mut by_participant: BTreeMap<&ParticipantId, ParticipantSummary> = BTreeMap::new();
    for record in &report.records {
        let summary = by_participant
            .entry(&record.participant)
            .or_insert_with(|| ParticipantSummary {
                participant: record.participant.clone(),
                payouts: 0,
                total: String::new(),
                total_base_units: 0,
                first_epoch: record.epoch,
                last_epoch: record.epoch,
            });
        summary.payouts += 1;
        summary.total_base_units = summary
            .total_base_units
            .saturating_add(record.amount_base_units);
        summary.first_epoch = summary.first_epoch.min(record.epoch);
        summary.last_epoch = summary.last_epoch.max(record.epoch);
    }
    by_participant
        .into_values()
        .map(|mut summary| {
            summary.total = format_amount(summary.total_base_units);
            summary
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryReport {
    pub participants: Vec<ParticipantSummary>,
}

impl Exportable for SummaryReport {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => to_csv_string(&self.participants),
            OutputFormat::Json => to_json_string(&self.participants, false),
            OutputFormat::JsonPretty => to_json_string(&self.participants, true),
        }
    }
}

/// Per-epoch settlement overview
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct EpochRow {
    #[tabled(rename = "Epoch")]
    pub epoch: EpochId,
    #[tabled(rename = "Status")]
    pub status: EpochStatus,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Fee")]
    pub operator_fee: String,
    #[tabled(rename = "Pool")]
    pub participant_pool: String,
    #[tabled(rename = "Paid")]
    pub paid: String,
    #[tabled(rename = "Participants")]
    pub participants: String,
}

pub fn epoch_rows(state: &PoolState) -> Vec<EpochRow> {
    state
        .distribution
        .epochs()
        .map(|e| EpochRow {
            epoch: e.id,
            status: e.status,
            revenue: format_amount(e.total_revenue),
            operator_fee: format_amount(e.operator_fee),
            participant_pool: format_amount(e.participant_pool),
            paid: format_amount(e.amount_paid),
            participants: format!("{}/{}", e.participants_paid, e.total_participants),
        })
        .collect()
}

/// A participant's claim proof together with the root it verifies against. Written by the
/// `proof` command and read back by `claim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub epoch: EpochId,
    pub participant: ParticipantId,
    pub merkle_root: Option<Hash>,
    pub claim: ClaimProof,
}

impl ProofBundle {
    /// True when the proof verifies against the bundled root.
    pub fn verifies(&self) -> bool {
        self.merkle_root
            .is_some_and(|root| self.claim.verify(&root, self.epoch, &self.participant))
    }
}

/// Options for exporting data
pub struct ExportOptions {
    pub format: OutputFormat,
    pub output_dir: Option<String>,
    pub output_file: Option<String>,
}

impl ExportOptions {
    /// Write exportable data to file or stdout
    pub fn write<T: Exportable>(&self, data: &T, default_filename: &str) -> Result<()> {
        let content = data.export(self.format)?;

        if let Some(ref file_path) = self.output_file {
            let path = Path::new(file_path);
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let mut file = File::create(path)?;
            file.write_all(content.as_bytes())?;
            info!("Exported to: {}", path.display());
        } else if let Some(ref dir) = self.output_dir {
            let dir_path = Path::new(dir);
            create_dir_all(dir_path)?;

            let extension = match self.format {
                OutputFormat::Csv => "csv",
                OutputFormat::Json | OutputFormat::JsonPretty => "json",
            };

            let file_path = dir_path.join(format!("{default_filename}.{extension}"));
            let mut file = File::create(&file_path)?;
            file.write_all(content.as_bytes())?;
            info!("Exported to: {}", file_path.display());
        } else {
            println!("{content}");
        }

        Ok(())
    }
}

pub fn to_csv_string<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let data = wtr.into_inner()?;
    Ok(String::from_utf8(data)?)
}

pub fn to_json_string<T: Serialize>(data: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(data)?)
    } else {
        Ok(serde_json::to_string(data)?)
    }
}
