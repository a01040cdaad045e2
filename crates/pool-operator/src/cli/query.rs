use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use cocoon_pool_operator::{
    export::{
        ExportOptions, OutputFormat, PayoutFilter, PayoutReport, SummaryReport, epoch_rows,
        summarize, to_json_string,
    },
    session::Session,
    settings::Settings,
};
use cocoon_pool_settlement::{
    EpochId, Participant, ParticipantId, ParticipantStatus, PoolState, format_amount,
};
use tabled::{Table, Tabled, settings::Style};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportKind {
    /// Every paid distribution record
    #[value(name = "payouts")]
    Payouts,
    /// Payout totals per participant
    #[value(name = "summary")]
    Summary,
}

/// Read-only inspection and reporting
#[derive(Subcommand, Debug)]
pub enum QueryCommands {
    /// Show the pool, its participants and the epoch history
    Status,
    /// Show one epoch in full (the open epoch when no id is given)
    Epoch {
        #[arg(short, long, value_name = "EPOCH")]
        epoch: Option<EpochId>,
    },
    /// Show one participant's ledger entry
    Participant {
        #[arg(short, long, value_name = "ID")]
        participant: String,
    },
    #[command(
        about = "Export payout reports",
        after_help = r#"Examples:
    # All paid records as CSV on stdout
    export --report payouts

    # Per-participant totals for one participant as pretty JSON
    export --report summary --participant EQBalice --format json-pretty

    # Write epoch 12's payouts to a file
    export --report payouts --epoch 12 --output-file reports/epoch-12.csv

    # One participant's payouts for a calendar year, oldest first
    export --report payouts --participant EQBalice --year 2025"#
    )]
    Export {
        #[arg(short, long, value_enum, default_value = "payouts")]
        report: ReportKind,

        /// Limit to one epoch
        #[arg(short, long, value_name = "EPOCH")]
        epoch: Option<EpochId>,

        /// Limit to one participant
        #[arg(short, long, value_name = "ID")]
        participant: Option<String>,

        /// Limit to payouts made in this calendar year (UTC)
        #[arg(short, long, value_name = "YEAR")]
        year: Option<i32>,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Write to this file instead of stdout
        #[arg(long, value_name = "FILE")]
        output_file: Option<String>,

        /// Write to this directory with a default file name
        #[arg(long, value_name = "DIR")]
        output_dir: Option<String>,
    },
}

#[derive(Debug, Tabled)]
struct ParticipantRow {
    #[tabled(rename = "Participant")]
    id: ParticipantId,
    #[tabled(rename = "Status")]
    status: ParticipantStatus,
    #[tabled(rename = "Stake")]
    stake: String,
    #[tabled(rename = "Reputation")]
    reputation: u16,
    #[tabled(rename = "Uptime bps")]
    uptime_bps: u16,
    #[tabled(rename = "Outages")]
    outages: u32,
    #[tabled(rename = "Rewards paid")]
    rewards_paid: String,
    #[tabled(rename = "Pending withdrawal")]
    pending: String,
}

impl From<&Participant> for ParticipantRow {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            status: p.status,
            stake: format_amount(p.stake),
            reputation: p.reputation,
            uptime_bps: p.uptime_bps,
            outages: p.outage_count,
            rewards_paid: format_amount(p.rewards_paid),
            pending: p
                .pending_withdrawal
                .map(|w| format_amount(w.amount))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn render_status(state: &PoolState) -> String {
    let pool = &state.pool;
    let mut out = String::new();
    out.push_str(&format!(
        "Pool: operator={} status={} commission_bps={} operator_stake={} earnings={} slashed={}\n",
        pool.operator,
        pool.status,
        pool.commission_bps,
        format_amount(pool.operator_stake),
        format_amount(pool.operator_earnings),
        format_amount(pool.slashed_total),
    ));
    out.push_str(&format!(
        "Participants: {} total_stake={}\n\n",
        state.ledger.len(),
        format_amount(state.ledger.total_stake())
    ));

    let rows: Vec<ParticipantRow> = state.ledger.iter().map(ParticipantRow::from).collect();
    if !rows.is_empty() {
        out.push_str(
            &Table::new(rows)
                .with(Style::psql().remove_horizontals())
                .to_string(),
        );
        out.push_str("\n\n");
    }

    let epochs = epoch_rows(state);
    if !epochs.is_empty() {
        out.push_str(
            &Table::new(epochs)
                .with(Style::psql().remove_horizontals())
                .to_string(),
        );
    }
    out
}

pub async fn handle(settings: &Settings, cmd: QueryCommands) -> Result<()> {
    let session = Session::open(settings)?;
    let state = session.engine().snapshot();

    match cmd {
        QueryCommands::Status => {
            println!("{}", render_status(&state));
        }
        QueryCommands::Epoch { epoch } => {
            let epoch = match epoch {
                Some(id) => session.engine().epoch(id)?,
                None => session.engine().current_epoch()?,
            };
            println!("{}", to_json_string(&epoch, true)?);
        }
        QueryCommands::Participant { participant } => {
            let participant = session
                .engine()
                .participant(&ParticipantId::from(participant))?;
            println!("{}", to_json_string(&participant, true)?);
        }
        QueryCommands::Export {
            report,
            epoch,
            participant,
            year,
            format,
            output_file,
            output_dir,
        } => {
            let filter = PayoutFilter {
                epoch,
                participant: participant.map(ParticipantId::from),
                year,
            };
            let payouts = PayoutReport::from_state(&state, &filter);
            let options = ExportOptions {
                format,
                output_dir,
                output_file,
            };
            match report {
                ReportKind::Payouts => options.write(&payouts, "payouts")?,
                ReportKind::Summary => options.write(
                    &SummaryReport {
                        participants: summarize(&payouts),
                    },
                    "payout-summary",
                )?,
            }
        }
    }
    Ok(())
}
