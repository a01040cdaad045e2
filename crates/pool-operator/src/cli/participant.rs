use super::{CallArgs, execute};
use anyhow::Result;
use clap::Subcommand;
use cocoon_pool_operator::{session::parse_amount, settings::Settings};
use cocoon_pool_settlement::{ContributionDelta, ParticipantId, format_amount};
use serde_json::json;

/// Participant ledger and staking commands
#[derive(Subcommand, Debug)]
pub enum ParticipantCommands {
    #[command(
        about = "Register a participant with an initial stake",
        after_help = r#"Examples:
    # Self-registration
    register --participant EQBalice --stake 15 --caller EQBalice

    # Operator registering on behalf of a participant
    register --participant EQBalice --stake 15"#
    )]
    Register {
        #[arg(short, long, value_name = "ID")]
        participant: String,

        /// Initial stake in units
        #[arg(short, long, value_name = "UNITS")]
        stake: String,
    },
    #[command(
        about = "Record measured work for the open epoch (operator only)",
        after_help = r#"Examples:
    report --participant EQBalice --work-units 1200 --uptime-seconds 3600 --tasks 14 --quality 950"#
    )]
    Report {
        #[arg(short, long, value_name = "ID")]
        participant: String,

        #[arg(long, default_value_t = 0)]
        tasks: u64,

        #[arg(long, default_value_t = 0)]
        work_units: u64,

        #[arg(long, default_value_t = 0)]
        uptime_seconds: u64,

        /// Quality score for this report, 0..=1000
        #[arg(long, default_value_t = 0)]
        quality: u16,
    },
    /// Refresh a participant's last heartbeat (operator only)
    Heartbeat {
        #[arg(short, long, value_name = "ID")]
        participant: String,
    },
    /// Record an outage for a participant in the open epoch (operator only)
    Outage {
        #[arg(short, long, value_name = "ID")]
        participant: String,
    },
    #[command(
        about = "Add stake; the caller deposits for itself",
        after_help = r#"Examples:
    deposit --amount 5 --caller EQBalice"#
    )]
    Deposit {
        #[arg(short, long, value_name = "UNITS")]
        amount: String,
    },
    /// Start the withdrawal timelock for part or all of the caller's stake
    RequestWithdrawal {
        #[arg(short, long, value_name = "UNITS")]
        amount: String,
    },
    /// Complete the caller's pending withdrawal once the timelock has passed
    CompleteWithdrawal,
    #[command(
        about = "Slash a participant's stake (operator only)",
        after_help = r#"Examples:
    # Slash the configured fraction of stake
    slash --participant EQBalice --reason "missed heartbeats"

    # Slash an explicit amount
    slash --participant EQBalice --amount 2.5 --reason "invalid results""#
    )]
    Slash {
        #[arg(short, long, value_name = "ID")]
        participant: String,

        /// Amount in units; defaults to the configured slash fraction of stake
        #[arg(short, long, value_name = "UNITS")]
        amount: Option<String>,

        #[arg(short, long)]
        reason: String,
    },
    /// Set a participant's reputation, 0..=1000 (operator only)
    Reputation {
        #[arg(short, long, value_name = "ID")]
        participant: String,

        #[arg(short, long)]
        score: u16,
    },
}

pub async fn handle(settings: &Settings, call: &CallArgs, cmd: ParticipantCommands) -> Result<()> {
    match cmd {
        ParticipantCommands::Register { participant, stake } => {
            let stake = parse_amount(&stake)?;
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, ctx| {
                session.engine().register(ctx, &participant, stake)?;
                session.engine().participant(&participant)
            })
        }
        ParticipantCommands::Report {
            participant,
            tasks,
            work_units,
            uptime_seconds,
            quality,
        } => {
            let delta = ContributionDelta {
                tasks,
                work_units,
                uptime_seconds,
                quality,
            };
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, ctx| {
                let uptime_bps = session
                    .engine()
                    .update_contribution(ctx, &participant, delta)?;
                Ok(json!({ "participant": participant, "epoch_uptime_bps": uptime_bps }))
            })
        }
        ParticipantCommands::Heartbeat { participant } => {
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, ctx| {
                session.engine().heartbeat(ctx, &participant)?;
                Ok(json!({ "participant": participant, "last_heartbeat": ctx.now }))
            })
        }
        ParticipantCommands::Outage { participant } => {
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, ctx| {
                let outages = session.engine().record_outage(ctx, &participant)?;
                Ok(json!({ "participant": participant, "epoch_outages": outages }))
            })
        }
        ParticipantCommands::Deposit { amount } => {
            let amount = parse_amount(&amount)?;
            execute(settings, call, |session, ctx| {
                let stake = session.engine().deposit_stake(ctx, amount)?;
                Ok(json!({ "participant": ctx.caller, "stake": format_amount(stake) }))
            })
        }
        ParticipantCommands::RequestWithdrawal { amount } => {
            let amount = parse_amount(&amount)?;
            execute(settings, call, |session, ctx| {
                let unlocks_at = session.engine().request_withdrawal(ctx, amount)?;
                Ok(json!({
                    "participant": ctx.caller,
                    "amount": format_amount(amount),
                    "unlocks_at": unlocks_at,
                }))
            })
        }
        ParticipantCommands::CompleteWithdrawal => execute(settings, call, |session, ctx| {
            let paid = session.engine().complete_withdrawal(ctx)?;
            Ok(json!({ "participant": ctx.caller, "paid": format_amount(paid) }))
        }),
        ParticipantCommands::Slash {
            participant,
            amount,
            reason,
        } => {
            let amount = amount.as_deref().map(parse_amount).transpose()?;
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, ctx| {
                let slashed = session.engine().slash(ctx, &participant, amount, &reason)?;
                Ok(json!({ "participant": participant, "slashed": format_amount(slashed) }))
            })
        }
        ParticipantCommands::Reputation { participant, score } => {
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, ctx| {
                let previous = session
                    .engine()
                    .update_reputation(ctx, &participant, score)?;
                Ok(json!({ "participant": participant, "previous": previous, "reputation": score }))
            })
        }
    }
}
