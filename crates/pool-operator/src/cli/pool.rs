use super::{CallArgs, execute};
use anyhow::Result;
use clap::Subcommand;
use cocoon_pool_operator::{session::parse_amount, settings::Settings};
use serde_json::json;

/// Pool lifecycle commands (operator only)
#[derive(Subcommand, Debug)]
pub enum PoolCommands {
    #[command(
        about = "Initialize the pool and open the first epoch",
        after_help = r#"Examples:
    # 10% commission, 100 units of operator stake
    init --commission-bps 1000 --operator-stake 100"#
    )]
    Init {
        /// Commission in basis points, 500..=1500
        #[arg(long, value_name = "BPS")]
        commission_bps: u16,

        /// Operator stake in units
        #[arg(long, value_name = "UNITS")]
        operator_stake: String,
    },
    #[command(
        about = "Change the commission; applies to epochs calculated afterwards",
        after_help = r#"Examples:
    set-commission --commission-bps 1200"#
    )]
    SetCommission {
        /// New commission in basis points, 500..=1500
        #[arg(long, value_name = "BPS")]
        commission_bps: u16,
    },
    /// Pause registration and epoch finalization
    Pause,
    /// Resume a paused pool
    Resume,
    /// Close the pool permanently once every epoch is settled
    Close,
}

pub async fn handle(settings: &Settings, call: &CallArgs, cmd: PoolCommands) -> Result<()> {
    match cmd {
        PoolCommands::Init {
            commission_bps,
            operator_stake,
        } => {
            let stake = parse_amount(&operator_stake)?;
            execute(settings, call, |session, ctx| {
                session.engine().initialize(ctx, commission_bps, stake)?;
                Ok(session.engine().current_epoch()?)
            })
        }
        PoolCommands::SetCommission { commission_bps } => {
            execute(settings, call, |session, ctx| {
                let previous = session.engine().pool().commission_bps;
                session.engine().set_commission(ctx, commission_bps)?;
                Ok(json!({ "previous_bps": previous, "commission_bps": commission_bps }))
            })
        }
        PoolCommands::Pause => execute(settings, call, |session, ctx| {
            session.engine().pause(ctx)?;
            Ok(session.engine().pool().status)
        }),
        PoolCommands::Resume => execute(settings, call, |session, ctx| {
            session.engine().resume(ctx)?;
            Ok(session.engine().pool().status)
        }),
        PoolCommands::Close => execute(settings, call, |session, ctx| {
            session.engine().close(ctx)?;
            Ok(session.engine().pool().status)
        }),
    }
}
