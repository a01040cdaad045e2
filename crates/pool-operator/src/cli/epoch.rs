use super::{CallArgs, execute, finish};
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use cocoon_pool_operator::{
    export::ProofBundle,
    payout::pay_epoch,
    session::{Session, parse_amount},
    settings::Settings,
};
use cocoon_pool_settlement::{EpochId, ParticipantId, format_amount};
use serde_json::json;
use std::{fs, path::PathBuf};

/// Revenue, epoch and payout commands
#[derive(Subcommand, Debug)]
pub enum EpochCommands {
    #[command(
        about = "Credit revenue to the open epoch; any caller may pay in",
        after_help = r#"Examples:
    revenue --amount 100 --caller EQBclient"#
    )]
    Revenue {
        #[arg(short, long, value_name = "UNITS")]
        amount: String,
    },
    /// Seal the open epoch once its end has passed and open the next (operator only)
    Finalize,
    #[command(
        about = "Compute the payout of a finalized epoch (operator only)",
        after_help = r#"Examples:
    calculate --epoch 12"#
    )]
    Calculate {
        #[arg(short, long, value_name = "EPOCH")]
        epoch: EpochId,
    },
    #[command(
        about = "Push every unpaid payout of an epoch in batches, retrying failed transfers",
        after_help = r#"Examples:
    # Pay everything still owed for epoch 12
    pay --epoch 12

    # Pay an explicit subset in one batch
    pay --epoch 12 --participant EQBalice --participant EQBbob"#
    )]
    Pay {
        #[arg(short, long, value_name = "EPOCH")]
        epoch: EpochId,

        /// Pay only these participants, as a single batch
        #[arg(short, long, value_name = "ID")]
        participant: Vec<String>,
    },
    #[command(
        about = "Claim the caller's payout for an epoch with a merkle proof",
        after_help = r#"Examples:
    # Claim with a proof exported by the `proof` command
    claim --epoch 12 --proof alice-12.json --caller EQBalice

    # Claim using the proof held in the local state
    claim --epoch 12 --caller EQBalice"#
    )]
    Claim {
        #[arg(short, long, value_name = "EPOCH")]
        epoch: EpochId,

        /// JSON claim proof; derived from the local state when absent
        #[arg(long, value_name = "FILE")]
        proof: Option<PathBuf>,
    },
    /// Print a participant's claim proof and the epoch's merkle root
    Proof {
        #[arg(short, long, value_name = "EPOCH")]
        epoch: EpochId,

        #[arg(short, long, value_name = "ID")]
        participant: String,
    },
}

pub async fn handle(settings: &Settings, call: &CallArgs, cmd: EpochCommands) -> Result<()> {
    match cmd {
        EpochCommands::Revenue { amount } => {
            let amount = parse_amount(&amount)?;
            execute(settings, call, |session, ctx| {
                let epoch = session.engine().receive_revenue(ctx, amount)?;
                Ok(json!({ "epoch": epoch, "amount": format_amount(amount) }))
            })
        }
        EpochCommands::Finalize => execute(settings, call, |session, ctx| {
            let epoch = session.engine().finalize_epoch(ctx)?;
            Ok(session.engine().epoch(epoch)?)
        }),
        EpochCommands::Calculate { epoch } => execute(settings, call, |session, ctx| {
            session.engine().calculate_distribution(ctx, epoch)
        }),
        EpochCommands::Pay { epoch, participant } if !participant.is_empty() => {
            let participants: Vec<ParticipantId> =
                participant.into_iter().map(ParticipantId::from).collect();
            execute(settings, call, |session, ctx| {
                session.engine().execute_batch(ctx, epoch, &participants)
            })
        }
        EpochCommands::Pay { epoch, .. } => {
            let session = Session::open(settings)?;
            let ctx = session.ctx(call.caller.as_deref(), call.now);
            let result = pay_epoch(session.engine(), &ctx, epoch, &settings.payout).await;
            finish(session, result)
        }
        EpochCommands::Claim { epoch, proof } => {
            let proof = match proof {
                Some(path) => {
                    let contents = fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read proof file: {path:?}"))?;
                    let bundle: ProofBundle = serde_json::from_str(&contents)
                        .with_context(|| format!("Failed to parse proof file: {path:?}"))?;
                    if bundle.epoch != epoch {
                        bail!("Proof file is for epoch {}, not {epoch}", bundle.epoch);
                    }
                    Some(bundle.claim)
                }
                None => None,
            };
            execute(settings, call, |session, ctx| {
                let proof = match proof {
                    Some(proof) => proof,
                    None => session.engine().proof_for(epoch, &ctx.caller)?,
                };
                let paid = session.engine().claim(ctx, epoch, &proof)?;
                Ok(json!({ "epoch": epoch, "participant": ctx.caller, "paid": format_amount(paid) }))
            })
        }
        EpochCommands::Proof { epoch, participant } => {
            let participant = ParticipantId::from(participant);
            execute(settings, call, |session, _| {
                let claim = session.engine().proof_for(epoch, &participant)?;
                Ok(ProofBundle {
                    epoch,
                    merkle_root: session.engine().epoch(epoch)?.merkle_root,
                    participant,
                    claim,
                })
            })
        }
    }
}
