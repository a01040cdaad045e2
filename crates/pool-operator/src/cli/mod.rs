pub mod epoch;
pub mod participant;
pub mod pool;
pub mod query;

use anyhow::Result;
use clap::Args;
use cocoon_pool_operator::{export::to_json_string, session::Session, settings::Settings};
use cocoon_pool_settlement::{CallContext, PoolError, Timestamp};
use serde::Serialize;

/// Who calls and when. Defaults to the configured operator at the current wall-clock time.
#[derive(Args, Debug, Clone, Default)]
pub struct CallArgs {
    /// Caller identity (defaults to the configured operator)
    #[arg(long, value_name = "ID", global = true)]
    pub caller: Option<String>,

    /// Unix timestamp of the call (defaults to now)
    #[arg(long, value_name = "UNIX_SECS", global = true)]
    pub now: Option<Timestamp>,
}

/// Runs one engine operation against the persisted pool and prints its result as JSON.
pub fn execute<T, F>(settings: &Settings, call: &CallArgs, op: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&Session, &CallContext) -> Result<T, PoolError>,
{
    let session = Session::open(settings)?;
    let ctx = session.ctx(call.caller.as_deref(), call.now);
    let result = op(&session, &ctx);
    finish(session, result)
}

/// Persists the session, then reports the operation result.
pub fn finish<T: Serialize>(session: Session, result: Result<T, PoolError>) -> Result<()> {
    session.commit()?;
    match result {
        Ok(value) => {
            println!("{}", to_json_string(&value, true)?);
            Ok(())
        }
        Err(err) => {
            let (code, class) = (err.code(), err.class());
            Err(anyhow::Error::new(err).context(format!("rejected with code {code} ({class})")))
        }
    }
}
