use crate::settings::PayoutSettings;
use backon::{ExponentialBuilder, Retryable};
use cocoon_pool_settlement::{
    Amount, BatchReport, CallContext, EpochId, PoolError, SettlementEngine, TransferGateway,
};
use serde::Serialize;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PayoutRun {
    pub epoch: EpochId,
    pub batches: usize,
    pub paid: usize,
    pub amount: Amount,
    pub retries: usize,
    pub epoch_closed: bool,
}

/// Pays every unpaid record of `epoch` in `max_batch_size` chunks.
///
/// A batch that fails with a retryable transfer error is re-submitted unchanged after a backoff;
/// the engine skips entries that were already paid, so a retry only pays what is still owed.
pub async fn pay_epoch<G: TransferGateway>(
    engine: &SettlementEngine<G>,
    ctx: &CallContext,
    epoch: EpochId,
    settings: &PayoutSettings,
) -> Result<PayoutRun, PoolError> {
    let batch_size = engine.pool().config.max_batch_size.max(1);
    let unpaid = engine.unpaid(epoch)?;
    let mut run = PayoutRun {
        epoch,
        ..Default::default()
    };

    for chunk in unpaid.chunks(batch_size) {
        let attempts = AtomicUsize::new(0);
        let backoff = ExponentialBuilder::default()
            .with_min_delay(settings.min_delay())
            .with_max_delay(settings.max_delay())
            .with_max_times(settings.max_retries)
            .with_jitter();

        let report: BatchReport = (|| async { engine.execute_batch(ctx, epoch, chunk) })
            .retry(backoff)
            .when(|err: &PoolError| err.is_retryable())
            .notify(|err: &PoolError, delay: Duration| {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("cocoon_pool_payout_retries_total").increment(1);
                warn!(epoch, attempt, retry_in = ?delay, error = %err, "payout batch failed");
            })
            .await?;

        run.batches += 1;
        run.paid += report.paid.len();
        run.amount = run.amount.saturating_add(report.total_paid());
        run.retries += attempts.load(Ordering::Relaxed);
        run.epoch_closed = report.epoch_closed;
        metrics::counter!("cocoon_pool_payout_batches_total").increment(1);
    }

    metrics::counter!("cocoon_pool_payout_runs_total").increment(1);

    info!(
        epoch,
        batches = run.batches,
        paid = run.paid,
        amount = run.amount,
        retries = run.retries,
        "epoch payout finished"
    );
    Ok(run)
}
