#![allow(dead_code)]

use cocoon_pool_settlement::{
    BatchReport, CallContext, ContributionDelta, EpochId, OutboxGateway, ParticipantId,
    PoolConfig, SettlementEngine, Timestamp, units,
};

pub const OPERATOR: &str = "operator";
pub const DAY: i64 = 86_400;
pub const T0: Timestamp = 1_700_000_000;

pub fn id(name: &str) -> ParticipantId {
    ParticipantId::from(name)
}

/// Uptime seconds equivalent to `bps` of a one-day epoch.
pub fn uptime_for_bps(bps: u64) -> u64 {
    bps * DAY as u64 / 10_000
}

/// Engine over an in-process outbox with a clock the test advances by hand.
pub struct Harness {
    pub engine: SettlementEngine<OutboxGateway>,
    pub now: Timestamp,
}

impl Harness {
    pub fn new(commission_bps: u16) -> Self {
        Self::with_config(PoolConfig::default(), commission_bps)
    }

    pub fn with_config(config: PoolConfig, commission_bps: u16) -> Self {
        Self::with_gateway(config, commission_bps, OutboxGateway::new())
    }

    pub fn with_gateway(config: PoolConfig, commission_bps: u16, gateway: OutboxGateway) -> Self {
        let engine = SettlementEngine::new(OPERATOR, config, gateway).unwrap();
        engine
            .initialize(&CallContext::new(OPERATOR, T0), commission_bps, units(100))
            .unwrap();
        Self { engine, now: T0 }
    }

    pub fn op(&self) -> CallContext {
        CallContext::new(OPERATOR, self.now)
    }

    pub fn as_(&self, who: &str) -> CallContext {
        CallContext::new(who, self.now)
    }

    pub fn advance(&mut self, secs: i64) {
        self.now += secs;
    }

    pub fn register(&self, who: &str, stake_units: u64) {
        self.engine
            .register(&self.as_(who), &id(who), units(stake_units))
            .unwrap();
    }

    pub fn work(&self, who: &str, work_units: u64, uptime_seconds: u64) {
        self.engine
            .update_contribution(
                &self.op(),
                &id(who),
                ContributionDelta {
                    tasks: 0,
                    work_units,
                    uptime_seconds,
                    quality: 0,
                },
            )
            .unwrap();
    }

    /// Moves to the end of the open epoch, finalizes and calculates it.
    pub fn settle_epoch(&mut self) -> EpochId {
        let end = self.engine.current_epoch().unwrap().end;
        self.now = self.now.max(end);
        let epoch = self.engine.finalize_epoch(&self.op()).unwrap();
        self.engine
            .calculate_distribution(&self.op(), epoch)
            .unwrap();
        epoch
    }

    pub fn pay_all(&self, epoch: EpochId) -> BatchReport {
        let unpaid = self.engine.unpaid(epoch).unwrap();
        self.engine
            .execute_batch(&self.op(), epoch, &unpaid)
            .unwrap()
    }
}
