mod common;

use cocoon_pool_settlement::{
    Amount, CallContext, ContributionDelta, EpochStatus, PayoutChannel, PoolConfig, PoolError,
    PoolEvent, SettlementEngine, format_amount,
    transfer::{MockTransferGateway, TransferError, TransferStatus},
    units,
};
use common::{DAY, Harness, OPERATOR, T0, id, uptime_for_bps};

fn to_units(amount: Amount) -> f64 {
    amount as f64 / 1e9
}

/// Three participants whose scores come out at 52250, 29700 and 19840 with full reputation:
/// `score = 0.5 * work + 0.2 * uptime_bps`.
fn scenario_a() -> (Harness, u64) {
    let mut h = Harness::new(500);
    for (who, work, uptime_bps) in [
        ("alice", 100_540, 9_900),
        ("bob", 55_560, 9_600),
        ("carol", 35_760, 9_800),
    ] {
        h.register(who, 10);
        h.engine
            .update_reputation(&h.op(), &id(who), 1_000)
            .unwrap();
        h.work(who, work, uptime_for_bps(uptime_bps));
    }
    h.engine
        .receive_revenue(&h.as_("payer"), units(100))
        .unwrap();
    let epoch = h.settle_epoch();
    (h, epoch)
}

#[test]
fn test_basic_distribution_shares() {
    let (h, epoch) = scenario_a();
    let record = h.engine.epoch(epoch).unwrap();

    assert_eq!(record.status, EpochStatus::Distributing);
    assert_eq!(record.commission_bps, Some(500));
    assert_eq!(record.operator_fee, units(5));
    assert_eq!(record.participant_pool, units(95));
    assert_eq!(record.total_participants, 3);

    let scores: Vec<String> = ["alice", "bob", "carol"]
        .iter()
        .map(|who| record.contributions[&id(who)].score.normalize().to_string())
        .collect();
    assert_eq!(scores, vec!["52250", "29700", "19840"]);

    for (who, expected) in [("alice", 48.76), ("bob", 27.72), ("carol", 18.52)] {
        let amount = record.distributions[&id(who)].amount;
        assert!(
            (to_units(amount) - expected).abs() < 0.01,
            "{who} got {}",
            format_amount(amount)
        );
    }

    let distributed: Amount = record.distributions.values().map(|r| r.amount).sum();
    assert!(distributed <= units(95));
    assert_eq!(distributed + record.reconciliation, units(95));
    assert_eq!(
        h.engine.pool().operator_earnings,
        units(5) + record.reconciliation
    );
}

#[test]
fn test_batch_payout_and_idempotence() {
    let (h, epoch) = scenario_a();
    h.engine.take_events();
    let everyone = vec![id("alice"), id("bob"), id("carol")];

    let first = h
        .engine
        .execute_batch(&h.op(), epoch, &everyone[..2])
        .unwrap();
    assert_eq!(first.paid.len(), 2);
    assert!(!first.epoch_closed);
    assert_eq!(h.engine.unpaid(epoch).unwrap(), vec![id("carol")]);

    // re-running the same subset pays nothing new
    let again = h
        .engine
        .execute_batch(&h.op(), epoch, &everyone[..2])
        .unwrap();
    assert!(again.paid.is_empty());
    assert_eq!(again.skipped, 2);

    let rest = h.engine.execute_batch(&h.op(), epoch, &everyone).unwrap();
    assert_eq!(rest.paid.len(), 1);
    assert!(rest.epoch_closed);

    let record = h.engine.epoch(epoch).unwrap();
    assert_eq!(record.status, EpochStatus::Closed);
    assert_eq!(record.participants_paid, 3);

    let sent = h.engine.gateway().sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        h.engine.gateway().total_sent(),
        record.amount_paid
    );
    assert!(record.amount_paid <= record.participant_pool);
    assert!(sent.iter().any(|t| t.correlation_id == format!("payout:{epoch}:bob")));

    let paid_events = h
        .engine
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, PoolEvent::RewardPaid { .. }))
        .count();
    assert_eq!(paid_events, 3);

    // closed epochs accept a repeated batch as a no-op
    let replay = h.engine.execute_batch(&h.op(), epoch, &everyone).unwrap();
    assert!(replay.paid.is_empty());
    assert_eq!(h.engine.gateway().sent().len(), 3);
}

#[test]
fn test_batch_validation() {
    let config = PoolConfig {
        max_batch_size: 2,
        ..Default::default()
    };
    let mut h = Harness::with_config(config, 1_000);
    h.register("alice", 10);
    h.work("alice", 10, DAY as u64);
    h.engine.receive_revenue(&h.as_("payer"), units(1)).unwrap();

    assert!(matches!(
        h.engine.execute_batch(&h.op(), 0, &[id("alice")]),
        Err(PoolError::InvalidState(_))
    ));
    assert_eq!(
        h.engine.execute_batch(&h.op(), 7, &[id("alice")]),
        Err(PoolError::EpochNotFound(7))
    );

    let epoch = h.settle_epoch();
    assert!(matches!(
        h.engine
            .execute_batch(&h.op(), epoch, &[id("alice"), id("alice"), id("alice")]),
        Err(PoolError::InvalidAmount(_))
    ));
    assert_eq!(
        h.engine.execute_batch(&h.op(), epoch, &[id("stranger")]),
        Err(PoolError::ParticipantNotFound(id("stranger")))
    );
    assert!(h.engine.gateway().sent().is_empty());
}

#[test]
fn test_partial_batch_failure_reports_progress() {
    let mut gateway = MockTransferGateway::new();
    gateway
        .expect_transfer()
        .withf(|i| i.destination.as_str() == "alice")
        .times(1)
        .returning(|_| Ok(TransferStatus::Executed));
    gateway
        .expect_transfer()
        .withf(|i| i.destination.as_str() == "bob")
        .times(1)
        .returning(|_| Err(TransferError::Unavailable("timeout".to_string())));

    let engine = SettlementEngine::new(OPERATOR, PoolConfig::default(), gateway).unwrap();
    let mut now = T0;
    let op = |now| CallContext::new(OPERATOR, now);
    engine.initialize(&op(now), 1_000, units(100)).unwrap();
    for who in ["alice", "bob", "carol"] {
        engine
            .register(&CallContext::new(who, now), &id(who), units(10))
            .unwrap();
        engine
            .update_contribution(
                &op(now),
                &id(who),
                ContributionDelta {
                    work_units: 100,
                    uptime_seconds: DAY as u64,
                    ..Default::default()
                },
            )
            .unwrap();
    }
    engine
        .receive_revenue(&CallContext::new("payer", now), units(30))
        .unwrap();
    now += DAY;
    let epoch = engine.finalize_epoch(&op(now)).unwrap();
    engine.calculate_distribution(&op(now), epoch).unwrap();

    let err = engine
        .execute_batch(&op(now), epoch, &[id("alice"), id("bob"), id("carol")])
        .unwrap_err();
    assert_eq!(
        err,
        PoolError::TransferFailed {
            correlation_id: format!("payout:{epoch}:bob"),
            completed: 1,
            reason: "transfer gateway unavailable: timeout".to_string(),
        }
    );
    assert!(err.is_retryable());

    let record = engine.epoch(epoch).unwrap();
    assert!(record.distributions[&id("alice")].paid);
    assert!(!record.distributions[&id("bob")].paid);
    assert_eq!(record.participants_paid, 1);
    assert_eq!(engine.unpaid(epoch).unwrap(), vec![id("bob"), id("carol")]);
    assert_eq!(
        engine.participant(&id("alice")).unwrap().rewards_paid,
        record.distributions[&id("alice")].amount
    );
    assert_eq!(engine.participant(&id("bob")).unwrap().rewards_paid, 0);
}

#[test]
fn test_retry_after_outbox_failure_completes_epoch() {
    let (h, epoch) = scenario_a();
    h.engine.gateway().fail_next(1);
    let everyone = vec![id("alice"), id("bob"), id("carol")];

    let err = h.engine.execute_batch(&h.op(), epoch, &everyone).unwrap_err();
    assert!(matches!(err, PoolError::TransferFailed { completed: 0, .. }));
    assert_eq!(h.engine.unpaid(epoch).unwrap().len(), 3);

    let report = h.engine.execute_batch(&h.op(), epoch, &everyone).unwrap();
    assert_eq!(report.paid.len(), 3);
    assert!(report.epoch_closed);
    assert_eq!(h.engine.gateway().sent().len(), 3);
}

#[test]
fn test_claim_path() {
    let (h, epoch) = scenario_a();
    let proof = h.engine.proof_for(epoch, &id("bob")).unwrap();

    assert!(matches!(
        h.engine.claim(&h.as_("alice"), epoch, &proof),
        Err(PoolError::InvalidProof { .. })
    ));

    let amount = h.engine.claim(&h.as_("bob"), epoch, &proof).unwrap();
    assert_eq!(amount, proof.amount);
    assert_eq!(
        h.engine.claim(&h.as_("bob"), epoch, &proof),
        Err(PoolError::AlreadyClaimed {
            epoch,
            participant: id("bob"),
        })
    );

    let record = h.engine.epoch(epoch).unwrap();
    assert_eq!(
        record.distributions[&id("bob")].paid_via,
        Some(PayoutChannel::Claim)
    );

    // the batch path skips the claimed entry and reuses the same correlation id scheme
    let report = h.pay_all(epoch);
    assert_eq!(report.paid.len(), 2);
    assert!(report.epoch_closed);
    let sent = h.engine.gateway().sent();
    assert_eq!(
        sent.iter()
            .filter(|t| t.correlation_id == format!("payout:{epoch}:bob"))
            .count(),
        1
    );
}

#[test]
fn test_paused_pool_still_pays_out_distributing_epoch() {
    let (mut h, epoch) = scenario_a();
    h.engine.pause(&h.op()).unwrap();

    let report = h
        .engine
        .execute_batch(&h.op(), epoch, &[id("alice"), id("bob")])
        .unwrap();
    assert_eq!(report.paid.len(), 2);
    assert!(!report.epoch_closed);

    let proof = h.engine.proof_for(epoch, &id("carol")).unwrap();
    assert_eq!(h.engine.claim(&h.as_("carol"), epoch, &proof), Ok(proof.amount));
    assert_eq!(h.engine.epoch(epoch).unwrap().status, EpochStatus::Closed);

    // no new epoch is sealed while paused
    h.advance(DAY);
    assert_eq!(
        h.engine.finalize_epoch(&h.op()),
        Err(PoolError::PoolNotActive)
    );
    h.engine.resume(&h.op()).unwrap();
    assert_eq!(h.engine.finalize_epoch(&h.op()), Ok(epoch + 1));
}

#[test]
fn test_claim_before_distribution() {
    let (h, epoch) = scenario_a();
    let proof = h.engine.proof_for(epoch, &id("alice")).unwrap();
    let open = h.engine.current_epoch().unwrap().id;
    assert!(matches!(
        h.engine.claim(&h.as_("alice"), open, &proof),
        Err(PoolError::InvalidState(_))
    ));
    assert!(matches!(
        h.engine.proof_for(open, &id("alice")),
        Err(PoolError::InvalidState(_))
    ));
}

#[test]
fn test_zero_scores_roll_revenue_forward() {
    let mut h = Harness::new(1_000);
    h.register("alice", 10);
    h.engine.receive_revenue(&h.as_("payer"), units(20)).unwrap();
    h.engine.take_events();

    let epoch = h.settle_epoch();
    let record = h.engine.epoch(epoch).unwrap();
    assert_eq!(record.status, EpochStatus::Closed);
    assert_eq!(record.rolled_out, units(18));
    assert!(record.distributions.is_empty());

    let open = h.engine.current_epoch().unwrap();
    assert_eq!(open.rolled_in, units(18));
    assert_eq!(open.total_revenue, units(18));
    assert_eq!(h.engine.pool().operator_earnings, units(2));

    let events = h.engine.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PoolEvent::RewardsRolledOver { from_epoch: 0, into_epoch: 1, amount } if *amount == units(18)
    )));
}

#[test]
fn test_commission_snapshot_at_calculation() {
    let mut h = Harness::new(1_000);
    h.register("alice", 10);
    h.work("alice", 10, DAY as u64);
    h.engine.receive_revenue(&h.as_("payer"), units(10)).unwrap();
    h.advance(DAY);
    let epoch = h.engine.finalize_epoch(&h.op()).unwrap();

    // still applies: the epoch has not been calculated yet
    h.engine.set_commission(&h.op(), 1_500).unwrap();
    h.engine.calculate_distribution(&h.op(), epoch).unwrap();
    h.engine.set_commission(&h.op(), 500).unwrap();

    let record = h.engine.epoch(epoch).unwrap();
    assert_eq!(record.commission_bps, Some(1_500));
    assert_eq!(record.operator_fee, units(1) + units(1) / 2);
}

#[test]
fn test_slashed_participant_loses_open_epoch_share() {
    let mut h = Harness::new(1_000);
    h.register("alice", 10);
    h.register("bob", 10);
    h.work("alice", 100, DAY as u64);
    h.work("bob", 100, DAY as u64);
    h.engine.receive_revenue(&h.as_("payer"), units(10)).unwrap();

    h.engine
        .slash(&h.op(), &id("bob"), None, "missed attestations")
        .unwrap();
    // work reported after suspension is not eligible either
    h.work("bob", 100, 0);

    let epoch = h.settle_epoch();
    let record = h.engine.epoch(epoch).unwrap();
    assert_eq!(record.total_participants, 1);
    assert!(record.distributions.contains_key(&id("alice")));
    assert!(!record.contributions[&id("bob")].eligible);
}

#[test]
fn test_outages_reduce_share() {
    let mut h = Harness::new(1_000);
    h.register("alice", 10);
    h.register("bob", 10);
    h.work("alice", 1_000, DAY as u64);
    h.work("bob", 1_000, DAY as u64);
    for _ in 0..3 {
        h.engine.record_outage(&h.op(), &id("bob")).unwrap();
    }
    h.engine.receive_revenue(&h.as_("payer"), units(10)).unwrap();

    let epoch = h.settle_epoch();
    let record = h.engine.epoch(epoch).unwrap();
    let alice = &record.distributions[&id("alice")];
    let bob = &record.distributions[&id("bob")];
    assert_eq!(alice.score, bob.score);
    assert!(bob.modifier < alice.modifier);
    assert!(bob.amount < alice.amount);
}
