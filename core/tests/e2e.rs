//! End-to-end tests for the Sardis transactional core.
//!
//! These exercise the full payment gauntlet through the public surface:
//! provisioning, funding, policy and risk gates, ledger commits, the hold
//! lifecycle, refunds, idempotency, and concurrent double-spend
//! exclusion. Each test builds its own services context — no shared
//! state, no ordering dependencies.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use sardis_core::config;
use sardis_core::entity::Wallet;
use sardis_core::ledger::EntryType;
use sardis_core::payment::{
    ErrorKind, FlatFeeSchedule, HoldRequest, PayRequest, TransactionStatus,
};
use sardis_core::policy::TrustTier;
use sardis_core::{Services, ServicesBuilder};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Core with the default 0.10 flat fee.
fn services() -> Arc<Services> {
    Services::new()
}

/// Core with fees disabled, for scenarios whose arithmetic assumes none.
fn services_free() -> Arc<Services> {
    ServicesBuilder::default()
        .fee_pricer(Arc::new(FlatFeeSchedule::free()))
        .build()
}

/// One funded agent and one plain recipient wallet.
fn agent_and_recipient(
    services: &Services,
    balance: Decimal,
    tier: TrustTier,
) -> (String, String, String) {
    let (agent, wallet) = services.create_agent("dev_test", "test-agent", tier);
    services
        .fund_wallet(&wallet.wallet_id, balance, "USDC")
        .unwrap();

    let recipient = services.wallets.insert(Wallet::new(
        "ent_recipient",
        "USDC",
        Decimal::MAX,
        Decimal::MAX,
    ));
    (agent.agent_id, wallet.wallet_id, recipient.wallet_id)
}

// ---------------------------------------------------------------------------
// S1 — Basic payment with fee
// ---------------------------------------------------------------------------

#[test]
fn s1_basic_payment_with_fee() {
    let services = services();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(100.00), TrustTier::Medium);

    let result = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(25.00), &wallet_b));
    assert!(result.success, "payment failed: {:?}", result.message);

    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(74.90));
    assert_eq!(services.ledger.get_balance(&wallet_b, "USDC"), dec!(25.00));
    assert_eq!(
        services
            .ledger
            .get_balance(config::FEE_POOL_WALLET_ID, "USDC"),
        dec!(0.10)
    );

    // Exactly three entries committed for the transfer: DEBIT 25.10,
    // CREDIT 25.00, FEE 0.10 (plus the single funding deposit).
    let tx = result.transaction.unwrap();
    let ledger_tx = services
        .ledger
        .get_transaction(tx.ledger_tx_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(ledger_tx.entry_ids.len(), 3);

    let entries = services.ledger.get_entries_for_wallet(&wallet_a, 10, 0);
    let debit = entries
        .iter()
        .find(|e| e.entry_type == EntryType::Debit)
        .unwrap();
    assert_eq!(debit.amount, dec!(25.10));
}

// ---------------------------------------------------------------------------
// S2 — Insufficient balance
// ---------------------------------------------------------------------------

#[test]
fn s2_insufficient_balance() {
    let services = services();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(10.00), TrustTier::Medium);
    let entries_before = services.ledger.entry_count();

    let result = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(20.00), &wallet_b));

    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::InsufficientBalance));
    assert!(result.transaction.is_none());

    // No entries committed; balances unchanged.
    assert_eq!(services.ledger.entry_count(), entries_before);
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(10.00));
    assert_eq!(services.ledger.get_balance(&wallet_b, "USDC"), dec!(0));
}

// ---------------------------------------------------------------------------
// S3 — Per-transaction limit
// ---------------------------------------------------------------------------

#[test]
fn s3_per_transaction_limit() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(1000), TrustTier::Medium);
    services.policies.update(&agent_id, |p| {
        p.limit_per_tx = dec!(10.00);
    });
    let entries_before = services.ledger.entry_count();

    let result = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(20.00), &wallet_b));

    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::PerTransactionLimit));
    assert_eq!(services.ledger.entry_count(), entries_before);
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(1000));

    // Policy rejection must not touch risk state.
    assert!(services.risk.profile(&agent_id).is_none());
}

// ---------------------------------------------------------------------------
// S4 — Hold, partial capture, remainder released
// ---------------------------------------------------------------------------

#[test]
fn s4_hold_capture_partial() {
    let services = services_free();
    let (agent_id, wallet_a, _) = agent_and_recipient(&services, dec!(1000), TrustTier::High);
    let (merchant, merchant_wallet) = services.create_merchant("dev_m", "GPU Shop", None);

    let hold = services
        .orchestrator
        .create_hold(HoldRequest::new(&agent_id, &merchant.merchant_id, dec!(200)));
    assert!(hold.success, "hold failed: {:?}", hold.message);
    let hold = hold.hold.unwrap();

    assert_eq!(
        services.ledger.get_available_balance(&wallet_a, "USDC"),
        dec!(800)
    );
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(1000));

    let capture = services
        .orchestrator
        .capture_hold(&hold.hold_id, Some(dec!(150)), None);
    assert!(capture.success, "capture failed: {:?}", capture.message);

    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(850));
    assert_eq!(
        services
            .ledger
            .get_balance(&merchant_wallet.wallet_id, "USDC"),
        dec!(150)
    );
    assert_eq!(services.ledger.get_held_amount(&wallet_a, "USDC"), dec!(0));
    assert_eq!(
        services.ledger.get_available_balance(&wallet_a, "USDC"),
        dec!(850)
    );

    // Terminal: the hold cannot be captured or voided again.
    let again = services.orchestrator.capture_hold(&hold.hold_id, None, None);
    assert_eq!(again.error, Some(ErrorKind::HoldNotActive));
    let void = services.orchestrator.void_hold(&hold.hold_id);
    assert_eq!(void.error, Some(ErrorKind::HoldNotActive));
}

#[test]
fn s4b_void_restores_availability() {
    let services = services_free();
    let (agent_id, wallet_a, _) = agent_and_recipient(&services, dec!(500), TrustTier::High);
    let (merchant, _) = services.create_merchant("dev_m", "Shop", None);

    let hold = services
        .orchestrator
        .create_hold(HoldRequest::new(&agent_id, &merchant.merchant_id, dec!(120)))
        .hold
        .unwrap();
    assert_eq!(
        services.ledger.get_available_balance(&wallet_a, "USDC"),
        dec!(380)
    );
    // The reservation also shows in the wallet's advisory counter.
    assert_eq!(
        services.wallets.get(&wallet_a).unwrap().spent_total,
        dec!(120)
    );

    let void = services.orchestrator.void_hold(&hold.hold_id);
    assert!(void.success);
    assert_eq!(
        services.ledger.get_available_balance(&wallet_a, "USDC"),
        dec!(500)
    );
    assert_eq!(services.wallets.get(&wallet_a).unwrap().spent_total, dec!(0));
}

// ---------------------------------------------------------------------------
// S5 — Refund once, second refund capped
// ---------------------------------------------------------------------------

#[test]
fn s5_partial_refunds_bounded_by_original() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(1000), TrustTier::High);

    let payment = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(100), &wallet_b));
    assert!(payment.success);
    let tx_id = payment.transaction.unwrap().tx_id;

    // First refund: 40 back.
    let r1 = services.orchestrator.refund(&tx_id, Some(dec!(40)), None);
    assert!(r1.success);
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(940));
    assert_eq!(services.ledger.get_balance(&wallet_b, "USDC"), dec!(60));

    // 80 more would exceed the original 100.
    let r2 = services.orchestrator.refund(&tx_id, Some(dec!(80)), None);
    assert!(!r2.success);
    assert_eq!(r2.error, Some(ErrorKind::RefundExceedsOriginal));

    // Exactly the remainder is fine and fully refunds the payment.
    let r3 = services.orchestrator.refund(&tx_id, Some(dec!(60)), None);
    assert!(r3.success);
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(1000));
    assert_eq!(services.ledger.get_balance(&wallet_b, "USDC"), dec!(0));

    let original = services.orchestrator.get_transaction(&tx_id).unwrap();
    assert_eq!(original.status, TransactionStatus::Refunded);
    assert_eq!(original.refunded_amount, dec!(100));

    // A fully refunded payment cannot be refunded again.
    let r4 = services.orchestrator.refund(&tx_id, Some(dec!(1)), None);
    assert_eq!(r4.error, Some(ErrorKind::RefundOnNonCompleted));
}

// ---------------------------------------------------------------------------
// S6 — Idempotent retry
// ---------------------------------------------------------------------------

#[test]
fn s6_idempotent_retry_commits_once() {
    let services = services_free();
    let (agent_id, _, wallet_b) = agent_and_recipient(&services, dec!(1000), TrustTier::High);

    let request = PayRequest::new(&agent_id, dec!(50), &wallet_b).with_idempotency_key("k1");
    let first = services.orchestrator.pay(request.clone());
    assert!(first.success);
    let entries_after_first = services.ledger.entry_count();

    let second = services.orchestrator.pay(request);
    assert!(second.success);

    // Byte-identical results, one ledger transaction.
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(services.ledger.entry_count(), entries_after_first);
    assert_eq!(
        services
            .orchestrator
            .list_agent_transactions(&agent_id, 10, 0)
            .len(),
        1
    );
    assert_eq!(services.ledger.get_balance(&wallet_b, "USDC"), dec!(50));
}

// ---------------------------------------------------------------------------
// S7 — Concurrent double-spend exclusion
// ---------------------------------------------------------------------------

#[test]
fn s7_concurrent_payments_exclude_double_spend() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(100), TrustTier::Unlimited);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let services = Arc::clone(&services);
        let agent_id = agent_id.clone();
        let wallet_b = wallet_b.clone();
        handles.push(std::thread::spawn(move || {
            services
                .orchestrator
                .pay(PayRequest::new(&agent_id, dec!(20), &wallet_b))
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.success).count();
    let failures: Vec<_> = results.iter().filter(|r| !r.success).collect();

    assert_eq!(successes, 5, "exactly five 20s fit in 100");
    assert_eq!(failures.len(), 5);
    for failure in failures {
        assert_eq!(failure.error, Some(ErrorKind::InsufficientBalance));
    }

    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(0));
    assert_eq!(services.ledger.get_balance(&wallet_b, "USDC"), dec!(100));
    assert!(services.ledger.verify_integrity().is_ok());
}

// ---------------------------------------------------------------------------
// S10 — Velocity rule denies
// ---------------------------------------------------------------------------

#[test]
fn s10_velocity_storm_denied() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(1000), TrustTier::High);

    // 45 transactions in the last hour: ≥ 2× the limit of 20.
    services.risk.set_activity(&agent_id, 45, 50);

    let result = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(10), &wallet_b));

    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::RiskDenied));
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(1000));
}

// ---------------------------------------------------------------------------
// Universal invariants
// ---------------------------------------------------------------------------

#[test]
fn invariant_conservation_and_chain_over_mixed_workload() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(10_000), TrustTier::Unlimited);
    let (merchant, _) = services.create_merchant("dev_m", "Shop", Some("compute"));

    // A mixed workload: payments, holds captured and voided, refunds.
    for i in 1..=5u32 {
        let r = services.orchestrator.pay(PayRequest::new(
            &agent_id,
            Decimal::from(i * 7),
            &wallet_b,
        ));
        assert!(r.success);
    }
    let hold = services
        .orchestrator
        .create_hold(HoldRequest::new(&agent_id, &merchant.merchant_id, dec!(300)))
        .hold
        .unwrap();
    services
        .orchestrator
        .capture_hold(&hold.hold_id, Some(dec!(120)), None);
    let hold2 = services
        .orchestrator
        .create_hold(HoldRequest::new(&agent_id, &merchant.merchant_id, dec!(50)))
        .hold
        .unwrap();
    services.orchestrator.void_hold(&hold2.hold_id);

    let paid = services
        .orchestrator
        .list_agent_transactions(&agent_id, 1, 5)
        .pop()
        .unwrap();
    services.orchestrator.refund(&paid.tx_id, None, None);

    // Hash chain intact, sequences gap-free.
    assert!(services.ledger.verify_integrity().is_ok());
    let entries = services.ledger.get_entries_since(0);
    for (i, e) in entries.iter().enumerate() {
        assert_eq!(e.sequence_number, i as u64 + 1);
    }

    // No negative balances anywhere, and available = balance − held.
    for wallet in [
        wallet_a.as_str(),
        wallet_b.as_str(),
        config::FEE_POOL_WALLET_ID,
    ] {
        let balance = services.ledger.get_balance(wallet, "USDC");
        let held = services.ledger.get_held_amount(wallet, "USDC");
        let available = services.ledger.get_available_balance(wallet, "USDC");
        assert!(balance >= dec!(0));
        assert!(held >= dec!(0));
        assert_eq!(available, balance - held);

        // The cache agrees with a full replay.
        let proof = services.ledger.balance_proof(wallet, "USDC");
        assert_eq!(proof.balance, balance);
    }
}

#[test]
fn invariant_checkpoint_reproduces_state() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(500), TrustTier::High);

    services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(120), &wallet_b));
    let checkpoint = services.ledger.create_checkpoint();
    assert!(checkpoint.verify());

    services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(30), &wallet_b));

    // Checkpoint balances + entries since = live balances.
    let tail = services
        .ledger
        .get_entries_since(checkpoint.last_sequence_number);
    for wallet in [wallet_a.as_str(), wallet_b.as_str()] {
        let mut replayed = checkpoint
            .wallet_balances
            .get(wallet)
            .and_then(|c| c.get("USDC"))
            .copied()
            .unwrap_or(dec!(0));
        for entry in tail.iter().filter(|e| e.wallet_id == wallet) {
            replayed += entry.balance_delta();
        }
        assert_eq!(replayed, services.ledger.get_balance(wallet, "USDC"));
    }
}

#[test]
fn pending_approval_flow_commits_nothing() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(5000), TrustTier::High);
    services.policies.update(&agent_id, |p| {
        p.approval_threshold = Some(dec!(500));
    });

    let result = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(900), &wallet_b));

    assert!(!result.success);
    assert!(result.error.is_none());
    assert!(result.approval_id.is_some());
    let tx = result.transaction.unwrap();
    assert_eq!(tx.status, TransactionStatus::PendingApproval);
    assert_eq!(services.ledger.get_balance(&wallet_a, "USDC"), dec!(5000));

    // At or below the threshold flows straight through.
    let ok = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(500), &wallet_b));
    assert!(ok.success);
}

#[test]
fn merchant_routing_and_unknown_merchant() {
    let services = services_free();
    let (agent_id, _, _) = agent_and_recipient(&services, dec!(1000), TrustTier::High);
    let (merchant, merchant_wallet) = services.create_merchant("dev_m", "API Vendor", None);

    let result =
        services
            .orchestrator
            .pay_merchant(&agent_id, &merchant.merchant_id, dec!(75), "USDC", None);
    assert!(result.success);
    assert_eq!(
        services
            .ledger
            .get_balance(&merchant_wallet.wallet_id, "USDC"),
        dec!(75)
    );
    assert_eq!(
        result.transaction.unwrap().merchant_id.as_deref(),
        Some(merchant.merchant_id.as_str())
    );

    let missing = services
        .orchestrator
        .pay_merchant(&agent_id, "mch_ghost", dec!(10), "USDC", None);
    assert_eq!(missing.error, Some(ErrorKind::MerchantNotFound));
}

#[test]
fn expired_hold_rejects_capture_and_releases() {
    let services = services_free();
    let (agent_id, wallet_a, _) = agent_and_recipient(&services, dec!(500), TrustTier::High);
    let (merchant, _) = services.create_merchant("dev_m", "Shop", None);

    let mut request = HoldRequest::new(&agent_id, &merchant.merchant_id, dec!(100));
    request.expiration_hours = Some(0);
    let hold = services.orchestrator.create_hold(request).hold.unwrap();

    // expiration_hours = 0 puts expires_at in the past immediately.
    let capture = services.orchestrator.capture_hold(&hold.hold_id, None, None);
    assert_eq!(capture.error, Some(ErrorKind::HoldExpired));

    // Reservation fully released.
    assert_eq!(
        services.ledger.get_available_balance(&wallet_a, "USDC"),
        dec!(500)
    );
    assert_eq!(services.wallets.get(&wallet_a).unwrap().spent_total, dec!(0));
    assert_eq!(
        services.orchestrator.get_hold(&hold.hold_id).unwrap().status,
        sardis_core::payment::HoldStatus::Expired
    );
}

#[test]
fn capture_failure_restores_reservation() {
    let services = services_free();
    let (agent_id, wallet_a, _) = agent_and_recipient(&services, dec!(500), TrustTier::High);
    let (merchant, _) = services.create_merchant("dev_m", "Shop", None);

    let hold = services
        .orchestrator
        .create_hold(HoldRequest::new(&agent_id, &merchant.merchant_id, dec!(100)))
        .hold
        .unwrap();

    // Tighten the policy after authorization so the capture is rejected.
    services.policies.update(&agent_id, |p| {
        p.limit_per_tx = dec!(1);
    });

    let capture = services.orchestrator.capture_hold(&hold.hold_id, None, None);
    assert!(!capture.success);
    assert_eq!(capture.error, Some(ErrorKind::PerTransactionLimit));

    // Reservation restored: funds still held for the merchant.
    assert_eq!(
        services.wallets.get(&wallet_a).unwrap().spent_total,
        dec!(100)
    );
    assert_eq!(
        services.ledger.get_available_balance(&wallet_a, "USDC"),
        dec!(400)
    );
    assert_eq!(
        services.orchestrator.get_hold(&hold.hold_id).unwrap().status,
        sardis_core::payment::HoldStatus::Active
    );
}

#[test]
fn estimate_matches_charged_fee() {
    let services = services();
    let estimate = services.orchestrator.estimate_payment(dec!(25), "USDC");
    assert_eq!(estimate.fee, dec!(0.10));
    assert_eq!(estimate.total, dec!(25.10));

    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(100), TrustTier::Medium);
    services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(25), &wallet_b));
    assert_eq!(
        services.ledger.get_balance(&wallet_a, "USDC"),
        dec!(100) - estimate.total
    );
}

#[test]
fn deactivated_wallet_rejects_payment() {
    let services = services_free();
    let (agent_id, wallet_a, wallet_b) =
        agent_and_recipient(&services, dec!(100), TrustTier::High);

    services.wallets.deactivate(&wallet_a).unwrap();
    let result = services
        .orchestrator
        .pay(PayRequest::new(&agent_id, dec!(10), &wallet_b));
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::WalletNotFound));
}
