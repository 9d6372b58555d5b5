//! CLI walkthrough of the full Sardis payment lifecycle.
//!
//! Provisions an agent and a merchant, funds the agent's wallet, runs a
//! fee-charged payment, a partial-capture hold, a bounded refund, and
//! finishes with a checkpoint and a full hash-chain integrity walk.
//!
//! Run with:
//!   cargo run --example demo

use std::time::Instant;

use rust_decimal_macros::dec;

use sardis_core::config;
use sardis_core::payment::{HoldRequest, PayRequest};
use sardis_core::policy::TrustTier;
use sardis_core::webhook::signature;
use sardis_core::Services;

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn balances(services: &Services, rows: &[(&str, &str, &str)]) {
    println!();
    for (name, wallet_id, color) in rows {
        let balance = services.ledger.get_balance(wallet_id, "USDC");
        let available = services.ledger.get_available_balance(wallet_id, "USDC");
        println!(
            "  {color}{BOLD}{name:<10}{RESET}  {WHITE}{balance:>10}{RESET} {DIM}USDC (available {available}){RESET}"
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let demo_start = Instant::now();

    println!();
    println!("{BOLD}{WHITE}  SARDIS  --  Agent Payment Lifecycle Demo{RESET}");
    println!("{DIM}  double-entry ledger | policy + risk gate | holds | refunds{RESET}");

    // -----------------------------------------------------------------------
    // Step 1: Provisioning
    // -----------------------------------------------------------------------

    section(1, "Provisioning: agent, merchant, funding");

    let services = Services::new();
    let (agent, agent_wallet) = services.create_agent("dev_demo", "shopping-agent", TrustTier::High);
    let (merchant, merchant_wallet) =
        services.create_merchant("dev_demo", "GPU Rentals Inc", Some("compute"));

    services
        .fund_wallet(&agent_wallet.wallet_id, dec!(1000), "USDC")
        .expect("funding");

    info("Agent", &agent.agent_id);
    info("Merchant", &merchant.merchant_id);
    success("Agent funded with 1000 USDC through a ledger deposit");

    let rows = [
        ("Agent", agent_wallet.wallet_id.as_str(), BLUE),
        ("Merchant", merchant_wallet.wallet_id.as_str(), MAGENTA),
        ("Fee pool", config::FEE_POOL_WALLET_ID, GREEN),
    ];
    balances(&services, &rows);

    // -----------------------------------------------------------------------
    // Step 2: Policy-gated payment with fee
    // -----------------------------------------------------------------------

    section(2, "Payment: agent pays merchant 25.00 (flat 0.10 fee)");

    let t = Instant::now();
    let result = services.orchestrator.pay_merchant(
        &agent.agent_id,
        &merchant.merchant_id,
        dec!(25),
        "USDC",
        Some("8x A100 for 2 hours"),
    );
    let pay_time = t.elapsed();

    let tx = result.transaction.expect("payment should succeed");
    info("Payment id", &tx.tx_id);
    info("Ledger tx", tx.ledger_tx_id.as_deref().unwrap_or("-"));
    info("Elapsed", &format!("{:.2} ms", pay_time.as_secs_f64() * 1000.0));
    success("DEBIT 25.10 / CREDIT 25.00 / FEE 0.10 committed atomically");
    balances(&services, &rows);

    // -----------------------------------------------------------------------
    // Step 3: Hold, partial capture
    // -----------------------------------------------------------------------

    section(3, "Pre-authorization: hold 200, capture 150, remainder released");

    let hold = services
        .orchestrator
        .create_hold(HoldRequest::new(&agent.agent_id, &merchant.merchant_id, dec!(200)))
        .hold
        .expect("hold should succeed");
    info("Hold id", &hold.hold_id);
    info(
        "Available after hold",
        &services
            .ledger
            .get_available_balance(&agent_wallet.wallet_id, "USDC")
            .to_string(),
    );

    let capture = services
        .orchestrator
        .capture_hold(&hold.hold_id, Some(dec!(150)), None);
    assert!(capture.success);
    success("Captured 150 of 200; the uncaptured 50 is released, held = 0");
    balances(&services, &rows);

    // -----------------------------------------------------------------------
    // Step 4: Refund, bounded by the original
    // -----------------------------------------------------------------------

    section(4, "Refund: 10.00 back, cumulative refunds bounded");

    let refund = services.orchestrator.refund(&tx.tx_id, Some(dec!(10)), Some("SLA credit"));
    assert!(refund.success);
    let over = services.orchestrator.refund(&tx.tx_id, Some(dec!(100)), None);
    assert!(!over.success);
    info(
        "Refundable remainder",
        &services
            .orchestrator
            .refundable_amount(&tx.tx_id)
            .unwrap_or_default()
            .to_string(),
    );
    success("Second refund of 100 rejected: cumulative would exceed the original 25");
    balances(&services, &rows);

    // -----------------------------------------------------------------------
    // Step 5: Webhook signing
    // -----------------------------------------------------------------------

    section(5, "Webhook signing: HMAC-SHA256 over the exact body");

    let sub = services.webhooks.register(
        "dev_demo",
        "https://example.test/hooks/sardis",
        vec![],
    );
    let payload = r#"{"id":"evt_demo","type":"payment.completed"}"#;
    let sig = signature::sign(payload, &sub.secret);
    info("Subscription", &sub.subscription_id);
    info("Signature", &sig[..32.min(sig.len())]);
    assert!(signature::verify(payload, &sig, &sub.secret));
    assert!(!signature::verify(payload, &sig, "whsec_wrong"));
    success("Signature verifies under the subscription secret and nothing else");

    // -----------------------------------------------------------------------
    // Step 6: Checkpoint + integrity walk
    // -----------------------------------------------------------------------

    section(6, "Audit: checkpoint snapshot and hash-chain verification");

    let checkpoint = services.ledger.create_checkpoint();
    info("Checkpoint", &checkpoint.checkpoint_id);
    info("Last sequence", &checkpoint.last_sequence_number.to_string());
    info("Entries", &checkpoint.entries_count.to_string());
    assert!(checkpoint.verify());

    let t = Instant::now();
    services
        .ledger
        .verify_integrity()
        .expect("chain must verify");
    info(
        "Integrity walk",
        &format!("{:.2} ms", t.elapsed().as_secs_f64() * 1000.0),
    );
    success("Every entry checksum recomputed and chained back to genesis");

    println!();
    println!(
        "  {BOLD}{GREEN}Demo complete in {:.2}s{RESET}",
        demo_start.elapsed().as_secs_f64()
    );
    println!();
}
