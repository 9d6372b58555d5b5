//! # Platform Configuration & Constants
//!
//! Every magic number in Sardis lives here. Fee defaults, risk thresholds,
//! retry schedules, window durations — if a constant governs money movement,
//! this is where it is declared and documented.
//!
//! Values that operators are expected to tune at runtime (fee schedules,
//! risk rule weights) have configuration structs in their own modules; the
//! constants here are their defaults.

use rust_decimal::Decimal;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Identity & Versioning
// ---------------------------------------------------------------------------

/// API version tag stamped on every webhook event envelope.
/// Bump only with a migration plan — subscribers pin their parsers to this.
pub const API_VERSION: &str = "2024-01";

/// Default settlement currency. All fee defaults are denominated in it.
pub const DEFAULT_CURRENCY: &str = "USDC";

/// Wallet that accumulates transaction fees. Created at startup by the
/// services context; the ledger itself treats it as an ordinary wallet.
pub const FEE_POOL_WALLET_ID: &str = "sardis_fee_pool";

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Default flat fee per transaction, in the transaction currency.
/// 10 cents. Flat because agent payments are small and frequent; a
/// percentage model punishes exactly the traffic we want.
pub fn default_flat_fee() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Seed value for the entry hash chain. The first committed entry's
/// `previous_checksum` is this literal string.
pub const GENESIS_CHECKSUM: &str = "genesis";

/// Default page size for entry queries.
pub const DEFAULT_ENTRY_PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Holds & Idempotency
// ---------------------------------------------------------------------------

/// Default pre-authorization hold lifetime: 7 days.
pub const HOLD_EXPIRATION_HOURS: i64 = 168;

/// Idempotency cache TTL. A replayed `pay` call within this window returns
/// the cached result byte-for-byte; after it, the key is forgotten.
pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Risk Engine
// ---------------------------------------------------------------------------

/// Final score at or above which the pipeline denies outright.
pub const RISK_BLOCK_THRESHOLD: f64 = 90.0;

/// Final score at or above which the pipeline flags for review.
pub const RISK_REVIEW_THRESHOLD: f64 = 50.0;

/// Default rule weights. Velocity and failure patterns are the strongest
/// fraud signals we have, so they carry more weight than reputation.
pub const VELOCITY_RULE_WEIGHT: f64 = 1.5;
pub const AMOUNT_RULE_WEIGHT: f64 = 1.2;
pub const MERCHANT_RULE_WEIGHT: f64 = 1.0;
pub const BEHAVIOR_RULE_WEIGHT: f64 = 1.0;
pub const FAILURE_RULE_WEIGHT: f64 = 1.3;

// ---------------------------------------------------------------------------
// Policy Windows
// ---------------------------------------------------------------------------

/// Daily spending window duration.
pub const WINDOW_DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Weekly spending window duration.
pub const WINDOW_WEEKLY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Monthly spending window duration. 30 days flat — calendar months make
/// limit accounting unpredictable for subscribers.
pub const WINDOW_MONTHLY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// Total delivery attempts per queued event (first try + retries).
pub const WEBHOOK_MAX_ATTEMPTS: usize = 3;

/// Fixed backoff between delivery attempts. Index = attempt number.
pub const WEBHOOK_RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(5)];

/// Backoff for any attempt past the tabulated schedule. With three total
/// attempts there are two gaps; operators raising the attempt count get
/// the documented 30 s tail.
pub const WEBHOOK_FINAL_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Per-attempt HTTP POST timeout.
pub const WEBHOOK_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Signature header. Value format: `sha256=<hex hmac>`.
pub const HEADER_SIGNATURE: &str = "X-Sardis-Signature";
pub const HEADER_EVENT_TYPE: &str = "X-Sardis-Event-Type";
pub const HEADER_EVENT_ID: &str = "X-Sardis-Event-Id";
pub const HEADER_TIMESTAMP: &str = "X-Sardis-Timestamp";

// ---------------------------------------------------------------------------
// Virtual Cards
// ---------------------------------------------------------------------------

/// Sardis BIN prefix for synthesized card numbers (fictional range).
pub const CARD_BIN: &str = "489031";

/// Card validity in years from issuance.
pub const CARD_VALIDITY_YEARS: i32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_schedule_is_documented_shape() {
        // The delivery contract promises 1s, 5s, 30s between attempts.
        assert_eq!(WEBHOOK_RETRY_DELAYS[0], Duration::from_secs(1));
        assert_eq!(WEBHOOK_RETRY_DELAYS[1], Duration::from_secs(5));
        assert_eq!(WEBHOOK_FINAL_RETRY_DELAY, Duration::from_secs(30));
        assert_eq!(WEBHOOK_MAX_ATTEMPTS, 3);
    }

    #[test]
    fn thresholds_are_ordered() {
        assert!(RISK_REVIEW_THRESHOLD < RISK_BLOCK_THRESHOLD);
    }

    #[test]
    fn windows_are_ordered() {
        assert!(WINDOW_DAILY < WINDOW_WEEKLY);
        assert!(WINDOW_WEEKLY < WINDOW_MONTHLY);
    }

    #[test]
    fn default_fee_is_ten_cents() {
        assert_eq!(default_flat_fee().to_string(), "0.10");
    }

    #[test]
    fn card_bin_is_six_digits() {
        assert_eq!(CARD_BIN.len(), 6);
        assert!(CARD_BIN.chars().all(|c| c.is_ascii_digit()));
    }
}
