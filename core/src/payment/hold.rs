//! # Payment Holds
//!
//! A hold reserves funds against a future capture without debiting them.
//! The ledger HOLD entry is the authoritative reservation; this record
//! tracks the merchant-facing lifecycle around it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hold lifecycle. `Captured`, `Voided` and `Expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Captured,
    Voided,
    Expired,
}

/// A pre-authorization hold.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentHold {
    /// Unique hold id (`hold_<uuid>`).
    pub hold_id: String,

    pub agent_id: String,
    pub wallet_id: String,
    pub merchant_id: String,

    pub amount: Decimal,
    pub currency: String,

    pub status: HoldStatus,

    pub purpose: Option<String>,

    /// The ledger hold transaction backing this reservation.
    pub ledger_hold_tx_id: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub captured_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,

    /// The payment that captured this hold.
    pub capture_tx_id: Option<String>,
}

impl PaymentHold {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: &str,
        wallet_id: &str,
        merchant_id: &str,
        amount: Decimal,
        currency: &str,
        purpose: Option<&str>,
        ledger_hold_tx_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hold_id: format!("hold_{}", Uuid::new_v4().simple()),
            agent_id: agent_id.to_string(),
            wallet_id: wallet_id.to_string(),
            merchant_id: merchant_id.to_string(),
            amount,
            currency: currency.to_string(),
            status: HoldStatus::Active,
            purpose: purpose.map(str::to_string),
            ledger_hold_tx_id: ledger_hold_tx_id.to_string(),
            created_at: Utc::now(),
            expires_at,
            captured_at: None,
            voided_at: None,
            capture_tx_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn new_hold_is_active() {
        let h = PaymentHold::new(
            "ent_a",
            "wlt_a",
            "mch_m",
            dec!(50),
            "USDC",
            Some("gpu rental"),
            "ltx_1",
            Utc::now() + Duration::hours(168),
        );
        assert!(h.hold_id.starts_with("hold_"));
        assert_eq!(h.status, HoldStatus::Active);
        assert!(!h.is_expired(Utc::now()));
    }

    #[test]
    fn expiry_check() {
        let h = PaymentHold::new(
            "ent_a",
            "wlt_a",
            "mch_m",
            dec!(50),
            "USDC",
            None,
            "ltx_1",
            Utc::now() - Duration::seconds(1),
        );
        assert!(h.is_expired(Utc::now()));
    }
}
