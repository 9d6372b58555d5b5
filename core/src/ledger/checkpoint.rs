//! # Ledger Checkpoints
//!
//! A checkpoint is a periodic snapshot of ledger state: the last sequence
//! number, the chain tip checksum, every wallet balance, and the volume
//! moved since the previous checkpoint. A valid checkpoint plus the entries
//! committed after it must reproduce the current state exactly — that is
//! the recovery contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot of ledger state at a point in the entry sequence.
///
/// Balances use ordered maps so checksum computation is deterministic
/// regardless of insertion order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint id (`ckpt_<uuid>`).
    pub checkpoint_id: String,

    /// End of the previous checkpoint's period, if any.
    pub period_start: Option<DateTime<Utc>>,

    /// When this checkpoint was taken.
    pub period_end: DateTime<Utc>,

    /// Last committed entry sequence number at snapshot time.
    pub last_sequence_number: u64,

    /// Chain tip checksum at snapshot time.
    pub last_entry_checksum: String,

    /// wallet_id → currency → balance.
    pub wallet_balances: BTreeMap<String, BTreeMap<String, Decimal>>,

    /// Total committed entries at snapshot time.
    pub entries_count: usize,

    /// Sum of credit-valued entry amounts since the previous checkpoint.
    pub total_volume: Decimal,

    /// Checksum over the snapshot content.
    pub checksum: String,
}

impl Checkpoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        period_start: Option<DateTime<Utc>>,
        last_sequence_number: u64,
        last_entry_checksum: String,
        wallet_balances: BTreeMap<String, BTreeMap<String, Decimal>>,
        entries_count: usize,
        total_volume: Decimal,
    ) -> Self {
        let mut checkpoint = Self {
            checkpoint_id: format!("ckpt_{}", Uuid::new_v4().simple()),
            period_start,
            period_end: Utc::now(),
            last_sequence_number,
            last_entry_checksum,
            wallet_balances,
            entries_count,
            total_volume,
            checksum: String::new(),
        };
        checkpoint.checksum = checkpoint.compute_checksum();
        checkpoint
    }

    /// Recomputes the checkpoint checksum from its content.
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.last_sequence_number.to_string().as_bytes());
        hasher.update(self.last_entry_checksum.as_bytes());
        hasher.update(self.entries_count.to_string().as_bytes());
        hasher.update(self.total_volume.normalize().to_string().as_bytes());
        // BTreeMap iteration is ordered, so the preimage is stable.
        for (wallet, currencies) in &self.wallet_balances {
            hasher.update(wallet.as_bytes());
            for (currency, balance) in currencies {
                hasher.update(currency.as_bytes());
                hasher.update(balance.normalize().to_string().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Returns `true` if the stored checksum matches the content.
    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balances() -> BTreeMap<String, BTreeMap<String, Decimal>> {
        let mut inner = BTreeMap::new();
        inner.insert("USDC".to_string(), dec!(100.50));
        let mut outer = BTreeMap::new();
        outer.insert("wlt_a".to_string(), inner);
        outer
    }

    #[test]
    fn checkpoint_self_verifies() {
        let c = Checkpoint::new(None, 42, "abc".into(), balances(), 42, dec!(500));
        assert!(c.verify());
    }

    #[test]
    fn tampered_balance_fails_verification() {
        let mut c = Checkpoint::new(None, 42, "abc".into(), balances(), 42, dec!(500));
        c.wallet_balances
            .get_mut("wlt_a")
            .unwrap()
            .insert("USDC".to_string(), dec!(999));
        assert!(!c.verify());
    }

    #[test]
    fn tampered_tip_fails_verification() {
        let mut c = Checkpoint::new(None, 42, "abc".into(), balances(), 42, dec!(500));
        c.last_entry_checksum = "def".into();
        assert!(!c.verify());
    }

    #[test]
    fn serde_roundtrip_preserves_checksum() {
        let c = Checkpoint::new(None, 7, "tip".into(), balances(), 7, dec!(10));
        let json = serde_json::to_string(&c).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert!(back.verify());
        assert_eq!(back.checksum, c.checksum);
    }
}
