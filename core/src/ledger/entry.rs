//! # Ledger Entries
//!
//! The atomic unit of the ledger. Every balance-affecting operation is
//! recorded as one or more entries, hash-chained in commit order:
//!
//! ```text
//! checksum_n = SHA-256(prev_checksum ‖ type ‖ wallet ‖ amount ‖ currency ‖ seq)
//! ```
//!
//! with the literal string `"genesis"` seeding the chain. Once committed,
//! an entry is immutable — the only permitted annotation is flipping its
//! status to `Void`, which is deliberately excluded from the checksum
//! preimage so the chain stays verifiable after hold lifecycle updates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EntryType
// ---------------------------------------------------------------------------

/// What an entry does to its wallet.
///
/// `Debit` reduces the balance; `Credit`, `Refund` and `Fee` increase it.
/// `Hold` and `Release` move the reservation (held) amount only — they
/// never touch the balance itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
    Fee,
    Refund,
    Hold,
    Release,
}

impl EntryType {
    /// Stable string tag, used in checksum preimages and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "debit",
            EntryType::Credit => "credit",
            EntryType::Fee => "fee",
            EntryType::Refund => "refund",
            EntryType::Hold => "hold",
            EntryType::Release => "release",
        }
    }

    /// Signed contribution of an entry of this type to its wallet balance.
    pub fn balance_delta(&self, amount: Decimal) -> Decimal {
        match self {
            EntryType::Debit => -amount,
            EntryType::Credit | EntryType::Refund | EntryType::Fee => amount,
            EntryType::Hold | EntryType::Release => Decimal::ZERO,
        }
    }

    /// Signed contribution to the wallet's held (reserved) amount.
    pub fn held_delta(&self, amount: Decimal) -> Decimal {
        match self {
            EntryType::Hold => amount,
            EntryType::Release => -amount,
            _ => Decimal::ZERO,
        }
    }

    /// Returns `true` for entry types that add to a balance.
    pub fn is_credit(&self) -> bool {
        matches!(self, EntryType::Credit | EntryType::Refund | EntryType::Fee)
    }
}

// ---------------------------------------------------------------------------
// EntryStatus
// ---------------------------------------------------------------------------

/// Commit status. `Void` is an annotation applied to consumed or cancelled
/// HOLD entries; it never rewrites committed content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Void,
}

// ---------------------------------------------------------------------------
// LedgerEntry
// ---------------------------------------------------------------------------

/// One hash-chained ledger entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id (`ent_<uuid>`), assigned at staging time.
    pub entry_id: String,

    /// Monotone commit position. Zero until the entry is committed.
    pub sequence_number: u64,

    pub entry_type: EntryType,

    /// Wallet whose balance (or held amount) this entry affects.
    pub wallet_id: String,

    /// Always positive; the sign comes from `entry_type`.
    pub amount: Decimal,

    pub currency: String,

    /// The opposite leg of a double-entry pair (debit ↔ credit).
    pub counterpart_entry_id: Option<String>,

    /// Orchestrator-level payment transaction this entry belongs to.
    pub payment_tx_id: Option<String>,

    pub status: EntryStatus,

    pub description: Option<String>,

    /// Checksum of the previous committed entry (`"genesis"` for the first).
    pub previous_checksum: String,

    /// This entry's own checksum. Set at commit.
    pub checksum: String,

    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Stages a new entry. Sequence and checksums are assigned by the
    /// engine's commit protocol, never by callers.
    pub fn stage(
        entry_type: EntryType,
        wallet_id: &str,
        amount: Decimal,
        currency: &str,
        description: Option<String>,
    ) -> Self {
        Self {
            entry_id: format!("ent_{}", Uuid::new_v4().simple()),
            sequence_number: 0,
            entry_type,
            wallet_id: wallet_id.to_string(),
            amount,
            currency: currency.to_string(),
            counterpart_entry_id: None,
            payment_tx_id: None,
            status: EntryStatus::Pending,
            description,
            previous_checksum: String::new(),
            checksum: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Signed contribution to the wallet balance.
    pub fn balance_delta(&self) -> Decimal {
        self.entry_type.balance_delta(self.amount)
    }

    /// Recomputes the checksum from the entry's committed content.
    ///
    /// The preimage deliberately excludes `status` (annotations must not
    /// invalidate the chain) and `description` (free text is not part of
    /// the monetary record).
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.previous_checksum.as_bytes());
        hasher.update(self.entry_type.as_str().as_bytes());
        hasher.update(self.wallet_id.as_bytes());
        hasher.update(self.amount.normalize().to_string().as_bytes());
        hasher.update(self.currency.as_bytes());
        hasher.update(self.sequence_number.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_deltas_by_type() {
        let a = dec!(10);
        assert_eq!(EntryType::Debit.balance_delta(a), dec!(-10));
        assert_eq!(EntryType::Credit.balance_delta(a), dec!(10));
        assert_eq!(EntryType::Refund.balance_delta(a), dec!(10));
        assert_eq!(EntryType::Fee.balance_delta(a), dec!(10));
        assert_eq!(EntryType::Hold.balance_delta(a), dec!(0));
        assert_eq!(EntryType::Release.balance_delta(a), dec!(0));
    }

    #[test]
    fn held_deltas_by_type() {
        let a = dec!(10);
        assert_eq!(EntryType::Hold.held_delta(a), dec!(10));
        assert_eq!(EntryType::Release.held_delta(a), dec!(-10));
        assert_eq!(EntryType::Debit.held_delta(a), dec!(0));
    }

    #[test]
    fn checksum_is_deterministic() {
        let mut e = LedgerEntry::stage(EntryType::Debit, "wlt_1", dec!(25.10), "USDC", None);
        e.sequence_number = 7;
        e.previous_checksum = "genesis".into();
        assert_eq!(e.compute_checksum(), e.compute_checksum());
    }

    #[test]
    fn checksum_covers_monetary_fields() {
        let mut e = LedgerEntry::stage(EntryType::Debit, "wlt_1", dec!(25.10), "USDC", None);
        e.sequence_number = 7;
        e.previous_checksum = "genesis".into();
        let base = e.compute_checksum();

        let mut tampered = e.clone();
        tampered.amount = dec!(25.11);
        assert_ne!(tampered.compute_checksum(), base);

        let mut tampered = e.clone();
        tampered.wallet_id = "wlt_2".into();
        assert_ne!(tampered.compute_checksum(), base);

        let mut tampered = e.clone();
        tampered.sequence_number = 8;
        assert_ne!(tampered.compute_checksum(), base);
    }

    #[test]
    fn checksum_ignores_status_annotation() {
        let mut e = LedgerEntry::stage(EntryType::Hold, "wlt_1", dec!(50), "USDC", None);
        e.sequence_number = 3;
        e.previous_checksum = "abc".into();
        let committed = e.compute_checksum();

        e.status = EntryStatus::Void;
        assert_eq!(e.compute_checksum(), committed);
    }

    #[test]
    fn trailing_zeros_do_not_change_checksum() {
        // 25.10 and 25.100 are the same monetary value; normalization in
        // the preimage keeps the chain stable across representations.
        let mut a = LedgerEntry::stage(EntryType::Credit, "wlt_1", dec!(25.10), "USDC", None);
        a.sequence_number = 1;
        a.previous_checksum = "genesis".into();

        let mut b = a.clone();
        b.amount = dec!(25.100);
        assert_eq!(a.compute_checksum(), b.compute_checksum());
    }
}
