//! # Ledger Transactions
//!
//! A ledger transaction is a named group of entries representing one
//! logical operation. The transaction record stores entry IDs, not the
//! entries themselves — entries live in the engine's append-only log and
//! are looked up by id (arena-plus-ids, no owning back-pointers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TransactionKind
// ---------------------------------------------------------------------------

/// The logical operation a transaction performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Standard double-entry transfer (debit / credit / optional fee).
    Transfer,
    /// Reverse transfer against a previously confirmed transaction.
    Refund,
    /// Funds reservation (single HOLD entry).
    Hold,
    /// Hold cancellation (RELEASE entry).
    Void,
    /// Hold completion (RELEASE entry + transfer legs).
    Capture,
    /// External funding entering the system (single CREDIT entry).
    Deposit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Refund => "refund",
            TransactionKind::Hold => "hold",
            TransactionKind::Void => "void",
            TransactionKind::Capture => "capture",
            TransactionKind::Deposit => "deposit",
        }
    }

    /// Whether the per-currency zero-sum conservation check applies.
    ///
    /// Deposits are how money enters the system; holds and voids only move
    /// reservations. Everything else must balance exactly.
    pub fn requires_balance(&self) -> bool {
        matches!(
            self,
            TransactionKind::Transfer | TransactionKind::Refund | TransactionKind::Capture
        )
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxStatus {
    Pending,
    Confirmed,
}

// ---------------------------------------------------------------------------
// LedgerTransaction
// ---------------------------------------------------------------------------

/// Index record for one committed group of entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction id (`ltx_<uuid>`).
    pub transaction_id: String,

    pub kind: TransactionKind,

    /// Entry ids in commit order. The entries themselves are in the log.
    pub entry_ids: Vec<String>,

    /// Orchestrator-level payment transaction, when applicable.
    pub payment_tx_id: Option<String>,

    /// For holds: when the reservation lapses.
    pub expires_at: Option<DateTime<Utc>>,

    pub status: LedgerTxStatus,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(kind: TransactionKind, description: Option<String>) -> Self {
        Self {
            transaction_id: format!("ltx_{}", Uuid::new_v4().simple()),
            kind,
            entry_ids: Vec::new(),
            payment_tx_id: None,
            expires_at: None,
            status: LedgerTxStatus::Pending,
            description,
            created_at: Utc::now(),
        }
    }

    pub fn confirm(&mut self) {
        self.status = LedgerTxStatus::Confirmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_requiring_conservation() {
        assert!(TransactionKind::Transfer.requires_balance());
        assert!(TransactionKind::Refund.requires_balance());
        assert!(TransactionKind::Capture.requires_balance());
        assert!(!TransactionKind::Hold.requires_balance());
        assert!(!TransactionKind::Void.requires_balance());
        assert!(!TransactionKind::Deposit.requires_balance());
    }

    #[test]
    fn new_transaction_is_pending() {
        let tx = LedgerTransaction::new(TransactionKind::Transfer, None);
        assert!(tx.transaction_id.starts_with("ltx_"));
        assert_eq!(tx.status, LedgerTxStatus::Pending);
        assert!(tx.entry_ids.is_empty());
    }
}
