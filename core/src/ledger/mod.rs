//! # Ledger Module
//!
//! The source of truth for money. An append-only, hash-chained entry log
//! with double-entry transfers, reservation holds, bounded refunds,
//! periodic checkpoints and an explicit integrity walk. Everything above
//! this module (policy, risk, orchestration) is advisory; the ledger's
//! balance check is the only authoritative guard against over-spend.

pub mod checkpoint;
pub mod engine;
pub mod entry;
pub mod transaction;

pub use checkpoint::Checkpoint;
pub use engine::{BalanceProof, IntegrityViolation, LedgerEngine, LedgerError};
pub use entry::{EntryStatus, EntryType, LedgerEntry};
pub use transaction::{LedgerTransaction, LedgerTxStatus, TransactionKind};
