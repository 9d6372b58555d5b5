//! # Ledger Engine
//!
//! Append-only, hash-chained, double-entry ledger with atomic commits.
//!
//! ## Commit Protocol
//!
//! Every mutation runs inside a single engine-level critical section that
//! covers the full three-step commit for each staged entry:
//!
//! 1. assign `sequence_number = last_sequence + 1`
//! 2. set `previous_checksum = chain tip`
//! 3. compute and set the entry's own checksum
//!
//! then appends to the log and updates the balance/held caches. Staging is
//! all-or-nothing: balance checks and the conservation check happen before
//! the first entry is committed, so a partially applied transaction cannot
//! exist.
//!
//! ## Conservation
//!
//! For `transfer`, `refund` and `capture` transactions the signed balance
//! deltas must sum to zero per currency. `deposit` is exempt (money enters
//! the system), and `hold`/`void` only move reservations. A conservation
//! failure after the balance checks passed is an internal invariant
//! violation, reported as [`LedgerError::Unbalanced`] and logged.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::config;

use super::checkpoint::Checkpoint;
use super::entry::{EntryStatus, EntryType, LedgerEntry};
use super::transaction::{LedgerTransaction, TransactionKind};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by ledger operations. All failures leave state unchanged.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Non-positive amount or negative fee.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Available balance cannot cover the requested movement.
    #[error("insufficient balance: have {available}, need {needed}")]
    InsufficientBalance { available: Decimal, needed: Decimal },

    /// No transaction under the given id.
    #[error("ledger transaction {0} not found")]
    TransactionNotFound(String),

    /// The referenced transaction is not a hold.
    #[error("transaction {0} is not a hold")]
    NotAHold(String),

    /// The hold was already captured or voided.
    #[error("hold {0} is no longer active")]
    HoldNotActive(String),

    /// Capture amount exceeds the held amount.
    #[error("capture amount {requested} exceeds hold amount {held}")]
    CaptureExceedsHold { requested: Decimal, held: Decimal },

    /// Cumulative refunds would exceed the original credit.
    #[error("refund amount {requested} exceeds refundable remainder {available}")]
    RefundExceedsOriginal {
        requested: Decimal,
        available: Decimal,
    },

    /// The original transaction has no transfer legs to reverse.
    #[error("transaction {0} has no refundable transfer legs")]
    NotRefundable(String),

    /// Internal invariant violation: staged entries do not conserve value.
    #[error("unbalanced transaction: residual {residual} in {currency}")]
    Unbalanced { currency: String, residual: Decimal },
}

/// A detected break in the hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    /// Sequence number where the walk failed.
    pub sequence_number: u64,
    pub entry_id: String,
    pub reason: String,
}

/// Audit proof: a replayed balance with the entries that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceProof {
    pub wallet_id: String,
    pub currency: String,
    pub balance: Decimal,
    pub as_of_sequence: u64,
    pub contributing_entries: Vec<String>,
}

// ---------------------------------------------------------------------------
// Interior state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    /// Append-only entry log, ordered by sequence number.
    entries: Vec<LedgerEntry>,

    /// entry_id → index into `entries`.
    entry_index: HashMap<String, usize>,

    /// Transaction index.
    transactions: HashMap<String, LedgerTransaction>,

    /// Last assigned sequence number.
    sequence: u64,

    /// Chain tip checksum.
    last_checksum: String,

    /// wallet_id → currency → balance.
    balances: HashMap<String, HashMap<String, Decimal>>,

    /// wallet_id → currency → held amount.
    holds: HashMap<String, HashMap<String, Decimal>>,

    /// original ledger tx id → cumulative refunded amount.
    refunded: HashMap<String, Decimal>,

    checkpoints: Vec<Checkpoint>,
}

impl LedgerState {
    fn balance(&self, wallet_id: &str, currency: &str) -> Decimal {
        self.balances
            .get(wallet_id)
            .and_then(|c| c.get(currency))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn held(&self, wallet_id: &str, currency: &str) -> Decimal {
        self.holds
            .get(wallet_id)
            .and_then(|c| c.get(currency))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn available(&self, wallet_id: &str, currency: &str) -> Decimal {
        self.balance(wallet_id, currency) - self.held(wallet_id, currency)
    }

    /// Commits one staged entry: three-step protocol, append, cache update.
    fn commit(&mut self, mut entry: LedgerEntry, tx: &mut LedgerTransaction) {
        self.sequence += 1;
        entry.sequence_number = self.sequence;
        entry.previous_checksum = self.last_checksum.clone();
        entry.checksum = entry.compute_checksum();
        entry.status = EntryStatus::Confirmed;
        self.last_checksum = entry.checksum.clone();

        let delta = entry.balance_delta();
        if !delta.is_zero() {
            *self
                .balances
                .entry(entry.wallet_id.clone())
                .or_default()
                .entry(entry.currency.clone())
                .or_insert(Decimal::ZERO) += delta;
        }
        let held = entry.entry_type.held_delta(entry.amount);
        if !held.is_zero() {
            *self
                .holds
                .entry(entry.wallet_id.clone())
                .or_default()
                .entry(entry.currency.clone())
                .or_insert(Decimal::ZERO) += held;
        }

        tx.entry_ids.push(entry.entry_id.clone());
        self.entry_index
            .insert(entry.entry_id.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Verifies the per-currency zero-sum invariant over staged entries.
    fn check_balanced(entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let mut residuals: HashMap<&str, Decimal> = HashMap::new();
        for e in entries {
            *residuals.entry(e.currency.as_str()).or_insert(Decimal::ZERO) += e.balance_delta();
        }
        for (currency, residual) in residuals {
            if !residual.is_zero() {
                return Err(LedgerError::Unbalanced {
                    currency: currency.to_string(),
                    residual,
                });
            }
        }
        Ok(())
    }

    /// Commits a group of staged entries as one transaction. Transaction
    /// kinds that require conservation are checked before the first entry
    /// is committed; a violation aborts with nothing appended.
    fn commit_transaction(
        &mut self,
        mut tx: LedgerTransaction,
        staged: Vec<LedgerEntry>,
    ) -> Result<LedgerTransaction, LedgerError> {
        if tx.kind.requires_balance() {
            Self::check_balanced(&staged)?;
        }
        for entry in staged {
            self.commit(entry, &mut tx);
        }
        tx.confirm();
        self.transactions
            .insert(tx.transaction_id.clone(), tx.clone());
        Ok(tx)
    }
}

// ---------------------------------------------------------------------------
// LedgerEngine
// ---------------------------------------------------------------------------

/// The append-only double-entry ledger. Cheap to share (`Arc`), internally
/// synchronized; all operations take `&self`.
#[derive(Debug)]
pub struct LedgerEngine {
    inner: Mutex<LedgerState>,
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerState {
                last_checksum: config::GENESIS_CHECKSUM.to_string(),
                ..Default::default()
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Funding
    // -----------------------------------------------------------------------

    /// Credits external funds to a wallet.
    ///
    /// This is the only way money enters the system: a single CREDIT entry
    /// in a `deposit` transaction, exempt from the zero-sum check but fully
    /// part of the hash chain.
    pub fn deposit(
        &self,
        wallet_id: &str,
        amount: Decimal,
        currency: &str,
        description: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "deposit amount must be positive, got {amount}"
            )));
        }

        let mut state = self.inner.lock();
        let tx = LedgerTransaction::new(
            TransactionKind::Deposit,
            description.map(str::to_string).or_else(|| {
                Some(format!("Deposit to {wallet_id}"))
            }),
        );
        let credit = LedgerEntry::stage(EntryType::Credit, wallet_id, amount, currency, None);
        state.commit_transaction(tx, vec![credit])
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    /// Executes a double-entry transfer: DEBIT `amount + fee` on `from`,
    /// CREDIT `amount` on `to`, and (if `fee > 0`) FEE on `fee_wallet`.
    /// The debit and credit legs reference each other as counterparts.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &self,
        from_wallet_id: &str,
        to_wallet_id: &str,
        amount: Decimal,
        currency: &str,
        fee: Decimal,
        fee_wallet_id: &str,
        description: Option<&str>,
        payment_tx_id: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut state = self.inner.lock();
        Self::transfer_locked(
            &mut state,
            from_wallet_id,
            to_wallet_id,
            amount,
            currency,
            fee,
            fee_wallet_id,
            description,
            payment_tx_id,
            TransactionKind::Transfer,
            Vec::new(),
        )
    }

    /// Transfer body, callable while already holding the engine lock so
    /// capture can release + transfer atomically. `prefix_entries` are
    /// committed before the transfer legs, inside the same transaction.
    #[allow(clippy::too_many_arguments)]
    fn transfer_locked(
        state: &mut LedgerState,
        from_wallet_id: &str,
        to_wallet_id: &str,
        amount: Decimal,
        currency: &str,
        fee: Decimal,
        fee_wallet_id: &str,
        description: Option<&str>,
        payment_tx_id: Option<&str>,
        kind: TransactionKind,
        prefix_entries: Vec<LedgerEntry>,
    ) -> Result<LedgerTransaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }
        if fee < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "fee cannot be negative, got {fee}"
            )));
        }

        let total_debit = amount + fee;
        // Prefix entries (hold releases) free up availability before the
        // balance check runs.
        let released: Decimal = prefix_entries
            .iter()
            .map(|e| -e.entry_type.held_delta(e.amount))
            .sum();
        let available = state.available(from_wallet_id, currency) + released;
        if available < total_debit {
            return Err(LedgerError::InsufficientBalance {
                available,
                needed: total_debit,
            });
        }

        let mut tx = LedgerTransaction::new(kind, description.map(str::to_string));
        tx.payment_tx_id = payment_tx_id.map(str::to_string);

        let mut debit = LedgerEntry::stage(
            EntryType::Debit,
            from_wallet_id,
            total_debit,
            currency,
            Some(format!("Transfer to {to_wallet_id}")),
        );
        let mut credit = LedgerEntry::stage(
            EntryType::Credit,
            to_wallet_id,
            amount,
            currency,
            Some(format!("Transfer from {from_wallet_id}")),
        );
        debit.counterpart_entry_id = Some(credit.entry_id.clone());
        credit.counterpart_entry_id = Some(debit.entry_id.clone());
        debit.payment_tx_id = payment_tx_id.map(str::to_string);
        credit.payment_tx_id = payment_tx_id.map(str::to_string);

        let mut staged = prefix_entries;
        staged.push(debit);
        staged.push(credit);

        if fee > Decimal::ZERO {
            let fee_entry = LedgerEntry::stage(
                EntryType::Fee,
                fee_wallet_id,
                fee,
                currency,
                Some(format!("Fee for {}", tx.transaction_id)),
            );
            staged.push(fee_entry);
        }

        let transaction_id = tx.transaction_id.clone();
        state.commit_transaction(tx, staged).map_err(|e| {
            tracing::error!(
                transaction_id = %transaction_id,
                kind = kind.as_str(),
                from = from_wallet_id,
                to = to_wallet_id,
                %amount,
                %fee,
                "conservation check failed, transaction aborted"
            );
            e
        })
    }

    // -----------------------------------------------------------------------
    // Refund
    // -----------------------------------------------------------------------

    /// Reverses a confirmed transfer, fully or partially. The refund amount
    /// defaults to the original credit and is bounded by the un-refunded
    /// remainder across all prior refunds of the same transaction.
    pub fn refund(
        &self,
        original_tx_id: &str,
        amount: Option<Decimal>,
        description: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut state = self.inner.lock();

        let (from_wallet, to_wallet, currency, original_amount) = {
            let original = state
                .transactions
                .get(original_tx_id)
                .ok_or_else(|| LedgerError::TransactionNotFound(original_tx_id.to_string()))?;

            // Reverse the credit leg back onto the original sender.
            let credit = original
                .entry_ids
                .iter()
                .filter_map(|id| state.entry_index.get(id).map(|&i| &state.entries[i]))
                .find(|e| e.entry_type == EntryType::Credit);
            let debit = original
                .entry_ids
                .iter()
                .filter_map(|id| state.entry_index.get(id).map(|&i| &state.entries[i]))
                .find(|e| e.entry_type == EntryType::Debit);

            match (credit, debit) {
                (Some(c), Some(d)) => (
                    c.wallet_id.clone(),
                    d.wallet_id.clone(),
                    c.currency.clone(),
                    c.amount,
                ),
                _ => return Err(LedgerError::NotRefundable(original_tx_id.to_string())),
            }
        };

        let already = state
            .refunded
            .get(original_tx_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let refundable = original_amount - already;
        let refund_amount = amount.unwrap_or(refundable);

        if refund_amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "refund amount must be positive, got {refund_amount}"
            )));
        }
        if refund_amount > refundable {
            return Err(LedgerError::RefundExceedsOriginal {
                requested: refund_amount,
                available: refundable,
            });
        }

        // The refund source (original recipient) must cover it; the engine
        // never forces a balance negative.
        let available = state.available(&from_wallet, &currency);
        if available < refund_amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                needed: refund_amount,
            });
        }

        let tx = LedgerTransaction::new(
            TransactionKind::Refund,
            Some(
                description
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Refund of {original_tx_id}")),
            ),
        );

        let mut debit = LedgerEntry::stage(
            EntryType::Debit,
            &from_wallet,
            refund_amount,
            &currency,
            Some(format!("Refund debit for {original_tx_id}")),
        );
        let mut refund_credit = LedgerEntry::stage(
            EntryType::Refund,
            &to_wallet,
            refund_amount,
            &currency,
            Some(format!("Refund credit for {original_tx_id}")),
        );
        debit.counterpart_entry_id = Some(refund_credit.entry_id.clone());
        refund_credit.counterpart_entry_id = Some(debit.entry_id.clone());

        let staged = vec![debit, refund_credit];
        let committed = state.commit_transaction(tx, staged)?;
        *state
            .refunded
            .entry(original_tx_id.to_string())
            .or_insert(Decimal::ZERO) += refund_amount;

        Ok(committed)
    }

    /// Cumulative amount refunded against a transaction.
    pub fn refunded_total(&self, tx_id: &str) -> Decimal {
        self.inner
            .lock()
            .refunded
            .get(tx_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    // -----------------------------------------------------------------------
    // Holds
    // -----------------------------------------------------------------------

    /// Reserves funds without debiting them. The HOLD entry is the
    /// authoritative record; the held-amount cache is a derived view.
    pub fn create_hold(
        &self,
        wallet_id: &str,
        amount: Decimal,
        currency: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<LedgerTransaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "hold amount must be positive, got {amount}"
            )));
        }

        let mut state = self.inner.lock();
        let available = state.available(wallet_id, currency);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                needed: amount,
            });
        }

        let mut tx = LedgerTransaction::new(TransactionKind::Hold, None);
        tx.expires_at = expires_at;
        let hold = LedgerEntry::stage(EntryType::Hold, wallet_id, amount, currency, None);
        state.commit_transaction(tx, vec![hold])
    }

    /// Captures a hold: releases the full reservation, then transfers
    /// `amount` (defaulting to the hold amount) to `to_wallet_id` inside
    /// the same committed transaction. The uncaptured remainder is simply
    /// released.
    pub fn capture_hold(
        &self,
        hold_tx_id: &str,
        to_wallet_id: &str,
        amount: Option<Decimal>,
        fee: Decimal,
        fee_wallet_id: &str,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut state = self.inner.lock();

        let (hold_entry_id, hold_wallet, hold_amount, currency) =
            Self::resolve_active_hold(&state, hold_tx_id)?;

        let capture_amount = amount.unwrap_or(hold_amount);
        if capture_amount > hold_amount {
            return Err(LedgerError::CaptureExceedsHold {
                requested: capture_amount,
                held: hold_amount,
            });
        }

        let release = LedgerEntry::stage(
            EntryType::Release,
            &hold_wallet,
            hold_amount,
            &currency,
            Some(format!("Release of hold {hold_tx_id}")),
        );

        let description = format!("Capture of hold {hold_tx_id}");
        let tx = Self::transfer_locked(
            &mut state,
            &hold_wallet,
            to_wallet_id,
            capture_amount,
            &currency,
            fee,
            fee_wallet_id,
            Some(description.as_str()),
            None,
            TransactionKind::Capture,
            vec![release],
        )?;

        // Annotate the consumed HOLD entry. Status is outside the checksum
        // preimage, so the chain stays valid.
        let hold_idx = state.entry_index.get(&hold_entry_id).copied();
        if let Some(idx) = hold_idx {
            state.entries[idx].status = EntryStatus::Void;
        }

        Ok(tx)
    }

    /// Voids a hold: emits a RELEASE entry and annotates the HOLD entry.
    pub fn void_hold(&self, hold_tx_id: &str) -> Result<LedgerTransaction, LedgerError> {
        let mut state = self.inner.lock();

        let (hold_entry_id, hold_wallet, hold_amount, currency) =
            Self::resolve_active_hold(&state, hold_tx_id)?;

        let tx = LedgerTransaction::new(
            TransactionKind::Void,
            Some(format!("Void of hold {hold_tx_id}")),
        );
        let release = LedgerEntry::stage(
            EntryType::Release,
            &hold_wallet,
            hold_amount,
            &currency,
            Some(format!("Release of hold {hold_tx_id}")),
        );
        let tx = state.commit_transaction(tx, vec![release])?;

        let hold_idx = state.entry_index.get(&hold_entry_id).copied();
        if let Some(idx) = hold_idx {
            state.entries[idx].status = EntryStatus::Void;
        }

        Ok(tx)
    }

    /// Looks up a hold transaction and returns its live HOLD entry fields.
    fn resolve_active_hold(
        state: &LedgerState,
        hold_tx_id: &str,
    ) -> Result<(String, String, Decimal, String), LedgerError> {
        let tx = state
            .transactions
            .get(hold_tx_id)
            .ok_or_else(|| LedgerError::TransactionNotFound(hold_tx_id.to_string()))?;
        if tx.kind != TransactionKind::Hold {
            return Err(LedgerError::NotAHold(hold_tx_id.to_string()));
        }
        let entry = tx
            .entry_ids
            .first()
            .and_then(|id| state.entry_index.get(id))
            .map(|&i| &state.entries[i])
            .ok_or_else(|| LedgerError::TransactionNotFound(hold_tx_id.to_string()))?;
        if entry.status == EntryStatus::Void {
            return Err(LedgerError::HoldNotActive(hold_tx_id.to_string()));
        }
        Ok((
            entry.entry_id.clone(),
            entry.wallet_id.clone(),
            entry.amount,
            entry.currency.clone(),
        ))
    }

    // -----------------------------------------------------------------------
    // Balance queries
    // -----------------------------------------------------------------------

    /// Total balance, including held funds.
    pub fn get_balance(&self, wallet_id: &str, currency: &str) -> Decimal {
        self.inner.lock().balance(wallet_id, currency)
    }

    /// Sum of active reservations.
    pub fn get_held_amount(&self, wallet_id: &str, currency: &str) -> Decimal {
        self.inner.lock().held(wallet_id, currency)
    }

    /// `balance − held`.
    pub fn get_available_balance(&self, wallet_id: &str, currency: &str) -> Decimal {
        self.inner.lock().available(wallet_id, currency)
    }

    /// All currency balances for a wallet.
    pub fn get_all_balances(&self, wallet_id: &str) -> HashMap<String, Decimal> {
        self.inner
            .lock()
            .balances
            .get(wallet_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replays the entry log for one wallet+currency and returns the
    /// balance with its contributing entry ids. Must always agree with the
    /// cache — that agreement is the audit contract.
    pub fn balance_proof(&self, wallet_id: &str, currency: &str) -> BalanceProof {
        let state = self.inner.lock();
        let mut balance = Decimal::ZERO;
        let mut contributing = Vec::new();
        for e in &state.entries {
            if e.wallet_id == wallet_id && e.currency == currency {
                balance += e.balance_delta();
                contributing.push(e.entry_id.clone());
            }
        }
        BalanceProof {
            wallet_id: wallet_id.to_string(),
            currency: currency.to_string(),
            balance,
            as_of_sequence: state.sequence,
            contributing_entries: contributing,
        }
    }

    // -----------------------------------------------------------------------
    // Log queries
    // -----------------------------------------------------------------------

    pub fn get_transaction(&self, tx_id: &str) -> Option<LedgerTransaction> {
        self.inner.lock().transactions.get(tx_id).cloned()
    }

    /// Entries touching a wallet, newest first by sequence number.
    pub fn get_entries_for_wallet(
        &self,
        wallet_id: &str,
        limit: usize,
        offset: usize,
    ) -> Vec<LedgerEntry> {
        let state = self.inner.lock();
        state
            .entries
            .iter()
            .rev()
            .filter(|e| e.wallet_id == wallet_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// All entries with a sequence number strictly greater than `sequence`.
    pub fn get_entries_since(&self, sequence: u64) -> Vec<LedgerEntry> {
        let state = self.inner.lock();
        state
            .entries
            .iter()
            .filter(|e| e.sequence_number > sequence)
            .cloned()
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    // -----------------------------------------------------------------------
    // Checkpoints & integrity
    // -----------------------------------------------------------------------

    /// Snapshots current balances, the chain tip, and the volume moved
    /// since the previous checkpoint.
    pub fn create_checkpoint(&self) -> Checkpoint {
        let mut state = self.inner.lock();

        let (period_start, since_sequence) = state
            .checkpoints
            .last()
            .map(|c| (Some(c.period_end), c.last_sequence_number))
            .unwrap_or((None, 0));

        let total_volume: Decimal = state
            .entries
            .iter()
            .filter(|e| e.sequence_number > since_sequence && e.entry_type.is_credit())
            .map(|e| e.amount)
            .sum();

        let mut wallet_balances: BTreeMap<String, BTreeMap<String, Decimal>> = BTreeMap::new();
        for (wallet, currencies) in &state.balances {
            let inner: BTreeMap<String, Decimal> =
                currencies.iter().map(|(c, b)| (c.clone(), *b)).collect();
            wallet_balances.insert(wallet.clone(), inner);
        }

        let checkpoint = Checkpoint::new(
            period_start,
            state.sequence,
            state.last_checksum.clone(),
            wallet_balances,
            state.entries.len(),
            total_volume,
        );
        state.checkpoints.push(checkpoint.clone());
        checkpoint
    }

    pub fn latest_checkpoint(&self) -> Option<Checkpoint> {
        self.inner.lock().checkpoints.last().cloned()
    }

    /// Walks the entire entry log, recomputing every checksum against the
    /// chain. Returns the first break found.
    pub fn verify_integrity(&self) -> Result<(), IntegrityViolation> {
        let state = self.inner.lock();
        let mut expected_prev = config::GENESIS_CHECKSUM.to_string();
        let mut expected_seq = 0u64;

        for entry in &state.entries {
            expected_seq += 1;
            if entry.sequence_number != expected_seq {
                return Err(IntegrityViolation {
                    sequence_number: entry.sequence_number,
                    entry_id: entry.entry_id.clone(),
                    reason: format!(
                        "sequence gap: expected {expected_seq}, found {}",
                        entry.sequence_number
                    ),
                });
            }
            if entry.previous_checksum != expected_prev {
                return Err(IntegrityViolation {
                    sequence_number: entry.sequence_number,
                    entry_id: entry.entry_id.clone(),
                    reason: "checksum chain broken".to_string(),
                });
            }
            let computed = entry.compute_checksum();
            if computed != entry.checksum {
                return Err(IntegrityViolation {
                    sequence_number: entry.sequence_number,
                    entry_id: entry.entry_id.clone(),
                    reason: "entry checksum mismatch".to_string(),
                });
            }
            expected_prev = entry.checksum.clone();
        }
        Ok(())
    }

    /// Test/audit hook: returns a clone of the full entry log.
    pub fn all_entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().entries.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
