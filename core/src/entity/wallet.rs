//! # Wallets
//!
//! A [`Wallet`] is the spending envelope for a single principal (agent or
//! merchant). It carries the caps and counters that bound spending — but
//! NOT the money: monetary balances live exclusively in the ledger engine
//! and are queried from there. Keeping the wallet free of balance fields
//! means there is exactly one source of truth to reconcile.
//!
//! `spent_total` is the one mutable counter here. It is advisory — the
//! ledger's own balance check is the authoritative guard — and it is the
//! only value that ever decreases during normal operation (when a hold
//! reservation is released).
//!
//! The [`WalletRegistry`] is a concurrent map; individual wallet mutations
//! go through its methods so call sites never hold a map guard longer than
//! one operation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::card::VirtualCard;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from wallet-level spending checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    /// The wallet has been deactivated.
    #[error("wallet {0} is inactive")]
    Inactive(String),

    /// Ledger balance cannot cover amount + fee.
    #[error("insufficient balance: have {available}, need {needed}")]
    InsufficientBalance { available: Decimal, needed: Decimal },

    /// Amount exceeds the wallet's per-transaction cap.
    #[error("amount {amount} exceeds per-transaction limit {limit}")]
    PerTxLimit { amount: Decimal, limit: Decimal },

    /// Amount would push `spent_total` past the lifetime cap.
    #[error("amount {amount} exceeds remaining lifetime limit {remaining}")]
    TotalLimit { amount: Decimal, remaining: Decimal },

    /// No wallet registered under the given id.
    #[error("wallet {0} not found")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Spending envelope for one principal. Monetary balances are ledger-side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet id (`wlt_<uuid>`).
    pub wallet_id: String,

    /// Owning principal (agent or merchant) id.
    pub owner_id: String,

    /// Primary currency for fee estimation and display.
    pub currency: String,

    /// Per-transaction spending cap.
    pub limit_per_tx: Decimal,

    /// Lifetime spending cap.
    pub limit_total: Decimal,

    /// Running lifetime spend plus active reservations. Monotone except
    /// when a reservation is released.
    pub spent_total: Decimal,

    /// Deactivated wallets reject all outgoing spends.
    pub is_active: bool,

    /// Optional virtual card payment identity.
    pub virtual_card: Option<VirtualCard>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an active wallet with the given caps.
    pub fn new(owner_id: &str, currency: &str, limit_per_tx: Decimal, limit_total: Decimal) -> Self {
        let now = Utc::now();
        Self {
            wallet_id: format!("wlt_{}", Uuid::new_v4().simple()),
            owner_id: owner_id.to_string(),
            currency: currency.to_string(),
            limit_per_tx,
            limit_total,
            spent_total: Decimal::ZERO,
            is_active: true,
            virtual_card: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a wallet with a fixed id. Used for system wallets (fee pool)
    /// whose ids are part of the configuration surface.
    pub fn with_id(wallet_id: &str, owner_id: &str, currency: &str) -> Self {
        let mut w = Self::new(owner_id, currency, Decimal::MAX, Decimal::MAX);
        w.wallet_id = wallet_id.to_string();
        w
    }

    /// Remaining headroom under the lifetime cap.
    pub fn remaining_limit(&self) -> Decimal {
        (self.limit_total - self.spent_total).max(Decimal::ZERO)
    }

    /// Checks whether `amount + fee` may be spent given the live available
    /// balance from the ledger. This is the wallet-level recheck the
    /// orchestrator runs between policy approval and ledger commit.
    pub fn can_spend(
        &self,
        amount: Decimal,
        fee: Decimal,
        available: Decimal,
    ) -> Result<(), WalletError> {
        if !self.is_active {
            return Err(WalletError::Inactive(self.wallet_id.clone()));
        }
        let needed = amount + fee;
        if needed > available {
            return Err(WalletError::InsufficientBalance { available, needed });
        }
        if amount > self.limit_per_tx {
            return Err(WalletError::PerTxLimit {
                amount,
                limit: self.limit_per_tx,
            });
        }
        let remaining = self.remaining_limit();
        if amount > remaining {
            return Err(WalletError::TotalLimit { amount, remaining });
        }
        Ok(())
    }

    /// Records a completed spend or a placed reservation.
    pub fn record_spend(&mut self, amount: Decimal) {
        self.spent_total += amount;
        self.updated_at = Utc::now();
    }

    /// Releases a reservation previously recorded with
    /// [`record_spend`](Self::record_spend). Floors at zero.
    pub fn release_reservation(&mut self, amount: Decimal) {
        self.spent_total = (self.spent_total - amount).max(Decimal::ZERO);
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// WalletRegistry
// ---------------------------------------------------------------------------

/// Concurrent wallet store. Reads return clones; mutations happen inside
/// the map so no guard escapes.
#[derive(Debug, Default)]
pub struct WalletRegistry {
    wallets: DashMap<String, Wallet>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a wallet. Returns the stored copy.
    pub fn insert(&self, wallet: Wallet) -> Wallet {
        self.wallets.insert(wallet.wallet_id.clone(), wallet.clone());
        wallet
    }

    /// Fetches a wallet by id.
    pub fn get(&self, wallet_id: &str) -> Option<Wallet> {
        self.wallets.get(wallet_id).map(|w| w.clone())
    }

    /// Returns `true` if a wallet exists under this id.
    pub fn exists(&self, wallet_id: &str) -> bool {
        self.wallets.contains_key(wallet_id)
    }

    /// Fetches the wallet owned by a principal, if any.
    pub fn get_by_owner(&self, owner_id: &str) -> Option<Wallet> {
        self.wallets
            .iter()
            .find(|w| w.owner_id == owner_id)
            .map(|w| w.clone())
    }

    /// Applies a mutation to a wallet under the map's shard lock.
    pub fn update<F>(&self, wallet_id: &str, f: F) -> Result<Wallet, WalletError>
    where
        F: FnOnce(&mut Wallet),
    {
        let mut entry = self
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    /// Soft-deletes a wallet: it stays queryable for the audit trail but
    /// rejects all outgoing spends.
    pub fn deactivate(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        self.update(wallet_id, |w| {
            w.is_active = false;
        })
    }

    /// Number of registered wallets.
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
