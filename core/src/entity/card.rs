//! # Virtual Cards
//!
//! A [`VirtualCard`] is a payment identity attached to a wallet: a
//! synthesized 16-digit PAN with a valid Luhn check digit, an expiry, and
//! its own spending caps layered on top of the wallet's. The card never
//! holds funds — it is a view onto the wallet plus local limits and
//! pending-authorization accounting.
//!
//! ## State Machine
//!
//! ```text
//!    ┌─────────┐  suspend   ┌────────────┐
//!    │ Active   │──────────►│ Suspended  │
//!    │          │◄──────────│            │
//!    └──┬───┬──┘  resume    └─────┬──────┘
//!       │   │                      │
//! cancel│   │expire         cancel │
//!       ▼   ▼                      ▼
//!  ┌─────────┐              ┌───────────┐
//!  │Cancelled │              │ Cancelled │   (terminal)
//!  └─────────┘              └───────────┘
//! ```
//!
//! `Cancelled` and `Expired` are terminal. The PAN is synthesized locally;
//! in production the full number would live in an HSM-backed vault and only
//! the masked form would cross this boundary.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from card lifecycle and authorization checks.
#[derive(Debug, Error)]
pub enum CardError {
    /// Operation attempted on a card in a terminal or unsuitable state.
    #[error("card {card_id} is {status:?}, cannot {operation}")]
    InvalidState {
        card_id: String,
        status: CardStatus,
        operation: &'static str,
    },

    /// Amount exceeds the card's per-transaction cap.
    #[error("amount {amount} exceeds card per-transaction limit {limit}")]
    PerTxLimit { amount: Decimal, limit: Decimal },

    /// Amount would exceed the card's daily cap.
    #[error("amount {amount} would exceed card daily limit {limit} (spent today: {spent})")]
    DailyLimit {
        amount: Decimal,
        limit: Decimal,
        spent: Decimal,
    },
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Card lifecycle status. `Cancelled` and `Expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl CardStatus {
    /// Returns `true` if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CardStatus::Cancelled | CardStatus::Expired)
    }
}

// ---------------------------------------------------------------------------
// PAN synthesis
// ---------------------------------------------------------------------------

/// Computes the Luhn check digit for a partial card number.
pub fn luhn_check_digit(partial: &str) -> u32 {
    let digits: Vec<u32> = partial.chars().filter_map(|c| c.to_digit(10)).collect();

    let mut checksum = 0u32;
    // Walking right-to-left over the partial number: the check digit will
    // occupy the rightmost position, so the last partial digit is doubled.
    for (i, d) in digits.iter().rev().enumerate() {
        if i % 2 == 0 {
            let doubled = d * 2;
            checksum += doubled / 10 + doubled % 10;
        } else {
            checksum += d;
        }
    }
    (10 - (checksum % 10)) % 10
}

/// Validates a full card number against its Luhn check digit.
pub fn luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let (partial, check) = number.split_at(number.len() - 1);
    check.chars().next().and_then(|c| c.to_digit(10)) == Some(luhn_check_digit(partial))
}

/// Synthesizes a 16-digit card number in the Sardis BIN range with a valid
/// Luhn check digit.
fn generate_card_number() -> String {
    let mut rng = rand::thread_rng();
    let mut partial = String::with_capacity(16);
    partial.push_str(config::CARD_BIN);
    for _ in 0..9 {
        partial.push((b'0' + rng.gen_range(0..10u8)) as char);
    }
    let check = luhn_check_digit(&partial);
    format!("{partial}{check}")
}

/// Masks a PAN down to its last four digits.
pub fn mask_card_number(number: &str) -> String {
    let last4 = &number[number.len().saturating_sub(4)..];
    format!("**** **** **** {last4}")
}

fn generate_cvv() -> String {
    format!("{:03}", rand::thread_rng().gen_range(0..1000))
}

// ---------------------------------------------------------------------------
// VirtualCard
// ---------------------------------------------------------------------------

/// A virtual payment card bound to a wallet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirtualCard {
    /// Unique card id (`card_<uuid>`).
    pub card_id: String,

    /// The wallet this card draws on.
    pub wallet_id: String,

    /// Full 16-digit PAN. Luhn-valid, Sardis BIN.
    pub card_number: String,

    /// Display form: `**** **** **** 1234`.
    pub masked_number: String,

    /// 3-digit verification code.
    pub cvv: String,

    /// Expiry month (1-12).
    pub expiry_month: u32,

    /// Expiry year (four digits).
    pub expiry_year: i32,

    /// Current lifecycle status.
    pub status: CardStatus,

    /// Per-transaction cap, on top of the wallet's own caps.
    pub limit_per_tx: Decimal,

    /// Daily cap.
    pub limit_daily: Decimal,

    /// Running spend against the daily cap. Reset is the caller's concern
    /// (the orchestrator resets it lazily alongside policy windows).
    pub spent_today: Decimal,

    /// Sum of outstanding (uncaptured) authorizations against this card.
    pub pending_authorizations: Decimal,

    /// Count of authorizations ever placed on this card.
    pub authorization_count: u64,

    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl VirtualCard {
    /// Issues a new active card for a wallet with the given caps.
    pub fn issue(wallet_id: &str, limit_per_tx: Decimal, limit_daily: Decimal) -> Self {
        let now = Utc::now();
        let card_number = generate_card_number();
        let masked_number = mask_card_number(&card_number);
        Self {
            card_id: format!("card_{}", Uuid::new_v4().simple()),
            wallet_id: wallet_id.to_string(),
            card_number,
            masked_number,
            cvv: generate_cvv(),
            expiry_month: now.month(),
            expiry_year: now.year() + config::CARD_VALIDITY_YEARS,
            status: CardStatus::Active,
            limit_per_tx,
            limit_daily,
            spent_today: Decimal::ZERO,
            pending_authorizations: Decimal::ZERO,
            authorization_count: 0,
            created_at: now,
            last_used_at: None,
        }
    }

    /// Returns `true` if the card is past its expiry month.
    pub fn is_expired_by_date(&self, now: DateTime<Utc>) -> bool {
        (now.year(), now.month()) > (self.expiry_year, self.expiry_month)
    }

    /// Checks whether `amount` can be authorized on this card right now.
    ///
    /// Does not mutate anything — call [`record_authorization`](Self::record_authorization)
    /// after the hold is placed.
    pub fn can_authorize(&self, amount: Decimal, now: DateTime<Utc>) -> Result<(), CardError> {
        if self.status != CardStatus::Active {
            return Err(CardError::InvalidState {
                card_id: self.card_id.clone(),
                status: self.status,
                operation: "authorize",
            });
        }
        if self.is_expired_by_date(now) {
            return Err(CardError::InvalidState {
                card_id: self.card_id.clone(),
                status: CardStatus::Expired,
                operation: "authorize",
            });
        }
        if amount > self.limit_per_tx {
            return Err(CardError::PerTxLimit {
                amount,
                limit: self.limit_per_tx,
            });
        }
        if self.spent_today + amount > self.limit_daily {
            return Err(CardError::DailyLimit {
                amount,
                limit: self.limit_daily,
                spent: self.spent_today,
            });
        }
        Ok(())
    }

    /// Records a placed authorization against the card's local accounting.
    pub fn record_authorization(&mut self, amount: Decimal) {
        self.pending_authorizations += amount;
        self.authorization_count += 1;
        self.last_used_at = Some(Utc::now());
    }

    /// Settles an authorization: removes `hold_amount` from pending and
    /// counts `captured` against the daily spend.
    pub fn settle_authorization(&mut self, hold_amount: Decimal, captured: Decimal) {
        self.pending_authorizations = (self.pending_authorizations - hold_amount).max(Decimal::ZERO);
        self.spent_today += captured;
        self.last_used_at = Some(Utc::now());
    }

    /// Suspends an active card.
    pub fn suspend(&mut self) -> Result<(), CardError> {
        match self.status {
            CardStatus::Active => {
                self.status = CardStatus::Suspended;
                Ok(())
            }
            status => Err(CardError::InvalidState {
                card_id: self.card_id.clone(),
                status,
                operation: "suspend",
            }),
        }
    }

    /// Resumes a suspended card.
    pub fn resume(&mut self) -> Result<(), CardError> {
        match self.status {
            CardStatus::Suspended => {
                self.status = CardStatus::Active;
                Ok(())
            }
            status => Err(CardError::InvalidState {
                card_id: self.card_id.clone(),
                status,
                operation: "resume",
            }),
        }
    }

    /// Cancels the card permanently.
    pub fn cancel(&mut self) -> Result<(), CardError> {
        if self.status.is_terminal() {
            return Err(CardError::InvalidState {
                card_id: self.card_id.clone(),
                status: self.status,
                operation: "cancel",
            });
        }
        self.status = CardStatus::Cancelled;
        Ok(())
    }

    /// Marks the card expired. Terminal.
    pub fn expire(&mut self) {
        if !self.status.is_terminal() {
            self.status = CardStatus::Expired;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
