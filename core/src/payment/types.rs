//! # Payment Types
//!
//! The orchestrator's result surface. Nothing here raises across the API
//! boundary: every operation returns a typed result carrying `success`
//! and, on failure, a machine-readable [`ErrorKind`] plus a human
//! message. The error kind strings are frozen — clients branch on them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::WalletError;
use crate::ledger::LedgerError;
use crate::policy::PolicyViolation;
use crate::settlement::OnChainRecord;

use super::hold::PaymentHold;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable failure category, stable across releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidAmount,
    WalletNotFound,
    MerchantNotFound,
    AgentNotFound,
    InsufficientBalance,
    PerTransactionLimit,
    TotalLimit,
    DailyLimit,
    WeeklyLimit,
    MonthlyLimit,
    MerchantSpecificLimit,
    MerchantBlocked,
    MerchantNotAllowed,
    ScopeNotAllowed,
    GoalDriftExceeded,
    RiskDenied,
    HoldNotActive,
    HoldExpired,
    CaptureExceedsHold,
    RefundExceedsOriginal,
    RefundOnNonCompleted,
    IdempotentReplay,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::WalletNotFound => "wallet_not_found",
            ErrorKind::MerchantNotFound => "merchant_not_found",
            ErrorKind::AgentNotFound => "agent_not_found",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::PerTransactionLimit => "per_transaction_limit",
            ErrorKind::TotalLimit => "total_limit",
            ErrorKind::DailyLimit => "daily_limit",
            ErrorKind::WeeklyLimit => "weekly_limit",
            ErrorKind::MonthlyLimit => "monthly_limit",
            ErrorKind::MerchantSpecificLimit => "merchant_specific_limit",
            ErrorKind::MerchantBlocked => "merchant_blocked",
            ErrorKind::MerchantNotAllowed => "merchant_not_allowed",
            ErrorKind::ScopeNotAllowed => "scope_not_allowed",
            ErrorKind::GoalDriftExceeded => "goal_drift_exceeded",
            ErrorKind::RiskDenied => "risk_denied",
            ErrorKind::HoldNotActive => "hold_not_active",
            ErrorKind::HoldExpired => "hold_expired",
            ErrorKind::CaptureExceedsHold => "capture_exceeds_hold",
            ErrorKind::RefundExceedsOriginal => "refund_exceeds_original",
            ErrorKind::RefundOnNonCompleted => "refund_on_non_completed",
            ErrorKind::IdempotentReplay => "idempotent_replay",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PolicyViolation> for ErrorKind {
    fn from(v: PolicyViolation) -> Self {
        match v {
            PolicyViolation::ScopeNotAllowed => ErrorKind::ScopeNotAllowed,
            PolicyViolation::PerTransactionLimit => ErrorKind::PerTransactionLimit,
            PolicyViolation::TotalLimit => ErrorKind::TotalLimit,
            PolicyViolation::DailyLimit => ErrorKind::DailyLimit,
            PolicyViolation::WeeklyLimit => ErrorKind::WeeklyLimit,
            PolicyViolation::MonthlyLimit => ErrorKind::MonthlyLimit,
            PolicyViolation::MerchantBlocked => ErrorKind::MerchantBlocked,
            PolicyViolation::MerchantNotAllowed => ErrorKind::MerchantNotAllowed,
            PolicyViolation::MerchantSpecificLimit => ErrorKind::MerchantSpecificLimit,
            PolicyViolation::GoalDriftExceeded => ErrorKind::GoalDriftExceeded,
        }
    }
}

impl From<&LedgerError> for ErrorKind {
    fn from(e: &LedgerError) -> Self {
        match e {
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::TransactionNotFound(_) | LedgerError::NotRefundable(_) => {
                ErrorKind::RefundOnNonCompleted
            }
            LedgerError::NotAHold(_) | LedgerError::HoldNotActive(_) => ErrorKind::HoldNotActive,
            LedgerError::CaptureExceedsHold { .. } => ErrorKind::CaptureExceedsHold,
            LedgerError::RefundExceedsOriginal { .. } => ErrorKind::RefundExceedsOriginal,
            LedgerError::Unbalanced { .. } => ErrorKind::Internal,
        }
    }
}

impl From<&WalletError> for ErrorKind {
    fn from(e: &WalletError) -> Self {
        match e {
            // A deactivated wallet is indistinguishable from a missing one
            // to the paying side; the message carries the distinction.
            WalletError::Inactive(_) | WalletError::NotFound(_) => ErrorKind::WalletNotFound,
            WalletError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            WalletError::PerTxLimit { .. } => ErrorKind::PerTransactionLimit,
            WalletError::TotalLimit { .. } => ErrorKind::TotalLimit,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Orchestrator-level payment lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    PendingApproval,
    Completed,
    Failed,
    Refunded,
}

/// One payment as the orchestrator records it. The ledger transaction id
/// links down into the entry log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique payment id (`pay_<uuid>`).
    pub tx_id: String,

    pub agent_id: String,
    pub from_wallet: String,
    pub to_wallet: String,

    /// Merchant this payment targeted, when routed by merchant id.
    pub merchant_id: Option<String>,

    pub amount: Decimal,
    pub fee: Decimal,
    pub currency: String,

    pub status: TransactionStatus,

    pub purpose: Option<String>,

    /// The committed ledger transaction backing this payment.
    pub ledger_tx_id: Option<String>,

    /// Running total of refunds issued against this payment.
    pub refunded_amount: Decimal,

    /// External settlement mirror, if a driver is configured.
    pub on_chain_records: Vec<OnChainRecord>,
    pub is_settled_on_chain: bool,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: &str,
        from_wallet: &str,
        to_wallet: &str,
        merchant_id: Option<&str>,
        amount: Decimal,
        fee: Decimal,
        currency: &str,
        purpose: Option<&str>,
    ) -> Self {
        Self {
            tx_id: format!("pay_{}", Uuid::new_v4().simple()),
            agent_id: agent_id.to_string(),
            from_wallet: from_wallet.to_string(),
            to_wallet: to_wallet.to_string(),
            merchant_id: merchant_id.map(str::to_string),
            amount,
            fee,
            currency: currency.to_string(),
            status: TransactionStatus::Pending,
            purpose: purpose.map(str::to_string),
            ledger_tx_id: None,
            refunded_amount: Decimal::ZERO,
            on_chain_records: Vec::new(),
            is_settled_on_chain: false,
            created_at: Utc::now(),
        }
    }

    /// Appends a settlement record and refreshes the settled flag.
    pub fn add_on_chain_record(&mut self, record: OnChainRecord) {
        self.is_settled_on_chain |= record.is_confirmed();
        self.on_chain_records.push(record);
    }

    /// Amount still refundable.
    pub fn refundable_amount(&self) -> Decimal {
        (self.amount - self.refunded_amount).max(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of a `pay` / `capture_hold` operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction: Option<Transaction>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
    /// Set when the payment parked in `PENDING_APPROVAL`.
    pub approval_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl PaymentResult {
    pub fn succeeded(transaction: Transaction, idempotency_key: Option<String>) -> Self {
        Self {
            success: true,
            transaction: Some(transaction),
            error: None,
            message: None,
            approval_id: None,
            idempotency_key,
        }
    }

    pub fn failed(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: None,
            error: Some(error),
            message: Some(message.into()),
            approval_id: None,
            idempotency_key: None,
        }
    }

    /// Parked for human approval. Not a success, not an error.
    pub fn pending_approval(transaction: Transaction, approval_id: String) -> Self {
        Self {
            success: false,
            transaction: Some(transaction),
            error: None,
            message: Some("payment requires human approval".to_string()),
            approval_id: Some(approval_id),
            idempotency_key: None,
        }
    }
}

/// Result of hold creation / voiding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HoldResult {
    pub success: bool,
    pub hold: Option<PaymentHold>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl HoldResult {
    pub fn succeeded(hold: PaymentHold) -> Self {
        Self {
            success: true,
            hold: Some(hold),
            error: None,
            message: None,
        }
    }

    pub fn failed(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            hold: None,
            error: Some(error),
            message: Some(message.into()),
        }
    }
}

/// Result of a refund operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundResult {
    pub success: bool,
    pub refund_id: Option<String>,
    pub original_tx_id: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl RefundResult {
    pub fn succeeded(original_tx_id: &str, amount: Decimal, currency: &str) -> Self {
        Self {
            success: true,
            refund_id: Some(format!("ref_{}", Uuid::new_v4().simple())),
            original_tx_id: Some(original_tx_id.to_string()),
            amount: Some(amount),
            currency: Some(currency.to_string()),
            error: None,
            message: None,
        }
    }

    pub fn failed(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            refund_id: None,
            original_tx_id: None,
            amount: None,
            currency: None,
            error: Some(error),
            message: Some(message.into()),
        }
    }
}

/// Fee quote for a prospective payment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentEstimate {
    pub amount: Decimal,
    pub fee: Decimal,
    pub total: Decimal,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SettlementStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn error_kind_strings_are_stable() {
        assert_eq!(ErrorKind::InsufficientBalance.as_str(), "insufficient_balance");
        assert_eq!(ErrorKind::PerTransactionLimit.as_str(), "per_transaction_limit");
        assert_eq!(ErrorKind::RiskDenied.as_str(), "risk_denied");
        assert_eq!(ErrorKind::RefundExceedsOriginal.as_str(), "refund_exceeds_original");
        assert_eq!(ErrorKind::IdempotentReplay.as_str(), "idempotent_replay");
    }

    #[test]
    fn error_kind_serializes_as_tag() {
        let json = serde_json::to_string(&ErrorKind::MerchantBlocked).unwrap();
        assert_eq!(json, "\"merchant_blocked\"");
    }

    #[test]
    fn policy_violation_mapping() {
        assert_eq!(
            ErrorKind::from(PolicyViolation::DailyLimit),
            ErrorKind::DailyLimit
        );
        assert_eq!(
            ErrorKind::from(PolicyViolation::MerchantBlocked),
            ErrorKind::MerchantBlocked
        );
    }

    #[test]
    fn transaction_refundable_math() {
        let mut tx = Transaction::new(
            "ent_a", "wlt_a", "wlt_b", None, dec!(100), dec!(0.10), "USDC", None,
        );
        assert_eq!(tx.refundable_amount(), dec!(100));
        tx.refunded_amount = dec!(40);
        assert_eq!(tx.refundable_amount(), dec!(60));
    }

    #[test]
    fn settlement_record_flips_flag_only_when_confirmed() {
        let mut tx = Transaction::new(
            "ent_a", "wlt_a", "wlt_b", None, dec!(10), dec!(0), "USDC", None,
        );
        tx.add_on_chain_record(OnChainRecord {
            chain: "base".into(),
            tx_hash: "0xabc".into(),
            status: SettlementStatus::Pending,
            explorer_url: None,
            recorded_at: Utc::now(),
        });
        assert!(!tx.is_settled_on_chain);

        tx.add_on_chain_record(OnChainRecord {
            chain: "base".into(),
            tx_hash: "0xabc".into(),
            status: SettlementStatus::Confirmed,
            explorer_url: None,
            recorded_at: Utc::now(),
        });
        assert!(tx.is_settled_on_chain);
        assert_eq!(tx.on_chain_records.len(), 2);
    }

    #[test]
    fn pending_approval_is_not_success() {
        let tx = Transaction::new(
            "ent_a", "wlt_a", "wlt_b", None, dec!(900), dec!(0), "USDC", None,
        );
        let result = PaymentResult::pending_approval(tx, "appr_1".into());
        assert!(!result.success);
        assert!(result.error.is_none());
        assert!(result.approval_id.is_some());
    }
}
