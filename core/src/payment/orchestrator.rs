//! # Payment Orchestrator
//!
//! The single entry point for moving money. Every payment walks the same
//! gauntlet: idempotency lookup, validation, fee pricing, spending-policy
//! evaluation, risk-rule pipeline, a wallet-level recheck against the
//! live balance snapshot, and finally the ledger transfer. Bookkeeping
//! (policy counters, risk profiles, idempotency cache) happens only after
//! the ledger commit confirms; a failed payment leaves every piece of
//! state untouched.
//!
//! The orchestrator is synchronous — ledger and policy work is pure
//! computation. The only asynchronous edges are webhook emission (which
//! just enqueues) and the optional settlement driver (fire-and-forget on
//! the runtime, never affecting the payment result).

use chrono::{Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::config;
use crate::entity::{Merchant, PrincipalRegistry, WalletRegistry};
use crate::ledger::{LedgerEngine, LedgerError};
use crate::policy::{PolicyDecision, PolicyStore, SpendCheck, SpendingScope};
use crate::risk::{RiskDecision, RiskEngine};
use crate::settlement::{SettlementDriver, SettlementRequest};
use crate::webhook::{Event, EventType, WebhookManager};

use super::fees::{FeePricer, FlatFeeSchedule};
use super::hold::{HoldStatus, PaymentHold};
use super::types::{
    ErrorKind, HoldResult, PaymentEstimate, PaymentResult, RefundResult, Transaction,
    TransactionStatus,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A payment submission.
#[derive(Clone, Debug)]
pub struct PayRequest {
    pub agent_id: String,
    pub amount: Decimal,
    pub recipient_wallet_id: String,
    pub currency: String,
    pub purpose: Option<String>,
    pub idempotency_key: Option<String>,
    pub scope: SpendingScope,
    pub drift_score: Option<Decimal>,
}

impl PayRequest {
    pub fn new(agent_id: &str, amount: Decimal, recipient_wallet_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            amount,
            recipient_wallet_id: recipient_wallet_id.to_string(),
            currency: config::DEFAULT_CURRENCY.to_string(),
            purpose: None,
            idempotency_key: None,
            scope: SpendingScope::All,
            drift_score: None,
        }
    }

    pub fn with_purpose(mut self, purpose: &str) -> Self {
        self.purpose = Some(purpose.to_string());
        self
    }

    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    pub fn with_scope(mut self, scope: SpendingScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_drift_score(mut self, score: Decimal) -> Self {
        self.drift_score = Some(score);
        self
    }
}

/// A pre-authorization request.
#[derive(Clone, Debug)]
pub struct HoldRequest {
    pub agent_id: String,
    pub merchant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub purpose: Option<String>,
    pub expiration_hours: Option<i64>,
}

impl HoldRequest {
    pub fn new(agent_id: &str, merchant_id: &str, amount: Decimal) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            merchant_id: merchant_id.to_string(),
            amount,
            currency: config::DEFAULT_CURRENCY.to_string(),
            purpose: None,
            expiration_hours: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates ledger, policy, risk and events for every payment flow.
pub struct PaymentOrchestrator {
    ledger: Arc<LedgerEngine>,
    wallets: Arc<WalletRegistry>,
    principals: Arc<PrincipalRegistry>,
    policies: Arc<PolicyStore>,
    risk: Arc<RiskEngine>,
    webhooks: Arc<WebhookManager>,
    fee_pricer: Arc<dyn FeePricer>,
    settlement: Option<Arc<dyn SettlementDriver>>,

    transactions: Arc<DashMap<String, Transaction>>,
    holds: DashMap<String, PaymentHold>,
    idempotency: DashMap<String, (PaymentResult, chrono::DateTime<Utc>)>,
}

impl PaymentOrchestrator {
    pub fn new(
        ledger: Arc<LedgerEngine>,
        wallets: Arc<WalletRegistry>,
        principals: Arc<PrincipalRegistry>,
        policies: Arc<PolicyStore>,
        risk: Arc<RiskEngine>,
        webhooks: Arc<WebhookManager>,
    ) -> Self {
        Self {
            ledger,
            wallets,
            principals,
            policies,
            risk,
            webhooks,
            fee_pricer: Arc::new(FlatFeeSchedule::default()),
            settlement: None,
            transactions: Arc::new(DashMap::new()),
            holds: DashMap::new(),
            idempotency: DashMap::new(),
        }
    }

    pub fn with_fee_pricer(mut self, pricer: Arc<dyn FeePricer>) -> Self {
        self.fee_pricer = pricer;
        self
    }

    pub fn with_settlement_driver(mut self, driver: Arc<dyn SettlementDriver>) -> Self {
        self.settlement = Some(driver);
        self
    }

    // -----------------------------------------------------------------------
    // pay
    // -----------------------------------------------------------------------

    /// Processes a payment from an agent to a recipient wallet.
    pub fn pay(&self, request: PayRequest) -> PaymentResult {
        if let Some(key) = &request.idempotency_key {
            if let Some(cached) = self.idempotency_lookup(key) {
                tracing::info!(
                    idempotency_key = %key,
                    kind = %ErrorKind::IdempotentReplay,
                    "returning cached payment result"
                );
                return cached;
            }
        }
        self.pay_internal(request, None)
    }

    /// Resolves the merchant's wallet and pays it.
    pub fn pay_merchant(
        &self,
        agent_id: &str,
        merchant_id: &str,
        amount: Decimal,
        currency: &str,
        purpose: Option<&str>,
    ) -> PaymentResult {
        let Some(merchant) = self.principals.get_merchant(merchant_id) else {
            return PaymentResult::failed(
                ErrorKind::MerchantNotFound,
                format!("merchant {merchant_id} not found"),
            );
        };

        let mut request = PayRequest::new(agent_id, amount, &merchant.wallet_id);
        request.currency = currency.to_string();
        request.purpose = purpose
            .map(str::to_string)
            .or_else(|| Some(format!("Payment to {}", merchant.name)));
        self.pay_internal(request, Some(&merchant))
    }

    fn pay_internal(&self, request: PayRequest, merchant: Option<&Merchant>) -> PaymentResult {
        let now = Utc::now();
        let merchant_id = merchant.map(|m| m.merchant_id.as_str());
        let merchant_category = merchant.and_then(|m| m.category.as_deref());

        if request.amount <= Decimal::ZERO {
            return self.fail_payment(
                &request,
                ErrorKind::InvalidAmount,
                format!("amount must be positive, got {}", request.amount),
            );
        }

        let Some(agent) = self.principals.get_agent(&request.agent_id) else {
            return self.fail_payment(
                &request,
                ErrorKind::AgentNotFound,
                format!("agent {} not found", request.agent_id),
            );
        };
        let Some(wallet) = self.wallets.get(&agent.wallet_id) else {
            return self.fail_payment(
                &request,
                ErrorKind::WalletNotFound,
                format!("wallet not found for agent {}", request.agent_id),
            );
        };
        if !self.wallets.exists(&request.recipient_wallet_id) {
            return self.fail_payment(
                &request,
                ErrorKind::WalletNotFound,
                format!("recipient wallet {} not found", request.recipient_wallet_id),
            );
        }

        let fee = self.fee_pricer.fee(request.amount, &request.currency);

        // Policy gate. A rejection here commits nothing and updates no
        // risk state.
        let check = SpendCheck {
            amount: request.amount,
            fee,
            merchant_id,
            merchant_category,
            scope: request.scope,
            drift_score: request.drift_score,
        };
        match self.policies.evaluate(&request.agent_id, &check, now) {
            PolicyDecision::Rejected { violation, message } => {
                if violation.is_limit() {
                    self.emit(
                        EventType::LimitExceeded,
                        json!({
                            "agent_id": request.agent_id,
                            "wallet_id": wallet.wallet_id,
                            "limit_type": violation.as_str(),
                            "attempted_amount": request.amount.to_string(),
                            "currency": request.currency,
                        }),
                    );
                }
                return self.fail_payment(&request, violation.into(), message);
            }
            PolicyDecision::RequiresApproval => {
                return self.park_for_approval(&request, &wallet.wallet_id, merchant_id, fee);
            }
            PolicyDecision::Approved => {}
        }

        // Risk gate.
        let context = self.risk.build_context(
            &request.agent_id,
            &wallet.wallet_id,
            Some(wallet.created_at),
            request.amount,
            &request.currency,
            Some(&request.recipient_wallet_id),
            merchant_id,
            merchant_category,
        );
        let evaluation = self.risk.evaluate(&context);
        match evaluation.decision {
            RiskDecision::Deny => {
                self.emit(
                    EventType::RiskAlert,
                    json!({
                        "agent_id": request.agent_id,
                        "wallet_id": wallet.wallet_id,
                        "risk_score": evaluation.score,
                        "risk_factors": evaluation.factors,
                        "recommended_action": "deny",
                    }),
                );
                self.risk.record_transaction(
                    &request.agent_id,
                    request.amount,
                    Some(&request.recipient_wallet_id),
                    merchant_id,
                    merchant_category,
                    false,
                    now,
                );
                return self.fail_payment(
                    &request,
                    ErrorKind::RiskDenied,
                    format!(
                        "risk pipeline denied payment (score {:.0}, factors: {})",
                        evaluation.score,
                        evaluation.factors.join(", ")
                    ),
                );
            }
            RiskDecision::Review => {
                self.emit(
                    EventType::RiskAlert,
                    json!({
                        "agent_id": request.agent_id,
                        "wallet_id": wallet.wallet_id,
                        "risk_score": evaluation.score,
                        "risk_factors": evaluation.factors,
                        "recommended_action": "review",
                    }),
                );
                let over_threshold = self
                    .policies
                    .approval_threshold(&request.agent_id)
                    .is_some_and(|t| request.amount > t);
                if self.policies.requires_preauth(&request.agent_id) || over_threshold {
                    return self.park_for_approval(&request, &wallet.wallet_id, merchant_id, fee);
                }
            }
            RiskDecision::Approve => {}
        }

        // Wallet-level recheck on the live snapshot. Guards the window
        // between policy evaluation and ledger commit.
        let available = self
            .ledger
            .get_available_balance(&wallet.wallet_id, &request.currency);
        if let Err(e) = wallet.can_spend(request.amount, fee, available) {
            return self.fail_payment(&request, ErrorKind::from(&e), e.to_string());
        }

        // Ledger commit.
        let mut transaction = Transaction::new(
            &request.agent_id,
            &wallet.wallet_id,
            &request.recipient_wallet_id,
            merchant_id,
            request.amount,
            fee,
            &request.currency,
            request.purpose.as_deref(),
        );

        let ledger_tx = match self.ledger.transfer(
            &wallet.wallet_id,
            &request.recipient_wallet_id,
            request.amount,
            &request.currency,
            fee,
            config::FEE_POOL_WALLET_ID,
            request.purpose.as_deref(),
            Some(&transaction.tx_id),
        ) {
            Ok(tx) => tx,
            Err(e) => {
                let kind = ErrorKind::from(&e);
                if matches!(e, LedgerError::Unbalanced { .. }) {
                    tracing::error!(
                        tx_id = %transaction.tx_id,
                        error = %e,
                        "internal invariant violation during transfer"
                    );
                }
                // Balance failures are benign — they do not feed the
                // fraud counters. Only risk denials and confirmed
                // payments move risk state.
                return self.fail_payment(&request, kind, e.to_string());
            }
        };

        // Post-commit bookkeeping. From here the payment has happened;
        // counters and caches catch up.
        transaction.status = TransactionStatus::Completed;
        transaction.ledger_tx_id = Some(ledger_tx.transaction_id.clone());
        self.transactions
            .insert(transaction.tx_id.clone(), transaction.clone());

        let _ = self.wallets.update(&wallet.wallet_id, |w| {
            w.record_spend(request.amount);
        });
        self.policies
            .record_spend(&request.agent_id, request.amount, now);
        self.risk.record_transaction(
            &request.agent_id,
            request.amount,
            Some(&request.recipient_wallet_id),
            merchant_id,
            merchant_category,
            true,
            now,
        );

        let result = PaymentResult::succeeded(transaction.clone(), request.idempotency_key.clone());
        if let Some(key) = &request.idempotency_key {
            self.idempotency_store(key, &result);
        }

        self.spawn_settlement(&transaction);

        tracing::info!(
            tx_id = %transaction.tx_id,
            agent_id = %request.agent_id,
            amount = %request.amount,
            fee = %fee,
            currency = %request.currency,
            "payment completed"
        );
        self.emit(
            EventType::PaymentCompleted,
            json!({ "transaction": Self::transaction_payload(&transaction) }),
        );

        result
    }

    /// Terminal failure: emit `payment.failed`, leave all state untouched.
    fn fail_payment(
        &self,
        request: &PayRequest,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> PaymentResult {
        let message = message.into();
        tracing::info!(
            agent_id = %request.agent_id,
            amount = %request.amount,
            error = %kind,
            message = %message,
            "payment failed"
        );
        self.emit(
            EventType::PaymentFailed,
            json!({
                "agent_id": request.agent_id,
                "recipient_wallet_id": request.recipient_wallet_id,
                "amount": request.amount.to_string(),
                "currency": request.currency,
                "error": kind.as_str(),
                "message": message.as_str(),
            }),
        );
        PaymentResult::failed(kind, message)
    }

    /// Parks a payment in `PENDING_APPROVAL`. No ledger change.
    fn park_for_approval(
        &self,
        request: &PayRequest,
        wallet_id: &str,
        merchant_id: Option<&str>,
        fee: Decimal,
    ) -> PaymentResult {
        let mut transaction = Transaction::new(
            &request.agent_id,
            wallet_id,
            &request.recipient_wallet_id,
            merchant_id,
            request.amount,
            fee,
            &request.currency,
            request.purpose.as_deref(),
        );
        transaction.status = TransactionStatus::PendingApproval;
        self.transactions
            .insert(transaction.tx_id.clone(), transaction.clone());

        let approval_id = format!("appr_{}", Uuid::new_v4().simple());
        tracing::info!(
            tx_id = %transaction.tx_id,
            approval_id = %approval_id,
            amount = %request.amount,
            "payment parked for human approval"
        );
        PaymentResult::pending_approval(transaction, approval_id)
    }

    // -----------------------------------------------------------------------
    // Holds
    // -----------------------------------------------------------------------

    /// Places a pre-authorization hold on an agent's funds.
    pub fn create_hold(&self, request: HoldRequest) -> HoldResult {
        let now = Utc::now();

        if request.amount <= Decimal::ZERO {
            return HoldResult::failed(
                ErrorKind::InvalidAmount,
                format!("hold amount must be positive, got {}", request.amount),
            );
        }
        let Some(agent) = self.principals.get_agent(&request.agent_id) else {
            return HoldResult::failed(
                ErrorKind::AgentNotFound,
                format!("agent {} not found", request.agent_id),
            );
        };
        let Some(wallet) = self.wallets.get(&agent.wallet_id) else {
            return HoldResult::failed(
                ErrorKind::WalletNotFound,
                format!("wallet not found for agent {}", request.agent_id),
            );
        };
        let Some(merchant) = self.principals.get_merchant(&request.merchant_id) else {
            return HoldResult::failed(
                ErrorKind::MerchantNotFound,
                format!("merchant {} not found", request.merchant_id),
            );
        };

        // Fee is an estimate at authorization time; charged at capture.
        let fee = self.fee_pricer.fee(request.amount, &request.currency);

        let check = SpendCheck {
            amount: request.amount + fee,
            fee: Decimal::ZERO,
            merchant_id: Some(&merchant.merchant_id),
            merchant_category: merchant.category.as_deref(),
            scope: SpendingScope::All,
            drift_score: None,
        };
        if let PolicyDecision::Rejected { violation, message } =
            self.policies.evaluate(&request.agent_id, &check, now)
        {
            return HoldResult::failed(violation.into(), message);
        }

        let available = self
            .ledger
            .get_available_balance(&wallet.wallet_id, &request.currency);
        if let Err(e) = wallet.can_spend(request.amount, fee, available) {
            return HoldResult::failed(ErrorKind::from(&e), e.to_string());
        }

        let hours = request
            .expiration_hours
            .unwrap_or(config::HOLD_EXPIRATION_HOURS);
        let expires_at = now + Duration::hours(hours);

        let ledger_tx = match self.ledger.create_hold(
            &wallet.wallet_id,
            request.amount,
            &request.currency,
            Some(expires_at),
        ) {
            Ok(tx) => tx,
            Err(e) => return HoldResult::failed(ErrorKind::from(&e), e.to_string()),
        };

        // Reserve: spent_total rises by the hold amount so available
        // headroom drops; released on capture or void.
        let _ = self.wallets.update(&wallet.wallet_id, |w| {
            w.record_spend(request.amount);
            if let Some(card) = w.virtual_card.as_mut() {
                card.record_authorization(request.amount);
            }
        });

        let hold = PaymentHold::new(
            &request.agent_id,
            &wallet.wallet_id,
            &request.merchant_id,
            request.amount,
            &request.currency,
            request.purpose.as_deref(),
            &ledger_tx.transaction_id,
            expires_at,
        );
        self.holds.insert(hold.hold_id.clone(), hold.clone());

        tracing::info!(
            hold_id = %hold.hold_id,
            agent_id = %request.agent_id,
            merchant_id = %request.merchant_id,
            amount = %request.amount,
            "hold created"
        );
        self.emit(
            EventType::HoldCreated,
            json!({
                "hold_id": hold.hold_id,
                "agent_id": hold.agent_id,
                "merchant_id": hold.merchant_id,
                "amount": hold.amount.to_string(),
                "currency": hold.currency,
                "expires_at": hold.expires_at.to_rfc3339(),
            }),
        );

        HoldResult::succeeded(hold)
    }

    /// Captures a hold, transferring up to the held amount to the
    /// merchant. The uncaptured remainder is released.
    pub fn capture_hold(
        &self,
        hold_id: &str,
        amount: Option<Decimal>,
        purpose: Option<&str>,
    ) -> PaymentResult {
        let now = Utc::now();

        let Some(hold) = self.holds.get(hold_id).map(|h| h.clone()) else {
            return PaymentResult::failed(
                ErrorKind::HoldNotActive,
                format!("hold {hold_id} not found"),
            );
        };
        if hold.status != HoldStatus::Active {
            return PaymentResult::failed(
                ErrorKind::HoldNotActive,
                format!("hold {hold_id} is {:?}, cannot capture", hold.status),
            );
        }
        if hold.is_expired(now) {
            self.expire_hold(&hold);
            return PaymentResult::failed(
                ErrorKind::HoldExpired,
                format!("hold {hold_id} expired at {}", hold.expires_at),
            );
        }

        let capture_amount = amount.unwrap_or(hold.amount);
        if capture_amount > hold.amount {
            return PaymentResult::failed(
                ErrorKind::CaptureExceedsHold,
                format!(
                    "capture amount {capture_amount} exceeds hold amount {}",
                    hold.amount
                ),
            );
        }
        let Some(merchant) = self.principals.get_merchant(&hold.merchant_id) else {
            return PaymentResult::failed(
                ErrorKind::MerchantNotFound,
                format!("merchant {} not found", hold.merchant_id),
            );
        };
        let Some(wallet) = self.wallets.get(&hold.wallet_id) else {
            return PaymentResult::failed(
                ErrorKind::WalletNotFound,
                format!("wallet {} not found", hold.wallet_id),
            );
        };

        let fee = self.fee_pricer.fee(capture_amount, &hold.currency);

        // Release the reservation up front; every failure path below
        // restores it. Re-snapshot the wallet afterwards so the limit
        // recheck sees the released counter.
        let wallet = self
            .wallets
            .update(&hold.wallet_id, |w| {
                w.release_reservation(hold.amount);
            })
            .unwrap_or(wallet);
        let restore = |orchestrator: &Self| {
            let _ = orchestrator.wallets.update(&hold.wallet_id, |w| {
                w.record_spend(hold.amount);
            });
        };

        let check = SpendCheck {
            amount: capture_amount,
            fee,
            merchant_id: Some(&merchant.merchant_id),
            merchant_category: merchant.category.as_deref(),
            scope: SpendingScope::All,
            drift_score: None,
        };
        if let PolicyDecision::Rejected { violation, message } =
            self.policies.evaluate(&hold.agent_id, &check, now)
        {
            restore(self);
            return PaymentResult::failed(violation.into(), message);
        }

        let context = self.risk.build_context(
            &hold.agent_id,
            &hold.wallet_id,
            Some(wallet.created_at),
            capture_amount,
            &hold.currency,
            Some(&merchant.wallet_id),
            Some(&merchant.merchant_id),
            merchant.category.as_deref(),
        );
        let evaluation = self.risk.evaluate(&context);
        if evaluation.decision == RiskDecision::Deny {
            restore(self);
            return PaymentResult::failed(
                ErrorKind::RiskDenied,
                format!("risk pipeline denied capture (score {:.0})", evaluation.score),
            );
        }

        // The ledger releases the hold inside the capture transaction, so
        // the availability check must count the pending release.
        let available = self
            .ledger
            .get_available_balance(&hold.wallet_id, &hold.currency)
            + hold.amount;
        if let Err(e) = wallet.can_spend(capture_amount, fee, available) {
            restore(self);
            return PaymentResult::failed(ErrorKind::from(&e), e.to_string());
        }

        let mut transaction = Transaction::new(
            &hold.agent_id,
            &hold.wallet_id,
            &merchant.wallet_id,
            Some(&merchant.merchant_id),
            capture_amount,
            fee,
            &hold.currency,
            purpose.or(hold.purpose.as_deref()),
        );

        let ledger_tx = match self.ledger.capture_hold(
            &hold.ledger_hold_tx_id,
            &merchant.wallet_id,
            Some(capture_amount),
            fee,
            config::FEE_POOL_WALLET_ID,
        ) {
            Ok(tx) => tx,
            Err(e) => {
                restore(self);
                return PaymentResult::failed(ErrorKind::from(&e), e.to_string());
            }
        };

        transaction.status = TransactionStatus::Completed;
        transaction.ledger_tx_id = Some(ledger_tx.transaction_id.clone());
        self.transactions
            .insert(transaction.tx_id.clone(), transaction.clone());

        let _ = self.wallets.update(&hold.wallet_id, |w| {
            w.record_spend(capture_amount);
            if let Some(card) = w.virtual_card.as_mut() {
                card.settle_authorization(hold.amount, capture_amount);
            }
        });
        self.policies
            .record_spend(&hold.agent_id, capture_amount, now);
        self.risk.record_transaction(
            &hold.agent_id,
            capture_amount,
            Some(&merchant.wallet_id),
            Some(&merchant.merchant_id),
            merchant.category.as_deref(),
            true,
            now,
        );

        if let Some(mut stored) = self.holds.get_mut(hold_id) {
            stored.status = HoldStatus::Captured;
            stored.captured_at = Some(now);
            stored.capture_tx_id = Some(transaction.tx_id.clone());
        }

        self.spawn_settlement(&transaction);

        tracing::info!(
            hold_id = %hold_id,
            tx_id = %transaction.tx_id,
            captured = %capture_amount,
            of = %hold.amount,
            "hold captured"
        );
        self.emit(
            EventType::PaymentCompleted,
            json!({ "transaction": Self::transaction_payload(&transaction) }),
        );
        self.emit(
            EventType::HoldCaptured,
            json!({
                "hold_id": hold.hold_id,
                "agent_id": hold.agent_id,
                "merchant_id": hold.merchant_id,
                "captured_amount": capture_amount.to_string(),
                "hold_amount": hold.amount.to_string(),
                "currency": hold.currency,
                "capture_tx_id": transaction.tx_id,
            }),
        );

        PaymentResult::succeeded(transaction, None)
    }

    /// Cancels an active hold and releases the reserved funds.
    pub fn void_hold(&self, hold_id: &str) -> HoldResult {
        let now = Utc::now();

        let Some(hold) = self.holds.get(hold_id).map(|h| h.clone()) else {
            return HoldResult::failed(
                ErrorKind::HoldNotActive,
                format!("hold {hold_id} not found"),
            );
        };
        if hold.status != HoldStatus::Active {
            return HoldResult::failed(
                ErrorKind::HoldNotActive,
                format!("hold {hold_id} is {:?}, cannot void", hold.status),
            );
        }

        if let Err(e) = self.ledger.void_hold(&hold.ledger_hold_tx_id) {
            return HoldResult::failed(ErrorKind::from(&e), e.to_string());
        }

        let _ = self.wallets.update(&hold.wallet_id, |w| {
            w.release_reservation(hold.amount);
            if let Some(card) = w.virtual_card.as_mut() {
                card.settle_authorization(hold.amount, Decimal::ZERO);
            }
        });

        let mut voided = hold.clone();
        if let Some(mut stored) = self.holds.get_mut(hold_id) {
            stored.status = HoldStatus::Voided;
            stored.voided_at = Some(now);
            voided = stored.clone();
        }

        tracing::info!(hold_id = %hold_id, amount = %hold.amount, "hold voided");
        self.emit(
            EventType::HoldVoided,
            json!({
                "hold_id": hold.hold_id,
                "agent_id": hold.agent_id,
                "merchant_id": hold.merchant_id,
                "amount": hold.amount.to_string(),
                "currency": hold.currency,
            }),
        );

        HoldResult::succeeded(voided)
    }

    /// Lazily expires a hold discovered past its deadline: releases the
    /// ledger reservation and the wallet counter.
    fn expire_hold(&self, hold: &PaymentHold) {
        if let Err(e) = self.ledger.void_hold(&hold.ledger_hold_tx_id) {
            tracing::warn!(
                hold_id = %hold.hold_id,
                error = %e,
                "failed to release ledger hold on expiry"
            );
        }
        let _ = self.wallets.update(&hold.wallet_id, |w| {
            w.release_reservation(hold.amount);
            if let Some(card) = w.virtual_card.as_mut() {
                card.settle_authorization(hold.amount, Decimal::ZERO);
            }
        });
        if let Some(mut stored) = self.holds.get_mut(&hold.hold_id) {
            stored.status = HoldStatus::Expired;
        }
        tracing::info!(hold_id = %hold.hold_id, "hold expired");
    }

    pub fn get_hold(&self, hold_id: &str) -> Option<PaymentHold> {
        self.holds.get(hold_id).map(|h| h.clone())
    }

    /// Lists holds, optionally filtered.
    pub fn list_holds(
        &self,
        agent_id: Option<&str>,
        merchant_id: Option<&str>,
        status: Option<HoldStatus>,
    ) -> Vec<PaymentHold> {
        self.holds
            .iter()
            .filter(|h| agent_id.map_or(true, |a| h.agent_id == a))
            .filter(|h| merchant_id.map_or(true, |m| h.merchant_id == m))
            .filter(|h| status.map_or(true, |s| h.status == s))
            .map(|h| h.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Refunds
    // -----------------------------------------------------------------------

    /// Refunds a completed payment, fully or partially. Cumulative
    /// refunds are bounded by the original amount.
    pub fn refund(
        &self,
        tx_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> RefundResult {
        let Some(original) = self.transactions.get(tx_id).map(|t| t.clone()) else {
            return RefundResult::failed(
                ErrorKind::RefundOnNonCompleted,
                format!("transaction {tx_id} not found"),
            );
        };
        if original.status != TransactionStatus::Completed {
            return RefundResult::failed(
                ErrorKind::RefundOnNonCompleted,
                format!("cannot refund transaction in {:?} state", original.status),
            );
        }

        let refundable = original.refundable_amount();
        let refund_amount = amount.unwrap_or(refundable);
        if refund_amount <= Decimal::ZERO {
            return RefundResult::failed(
                ErrorKind::InvalidAmount,
                format!("refund amount must be positive, got {refund_amount}"),
            );
        }
        if refund_amount > refundable {
            return RefundResult::failed(
                ErrorKind::RefundExceedsOriginal,
                format!("refund amount {refund_amount} exceeds refundable {refundable}"),
            );
        }

        let Some(ledger_tx_id) = original.ledger_tx_id.as_deref() else {
            return RefundResult::failed(
                ErrorKind::Internal,
                format!("transaction {tx_id} has no ledger backing"),
            );
        };

        if let Err(e) = self.ledger.refund(ledger_tx_id, Some(refund_amount), reason) {
            return RefundResult::failed(ErrorKind::from(&e), e.to_string());
        }

        let mut fully_refunded = false;
        if let Some(mut stored) = self.transactions.get_mut(tx_id) {
            stored.refunded_amount += refund_amount;
            if stored.refunded_amount >= stored.amount {
                stored.status = TransactionStatus::Refunded;
                fully_refunded = true;
            }
        }

        if let Some(merchant_id) = &original.merchant_id {
            self.risk.record_refund(merchant_id, refund_amount);
        }

        tracing::info!(
            tx_id = %tx_id,
            amount = %refund_amount,
            fully_refunded,
            "payment refunded"
        );
        self.emit(
            EventType::PaymentRefunded,
            json!({
                "original_tx_id": tx_id,
                "refund_amount": refund_amount.to_string(),
                "currency": original.currency,
                "fully_refunded": fully_refunded,
                "reason": reason,
            }),
        );

        RefundResult::succeeded(tx_id, refund_amount, &original.currency)
    }

    /// Cumulative refunds issued against a payment.
    pub fn refund_total(&self, tx_id: &str) -> Decimal {
        self.transactions
            .get(tx_id)
            .map(|t| t.refunded_amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Amount still refundable on a payment, if it exists.
    pub fn refundable_amount(&self, tx_id: &str) -> Option<Decimal> {
        self.transactions.get(tx_id).map(|t| t.refundable_amount())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Quotes amount + fee for a prospective payment.
    pub fn estimate_payment(&self, amount: Decimal, currency: &str) -> PaymentEstimate {
        let fee = self.fee_pricer.fee(amount, currency);
        PaymentEstimate {
            amount,
            fee,
            total: amount + fee,
            currency: currency.to_string(),
        }
    }

    pub fn get_transaction(&self, tx_id: &str) -> Option<Transaction> {
        self.transactions.get(tx_id).map(|t| t.clone())
    }

    /// An agent's transactions, newest first.
    pub fn list_agent_transactions(
        &self,
        agent_id: &str,
        limit: usize,
        offset: usize,
    ) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .map(|t| t.clone())
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txs.into_iter().skip(offset).take(limit).collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn idempotency_lookup(&self, key: &str) -> Option<PaymentResult> {
        let ttl = Duration::from_std(config::IDEMPOTENCY_TTL).expect("ttl in range");
        // Clone out before any removal; holding a map guard across a
        // same-shard remove would deadlock.
        let (result, cached_at) = self.idempotency.get(key).map(|e| e.clone())?;
        if Utc::now() < cached_at + ttl {
            Some(result)
        } else {
            self.idempotency.remove(key);
            None
        }
    }

    fn idempotency_store(&self, key: &str, result: &PaymentResult) {
        self.idempotency
            .insert(key.to_string(), (result.clone(), Utc::now()));

        // Opportunistic sweep of expired entries.
        let ttl = Duration::from_std(config::IDEMPOTENCY_TTL).expect("ttl in range");
        let now = Utc::now();
        self.idempotency.retain(|_, (_, at)| now < *at + ttl);
    }

    /// Mirrors a completed transaction to the settlement rail, if one is
    /// configured. Fire-and-forget: the payment result never waits.
    fn spawn_settlement(&self, transaction: &Transaction) {
        let Some(driver) = self.settlement.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                tx_id = %transaction.tx_id,
                "no async runtime, skipping settlement submission"
            );
            return;
        };

        let request = SettlementRequest {
            internal_tx_id: transaction.tx_id.clone(),
            from_address: transaction.from_wallet.clone(),
            to_address: transaction.to_wallet.clone(),
            amount: transaction.amount,
            currency: transaction.currency.clone(),
        };
        let transactions = Arc::clone(&self.transactions);
        let tx_id = transaction.tx_id.clone();

        handle.spawn(async move {
            match driver.submit(request).await {
                Ok(record) => {
                    if let Some(mut stored) = transactions.get_mut(&tx_id) {
                        stored.add_on_chain_record(record);
                    }
                }
                Err(e) => {
                    tracing::warn!(tx_id = %tx_id, error = %e, "settlement submission failed");
                }
            }
        });
    }

    fn emit(&self, event_type: EventType, data: Value) {
        self.webhooks.emit(Event::new(event_type, data));
    }

    fn transaction_payload(tx: &Transaction) -> Value {
        json!({
            "id": tx.tx_id,
            "agent_id": tx.agent_id,
            "from_wallet": tx.from_wallet,
            "to_wallet": tx.to_wallet,
            "amount": tx.amount.to_string(),
            "fee": tx.fee.to_string(),
            "total": (tx.amount + tx.fee).to_string(),
            "currency": tx.currency,
            "purpose": tx.purpose,
            "status": tx.status,
        })
    }
}
