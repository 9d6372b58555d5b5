//! # Merchant Rules
//!
//! Ordered allow/deny rules matched against a merchant id or category.
//! Deny rules always win; allow rules become a closed allowlist as soon as
//! one exists. A matching allow rule may carry its own per-transaction cap.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a rule admits or blocks matching merchants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Allow,
    Deny,
}

/// One merchant rule. Matches by merchant id, by category, or both.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerchantRule {
    /// Unique rule id (`rule_<uuid>`).
    pub rule_id: String,

    pub kind: RuleKind,

    /// Match a specific merchant.
    pub merchant_id: Option<String>,

    /// Match every merchant in a category.
    pub category: Option<String>,

    /// For allow rules: per-transaction cap tighter than the policy's.
    pub max_per_tx: Option<Decimal>,

    /// Operator-facing justification, echoed in rejection messages.
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Expired rules stop matching; they are not removed.
    pub expires_at: Option<DateTime<Utc>>,
}

impl MerchantRule {
    pub fn allow(merchant_id: Option<&str>, category: Option<&str>) -> Self {
        Self::new(RuleKind::Allow, merchant_id, category)
    }

    pub fn deny(merchant_id: Option<&str>, category: Option<&str>) -> Self {
        Self::new(RuleKind::Deny, merchant_id, category)
    }

    fn new(kind: RuleKind, merchant_id: Option<&str>, category: Option<&str>) -> Self {
        Self {
            rule_id: format!("rule_{}", Uuid::new_v4().simple()),
            kind,
            merchant_id: merchant_id.map(str::to_string),
            category: category.map(str::to_string),
            max_per_tx: None,
            reason: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_max_per_tx(mut self, cap: Decimal) -> Self {
        self.max_per_tx = Some(cap);
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the rule is still in force.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |e| now <= e)
    }

    /// Whether this rule matches a merchant, by id or category.
    pub fn matches(
        &self,
        merchant_id: &str,
        merchant_category: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_active(now) {
            return false;
        }
        if self.merchant_id.as_deref() == Some(merchant_id) {
            return true;
        }
        match (&self.category, merchant_category) {
            (Some(rule_cat), Some(cat)) => rule_cat == cat,
            _ => false,
        }
    }
}
