//! # Risk Rule Interface
//!
//! Every risk rule sees the same [`PaymentContext`] snapshot and produces a
//! [`RuleResult`]: a bounded score, the rule's weight, the factors that
//! drove the score, and a recommended action. Rules are pure with respect
//! to the snapshot — any private state a rule keeps (reputations,
//! fingerprints, failure counters) is read under the rule's own lock and
//! mutated only through explicit post-confirmation hooks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// RiskAction
// ---------------------------------------------------------------------------

/// What a rule (or the whole pipeline) recommends doing with a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    Approve,
    Review,
    Deny,
}

impl RiskAction {
    /// Escalation only — a rule can raise the recommended action, never
    /// lower one already raised.
    pub fn escalate(self, other: RiskAction) -> RiskAction {
        self.max(other)
    }
}

// ---------------------------------------------------------------------------
// PaymentContext
// ---------------------------------------------------------------------------

/// Snapshot of everything a rule may consider about a proposed payment.
#[derive(Clone, Debug, Default)]
pub struct PaymentContext {
    pub agent_id: String,
    pub wallet_id: String,
    pub wallet_created_at: Option<DateTime<Utc>>,

    pub amount: Decimal,
    pub currency: String,

    pub recipient_id: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_category: Option<String>,

    pub total_transactions: u64,
    pub failed_transactions: u64,
    pub transactions_last_hour: u32,
    pub transactions_last_day: u32,
    pub total_volume: Decimal,
    pub average_transaction: Decimal,
    pub max_transaction: Decimal,
}

// ---------------------------------------------------------------------------
// RuleResult
// ---------------------------------------------------------------------------

/// Outcome of one rule evaluation. Scores are clamped to `[0, 100]`.
#[derive(Clone, Debug, Serialize)]
pub struct RuleResult {
    pub rule_name: &'static str,
    pub score: f64,
    pub weight: f64,
    pub factors: Vec<&'static str>,
    pub details: HashMap<String, String>,
    pub triggered: bool,
    pub recommended_action: RiskAction,
}

impl RuleResult {
    /// Clean (nothing to report) result for a rule.
    pub fn clean(rule_name: &'static str, weight: f64) -> Self {
        Self {
            rule_name,
            score: 0.0,
            weight,
            factors: Vec::new(),
            details: HashMap::new(),
            triggered: false,
            recommended_action: RiskAction::Approve,
        }
    }

    /// Builds a result with the score clamped into range.
    pub fn scored(
        rule_name: &'static str,
        score: f64,
        weight: f64,
        factors: Vec<&'static str>,
        details: HashMap<String, String>,
        triggered: bool,
        recommended_action: RiskAction,
    ) -> Self {
        Self {
            rule_name,
            score: score.clamp(0.0, 100.0),
            weight,
            factors,
            details,
            triggered,
            recommended_action,
        }
    }

    /// Score × weight, the rule's contribution to the weighted mean.
    pub fn weighted_score(&self) -> f64 {
        self.score * self.weight
    }
}

// ---------------------------------------------------------------------------
// RiskRule trait
// ---------------------------------------------------------------------------

/// A pluggable risk evaluator. One capability: evaluate a context.
pub trait RiskRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn weight(&self) -> f64;

    fn enabled(&self) -> bool {
        true
    }

    fn evaluate(&self, context: &PaymentContext) -> RuleResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_escalates_never_downgrades() {
        assert_eq!(RiskAction::Approve.escalate(RiskAction::Review), RiskAction::Review);
        assert_eq!(RiskAction::Review.escalate(RiskAction::Deny), RiskAction::Deny);
        assert_eq!(RiskAction::Deny.escalate(RiskAction::Approve), RiskAction::Deny);
        assert_eq!(RiskAction::Review.escalate(RiskAction::Approve), RiskAction::Review);
    }

    #[test]
    fn scored_clamps_to_range() {
        let r = RuleResult::scored("t", 150.0, 1.0, vec![], HashMap::new(), true, RiskAction::Deny);
        assert_eq!(r.score, 100.0);
        let r = RuleResult::scored("t", -5.0, 1.0, vec![], HashMap::new(), false, RiskAction::Approve);
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn weighted_score_multiplies() {
        let r = RuleResult::scored("t", 40.0, 1.5, vec![], HashMap::new(), true, RiskAction::Review);
        assert!((r.weighted_score() - 60.0).abs() < f64::EPSILON);
    }
}
