//! # Risk Engine
//!
//! Runs the weighted rule pipeline over a payment context and aggregates
//! the results into a single decision. Rule scores are on a 0–100 scale;
//! the final score is their weighted mean, capped at 100:
//!
//! ```text
//! final = min(100, Σ(score_i · weight_i) / Σ weight_i)
//! ```
//!
//! Decision: DENY if any rule recommended it or the score reaches the
//! block threshold; REVIEW if any rule recommended it or the score reaches
//! the review threshold; APPROVE otherwise. Flagged agents are denied
//! before any rule runs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config;

use super::amount::AmountAnomalyRule;
use super::behavior::BehaviorFingerprintRule;
use super::context::{PaymentContext, RiskAction, RiskRule, RuleResult};
use super::failure::FailurePatternRule;
use super::merchant::MerchantReputationRule;
use super::profile::{AgentRiskProfile, ProfileStore};
use super::velocity::VelocityRule;

// ---------------------------------------------------------------------------
// Evaluation result
// ---------------------------------------------------------------------------

/// Final decision from the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDecision {
    Approve,
    Review,
    Deny,
}

/// Aggregated evaluation: decision, score, contributing factors, and the
/// per-rule breakdown for audit logs.
#[derive(Clone, Debug, Serialize)]
pub struct RiskEvaluation {
    pub decision: RiskDecision,
    pub score: f64,
    pub factors: Vec<&'static str>,
    pub rule_results: Vec<RuleResult>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The composable rule pipeline plus per-agent profile state.
pub struct RiskEngine {
    merchant: Arc<MerchantReputationRule>,
    behavior: Arc<BehaviorFingerprintRule>,
    failure: Arc<FailurePatternRule>,
    rules: Vec<Arc<dyn RiskRule>>,
    profiles: ProfileStore,
    block_threshold: f64,
    review_threshold: f64,
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskEngine {
    pub fn new() -> Self {
        let velocity = Arc::new(VelocityRule::default());
        let amount = Arc::new(AmountAnomalyRule::default());
        let merchant = Arc::new(MerchantReputationRule::default());
        let behavior = Arc::new(BehaviorFingerprintRule::default());
        let failure = Arc::new(FailurePatternRule::default());

        let rules: Vec<Arc<dyn RiskRule>> = vec![
            velocity,
            amount,
            merchant.clone(),
            behavior.clone(),
            failure.clone(),
        ];

        Self {
            merchant,
            behavior,
            failure,
            rules,
            profiles: ProfileStore::new(),
            block_threshold: config::RISK_BLOCK_THRESHOLD,
            review_threshold: config::RISK_REVIEW_THRESHOLD,
        }
    }

    /// The merchant reputation store, for registration and seeding.
    pub fn merchant_reputation(&self) -> &MerchantReputationRule {
        &self.merchant
    }

    /// The behavior fingerprint store.
    pub fn behavior_fingerprint(&self) -> &BehaviorFingerprintRule {
        &self.behavior
    }

    // -----------------------------------------------------------------------
    // Context construction
    // -----------------------------------------------------------------------

    /// Builds a [`PaymentContext`] from the agent's stored profile plus
    /// the proposed payment.
    #[allow(clippy::too_many_arguments)]
    pub fn build_context(
        &self,
        agent_id: &str,
        wallet_id: &str,
        wallet_created_at: Option<DateTime<Utc>>,
        amount: Decimal,
        currency: &str,
        recipient_id: Option<&str>,
        merchant_id: Option<&str>,
        merchant_category: Option<&str>,
    ) -> PaymentContext {
        let profile = self.profiles.get_or_create(agent_id);
        PaymentContext {
            agent_id: agent_id.to_string(),
            wallet_id: wallet_id.to_string(),
            wallet_created_at,
            amount,
            currency: currency.to_string(),
            recipient_id: recipient_id.map(str::to_string),
            merchant_id: merchant_id.map(str::to_string),
            merchant_category: merchant_category.map(str::to_string),
            total_transactions: profile.total_transactions,
            failed_transactions: profile.failed_transactions,
            transactions_last_hour: profile.transactions_last_hour,
            transactions_last_day: profile.transactions_last_day,
            total_volume: profile.total_volume,
            average_transaction: profile.average_transaction,
            max_transaction: profile.max_transaction,
        }
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Runs every enabled rule and aggregates. The context is a snapshot;
    /// no rule state changes during evaluation.
    pub fn evaluate(&self, context: &PaymentContext) -> RiskEvaluation {
        // Flagged agents skip the pipeline entirely.
        if let Some(profile) = self.profiles.get(&context.agent_id) {
            if profile.is_flagged {
                tracing::warn!(
                    agent_id = %context.agent_id,
                    reason = profile.flag_reason.as_deref().unwrap_or("unspecified"),
                    "flagged agent denied"
                );
                return RiskEvaluation {
                    decision: RiskDecision::Deny,
                    score: 100.0,
                    factors: vec!["agent_flagged"],
                    rule_results: Vec::new(),
                };
            }
        }

        let mut rule_results = Vec::with_capacity(self.rules.len());
        let mut weighted_total = 0.0;
        let mut weight_total = 0.0;
        let mut factors: Vec<&'static str> = Vec::new();
        let mut recommended = RiskAction::Approve;

        for rule in self.rules.iter().filter(|r| r.enabled()) {
            let result = rule.evaluate(context);
            weighted_total += result.weighted_score();
            weight_total += result.weight;
            for f in &result.factors {
                if !factors.contains(f) {
                    factors.push(f);
                }
            }
            recommended = recommended.escalate(result.recommended_action);
            rule_results.push(result);
        }

        let score = if weight_total > 0.0 {
            (weighted_total / weight_total).min(100.0)
        } else {
            0.0
        };

        let decision = if recommended == RiskAction::Deny || score >= self.block_threshold {
            RiskDecision::Deny
        } else if recommended == RiskAction::Review || score >= self.review_threshold {
            RiskDecision::Review
        } else {
            RiskDecision::Approve
        };

        tracing::debug!(
            agent_id = %context.agent_id,
            score,
            ?decision,
            factors = ?factors,
            "risk evaluation complete"
        );

        RiskEvaluation {
            decision,
            score,
            factors,
            rule_results,
        }
    }

    // -----------------------------------------------------------------------
    // Post-confirmation updates
    // -----------------------------------------------------------------------

    /// Records a terminal payment outcome: profile counters, behavior
    /// fingerprint, failure streaks, merchant reputation, and the agent's
    /// stored score.
    #[allow(clippy::too_many_arguments)]
    pub fn record_transaction(
        &self,
        agent_id: &str,
        amount: Decimal,
        recipient_id: Option<&str>,
        merchant_id: Option<&str>,
        merchant_category: Option<&str>,
        success: bool,
        now: DateTime<Utc>,
    ) {
        self.profiles.update(agent_id, |profile| {
            profile.record_transaction(amount, success, now);
        });

        self.failure.record_outcome(agent_id, success);

        if success {
            self.behavior
                .update_profile(agent_id, amount, recipient_id, merchant_category);
        }

        if let Some(merchant) = merchant_id {
            self.merchant
                .update_reputation(merchant, amount, success, false, false);
        }
    }

    /// Records a refund against the merchant's reputation.
    pub fn record_refund(&self, merchant_id: &str, amount: Decimal) {
        self.merchant
            .update_reputation(merchant_id, amount, true, true, false);
    }

    pub fn profile(&self, agent_id: &str) -> Option<AgentRiskProfile> {
        self.profiles.get(agent_id)
    }

    pub fn flag_agent(&self, agent_id: &str, reason: &str) {
        self.profiles.update(agent_id, |p| p.flag(reason));
    }

    pub fn unflag_agent(&self, agent_id: &str) {
        self.profiles.update(agent_id, |p| p.unflag());
    }

    /// Test hook: overwrite the rolling activity counters directly.
    pub fn set_activity(&self, agent_id: &str, last_hour: u32, last_day: u32) {
        self.profiles.update(agent_id, |p| {
            p.transactions_last_hour = last_hour;
            p.transactions_last_day = last_day;
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quiet_context(engine: &RiskEngine, amount: Decimal) -> PaymentContext {
        engine.build_context(
            "ent_a",
            "wlt_a",
            None,
            amount,
            "USDC",
            Some("wlt_b"),
            None,
            None,
        )
    }

    #[test]
    fn quiet_payment_approves() {
        let engine = RiskEngine::new();
        let eval = engine.evaluate(&quiet_context(&engine, dec!(5)));
        assert_eq!(eval.decision, RiskDecision::Approve);
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.rule_results.len(), 5);
    }

    #[test]
    fn weighted_mean_formula() {
        let engine = RiskEngine::new();
        // 45 tx/hour trips velocity hard; everything else quiet.
        engine.set_activity("ent_a", 45, 50);
        let ctx = quiet_context(&engine, dec!(5));
        let eval = engine.evaluate(&ctx);

        let manual_weighted: f64 = eval.rule_results.iter().map(|r| r.weighted_score()).sum();
        let manual_weight: f64 = eval.rule_results.iter().map(|r| r.weight).sum();
        let expected = (manual_weighted / manual_weight).min(100.0);
        assert!((eval.score - expected).abs() < 1e-9);
    }

    #[test]
    fn velocity_deny_propagates() {
        // S10: 45 transactions in the last hour (≥ 2× the limit of 20).
        let engine = RiskEngine::new();
        engine.set_activity("ent_a", 45, 50);
        let eval = engine.evaluate(&quiet_context(&engine, dec!(5)));
        assert_eq!(eval.decision, RiskDecision::Deny);
        assert!(eval.factors.contains(&"high_hourly_velocity"));
    }

    #[test]
    fn review_from_single_rule_recommendation() {
        let engine = RiskEngine::new();
        // Unknown merchant → merchant rule recommends review even though
        // the aggregate score stays below the review threshold.
        let ctx = engine.build_context(
            "ent_a",
            "wlt_a",
            None,
            dec!(5),
            "USDC",
            Some("wlt_m"),
            Some("mch_unknown"),
            None,
        );
        let eval = engine.evaluate(&ctx);
        assert_eq!(eval.decision, RiskDecision::Review);
        assert!(eval.score < config::RISK_REVIEW_THRESHOLD);
    }

    #[test]
    fn flagged_agent_short_circuits() {
        let engine = RiskEngine::new();
        engine.flag_agent("ent_a", "chargeback storm");
        let eval = engine.evaluate(&quiet_context(&engine, dec!(1)));
        assert_eq!(eval.decision, RiskDecision::Deny);
        assert_eq!(eval.score, 100.0);
        assert!(eval.rule_results.is_empty());

        engine.unflag_agent("ent_a");
        let eval = engine.evaluate(&quiet_context(&engine, dec!(1)));
        assert_eq!(eval.decision, RiskDecision::Approve);
    }

    #[test]
    fn factors_are_deduplicated() {
        let engine = RiskEngine::new();
        engine.set_activity("ent_a", 45, 250);
        let eval = engine.evaluate(&quiet_context(&engine, dec!(5)));
        let mut seen = std::collections::HashSet::new();
        for f in &eval.factors {
            assert!(seen.insert(f), "duplicate factor {f}");
        }
    }

    #[test]
    fn record_transaction_builds_history() {
        let engine = RiskEngine::new();
        let now = Utc::now();
        for _ in 0..12 {
            engine.record_transaction(
                "ent_a",
                dec!(10),
                Some("wlt_b"),
                Some("mch_m"),
                Some("compute"),
                true,
                now,
            );
        }

        let profile = engine.profile("ent_a").unwrap();
        assert_eq!(profile.total_transactions, 12);
        assert_eq!(profile.average_transaction, dec!(10));

        // Behavior fingerprint is live after 10 transactions.
        let fingerprint = engine.behavior_fingerprint().profile("ent_a").unwrap();
        assert_eq!(fingerprint.amount_history.len(), 12);

        // Merchant reputation accumulated.
        let rep = engine.merchant_reputation().reputation("mch_m").unwrap();
        assert_eq!(rep.total_transactions, 12);
    }

    #[test]
    fn failures_feed_failure_rule() {
        let engine = RiskEngine::new();
        let now = Utc::now();
        for _ in 0..4 {
            engine.record_transaction("ent_a", dec!(10), None, None, None, false, now);
        }
        // 4 consecutive failures on record.
        let ctx = quiet_context(&engine, dec!(5));
        let eval = engine.evaluate(&ctx);
        assert!(eval.factors.contains(&"consecutive_failures"));
    }
}
