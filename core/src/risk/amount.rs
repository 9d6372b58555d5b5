//! # Amount Anomaly Rule
//!
//! Flags transactions that are large in absolute terms, large relative to
//! the agent's own history, suspiciously round, or parked just under a
//! reporting threshold (structuring).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config;

use super::context::{PaymentContext, RiskAction, RiskRule, RuleResult};

/// Tunable thresholds for the amount anomaly rule.
#[derive(Clone, Debug)]
pub struct AmountConfig {
    pub large_transaction_threshold: Decimal,
    pub very_large_threshold: Decimal,
    /// Flag at this multiple of the agent's average.
    pub deviation_multiplier: f64,
    /// Deny at this multiple.
    pub max_deviation_multiplier: f64,
    pub large_tx_score: f64,
    pub very_large_tx_score: f64,
    pub deviation_score: f64,
    /// History needed before relative checks apply.
    pub min_history_for_deviation: u64,
}

impl Default for AmountConfig {
    fn default() -> Self {
        Self {
            large_transaction_threshold: Decimal::from(100),
            very_large_threshold: Decimal::from(500),
            deviation_multiplier: 3.0,
            max_deviation_multiplier: 10.0,
            large_tx_score: 15.0,
            very_large_tx_score: 30.0,
            deviation_score: 25.0,
            min_history_for_deviation: 5,
        }
    }
}

/// Detects unusual transaction amounts.
pub struct AmountAnomalyRule {
    config: AmountConfig,
    weight: f64,
}

impl AmountAnomalyRule {
    pub fn new(config: AmountConfig, weight: f64) -> Self {
        Self { config, weight }
    }
}

impl Default for AmountAnomalyRule {
    fn default() -> Self {
        Self::new(AmountConfig::default(), config::AMOUNT_RULE_WEIGHT)
    }
}

impl RiskRule for AmountAnomalyRule {
    fn name(&self) -> &'static str {
        "amount_anomaly"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn evaluate(&self, context: &PaymentContext) -> RuleResult {
        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut details = HashMap::new();
        let mut triggered = false;
        let mut action = RiskAction::Approve;

        let amount = context.amount;

        if amount >= self.config.very_large_threshold {
            score += self.config.very_large_tx_score;
            factors.push("very_large_transaction");
            details.insert("amount".into(), amount.to_string());
            details.insert(
                "threshold".into(),
                self.config.very_large_threshold.to_string(),
            );
            triggered = true;
            action = action.escalate(RiskAction::Review);
        } else if amount >= self.config.large_transaction_threshold {
            score += self.config.large_tx_score;
            factors.push("large_transaction");
            details.insert("amount".into(), amount.to_string());
            details.insert(
                "threshold".into(),
                self.config.large_transaction_threshold.to_string(),
            );
        }

        if context.total_transactions >= self.config.min_history_for_deviation {
            let avg = context.average_transaction;
            if avg > Decimal::ZERO {
                let deviation = (amount / avg).to_f64().unwrap_or(0.0);
                details.insert("deviation_from_average".into(), format!("{deviation:.1}x"));
                details.insert("average_transaction".into(), avg.to_string());

                if deviation >= self.config.max_deviation_multiplier {
                    score += self.config.deviation_score;
                    factors.push("extreme_deviation");
                    triggered = true;
                    action = action.escalate(RiskAction::Deny);
                } else if deviation >= self.config.deviation_multiplier {
                    score += self.config.deviation_score * 0.6;
                    factors.push("significant_deviation");
                    triggered = true;
                }
            }
        }

        // Round amounts at or above 100 suggest scripted flows.
        if amount >= Decimal::from(100) && (amount % Decimal::from(100)).is_zero() {
            factors.push("round_amount");
            details.insert("round_amount".into(), "true".into());
        }

        // Just under a reporting threshold: the structuring signature.
        for threshold in [Decimal::from(10_000), Decimal::from(3_000)] {
            let lower = threshold - Decimal::from(500);
            if amount > lower && amount < threshold {
                factors.push("near_reporting_threshold");
                details.insert("near_threshold".into(), threshold.to_string());
                break;
            }
        }

        RuleResult::scored(self.name(), score, self.weight, factors, details, triggered, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx(amount: Decimal) -> PaymentContext {
        PaymentContext {
            agent_id: "ent_a".into(),
            amount,
            ..Default::default()
        }
    }

    fn ctx_with_history(amount: Decimal, total: u64, avg: Decimal) -> PaymentContext {
        PaymentContext {
            total_transactions: total,
            average_transaction: avg,
            ..ctx(amount)
        }
    }

    #[test]
    fn small_amount_scores_zero() {
        let rule = AmountAnomalyRule::default();
        let r = rule.evaluate(&ctx(dec!(12.34)));
        assert_eq!(r.score, 0.0);
        assert!(!r.triggered);
    }

    #[test]
    fn large_amount_flagged() {
        let rule = AmountAnomalyRule::default();
        let r = rule.evaluate(&ctx(dec!(150)));
        assert_eq!(r.score, 15.0);
        assert!(r.factors.contains(&"large_transaction"));
        assert!(!r.triggered);
    }

    #[test]
    fn very_large_amount_reviews() {
        let rule = AmountAnomalyRule::default();
        let r = rule.evaluate(&ctx(dec!(750)));
        assert_eq!(r.score, 30.0);
        assert!(r.factors.contains(&"very_large_transaction"));
        assert!(r.triggered);
        assert_eq!(r.recommended_action, RiskAction::Review);
    }

    #[test]
    fn significant_deviation_from_history() {
        let rule = AmountAnomalyRule::default();
        // 4x average with enough history.
        let r = rule.evaluate(&ctx_with_history(dec!(40), 10, dec!(10)));
        assert!(r.factors.contains(&"significant_deviation"));
        assert!(r.triggered);
        assert_eq!(r.recommended_action, RiskAction::Approve);
        assert_eq!(r.score, 15.0);
    }

    #[test]
    fn extreme_deviation_denies() {
        let rule = AmountAnomalyRule::default();
        let r = rule.evaluate(&ctx_with_history(dec!(150), 10, dec!(10)));
        assert!(r.factors.contains(&"extreme_deviation"));
        assert_eq!(r.recommended_action, RiskAction::Deny);
    }

    #[test]
    fn deviation_needs_history() {
        let rule = AmountAnomalyRule::default();
        // Only 3 prior transactions: relative checks stay silent.
        let r = rule.evaluate(&ctx_with_history(dec!(90), 3, dec!(1)));
        assert!(!r.factors.contains(&"extreme_deviation"));
        assert!(!r.factors.contains(&"significant_deviation"));
    }

    #[test]
    fn round_amount_flagged_without_score() {
        let rule = AmountAnomalyRule::default();
        let r = rule.evaluate(&ctx(dec!(200)));
        assert!(r.factors.contains(&"round_amount"));
        // Only the large-transaction score applies; roundness is a flag.
        assert_eq!(r.score, 15.0);
    }

    #[test]
    fn sub_hundred_round_amount_not_flagged() {
        let rule = AmountAnomalyRule::default();
        let r = rule.evaluate(&ctx(dec!(100)));
        assert!(r.factors.contains(&"round_amount"));
        let r = rule.evaluate(&ctx(dec!(50)));
        assert!(!r.factors.contains(&"round_amount"));
    }

    #[test]
    fn structuring_near_thresholds() {
        let rule = AmountAnomalyRule::default();
        for amount in [dec!(2800), dec!(9700)] {
            let r = rule.evaluate(&ctx(amount));
            assert!(
                r.factors.contains(&"near_reporting_threshold"),
                "{amount} should flag structuring"
            );
        }
        for amount in [dec!(2400), dec!(3000), dec!(10000)] {
            let r = rule.evaluate(&ctx(amount));
            assert!(
                !r.factors.contains(&"near_reporting_threshold"),
                "{amount} should not flag structuring"
            );
        }
    }
}
