//! # Failure Pattern Rule
//!
//! Watches the shape of an agent's failures: overall failure rate, streaks
//! of consecutive failures, and the probing signature (several early
//! failures followed by an outsized attempt — the classic limit-probing
//! behavior of a compromised or adversarial agent).

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config;

use super::context::{PaymentContext, RiskAction, RiskRule, RuleResult};

#[derive(Clone, Debug)]
pub struct FailureConfig {
    /// Failure rate that triggers review.
    pub high_failure_rate: f64,
    /// Failure rate that triggers denial.
    pub critical_failure_rate: f64,
    /// Transactions needed before rates are meaningful.
    pub min_transactions: u64,
    /// Streak length that starts scoring.
    pub max_consecutive_failures: u32,
    pub high_failure_score: f64,
    pub critical_failure_score: f64,
    pub consecutive_failure_score: f64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            high_failure_rate: 0.20,
            critical_failure_rate: 0.40,
            min_transactions: 5,
            max_consecutive_failures: 3,
            high_failure_score: 25.0,
            critical_failure_score: 50.0,
            consecutive_failure_score: 15.0,
        }
    }
}

/// Detects suspicious failure patterns.
pub struct FailurePatternRule {
    config: FailureConfig,
    weight: f64,
    consecutive_failures: RwLock<HashMap<String, u32>>,
}

impl FailurePatternRule {
    pub fn new(config: FailureConfig, weight: f64) -> Self {
        Self {
            config,
            weight,
            consecutive_failures: RwLock::new(HashMap::new()),
        }
    }

    /// Records a transaction outcome. Success clears the streak.
    pub fn record_outcome(&self, agent_id: &str, success: bool) {
        let mut streaks = self.consecutive_failures.write();
        if success {
            streaks.insert(agent_id.to_string(), 0);
        } else {
            *streaks.entry(agent_id.to_string()).or_insert(0) += 1;
        }
    }

    pub fn consecutive_failures(&self, agent_id: &str) -> u32 {
        self.consecutive_failures
            .read()
            .get(agent_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for FailurePatternRule {
    fn default() -> Self {
        Self::new(FailureConfig::default(), config::FAILURE_RULE_WEIGHT)
    }
}

impl RiskRule for FailurePatternRule {
    fn name(&self) -> &'static str {
        "failure_pattern"
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

        if context.total_transactions >= self.config.min_transactions {
            let rate = context.failed_transactions as f64 / context.total_transactions as f64;
            details.insert("failure_rate".into(), format!("{:.1}%", rate * 100.0));
            details.insert("failed_count".into(), context.failed_transactions.to_string());
            details.insert("total_count".into(), context.total_transactions.to_string());

            if rate >= self.config.critical_failure_rate {
                score += self.config.critical_failure_score;
                factors.push("critical_failure_rate");
                triggered = true;
                action = action.escalate(RiskAction::Deny);
            } else if rate >= self.config.high_failure_rate {
                score += self.config.high_failure_score;
                factors.push("high_failure_rate");
                triggered = true;
                action = action.escalate(RiskAction::Review);
            }
        }

        let consecutive = self.consecutive_failures(&context.agent_id);
        if consecutive > 0 {
            details.insert("consecutive_failures".into(), consecutive.to_string());

            if consecutive >= self.config.max_consecutive_failures {
                score += self.config.consecutive_failure_score;
                factors.push("consecutive_failures");
                triggered = true;

                if consecutive >= self.config.max_consecutive_failures * 2 {
                    action = action.escalate(RiskAction::Deny);
                }
            }
        }

        // Probing: several failures early in the account's life, then a
        // try at more than double the usual amount.
        if context.failed_transactions >= 3
            && context.total_transactions < 10
            && context.amount > context.average_transaction * Decimal::from(2)
        {
            score += 15.0;
            factors.push("potential_probing");
            details.insert("probing_pattern".into(), "true".into());
        }

        RuleResult::scored(self.name(), score, self.weight, factors, details, triggered, action)
    }
}
