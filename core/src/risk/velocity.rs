//! # Velocity Rule
//!
//! Flags agents transacting much faster than their limits allow. Sustained
//! bursts are the classic signature of automated fraud or a compromised
//! agent loop, so this rule carries the highest default weight.

use std::collections::HashMap;

use crate::config;

use super::context::{PaymentContext, RiskAction, RiskRule, RuleResult};

/// Tunable thresholds for the velocity rule.
#[derive(Clone, Debug)]
pub struct VelocityConfig {
    pub max_transactions_per_hour: u32,
    pub max_transactions_per_day: u32,
    pub hourly_exceed_score: f64,
    pub daily_exceed_score: f64,
    /// Fraction of a limit at which the elevated-velocity warning fires.
    pub warning_threshold: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_hour: 20,
            max_transactions_per_day: 100,
            hourly_exceed_score: 30.0,
            daily_exceed_score: 20.0,
            warning_threshold: 0.8,
        }
    }
}

/// Detects abnormally high transaction frequency.
pub struct VelocityRule {
    config: VelocityConfig,
    weight: f64,
}

impl VelocityRule {
    pub fn new(config: VelocityConfig, weight: f64) -> Self {
        Self { config, weight }
    }
}

impl Default for VelocityRule {
    fn default() -> Self {
        Self::new(VelocityConfig::default(), config::VELOCITY_RULE_WEIGHT)
    }
}

impl RiskRule for VelocityRule {
    fn name(&self) -> &'static str {
        "velocity"
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

        let hourly_ratio =
            context.transactions_last_hour as f64 / self.config.max_transactions_per_hour as f64;
        if hourly_ratio >= 1.0 {
            score += self.config.hourly_exceed_score;
            factors.push("high_hourly_velocity");
            details.insert(
                "hourly_transactions".into(),
                context.transactions_last_hour.to_string(),
            );
            details.insert(
                "hourly_limit".into(),
                self.config.max_transactions_per_hour.to_string(),
            );
            triggered = true;

            if hourly_ratio >= 1.5 {
                score += self.config.hourly_exceed_score;
                action = action.escalate(RiskAction::Review);
            }
            if hourly_ratio >= 2.0 {
                action = action.escalate(RiskAction::Deny);
            }
        } else if hourly_ratio >= self.config.warning_threshold {
            score += self.config.hourly_exceed_score * 0.3;
            factors.push("elevated_hourly_velocity");
            details.insert(
                "hourly_transactions".into(),
                context.transactions_last_hour.to_string(),
            );
        }

        let daily_ratio =
            context.transactions_last_day as f64 / self.config.max_transactions_per_day as f64;
        if daily_ratio >= 1.0 {
            score += self.config.daily_exceed_score;
            factors.push("high_daily_velocity");
            details.insert(
                "daily_transactions".into(),
                context.transactions_last_day.to_string(),
            );
            details.insert(
                "daily_limit".into(),
                self.config.max_transactions_per_day.to_string(),
            );
            triggered = true;

            if daily_ratio >= 1.5 {
                score += self.config.daily_exceed_score;
                action = action.escalate(RiskAction::Review);
            }
            if daily_ratio >= 2.0 {
                action = action.escalate(RiskAction::Deny);
            }
        } else if daily_ratio >= self.config.warning_threshold {
            score += self.config.daily_exceed_score * 0.3;
            factors.push("elevated_daily_velocity");
            details.insert(
                "daily_transactions".into(),
                context.transactions_last_day.to_string(),
            );
        }

        // Burst: more than 10 in an hour ramps up even below the limit.
        if context.transactions_last_hour >= 10 {
            let burst = 2.0 * (context.transactions_last_hour as f64 - 10.0);
            if burst > 0.0 {
                score += burst.min(15.0);
                factors.push("burst_pattern");
            }
        }

        RuleResult::scored(self.name(), score, self.weight, factors, details, triggered, action)
    }
}
