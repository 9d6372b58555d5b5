//! # Behavior Fingerprint Rule
//!
//! Learns each agent's transactional habits — amount distribution, usual
//! recipients, usual merchant categories — and flags departures from them.
//! The profile only activates once ten transactions have been observed;
//! before that there is nothing statistically meaningful to compare
//! against.

use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

use crate::config;

use super::context::{PaymentContext, RiskAction, RiskRule, RuleResult};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Per-agent behavioral fingerprint.
#[derive(Clone, Debug, Default)]
pub struct BehaviorProfile {
    /// Bounded ring of recent transaction amounts.
    pub amount_history: VecDeque<Decimal>,
    /// Recipients this agent regularly pays. Bounded, oldest first out.
    pub typical_recipients: VecDeque<String>,
    /// Merchant categories this agent regularly pays into.
    pub typical_categories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct BehaviorConfig {
    pub max_history_size: usize,
    pub max_recipients: usize,
    /// Transactions required before the profile activates.
    pub min_profile_transactions: usize,
    /// Z-score beyond which an amount counts as unusual.
    pub std_dev_multiplier: f64,
    pub new_recipient_score: f64,
    pub unusual_amount_score: f64,
    pub unusual_category_score: f64,
    /// Total score at which the rule recommends review.
    pub review_score: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_history_size: 100,
            max_recipients: 50,
            min_profile_transactions: 10,
            std_dev_multiplier: 2.5,
            new_recipient_score: 10.0,
            unusual_amount_score: 20.0,
            unusual_category_score: 10.0,
            review_score: 30.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Detects departures from an agent's established behavior.
pub struct BehaviorFingerprintRule {
    config: BehaviorConfig,
    weight: f64,
    profiles: RwLock<HashMap<String, BehaviorProfile>>,
}

impl BehaviorFingerprintRule {
    pub fn new(config: BehaviorConfig, weight: f64) -> Self {
        Self {
            config,
            weight,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Folds a confirmed transaction into the agent's fingerprint.
    pub fn update_profile(
        &self,
        agent_id: &str,
        amount: Decimal,
        recipient_id: Option<&str>,
        category: Option<&str>,
    ) {
        let mut profiles = self.profiles.write();
        let profile = profiles.entry(agent_id.to_string()).or_default();

        profile.amount_history.push_back(amount);
        if profile.amount_history.len() > self.config.max_history_size {
            profile.amount_history.pop_front();
        }

        if let Some(recipient) = recipient_id {
            if !profile.typical_recipients.iter().any(|r| r == recipient) {
                profile.typical_recipients.push_back(recipient.to_string());
                if profile.typical_recipients.len() > self.config.max_recipients {
                    profile.typical_recipients.pop_front();
                }
            }
        }

        if let Some(cat) = category {
            if !profile.typical_categories.iter().any(|c| c == cat) {
                profile.typical_categories.push(cat.to_string());
            }
        }
    }

    pub fn profile(&self, agent_id: &str) -> Option<BehaviorProfile> {
        self.profiles.read().get(agent_id).cloned()
    }

    /// Z-score based anomaly score for an amount against the history.
    fn amount_anomaly_score(&self, amount: Decimal, history: &VecDeque<Decimal>) -> f64 {
        if history.len() < 5 {
            return 0.0;
        }
        let amounts: Vec<f64> = history.iter().filter_map(|a| a.to_f64()).collect();
        let n = amounts.len() as f64;
        let mean = amounts.iter().sum::<f64>() / n;
        let variance = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();
        let amount = amount.to_f64().unwrap_or(0.0);

        if std_dev == 0.0 {
            // Perfectly uniform history: any different amount is unusual.
            if (amount - mean).abs() > f64::EPSILON {
                return self.config.unusual_amount_score;
            }
            return 0.0;
        }

        let z = (amount - mean) / std_dev;
        if z.abs() > self.config.std_dev_multiplier {
            (self.config.unusual_amount_score * (z.abs() / 3.0)).min(40.0)
        } else {
            0.0
        }
    }
}

impl Default for BehaviorFingerprintRule {
    fn default() -> Self {
        Self::new(BehaviorConfig::default(), config::BEHAVIOR_RULE_WEIGHT)
    }
}

impl RiskRule for BehaviorFingerprintRule {
    fn name(&self) -> &'static str {
        "behavior_fingerprint"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn evaluate(&self, context: &PaymentContext) -> RuleResult {
        let profiles = self.profiles.read();
        let profile = profiles.get(&context.agent_id);

        let mut details = HashMap::new();
        let profile = match profile {
            Some(p) if p.amount_history.len() >= self.config.min_profile_transactions => p,
            _ => {
                details.insert("profile_status".into(), "insufficient_history".into());
                let mut r = RuleResult::clean(self.name(), self.weight);
                r.details = details;
                return r;
            }
        };

        details.insert("profile_status".into(), "active".into());
        details.insert("history_size".into(), profile.amount_history.len().to_string());

        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut triggered = false;

        let amount_score = self.amount_anomaly_score(context.amount, &profile.amount_history);
        if amount_score > 0.0 {
            score += amount_score;
            factors.push("unusual_amount");
            triggered = true;
        }

        if let Some(recipient) = &context.recipient_id {
            if !profile.typical_recipients.iter().any(|r| r == recipient) {
                score += self.config.new_recipient_score;
                factors.push("new_recipient");
                details.insert("recipient_is_new".into(), "true".into());
            }
        }

        if let Some(category) = &context.merchant_category {
            if !profile.typical_categories.is_empty()
                && !profile.typical_categories.iter().any(|c| c == category)
            {
                score += self.config.unusual_category_score;
                factors.push("unusual_category");
                details.insert("category".into(), category.clone());
            }
        }

        let action = if score >= self.config.review_score {
            RiskAction::Review
        } else {
            RiskAction::Approve
        };

        RuleResult::scored(self.name(), score, self.weight, factors, details, triggered, action)
    }
}
