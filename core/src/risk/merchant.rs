//! # Merchant Reputation Rule
//!
//! Scores the receiving merchant: trust score, account age, dispute and
//! refund rates, verification status. The rule owns its reputation store;
//! the orchestrator feeds outcomes back through
//! [`MerchantReputationRule::update_reputation`] after each settlement.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config;

use super::context::{PaymentContext, RiskAction, RiskRule, RuleResult};

// ---------------------------------------------------------------------------
// Reputation record
// ---------------------------------------------------------------------------

/// Accumulated reputation for one merchant.
#[derive(Clone, Debug)]
pub struct MerchantReputation {
    pub merchant_id: String,
    /// 0–100. New merchants start at 50.
    pub trust_score: f64,
    pub total_transactions: u64,
    pub total_volume: Decimal,
    /// Fraction of transactions disputed.
    pub dispute_rate: f64,
    /// Fraction of transactions refunded.
    pub refund_rate: f64,
    pub registered_at: DateTime<Utc>,
    pub is_verified: bool,
    pub categories: Vec<String>,
}

impl MerchantReputation {
    fn new(merchant_id: &str, trust_score: f64, is_verified: bool) -> Self {
        Self {
            merchant_id: merchant_id.to_string(),
            trust_score,
            total_transactions: 0,
            total_volume: Decimal::ZERO,
            dispute_rate: 0.0,
            refund_rate: 0.0,
            registered_at: Utc::now(),
            is_verified,
            categories: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct MerchantConfig {
    /// Below this trust score: +15, review.
    pub low_trust_threshold: f64,
    /// Below this trust score: +30, deny.
    pub high_risk_threshold: f64,
    pub new_merchant_days: i64,
    pub new_merchant_score: f64,
    pub high_dispute_rate: f64,
    pub high_refund_rate: f64,
    pub unknown_merchant_score: f64,
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            low_trust_threshold: 30.0,
            high_risk_threshold: 20.0,
            new_merchant_days: 30,
            new_merchant_score: 15.0,
            high_dispute_rate: 0.05,
            high_refund_rate: 0.10,
            unknown_merchant_score: 20.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Evaluates merchant trust and history.
pub struct MerchantReputationRule {
    config: MerchantConfig,
    weight: f64,
    merchants: RwLock<HashMap<String, MerchantReputation>>,
}

impl MerchantReputationRule {
    pub fn new(config: MerchantConfig, weight: f64) -> Self {
        Self {
            config,
            weight,
            merchants: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a merchant with an initial reputation.
    pub fn register_merchant(
        &self,
        merchant_id: &str,
        trust_score: f64,
        is_verified: bool,
        categories: Vec<String>,
    ) -> MerchantReputation {
        let mut rep = MerchantReputation::new(merchant_id, trust_score, is_verified);
        rep.categories = categories;
        self.merchants
            .write()
            .insert(merchant_id.to_string(), rep.clone());
        rep
    }

    /// Sets the registration timestamp. Test and backfill hook.
    pub fn set_registered_at(&self, merchant_id: &str, at: DateTime<Utc>) {
        if let Some(rep) = self.merchants.write().get_mut(merchant_id) {
            rep.registered_at = at;
        }
    }

    pub fn reputation(&self, merchant_id: &str) -> Option<MerchantReputation> {
        self.merchants.read().get(merchant_id).cloned()
    }

    /// Feeds a transaction outcome back into the merchant's reputation.
    /// Clean settlements nudge trust up; disputes knock it down hard.
    pub fn update_reputation(
        &self,
        merchant_id: &str,
        amount: Decimal,
        success: bool,
        refunded: bool,
        disputed: bool,
    ) {
        let mut merchants = self.merchants.write();
        let rep = merchants
            .entry(merchant_id.to_string())
            .or_insert_with(|| MerchantReputation::new(merchant_id, 50.0, false));

        rep.total_transactions += 1;
        rep.total_volume += amount;
        let n = rep.total_transactions as f64;

        if disputed {
            rep.trust_score = (rep.trust_score - 5.0).max(0.0);
            rep.dispute_rate = (rep.dispute_rate * (n - 1.0) + 1.0) / n;
            rep.refund_rate = rep.refund_rate * (n - 1.0) / n;
        } else if refunded {
            rep.refund_rate = (rep.refund_rate * (n - 1.0) + 1.0) / n;
            rep.dispute_rate = rep.dispute_rate * (n - 1.0) / n;
        } else {
            if success {
                rep.trust_score = (rep.trust_score + 0.1).min(100.0);
            }
            rep.dispute_rate = rep.dispute_rate * (n - 1.0) / n;
            rep.refund_rate = rep.refund_rate * (n - 1.0) / n;
        }
    }
}

impl Default for MerchantReputationRule {
    fn default() -> Self {
        Self::new(MerchantConfig::default(), config::MERCHANT_RULE_WEIGHT)
    }
}

impl RiskRule for MerchantReputationRule {
    fn name(&self) -> &'static str {
        "merchant_reputation"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn evaluate(&self, context: &PaymentContext) -> RuleResult {
        let merchant_id = match &context.merchant_id {
            Some(id) => id,
            // Direct wallet transfer: nothing to evaluate.
            None => return RuleResult::clean(self.name(), self.weight),
        };

        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut details = HashMap::new();
        let mut triggered = false;
        let mut action = RiskAction::Approve;

        let merchants = self.merchants.read();
        match merchants.get(merchant_id) {
            None => {
                score += self.config.unknown_merchant_score;
                factors.push("unknown_merchant");
                details.insert("merchant_id".into(), merchant_id.clone());
                triggered = true;
                action = RiskAction::Review;
            }
            Some(rep) => {
                details.insert("merchant_id".into(), merchant_id.clone());
                details.insert("trust_score".into(), format!("{:.1}", rep.trust_score));
                details.insert("is_verified".into(), rep.is_verified.to_string());

                if rep.trust_score < self.config.high_risk_threshold {
                    score += 30.0;
                    factors.push("very_low_trust");
                    triggered = true;
                    action = action.escalate(RiskAction::Deny);
                } else if rep.trust_score < self.config.low_trust_threshold {
                    score += 15.0;
                    factors.push("low_trust");
                    triggered = true;
                    action = action.escalate(RiskAction::Review);
                }

                let age = Utc::now() - rep.registered_at;
                if age < Duration::days(self.config.new_merchant_days) {
                    score += self.config.new_merchant_score;
                    factors.push("new_merchant");
                    details.insert("merchant_age_days".into(), age.num_days().to_string());
                }

                if rep.dispute_rate >= self.config.high_dispute_rate {
                    score += 20.0;
                    factors.push("high_dispute_rate");
                    details.insert("dispute_rate".into(), format!("{:.1}%", rep.dispute_rate * 100.0));
                    triggered = true;
                }

                if rep.refund_rate >= self.config.high_refund_rate {
                    score += 10.0;
                    factors.push("high_refund_rate");
                    details.insert("refund_rate".into(), format!("{:.1}%", rep.refund_rate * 100.0));
                }

                if rep.is_verified {
                    score = (score - 10.0).max(0.0);
                    factors.push("verified_merchant");
                }
            }
        }

        RuleResult::scored(self.name(), score, self.weight, factors, details, triggered, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx(merchant: Option<&str>) -> PaymentContext {
        PaymentContext {
            agent_id: "ent_a".into(),
            merchant_id: merchant.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn no_merchant_is_clean() {
        let rule = MerchantReputationRule::default();
        let r = rule.evaluate(&ctx(None));
        assert_eq!(r.score, 0.0);
        assert!(!r.triggered);
    }

    #[test]
    fn unknown_merchant_reviews() {
        let rule = MerchantReputationRule::default();
        let r = rule.evaluate(&ctx(Some("mch_mystery")));
        assert_eq!(r.score, 20.0);
        assert!(r.factors.contains(&"unknown_merchant"));
        assert_eq!(r.recommended_action, RiskAction::Review);
    }

    #[test]
    fn very_low_trust_denies() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_bad", 10.0, false, vec![]);
        rule.set_registered_at("mch_bad", Utc::now() - Duration::days(90));

        let r = rule.evaluate(&ctx(Some("mch_bad")));
        assert_eq!(r.recommended_action, RiskAction::Deny);
        assert!(r.factors.contains(&"very_low_trust"));
    }

    #[test]
    fn low_trust_reviews() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_meh", 25.0, false, vec![]);
        rule.set_registered_at("mch_meh", Utc::now() - Duration::days(90));

        let r = rule.evaluate(&ctx(Some("mch_meh")));
        assert_eq!(r.recommended_action, RiskAction::Review);
        assert!(r.factors.contains(&"low_trust"));
        assert_eq!(r.score, 15.0);
    }

    #[test]
    fn new_merchant_penalty() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_new", 50.0, false, vec![]);

        let r = rule.evaluate(&ctx(Some("mch_new")));
        assert!(r.factors.contains(&"new_merchant"));
        assert_eq!(r.score, 15.0);
    }

    #[test]
    fn verified_merchant_gets_discount() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_ok", 50.0, true, vec![]);
        // New merchant (+15) minus verification bonus (−10).
        let r = rule.evaluate(&ctx(Some("mch_ok")));
        assert!(r.factors.contains(&"verified_merchant"));
        assert_eq!(r.score, 5.0);
    }

    #[test]
    fn dispute_rate_penalty() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_d", 50.0, false, vec![]);
        rule.set_registered_at("mch_d", Utc::now() - Duration::days(90));
        // 1 dispute in 10 transactions → 10% dispute rate.
        for _ in 0..9 {
            rule.update_reputation("mch_d", dec!(10), true, false, false);
        }
        rule.update_reputation("mch_d", dec!(10), false, false, true);

        let r = rule.evaluate(&ctx(Some("mch_d")));
        assert!(r.factors.contains(&"high_dispute_rate"));
        assert!(r.triggered);
    }

    #[test]
    fn refund_rate_penalty() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_r", 50.0, false, vec![]);
        rule.set_registered_at("mch_r", Utc::now() - Duration::days(90));
        for _ in 0..8 {
            rule.update_reputation("mch_r", dec!(10), true, false, false);
        }
        for _ in 0..2 {
            rule.update_reputation("mch_r", dec!(10), true, true, false);
        }

        let r = rule.evaluate(&ctx(Some("mch_r")));
        assert!(r.factors.contains(&"high_refund_rate"));
    }

    #[test]
    fn clean_settlements_build_trust() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_good", 50.0, false, vec![]);
        for _ in 0..10 {
            rule.update_reputation("mch_good", dec!(10), true, false, false);
        }
        let rep = rule.reputation("mch_good").unwrap();
        assert!((rep.trust_score - 51.0).abs() < 1e-9);
        assert_eq!(rep.total_transactions, 10);
        assert_eq!(rep.total_volume, dec!(100));
    }

    #[test]
    fn dispute_knocks_trust_down() {
        let rule = MerchantReputationRule::default();
        rule.register_merchant("mch_x", 50.0, false, vec![]);
        rule.update_reputation("mch_x", dec!(10), false, false, true);
        let rep = rule.reputation("mch_x").unwrap();
        assert!((rep.trust_score - 45.0).abs() < 1e-9);
        assert!((rep.dispute_rate - 1.0).abs() < 1e-9);
    }
}
