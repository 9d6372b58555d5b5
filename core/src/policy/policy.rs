//! # Spending Policies
//!
//! The declarative, per-agent ruleset evaluated before every payment:
//! spending scopes, per-transaction and lifetime caps, rolling window
//! limits, merchant allow/deny rules, goal-drift bounds and human-approval
//! thresholds. Evaluation is ordered and first-failure-wins; the reason
//! strings are stable and surface directly in `PaymentResult.error`.
//!
//! Policies serialize round-trip: a rehydrated policy produces identical
//! decisions on identical inputs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rules::{MerchantRule, RuleKind};
use super::window::{TimeWindowLimit, WindowKind};

// ---------------------------------------------------------------------------
// Trust tiers & scopes
// ---------------------------------------------------------------------------

/// Coarse trust tier driving default policy limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Low,
    Medium,
    High,
    Unlimited,
}

/// Categories of spending a policy can admit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendingScope {
    All,
    Retail,
    Digital,
    Services,
    Compute,
    Data,
    AgentToAgent,
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Why a policy rejected a payment. String tags are stable API surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolation {
    ScopeNotAllowed,
    PerTransactionLimit,
    TotalLimit,
    DailyLimit,
    WeeklyLimit,
    MonthlyLimit,
    MerchantBlocked,
    MerchantNotAllowed,
    MerchantSpecificLimit,
    GoalDriftExceeded,
}

impl PolicyViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyViolation::ScopeNotAllowed => "scope_not_allowed",
            PolicyViolation::PerTransactionLimit => "per_transaction_limit",
            PolicyViolation::TotalLimit => "total_limit",
            PolicyViolation::DailyLimit => "daily_limit",
            PolicyViolation::WeeklyLimit => "weekly_limit",
            PolicyViolation::MonthlyLimit => "monthly_limit",
            PolicyViolation::MerchantBlocked => "merchant_blocked",
            PolicyViolation::MerchantNotAllowed => "merchant_not_allowed",
            PolicyViolation::MerchantSpecificLimit => "merchant_specific_limit",
            PolicyViolation::GoalDriftExceeded => "goal_drift_exceeded",
        }
    }

    /// Limit-class violations trigger a `limit.exceeded` event alongside
    /// the payment failure.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            PolicyViolation::PerTransactionLimit
                | PolicyViolation::TotalLimit
                | PolicyViolation::DailyLimit
                | PolicyViolation::WeeklyLimit
                | PolicyViolation::MonthlyLimit
                | PolicyViolation::MerchantSpecificLimit
        )
    }
}

/// Outcome of evaluating a payment against a policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Payment may proceed.
    Approved,
    /// Payment is acceptable but needs a human sign-off (amount above the
    /// approval threshold). Not a rejection.
    RequiresApproval,
    /// Payment is rejected.
    Rejected {
        violation: PolicyViolation,
        message: String,
    },
}

/// The proposed payment, as the evaluator sees it.
#[derive(Clone, Debug)]
pub struct SpendCheck<'a> {
    pub amount: Decimal,
    pub fee: Decimal,
    pub merchant_id: Option<&'a str>,
    pub merchant_category: Option<&'a str>,
    pub scope: SpendingScope,
    pub drift_score: Option<Decimal>,
}

impl<'a> SpendCheck<'a> {
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount,
            fee: Decimal::ZERO,
            merchant_id: None,
            merchant_category: None,
            scope: SpendingScope::All,
            drift_score: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SpendingPolicy
// ---------------------------------------------------------------------------

/// Complete declarative spending policy for one agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpendingPolicy {
    /// Unique policy id (`pol_<uuid>`).
    pub policy_id: String,

    pub agent_id: String,

    pub trust_tier: TrustTier,

    pub limit_per_tx: Decimal,

    pub limit_total: Decimal,

    /// Lifetime spend recorded against `limit_total`.
    pub spent_total: Decimal,

    pub daily_limit: Option<TimeWindowLimit>,
    pub weekly_limit: Option<TimeWindowLimit>,
    pub monthly_limit: Option<TimeWindowLimit>,

    /// Ordered merchant rules; deny rules are checked first regardless of
    /// position, matching first-deny-wins semantics.
    pub merchant_rules: Vec<MerchantRule>,

    /// Admitted spending scopes. Containing `All` admits everything.
    pub allowed_scopes: Vec<SpendingScope>,

    /// Force every payment through the hold/capture flow.
    pub require_preauth: bool,

    /// Payments above this amount park in `PENDING_APPROVAL`.
    pub approval_threshold: Option<Decimal>,

    /// Reject payments whose goal-drift score exceeds this bound.
    pub max_drift_score: Option<Decimal>,

    /// Longest hold this policy permits, in hours.
    pub max_hold_hours: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpendingPolicy {
    pub fn new(agent_id: &str, trust_tier: TrustTier) -> Self {
        let now = Utc::now();
        Self {
            policy_id: format!("pol_{}", Uuid::new_v4().simple()),
            agent_id: agent_id.to_string(),
            trust_tier,
            limit_per_tx: Decimal::new(10000, 2), // 100.00
            limit_total: Decimal::new(100000, 2), // 1000.00
            spent_total: Decimal::ZERO,
            daily_limit: None,
            weekly_limit: None,
            monthly_limit: None,
            merchant_rules: Vec::new(),
            allowed_scopes: vec![SpendingScope::All],
            require_preauth: false,
            approval_threshold: None,
            max_drift_score: None,
            max_hold_hours: crate::config::HOLD_EXPIRATION_HOURS,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds the default policy for a trust tier. The tier table is the
    /// product's onboarding ladder: limits grow with demonstrated history.
    pub fn default_for_tier(agent_id: &str, tier: TrustTier) -> Self {
        let mut policy = Self::new(agent_id, tier);
        let (per_tx, daily, weekly, monthly, total): (
            Decimal,
            Option<Decimal>,
            Option<Decimal>,
            Option<Decimal>,
            Decimal,
        ) = match tier {
            TrustTier::Low => (
                Decimal::from(50),
                Some(Decimal::from(100)),
                Some(Decimal::from(500)),
                Some(Decimal::from(1_000)),
                Decimal::from(5_000),
            ),
            TrustTier::Medium => (
                Decimal::from(500),
                Some(Decimal::from(1_000)),
                Some(Decimal::from(5_000)),
                Some(Decimal::from(10_000)),
                Decimal::from(50_000),
            ),
            TrustTier::High => (
                Decimal::from(5_000),
                Some(Decimal::from(10_000)),
                Some(Decimal::from(50_000)),
                Some(Decimal::from(100_000)),
                Decimal::from(500_000),
            ),
            TrustTier::Unlimited => (
                Decimal::from(999_999_999),
                None,
                None,
                None,
                Decimal::from(999_999_999),
            ),
        };

        policy.limit_per_tx = per_tx;
        policy.limit_total = total;
        policy.daily_limit = daily.map(|l| TimeWindowLimit::new(WindowKind::Daily, l));
        policy.weekly_limit = weekly.map(|l| TimeWindowLimit::new(WindowKind::Weekly, l));
        policy.monthly_limit = monthly.map(|l| TimeWindowLimit::new(WindowKind::Monthly, l));
        policy
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluates a proposed payment. Ordered, first failure wins; mutates
    /// only lazily-reset window state, never the spend counters — those
    /// move in [`record_spend`](Self::record_spend) after the ledger
    /// commit confirms.
    pub fn evaluate(&mut self, check: &SpendCheck<'_>, now: DateTime<Utc>) -> PolicyDecision {
        tracing::trace!(
            agent_id = %self.agent_id,
            amount = %check.amount,
            fee = %check.fee,
            scope = ?check.scope,
            "evaluating spending policy"
        );

        for window in [
            self.daily_limit.as_mut(),
            self.weekly_limit.as_mut(),
            self.monthly_limit.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            window.reset_if_expired(now);
        }

        if !self.allowed_scopes.contains(&SpendingScope::All)
            && !self.allowed_scopes.contains(&check.scope)
        {
            return PolicyDecision::Rejected {
                violation: PolicyViolation::ScopeNotAllowed,
                message: format!("spending scope {:?} is not allowed", check.scope),
            };
        }

        if check.amount > self.limit_per_tx {
            return PolicyDecision::Rejected {
                violation: PolicyViolation::PerTransactionLimit,
                message: format!(
                    "amount {} exceeds per-transaction limit {}",
                    check.amount, self.limit_per_tx
                ),
            };
        }

        if self.spent_total + check.amount > self.limit_total {
            return PolicyDecision::Rejected {
                violation: PolicyViolation::TotalLimit,
                message: format!(
                    "amount {} would exceed total limit {} (spent {})",
                    check.amount, self.limit_total, self.spent_total
                ),
            };
        }

        for (window, violation) in [
            (self.daily_limit.as_mut(), PolicyViolation::DailyLimit),
            (self.weekly_limit.as_mut(), PolicyViolation::WeeklyLimit),
            (self.monthly_limit.as_mut(), PolicyViolation::MonthlyLimit),
        ] {
            if let Some(w) = window {
                if !w.can_spend(check.amount, now) {
                    return PolicyDecision::Rejected {
                        violation,
                        message: format!(
                            "{} limit exceeded: {} + {} > {}",
                            w.kind.as_str(),
                            w.spent,
                            check.amount,
                            w.limit
                        ),
                    };
                }
            }
        }

        if let Some(merchant_id) = check.merchant_id {
            if let Some(decision) =
                self.check_merchant_rules(merchant_id, check.merchant_category, check.amount, now)
            {
                return decision;
            }
        }

        if let (Some(max_drift), Some(drift)) = (self.max_drift_score, check.drift_score) {
            if drift > max_drift {
                return PolicyDecision::Rejected {
                    violation: PolicyViolation::GoalDriftExceeded,
                    message: format!("goal drift score {drift} exceeds maximum {max_drift}"),
                };
            }
        }

        if let Some(threshold) = self.approval_threshold {
            if check.amount > threshold {
                return PolicyDecision::RequiresApproval;
            }
        }

        PolicyDecision::Approved
    }

    /// Deny rules first, then the allowlist (closed once any allow rule
    /// exists), then the matching allow rule's own cap.
    fn check_merchant_rules(
        &self,
        merchant_id: &str,
        category: Option<&str>,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Option<PolicyDecision> {
        for rule in self
            .merchant_rules
            .iter()
            .filter(|r| r.kind == RuleKind::Deny)
        {
            if rule.matches(merchant_id, category, now) {
                return Some(PolicyDecision::Rejected {
                    violation: PolicyViolation::MerchantBlocked,
                    message: format!(
                        "merchant {merchant_id} is blocked: {}",
                        rule.reason.as_deref().unwrap_or("policy restriction")
                    ),
                });
            }
        }

        let allow_rules: Vec<&MerchantRule> = self
            .merchant_rules
            .iter()
            .filter(|r| r.kind == RuleKind::Allow && r.is_active(now))
            .collect();

        if !allow_rules.is_empty() {
            let matching = allow_rules
                .iter()
                .find(|r| r.matches(merchant_id, category, now));
            match matching {
                None => {
                    return Some(PolicyDecision::Rejected {
                        violation: PolicyViolation::MerchantNotAllowed,
                        message: format!("merchant {merchant_id} is not in the allowlist"),
                    });
                }
                Some(rule) => {
                    if let Some(cap) = rule.max_per_tx {
                        if amount > cap {
                            return Some(PolicyDecision::Rejected {
                                violation: PolicyViolation::MerchantSpecificLimit,
                                message: format!(
                                    "amount {amount} exceeds merchant-specific limit {cap}"
                                ),
                            });
                        }
                    }
                }
            }
        }

        None
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Records a confirmed spend against the lifetime counter and every
    /// configured window. Called only after the ledger commit succeeds.
    pub fn record_spend(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.spent_total += amount;
        for window in [
            self.daily_limit.as_mut(),
            self.weekly_limit.as_mut(),
            self.monthly_limit.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            window.record_spend(amount, now);
        }
        self.updated_at = now;
    }

    /// Releases a reservation previously recorded against the lifetime
    /// counter (hold voided or capture failed).
    pub fn release_spend(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.spent_total = (self.spent_total - amount).max(Decimal::ZERO);
        for window in [
            self.daily_limit.as_mut(),
            self.weekly_limit.as_mut(),
            self.monthly_limit.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            window.spent = (window.spent - amount).max(Decimal::ZERO);
        }
        self.updated_at = now;
    }

    /// Remaining lifetime headroom.
    pub fn remaining_total(&self) -> Decimal {
        (self.limit_total - self.spent_total).max(Decimal::ZERO)
    }

    // -----------------------------------------------------------------------
    // Rule management
    // -----------------------------------------------------------------------

    /// Appends an allow rule.
    pub fn add_rule(&mut self, rule: MerchantRule) {
        if rule.kind == RuleKind::Deny {
            // Deny rules lead the list so audits read in match order.
            self.merchant_rules.insert(0, rule);
        } else {
            self.merchant_rules.push(rule);
        }
        self.updated_at = Utc::now();
    }

    /// Removes a rule by id. Returns `true` if something was removed.
    pub fn remove_rule(&mut self, rule_id: &str) -> bool {
        let before = self.merchant_rules.len();
        self.merchant_rules.retain(|r| r.rule_id != rule_id);
        let removed = self.merchant_rules.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn policy() -> SpendingPolicy {
        SpendingPolicy::default_for_tier("ent_agent", TrustTier::Medium)
    }

    fn approve(p: &mut SpendingPolicy, check: &SpendCheck<'_>) -> PolicyDecision {
        p.evaluate(check, Utc::now())
    }

    #[test]
    fn tier_defaults() {
        let low = SpendingPolicy::default_for_tier("a", TrustTier::Low);
        assert_eq!(low.limit_per_tx, dec!(50));
        assert_eq!(low.daily_limit.as_ref().unwrap().limit, dec!(100));

        let unlimited = SpendingPolicy::default_for_tier("a", TrustTier::Unlimited);
        assert!(unlimited.daily_limit.is_none());
        assert!(unlimited.monthly_limit.is_none());
    }

    #[test]
    fn approves_within_all_limits() {
        let mut p = policy();
        assert_eq!(
            approve(&mut p, &SpendCheck::amount(dec!(100))),
            PolicyDecision::Approved
        );
    }

    #[test]
    fn rejects_disallowed_scope() {
        let mut p = policy();
        p.allowed_scopes = vec![SpendingScope::Compute, SpendingScope::Data];

        let mut check = SpendCheck::amount(dec!(10));
        check.scope = SpendingScope::Retail;
        match p.evaluate(&check, Utc::now()) {
            PolicyDecision::Rejected { violation, .. } => {
                assert_eq!(violation, PolicyViolation::ScopeNotAllowed)
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        check.scope = SpendingScope::Compute;
        assert_eq!(p.evaluate(&check, Utc::now()), PolicyDecision::Approved);
    }

    #[test]
    fn rejects_over_per_tx() {
        let mut p = policy();
        match approve(&mut p, &SpendCheck::amount(dec!(500.01))) {
            PolicyDecision::Rejected { violation, .. } => {
                assert_eq!(violation, PolicyViolation::PerTransactionLimit)
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejects_over_lifetime_total() {
        let mut p = policy();
        p.spent_total = dec!(49_900);
        match approve(&mut p, &SpendCheck::amount(dec!(200))) {
            PolicyDecision::Rejected { violation, .. } => {
                assert_eq!(violation, PolicyViolation::TotalLimit)
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejects_over_daily_window() {
        let mut p = policy();
        let now = Utc::now();
        p.record_spend(dec!(950), now);
        match p.evaluate(&SpendCheck::amount(dec!(100)), now) {
            PolicyDecision::Rejected { violation, .. } => {
                assert_eq!(violation, PolicyViolation::DailyLimit)
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn window_decay_restores_headroom() {
        let mut p = policy();
        let start = Utc::now();
        p.record_spend(dec!(1000), start);
        assert!(matches!(
            p.evaluate(&SpendCheck::amount(dec!(10)), start),
            PolicyDecision::Rejected { .. }
        ));

        let next_day = start + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(
            p.evaluate(&SpendCheck::amount(dec!(10)), next_day),
            PolicyDecision::Approved
        );
        assert_eq!(p.daily_limit.as_ref().unwrap().spent, dec!(0));
    }

    #[test]
    fn deny_rule_blocks_merchant() {
        let mut p = policy();
        p.add_rule(MerchantRule::deny(Some("mch_bad"), None).with_reason("chargebacks"));

        let mut check = SpendCheck::amount(dec!(10));
        check.merchant_id = Some("mch_bad");
        match p.evaluate(&check, Utc::now()) {
            PolicyDecision::Rejected { violation, message } => {
                assert_eq!(violation, PolicyViolation::MerchantBlocked);
                assert!(message.contains("chargebacks"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn deny_by_category() {
        let mut p = policy();
        p.add_rule(MerchantRule::deny(None, Some("gambling")));

        let mut check = SpendCheck::amount(dec!(10));
        check.merchant_id = Some("mch_casino");
        check.merchant_category = Some("gambling");
        assert!(matches!(
            p.evaluate(&check, Utc::now()),
            PolicyDecision::Rejected {
                violation: PolicyViolation::MerchantBlocked,
                ..
            }
        ));
    }

    #[test]
    fn allowlist_closes_once_present() {
        let mut p = policy();
        p.add_rule(MerchantRule::allow(Some("mch_ok"), None));

        let mut check = SpendCheck::amount(dec!(10));
        check.merchant_id = Some("mch_other");
        assert!(matches!(
            p.evaluate(&check, Utc::now()),
            PolicyDecision::Rejected {
                violation: PolicyViolation::MerchantNotAllowed,
                ..
            }
        ));

        check.merchant_id = Some("mch_ok");
        assert_eq!(p.evaluate(&check, Utc::now()), PolicyDecision::Approved);
    }

    #[test]
    fn allow_rule_cap_applies() {
        let mut p = policy();
        p.add_rule(MerchantRule::allow(Some("mch_ok"), None).with_max_per_tx(dec!(25)));

        let mut check = SpendCheck::amount(dec!(30));
        check.merchant_id = Some("mch_ok");
        assert!(matches!(
            p.evaluate(&check, Utc::now()),
            PolicyDecision::Rejected {
                violation: PolicyViolation::MerchantSpecificLimit,
                ..
            }
        ));
    }

    #[test]
    fn deny_wins_over_allow() {
        let mut p = policy();
        p.add_rule(MerchantRule::allow(Some("mch_x"), None));
        p.add_rule(MerchantRule::deny(Some("mch_x"), None));

        let mut check = SpendCheck::amount(dec!(10));
        check.merchant_id = Some("mch_x");
        assert!(matches!(
            p.evaluate(&check, Utc::now()),
            PolicyDecision::Rejected {
                violation: PolicyViolation::MerchantBlocked,
                ..
            }
        ));
    }

    #[test]
    fn no_merchant_skips_merchant_rules() {
        let mut p = policy();
        p.add_rule(MerchantRule::allow(Some("mch_only"), None));
        // Direct wallet transfer: allowlist does not apply.
        assert_eq!(
            approve(&mut p, &SpendCheck::amount(dec!(10))),
            PolicyDecision::Approved
        );
    }

    #[test]
    fn drift_above_bound_rejected() {
        let mut p = policy();
        p.max_drift_score = Some(dec!(0.5));

        let mut check = SpendCheck::amount(dec!(10));
        check.drift_score = Some(dec!(0.8));
        assert!(matches!(
            p.evaluate(&check, Utc::now()),
            PolicyDecision::Rejected {
                violation: PolicyViolation::GoalDriftExceeded,
                ..
            }
        ));

        check.drift_score = Some(dec!(0.3));
        assert_eq!(p.evaluate(&check, Utc::now()), PolicyDecision::Approved);

        // No score provided means no drift check.
        check.drift_score = None;
        assert_eq!(p.evaluate(&check, Utc::now()), PolicyDecision::Approved);
    }

    #[test]
    fn approval_threshold_is_not_a_rejection() {
        let mut p = policy();
        p.approval_threshold = Some(dec!(100));

        assert_eq!(
            approve(&mut p, &SpendCheck::amount(dec!(100))),
            PolicyDecision::Approved
        );
        assert_eq!(
            approve(&mut p, &SpendCheck::amount(dec!(100.01))),
            PolicyDecision::RequiresApproval
        );
    }

    #[test]
    fn record_and_release_spend() {
        let mut p = policy();
        let now = Utc::now();
        p.record_spend(dec!(300), now);
        assert_eq!(p.spent_total, dec!(300));
        assert_eq!(p.daily_limit.as_ref().unwrap().spent, dec!(300));

        p.release_spend(dec!(100), now);
        assert_eq!(p.spent_total, dec!(200));
        assert_eq!(p.daily_limit.as_ref().unwrap().spent, dec!(200));
    }

    #[test]
    fn serde_roundtrip_preserves_decisions() {
        let mut p = policy();
        p.add_rule(MerchantRule::deny(Some("mch_bad"), None));
        p.approval_threshold = Some(dec!(200));
        p.record_spend(dec!(123.45), Utc::now());

        let json = serde_json::to_string(&p).unwrap();
        let mut back: SpendingPolicy = serde_json::from_str(&json).unwrap();

        let now = Utc::now();
        let mut check = SpendCheck::amount(dec!(50));
        check.merchant_id = Some("mch_bad");
        assert_eq!(p.evaluate(&check, now), back.evaluate(&check, now));

        let check2 = SpendCheck::amount(dec!(250));
        assert_eq!(p.evaluate(&check2, now), back.evaluate(&check2, now));
        assert_eq!(back.spent_total, dec!(123.45));
    }
}
