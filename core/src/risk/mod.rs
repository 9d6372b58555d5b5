//! # Risk Module
//!
//! The statistical half of the pre-payment gate: a weighted pipeline of
//! composable rules (velocity, amount anomaly, merchant reputation,
//! behavior fingerprint, failure patterns) aggregated into a single
//! APPROVE / REVIEW / DENY decision. Rule state updates only after a
//! payment reaches a terminal outcome; evaluation itself is read-only.

pub mod amount;
pub mod behavior;
pub mod context;
pub mod engine;
pub mod failure;
pub mod merchant;
pub mod profile;
pub mod velocity;

pub use amount::{AmountAnomalyRule, AmountConfig};
pub use behavior::{BehaviorConfig, BehaviorFingerprintRule, BehaviorProfile};
pub use context::{PaymentContext, RiskAction, RiskRule, RuleResult};
pub use engine::{RiskDecision, RiskEngine, RiskEvaluation};
pub use failure::{FailureConfig, FailurePatternRule};
pub use merchant::{MerchantConfig, MerchantReputation, MerchantReputationRule};
pub use profile::{AgentRiskProfile, ProfileStore};
pub use velocity::{VelocityConfig, VelocityRule};
