//! # Policy Module
//!
//! The declarative half of the pre-payment gate: per-agent spending
//! policies with trust tiers, rolling window limits, merchant rules,
//! spending scopes, goal-drift bounds and approval thresholds. The
//! statistical half lives in [`crate::risk`].

pub mod policy;
pub mod rules;
pub mod store;
pub mod window;

pub use policy::{
    PolicyDecision, PolicyViolation, SpendCheck, SpendingPolicy, SpendingScope, TrustTier,
};
pub use rules::{MerchantRule, RuleKind};
pub use store::PolicyStore;
pub use window::{TimeWindowLimit, WindowKind};
