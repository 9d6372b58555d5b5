//! # Fee Pricing
//!
//! The orchestrator delegates fee computation to a [`FeePricer`]. The
//! default is a flat per-currency schedule — agent traffic is many small
//! payments, and a percentage model would tax exactly the flows the
//! platform exists for.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config;

/// Prices the fee for a prospective payment.
pub trait FeePricer: Send + Sync {
    fn fee(&self, amount: Decimal, currency: &str) -> Decimal;
}

/// Flat fee per currency with a fallback default.
#[derive(Clone, Debug)]
pub struct FlatFeeSchedule {
    default_fee: Decimal,
    per_currency: HashMap<String, Decimal>,
}

impl FlatFeeSchedule {
    pub fn new(default_fee: Decimal) -> Self {
        Self {
            default_fee,
            per_currency: HashMap::new(),
        }
    }

    /// Schedule with no fees at all. Used by tests and internal flows.
    pub fn free() -> Self {
        Self::new(Decimal::ZERO)
    }

    pub fn with_currency_fee(mut self, currency: &str, fee: Decimal) -> Self {
        self.per_currency.insert(currency.to_string(), fee);
        self
    }
}

impl Default for FlatFeeSchedule {
    fn default() -> Self {
        Self::new(config::default_flat_fee())
    }
}

impl FeePricer for FlatFeeSchedule {
    fn fee(&self, _amount: Decimal, currency: &str) -> Decimal {
        self.per_currency
            .get(currency)
            .copied()
            .unwrap_or(self.default_fee)
    }
}
