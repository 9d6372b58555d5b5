//! # Time-Window Limits
//!
//! A [`TimeWindowLimit`] bounds spending within a rolling window (daily,
//! weekly, monthly). Windows reset lazily: expiry is evaluated on the next
//! read, never by a background task. After `now >= window_start + duration`
//! the spent counter clears and the window restarts at `now`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config;

/// Which rolling window a limit covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Daily,
    Weekly,
    Monthly,
}

impl WindowKind {
    /// Window length. Monthly is 30 flat days.
    pub fn duration(&self) -> Duration {
        let d = match self {
            WindowKind::Daily => config::WINDOW_DAILY,
            WindowKind::Weekly => config::WINDOW_WEEKLY,
            WindowKind::Monthly => config::WINDOW_MONTHLY,
        };
        Duration::from_std(d).expect("window durations are in range")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Daily => "daily",
            WindowKind::Weekly => "weekly",
            WindowKind::Monthly => "monthly",
        }
    }
}

/// Spending limit over one rolling window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeWindowLimit {
    pub kind: WindowKind,
    pub limit: Decimal,
    pub spent: Decimal,
    pub window_start: DateTime<Utc>,
}

impl TimeWindowLimit {
    pub fn new(kind: WindowKind, limit: Decimal) -> Self {
        Self {
            kind,
            limit,
            spent: Decimal::ZERO,
            window_start: Utc::now(),
        }
    }

    /// Clears the window if it has lapsed. Returns `true` on reset.
    pub fn reset_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        if now >= self.window_start + self.kind.duration() {
            self.spent = Decimal::ZERO;
            self.window_start = now;
            true
        } else {
            false
        }
    }

    /// Headroom left in the current window.
    pub fn remaining(&mut self, now: DateTime<Utc>) -> Decimal {
        self.reset_if_expired(now);
        (self.limit - self.spent).max(Decimal::ZERO)
    }

    /// Whether `amount` fits in the current window.
    pub fn can_spend(&mut self, amount: Decimal, now: DateTime<Utc>) -> bool {
        self.reset_if_expired(now);
        self.spent + amount <= self.limit
    }

    /// Counts a confirmed spend against the window.
    pub fn record_spend(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.reset_if_expired(now);
        self.spent += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fresh_window_allows_up_to_limit() {
        let mut w = TimeWindowLimit::new(WindowKind::Daily, dec!(100));
        let now = Utc::now();
        assert!(w.can_spend(dec!(100), now));
        assert!(!w.can_spend(dec!(100.01), now));
    }

    #[test]
    fn spend_accumulates_within_window() {
        let mut w = TimeWindowLimit::new(WindowKind::Daily, dec!(100));
        let now = Utc::now();
        w.record_spend(dec!(60), now);
        assert!(w.can_spend(dec!(40), now));
        assert!(!w.can_spend(dec!(40.01), now));
        assert_eq!(w.remaining(now), dec!(40));
    }

    #[test]
    fn window_decays_after_duration() {
        let mut w = TimeWindowLimit::new(WindowKind::Daily, dec!(100));
        let start = Utc::now();
        w.record_spend(dec!(100), start);
        assert!(!w.can_spend(dec!(1), start));

        // One second past the window boundary: counter clears.
        let later = start + WindowKind::Daily.duration() + Duration::seconds(1);
        assert!(w.can_spend(dec!(100), later));
        assert_eq!(w.spent, dec!(0));
        assert_eq!(w.window_start, later);
    }

    #[test]
    fn window_does_not_decay_early() {
        let mut w = TimeWindowLimit::new(WindowKind::Weekly, dec!(500));
        let start = Utc::now();
        w.record_spend(dec!(500), start);

        let almost = start + WindowKind::Weekly.duration() - Duration::seconds(1);
        assert!(!w.can_spend(dec!(1), almost));
    }

    #[test]
    fn durations_by_kind() {
        assert_eq!(WindowKind::Daily.duration(), Duration::hours(24));
        assert_eq!(WindowKind::Weekly.duration(), Duration::days(7));
        assert_eq!(WindowKind::Monthly.duration(), Duration::days(30));
    }

    #[test]
    fn serde_roundtrip() {
        let mut w = TimeWindowLimit::new(WindowKind::Monthly, dec!(1000));
        w.record_spend(dec!(250), Utc::now());

        let json = serde_json::to_string(&w).unwrap();
        let back: TimeWindowLimit = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, WindowKind::Monthly);
        assert_eq!(back.spent, dec!(250));
        assert_eq!(back.window_start, w.window_start);
    }
}
