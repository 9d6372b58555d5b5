//! # Agent Risk Profiles
//!
//! Long-lived per-agent counters the risk engine builds its context from:
//! transaction totals, failure counts, rolling hour/day activity, averages
//! and flags. Updated only after a payment reaches a terminal outcome.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Historical risk counters for one agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRiskProfile {
    /// Unique profile id (`risk_<uuid>`).
    pub profile_id: String,
    pub agent_id: String,

    /// Last aggregated score from the pipeline.
    pub current_score: f64,

    pub total_transactions: u64,
    pub failed_transactions: u64,
    pub total_volume: Decimal,

    /// Activity counters maintained against the last-transaction gap.
    pub transactions_last_hour: u32,
    pub transactions_last_day: u32,
    pub last_transaction_at: Option<DateTime<Utc>>,

    pub average_transaction: Decimal,
    pub max_transaction: Decimal,

    /// Flagged agents are denied outright until unflagged.
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub flagged_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRiskProfile {
    pub fn new(agent_id: &str) -> Self {
        let now = Utc::now();
        Self {
            profile_id: format!("risk_{}", Uuid::new_v4().simple()),
            agent_id: agent_id.to_string(),
            current_score: 0.0,
            total_transactions: 0,
            failed_transactions: 0,
            total_volume: Decimal::ZERO,
            transactions_last_hour: 0,
            transactions_last_day: 0,
            last_transaction_at: None,
            average_transaction: Decimal::ZERO,
            max_transaction: Decimal::ZERO,
            is_flagged: false,
            flag_reason: None,
            flagged_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds one terminal transaction outcome into the counters.
    pub fn record_transaction(&mut self, amount: Decimal, success: bool, now: DateTime<Utc>) {
        self.total_transactions += 1;
        if !success {
            self.failed_transactions += 1;
        }
        self.total_volume += amount;
        self.average_transaction = self.total_volume / Decimal::from(self.total_transactions);
        if amount > self.max_transaction {
            self.max_transaction = amount;
        }

        // Rolling counters: a gap longer than the window restarts it.
        match self.last_transaction_at {
            Some(last) if now - last <= Duration::hours(1) => self.transactions_last_hour += 1,
            _ => self.transactions_last_hour = 1,
        }
        match self.last_transaction_at {
            Some(last) if now - last <= Duration::hours(24) => self.transactions_last_day += 1,
            _ => self.transactions_last_day = 1,
        }

        self.last_transaction_at = Some(now);
        self.updated_at = now;
    }

    pub fn flag(&mut self, reason: &str) {
        self.is_flagged = true;
        self.flag_reason = Some(reason.to_string());
        self.flagged_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn unflag(&mut self) {
        self.is_flagged = false;
        self.flag_reason = None;
        self.flagged_at = None;
        self.updated_at = Utc::now();
    }
}

/// Concurrent profile store.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: DashMap<String, AgentRiskProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRiskProfile> {
        self.profiles.get(agent_id).map(|p| p.clone())
    }

    /// Returns the agent's profile, creating an empty one if absent.
    pub fn get_or_create(&self, agent_id: &str) -> AgentRiskProfile {
        self.profiles
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRiskProfile::new(agent_id))
            .clone()
    }

    pub fn update<F>(&self, agent_id: &str, f: F)
    where
        F: FnOnce(&mut AgentRiskProfile),
    {
        let mut entry = self
            .profiles
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRiskProfile::new(agent_id));
        f(&mut entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn record_updates_counters_and_averages() {
        let mut p = AgentRiskProfile::new("ent_a");
        let now = Utc::now();
        p.record_transaction(dec!(10), true, now);
        p.record_transaction(dec!(30), false, now);

        assert_eq!(p.total_transactions, 2);
        assert_eq!(p.failed_transactions, 1);
        assert_eq!(p.total_volume, dec!(40));
        assert_eq!(p.average_transaction, dec!(20));
        assert_eq!(p.max_transaction, dec!(30));
    }

    #[test]
    fn hourly_counter_resets_after_gap() {
        let mut p = AgentRiskProfile::new("ent_a");
        let t0 = Utc::now();
        p.record_transaction(dec!(1), true, t0);
        p.record_transaction(dec!(1), true, t0 + Duration::minutes(10));
        assert_eq!(p.transactions_last_hour, 2);

        p.record_transaction(dec!(1), true, t0 + Duration::hours(3));
        assert_eq!(p.transactions_last_hour, 1);
        // Still within the day window.
        assert_eq!(p.transactions_last_day, 3);
    }

    #[test]
    fn daily_counter_resets_after_gap() {
        let mut p = AgentRiskProfile::new("ent_a");
        let t0 = Utc::now();
        p.record_transaction(dec!(1), true, t0);
        p.record_transaction(dec!(1), true, t0 + Duration::hours(30));
        assert_eq!(p.transactions_last_day, 1);
    }

    #[test]
    fn flag_and_unflag() {
        let mut p = AgentRiskProfile::new("ent_a");
        p.flag("manual review");
        assert!(p.is_flagged);
        assert_eq!(p.flag_reason.as_deref(), Some("manual review"));

        p.unflag();
        assert!(!p.is_flagged);
        assert!(p.flag_reason.is_none());
    }

    #[test]
    fn store_get_or_create_is_stable() {
        let store = ProfileStore::new();
        let first = store.get_or_create("ent_a");
        let second = store.get_or_create("ent_a");
        assert_eq!(first.profile_id, second.profile_id);
    }
}
