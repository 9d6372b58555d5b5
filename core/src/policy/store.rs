//! # Policy Store
//!
//! Per-agent policy registry. Each evaluation or spend-recording runs
//! under the agent's map shard lock, so two payments from the same agent
//! serialize their policy reads. The two-phase shape — evaluate, commit to
//! the ledger, then record — means the counters are advisory between the
//! phases; the ledger balance check is the authoritative guard.

use dashmap::DashMap;
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

use super::policy::{PolicyDecision, SpendCheck, SpendingPolicy, TrustTier};

/// Concurrent per-agent policy store.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: DashMap<String, SpendingPolicy>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) an agent's policy.
    pub fn set(&self, policy: SpendingPolicy) {
        self.policies.insert(policy.agent_id.clone(), policy);
    }

    /// Fetches a snapshot of an agent's policy.
    pub fn get(&self, agent_id: &str) -> Option<SpendingPolicy> {
        self.policies.get(agent_id).map(|p| p.clone())
    }

    /// Returns the agent's policy, installing tier defaults if absent.
    pub fn ensure(&self, agent_id: &str, tier: TrustTier) -> SpendingPolicy {
        self.policies
            .entry(agent_id.to_string())
            .or_insert_with(|| SpendingPolicy::default_for_tier(agent_id, tier))
            .clone()
    }

    /// Evaluates a proposed spend under the agent's lock. Agents without a
    /// policy get LOW-tier defaults — new principals start restricted.
    pub fn evaluate(
        &self,
        agent_id: &str,
        check: &SpendCheck<'_>,
        now: DateTime<Utc>,
    ) -> PolicyDecision {
        let mut entry = self
            .policies
            .entry(agent_id.to_string())
            .or_insert_with(|| SpendingPolicy::default_for_tier(agent_id, TrustTier::Low));
        entry.evaluate(check, now)
    }

    /// Records a confirmed spend against the agent's counters.
    pub fn record_spend(&self, agent_id: &str, amount: Decimal, now: DateTime<Utc>) {
        if let Some(mut entry) = self.policies.get_mut(agent_id) {
            entry.record_spend(amount, now);
        }
    }

    /// Releases a reservation from the agent's counters.
    pub fn release_spend(&self, agent_id: &str, amount: Decimal, now: DateTime<Utc>) {
        if let Some(mut entry) = self.policies.get_mut(agent_id) {
            entry.release_spend(amount, now);
        }
    }

    /// Applies a mutation to an agent's policy (rule management, limit
    /// updates) under its lock.
    pub fn update<F>(&self, agent_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut SpendingPolicy),
    {
        match self.policies.get_mut(agent_id) {
            Some(mut entry) => {
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Whether the agent's policy forces the pre-authorization flow.
    pub fn requires_preauth(&self, agent_id: &str) -> bool {
        self.policies
            .get(agent_id)
            .map(|p| p.require_preauth)
            .unwrap_or(false)
    }

    /// The agent's approval threshold, if configured.
    pub fn approval_threshold(&self, agent_id: &str) -> Option<Decimal> {
        self.policies.get(agent_id).and_then(|p| p.approval_threshold)
    }
}
