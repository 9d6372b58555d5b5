//! # Principals — Agents & Merchants
//!
//! A principal is anything that can own a wallet. Agents are the spending
//! side: autonomous software owned by a developer, bounded by a spending
//! policy. Merchants are the receiving side: they carry category and
//! verification metadata consumed by the risk engine, and their receive
//! limits are effectively unbounded.
//!
//! Principals are never deleted. Deactivation flips a flag and preserves
//! the audit trail; every ledger entry that references a principal's wallet
//! must stay resolvable forever.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrincipalError {
    #[error("agent {0} not found")]
    AgentNotFound(String),

    #[error("merchant {0} not found")]
    MerchantNotFound(String),
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// An autonomous software principal that owns a wallet and initiates
/// payments on behalf of its developer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent id (`ent_<uuid>`).
    pub agent_id: String,

    /// Developer (account) that owns this agent.
    pub developer_id: String,

    /// Human-readable name.
    pub name: String,

    /// The single wallet this agent spends from.
    pub wallet_id: String,

    /// Free-form description of the agent's purpose. Feeds goal-drift
    /// scoring upstream; the core only stores it.
    pub description: Option<String>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(developer_id: &str, name: &str, wallet_id: &str) -> Self {
        let now = Utc::now();
        Self {
            agent_id: format!("ent_{}", Uuid::new_v4().simple()),
            developer_id: developer_id.to_string(),
            name: name.to_string(),
            wallet_id: wallet_id.to_string(),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Merchant
// ---------------------------------------------------------------------------

/// A receiving principal. Carries the reputation-relevant metadata the
/// risk engine reads; holds a wallet like any other principal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Merchant {
    /// Unique merchant id (`mch_<uuid>`).
    pub merchant_id: String,

    /// Account that registered this merchant.
    pub owner_id: String,

    pub name: String,

    /// The wallet that receives this merchant's settlements.
    pub wallet_id: String,

    /// Merchant category (e.g. "compute", "data", "retail"). Matched by
    /// policy merchant rules and risk category checks.
    pub category: Option<String>,

    /// Verified merchants get a reputation bonus in risk scoring.
    pub is_verified: bool,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(owner_id: &str, name: &str, wallet_id: &str, category: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            merchant_id: format!("mch_{}", Uuid::new_v4().simple()),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            wallet_id: wallet_id.to_string(),
            category: category.map(str::to_string),
            is_verified: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// PrincipalRegistry
// ---------------------------------------------------------------------------

/// Concurrent store of agents and merchants.
#[derive(Debug, Default)]
pub struct PrincipalRegistry {
    agents: DashMap<String, Agent>,
    merchants: DashMap<String, Merchant>,
}

impl PrincipalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_agent(&self, agent: Agent) -> Agent {
        self.agents.insert(agent.agent_id.clone(), agent.clone());
        agent
    }

    pub fn insert_merchant(&self, merchant: Merchant) -> Merchant {
        self.merchants
            .insert(merchant.merchant_id.clone(), merchant.clone());
        merchant
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    pub fn get_merchant(&self, merchant_id: &str) -> Option<Merchant> {
        self.merchants.get(merchant_id).map(|m| m.clone())
    }

    pub fn list_agents(&self, developer_id: Option<&str>) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|a| developer_id.map_or(true, |d| a.developer_id == d))
            .map(|a| a.clone())
            .collect()
    }

    pub fn list_merchants(&self) -> Vec<Merchant> {
        self.merchants.iter().map(|m| m.clone()).collect()
    }

    /// Soft-deactivates an agent. The record remains for auditing.
    pub fn deactivate_agent(&self, agent_id: &str) -> Result<Agent, PrincipalError> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| PrincipalError::AgentNotFound(agent_id.to_string()))?;
        entry.is_active = false;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Soft-deactivates a merchant.
    pub fn deactivate_merchant(&self, merchant_id: &str) -> Result<Merchant, PrincipalError> {
        let mut entry = self
            .merchants
            .get_mut(merchant_id)
            .ok_or_else(|| PrincipalError::MerchantNotFound(merchant_id.to_string()))?;
        entry.is_active = false;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Marks a merchant verified (reputation bonus in risk scoring).
    pub fn verify_merchant(&self, merchant_id: &str) -> Result<Merchant, PrincipalError> {
        let mut entry = self
            .merchants
            .get_mut(merchant_id)
            .ok_or_else(|| PrincipalError::MerchantNotFound(merchant_id.to_string()))?;
        entry.is_verified = true;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
