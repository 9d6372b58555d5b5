//! # Settlement Boundary
//!
//! The optional bridge to an external settlement rail. The core is
//! complete without it: all ledger semantics are internal, and a driver
//! only mirrors completed transactions outward. Driver failures are
//! logged and never affect payment results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the core hands a driver for one completed transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub internal_tx_id: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Settlement lifecycle on the external rail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Immutable record of one external settlement attempt, attached to the
/// originating transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnChainRecord {
    pub chain: String,
    pub tx_hash: String,
    pub status: SettlementStatus,
    pub explorer_url: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl OnChainRecord {
    pub fn is_confirmed(&self) -> bool {
        self.status == SettlementStatus::Confirmed
    }
}

#[derive(Debug, Error)]
#[error("settlement driver error: {0}")]
pub struct SettlementError(pub String);

/// Abstract settlement rail. Implementations own their keys, RPC
/// endpoints and confirmation tracking — none of that crosses this
/// boundary.
#[async_trait]
pub trait SettlementDriver: Send + Sync {
    async fn submit(&self, request: SettlementRequest) -> Result<OnChainRecord, SettlementError>;
}
