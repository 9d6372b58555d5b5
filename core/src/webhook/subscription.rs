//! # Webhook Subscriptions
//!
//! A subscription binds an owner's HTTPS endpoint to a set of event types
//! (empty set = everything) with a per-subscription HMAC secret and
//! delivery counters.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventType;

/// One registered webhook endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique subscription id (`whsub_<uuid>`).
    pub subscription_id: String,

    /// Developer or agent that owns this endpoint.
    pub owner_id: String,

    pub url: String,

    /// Event types to deliver. Empty means all.
    pub events: Vec<EventType>,

    /// HMAC secret (`whsec_<hex>`). Shown once at creation in the real
    /// API; stored in full here.
    pub secret: String,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(owner_id: &str, url: &str, events: Vec<EventType>) -> Self {
        Self {
            subscription_id: format!("whsub_{}", Uuid::new_v4().simple()),
            owner_id: owner_id.to_string(),
            url: url.to_string(),
            events,
            secret: generate_secret(),
            is_active: true,
            created_at: Utc::now(),
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_delivery_at: None,
        }
    }

    /// Whether this subscription wants the given event type.
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.is_empty() || self.events.contains(&event_type)
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}
