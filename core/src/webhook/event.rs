//! # Webhook Events
//!
//! Every observable state change in the platform is described by an
//! [`Event`]: a stable string type tag, a JSON payload, and an envelope
//! `{ id, type, data, created_at, api_version }`. Monetary values are
//! encoded as strings and timestamps as RFC 3339 — subscribers parse
//! money with decimal libraries, not floats.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// The full event taxonomy. String tags are frozen API surface; the
/// serde names match the dotted wire form exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "payment.initiated")]
    PaymentInitiated,
    #[serde(rename = "payment.completed")]
    PaymentCompleted,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,

    #[serde(rename = "wallet.created")]
    WalletCreated,
    #[serde(rename = "wallet.funded")]
    WalletFunded,
    #[serde(rename = "wallet.updated")]
    WalletUpdated,
    #[serde(rename = "wallet.deactivated")]
    WalletDeactivated,

    #[serde(rename = "limit.exceeded")]
    LimitExceeded,
    #[serde(rename = "limit.warning")]
    LimitWarning,
    #[serde(rename = "limit.updated")]
    LimitUpdated,

    #[serde(rename = "agent.created")]
    AgentCreated,
    #[serde(rename = "agent.updated")]
    AgentUpdated,
    #[serde(rename = "agent.deactivated")]
    AgentDeactivated,

    #[serde(rename = "hold.created")]
    HoldCreated,
    #[serde(rename = "hold.captured")]
    HoldCaptured,
    #[serde(rename = "hold.voided")]
    HoldVoided,

    #[serde(rename = "risk.alert")]
    RiskAlert,
    #[serde(rename = "fraud.detected")]
    FraudDetected,

    #[serde(rename = "service.authorized")]
    ServiceAuthorized,
    #[serde(rename = "service.revoked")]
    ServiceRevoked,

    #[serde(rename = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "merchant.payout")]
    MerchantPayout,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PaymentInitiated => "payment.initiated",
            EventType::PaymentCompleted => "payment.completed",
            EventType::PaymentFailed => "payment.failed",
            EventType::PaymentRefunded => "payment.refunded",
            EventType::WalletCreated => "wallet.created",
            EventType::WalletFunded => "wallet.funded",
            EventType::WalletUpdated => "wallet.updated",
            EventType::WalletDeactivated => "wallet.deactivated",
            EventType::LimitExceeded => "limit.exceeded",
            EventType::LimitWarning => "limit.warning",
            EventType::LimitUpdated => "limit.updated",
            EventType::AgentCreated => "agent.created",
            EventType::AgentUpdated => "agent.updated",
            EventType::AgentDeactivated => "agent.deactivated",
            EventType::HoldCreated => "hold.created",
            EventType::HoldCaptured => "hold.captured",
            EventType::HoldVoided => "hold.voided",
            EventType::RiskAlert => "risk.alert",
            EventType::FraudDetected => "fraud.detected",
            EventType::ServiceAuthorized => "service.authorized",
            EventType::ServiceRevoked => "service.revoked",
            EventType::InvoiceCreated => "invoice.created",
            EventType::InvoicePaid => "invoice.paid",
            EventType::MerchantPayout => "merchant.payout",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown event type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One emitted event. The payload is free-form JSON assembled by the
/// emitter; decimals must already be strings by the time they land here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id (`evt_<uuid>`). Subscribers dedupe on this.
    pub event_id: String,

    pub event_type: EventType,

    pub data: Value,

    pub created_at: DateTime<Utc>,

    /// Envelope version tag.
    pub api_version: String,
}

impl Event {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_id: format!("evt_{}", Uuid::new_v4().simple()),
            event_type,
            data,
            created_at: Utc::now(),
            api_version: config::API_VERSION.to_string(),
        }
    }

    /// The wire envelope: `{ id, type, data, created_at, api_version }`.
    pub fn envelope(&self) -> Value {
        json!({
            "id": self.event_id,
            "type": self.event_type.as_str(),
            "data": self.data,
            "created_at": self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "api_version": self.api_version,
        })
    }

    /// Canonical JSON body, exactly what gets signed and POSTed.
    pub fn payload(&self) -> String {
        self.envelope().to_string()
    }

    /// Unix seconds for the timestamp header.
    pub fn unix_timestamp(&self) -> i64 {
        self.created_at.timestamp()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
