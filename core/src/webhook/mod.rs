//! # Webhook Module
//!
//! Signed, at-least-once event notifications. Emission enqueues and
//! returns; delivery runs in a dedicated worker with bounded retries.
//! Delivery failures never affect payment outcomes — they only move
//! counters.

pub mod event;
pub mod manager;
pub mod signature;
pub mod subscription;

pub use event::{Event, EventType};
pub use manager::{DeliveryResult, WebhookManager};
pub use signature::{sign, verify};
pub use subscription::Subscription;
