//! # Webhook Manager
//!
//! Subscription registry plus at-least-once event delivery.
//!
//! [`WebhookManager::emit`] fans an event out onto an unbounded queue —
//! one item per matching subscription — and returns immediately; it is
//! callable from synchronous code and never blocks a payment. A separate
//! delivery worker drains the queue, owning its own HTTP client, and
//! never holds a registry lock across I/O: it snapshots the subscription,
//! delivers, then re-acquires to update counters.
//!
//! Delivery contract: up to 3 attempts per item, fixed 1 s / 5 s / 30 s
//! backoff, 10 s per-attempt timeout. Retries may reorder deliveries
//! relative to later events; subscribers dedupe and reorder on
//! `event_id`.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

use crate::config;

use super::event::{Event, EventType};
use super::signature;
use super::subscription::Subscription;

// ---------------------------------------------------------------------------
// Delivery result
// ---------------------------------------------------------------------------

/// Outcome of delivering one event to one subscription (after retries).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Attempts actually made (1–3).
    pub attempts: u32,
}

/// One queued delivery.
#[derive(Clone, Debug)]
struct DeliveryItem {
    event: Event,
    subscription_id: String,
}

// ---------------------------------------------------------------------------
// WebhookManager
// ---------------------------------------------------------------------------

/// Registry and fan-out queue. Share via `Arc`; spawn
/// [`run_worker`](Self::run_worker) once to drain deliveries.
pub struct WebhookManager {
    subscriptions: DashMap<String, Subscription>,
    queue_tx: mpsc::UnboundedSender<DeliveryItem>,
    /// Taken by the first worker; `None` afterwards.
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<DeliveryItem>>>,
    client: reqwest::Client,
}

impl Default for WebhookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookManager {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            subscriptions: DashMap::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            client: reqwest::Client::builder()
                .timeout(config::WEBHOOK_DELIVERY_TIMEOUT)
                .build()
                .expect("HTTP client construction cannot fail with static config"),
        }
    }

    // -----------------------------------------------------------------------
    // Subscription lifecycle
    // -----------------------------------------------------------------------

    /// Registers a new endpoint. The returned subscription carries the
    /// signing secret.
    pub fn register(&self, owner_id: &str, url: &str, events: Vec<EventType>) -> Subscription {
        let sub = Subscription::new(owner_id, url, events);
        tracing::info!(
            subscription_id = %sub.subscription_id,
            owner_id,
            url,
            "webhook subscription registered"
        );
        self.subscriptions
            .insert(sub.subscription_id.clone(), sub.clone());
        sub
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub fn unregister(&self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }

    pub fn get(&self, subscription_id: &str) -> Option<Subscription> {
        self.subscriptions.get(subscription_id).map(|s| s.clone())
    }

    pub fn list(&self, owner_id: Option<&str>) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .filter(|s| owner_id.map_or(true, |o| s.owner_id == o))
            .map(|s| s.clone())
            .collect()
    }

    /// Updates url / event filter / active flag.
    pub fn update(
        &self,
        subscription_id: &str,
        url: Option<&str>,
        events: Option<Vec<EventType>>,
        is_active: Option<bool>,
    ) -> Option<Subscription> {
        let mut entry = self.subscriptions.get_mut(subscription_id)?;
        if let Some(url) = url {
            entry.url = url.to_string();
        }
        if let Some(events) = events {
            entry.events = events;
        }
        if let Some(active) = is_active {
            entry.is_active = active;
        }
        Some(entry.clone())
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Queues the event for every matching subscription and returns
    /// immediately. Safe to call from non-async code.
    pub fn emit(&self, event: Event) {
        let mut matched = 0usize;
        for sub in self.subscriptions.iter() {
            if sub.is_active && sub.subscribes_to(event.event_type) {
                matched += 1;
                // Send only fails when the receiver is gone, i.e. shutdown.
                let _ = self.queue_tx.send(DeliveryItem {
                    event: event.clone(),
                    subscription_id: sub.subscription_id.clone(),
                });
            }
        }
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            matched,
            "event emitted"
        );
    }

    /// Delivers synchronously to every matching subscription and returns
    /// per-subscription results. Diagnostics path — production flows use
    /// [`emit`](Self::emit) plus the worker.
    pub async fn emit_and_wait(&self, event: Event) -> HashMap<String, DeliveryResult> {
        let targets: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.is_active && s.subscribes_to(event.event_type))
            .map(|s| s.clone())
            .collect();

        let mut results = HashMap::new();
        for sub in targets {
            let result = self.deliver(&event, &sub).await;
            self.record_outcome(&sub.subscription_id, &result);
            results.insert(sub.subscription_id, result);
        }
        results
    }

    // -----------------------------------------------------------------------
    // Delivery worker
    // -----------------------------------------------------------------------

    /// Drains the delivery queue until `shutdown` flips to `true`.
    ///
    /// Only the first caller gets the queue; later calls return
    /// immediately. Cancellation is honored at every await point: the
    /// in-flight delivery future is dropped when shutdown wins the select.
    pub async fn run_worker(&self, mut shutdown: watch::Receiver<bool>) {
        let Some(mut queue_rx) = self.queue_rx.lock().take() else {
            tracing::warn!("webhook worker already running, refusing second start");
            return;
        };
        tracing::info!("webhook delivery worker started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                item = queue_rx.recv() => {
                    let Some(item) = item else { break };
                    let Some(sub) = self.get(&item.subscription_id) else { continue };
                    if !sub.is_active {
                        continue;
                    }
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        result = self.deliver(&item.event, &sub) => {
                            self.record_outcome(&item.subscription_id, &result);
                        }
                    }
                }
            }
        }
        tracing::info!("webhook delivery worker stopped");
    }

    /// Posts one event to one subscription with the retry schedule.
    /// Holds no locks — `sub` is a snapshot.
    async fn deliver(&self, event: &Event, sub: &Subscription) -> DeliveryResult {
        let payload = event.payload();
        let signature = signature::sign(&payload, &sub.secret);
        let started = Instant::now();
        let mut last_error = None;
        let mut last_status = None;

        for attempt in 1..=config::WEBHOOK_MAX_ATTEMPTS as u32 {
            let response = self
                .client
                .post(&sub.url)
                .header("Content-Type", "application/json")
                .header(config::HEADER_SIGNATURE, signature.as_str())
                .header(config::HEADER_EVENT_TYPE, event.event_type.as_str())
                .header(config::HEADER_EVENT_ID, event.event_id.as_str())
                .header(config::HEADER_TIMESTAMP, event.unix_timestamp().to_string())
                .body(payload.clone())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    return DeliveryResult {
                        success: true,
                        status_code: Some(status),
                        response_body: Some(body.chars().take(500).collect()),
                        error: None,
                        duration_ms: started.elapsed().as_millis() as u64,
                        attempts: attempt,
                    };
                }
                Ok(resp) => {
                    last_status = Some(resp.status().as_u16());
                    tracing::warn!(
                        subscription_id = %sub.subscription_id,
                        status = resp.status().as_u16(),
                        attempt,
                        "webhook delivery rejected"
                    );
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    tracing::warn!(
                        subscription_id = %sub.subscription_id,
                        error = %e,
                        attempt,
                        "webhook delivery failed"
                    );
                }
            }

            if (attempt as usize) < config::WEBHOOK_MAX_ATTEMPTS {
                let delay = config::WEBHOOK_RETRY_DELAYS
                    .get(attempt as usize - 1)
                    .copied()
                    .unwrap_or(config::WEBHOOK_FINAL_RETRY_DELAY);
                tokio::time::sleep(delay).await;
            }
        }

        DeliveryResult {
            success: false,
            status_code: last_status,
            response_body: None,
            error: Some(last_error.unwrap_or_else(|| "max retries exceeded".to_string())),
            duration_ms: started.elapsed().as_millis() as u64,
            attempts: config::WEBHOOK_MAX_ATTEMPTS as u32,
        }
    }

    /// Folds a delivery outcome into the subscription's counters.
    fn record_outcome(&self, subscription_id: &str, result: &DeliveryResult) {
        if let Some(mut sub) = self.subscriptions.get_mut(subscription_id) {
            sub.total_deliveries += 1;
            if result.success {
                sub.successful_deliveries += 1;
                sub.last_delivery_at = Some(Utc::now());
            } else {
                sub.failed_deliveries += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_and_lookup() {
        let manager = WebhookManager::new();
        let sub = manager.register("dev_1", "https://example.test/hook", vec![]);

        assert!(manager.get(&sub.subscription_id).is_some());
        assert_eq!(manager.list(Some("dev_1")).len(), 1);
        assert_eq!(manager.list(Some("dev_2")).len(), 0);

        assert!(manager.unregister(&sub.subscription_id));
        assert!(!manager.unregister(&sub.subscription_id));
    }

    #[test]
    fn update_mutates_fields() {
        let manager = WebhookManager::new();
        let sub = manager.register("dev_1", "https://old.test", vec![]);

        let updated = manager
            .update(
                &sub.subscription_id,
                Some("https://new.test"),
                Some(vec![EventType::PaymentCompleted]),
                Some(false),
            )
            .unwrap();
        assert_eq!(updated.url, "https://new.test");
        assert_eq!(updated.events, vec![EventType::PaymentCompleted]);
        assert!(!updated.is_active);

        assert!(manager.update("whsub_missing", None, None, None).is_none());
    }

    #[tokio::test]
    async fn emit_skips_inactive_and_mismatched() {
        let manager = WebhookManager::new();
        let active = manager.register(
            "dev_1",
            "https://a.test",
            vec![EventType::PaymentCompleted],
        );
        let inactive = manager.register("dev_1", "https://b.test", vec![]);
        manager.update(&inactive.subscription_id, None, None, Some(false));
        let other_filter = manager.register("dev_1", "https://c.test", vec![EventType::RiskAlert]);

        manager.emit(Event::new(EventType::PaymentCompleted, json!({})));

        // Drain the queue directly to observe the fan-out.
        let mut rx = manager.queue_rx.lock().take().unwrap();
        let first = rx.try_recv().unwrap();
        assert_eq!(first.subscription_id, active.subscription_id);
        assert!(rx.try_recv().is_err(), "only one subscription should match");
        drop(other_filter);
    }

    #[tokio::test]
    async fn worker_can_only_start_once() {
        let manager = std::sync::Arc::new(WebhookManager::new());
        let (tx, rx) = watch::channel(false);

        let m = manager.clone();
        let handle = tokio::spawn(async move { m.run_worker(rx).await });

        // Give the worker a moment to claim the queue.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(manager.queue_rx.lock().is_none());

        // Second start is refused without panicking.
        let (_tx2, rx2) = watch::channel(false);
        manager.run_worker(rx2).await;

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn record_outcome_updates_counters() {
        let manager = WebhookManager::new();
        let sub = manager.register("dev_1", "https://a.test", vec![]);

        manager.record_outcome(
            &sub.subscription_id,
            &DeliveryResult {
                success: true,
                status_code: Some(200),
                response_body: None,
                error: None,
                duration_ms: 5,
                attempts: 1,
            },
        );
        manager.record_outcome(
            &sub.subscription_id,
            &DeliveryResult {
                success: false,
                status_code: Some(500),
                response_body: None,
                error: Some("boom".into()),
                duration_ms: 5,
                attempts: 3,
            },
        );

        let stored = manager.get(&sub.subscription_id).unwrap();
        assert_eq!(stored.total_deliveries, 2);
        assert_eq!(stored.successful_deliveries, 1);
        assert_eq!(stored.failed_deliveries, 1);
        assert!(stored.last_delivery_at.is_some());
    }
}
