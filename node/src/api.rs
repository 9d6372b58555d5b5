//! # HTTP Boundary
//!
//! Thin JSON translation over the core: every handler parses a request,
//! calls exactly one orchestrator or registry operation, and serializes
//! the typed result. No business logic lives here — limits, risk, and
//! ledger semantics are all below the [`Services`] surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use sardis_core::payment::{ErrorKind, HoldRequest, PayRequest};
use sardis_core::policy::TrustTier;
use sardis_core::webhook::EventType;
use sardis_core::Services;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub version: String,
}

/// Builds the full API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents", post(create_agent))
        .route("/agents/:id/transactions", get(list_agent_transactions))
        .route("/merchants", post(create_merchant))
        .route("/wallets/:id/fund", post(fund_wallet))
        .route("/wallets/:id/balance", get(wallet_balance))
        .route("/payments", post(submit_payment))
        .route("/payments/estimate", get(estimate_payment))
        .route("/payments/:id", get(get_payment))
        .route("/holds", post(create_hold))
        .route("/holds/:id", get(get_hold))
        .route("/holds/:id/capture", post(capture_hold))
        .route("/holds/:id/void", post(void_hold))
        .route("/refunds", post(submit_refund))
        .route("/webhooks", post(create_webhook).get(list_webhooks))
        .route("/webhooks/:id", delete(delete_webhook))
        .route("/ledger/integrity", get(ledger_integrity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP status for a failed core operation.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::WalletNotFound
        | ErrorKind::MerchantNotFound
        | ErrorKind::AgentNotFound
        | ErrorKind::HoldNotActive => StatusCode::NOT_FOUND,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "version": state.version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    developer_id: String,
    name: String,
    #[serde(default)]
    trust_tier: Option<TrustTier>,
}

async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateAgentRequest>,
) -> Response {
    let tier = req.trust_tier.unwrap_or(TrustTier::Low);
    let (agent, wallet) = state
        .services
        .create_agent(&req.developer_id, &req.name, tier);
    (
        StatusCode::CREATED,
        Json(json!({ "agent": agent, "wallet": wallet })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct CreateMerchantRequest {
    owner_id: String,
    name: String,
    #[serde(default)]
    category: Option<String>,
}

async fn create_merchant(
    State(state): State<AppState>,
    Json(req): Json<CreateMerchantRequest>,
) -> Response {
    let (merchant, wallet) =
        state
            .services
            .create_merchant(&req.owner_id, &req.name, req.category.as_deref());
    (
        StatusCode::CREATED,
        Json(json!({ "merchant": merchant, "wallet": wallet })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Wallets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FundRequest {
    amount: Decimal,
    #[serde(default)]
    currency: Option<String>,
}

async fn fund_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Json(req): Json<FundRequest>,
) -> Response {
    let currency = req.currency.as_deref().unwrap_or("USDC");
    match state.services.fund_wallet(&wallet_id, req.amount, currency) {
        Ok(()) => Json(json!({
            "wallet_id": wallet_id,
            "balance": state.services.ledger.get_balance(&wallet_id, currency),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CurrencyQuery {
    #[serde(default)]
    currency: Option<String>,
}

async fn wallet_balance(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Query(query): Query<CurrencyQuery>,
) -> Response {
    if !state.services.wallets.exists(&wallet_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "wallet_not_found" })),
        )
            .into_response();
    }
    let currency = query.currency.as_deref().unwrap_or("USDC");
    let ledger = &state.services.ledger;
    Json(json!({
        "wallet_id": wallet_id,
        "currency": currency,
        "balance": ledger.get_balance(&wallet_id, currency),
        "held": ledger.get_held_amount(&wallet_id, currency),
        "available": ledger.get_available_balance(&wallet_id, currency),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    agent_id: String,
    amount: Decimal,
    #[serde(default)]
    recipient_wallet_id: Option<String>,
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    idempotency_key: Option<String>,
}

async fn submit_payment(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> Response {
    let currency = req.currency.as_deref().unwrap_or("USDC");

    let result = if let Some(merchant_id) = &req.merchant_id {
        state.services.orchestrator.pay_merchant(
            &req.agent_id,
            merchant_id,
            req.amount,
            currency,
            req.purpose.as_deref(),
        )
    } else if let Some(recipient) = &req.recipient_wallet_id {
        let mut pay = PayRequest::new(&req.agent_id, req.amount, recipient);
        pay.currency = currency.to_string();
        pay.purpose = req.purpose.clone();
        pay.idempotency_key = req.idempotency_key.clone();
        state.services.orchestrator.pay(pay)
    } else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "one of recipient_wallet_id or merchant_id is required" })),
        )
            .into_response();
    };

    let status = if result.success {
        StatusCode::OK
    } else if result.approval_id.is_some() {
        StatusCode::ACCEPTED
    } else {
        result
            .error
            .map(status_for)
            .unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    };
    (status, Json(result)).into_response()
}

#[derive(Debug, Deserialize)]
struct EstimateQuery {
    amount: Decimal,
    #[serde(default)]
    currency: Option<String>,
}

async fn estimate_payment(
    State(state): State<AppState>,
    Query(query): Query<EstimateQuery>,
) -> Response {
    let currency = query.currency.as_deref().unwrap_or("USDC");
    Json(state.services.orchestrator.estimate_payment(query.amount, currency)).into_response()
}

async fn get_payment(State(state): State<AppState>, Path(tx_id): Path<String>) -> Response {
    match state.services.orchestrator.get_transaction(&tx_id) {
        Some(tx) => Json(tx).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "transaction_not_found" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_agent_transactions(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Response {
    let txs = state
        .services
        .orchestrator
        .list_agent_transactions(&agent_id, page.limit, page.offset);
    Json(json!({ "transactions": txs })).into_response()
}

// ---------------------------------------------------------------------------
// Holds
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HoldCreateRequest {
    agent_id: String,
    merchant_id: String,
    amount: Decimal,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    expiration_hours: Option<i64>,
}

async fn create_hold(
    State(state): State<AppState>,
    Json(req): Json<HoldCreateRequest>,
) -> Response {
    let mut hold = HoldRequest::new(&req.agent_id, &req.merchant_id, req.amount);
    if let Some(currency) = req.currency {
        hold.currency = currency;
    }
    hold.purpose = req.purpose;
    hold.expiration_hours = req.expiration_hours;

    let result = state.services.orchestrator.create_hold(hold);
    let status = if result.success {
        StatusCode::CREATED
    } else {
        result.error.map(status_for).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    };
    (status, Json(result)).into_response()
}

async fn get_hold(State(state): State<AppState>, Path(hold_id): Path<String>) -> Response {
    match state.services.orchestrator.get_hold(&hold_id) {
        Some(hold) => Json(hold).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "hold_not_found" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct CaptureRequest {
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    purpose: Option<String>,
}

async fn capture_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<String>,
    Json(req): Json<CaptureRequest>,
) -> Response {
    let result =
        state
            .services
            .orchestrator
            .capture_hold(&hold_id, req.amount, req.purpose.as_deref());
    let status = if result.success {
        StatusCode::OK
    } else {
        result.error.map(status_for).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    };
    (status, Json(result)).into_response()
}

async fn void_hold(State(state): State<AppState>, Path(hold_id): Path<String>) -> Response {
    let result = state.services.orchestrator.void_hold(&hold_id);
    let status = if result.success {
        StatusCode::OK
    } else {
        result.error.map(status_for).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    };
    (status, Json(result)).into_response()
}

// ---------------------------------------------------------------------------
// Refunds
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RefundRequest {
    tx_id: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    reason: Option<String>,
}

async fn submit_refund(State(state): State<AppState>, Json(req): Json<RefundRequest>) -> Response {
    let result = state
        .services
        .orchestrator
        .refund(&req.tx_id, req.amount, req.reason.as_deref());
    let status = if result.success {
        StatusCode::OK
    } else {
        result.error.map(status_for).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    };
    (status, Json(result)).into_response()
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WebhookCreateRequest {
    owner_id: String,
    url: String,
    #[serde(default)]
    events: Vec<EventType>,
}

async fn create_webhook(
    State(state): State<AppState>,
    Json(req): Json<WebhookCreateRequest>,
) -> Response {
    let sub = state
        .services
        .webhooks
        .register(&req.owner_id, &req.url, req.events);
    (StatusCode::CREATED, Json(sub)).into_response()
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    #[serde(default)]
    owner_id: Option<String>,
}

async fn list_webhooks(State(state): State<AppState>, Query(query): Query<OwnerQuery>) -> Response {
    let subs = state.services.webhooks.list(query.owner_id.as_deref());
    Json(json!({ "subscriptions": subs })).into_response()
}

async fn delete_webhook(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.services.webhooks.unregister(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "subscription_not_found" })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

async fn ledger_integrity(State(state): State<AppState>) -> Response {
    match state.services.ledger.verify_integrity() {
        Ok(()) => Json(json!({ "valid": true, "entries": state.services.ledger.entry_count() }))
            .into_response(),
        Err(violation) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "valid": false, "violation": violation })),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::AgentNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::HoldNotActive), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::InsufficientBalance),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn payment_request_accepts_string_amounts() {
        let req: PaymentRequest = serde_json::from_str(
            r#"{"agent_id":"ent_1","amount":"25.10","merchant_id":"mch_1"}"#,
        )
        .unwrap();
        assert_eq!(req.amount.to_string(), "25.10");
        assert!(req.recipient_wallet_id.is_none());
    }

    #[test]
    fn webhook_request_parses_dotted_event_tags() {
        let req: WebhookCreateRequest = serde_json::from_str(
            r#"{"owner_id":"dev_1","url":"https://x.test","events":["payment.completed","hold.voided"]}"#,
        )
        .unwrap();
        assert_eq!(
            req.events,
            vec![EventType::PaymentCompleted, EventType::HoldVoided]
        );
    }

    #[test]
    fn router_builds() {
        let state = AppState {
            services: Services::new(),
            version: "test".into(),
        };
        let _router = create_router(state);
    }
}
