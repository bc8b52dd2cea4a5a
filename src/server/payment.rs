use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::error::GrantflowError;
use crate::oauth::discovery::resolve_endpoints;
use crate::oauth::provider::HttpIdentityProvider;
use crate::relay::guard::AccessGuard;
use crate::relay::orders::IdSequence;
use crate::server::{health, json_body, log_requests, request_token, ApiError};
use crate::types::ClientCredentials;

pub const MANAGE_SCOPE: &str = "payments:manage";
pub const VIEW_SCOPE: &str = "payments:view";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: u64,
    pub order_id: u64,
    pub amount: f64,
    pub currency: String,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: u64,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_payment_method() -> String {
    "credit_card".to_string()
}

/// In-memory payments.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    payments: Mutex<Vec<Payment>>,
    ids: IdSequence,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Payment>> {
        self.payments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, user_id: &str, req: CreatePaymentRequest) -> Payment {
        let payment = Payment {
            id: self.ids.next(),
            order_id: req.order_id,
            amount: req.amount,
            currency: req.currency,
            payment_method: req.payment_method,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            user_id: user_id.to_string(),
            processed_at: None,
            transaction: None,
        };
        self.lock().push(payment.clone());
        payment
    }

    pub fn get(&self, id: u64) -> Option<Payment> {
        self.lock().iter().find(|p| p.id == id).cloned()
    }

    /// Mark a payment completed with a simulated transaction.
    pub fn process(&self, id: u64) -> Option<Payment> {
        let mut payments = self.lock();
        let payment = payments.iter_mut().find(|p| p.id == id)?;
        let now = Utc::now();
        payment.status = PaymentStatus::Completed;
        payment.processed_at = Some(now);
        payment.transaction = Some(Transaction {
            id: format!("tx_{}", now.timestamp_millis()),
            status: "success".to_string(),
        });
        Some(payment.clone())
    }
}

pub struct PaymentState {
    guard: AccessGuard,
    ledger: PaymentLedger,
}

impl PaymentState {
    pub fn new(guard: AccessGuard) -> Self {
        Self {
            guard,
            ledger: PaymentLedger::new(),
        }
    }

    pub async fn from_config(cfg: &PaymentConfig) -> Result<Self, GrantflowError> {
        let client = reqwest::Client::new();
        let endpoints = resolve_endpoints(&client, &cfg.provider).await?;
        let provider = Arc::new(HttpIdentityProvider::with_client(client, endpoints));
        let credentials = ClientCredentials {
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        };
        Ok(Self::new(AccessGuard::new(
            provider,
            credentials,
            cfg.audience.clone(),
        )))
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }
}

pub fn router(state: Arc<PaymentState>) -> Router {
    Router::new()
        .route("/api/payments", post(create_payment))
        .route("/api/payments/{id}", get(get_payment))
        .route("/api/payments/{id}/process", post(process_payment))
        .route("/health", get(health))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn create_payment(
    State(state): State<Arc<PaymentState>>,
    headers: HeaderMap,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .guard
        .authorize(request_token(&headers)?, &[MANAGE_SCOPE])
        .await?;
    let req = json_body(body)?;
    let payment = state.ledger.record(claims.subject(), req);
    tracing::info!(payment_id = payment.id, order_id = payment.order_id, "payment recorded");
    Ok((StatusCode::CREATED, Json(payment)))
}

/// Look up a payment owned by `sub`.
fn owned_payment(
    ledger: &PaymentLedger,
    raw_id: &str,
    sub: &str,
    denied: &str,
) -> Result<Payment, ApiError> {
    let payment = raw_id
        .parse()
        .ok()
        .and_then(|id| ledger.get(id))
        .ok_or_else(|| ApiError::not_found("Payment"))?;
    if payment.user_id != sub {
        return Err(ApiError::forbidden(denied));
    }
    Ok(payment)
}

async fn get_payment(
    State(state): State<Arc<PaymentState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .guard
        .authorize(request_token(&headers)?, &[VIEW_SCOPE])
        .await?;
    let payment = owned_payment(
        &state.ledger,
        &id,
        claims.subject(),
        "Not authorized to view this payment",
    )?;
    Ok(Json(payment))
}

async fn process_payment(
    State(state): State<Arc<PaymentState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .guard
        .authorize(request_token(&headers)?, &[MANAGE_SCOPE])
        .await?;
    let payment = owned_payment(
        &state.ledger,
        &id,
        claims.subject(),
        "Not authorized to process this payment",
    )?;
    let processed = state
        .ledger
        .process(payment.id)
        .ok_or_else(|| ApiError::not_found("Payment"))?;
    Ok(Json(processed))
}
