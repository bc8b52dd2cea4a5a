use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::config::StoreConfig;
use crate::error::GrantflowError;
use crate::oauth::discovery::resolve_endpoints;
use crate::oauth::provider::{HttpIdentityProvider, IdentityProvider};
use crate::relay::exchange::{Downstream, TokenExchangeRelay};
use crate::relay::guard::AccessGuard;
use crate::relay::orders::{
    catalog, failure_reason, find_product, Checkout, OrderBook, OrderItem, OrderStatus,
};
use crate::server::{health, json_body, log_requests, request_token, ApiError};
use crate::types::ClientCredentials;

pub const VIEW_SCOPE: &str = "store:view";
pub const PURCHASE_SCOPE: &str = "store:purchase";

pub struct StoreState {
    relay: Arc<TokenExchangeRelay>,
    checkout: Checkout,
}

impl StoreState {
    pub fn new(relay: Arc<TokenExchangeRelay>, orders: Arc<OrderBook>) -> Self {
        Self {
            checkout: Checkout::new(relay.clone(), orders),
            relay,
        }
    }

    /// Resolve endpoints for the store's own and the exchange authorization
    /// servers and wire the relay.
    pub async fn from_config(cfg: &StoreConfig) -> Result<Self, GrantflowError> {
        let client = reqwest::Client::new();
        let credentials = ClientCredentials {
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        };

        let verify_endpoints = resolve_endpoints(&client, &cfg.provider).await?;
        let verifier: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::with_client(
            client.clone(),
            verify_endpoints,
        ));
        let exchanger: Arc<dyn IdentityProvider> = match cfg.exchange {
            Some(ref exchange) => {
                let endpoints = resolve_endpoints(&client, exchange).await?;
                Arc::new(HttpIdentityProvider::with_client(client.clone(), endpoints))
            }
            None => verifier.clone(),
        };

        let guard = AccessGuard::new(verifier, credentials.clone(), cfg.audience.clone());
        let relay = TokenExchangeRelay::new(
            guard,
            exchanger,
            credentials,
            Downstream {
                base_url: cfg.payment_service_url.clone(),
                audience: cfg.payment_audience.clone(),
                scopes: cfg.payment_scopes.clone(),
            },
        )
        .with_client(client);
        Ok(Self::new(Arc::new(relay), Arc::new(OrderBook::new())))
    }

    pub fn orders(&self) -> &Arc<OrderBook> {
        self.checkout.orders()
    }
}

pub fn router(state: Arc<StoreState>) -> Router {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/{id}", get(get_product))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order).patch(update_order))
        .route("/health", get(health))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: OrderStatus,
}

/// Path ids that don't parse can't match anything.
fn parse_id(raw: &str) -> Option<u64> {
    raw.parse().ok()
}

async fn list_products(
    State(state): State<Arc<StoreState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state
        .relay
        .guard()
        .authorize(request_token(&headers)?, &[VIEW_SCOPE])
        .await?;
    Ok(Json(catalog()))
}

async fn get_product(
    State(state): State<Arc<StoreState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state
        .relay
        .guard()
        .authorize(request_token(&headers)?, &[VIEW_SCOPE])
        .await?;
    parse_id(&id)
        .and_then(find_product)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product"))
}

async fn list_orders(
    State(state): State<Arc<StoreState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .relay
        .guard()
        .authorize(request_token(&headers)?, &[VIEW_SCOPE])
        .await?;
    Ok(Json(state.orders().for_user(claims.subject())))
}

async fn get_order(
    State(state): State<Arc<StoreState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .relay
        .guard()
        .authorize(request_token(&headers)?, &[VIEW_SCOPE])
        .await?;
    let order = parse_id(&id)
        .and_then(|id| state.orders().get(id))
        .ok_or_else(|| ApiError::not_found("Order"))?;
    if order.user_id != claims.subject() {
        return Err(ApiError::forbidden("Not authorized to view this order"));
    }
    Ok(Json(order))
}

async fn create_order(
    State(state): State<Arc<StoreState>>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let token = request_token(&headers)?;
    let items = body
        .map(|Json(req)| req.items)
        .map_err(|rejection| GrantflowError::InvalidInput(rejection.body_text()));
    let result = state
        .relay
        .handle_privileged_request(token, &[PURCHASE_SCOPE], |claims| {
            let checkout = state.checkout.clone();
            let subject_token = token.unwrap_or_default().to_string();
            async move {
                checkout
                    .place_order(&subject_token, claims.subject(), items?)
                    .await
            }
        })
        .await;

    match result {
        Ok(order) => Ok((StatusCode::CREATED, Json(order))),
        Err(
            e @ (GrantflowError::Unauthenticated(_)
            | GrantflowError::InsufficientScope { .. }
            | GrantflowError::InvalidInput(_)),
        ) => Err(e.into()),
        Err(e) => Err(ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({
                "message": "Error processing order",
                "error": failure_reason(&e),
            }),
        }),
    }
}

async fn update_order(
    State(state): State<Arc<StoreState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .relay
        .guard()
        .authorize(request_token(&headers)?, &[PURCHASE_SCOPE])
        .await?;
    let req = json_body(body)?;
    let id = parse_id(&id).ok_or_else(|| ApiError::not_found("Order"))?;
    let order = state
        .orders()
        .get(id)
        .ok_or_else(|| ApiError::not_found("Order"))?;
    if order.user_id != claims.subject() {
        return Err(ApiError::forbidden("Not authorized to update this order"));
    }
    let updated = state
        .orders()
        .update(id, |o| o.status = req.status)
        .ok_or_else(|| ApiError::not_found("Order"))?;
    Ok(Json(updated))
}
