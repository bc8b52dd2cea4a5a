//! HTTP surfaces for the relay: the store service and the payment service.
//!
//! Both are axum routers over in-memory state. Every `/api` handler verifies
//! the caller's bearer token with an [`AccessGuard`](crate::relay::AccessGuard)
//! before touching state.

pub mod payment;
pub mod store;

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::error::GrantflowError;
use crate::relay::guard::{bearer_token, INVALID_TOKEN_MESSAGE};

pub use payment::{PaymentLedger, PaymentState};
pub use store::StoreState;

/// Server error types.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),
    #[error("Server error: {0}")]
    Serve(String),
}

/// JSON error reply. Bodies always carry a `message`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "message": message.into() }),
        }
    }

    /// `404 {"message": "<thing> not found"}`.
    pub fn not_found(thing: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{thing} not found"))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<GrantflowError> for ApiError {
    fn from(err: GrantflowError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match err {
            GrantflowError::InsufficientScope { required, provided } => json!({
                "message": "Insufficient permissions",
                "required": required,
                "provided": provided,
            }),
            other => json!({ "message": other.to_string() }),
        };
        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Bearer token from the request's `Authorization` header.
///
/// An absent or blank header is `Ok(None)`. A header that is present but not
/// a usable bearer credential fails as an invalid token.
pub fn request_token(headers: &HeaderMap) -> Result<Option<&str>, GrantflowError> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let invalid = || GrantflowError::Unauthenticated(INVALID_TOKEN_MESSAGE.into());
    let value = value.to_str().map_err(|_| invalid())?;
    if value.trim().is_empty() {
        return Ok(None);
    }
    bearer_token(value).map(Some).ok_or_else(invalid)
}

/// Unwrap a JSON body whose extraction was deferred until after the caller
/// was authorized.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Log method, path, status and latency of every request.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Bind `addr` and serve `router` until Ctrl-C.
pub async fn serve(router: axum::Router, addr: SocketAddr, name: &str) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(e.to_string()))?;
    tracing::info!(service = name, addr = %local, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_scope_body() {
        let err = ApiError::from(GrantflowError::InsufficientScope {
            required: vec!["store:manage".into()],
            provided: vec!["store:purchase".into()],
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.body["message"], "Insufficient permissions");
        assert_eq!(err.body["required"][0], "store:manage");
        assert_eq!(err.body["provided"][0], "store:purchase");
    }

    #[test]
    fn unauthenticated_body() {
        let err = ApiError::from(GrantflowError::Unauthenticated("Invalid token".into()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.body, json!({ "message": "Invalid token" }));
    }

    #[test]
    fn not_found_message() {
        let err = ApiError::not_found("Order");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.body["message"], "Order not found");
    }

    #[test]
    fn token_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_token(&headers).unwrap(), None);
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(request_token(&headers).unwrap(), Some("abc"));
        headers.insert("authorization", "".parse().unwrap());
        assert_eq!(request_token(&headers).unwrap(), None);
    }

    #[test]
    fn malformed_authorization_is_invalid_token() {
        for value in ["Basic x", "Bearer", "abc"] {
            let mut headers = HeaderMap::new();
            headers.insert("authorization", value.parse().unwrap());
            let err = request_token(&headers).unwrap_err();
            assert!(matches!(err, GrantflowError::Unauthenticated(ref m) if m == INVALID_TOKEN_MESSAGE));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            axum::http::HeaderValue::from_bytes(b"Bearer \xff").unwrap(),
        );
        assert!(request_token(&headers).is_err());
    }
}
