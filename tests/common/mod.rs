#![allow(dead_code)]

use grantflow::config::{DeviceConfig, GrantflowConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Device section pointing at a mock authorization server.
pub fn device_config(issuer: &str) -> GrantflowConfig {
    GrantflowConfig {
        device: Some(DeviceConfig::new(issuer, "device-client")),
        ..Default::default()
    }
}

/// Create a temp directory with a grantflow.json config file.
pub fn temp_config_dir(config: &GrantflowConfig) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let json = serde_json::to_string_pretty(config).unwrap();
    std::fs::write(dir.path().join("grantflow.json"), json).unwrap();
    dir
}

/// Same as [`temp_config_dir`] but from raw file contents (JSON or JSONC).
pub fn temp_config_text(text: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("grantflow.json"), text).unwrap();
    dir
}

pub fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "openid profile offline_access",
        "refresh_token": "rt-1",
    })
}

pub fn oauth_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({ "error": code }))
}

/// Device authorization endpoint answering with a relative verification URI
/// and a zero poll interval.
pub async fn mount_device_authorize(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/device/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dc-1",
            "user_code": "ABC-123",
            "verification_uri": "/activate",
            "expires_in": 600,
            "interval": 1,
        })))
        .mount(server)
        .await;
}

/// Token endpoint: `pending` rounds of `authorization_pending`, then tokens.
pub async fn mount_device_token(server: &MockServer, pending: u64, access_token: &str) {
    if pending > 0 {
        Mock::given(method("POST"))
            .and(path("/v1/token"))
            .and(body_string_contains("device_code=dc-1"))
            .respond_with(oauth_error("authorization_pending"))
            .up_to_n_times(pending)
            .with_priority(1)
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_string_contains("device_code=dc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
        .with_priority(2)
        .mount(server)
        .await;
}

pub async fn mount_userinfo(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "00u-jo",
            "name": "Jo Example",
            "email": "jo@example.com",
        })))
        .mount(server)
        .await;
}

pub async fn mount_revoke(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/revoke"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Introspection answering `active` for `token` with the given scopes.
pub async fn mount_introspect(server: &MockServer, token: &str, sub: &str, scope: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/introspect"))
        .and(body_string_contains(format!("token={token}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": sub,
            "aud": "api://default",
            "scope": scope,
            "exp": chrono::Utc::now().timestamp() + 3600,
        })))
        .mount(server)
        .await;
}

/// Unsigned JWT with the given payload, as issued by a test authorization server.
pub fn unsigned_jwt(payload: &Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.")
}
