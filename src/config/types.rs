use serde::{Deserialize, Serialize};

pub const REDACTED: &str = "********";

pub const DEFAULT_STORE_PORT: u16 = 3001;
pub const DEFAULT_PAYMENT_PORT: u16 = 3002;

/// Effective configuration. Each section is optional; commands that need a
/// section report a config error when it is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantflowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentConfig>,
}

/// Explicit endpoint URLs; anything left unset is derived from the issuer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_authorization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub issuer: String,
    /// Resolve endpoints from `{issuer}/.well-known/openid-configuration`.
    #[serde(default)]
    pub discover: bool,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

impl ProviderConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            discover: false,
            endpoints: EndpointOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(flatten)]
    pub provider: ProviderConfig,
    pub client_id: String,
    #[serde(default = "default_device_scopes")]
    pub scopes: Vec<String>,
    /// Base for relative verification URIs. Defaults to the issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_base: Option<String>,
}

impl DeviceConfig {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            provider: ProviderConfig::new(issuer),
            client_id: client_id.into(),
            scopes: default_device_scopes(),
            verification_base: None,
        }
    }

    pub fn verification_base(&self) -> &str {
        self.verification_base
            .as_deref()
            .unwrap_or(&self.provider.issuer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_store_port")]
    pub port: u16,
    pub provider: ProviderConfig,
    /// Expected `aud` of incoming tokens. Empty disables the check.
    #[serde(default = "default_store_audience")]
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization server that performs the exchange, when it differs from
    /// `provider`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<ProviderConfig>,
    #[serde(default = "default_payment_service_url")]
    pub payment_service_url: String,
    #[serde(default = "default_payment_audience")]
    pub payment_audience: String,
    #[serde(default = "default_payment_scopes")]
    pub payment_scopes: Vec<String>,
}

impl StoreConfig {
    pub fn exchange_provider(&self) -> &ProviderConfig {
        self.exchange.as_ref().unwrap_or(&self.provider)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfig {
    #[serde(default = "default_payment_port")]
    pub port: u16,
    pub provider: ProviderConfig,
    #[serde(default = "default_payment_audience")]
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
}

impl GrantflowConfig {
    /// Copy with every client secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if let Some(ref mut store) = out.store {
            store.client_secret = REDACTED.to_string();
        }
        if let Some(ref mut payment) = out.payment {
            payment.client_secret = REDACTED.to_string();
        }
        out
    }
}

fn default_device_scopes() -> Vec<String> {
    ["openid", "profile", "offline_access"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_store_port() -> u16 {
    DEFAULT_STORE_PORT
}

fn default_payment_port() -> u16 {
    DEFAULT_PAYMENT_PORT
}

fn default_store_audience() -> String {
    "api://default".to_string()
}

fn default_payment_service_url() -> String {
    "http://localhost:3002".to_string()
}

fn default_payment_audience() -> String {
    "api://payment-service".to_string()
}

fn default_payment_scopes() -> Vec<String> {
    vec!["payments:manage".to_string(), "payments:view".to_string()]
}
