use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{load_config, DeviceConfig};
use crate::device::flow::DeviceFlow;
use crate::error::{GrantflowError, PollingError};
use crate::oauth::discovery::resolve_endpoints;
use crate::oauth::provider::HttpIdentityProvider;
use crate::types::{TokenSet, TokenTypeHint};

use super::output::{self, ConsoleObserver};

/// Command-line values that take precedence over the `device` config section.
#[derive(Debug, Clone, Default)]
pub struct DeviceOverrides {
    pub issuer: Option<String>,
    pub client_id: Option<String>,
}

/// Effective device settings: the config section with flag overrides applied.
pub fn device_config(
    cli_config: Option<&str>,
    overrides: &DeviceOverrides,
) -> Result<DeviceConfig, GrantflowError> {
    let section = load_config(cli_config)?.device;
    let cfg = match (section, &overrides.issuer, &overrides.client_id) {
        (Some(mut cfg), issuer, client_id) => {
            if let Some(issuer) = issuer {
                cfg.provider.issuer = issuer.clone();
            }
            if let Some(client_id) = client_id {
                cfg.client_id = client_id.clone();
            }
            cfg
        }
        (None, Some(issuer), Some(client_id)) => DeviceConfig::new(issuer, client_id),
        (None, _, _) => {
            return Err(GrantflowError::ConfigError {
                path: PathBuf::from("<device>"),
                detail: "no device configuration; add a \"device\" section or pass --issuer and --client-id".into(),
            })
        }
    };
    tracing::debug!(issuer = %cfg.provider.issuer, client_id = %cfg.client_id, "device config");
    Ok(cfg)
}

pub async fn build_flow(cfg: &DeviceConfig) -> Result<DeviceFlow, GrantflowError> {
    let client = reqwest::Client::new();
    let endpoints = resolve_endpoints(&client, &cfg.provider).await?;
    let provider = Arc::new(HttpIdentityProvider::with_client(client, endpoints));
    Ok(DeviceFlow::new(
        provider,
        cfg.client_id.clone(),
        cfg.verification_base(),
    ))
}

/// Sign in with the device flow. Ctrl-C stops polling.
pub async fn run_login(
    cfg: &DeviceConfig,
    scopes: Option<Vec<String>>,
    open_browser: bool,
    json: bool,
) -> Result<(), GrantflowError> {
    let scopes = scopes
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| cfg.scopes.clone());
    let mut flow = build_flow(cfg).await?;

    let outcome = tokio::select! {
        result = flow.login(&scopes, ConsoleObserver::new(open_browser)) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let login = match outcome {
        Some(result) => result?,
        None => {
            flow.cancel();
            return Err(PollingError::Cancelled.into());
        }
    };

    output::print_login(&login, json);
    flow.dispose();
    Ok(())
}

pub async fn run_userinfo(
    cfg: &DeviceConfig,
    access_token: &str,
    json: bool,
) -> Result<(), GrantflowError> {
    let flow = build_flow(cfg).await?;
    let info = flow.fetch_user_info(access_token).await?;
    if json {
        output::print_json(&info);
    } else {
        for line in output::user_info_lines(&info, output::stdout_is_tty()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_revoke(
    cfg: &DeviceConfig,
    token: &str,
    hint: TokenTypeHint,
) -> Result<(), GrantflowError> {
    let flow = build_flow(cfg).await?;
    flow.revoke(token, hint).await?;
    println!("Revoked {}", hint.as_str());
    Ok(())
}

/// Revoke both tokens and end the session. Revocation failures are reported
/// but do not fail the command.
pub async fn run_logout(
    cfg: &DeviceConfig,
    access_token: String,
    refresh_token: Option<String>,
) -> Result<(), GrantflowError> {
    let mut flow = build_flow(cfg).await?;
    let tokens = TokenSet {
        access_token,
        token_type: "Bearer".into(),
        expires_in: None,
        scope: None,
        refresh_token,
        id_token: None,
        expires_at: None,
    };
    let report = flow.sign_out(&tokens).await;
    output::print_sign_out(&report);
    Ok(())
}
