use crate::error::GrantflowError;

use super::types::{DeviceConfig, GrantflowConfig, PaymentConfig, ProviderConfig, StoreConfig};

/// Substitute environment references in `input`.
///
/// `${VAR}` and `$env:VAR` must be set. `${VAR:-fallback}` uses the fallback
/// when `VAR` is unset or empty. Any other `$` is kept as written.
pub fn expand_env_vars(input: &str) -> Result<String, GrantflowError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(at) = rest.find('$') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            let close = braced
                .find('}')
                .ok_or_else(|| env_error(&format!("Unclosed variable reference: ${{{braced}")))?;
            out.push_str(&resolve_braced(&braced[..close])?);
            rest = &braced[close + 1..];
        } else if let Some(named) = after.strip_prefix("env:") {
            let len = named
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(named.len());
            if len == 0 {
                return Err(env_error("Empty variable name in $env: reference"));
            }
            out.push_str(&lookup(&named[..len])?);
            rest = &named[len..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve_braced(expr: &str) -> Result<String, GrantflowError> {
    match expr.split_once(":-") {
        Some((name, fallback)) => Ok(std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string())),
        None => lookup(expr),
    }
}

fn lookup(var_name: &str) -> Result<String, GrantflowError> {
    std::env::var(var_name)
        .map_err(|_| env_error(&format!("Environment variable '{var_name}' is not set")))
}

fn expand_in_place(value: &mut String) -> Result<(), GrantflowError> {
    *value = expand_env_vars(value)?;
    Ok(())
}

fn expand_opt(value: &mut Option<String>) -> Result<(), GrantflowError> {
    if let Some(ref mut v) = value {
        expand_in_place(v)?;
    }
    Ok(())
}

fn expand_provider(provider: &mut ProviderConfig) -> Result<(), GrantflowError> {
    expand_in_place(&mut provider.issuer)?;
    let e = &mut provider.endpoints;
    expand_opt(&mut e.device_authorization)?;
    expand_opt(&mut e.token)?;
    expand_opt(&mut e.revocation)?;
    expand_opt(&mut e.userinfo)?;
    expand_opt(&mut e.introspection)
}

fn expand_device(cfg: &mut DeviceConfig) -> Result<(), GrantflowError> {
    expand_provider(&mut cfg.provider)?;
    expand_in_place(&mut cfg.client_id)?;
    expand_opt(&mut cfg.verification_base)
}

fn expand_store(cfg: &mut StoreConfig) -> Result<(), GrantflowError> {
    expand_provider(&mut cfg.provider)?;
    if let Some(ref mut exchange) = cfg.exchange {
        expand_provider(exchange)?;
    }
    expand_in_place(&mut cfg.audience)?;
    expand_in_place(&mut cfg.client_id)?;
    expand_in_place(&mut cfg.client_secret)?;
    expand_in_place(&mut cfg.payment_service_url)?;
    expand_in_place(&mut cfg.payment_audience)
}

fn expand_payment(cfg: &mut PaymentConfig) -> Result<(), GrantflowError> {
    expand_provider(&mut cfg.provider)?;
    expand_in_place(&mut cfg.audience)?;
    expand_in_place(&mut cfg.client_id)?;
    expand_in_place(&mut cfg.client_secret)
}

/// Expand environment variables in every string field of the config.
pub fn expand_config(config: &mut GrantflowConfig) -> Result<(), GrantflowError> {
    if let Some(ref mut device) = config.device {
        expand_device(device)?;
    }
    if let Some(ref mut store) = config.store {
        expand_store(store)?;
    }
    if let Some(ref mut payment) = config.payment {
        expand_payment(payment)?;
    }
    Ok(())
}

fn env_error(detail: &str) -> GrantflowError {
    GrantflowError::ConfigError {
        path: "<env>".into(),
        detail: detail.into(),
    }
}
