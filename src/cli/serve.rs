use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::load_config;
use crate::error::GrantflowError;
use crate::server::{self, payment, store, PaymentState, StoreState};

fn missing_section(name: &str) -> GrantflowError {
    GrantflowError::ConfigError {
        path: PathBuf::from(format!("<{name}>")),
        detail: format!("no \"{name}\" section in any config file"),
    }
}

fn serve_error(e: server::ServerError) -> GrantflowError {
    GrantflowError::IoError(std::io::Error::other(e.to_string()))
}

pub async fn run_store(cli_config: Option<&str>, port: Option<u16>) -> Result<(), GrantflowError> {
    let cfg = load_config(cli_config)?
        .store
        .ok_or_else(|| missing_section("store"))?;
    let state = StoreState::from_config(&cfg).await?;
    tracing::info!(payment_service_url = %cfg.payment_service_url, "store service configured");
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(cfg.port)));
    server::serve(store::router(Arc::new(state)), addr, "store")
        .await
        .map_err(serve_error)
}

pub async fn run_payment(cli_config: Option<&str>, port: Option<u16>) -> Result<(), GrantflowError> {
    let cfg = load_config(cli_config)?
        .payment
        .ok_or_else(|| missing_section("payment"))?;
    let state = PaymentState::from_config(&cfg).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(cfg.port)));
    server::serve(payment::router(Arc::new(state)), addr, "payment")
        .await
        .map_err(serve_error)
}
