use clap::{Parser, Subcommand};

use grantflow::cli::device::DeviceOverrides;
use grantflow::types::TokenTypeHint;

#[derive(Parser)]
#[command(
    name = "grantflow",
    version,
    about = "OAuth 2.0 device authorization client and token-exchange relay"
)]
struct Cli {
    /// Config file (highest precedence)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in on this device and manage the resulting tokens
    Device {
        /// Authorization server issuer URL
        #[arg(long, global = true, env = "GRANTFLOW_ISSUER")]
        issuer: Option<String>,

        /// OAuth client id
        #[arg(long, global = true, env = "GRANTFLOW_CLIENT_ID")]
        client_id: Option<String>,

        #[command(subcommand)]
        action: DeviceAction,
    },

    /// Inspect tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Run one of the relay HTTP services
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Run the device authorization flow
    Login {
        /// Scopes to request (defaults to the configured scopes)
        #[arg(long = "scope", value_delimiter = ',')]
        scopes: Option<Vec<String>>,

        /// Open the verification page in a browser
        #[arg(long)]
        open: bool,

        /// Print tokens and user info as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch the signed-in user's profile
    Userinfo {
        #[arg(long, env = "GRANTFLOW_ACCESS_TOKEN")]
        access_token: String,

        #[arg(long)]
        json: bool,
    },

    /// Revoke a single token
    Revoke {
        token: String,

        /// access_token or refresh_token
        #[arg(long, default_value = "access_token")]
        hint: TokenTypeHint,
    },

    /// Revoke the refresh and access tokens and end the session
    Logout {
        #[arg(long, env = "GRANTFLOW_ACCESS_TOKEN")]
        access_token: String,

        #[arg(long)]
        refresh_token: Option<String>,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Print a JWT's claims without verifying it
    Decode { token: String },
}

#[derive(Subcommand)]
enum ServeService {
    /// Store service (products, orders, checkout)
    Store {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Payment service
    Payment {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display the merged config with secrets redacted
    Show {
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn default_log_level(&self) -> &'static str {
        match self.command {
            Commands::Serve { .. } => "info",
            _ => "warn",
        }
    }

    fn json_output(&self) -> bool {
        match self.command {
            Commands::Device {
                action: DeviceAction::Login { json, .. } | DeviceAction::Userinfo { json, .. },
                ..
            } => json,
            Commands::Config {
                action: ConfigAction::Show { json },
            } => json,
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GRANTFLOW_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json_output();
    if let Err(e) = run(cli).await {
        grantflow::cli::output::print_error(&e, json);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), grantflow::GrantflowError> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Device {
            issuer,
            client_id,
            action,
        } => {
            let overrides = DeviceOverrides { issuer, client_id };
            let cfg = grantflow::cli::device::device_config(config, &overrides)?;
            match action {
                DeviceAction::Login { scopes, open, json } => {
                    grantflow::cli::device::run_login(&cfg, scopes, open, json).await
                }
                DeviceAction::Userinfo { access_token, json } => {
                    grantflow::cli::device::run_userinfo(&cfg, &access_token, json).await
                }
                DeviceAction::Revoke { token, hint } => {
                    grantflow::cli::device::run_revoke(&cfg, &token, hint).await
                }
                DeviceAction::Logout {
                    access_token,
                    refresh_token,
                } => grantflow::cli::device::run_logout(&cfg, access_token, refresh_token).await,
            }
        }
        Commands::Token { action } => match action {
            TokenAction::Decode { token } => grantflow::cli::token::run_decode(&token),
        },
        Commands::Serve { service } => match service {
            ServeService::Store { port } => grantflow::cli::serve::run_store(config, port).await,
            ServeService::Payment { port } => {
                grantflow::cli::serve::run_payment(config, port).await
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => grantflow::cli::config_cmd::run_config_show(config, json),
        },
    }
}
