pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod oauth;
pub mod relay;
pub mod server;
pub mod types;

pub use config::{load_config, GrantflowConfig};
pub use device::{DeviceFlow, FlowState, PollStatus, PollTask};
pub use error::{GrantflowError, PollingError};
pub use oauth::{HttpIdentityProvider, IdentityProvider};
pub use relay::{AccessGuard, Checkout, TokenExchangeRelay};
pub use types::{TokenClaims, TokenSet, UserInfo};
