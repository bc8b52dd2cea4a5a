pub mod env;
pub mod loader;
pub mod types;

pub use loader::load_config;
pub use types::{
    DeviceConfig, EndpointOverrides, GrantflowConfig, PaymentConfig, ProviderConfig, StoreConfig,
};
