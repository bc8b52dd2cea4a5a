pub mod discovery;
#[cfg(test)]
pub(crate) mod fake;
pub mod provider;
pub mod token;

pub use discovery::{discover_metadata, resolve_endpoints, Endpoints, OidcMetadata};
pub use provider::{HttpIdentityProvider, IdentityProvider, TokenPoll};
pub use token::{decode_jwt_claims, DeviceAuthorizationResponse, OAuthErrorBody};
