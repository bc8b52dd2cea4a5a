use crate::error::GrantflowError;
use crate::oauth::token::decode_jwt_claims;

/// Print the unverified claims of a JWT.
pub fn run_decode(token: &str) -> Result<(), GrantflowError> {
    let claims = decode_jwt_claims(token.trim()).ok_or_else(|| {
        GrantflowError::InvalidInput("token is not a JWT with a JSON payload".into())
    })?;
    super::output::print_json(&claims);
    Ok(())
}
