use std::path::PathBuf;

/// Terminal polling failures, keyed by the provider error code that caused them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollingError {
    #[error("Authorization expired. Please try again.")]
    Expired,

    #[error("Authorization was denied by the user.")]
    AccessDenied,

    #[error("{}", provider_message(.code, .description.as_deref()))]
    Provider {
        code: String,
        description: Option<String>,
    },

    #[error("Authorization failed: network error ({0})")]
    Network(String),

    #[error("Authorization was cancelled.")]
    Cancelled,
}

fn provider_message(code: &str, description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => d.to_string(),
        _ if !code.is_empty() => code.to_string(),
        _ => "Authorization failed. Please try again.".to_string(),
    }
}

impl PollingError {
    /// The OAuth error code this failure corresponds to.
    pub fn provider_code(&self) -> &str {
        match self {
            PollingError::Expired => "expired_token",
            PollingError::AccessDenied => "access_denied",
            PollingError::Provider { code, .. } => code,
            PollingError::Network(_) => "network_error",
            PollingError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrantflowError {
    #[error("{0}")]
    AuthRequest(String),

    #[error(transparent)]
    Polling(#[from] PollingError),

    #[error("{0}")]
    UserInfo(String),

    #[error("{0}")]
    Revocation(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Downstream service returned {status}: {body}")]
    Downstream { status: u16, body: String },

    #[error("Insufficient permissions: requires {}", .required.join(" "))]
    InsufficientScope {
        required: Vec<String>,
        provided: Vec<String>,
    },

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Error in config {}: {detail}", path.display())]
    ConfigError { path: PathBuf, detail: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GrantflowError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            GrantflowError::AuthRequest(_) => "auth_request_failed",
            GrantflowError::Polling(_) => "polling_failed",
            GrantflowError::UserInfo(_) => "userinfo_failed",
            GrantflowError::Revocation(_) => "revocation_failed",
            GrantflowError::Exchange(_) => "exchange_failed",
            GrantflowError::Downstream { .. } => "downstream_error",
            GrantflowError::InsufficientScope { .. } => "insufficient_scope",
            GrantflowError::Unauthenticated(_) => "unauthenticated",
            GrantflowError::InvalidInput(_) => "invalid_input",
            GrantflowError::ConfigError { .. } => "config_error",
            GrantflowError::IoError(_) => "io_error",
        }
    }

    /// HTTP status a service should answer with when this error reaches a handler.
    pub fn http_status(&self) -> u16 {
        match self {
            GrantflowError::Unauthenticated(_) => 401,
            GrantflowError::InsufficientScope { .. } => 403,
            GrantflowError::Downstream { status, .. } => *status,
            GrantflowError::Exchange(_) => 502,
            GrantflowError::InvalidInput(_) => 400,
            _ => 500,
        }
    }

    /// Human-readable reason from a downstream error body: its `message`
    /// field when the body is JSON and carries one.
    pub fn downstream_message(&self) -> Option<String> {
        match self {
            GrantflowError::Downstream { body, .. } => {
                serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            }
            _ => None,
        }
    }

    /// `{"error": {"message", "code", ...}}` for `--json` output. Scope and
    /// downstream failures carry their details alongside.
    pub fn to_json(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.to_string(),
            "code": self.code(),
        });
        let extra = match self {
            GrantflowError::Polling(e) => serde_json::json!({ "providerCode": e.provider_code() }),
            GrantflowError::InsufficientScope { required, provided } => {
                serde_json::json!({ "required": required, "provided": provided })
            }
            GrantflowError::Downstream { status, .. } => serde_json::json!({ "status": status }),
            _ => serde_json::Value::Null,
        };
        if let (Some(target), serde_json::Value::Object(fields)) = (error.as_object_mut(), extra) {
            target.extend(fields);
        }
        serde_json::json!({ "error": error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_error_messages() {
        assert_eq!(
            PollingError::Expired.to_string(),
            "Authorization expired. Please try again."
        );
        assert_eq!(
            PollingError::AccessDenied.to_string(),
            "Authorization was denied by the user."
        );
    }

    #[test]
    fn provider_error_prefers_description() {
        let err = PollingError::Provider {
            code: "invalid_client".into(),
            description: Some("Client authentication failed".into()),
        };
        assert_eq!(err.to_string(), "Client authentication failed");
    }

    #[test]
    fn provider_error_falls_back_to_code_then_generic() {
        let err = PollingError::Provider {
            code: "invalid_grant".into(),
            description: None,
        };
        assert_eq!(err.to_string(), "invalid_grant");

        let err = PollingError::Provider {
            code: String::new(),
            description: Some(String::new()),
        };
        assert_eq!(err.to_string(), "Authorization failed. Please try again.");
    }

    #[test]
    fn display_insufficient_scope() {
        let err = GrantflowError::InsufficientScope {
            required: vec!["store:manage".into()],
            provided: vec!["store:purchase".into()],
        };
        assert_eq!(
            err.to_string(),
            "Insufficient permissions: requires store:manage"
        );
    }

    #[test]
    fn config_error_names_the_file() {
        let err = GrantflowError::ConfigError {
            path: PathBuf::from("/home/user/.grantflow/grantflow.json"),
            detail: "invalid JSON".into(),
        };
        assert_eq!(
            err.to_string(),
            "Error in config /home/user/.grantflow/grantflow.json: invalid JSON"
        );
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(GrantflowError::Unauthenticated("x".into()).http_status(), 401);
        assert_eq!(
            GrantflowError::InsufficientScope {
                required: vec![],
                provided: vec![]
            }
            .http_status(),
            403
        );
        assert_eq!(
            GrantflowError::Downstream {
                status: 503,
                body: String::new()
            }
            .http_status(),
            503
        );
        assert_eq!(GrantflowError::Exchange("e".into()).http_status(), 502);
        assert_eq!(GrantflowError::UserInfo("e".into()).http_status(), 500);
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(GrantflowError::AuthRequest("e".into()).code(), "auth_request_failed");
        assert_eq!(
            GrantflowError::Polling(PollingError::Expired).code(),
            "polling_failed"
        );
        assert_eq!(GrantflowError::Revocation("e".into()).code(), "revocation_failed");
        assert_eq!(GrantflowError::Unauthenticated("e".into()).code(), "unauthenticated");
        assert_eq!(
            GrantflowError::IoError(std::io::Error::other("closed")).code(),
            "io_error"
        );
    }

    #[test]
    fn downstream_message_extraction() {
        let err = GrantflowError::Downstream {
            status: 500,
            body: r#"{"message":"Card declined"}"#.into(),
        };
        assert_eq!(err.downstream_message().as_deref(), Some("Card declined"));

        let err = GrantflowError::Downstream {
            status: 500,
            body: "Internal Server Error".into(),
        };
        assert!(err.downstream_message().is_none());
    }

    #[test]
    fn json_carries_scope_details() {
        let err = GrantflowError::InsufficientScope {
            required: vec!["payments:manage".into()],
            provided: vec!["payments:view".into()],
        };
        let json = err.to_json();
        let error_obj = &json["error"];
        assert_eq!(error_obj["code"], "insufficient_scope");
        assert_eq!(error_obj["required"][0], "payments:manage");
        assert_eq!(error_obj["provided"][0], "payments:view");

        let json = GrantflowError::Polling(PollingError::AccessDenied).to_json();
        assert_eq!(json["error"]["providerCode"], "access_denied");
    }
}
