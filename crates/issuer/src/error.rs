use thiserror::Error;

#[derive(Debug, Error)]
pub enum IssuerError {
    /// Malformed key material, client registration or lifetime. Surfaced to
    /// the administrative layer, never to end users.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Unknown, expired or already-redeemed code, or a refresh token that
    /// failed its liveness check.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),
    #[error("Invalid client: {0}")]
    InvalidClient(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid scope: {0}")]
    InvalidScope(String),
    #[error("Misconfigured storage: {0}")]
    MisconfiguredStorage(String),
    #[error("Unreachable key store policy: {0}")]
    UnreachablePolicy(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IssuerError {
    /// OAuth2 error code the endpoint layer should answer with.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            IssuerError::InvalidGrant(_) => "invalid_grant",
            IssuerError::InvalidClient(_) => "invalid_client",
            IssuerError::InvalidRequest(_) => "invalid_request",
            IssuerError::InvalidScope(_) => "invalid_scope",
            _ => "server_error",
        }
    }

    /// Configuration errors that must stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IssuerError::MisconfiguredStorage(_) | IssuerError::UnreachablePolicy(_)
        )
    }

    pub(crate) fn invalid_grant(msg: impl Into<String>) -> Self {
        IssuerError::InvalidGrant(msg.into())
    }
}
