//! Error types for Crosscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl CrosscastError {
    /// HTTP-style status class for this error.
    ///
    /// Fan-out outcomes (including a fully failed fan-out) are not errors and
    /// never reach this mapping; they are reported inside a successful
    /// `PublishOutcome`.
    pub fn status_class(&self) -> u16 {
        match self {
            CrosscastError::Validation(_) => 400,
            CrosscastError::Authentication(_) | CrosscastError::OAuth(OAuthError::InvalidState) => {
                401
            }
            CrosscastError::Authorization(_) => 403,
            CrosscastError::NotFound(_) => 404,
            CrosscastError::OAuth(_) | CrosscastError::Provider(_) => 502,
            CrosscastError::ProviderNotConfigured(_)
            | CrosscastError::Config(_)
            | CrosscastError::Database(_) => 500,
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::Validation(_) => 3,
            CrosscastError::Authentication(_)
            | CrosscastError::Authorization(_)
            | CrosscastError::OAuth(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures of the three-leg authorization flow.
///
/// `Exchange` and `IdentityFetch` carry the provider's raw reason so callers
/// can diagnose rejected codes, redirect mismatches and revoked scopes.
#[derive(Error, Debug, Clone)]
pub enum OAuthError {
    #[error("invalid_state")]
    InvalidState,

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Identity lookup failed: {0}")]
    IdentityFetch(String),
}

/// Normalized provider-side failure.
///
/// Adapters translate each provider's own error payload shape into this one
/// struct; `code` preserves the provider's machine-readable error code when
/// one exists.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub message: String,
    pub code: Option<String>,
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Error recorded when an adapter call outlives the per-call deadline.
    pub fn timeout(secs: u64) -> Self {
        Self::with_code(
            format!("provider did not respond within {}s", secs),
            "timeout",
        )
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class_validation() {
        let error = CrosscastError::Validation("empty_content".to_string());
        assert_eq!(error.status_class(), 400);
    }

    #[test]
    fn test_status_class_authentication() {
        let error = CrosscastError::Authentication("missing token".to_string());
        assert_eq!(error.status_class(), 401);
    }

    #[test]
    fn test_status_class_authorization() {
        let error = CrosscastError::Authorization("viewer cannot publish".to_string());
        assert_eq!(error.status_class(), 403);
    }

    #[test]
    fn test_status_class_not_found() {
        let error = CrosscastError::NotFound("no_valid_accounts".to_string());
        assert_eq!(error.status_class(), 404);
    }

    #[test]
    fn test_status_class_invalid_state_is_auth_class() {
        let error = CrosscastError::OAuth(OAuthError::InvalidState);
        assert_eq!(error.status_class(), 401);
    }

    #[test]
    fn test_status_class_exchange_failure() {
        let error = CrosscastError::OAuth(OAuthError::Exchange("code expired".to_string()));
        assert_eq!(error.status_class(), 502);
    }

    #[test]
    fn test_status_class_provider_not_configured() {
        let error = CrosscastError::ProviderNotConfigured("x".to_string());
        assert_eq!(error.status_class(), 500);
    }

    #[test]
    fn test_exit_code_validation() {
        let error = CrosscastError::Validation("bad_id".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication() {
        let error = CrosscastError::Authentication("invalid_credentials".to_string());
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_database() {
        let error = CrosscastError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        )));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_provider_error_display_with_code() {
        let error = ProviderError::with_code("rate limited", "429");
        assert_eq!(format!("{}", error), "rate limited (429)");
    }

    #[test]
    fn test_provider_error_display_without_code() {
        let error = ProviderError::new("upstream unavailable");
        assert_eq!(format!("{}", error), "upstream unavailable");
    }

    #[test]
    fn test_provider_error_timeout_code() {
        let error = ProviderError::timeout(30);
        assert_eq!(error.code.as_deref(), Some("timeout"));
        assert!(error.message.contains("30s"));
    }

    #[test]
    fn test_oauth_error_conversion() {
        let error: CrosscastError = OAuthError::InvalidState.into();
        assert!(matches!(
            error,
            CrosscastError::OAuth(OAuthError::InvalidState)
        ));
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosscastError::Validation("too_long".to_string());
        assert_eq!(format!("{}", error), "Invalid request: too_long");

        let error = CrosscastError::OAuth(OAuthError::Exchange("redirect mismatch".to_string()));
        assert_eq!(
            format!("{}", error),
            "OAuth error: Token exchange failed: redirect mismatch"
        );
    }
}
