//! Mock provider adapter for testing
//!
//! Configurable success, failure and latency behavior plus call recording,
//! so dispatcher and connection tests run without credentials or network
//! access. Available in all builds to support integration tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppCredentials;
use crate::error::{OAuthError, ProviderError};
use crate::registry::ProviderKind;
use crate::types::{ProviderIdentity, TokenGrant};

use super::{
    AuthorizationRequest, ProviderAdapter, PublishContent, PublishedPost,
};

/// Behavior configuration for a mock adapter.
#[derive(Debug, Clone)]
pub struct MockAdapterConfig {
    pub kind: ProviderKind,

    /// Whether publish calls succeed.
    pub publish_succeeds: bool,

    /// Error returned on publish failure.
    pub publish_error: ProviderError,

    /// Whether login/exchange/identity calls succeed.
    pub auth_succeeds: bool,

    /// Delay before completing publish calls (simulates network latency).
    pub delay: Duration,

    /// Identity returned by identity/login calls.
    pub identity: ProviderIdentity,

    /// Recorded content of successful and failed publish attempts.
    pub published_content: Arc<Mutex<Vec<String>>>,

    /// Number of publish calls made.
    pub publish_call_count: Arc<Mutex<usize>>,
}

impl MockAdapterConfig {
    fn default_for(kind: ProviderKind) -> Self {
        Self {
            kind,
            publish_succeeds: true,
            publish_error: ProviderError::new("mock publish failure"),
            auth_succeeds: true,
            delay: Duration::from_millis(0),
            identity: ProviderIdentity {
                provider_account_id: format!("mock-{}-account", kind),
                display_name: format!("Mock {}", kind),
                handle: Some(format!("@mock-{}", kind)),
                avatar_url: None,
                account_type: "personal".to_string(),
            },
            published_content: Arc::new(Mutex::new(Vec::new())),
            publish_call_count: Arc::new(Mutex::new(0)),
        }
    }
}

/// Mock adapter for tests.
pub struct MockAdapter {
    config: MockAdapterConfig,
}

impl MockAdapter {
    pub fn new(config: MockAdapterConfig) -> Self {
        Self { config }
    }

    /// Adapter that always succeeds.
    pub fn success(kind: ProviderKind) -> Self {
        Self::new(MockAdapterConfig::default_for(kind))
    }

    /// Adapter whose publish calls fail with the given error.
    pub fn publish_failure(kind: ProviderKind, error: ProviderError) -> Self {
        Self::new(MockAdapterConfig {
            publish_succeeds: false,
            publish_error: error,
            ..MockAdapterConfig::default_for(kind)
        })
    }

    /// Adapter whose auth-side calls (login, exchange, identity) fail.
    pub fn auth_failure(kind: ProviderKind) -> Self {
        Self::new(MockAdapterConfig {
            auth_succeeds: false,
            ..MockAdapterConfig::default_for(kind)
        })
    }

    /// Adapter that sleeps before completing each publish call.
    pub fn with_delay(kind: ProviderKind, delay: Duration) -> Self {
        Self::new(MockAdapterConfig {
            delay,
            ..MockAdapterConfig::default_for(kind)
        })
    }

    /// Adapter reporting a fixed identity.
    pub fn with_identity(kind: ProviderKind, identity: ProviderIdentity) -> Self {
        Self::new(MockAdapterConfig {
            identity,
            ..MockAdapterConfig::default_for(kind)
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn published_content(&self) -> Vec<String> {
        self.config.published_content.lock().unwrap().clone()
    }

    /// Handles to the shared counters, usable after the adapter moves into a
    /// registry.
    pub fn counters(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<String>>>) {
        (
            self.config.publish_call_count.clone(),
            self.config.published_content.clone(),
        )
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn authorization_url(
        &self,
        _app: &AppCredentials,
        state: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        Ok(AuthorizationRequest {
            url: format!("https://mock.example.com/authorize?state={}", state),
            pkce_verifier: None,
        })
    }

    async fn exchange_code(
        &self,
        _app: &AppCredentials,
        code: &str,
        _pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, OAuthError> {
        if !self.config.auth_succeeds {
            return Err(OAuthError::Exchange("mock exchange rejected".to_string()));
        }

        Ok(TokenGrant {
            access_token: format!("mock-token-for-{}", code),
            refresh_token: Some("mock-refresh".to_string()),
            expires_in: Some(3600),
            scope: Some("mock.scope".to_string()),
        })
    }

    async fn login(
        &self,
        identifier: &str,
        _password: &str,
    ) -> Result<(TokenGrant, ProviderIdentity), ProviderError> {
        if !self.config.auth_succeeds {
            return Err(ProviderError::with_code(
                "mock login rejected",
                "invalid_credentials",
            ));
        }

        let grant = TokenGrant {
            access_token: format!("mock-session-{}", identifier),
            refresh_token: None,
            expires_in: None,
            scope: None,
        };
        Ok((grant, self.config.identity.clone()))
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<ProviderIdentity, ProviderError> {
        if !self.config.auth_succeeds {
            return Err(ProviderError::new("mock identity rejected"));
        }
        Ok(self.config.identity.clone())
    }

    async fn publish(
        &self,
        _provider_account_id: &str,
        _access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError> {
        {
            let mut count = self.config.publish_call_count.lock().unwrap();
            *count += 1;
        }

        if self.config.delay > Duration::from_millis(0) {
            sleep(self.config.delay).await;
        }

        if !self.config.publish_succeeds {
            return Err(self.config.publish_error.clone());
        }

        self.config
            .published_content
            .lock()
            .unwrap()
            .push(content.text.clone());

        let n = *self.config.publish_call_count.lock().unwrap();
        Ok(PublishedPost {
            post_id: format!("mock-post-{}", n),
            post_url: Some(format!("https://mock.example.com/post/{}", n)),
        })
    }
}
