//! Provider adapters
//!
//! One adapter per platform, translating the generic "publish this content"
//! and "who is this token" instructions into that platform's API call
//! sequence and normalizing its success and error shapes. Authentication
//! header placement, payload shape and media handling all differ per
//! provider; none of it is configuration-driven, which is why each adapter
//! is concrete code rather than a parameterized generic client.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppCredentials;
use crate::error::{OAuthError, ProviderError};
use crate::registry::ProviderKind;
use crate::types::{MediaType, ProviderIdentity, TokenGrant};

pub mod bluesky;
pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod x;

// Mock adapter is available for all builds (not just tests) to support
// integration tests.
pub mod mock;

/// Content handed to an adapter after request-level validation.
///
/// URLs have already passed the SSRF guard and are re-serialized.
#[derive(Debug, Clone, Default)]
pub struct PublishContent {
    pub text: String,
    pub link_url: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaType>,
}

/// Successful publish, normalized.
///
/// `post_url` is a browser-facing permalink when the platform has one.
/// Internal intermediate ids (e.g. a media container id) never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub post_id: String,
    pub post_url: Option<String>,
}

/// An initiated authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    /// PKCE verifier to hold server-side until the callback, for providers
    /// that require a challenge.
    pub pkce_verifier: Option<String>,
}

/// PKCE parameters with S256 challenge method.
#[derive(Debug, Clone)]
pub struct PkceParams {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl PkceParams {
    pub fn generate() -> Self {
        const CHARS: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..128)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".into(),
        }
    }
}

/// Capability interface implemented once per platform.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Build the provider's authorization URL with the signed state embedded.
    ///
    /// Providers that need extra parameters (e.g. a PKCE challenge) append
    /// them here and return the verifier for the callback leg.
    fn authorization_url(
        &self,
        app: &AppCredentials,
        state: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        let _ = (app, state);
        Err(ProviderError::new(format!(
            "{} does not use an authorization redirect",
            self.kind()
        )))
    }

    /// Exchange an authorization code for tokens at the provider's token
    /// endpoint.
    async fn exchange_code(
        &self,
        app: &AppCredentials,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, OAuthError> {
        let _ = (app, code, pkce_verifier);
        Err(OAuthError::Exchange(format!(
            "{} does not use authorization-code exchange",
            self.kind()
        )))
    }

    /// Direct-credential session creation, for providers without OAuth.
    async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(TokenGrant, ProviderIdentity), ProviderError> {
        let _ = (identifier, password);
        Err(ProviderError::new(format!(
            "{} does not support direct-credential login",
            self.kind()
        )))
    }

    /// Resolve the account identity behind an access token.
    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, ProviderError>;

    /// Publish one piece of content as the given account.
    async fn publish(
        &self,
        provider_account_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError>;
}

/// Maps provider identifiers to adapter implementations, so callers never
/// grow a conditional chain over providers.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Registry with every real adapter, sharing one HTTP client.
    pub fn new() -> Self {
        let http = reqwest::Client::new();
        let mut registry = Self {
            adapters: HashMap::new(),
        };
        registry.register(Arc::new(x::XAdapter::new(http.clone())));
        registry.register(Arc::new(facebook::FacebookAdapter::new(http.clone())));
        registry.register(Arc::new(linkedin::LinkedinAdapter::new(http.clone())));
        registry.register(Arc::new(instagram::InstagramAdapter::new(http.clone())));
        registry.register(Arc::new(bluesky::BlueskyAdapter::new(http)));
        registry
    }

    /// Empty registry, for tests that install mocks.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register (or replace) the adapter for its provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
