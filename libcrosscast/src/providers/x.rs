//! X platform adapter
//!
//! OAuth with a PKCE S256 challenge (X rejects plain authorization-code
//! flows), Bearer-authenticated JSON calls, and the v2 `{"data": ...}` /
//! `{"detail": ...}` response envelope.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use crate::config::AppCredentials;
use crate::error::{OAuthError, ProviderError};
use crate::registry::{provider_config, ProviderKind};
use crate::types::{ProviderIdentity, TokenGrant};

use super::{
    AuthorizationRequest, PkceParams, ProviderAdapter, PublishContent, PublishedPost,
};

const IDENTITY_URL: &str = "https://api.x.com/2/users/me";
const PUBLISH_URL: &str = "https://api.x.com/2/tweets";

pub struct XAdapter {
    http: reqwest::Client,
}

impl XAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct XTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XUserEnvelope {
    data: XUser,
}

#[derive(Debug, Deserialize)]
struct XUser {
    id: String,
    name: String,
    username: String,
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XPostEnvelope {
    data: XPost,
}

#[derive(Debug, Deserialize)]
struct XPost {
    id: String,
}

/// X error payloads come in two shapes: a problem document with
/// `detail`/`title`, or an `errors` array with per-item messages.
#[derive(Debug, Deserialize)]
struct XErrorBody {
    detail: Option<String>,
    title: Option<String>,
    errors: Option<Vec<XErrorItem>>,
}

#[derive(Debug, Deserialize)]
struct XErrorItem {
    message: Option<String>,
}

fn map_x_error(status: reqwest::StatusCode, body: &str, context: &str) -> ProviderError {
    if let Ok(parsed) = serde_json::from_str::<XErrorBody>(body) {
        let message = parsed
            .detail
            .or_else(|| {
                parsed
                    .errors
                    .and_then(|errs| errs.into_iter().find_map(|e| e.message))
            })
            .unwrap_or_else(|| format!("X {} failed with status {}", context, status));

        return match parsed.title {
            Some(title) => ProviderError::with_code(message, title),
            None => ProviderError::with_code(message, status.as_u16().to_string()),
        };
    }

    ProviderError::with_code(
        format!("X {} failed with status {}", context, status),
        status.as_u16().to_string(),
    )
}

#[async_trait]
impl ProviderAdapter for XAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::X
    }

    fn authorization_url(
        &self,
        app: &AppCredentials,
        state: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        let config = provider_config(self.kind());
        let pkce = PkceParams::generate();

        let mut url = url::Url::parse(config.authorize_url)
            .map_err(|e| ProviderError::new(format!("Bad authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &app.client_id)
            .append_pair("redirect_uri", &app.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scope_string())
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", &pkce.code_challenge_method);

        Ok(AuthorizationRequest {
            url: url.to_string(),
            pkce_verifier: Some(pkce.code_verifier),
        })
    }

    async fn exchange_code(
        &self,
        app: &AppCredentials,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, OAuthError> {
        let config = provider_config(self.kind());
        let verifier = pkce_verifier.ok_or_else(|| {
            OAuthError::Exchange("X token exchange requires a PKCE verifier".to_string())
        })?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", app.redirect_uri.as_str()),
            ("client_id", app.client_id.as_str()),
            ("code_verifier", verifier),
        ];

        let auth_header =
            STANDARD.encode(format!("{}:{}", app.client_id, app.client_secret));

        let response = self
            .http
            .post(config.token_url)
            .header("Authorization", format!("Basic {}", auth_header))
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        if !status.is_success() {
            return Err(OAuthError::Exchange(
                map_x_error(status, &body, "token exchange").to_string(),
            ));
        }

        let token: XTokenResponse = serde_json::from_str(&body)
            .map_err(|e| OAuthError::Exchange(format!("Parse error: {}", e)))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            scope: token.scope,
        })
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, ProviderError> {
        let response = self
            .http
            .get(IDENTITY_URL)
            .query(&[("user.fields", "profile_image_url")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("X identity request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("X identity request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_x_error(status, &body, "identity lookup"));
        }

        let user: XUserEnvelope = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("X identity parse error: {}", e)))?;

        Ok(ProviderIdentity {
            provider_account_id: user.data.id,
            display_name: user.data.name,
            handle: Some(format!("@{}", user.data.username)),
            avatar_url: user.data.profile_image_url,
            account_type: "personal".to_string(),
        })
    }

    async fn publish(
        &self,
        _provider_account_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError> {
        // Links ride inline in the post text; X auto-links them.
        let text = match &content.link_url {
            Some(link) => format!("{} {}", content.text, link),
            None => content.text.clone(),
        };

        let response = self
            .http
            .post(PUBLISH_URL)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("X publish request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("X publish request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_x_error(status, &body, "publish"));
        }

        // A 2xx body can still carry an errors array; check before trusting it.
        if let Ok(err_body) = serde_json::from_str::<XErrorBody>(&body) {
            if err_body.errors.as_ref().is_some_and(|e| !e.is_empty()) {
                return Err(map_x_error(status, &body, "publish"));
            }
        }

        let post: XPostEnvelope = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("X publish parse error: {}", e)))?;

        let post_url = format!("https://x.com/i/web/status/{}", post.data.id);
        Ok(PublishedPost {
            post_id: post.data.id,
            post_url: Some(post_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_contains_pkce_challenge() {
        let adapter = XAdapter::new(reqwest::Client::new());
        let app = AppCredentials {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example.com/callback/x".to_string(),
        };

        let request = adapter.authorization_url(&app, "signed-state").unwrap();
        let url = url::Url::parse(&request.url).unwrap();

        assert_eq!(url.host_str(), Some("x.com"));
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs.get("client_id").map(AsRef::as_ref), Some("client-123"));
        assert_eq!(pairs.get("state").map(AsRef::as_ref), Some("signed-state"));
        assert_eq!(
            pairs.get("code_challenge_method").map(AsRef::as_ref),
            Some("S256")
        );
        assert!(pairs.contains_key("code_challenge"));
        assert!(pairs
            .get("scope")
            .is_some_and(|s| s.contains("tweet.write")));
        assert!(request.pkce_verifier.is_some());
    }

    #[test]
    fn test_error_mapping_problem_document() {
        let body = r#"{"detail":"You are not allowed to create a Tweet with duplicate content.","title":"Forbidden","status":403}"#;
        let error = map_x_error(reqwest::StatusCode::FORBIDDEN, body, "publish");
        assert!(error.message.contains("duplicate content"));
        assert_eq!(error.code.as_deref(), Some("Forbidden"));
    }

    #[test]
    fn test_error_mapping_errors_array() {
        let body = r#"{"errors":[{"message":"Invalid media id"}]}"#;
        let error = map_x_error(reqwest::StatusCode::BAD_REQUEST, body, "publish");
        assert!(error.message.contains("Invalid media id"));
        assert_eq!(error.code.as_deref(), Some("400"));
    }

    #[test]
    fn test_error_mapping_unparseable_body() {
        let error = map_x_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "<html>oops</html>",
            "publish",
        );
        assert!(error.message.contains("publish failed with status"));
        assert_eq!(error.code.as_deref(), Some("500"));
    }
}
