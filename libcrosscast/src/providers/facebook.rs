//! Facebook platform adapter
//!
//! Graph API calls carry the access token as a request parameter rather than
//! a header, and every failure arrives as `{"error": {...}}` regardless of
//! HTTP status.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AppCredentials;
use crate::error::{OAuthError, ProviderError};
use crate::registry::{provider_config, ProviderKind};
use crate::types::{ProviderIdentity, TokenGrant};

use super::{AuthorizationRequest, ProviderAdapter, PublishContent, PublishedPost};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookAdapter {
    http: reqwest::Client,
}

impl FacebookAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    id: String,
    name: String,
    picture: Option<GraphPicture>,
}

#[derive(Debug, Deserialize)]
struct GraphPicture {
    data: GraphPictureData,
}

#[derive(Debug, Deserialize)]
struct GraphPictureData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphPostResponse {
    id: Option<String>,
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    code: Option<i64>,
}

fn map_graph_error(status: reqwest::StatusCode, body: &str, context: &str) -> ProviderError {
    if let Ok(parsed) = serde_json::from_str::<GraphErrorEnvelope>(body) {
        return match parsed.error.code {
            Some(code) => ProviderError::with_code(parsed.error.message, code.to_string()),
            None => ProviderError::new(parsed.error.message),
        };
    }

    ProviderError::with_code(
        format!("Facebook {} failed with status {}", context, status),
        status.as_u16().to_string(),
    )
}

/// Graph endpoints report errors in-body; a 200 with an `error` object is
/// still a failure.
fn graph_error_in_body(body: &str) -> Option<ProviderError> {
    serde_json::from_str::<GraphErrorEnvelope>(body)
        .ok()
        .map(|e| match e.error.code {
            Some(code) => ProviderError::with_code(e.error.message, code.to_string()),
            None => ProviderError::new(e.error.message),
        })
}

#[async_trait]
impl ProviderAdapter for FacebookAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Facebook
    }

    fn authorization_url(
        &self,
        app: &AppCredentials,
        state: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        let config = provider_config(self.kind());

        let mut url = url::Url::parse(config.authorize_url)
            .map_err(|e| ProviderError::new(format!("Bad authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &app.client_id)
            .append_pair("redirect_uri", &app.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scopes.join(","))
            .append_pair("state", state);

        Ok(AuthorizationRequest {
            url: url.to_string(),
            pkce_verifier: None,
        })
    }

    async fn exchange_code(
        &self,
        app: &AppCredentials,
        code: &str,
        _pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, OAuthError> {
        let config = provider_config(self.kind());

        let response = self
            .http
            .get(config.token_url)
            .query(&[
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
                ("redirect_uri", app.redirect_uri.as_str()),
                ("code", code),
            ])
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
                map_graph_error(status, &body, "token exchange").to_string(),
            ));
        }

        let token: GraphTokenResponse = serde_json::from_str(&body)
            .map_err(|e| OAuthError::Exchange(format!("Parse error: {}", e)))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: None,
            expires_in: token.expires_in,
            scope: Some(config.scope_string()),
        })
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, ProviderError> {
        let response = self
            .http
            .get(format!("{}/me", GRAPH_BASE))
            .query(&[
                ("fields", "id,name,picture{url}"),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Facebook identity request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Facebook identity request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_graph_error(status, &body, "identity lookup"));
        }

        let user: GraphUser = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Facebook identity parse error: {}", e)))?;

        Ok(ProviderIdentity {
            provider_account_id: user.id,
            display_name: user.name,
            handle: None,
            avatar_url: user.picture.and_then(|p| p.data.url),
            account_type: "page".to_string(),
        })
    }

    async fn publish(
        &self,
        provider_account_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError> {
        // Media posts go to /photos, plain and link posts to /feed.
        let (endpoint, mut params) = match &content.media_url {
            Some(media) => (
                format!("{}/{}/photos", GRAPH_BASE, provider_account_id),
                vec![
                    ("url".to_string(), media.clone()),
                    ("caption".to_string(), content.text.clone()),
                ],
            ),
            None => {
                let mut params = vec![("message".to_string(), content.text.clone())];
                if let Some(link) = &content.link_url {
                    params.push(("link".to_string(), link.clone()));
                }
                (format!("{}/{}/feed", GRAPH_BASE, provider_account_id), params)
            }
        };
        params.push(("access_token".to_string(), access_token.to_string()));

        let response = self
            .http
            .post(&endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Facebook publish request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Facebook publish request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_graph_error(status, &body, "publish"));
        }
        if let Some(error) = graph_error_in_body(&body) {
            return Err(error);
        }

        let post: GraphPostResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Facebook publish parse error: {}", e)))?;

        // Photo posts report the feed-visible id as post_id.
        let post_id = post
            .post_id
            .or(post.id)
            .ok_or_else(|| ProviderError::new("Facebook publish response had no post id"))?;

        let post_url = format!("https://www.facebook.com/{}", post_id);
        Ok(PublishedPost {
            post_id,
            post_url: Some(post_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_has_no_pkce() {
        let adapter = FacebookAdapter::new(reqwest::Client::new());
        let app = AppCredentials {
            client_id: "fb-app".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example.com/callback/facebook".to_string(),
        };

        let request = adapter.authorization_url(&app, "state-token").unwrap();
        assert!(request.pkce_verifier.is_none());

        let url = url::Url::parse(&request.url).unwrap();
        assert_eq!(url.host_str(), Some("www.facebook.com"));
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs.get("state").map(AsRef::as_ref), Some("state-token"));
        // Graph scopes are comma-separated, not space-separated.
        assert!(pairs
            .get("scope")
            .is_some_and(|s| s.contains("pages_manage_posts,")));
    }

    #[test]
    fn test_error_mapping_graph_envelope() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#;
        let error = map_graph_error(reqwest::StatusCode::UNAUTHORIZED, body, "publish");
        assert_eq!(error.message, "Invalid OAuth access token.");
        assert_eq!(error.code.as_deref(), Some("190"));
    }

    #[test]
    fn test_error_mapping_fallback() {
        let error = map_graph_error(reqwest::StatusCode::BAD_GATEWAY, "gateway down", "publish");
        assert!(error.message.contains("publish failed with status"));
        assert_eq!(error.code.as_deref(), Some("502"));
    }

    #[test]
    fn test_error_in_successful_body_detected() {
        let body = r#"{"error":{"message":"(#200) Permissions error","code":200}}"#;
        let error = graph_error_in_body(body).unwrap();
        assert!(error.message.contains("Permissions error"));

        assert!(graph_error_in_body(r#"{"id":"123_456"}"#).is_none());
    }
}
