//! LinkedIn platform adapter
//!
//! Bearer-authenticated JSON calls that also need the Restli protocol
//! header; identity comes from the OIDC userinfo endpoint, posts go through
//! the UGC API with the author expressed as a person URN.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::AppCredentials;
use crate::error::{OAuthError, ProviderError};
use crate::registry::{provider_config, ProviderKind};
use crate::types::{ProviderIdentity, TokenGrant};

use super::{AuthorizationRequest, ProviderAdapter, PublishContent, PublishedPost};

const IDENTITY_URL: &str = "https://api.linkedin.com/v2/userinfo";
const PUBLISH_URL: &str = "https://api.linkedin.com/v2/ugcPosts";
const RESTLI_HEADER: (&str, &str) = ("X-Restli-Protocol-Version", "2.0.0");

pub struct LinkedinAdapter {
    http: reqwest::Client,
}

impl LinkedinAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct LinkedinTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedinTokenError {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedinUserinfo {
    sub: String,
    name: Option<String>,
    given_name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedinPostResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LinkedinApiError {
    message: Option<String>,
    #[serde(rename = "serviceErrorCode")]
    service_error_code: Option<i64>,
}

fn map_linkedin_error(status: reqwest::StatusCode, body: &str, context: &str) -> ProviderError {
    if let Ok(parsed) = serde_json::from_str::<LinkedinApiError>(body) {
        if let Some(message) = parsed.message {
            return match parsed.service_error_code {
                Some(code) => ProviderError::with_code(message, code.to_string()),
                None => ProviderError::with_code(message, status.as_u16().to_string()),
            };
        }
    }

    ProviderError::with_code(
        format!("LinkedIn {} failed with status {}", context, status),
        status.as_u16().to_string(),
    )
}

#[async_trait]
impl ProviderAdapter for LinkedinAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Linkedin
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
            .append_pair("scope", &config.scope_string())
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

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", app.redirect_uri.as_str()),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(config.token_url)
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
            let reason = serde_json::from_str::<LinkedinTokenError>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or_else(|| format!("status {}", status));
            return Err(OAuthError::Exchange(reason));
        }

        let token: LinkedinTokenResponse = serde_json::from_str(&body)
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
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("LinkedIn identity request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("LinkedIn identity request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_linkedin_error(status, &body, "identity lookup"));
        }

        let user: LinkedinUserinfo = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("LinkedIn identity parse error: {}", e)))?;

        let display_name = user
            .name
            .or(user.given_name)
            .unwrap_or_else(|| user.sub.clone());

        Ok(ProviderIdentity {
            provider_account_id: user.sub,
            display_name,
            handle: None,
            avatar_url: user.picture,
            account_type: "personal".to_string(),
        })
    }

    async fn publish(
        &self,
        provider_account_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError> {
        let share_content = match &content.link_url {
            Some(link) => json!({
                "shareCommentary": { "text": content.text },
                "shareMediaCategory": "ARTICLE",
                "media": [{ "status": "READY", "originalUrl": link }],
            }),
            None => json!({
                "shareCommentary": { "text": content.text },
                "shareMediaCategory": "NONE",
            }),
        };

        let payload = json!({
            "author": format!("urn:li:person:{}", provider_account_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        });

        let response = self
            .http
            .post(PUBLISH_URL)
            .bearer_auth(access_token)
            .header(RESTLI_HEADER.0, RESTLI_HEADER.1)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("LinkedIn publish request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("LinkedIn publish request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_linkedin_error(status, &body, "publish"));
        }

        let post: LinkedinPostResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("LinkedIn publish parse error: {}", e)))?;

        let post_url = format!("https://www.linkedin.com/feed/update/{}", post.id);
        Ok(PublishedPost {
            post_id: post.id,
            post_url: Some(post_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_scopes_space_joined() {
        let adapter = LinkedinAdapter::new(reqwest::Client::new());
        let app = AppCredentials {
            client_id: "li-app".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example.com/callback/linkedin".to_string(),
        };

        let request = adapter.authorization_url(&app, "st").unwrap();
        let url = url::Url::parse(&request.url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(
            pairs.get("scope").map(AsRef::as_ref),
            Some("openid profile w_member_social")
        );
        assert!(request.pkce_verifier.is_none());
    }

    #[test]
    fn test_error_mapping_service_error_code() {
        let body = r#"{"message":"ugcPosts with unsupported author","serviceErrorCode":100,"status":403}"#;
        let error = map_linkedin_error(reqwest::StatusCode::FORBIDDEN, body, "publish");
        assert!(error.message.contains("unsupported author"));
        assert_eq!(error.code.as_deref(), Some("100"));
    }

    #[test]
    fn test_error_mapping_fallback() {
        let error = map_linkedin_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}", "publish");
        assert!(error.message.contains("status 429"));
        assert_eq!(error.code.as_deref(), Some("429"));
    }
}
