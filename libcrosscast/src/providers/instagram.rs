//! Instagram platform adapter
//!
//! Publishing is a two-step container flow: stage the media and caption into
//! a container, then make the container live with a separate call. Either
//! step can fail on its own; a staged-but-never-published container is a
//! publish failure, and the container id stays internal to this adapter.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AppCredentials;
use crate::error::{OAuthError, ProviderError};
use crate::registry::{provider_config, ProviderKind};
use crate::types::{MediaType, ProviderIdentity, TokenGrant};

use super::{AuthorizationRequest, ProviderAdapter, PublishContent, PublishedPost};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramAdapter {
    http: reqwest::Client,
}

impl InstagramAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Step 1: stage media + caption, returning the container id.
    async fn create_container(
        &self,
        ig_user_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<String, ProviderError> {
        let media_url = content
            .media_url
            .as_deref()
            .ok_or_else(|| ProviderError::with_code("Instagram requires media", "media_required"))?;

        let media_param = match content.media_type {
            Some(MediaType::Video) => ("video_url", media_url),
            _ => ("image_url", media_url),
        };

        let response = self
            .http
            .post(format!("{}/{}/media", GRAPH_BASE, ig_user_id))
            .form(&[
                media_param,
                ("caption", content.text.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Instagram container request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Instagram container request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_ig_error(status, &body, "container creation"));
        }
        if let Some(error) = ig_error_in_body(&body) {
            return Err(error);
        }

        let created: IgIdResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Instagram container parse error: {}", e)))?;

        Ok(created.id)
    }

    /// Step 2: make a staged container live, returning the media id.
    async fn publish_container(
        &self,
        ig_user_id: &str,
        access_token: &str,
        container_id: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/{}/media_publish", GRAPH_BASE, ig_user_id))
            .form(&[
                ("creation_id", container_id),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Instagram publish request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Instagram publish request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_ig_error(status, &body, "container publish"));
        }
        if let Some(error) = ig_error_in_body(&body) {
            return Err(error);
        }

        let published: IgIdResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Instagram publish parse error: {}", e)))?;

        Ok(published.id)
    }
}

#[derive(Debug, Deserialize)]
struct IgIdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct IgTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IgUser {
    id: String,
    username: String,
    account_type: Option<String>,
    profile_picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgErrorEnvelope {
    error: IgError,
}

#[derive(Debug, Deserialize)]
struct IgError {
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
}

fn map_ig_error(status: reqwest::StatusCode, body: &str, context: &str) -> ProviderError {
    if let Ok(parsed) = serde_json::from_str::<IgErrorEnvelope>(body) {
        let code = parsed
            .error
            .error_subcode
            .or(parsed.error.code)
            .map(|c| c.to_string());
        return match code {
            Some(code) => ProviderError::with_code(parsed.error.message, code),
            None => ProviderError::new(parsed.error.message),
        };
    }

    ProviderError::with_code(
        format!("Instagram {} failed with status {}", context, status),
        status.as_u16().to_string(),
    )
}

fn ig_error_in_body(body: &str) -> Option<ProviderError> {
    serde_json::from_str::<IgErrorEnvelope>(body).ok().map(|e| {
        let code = e
            .error
            .error_subcode
            .or(e.error.code)
            .map(|c| c.to_string());
        ProviderError {
            message: e.error.message,
            code,
        }
    })
}

#[async_trait]
impl ProviderAdapter for InstagramAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Instagram
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
                map_ig_error(status, &body, "token exchange").to_string(),
            ));
        }

        let token: IgTokenResponse = serde_json::from_str(&body)
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
                ("fields", "id,username,account_type,profile_picture_url"),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Instagram identity request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::new(format!("Instagram identity request failed: {}", e))
        })?;

        if !status.is_success() {
            return Err(map_ig_error(status, &body, "identity lookup"));
        }

        let user: IgUser = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Instagram identity parse error: {}", e)))?;

        Ok(ProviderIdentity {
            provider_account_id: user.id,
            display_name: user.username.clone(),
            handle: Some(format!("@{}", user.username)),
            avatar_url: user.profile_picture_url,
            account_type: user
                .account_type
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "personal".to_string()),
        })
    }

    async fn publish(
        &self,
        provider_account_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError> {
        let container_id = self
            .create_container(provider_account_id, access_token, content)
            .await?;

        let media_id = self
            .publish_container(provider_account_id, access_token, &container_id)
            .await?;

        Ok(PublishedPost {
            post_id: media_id,
            post_url: None,
        })
    }
}
