//! Bluesky platform adapter
//!
//! The one provider without an authorization redirect: connection happens by
//! exchanging a handle and app password for a session directly. Publishing
//! writes an `app.bsky.feed.post` record through the XRPC repo API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::registry::ProviderKind;
use crate::types::{ProviderIdentity, TokenGrant};

use super::{ProviderAdapter, PublishContent, PublishedPost};

const XRPC_BASE: &str = "https://bsky.social/xrpc";

pub struct BlueskyAdapter {
    http: reqwest::Client,
}

impl BlueskyAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BskySession {
    access_jwt: String,
    refresh_jwt: Option<String>,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct BskyCurrentSession {
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct BskyCreateRecordResponse {
    uri: String,
}

/// XRPC errors are `{"error": "<Code>", "message": "<detail>"}`.
#[derive(Debug, Deserialize)]
struct BskyErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn map_bsky_error(status: reqwest::StatusCode, body: &str, context: &str) -> ProviderError {
    if let Ok(parsed) = serde_json::from_str::<BskyErrorBody>(body) {
        if parsed.error.is_some() || parsed.message.is_some() {
            let message = parsed
                .message
                .unwrap_or_else(|| format!("Bluesky {} failed with status {}", context, status));
            return match parsed.error {
                Some(code) => ProviderError::with_code(message, code),
                None => ProviderError::new(message),
            };
        }
    }

    ProviderError::with_code(
        format!("Bluesky {} failed with status {}", context, status),
        status.as_u16().to_string(),
    )
}

/// Permalink for an AT URI like `at://did:plc:abc/app.bsky.feed.post/3k44`.
fn post_url_from_at_uri(uri: &str, did: &str) -> Option<String> {
    let rkey = uri.rsplit('/').next()?;
    if rkey.is_empty() {
        return None;
    }
    Some(format!("https://bsky.app/profile/{}/post/{}", did, rkey))
}

#[async_trait]
impl ProviderAdapter for BlueskyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bluesky
    }

    async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(TokenGrant, ProviderIdentity), ProviderError> {
        let response = self
            .http
            .post(format!("{}/com.atproto.server.createSession", XRPC_BASE))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Bluesky session request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Bluesky session request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_bsky_error(status, &body, "session creation"));
        }

        let session: BskySession = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Bluesky session parse error: {}", e)))?;

        let grant = TokenGrant {
            access_token: session.access_jwt,
            refresh_token: session.refresh_jwt,
            expires_in: None,
            scope: None,
        };

        let identity = ProviderIdentity {
            provider_account_id: session.did,
            display_name: session.handle.clone(),
            handle: Some(format!("@{}", session.handle)),
            avatar_url: None,
            account_type: "personal".to_string(),
        };

        Ok((grant, identity))
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, ProviderError> {
        let response = self
            .http
            .get(format!("{}/com.atproto.server.getSession", XRPC_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Bluesky identity request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Bluesky identity request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_bsky_error(status, &body, "identity lookup"));
        }

        let session: BskyCurrentSession = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Bluesky identity parse error: {}", e)))?;

        Ok(ProviderIdentity {
            provider_account_id: session.did,
            display_name: session.handle.clone(),
            handle: Some(format!("@{}", session.handle)),
            avatar_url: None,
            account_type: "personal".to_string(),
        })
    }

    async fn publish(
        &self,
        provider_account_id: &str,
        access_token: &str,
        content: &PublishContent,
    ) -> Result<PublishedPost, ProviderError> {
        let text = match &content.link_url {
            Some(link) => format!("{} {}", content.text, link),
            None => content.text.clone(),
        };

        let payload = json!({
            "repo": provider_account_id,
            "collection": "app.bsky.feed.post",
            "record": {
                "$type": "app.bsky.feed.post",
                "text": text,
                "createdAt": chrono::Utc::now().to_rfc3339(),
            },
        });

        let response = self
            .http
            .post(format!("{}/com.atproto.repo.createRecord", XRPC_BASE))
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Bluesky publish request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Bluesky publish request failed: {}", e)))?;

        if !status.is_success() {
            return Err(map_bsky_error(status, &body, "publish"));
        }

        let created: BskyCreateRecordResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(format!("Bluesky publish parse error: {}", e)))?;

        let post_url = post_url_from_at_uri(&created.uri, provider_account_id);
        Ok(PublishedPost {
            post_id: created.uri,
            post_url,
        })
    }
}
