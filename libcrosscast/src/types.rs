//! Core types for Crosscast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::ProviderKind;

/// Lifecycle of a connected account.
///
/// `connected` is the only publishable state. Transitions to `needs_refresh`
/// are driven by an external token-expiry sweep; re-running the connect flow
/// returns the account to `connected`. Disconnect deletes the row outright,
/// so `disconnected` only appears transiently in API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Connected,
    NeedsRefresh,
    Disconnected,
    Error,
}

/// A social account connected to a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub provider: ProviderKind,
    /// The provider's own identifier for this account.
    pub provider_account_id: String,
    pub display_name: String,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    /// Provider-reported account class ("personal", "business", "page", ...).
    pub account_type: String,
    pub autopublish_capable: bool,
    pub status: AccountStatus,
    pub last_connected_at: i64,
}

/// Token record owned by exactly one `ConnectedAccount`.
///
/// Never exposed outside the connection/dispatch boundary.
#[derive(Debug, Clone)]
pub struct Credential {
    pub account_id: Uuid,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp; `None` for tokens without a provider-reported TTL.
    pub expires_at: Option<i64>,
    pub scope: String,
}

/// Normalized "who am I" answer from a provider.
///
/// Each provider exposes a different identity endpoint and shape; adapters
/// reduce all of them to this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider_account_id: String,
    pub display_name: String,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub account_type: String,
}

/// Tokens returned by a code exchange or direct login.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until expiry, when the provider reports one.
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            _ => Err(format!(
                "Unknown media type: '{}'. Valid options: image, video",
                s
            )),
        }
    }
}

/// One outbound publish call. Transient; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub workspace_id: Uuid,
    pub content: String,
    pub link_url: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaType>,
    pub target_account_ids: Vec<Uuid>,
}

/// Outcome for a single target. Every requested target id appears exactly
/// once in a dispatch's result set.
///
/// `provider` is `None` only for targets that never resolved to an account,
/// where the platform cannot be known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub account_id: Uuid,
    pub provider: Option<ProviderKind>,
    pub success: bool,
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    pub error: Option<String>,
}

impl PublishResult {
    pub fn success(
        account_id: Uuid,
        provider: ProviderKind,
        post_id: String,
        post_url: Option<String>,
    ) -> Self {
        Self {
            account_id,
            provider: Some(provider),
            success: true,
            post_id: Some(post_id),
            post_url,
            error: None,
        }
    }

    pub fn failure(
        account_id: Uuid,
        provider: impl Into<Option<ProviderKind>>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            provider: provider.into(),
            success: false,
            post_id: None,
            post_url: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Published,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate result of one fan-out. Derived from its results, never stored
/// independently of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub status: OutcomeStatus,
    pub results: Vec<PublishResult>,
    pub summary: OutcomeSummary,
}

impl PublishOutcome {
    /// Aggregate per-target results into the overall outcome.
    ///
    /// `published` iff every target succeeded, `failed` iff none did,
    /// `partial` otherwise.
    pub fn from_results(results: Vec<PublishResult>) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = total - succeeded;

        let status = if succeeded == total {
            OutcomeStatus::Published
        } else if succeeded == 0 {
            OutcomeStatus::Failed
        } else {
            OutcomeStatus::Partial
        };

        Self {
            status,
            results,
            summary: OutcomeSummary {
                total,
                succeeded,
                failed,
            },
        }
    }
}

/// Role of a user inside a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl WorkspaceRole {
    pub fn can_publish(&self) -> bool {
        !matches!(self, WorkspaceRole::Viewer)
    }
}
