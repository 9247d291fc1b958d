//! Publish fan-out
//!
//! Authorizes the caller, validates the request, resolves the target
//! accounts and fans the content out across providers. Targets are
//! independent: per-target validation failures, missing credentials,
//! provider rejections and timeouts are each contained in that target's
//! `PublishResult` and never abort a sibling. Every requested target id
//! appears exactly once in the returned result set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{AuditRecord, Database};
use crate::error::{CrosscastError, ProviderError, Result};
use crate::providers::{AdapterRegistry, PublishContent};
use crate::registry::provider_config;
use crate::types::{AccountStatus, ConnectedAccount, PublishOutcome, PublishRequest, PublishResult};
use crate::validation;

#[derive(Clone)]
pub struct PublishService {
    db: Arc<Database>,
    config: Arc<Config>,
    adapters: Arc<AdapterRegistry>,
}

impl PublishService {
    pub fn new(db: Arc<Database>, config: Arc<Config>, adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            db,
            config,
            adapters,
        }
    }

    /// Fan one publish request out across its targets.
    ///
    /// Request-level failures (bad credential, insufficient role, malformed
    /// request, nothing to publish to) short-circuit before any network
    /// I/O. Per-target failures are reported inside the outcome; a fully
    /// failed fan-out is still an `Ok` return.
    pub async fn publish(
        &self,
        api_token: &str,
        request: PublishRequest,
    ) -> Result<PublishOutcome> {
        let actor_id = self.authenticate(api_token).await?;
        self.authorize(request.workspace_id, actor_id).await?;

        let sanitized = validation::validate_request(&request)?;

        // The id list is a set: duplicates collapse, order is preserved.
        let mut requested: Vec<Uuid> = Vec::new();
        for id in &request.target_account_ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        let accounts = self
            .db
            .get_accounts_by_ids(request.workspace_id, &requested)
            .await?;
        let by_id: HashMap<Uuid, ConnectedAccount> =
            accounts.into_iter().map(|a| (a.id, a)).collect();

        let connected = requested
            .iter()
            .filter(|id| {
                by_id
                    .get(id)
                    .is_some_and(|a| a.status == AccountStatus::Connected)
            })
            .count();
        if connected == 0 {
            return Err(CrosscastError::NotFound("no_valid_accounts".to_string()));
        }

        let content = PublishContent {
            text: request.content.clone(),
            link_url: sanitized.link_url,
            media_url: sanitized.media_url,
            media_type: request.media_type,
        };

        let semaphore = Arc::new(Semaphore::new(
            self.config.dispatch.max_concurrent_publishes.max(1),
        ));
        let timeout_secs = self.config.dispatch.publish_timeout_secs;

        let tasks = requested.iter().map(|&target_id| {
            let account = by_id.get(&target_id).cloned();
            let content = content.clone();
            let semaphore = semaphore.clone();
            self.publish_one(target_id, account, content, semaphore, timeout_secs)
        });

        let results: Vec<PublishResult> = join_all(tasks).await;

        let outcome = PublishOutcome::from_results(results);
        info!(
            workspace_id = %request.workspace_id,
            total = outcome.summary.total,
            succeeded = outcome.summary.succeeded,
            failed = outcome.summary.failed,
            "publish fan-out complete"
        );

        self.record_audit(&request, actor_id, &outcome).await;

        Ok(outcome)
    }

    /// Resolve the caller from their API token.
    async fn authenticate(&self, api_token: &str) -> Result<Uuid> {
        if api_token.trim().is_empty() {
            return Err(CrosscastError::Authentication(
                "missing credential".to_string(),
            ));
        }

        self.db
            .find_user_by_token_hash(&hash_token(api_token))
            .await?
            .ok_or_else(|| CrosscastError::Authentication("invalid credential".to_string()))
    }

    /// The caller must hold a publishing role in the target workspace.
    async fn authorize(&self, workspace_id: Uuid, actor_id: Uuid) -> Result<()> {
        let role = self
            .db
            .get_workspace_role(workspace_id, actor_id)
            .await?
            .ok_or_else(|| {
                CrosscastError::Authorization("not a member of this workspace".to_string())
            })?;

        if !role.can_publish() {
            return Err(CrosscastError::Authorization(
                "role does not permit publishing".to_string(),
            ));
        }

        Ok(())
    }

    /// Process one target end to end. Infallible by construction: every
    /// branch produces a `PublishResult`.
    async fn publish_one(
        &self,
        target_id: Uuid,
        account: Option<ConnectedAccount>,
        content: PublishContent,
        semaphore: Arc<Semaphore>,
        timeout_secs: u64,
    ) -> PublishResult {
        let account = match account {
            Some(account) => account,
            None => return PublishResult::failure(target_id, None, "not_found"),
        };

        if account.status != AccountStatus::Connected {
            return PublishResult::failure(target_id, account.provider, "not_connected");
        }

        // Platform rules first; a failure here never reaches the network.
        let config = provider_config(account.provider);
        if let Err(reason) =
            validation::validate_for_provider(&content.text, content.media_url.is_some(), config)
        {
            return PublishResult::failure(target_id, account.provider, reason);
        }

        let credential = match self.db.get_credential(account.id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                return PublishResult::failure(target_id, account.provider, "no_access_token")
            }
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "credential load failed");
                return PublishResult::failure(target_id, account.provider, "no_access_token");
            }
        };

        let adapter = match self.adapters.get(account.provider) {
            Some(adapter) => adapter,
            None => {
                return PublishResult::failure(
                    target_id,
                    account.provider,
                    format!("no adapter registered for {}", account.provider),
                )
            }
        };

        // Closed semaphore cannot happen here; fall through to the call
        // rather than dropping the target if it somehow does.
        let _permit = semaphore.acquire_owned().await.ok();

        let attempt = adapter.publish(
            &account.provider_account_id,
            &credential.access_token,
            &content,
        );

        match tokio::time::timeout(Duration::from_secs(timeout_secs), attempt).await {
            Ok(Ok(post)) => {
                info!(
                    account_id = %account.id,
                    provider = %account.provider,
                    post_id = %post.post_id,
                    "published"
                );
                PublishResult::success(target_id, account.provider, post.post_id, post.post_url)
            }
            Ok(Err(error)) => {
                warn!(
                    account_id = %account.id,
                    provider = %account.provider,
                    error = %error,
                    "publish failed"
                );
                PublishResult::failure(target_id, account.provider, error.to_string())
            }
            Err(_elapsed) => {
                warn!(
                    account_id = %account.id,
                    provider = %account.provider,
                    timeout_secs,
                    "publish timed out"
                );
                PublishResult::failure(
                    target_id,
                    account.provider,
                    ProviderError::timeout(timeout_secs).to_string(),
                )
            }
        }
    }

    /// Append the audit row for a finished fan-out. An audit failure is
    /// logged and swallowed; it must not fail the publish outcome.
    async fn record_audit(&self, request: &PublishRequest, actor_id: Uuid, outcome: &PublishOutcome) {
        let mut per_provider: HashMap<String, (i64, i64)> = HashMap::new();
        for result in &outcome.results {
            let key = result
                .provider
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let entry = per_provider.entry(key).or_insert((0, 0));
            if result.success {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }

        let provider_counts: HashMap<String, serde_json::Value> = per_provider
            .into_iter()
            .map(|(provider, (succeeded, failed))| {
                (
                    provider,
                    serde_json::json!({ "succeeded": succeeded, "failed": failed }),
                )
            })
            .collect();

        let record = AuditRecord {
            workspace_id: request.workspace_id,
            actor_id,
            total: outcome.summary.total as i64,
            succeeded: outcome.summary.succeeded as i64,
            failed: outcome.summary.failed as i64,
            provider_counts: serde_json::to_string(&provider_counts).unwrap_or_default(),
            created_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self.db.insert_audit_record(&record).await {
            warn!(error = %e, "failed to record publish audit entry");
        }
    }
}

/// SHA-256 hex of an API token, the form stored in `api_tokens`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
