//! Account connection flows
//!
//! Turns a user's intent to connect a platform into a `ConnectedAccount`
//! plus `Credential`, via either the three-leg authorization-code flow or a
//! provider's direct-credential login. Identity normalization and token
//! exchange are delegated to the matching provider adapter; persistence is a
//! single transactional upsert so an account is never left behind without
//! its credential.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{Database, NewAccount, NewCredential};
use crate::error::{CrosscastError, OAuthError, Result};
use crate::providers::AdapterRegistry;
use crate::registry::{provider_config, ProviderKind};
use crate::state::OAuthState;
use crate::types::ConnectedAccount;

/// An initiated OAuth connection.
///
/// The PKCE verifier, when present, must be held server-side and supplied
/// back on the callback leg.
#[derive(Debug, Clone)]
pub struct ConnectFlow {
    pub authorization_url: String,
    pub pkce_verifier: Option<String>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    db: Arc<Database>,
    config: Arc<Config>,
    adapters: Arc<AdapterRegistry>,
}

impl ConnectionManager {
    pub fn new(db: Arc<Database>, config: Arc<Config>, adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            db,
            config,
            adapters,
        }
    }

    /// Start the three-leg flow: build the provider's authorization URL with
    /// a signed state embedded.
    ///
    /// # Errors
    ///
    /// `ProviderNotConfigured` when the provider's client credentials are
    /// absent from this environment; `Validation` for providers that do not
    /// use an authorization redirect.
    pub fn initiate_connection(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        provider: ProviderKind,
        return_path: String,
    ) -> Result<ConnectFlow> {
        if !provider_config(provider).uses_oauth {
            return Err(CrosscastError::Validation(format!(
                "{} uses direct-credential login, not an authorization redirect",
                provider
            )));
        }

        let app = self
            .config
            .app_credentials(provider)
            .ok_or_else(|| CrosscastError::ProviderNotConfigured(provider.to_string()))?;

        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| CrosscastError::ProviderNotConfigured(provider.to_string()))?;

        let state = OAuthState::new(user_id, workspace_id, provider, return_path)
            .encode(self.config.security.state_secret.as_bytes());

        let request = adapter.authorization_url(&app, &state)?;

        info!(%provider, %workspace_id, "initiated connection flow");

        Ok(ConnectFlow {
            authorization_url: request.url,
            pkce_verifier: request.pkce_verifier,
        })
    }

    /// Finish the three-leg flow on callback: verify state, exchange the
    /// code, normalize identity and persist account + credential together.
    pub async fn complete_connection(
        &self,
        provider: ProviderKind,
        code: &str,
        state: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<ConnectedAccount> {
        let state = OAuthState::decode(state, self.config.security.state_secret.as_bytes())?;
        if state.provider != provider {
            return Err(OAuthError::InvalidState.into());
        }

        let app = self
            .config
            .app_credentials(provider)
            .ok_or_else(|| CrosscastError::ProviderNotConfigured(provider.to_string()))?;

        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| CrosscastError::ProviderNotConfigured(provider.to_string()))?;

        let grant = adapter.exchange_code(&app, code, pkce_verifier).await?;

        let identity = adapter
            .fetch_identity(&grant.access_token)
            .await
            .map_err(|e| OAuthError::IdentityFetch(e.to_string()))?;

        let expires_at = grant
            .expires_in
            .map(|ttl| chrono::Utc::now().timestamp() + ttl);

        let autopublish_capable = autopublish_capable(provider, &identity.account_type);

        let account = self
            .db
            .upsert_account_with_credential(
                NewAccount {
                    workspace_id: state.workspace_id,
                    provider,
                    identity: &identity,
                    autopublish_capable,
                },
                NewCredential {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token,
                    expires_at,
                    scope: grant.scope.unwrap_or_default(),
                },
            )
            .await?;

        info!(
            %provider,
            workspace_id = %state.workspace_id,
            account_id = %account.id,
            "connected account"
        );

        Ok(account)
    }

    /// Direct-credential login for providers without OAuth.
    ///
    /// A provider-side rejection of the credentials surfaces as
    /// `Authentication("invalid_credentials")`; transport failures keep
    /// their provider error.
    pub async fn authenticate_direct(
        &self,
        identifier: &str,
        app_password: &str,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<ConnectedAccount> {
        let provider = ProviderKind::Bluesky;

        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| CrosscastError::ProviderNotConfigured(provider.to_string()))?;

        let (grant, identity) =
            adapter
                .login(identifier, app_password)
                .await
                .map_err(|e| match e.code.as_deref() {
                    Some("AuthenticationRequired" | "InvalidLogin" | "invalid_credentials") => {
                        CrosscastError::Authentication("invalid_credentials".to_string())
                    }
                    _ => CrosscastError::Provider(e),
                })?;

        let expires_at = grant
            .expires_in
            .map(|ttl| chrono::Utc::now().timestamp() + ttl);

        let account = self
            .db
            .upsert_account_with_credential(
                NewAccount {
                    workspace_id,
                    provider,
                    identity: &identity,
                    autopublish_capable: true,
                },
                NewCredential {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token,
                    expires_at,
                    scope: grant.scope.unwrap_or_default(),
                },
            )
            .await?;

        info!(
            %provider,
            %workspace_id,
            %user_id,
            account_id = %account.id,
            "connected account via direct login"
        );

        Ok(account)
    }

    /// Remove an account and its credential.
    ///
    /// Idempotent: disconnecting an account that is already gone succeeds.
    pub async fn disconnect(&self, account_id: Uuid, workspace_id: Uuid) -> Result<()> {
        let existed = self.db.delete_account(account_id, workspace_id).await?;
        if !existed {
            warn!(%account_id, "disconnect for unknown account (already removed?)");
        }
        Ok(())
    }

    /// Token-expiry sweep: move `connected` accounts with expired
    /// credentials to `needs_refresh`. Returns how many were flipped.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let flipped = self
            .db
            .mark_stale_credentials(chrono::Utc::now().timestamp())
            .await?;
        if flipped > 0 {
            info!(flipped, "marked accounts as needing refresh");
        }
        Ok(flipped)
    }
}

/// Whether a provider can publish to this account class unattended.
///
/// Instagram personal accounts cannot receive API publishes; everything else
/// can.
fn autopublish_capable(provider: ProviderKind, account_type: &str) -> bool {
    !(provider == ProviderKind::Instagram && account_type == "personal")
}

/// Build the browser redirect for a finished callback:
/// `?connected=<provider>` on success, `?error=<reason>` on failure.
pub fn callback_redirect(
    return_path: &str,
    outcome: std::result::Result<&ConnectedAccount, &CrosscastError>,
) -> String {
    let separator = if return_path.contains('?') { '&' } else { '?' };
    match outcome {
        Ok(account) => format!(
            "{}{}connected={}",
            return_path, separator, account.provider
        ),
        Err(e) => format!(
            "{}{}error={}",
            return_path,
            separator,
            urlencoding::encode(&e.to_string())
        ),
    }
}
