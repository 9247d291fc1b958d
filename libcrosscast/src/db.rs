//! Database operations for Crosscast

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::ProviderKind;
use crate::types::{AccountStatus, ConnectedAccount, Credential, ProviderIdentity, WorkspaceRole};

/// Account fields gathered during a connect flow, before a row exists.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub workspace_id: Uuid,
    pub provider: ProviderKind,
    pub identity: &'a ProviderIdentity,
    pub autopublish_capable: bool,
}

/// Token fields to persist alongside an account upsert.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scope: String,
}

/// One appended fan-out audit row.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub workspace_id: Uuid,
    pub actor_id: Uuid,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// JSON object of per-provider `{succeeded, failed}` counts.
    pub provider_counts: String,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
        }

        // Forward slashes work for SQLite URLs on both Windows and Unix;
        // mode=rwc creates the file on first use.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        // sqlx's sqlite options enforce foreign keys by default, which the
        // credential cascade relies on.
        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Upsert a connected account and persist its credential in one
    /// transaction.
    ///
    /// Keyed on (workspace, provider, provider account id): reconnecting the
    /// same external account updates the existing row instead of duplicating
    /// it. Account and credential commit together or not at all, so a
    /// credential-write failure cannot leave a half-connected account behind.
    pub async fn upsert_account_with_credential(
        &self,
        account: NewAccount<'_>,
        credential: NewCredential,
    ) -> Result<ConnectedAccount> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        let existing: Option<Uuid> = sqlx::query(
            r#"
            SELECT id FROM connected_accounts
            WHERE workspace_id = ? AND provider = ? AND provider_account_id = ?
            "#,
        )
        .bind(account.workspace_id)
        .bind(account.provider)
        .bind(&account.identity.provider_account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(crate::error::DbError::SqlxError)?
        .map(|r| r.get("id"));

        let id = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE connected_accounts
                    SET display_name = ?, handle = ?, avatar_url = ?, account_type = ?,
                        autopublish_capable = ?, status = ?, last_connected_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&account.identity.display_name)
                .bind(&account.identity.handle)
                .bind(&account.identity.avatar_url)
                .bind(&account.identity.account_type)
                .bind(account.autopublish_capable)
                .bind(AccountStatus::Connected)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(crate::error::DbError::SqlxError)?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO connected_accounts
                        (id, workspace_id, provider, provider_account_id, display_name,
                         handle, avatar_url, account_type, autopublish_capable, status,
                         last_connected_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(id)
                .bind(account.workspace_id)
                .bind(account.provider)
                .bind(&account.identity.provider_account_id)
                .bind(&account.identity.display_name)
                .bind(&account.identity.handle)
                .bind(&account.identity.avatar_url)
                .bind(&account.identity.account_type)
                .bind(account.autopublish_capable)
                .bind(AccountStatus::Connected)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(crate::error::DbError::SqlxError)?;
                id
            }
        };

        sqlx::query(
            r#"
            INSERT INTO credentials (account_id, access_token, refresh_token, expires_at, scope, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (account_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.scope)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        tx.commit().await.map_err(crate::error::DbError::SqlxError)?;

        Ok(ConnectedAccount {
            id,
            workspace_id: account.workspace_id,
            provider: account.provider,
            provider_account_id: account.identity.provider_account_id.clone(),
            display_name: account.identity.display_name.clone(),
            handle: account.identity.handle.clone(),
            avatar_url: account.identity.avatar_url.clone(),
            account_type: account.identity.account_type.clone(),
            autopublish_capable: account.autopublish_capable,
            status: AccountStatus::Connected,
            last_connected_at: now,
        })
    }

    /// Fetch one account scoped to its workspace.
    pub async fn get_account(
        &self,
        account_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<ConnectedAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, workspace_id, provider, provider_account_id, display_name,
                   handle, avatar_url, account_type, autopublish_capable, status,
                   last_connected_at
            FROM connected_accounts
            WHERE id = ? AND workspace_id = ?
            "#,
        )
        .bind(account_id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(account_from_row))
    }

    /// All accounts in a workspace, most recently connected first.
    pub async fn list_accounts(&self, workspace_id: Uuid) -> Result<Vec<ConnectedAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workspace_id, provider, provider_account_id, display_name,
                   handle, avatar_url, account_type, autopublish_capable, status,
                   last_connected_at
            FROM connected_accounts
            WHERE workspace_id = ?
            ORDER BY last_connected_at DESC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(account_from_row).collect())
    }

    /// Fetch the requested accounts restricted to this workspace, any
    /// status. Ids that do not exist in the workspace are simply absent
    /// from the result.
    pub async fn get_accounts_by_ids(
        &self,
        workspace_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<ConnectedAccount>> {
        if account_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; account_ids.len()].join(", ");
        let query_str = format!(
            r#"
            SELECT id, workspace_id, provider, provider_account_id, display_name,
                   handle, avatar_url, account_type, autopublish_capable, status,
                   last_connected_at
            FROM connected_accounts
            WHERE workspace_id = ? AND id IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&query_str).bind(workspace_id);
        for id in account_ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(account_from_row).collect())
    }

    /// Read the token record owned by an account.
    pub async fn get_credential(&self, account_id: Uuid) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, access_token, refresh_token, expires_at, scope
            FROM credentials
            WHERE account_id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| Credential {
            account_id: r.get("account_id"),
            access_token: r.get("access_token"),
            refresh_token: r.get("refresh_token"),
            expires_at: r.get("expires_at"),
            scope: r.get("scope"),
        }))
    }

    /// Delete an account (credential goes with it via cascade).
    ///
    /// Returns whether a row existed; deleting an already-deleted account is
    /// not an error.
    pub async fn delete_account(&self, account_id: Uuid, workspace_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM connected_accounts WHERE id = ? AND workspace_id = ?
            "#,
        )
        .bind(account_id)
        .bind(workspace_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_account_status(&self, account_id: Uuid, status: AccountStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE connected_accounts SET status = ? WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Token-expiry sweep: flip `connected` accounts whose credential has
    /// expired to `needs_refresh`. Returns the number of accounts flipped.
    pub async fn mark_stale_credentials(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE connected_accounts
            SET status = 'needs_refresh'
            WHERE status = 'connected'
              AND id IN (
                  SELECT account_id FROM credentials
                  WHERE expires_at IS NOT NULL AND expires_at <= ?
              )
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Resolve a caller from an API token hash.
    pub async fn find_user_by_token_hash(&self, token_hash: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            SELECT user_id FROM api_tokens WHERE token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| r.get("user_id")))
    }

    pub async fn insert_api_token(&self, token_hash: &str, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_workspace_role(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceRole>> {
        let row = sqlx::query(
            r#"
            SELECT role FROM workspace_members WHERE workspace_id = ? AND user_id = ?
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| r.get("role")))
    }

    pub async fn upsert_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workspace_members (workspace_id, user_id, role)
            VALUES (?, ?, ?)
            ON CONFLICT (workspace_id, user_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Append one audit row. Append-only; nothing ever updates these.
    pub async fn insert_audit_record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publish_audit
                (workspace_id, actor_id, total, succeeded, failed, provider_counts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.workspace_id)
        .bind(record.actor_id)
        .bind(record.total)
        .bind(record.succeeded)
        .bind(record.failed)
        .bind(&record.provider_counts)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }
}

fn account_from_row(row: sqlx::sqlite::SqliteRow) -> ConnectedAccount {
    ConnectedAccount {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        provider: row.get("provider"),
        provider_account_id: row.get("provider_account_id"),
        display_name: row.get("display_name"),
        handle: row.get("handle"),
        avatar_url: row.get("avatar_url"),
        account_type: row.get("account_type"),
        autopublish_capable: row.get("autopublish_capable"),
        status: row.get("status"),
        last_connected_at: row.get("last_connected_at"),
    }
}
