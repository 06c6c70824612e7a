//! SQLite storage implementation
//!
//! Provides persistent storage for users, OAuth clients, authorization codes
//! and tokens using SQLite.

use crate::model::*;
use crate::storage::Storage;
use crate::{MyqHomeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., "~/.myq-home/myq-home.db" or "sqlite:/tmp/x.db")
    pub async fn new(dsn: &str) -> Result<Self> {
        // Prepend sqlite: prefix if not present and add create-if-missing option
        let connection_string = if dsn.starts_with("sqlite:") {
            if dsn.contains('?') {
                dsn.to_string()
            } else {
                format!("{}?mode=rwc", dsn)
            }
        } else {
            format!("sqlite:{}?mode=rwc", dsn)
        };

        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);

        if file_path.contains("..") {
            return Err(MyqHomeError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        if file_path != ":memory:"
            && let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePool::connect(&connection_string)
            .await
            .map_err(|e| MyqHomeError::storage(format!("Failed to connect to SQLite: {}", e)))?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .map_err(|e| MyqHomeError::storage(format!("Failed to run migrations: {}", e)))?;

        Ok(Self { pool })
    }

    fn parse_user(row: &SqliteRow) -> Result<User> {
        Ok(User {
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            security_token: row.try_get("security_token")?,
            created_at: timestamp(row.try_get("created_at")?),
            updated_at: timestamp(row.try_get("updated_at")?),
        })
    }

    fn parse_client(row: &SqliteRow) -> Result<OAuthClient> {
        let redirect_uris_json: String = row.try_get("redirect_uris")?;
        let grant_types_json: String = row.try_get("grant_types")?;

        Ok(OAuthClient {
            id: row.try_get("id")?,
            secret: row.try_get("secret")?,
            name: row.try_get("name")?,
            redirect_uris: serde_json::from_str(&redirect_uris_json)?,
            grant_types: serde_json::from_str(&grant_types_json)?,
            scope: row.try_get("scope")?,
            created_at: timestamp(row.try_get("created_at")?),
            updated_at: timestamp(row.try_get("updated_at")?),
        })
    }

    fn parse_code(row: &SqliteRow) -> Result<AuthorizationCode> {
        Ok(AuthorizationCode {
            code: row.try_get("code")?,
            client_id: row.try_get("client_id")?,
            user_id: row.try_get("user_id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            expires_at: timestamp(row.try_get("expires_at")?),
        })
    }

    fn parse_token(row: &SqliteRow) -> Result<OAuthToken> {
        let refresh_expires_at: Option<i64> = row.try_get("refresh_expires_at")?;

        Ok(OAuthToken {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            user_id: row.try_get("user_id")?,
            scope: row.try_get("scope")?,
            access: row.try_get("access")?,
            access_expires_at: timestamp(row.try_get("access_expires_at")?),
            refresh: row.try_get("refresh")?,
            refresh_expires_at: refresh_expires_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        })
    }

    async fn find_token_by_field(
        &self,
        field: TokenField,
        value: &str,
    ) -> Result<Option<OAuthToken>> {
        // Use explicit match to prevent SQL injection
        let query = match field {
            TokenField::Access => {
                "SELECT id, client_id, user_id, scope, access, access_expires_at, refresh, refresh_expires_at
                 FROM oauth_tokens WHERE access = ? AND access_expires_at > ?"
            }
            TokenField::Refresh => {
                "SELECT id, client_id, user_id, scope, access, access_expires_at, refresh, refresh_expires_at
                 FROM oauth_tokens WHERE refresh = ? AND refresh_expires_at > ?"
            }
        };

        let row = sqlx::query(query)
            .bind(value)
            .bind(Utc::now().timestamp())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_token).transpose()
    }
}

/// Token column selector
enum TokenField {
    Access,
    Refresh,
}

fn timestamp(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).unwrap_or_else(Utc::now)
}

#[async_trait]
impl Storage for SqliteStorage {
    // User methods
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT username, password_hash, security_token, created_at, updated_at
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_user).transpose()
    }

    async fn find_user_by_credentials(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT username, password_hash, security_token, created_at, updated_at
             FROM users WHERE username = ? AND password_hash = ?",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_user).transpose()
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (username, password_hash, security_token, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                password_hash = excluded.password_hash,
                security_token = excluded.security_token,
                updated_at = excluded.updated_at",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.security_token)
        .bind(user.created_at.timestamp())
        .bind(user.updated_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // OAuth client methods
    async fn save_client(&self, client: &OAuthClient) -> Result<()> {
        let redirect_uris_json = serde_json::to_string(&client.redirect_uris)?;
        let grant_types_json = serde_json::to_string(&client.grant_types)?;

        sqlx::query(
            "INSERT OR REPLACE INTO oauth_clients
             (id, secret, name, redirect_uris, grant_types, scope, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&client.id)
        .bind(&client.secret)
        .bind(&client.name)
        .bind(redirect_uris_json)
        .bind(grant_types_json)
        .bind(&client.scope)
        .bind(client.created_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_client(&self, id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query(
            "SELECT id, secret, name, redirect_uris, grant_types, scope, created_at, updated_at
             FROM oauth_clients
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_client).transpose()
    }

    async fn list_clients(&self) -> Result<Vec<OAuthClient>> {
        let rows = sqlx::query(
            "SELECT id, secret, name, redirect_uris, grant_types, scope, created_at, updated_at
             FROM oauth_clients
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_client).collect()
    }

    // Authorization code methods
    async fn save_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO oauth_codes
             (code, client_id, user_id, redirect_uri, scope, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(code.expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let row = sqlx::query(
            "SELECT code, client_id, user_id, redirect_uri, scope, expires_at
             FROM oauth_codes WHERE code = ? AND expires_at > ?",
        )
        .bind(code)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_code).transpose()
    }

    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        // DELETE ... RETURNING is a single statement, so two concurrent
        // redemptions cannot both observe the row
        let row = sqlx::query(
            "DELETE FROM oauth_codes WHERE code = ?
             RETURNING code, client_id, user_id, redirect_uri, scope, expires_at",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let now = Utc::now();
        Ok(row
            .as_ref()
            .map(Self::parse_code)
            .transpose()?
            .filter(|c| !c.is_expired(now)))
    }

    // Token methods
    async fn save_token(&self, token: &OAuthToken) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO oauth_tokens
             (id, client_id, user_id, scope, access, access_expires_at, refresh, refresh_expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.id)
        .bind(&token.client_id)
        .bind(&token.user_id)
        .bind(&token.scope)
        .bind(&token.access)
        .bind(token.access_expires_at.timestamp())
        .bind(&token.refresh)
        .bind(token.refresh_expires_at.map(|dt| dt.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_token(&self, access: &str) -> Result<Option<OAuthToken>> {
        self.find_token_by_field(TokenField::Access, access).await
    }

    async fn find_refresh_token(&self, refresh: &str) -> Result<Option<OAuthToken>> {
        self.find_token_by_field(TokenField::Refresh, refresh).await
    }

    async fn take_refresh_token(&self, refresh: &str) -> Result<Option<OAuthToken>> {
        let row = sqlx::query(
            "DELETE FROM oauth_tokens WHERE refresh = ?
             RETURNING id, client_id, user_id, scope, access, access_expires_at, refresh, refresh_expires_at",
        )
        .bind(refresh)
        .fetch_optional(&self.pool)
        .await?;

        let now = Utc::now();
        Ok(row
            .as_ref()
            .map(Self::parse_token)
            .transpose()?
            .filter(|t| !t.refresh_expired(now)))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();

        let codes = sqlx::query("DELETE FROM oauth_codes WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        // A refresh token without an expiry never lapses
        let tokens = sqlx::query(
            "DELETE FROM oauth_tokens
             WHERE access_expires_at <= ?
               AND (refresh IS NULL OR (refresh_expires_at IS NOT NULL AND refresh_expires_at <= ?))",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok((codes.rows_affected() + tokens.rows_affected()) as usize)
    }
}
