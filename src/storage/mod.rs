//! Storage backends for MyQ Home
//!
//! Provides the credential store (users, OAuth clients, codes and tokens)
//! with a unified trait interface and two backends.
//!
//! Lookups never error on absence: a missing or expired artifact is `None`.

pub mod memory;
pub mod sqlite;

use crate::constants::GRANT_CLEANUP_INTERVAL_SECS;
use crate::{Result, model::*};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// Storage trait for users and OAuth grant artifacts
#[async_trait]
pub trait Storage: Send + Sync {
    // User methods
    /// Find a user by normalized username
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Find a user whose username and stored password hash both match exactly
    async fn find_user_by_credentials(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>>;

    /// Create the user, or overwrite its password hash and security token
    async fn upsert_user(&self, user: &User) -> Result<()>;

    // OAuth client methods
    /// Save OAuth client
    async fn save_client(&self, client: &OAuthClient) -> Result<()>;

    /// Get OAuth client by ID
    async fn find_client(&self, id: &str) -> Result<Option<OAuthClient>>;

    /// List all OAuth clients
    async fn list_clients(&self) -> Result<Vec<OAuthClient>>;

    // Authorization code methods
    /// Save an authorization code
    async fn save_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Get an unexpired authorization code
    async fn find_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Atomically fetch and delete an unexpired authorization code
    /// Returns None if not found, preventing double redemption
    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    // Token methods
    /// Save an access/refresh token pair
    async fn save_token(&self, token: &OAuthToken) -> Result<()>;

    /// Get a token pair by unexpired access token
    async fn find_token(&self, access: &str) -> Result<Option<OAuthToken>>;

    /// Get a token pair by unexpired refresh token
    async fn find_refresh_token(&self, refresh: &str) -> Result<Option<OAuthToken>>;

    /// Atomically fetch and delete a token pair by unexpired refresh token
    async fn take_refresh_token(&self, refresh: &str) -> Result<Option<OAuthToken>>;

    /// Delete expired codes and token pairs whose access and refresh tokens
    /// have both lapsed. Returns the number of rows removed.
    async fn purge_expired(&self) -> Result<usize>;
}

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Create a storage backend from configuration
pub async fn create_storage_from_config(
    config: &crate::config::StorageConfig,
) -> crate::Result<Arc<dyn Storage>> {
    match config.driver.as_str() {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "sqlite" => Ok(Arc::new(SqliteStorage::new(&config.dsn).await?)),
        _ => Err(crate::MyqHomeError::config(format!(
            "Unknown storage driver: {}. Supported: memory, sqlite",
            config.driver
        ))),
    }
}

/// Periodically purge expired grant artifacts
///
/// The task holds a weak reference and stops once the store is dropped.
pub fn spawn_purge_task(storage: &Arc<dyn Storage>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(purge_loop(Arc::downgrade(storage)))
}

async fn purge_loop(storage: Weak<dyn Storage>) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(GRANT_CLEANUP_INTERVAL_SECS));
    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(storage) = storage.upgrade() else {
            break;
        };
        match storage.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!("Removed {} expired codes and tokens", removed),
            Err(e) => tracing::warn!("Failed to purge expired codes and tokens: {}", e),
        }
    }
}

#[cfg(test)]
mod memory_test;
#[cfg(test)]
mod sqlite_test;
