//! In-memory storage implementation
//!
//! Fast, non-persistent storage for development and testing.
//! Uses DashMap for concurrent access without a global lock.
//!
//! **WARNING:** MemoryStorage is NOT recommended for production use:
//! - Users, clients and tokens are lost on process restart
//! - Does not coordinate state across multiple process instances
//!
//! For production deployments, use SqliteStorage.

use super::*;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory storage implementation - uses DashMap for concurrent access
#[derive(Clone)]
pub struct MemoryStorage {
    users: Arc<DashMap<String, User>>,
    clients: Arc<DashMap<String, OAuthClient>>,
    codes: Arc<DashMap<String, AuthorizationCode>>,
    tokens: Arc<DashMap<String, OAuthToken>>, // id -> token pair
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            clients: Arc::new(DashMap::new()),
            codes: Arc::new(DashMap::new()),
            tokens: Arc::new(DashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    // User methods
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.get(username).map(|r| r.clone()))
    }

    async fn find_user_by_credentials(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .users
            .get(username)
            .filter(|u| u.password_hash == password_hash)
            .map(|r| r.clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.users.entry(user.username.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(user.clone());
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.password_hash = user.password_hash.clone();
                existing.security_token = user.security_token.clone();
                existing.updated_at = user.updated_at;
            }
        }
        Ok(())
    }

    // OAuth client methods
    async fn save_client(&self, client: &OAuthClient) -> Result<()> {
        self.clients.insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn find_client(&self, id: &str) -> Result<Option<OAuthClient>> {
        Ok(self.clients.get(id).map(|r| r.clone()))
    }

    async fn list_clients(&self) -> Result<Vec<OAuthClient>> {
        let mut clients: Vec<OAuthClient> =
            self.clients.iter().map(|r| r.value().clone()).collect();
        // Sort by ID for consistent output
        clients.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        Ok(clients)
    }

    // Authorization code methods
    async fn save_code(&self, code: &AuthorizationCode) -> Result<()> {
        self.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn find_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let now = Utc::now();
        Ok(self
            .codes
            .get(code)
            .filter(|c| !c.is_expired(now))
            .map(|r| r.clone()))
    }

    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        // DashMap::remove is atomic; an expired code is dropped either way
        let now = Utc::now();
        Ok(self
            .codes
            .remove(code)
            .map(|(_, c)| c)
            .filter(|c| !c.is_expired(now)))
    }

    // Token methods
    async fn save_token(&self, token: &OAuthToken) -> Result<()> {
        self.tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn find_token(&self, access: &str) -> Result<Option<OAuthToken>> {
        let now = Utc::now();
        Ok(self
            .tokens
            .iter()
            .find(|entry| entry.value().access == access)
            .map(|entry| entry.value().clone())
            .filter(|t| !t.access_expired(now)))
    }

    async fn find_refresh_token(&self, refresh: &str) -> Result<Option<OAuthToken>> {
        let now = Utc::now();
        Ok(self
            .tokens
            .iter()
            .find(|entry| entry.value().refresh.as_deref() == Some(refresh))
            .map(|entry| entry.value().clone())
            .filter(|t| !t.refresh_expired(now)))
    }

    async fn take_refresh_token(&self, refresh: &str) -> Result<Option<OAuthToken>> {
        let id = self
            .tokens
            .iter()
            .find(|entry| entry.value().refresh.as_deref() == Some(refresh))
            .map(|entry| entry.key().clone());

        let Some(id) = id else {
            return Ok(None);
        };

        let now = Utc::now();
        Ok(self
            .tokens
            .remove(&id)
            .map(|(_, t)| t)
            .filter(|t| !t.refresh_expired(now)))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.codes.len() + self.tokens.len();
        self.codes.retain(|_, c| !c.is_expired(now));
        self.tokens
            .retain(|_, t| !(t.access_expired(now) && t.refresh_expired(now)));
        Ok(before.saturating_sub(self.codes.len() + self.tokens.len()))
    }
}
