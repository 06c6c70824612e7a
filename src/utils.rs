//! Utility functions and helpers
//!
//! Test scaffolding shared by unit and integration tests: a stub provider
//! and a fully assembled application over in-process collaborators.

use crate::config::{Config, HashingConfig};
use crate::constants::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, MIN_SALT_ROUNDS};
use crate::http::{AppState, build_router};
use crate::model::OAuthClient;
use crate::provider::{
    IdentityProvider, LoginResult, ProviderResult, ProviderSession, ReturnCode,
};
use crate::storage::{MemoryStorage, SqliteStorage, Storage};
use crate::{MyqHomeError, Result};
use async_trait::async_trait;
use axum::Router;
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// A provider call observed by [`StubProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    Login { username: String, secret: String },
    GetDevices,
    GetDoorState { id: Option<String> },
    SetDoorState { id: Option<String>, state: Option<String> },
    SetLightState { id: Option<String>, state: Option<String> },
}

/// In-process identity provider
///
/// Accepts a registered account's plaintext password, or a bcrypt hash of
/// it (the shape the session gate presents by default), or the security
/// token it issued. Every call is recorded.
#[derive(Clone, Default)]
pub struct StubProvider {
    accounts: Arc<RwLock<HashMap<String, String>>>,
    forced_failure: Arc<RwLock<Option<ReturnCode>>>,
    calls: Arc<RwLock<Vec<StubCall>>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account
    pub fn with_account(self, username: &str, password: &str) -> Self {
        self.accounts
            .write()
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Fail every following login with `code`, or stop failing with `None`
    pub fn fail_logins(&self, code: Option<ReturnCode>) {
        *self.forced_failure.write() = code;
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.read().clone()
    }

    pub fn login_calls(&self) -> Vec<StubCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StubCall::Login { .. }))
            .collect()
    }

    /// Device operations observed so far
    pub fn device_calls(&self) -> Vec<StubCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, StubCall::Login { .. }))
            .collect()
    }

    fn record(&self, call: StubCall) {
        self.calls.write().push(call);
    }

    fn token_for(username: &str) -> String {
        format!("stub-token-{}", username)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        self.record(StubCall::Login {
            username: username.to_string(),
            secret: password.to_string(),
        });

        if let Some(code) = *self.forced_failure.read() {
            return Ok(LoginResult::failure(code));
        }

        let Some(expected) = self.accounts.read().get(username).cloned() else {
            return Ok(LoginResult::failure(ReturnCode::BadCredentials));
        };

        let accepted = password == expected
            || password == Self::token_for(username)
            || bcrypt::verify(&expected, password).unwrap_or(false);

        if accepted {
            Ok(LoginResult::success(Self::token_for(username)))
        } else {
            Ok(LoginResult::failure(ReturnCode::BadCredentials))
        }
    }

    fn session(&self, _security_token: &str) -> Arc<dyn ProviderSession> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ProviderSession for StubProvider {
    async fn get_devices(&self, type_ids: &[u32]) -> Result<ProviderResult> {
        self.record(StubCall::GetDevices);
        let devices: Vec<_> = [(1, 2, "Garage"), (2, 3, "Porch light"), (3, 9, "Hub")]
            .into_iter()
            .filter(|(_, type_id, _)| type_ids.contains(type_id))
            .map(|(id, type_id, name)| json!({ "id": id, "typeId": type_id, "name": name }))
            .collect();
        Ok(ProviderResult::success().with("devices", devices))
    }

    async fn get_door_state(&self, id: Option<&str>) -> Result<ProviderResult> {
        self.record(StubCall::GetDoorState {
            id: id.map(String::from),
        });
        match id {
            Some(_) => Ok(ProviderResult::success().with("doorState", 2)),
            None => Ok(ProviderResult::failure(ReturnCode::InvalidParameter)),
        }
    }

    async fn set_door_state(&self, id: Option<&str>, state: Option<&str>) -> Result<ProviderResult> {
        self.record(StubCall::SetDoorState {
            id: id.map(String::from),
            state: state.map(String::from),
        });
        match (id, state) {
            (Some(_), Some(_)) => Ok(ProviderResult::success()),
            _ => Ok(ProviderResult::failure(ReturnCode::InvalidParameter)),
        }
    }

    async fn set_light_state(
        &self,
        id: Option<&str>,
        state: Option<&str>,
    ) -> Result<ProviderResult> {
        self.record(StubCall::SetLightState {
            id: id.map(String::from),
            state: state.map(String::from),
        });
        match (id, state) {
            (Some(_), Some(_)) => Ok(ProviderResult::success()),
            _ => Ok(ProviderResult::failure(ReturnCode::InvalidParameter)),
        }
    }
}

/// Test environment with an assembled router (test builds only)
///
/// Uses the in-memory store by default, the stub provider, the cheapest
/// bcrypt cost, and one registered OAuth client.
///
/// # Example
///
/// ```no_run
/// use myq_home::utils::TestEnvironment;
///
/// # async fn example() {
/// let env = TestEnvironment::new().await.unwrap();
/// let router = env.router();
/// # }
/// ```
pub struct TestEnvironment {
    /// Temporary directory for the SQLite variant, cleaned up on drop
    _temp_dir: Option<TempDir>,

    pub state: AppState,
    pub provider: StubProvider,
    pub client: OAuthClient,
}

impl TestEnvironment {
    pub const CLIENT_ID: &'static str = "test-client";
    pub const CLIENT_SECRET: &'static str = "test-secret";
    pub const REDIRECT_URI: &'static str = "https://assistant.example.com/callback";

    /// Create an environment backed by the memory store
    pub async fn new() -> Result<Self> {
        Self::with_storage(Arc::new(MemoryStorage::new()), None).await
    }

    /// Create an environment backed by SQLite in a temporary directory
    pub async fn with_sqlite() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("myq-home.db");
        let dsn = path
            .to_str()
            .ok_or_else(|| MyqHomeError::config("temporary path is not UTF-8"))?;
        let storage = Arc::new(SqliteStorage::new(dsn).await?);
        Self::with_storage(storage, Some(temp_dir)).await
    }

    async fn with_storage(storage: Arc<dyn Storage>, temp_dir: Option<TempDir>) -> Result<Self> {
        let config = Config {
            hashing: HashingConfig {
                salt_rounds: MIN_SALT_ROUNDS,
            },
            ..Default::default()
        };

        let now = chrono::Utc::now();
        let client = OAuthClient {
            id: Self::CLIENT_ID.to_string(),
            secret: Self::CLIENT_SECRET.to_string(),
            name: "Test assistant".to_string(),
            redirect_uris: vec![Self::REDIRECT_URI.to_string()],
            grant_types: vec![
                GRANT_AUTHORIZATION_CODE.to_string(),
                GRANT_REFRESH_TOKEN.to_string(),
            ],
            scope: String::new(),
            created_at: now,
            updated_at: now,
        };
        storage.save_client(&client).await?;

        let provider = StubProvider::new();
        let state = AppState::new(config, storage, Arc::new(provider.clone()))?;

        Ok(Self {
            _temp_dir: temp_dir,
            state,
            provider,
            client,
        })
    }

    /// Register an account with the stub provider
    pub fn add_account(&self, username: &str, password: &str) {
        self.provider
            .accounts
            .write()
            .insert(username.to_string(), password.to_string());
    }

    /// Build the application router over this environment
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.state.config.http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_accepts_hash_of_password() {
        let provider = StubProvider::new().with_account("a@b.com", "pw");
        let hash = bcrypt::hash("pw", MIN_SALT_ROUNDS).unwrap();

        assert!(provider.login("a@b.com", "pw").await.unwrap().is_success());
        assert!(provider.login("a@b.com", &hash).await.unwrap().is_success());
        assert_eq!(
            provider.login("a@b.com", "wrong").await.unwrap().return_code,
            14
        );
        assert_eq!(provider.login_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_environment_sqlite() {
        let env = TestEnvironment::with_sqlite().await.unwrap();
        let client = env
            .state
            .storage
            .find_client(TestEnvironment::CLIENT_ID)
            .await
            .unwrap();
        assert!(client.is_some());
    }
}
