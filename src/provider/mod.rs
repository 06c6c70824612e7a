//! External identity provider
//!
//! The bridge never verifies credentials itself: a login is only ever
//! accepted by the provider. Results are provider shaped JSON objects
//! (`{"returnCode": n, ...}`); ordinary negative outcomes such as bad
//! credentials or an unreachable service are reported through the return
//! code, never as an `Err`.

pub mod myq;

use crate::Result;
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use myq::{MyqClient, MyqSession};

/// Normalized provider return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Success = 0,
    Unexpected = 11,
    ServiceDown = 12,
    NotLoggedIn = 13,
    BadCredentials = 14,
    InvalidParameter = 15,
    OneTryLeft = 16,
    LockedOut = 17,
}

impl ReturnCode {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// User-facing message for the code
    pub fn message(self) -> &'static str {
        match self {
            ReturnCode::Success => "",
            ReturnCode::Unexpected => crate::constants::MSG_UNEXPECTED,
            ReturnCode::ServiceDown => {
                "MyQ service is currently down. Please wait a bit and try again."
            }
            ReturnCode::NotLoggedIn => "User not logged in.",
            ReturnCode::BadCredentials => crate::constants::MSG_CREDENTIALS_INCORRECT,
            ReturnCode::InvalidParameter => "Invalid parameter(s) provided.",
            ReturnCode::OneTryLeft => {
                "User will be locked out due to too many tries. 1 try left."
            }
            ReturnCode::LockedOut => {
                "User is locked out due to too many tries. Please reset password and try again."
            }
        }
    }
}

/// Outcome of a provider login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub return_code: i64,

    /// Opaque security token (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Error message (failure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResult {
    pub fn success(token: impl Into<String>) -> Self {
        Self {
            return_code: ReturnCode::Success.code(),
            token: Some(token.into()),
            error: None,
        }
    }

    pub fn failure(code: ReturnCode) -> Self {
        Self {
            return_code: code.code(),
            token: None,
            error: Some(code.message().to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

/// Result of a device operation: a return code plus operation-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub return_code: i64,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ProviderResult {
    pub fn success() -> Self {
        Self {
            return_code: ReturnCode::Success.code(),
            fields: Map::new(),
        }
    }

    pub fn failure(code: ReturnCode) -> Self {
        Self::success()
            .with("error", code.message())
            .with_code(code)
    }

    /// Attach a field to the result
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    fn with_code(mut self, code: ReturnCode) -> Self {
        self.return_code = code.code();
        self
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

/// Login against the external provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Perform a remote login with the given credentials
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult>;

    /// Open a device session from the security token of a successful login
    fn session(&self, security_token: &str) -> Arc<dyn ProviderSession>;
}

/// Device operations against an established provider session
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// List devices, keeping only the given device type ids
    async fn get_devices(&self, type_ids: &[u32]) -> Result<ProviderResult>;

    async fn get_door_state(&self, id: Option<&str>) -> Result<ProviderResult>;

    async fn set_door_state(&self, id: Option<&str>, state: Option<&str>)
    -> Result<ProviderResult>;

    /// Set a light's state. A missing state is passed through to the provider
    async fn set_light_state(
        &self,
        id: Option<&str>,
        state: Option<&str>,
    ) -> Result<ProviderResult>;
}

/// Create the identity provider named by configuration
pub fn create_provider_from_config(config: &ProviderConfig) -> Result<Arc<dyn IdentityProvider>> {
    match config.driver.as_str() {
        "myq" => Ok(Arc::new(MyqClient::new(config)?)),
        other => Err(crate::MyqHomeError::config(format!(
            "Unknown provider driver: {}. Supported: myq",
            other
        ))),
    }
}
