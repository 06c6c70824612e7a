//! Configuration management for MyQ Home
//!
//! Loads and manages configuration from myq-home.config.json (or YAML).
//! Any string value of the form `$env:NAME` is replaced by the environment
//! variable `NAME` before the file is interpreted.

use crate::constants::*;
use crate::{MyqHomeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Complete MyQ Home configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Credential store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// OAuth grant lifetimes and policy
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Password hashing
    #[serde(default)]
    pub hashing: HashingConfig,

    /// MyQ provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Browser session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite, memory)
    pub driver: String,

    /// Data source name / database path
    #[serde(default)]
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            dsn: default_sqlite_dsn().to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mark the session cookie `Secure` (requires HTTPS). Default: false for local development
    #[serde(default)]
    pub secure: bool,

    /// Allowed CORS origins. If not specified, any origin may call the API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            allowed_origins: None,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

/// OAuth authorization server configuration (lifetimes in seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    #[serde(default = "default_code_lifetime")]
    pub authorization_code_lifetime: i64,

    #[serde(default = "default_access_lifetime")]
    pub access_token_lifetime: i64,

    #[serde(default = "default_refresh_lifetime")]
    pub refresh_token_lifetime: i64,

    /// Accept authorization requests without a `state` parameter
    #[serde(default)]
    pub allow_empty_state: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: default_code_lifetime(),
            access_token_lifetime: default_access_lifetime(),
            refresh_token_lifetime: default_refresh_lifetime(),
            allow_empty_state: false,
        }
    }
}

fn default_code_lifetime() -> i64 {
    DEFAULT_AUTHORIZATION_CODE_LIFETIME_SECS
}

fn default_access_lifetime() -> i64 {
    DEFAULT_ACCESS_TOKEN_LIFETIME_SECS
}

fn default_refresh_lifetime() -> i64 {
    DEFAULT_REFRESH_TOKEN_LIFETIME_SECS
}

/// Password hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashingConfig {
    /// bcrypt cost factor
    #[serde(default = "default_salt_rounds")]
    pub salt_rounds: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            salt_rounds: default_salt_rounds(),
        }
    }
}

fn default_salt_rounds() -> u32 {
    DEFAULT_SALT_ROUNDS
}

/// Which stored credential the session gate presents to the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GateCredential {
    /// The bcrypt hash kept in the user record
    #[default]
    PasswordHash,
    /// The security token returned by the last provider login
    SecurityToken,
}

/// External identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider driver (myq)
    #[serde(default = "default_provider_driver")]
    pub driver: String,

    /// Base URL of the provider API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Application id header value
    #[serde(default = "default_application_id")]
    pub application_id: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub gate_credential: GateCredential,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            driver: default_provider_driver(),
            base_url: default_base_url(),
            application_id: default_application_id(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            gate_credential: GateCredential::default(),
        }
    }
}

fn default_provider_driver() -> String {
    "myq".to_string()
}

fn default_base_url() -> String {
    DEFAULT_MYQ_BASE_URL.to_string()
}

fn default_application_id() -> String {
    DEFAULT_MYQ_APPLICATION_ID.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_MYQ_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Browser session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

fn default_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_ttl_minutes() -> i64 {
    DEFAULT_SESSION_TTL_MINUTES
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl Config {
    /// Load configuration from the default file in the working directory
    pub fn load() -> Result<Self> {
        Self::load_from_path(CONFIG_FILE_NAME)
    }

    /// Load configuration from specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // Return default config if file doesn't exist
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;

        let mut raw: Value = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                MyqHomeError::config(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                MyqHomeError::config(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        inject_env_vars(&mut raw);

        let config: Config = serde_json::from_value(raw)
            .map_err(|e| MyqHomeError::config(format!("Invalid config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Configured log level, if any
    pub fn log_level(&self) -> Option<&str> {
        self.log.as_ref().and_then(|l| l.level.as_deref())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.storage.driver.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.storage.dsn.is_empty() {
                    return Err(MyqHomeError::config(
                        "storage.dsn is required for the sqlite driver",
                    ));
                }
            }
            other => {
                return Err(MyqHomeError::config(format!(
                    "Unsupported storage driver: '{}'. Supported: sqlite, memory",
                    other
                )));
            }
        }

        // Validate port is not zero (upper bound is enforced by u16 type)
        if self.http.port == 0 {
            return Err(MyqHomeError::config("http.port must be nonzero (1-65535)"));
        }

        if self.http.host.is_empty() {
            return Err(MyqHomeError::config("http.host cannot be empty"));
        }

        if let Some(ref origins) = self.http.allowed_origins {
            for origin in origins {
                if !origin.starts_with("http://") && !origin.starts_with("https://") {
                    return Err(MyqHomeError::config(format!(
                        "Invalid CORS origin '{}': must start with http:// or https://",
                        origin
                    )));
                }
            }
        }

        let lifetimes = [
            ("oauth.authorizationCodeLifetime", self.oauth.authorization_code_lifetime),
            ("oauth.accessTokenLifetime", self.oauth.access_token_lifetime),
            ("oauth.refreshTokenLifetime", self.oauth.refresh_token_lifetime),
        ];
        for (name, secs) in lifetimes {
            if secs <= 0 {
                return Err(MyqHomeError::config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if !(MIN_SALT_ROUNDS..=MAX_SALT_ROUNDS).contains(&self.hashing.salt_rounds) {
            return Err(MyqHomeError::config(format!(
                "hashing.saltRounds must be between {} and {}",
                MIN_SALT_ROUNDS, MAX_SALT_ROUNDS
            )));
        }

        if self.provider.driver != "myq" {
            return Err(MyqHomeError::config(format!(
                "Unsupported provider driver: '{}'. Supported: myq",
                self.provider.driver
            )));
        }

        url::Url::parse(&self.provider.base_url).map_err(|e| {
            MyqHomeError::config(format!(
                "Invalid provider.baseUrl '{}': {}",
                self.provider.base_url, e
            ))
        })?;

        if self.provider.timeout_secs == 0 {
            return Err(MyqHomeError::config(
                "provider.timeoutSecs must be greater than 0",
            ));
        }

        if self.session.cookie_name.is_empty() {
            return Err(MyqHomeError::config("session.cookieName cannot be empty"));
        }

        if self.session.ttl_minutes <= 0 {
            return Err(MyqHomeError::config(
                "session.ttlMinutes must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Expand a `$env:NAME` value from the environment (empty when unset)
pub fn expand_env_value(value: &str) -> String {
    match value.strip_prefix(ENV_VALUE_PREFIX) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Replace every `$env:NAME` string in a raw config document
pub fn inject_env_vars(value: &mut Value) {
    match value {
        Value::String(s) if s.starts_with(ENV_VALUE_PREFIX) => {
            *s = expand_env_value(s);
        }
        Value::Array(items) => items.iter_mut().for_each(inject_env_vars),
        Value::Object(map) => map.values_mut().for_each(inject_env_vars),
        _ => {}
    }
}
