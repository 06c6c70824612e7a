//! Constants used throughout MyQ Home
//!
//! Configuration paths, HTTP defaults, user-facing messages and the
//! device-type filter applied to device listings.

use once_cell::sync::Lazy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Get the home directory with fallback to current directory
pub fn get_home_dir() -> &'static str {
    static HOME_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string())
    });
    &HOME_DIR
}

/// Default config directory (~/.myq-home)
pub fn default_config_dir() -> &'static str {
    static CONFIG_DIR: Lazy<String> = Lazy::new(|| format!("{}/.myq-home", get_home_dir()));
    &CONFIG_DIR
}

/// Default SQLite DSN (~/.myq-home/myq-home.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> =
        Lazy::new(|| format!("{}/myq-home.db", default_config_dir()));
    &SQLITE_DSN
}

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "myq-home.config.json";

/// Prefix marking a config value to be read from the environment
pub const ENV_VALUE_PREFIX: &str = "$env:";

// ============================================================================
// HTTP
// ============================================================================

/// Name shown on rendered pages
pub const APP_NAME: &str = "MyQ Home";

/// Default HTTP host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default session cookie name
pub const DEFAULT_SESSION_COOKIE: &str = "myq_home_session";

/// Default session lifetime in minutes
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 24 * 60;

/// Interval between expired-session sweeps, in seconds
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Realm advertised in `WWW-Authenticate` challenges
pub const BEARER_REALM: &str = "Service";

// ============================================================================
// OAUTH
// ============================================================================

/// Authorization code lifetime (5 minutes)
pub const DEFAULT_AUTHORIZATION_CODE_LIFETIME_SECS: i64 = 300;

/// Access token lifetime (1 hour)
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Refresh token lifetime (2 weeks)
pub const DEFAULT_REFRESH_TOKEN_LIFETIME_SECS: i64 = 14 * 24 * 3600;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const RESPONSE_TYPE_CODE: &str = "code";
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Largest form body read when looking for an `access_token` field
pub const MAX_TOKEN_FORM_BYTES: usize = 64 * 1024;

/// Interval between sweeps of expired codes and tokens, in seconds
pub const GRANT_CLEANUP_INTERVAL_SECS: u64 = 600;

// ============================================================================
// PASSWORD HASHING
// ============================================================================

/// Default bcrypt cost
pub const DEFAULT_SALT_ROUNDS: u32 = 10;

/// bcrypt accepts costs in 4..=31
pub const MIN_SALT_ROUNDS: u32 = 4;
pub const MAX_SALT_ROUNDS: u32 = 31;

// ============================================================================
// USER-FACING MESSAGES
// ============================================================================

pub const MSG_CREDENTIALS_INCORRECT: &str = "Email and/or password are incorrect.";
pub const MSG_LOGGED_IN: &str = "Logged in!";
pub const MSG_LOGGED_IN_REDIRECTING: &str =
    "Logged in! Redirecting you to the confirmation page.";
pub const MSG_UNEXPECTED: &str =
    "Something unexpected happened. Please wait a bit and try again.";

// ============================================================================
// DEVICES
// ============================================================================

/// Device types returned by `GET /devices`: garage door openers, light
/// controllers, gates, virtual GDOs and battery-backed openers.
pub const DEVICE_TYPE_IDS: [u32; 5] = [2, 3, 5, 7, 17];

// ============================================================================
// MYQ PROVIDER
// ============================================================================

/// Base URL of the MyQ external API
pub const DEFAULT_MYQ_BASE_URL: &str = "https://myqexternal.myqdevice.com";

/// Public application id used by MyQ mobile clients
pub const DEFAULT_MYQ_APPLICATION_ID: &str =
    "NWknvuBd7LoFHfXmKNMBcgajXtZEgKUh4V7WNzMidrpUUluDpVYVZx+xT4PCM5Kx";

/// Default user agent sent to MyQ
pub const DEFAULT_MYQ_USER_AGENT: &str = "Chamberlain/3773 (iPhone; iOS 11.0.3; Scale/2.00)";

pub const MYQ_APPLICATION_ID_HEADER: &str = "MyQApplicationId";
pub const MYQ_SECURITY_TOKEN_HEADER: &str = "SecurityToken";
