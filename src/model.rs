//! Core data structures for MyQ Home
//!
//! Users, OAuth clients and grant artifacts, and the authorization request
//! staged in a session while the user logs in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local record of a MyQ account that completed an external login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Normalized email (whitespace stripped, lowercased)
    pub username: String,

    /// bcrypt hash of the last password accepted by MyQ
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Opaque security token returned by the last MyQ login
    #[serde(skip_serializing)]
    pub security_token: String,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a fresh user record, or refresh an existing one with new credentials
    pub fn upserted(
        existing: Option<User>,
        username: &str,
        password_hash: String,
        security_token: String,
    ) -> Self {
        let now = Utc::now();
        match existing {
            Some(mut user) => {
                user.password_hash = password_hash;
                user.security_token = security_token;
                user.updated_at = now;
                user
            }
            None => User {
                username: username.to_string(),
                password_hash,
                security_token,
                created_at: now,
                updated_at: now,
            },
        }
    }
}

/// Normalize a submitted email into the canonical username:
/// every whitespace character removed, then lowercased.
pub fn normalize_username(email: &str) -> String {
    email
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique identifier
    pub id: String,

    /// Client secret
    pub secret: String,

    /// Client name
    pub name: String,

    /// Allowed redirect URIs
    pub redirect_uris: Vec<String>,

    /// Supported grant types
    pub grant_types: Vec<String>,

    /// Space separated scopes the client may request (empty allows any)
    pub scope: String,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl OAuthClient {
    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    /// Whether every requested scope is registered for this client
    pub fn allows_scope(&self, requested: &str) -> bool {
        if self.scope.trim().is_empty() {
            return true;
        }
        let registered: Vec<&str> = self.scope.split_whitespace().collect();
        requested
            .split_whitespace()
            .all(|s| registered.contains(&s))
    }
}

/// Authorization code issued by the authorize step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    /// Username of the user the code was issued to
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Access/refresh token pair issued by the token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Unique identifier
    pub id: String,

    /// Client ID
    pub client_id: String,

    /// Username of the bound user
    pub user_id: String,

    /// OAuth scope
    pub scope: String,

    /// Access token
    pub access: String,

    /// Access token expiry
    pub access_expires_at: DateTime<Utc>,

    /// Refresh token
    pub refresh: Option<String>,

    /// Refresh token expiry
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn access_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expires_at
    }

    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        match self.refresh_expires_at {
            Some(expires_at) => now >= expires_at,
            None => self.refresh.is_none(),
        }
    }

    /// Seconds until the access token expires (never negative)
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.access_expires_at - now).num_seconds().max(0)
    }
}

/// OAuth query captured by `GET /authorize` before the user has logged in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAuthorizationRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
}

impl PendingAuthorizationRequest {
    /// Stage only a complete request; any missing or empty field discards it
    pub fn from_parts(
        response_type: Option<&str>,
        client_id: Option<&str>,
        redirect_uri: Option<&str>,
        scope: Option<&str>,
        state: Option<&str>,
    ) -> Option<Self> {
        let field = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        Some(Self {
            response_type: field(response_type)?,
            client_id: field(client_id)?,
            redirect_uri: field(redirect_uri)?,
            scope: field(scope)?,
            state: field(state)?,
        })
    }

    pub fn is_complete(&self) -> bool {
        !(self.response_type.is_empty()
            || self.client_id.is_empty()
            || self.redirect_uri.is_empty()
            || self.scope.is_empty()
            || self.state.is_empty())
    }
}
