//! Browser session management
//!
//! Server-side sessions keyed by an opaque cookie. A session carries the
//! user established by the login bridge and any OAuth authorization request
//! staged while the user was logging in.

use crate::constants::SESSION_CLEANUP_INTERVAL_SECS;
use crate::model::PendingAuthorizationRequest;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// User established in a session by a successful provider login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
    /// bcrypt hash of the password, never the plaintext
    pub password_hash: String,
    pub security_token: String,
}

/// Session data stored for each browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID (the cookie value)
    pub id: String,
    /// Session creation time
    pub created_at: DateTime<Utc>,
    /// Session expiration time
    pub expires_at: DateTime<Utc>,
    /// Set once the login bridge accepted the user's credentials
    pub user: Option<SessionUser>,
    /// OAuth request captured by `GET /authorize`
    pub pending_authorization: Option<PendingAuthorizationRequest>,
}

type SessionMap = RwLock<HashMap<String, Session>>;

/// Session store for managing browser sessions
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<SessionMap>,
    cookie_name: String,
    ttl: Duration,
    secure: bool,
}

impl SessionStore {
    /// Create a new session store
    ///
    /// When called inside a tokio runtime, a background task sweeps expired
    /// sessions every five minutes until the store is dropped.
    pub fn new(cookie_name: impl Into<String>, ttl: Duration, secure: bool) -> Self {
        let store = Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cookie_name: cookie_name.into(),
            ttl,
            secure,
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(cleanup_loop(Arc::downgrade(&store.sessions)));
        }

        store
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Create a new, unauthenticated session
    pub fn create_session(&self) -> Session {
        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            created_at: now,
            expires_at: now + self.ttl,
            user: None,
            pending_authorization: None,
        };

        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Get a session by ID
    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read();
        let session = sessions.get(session_id)?;

        if Utc::now() > session.expires_at {
            drop(sessions);
            self.sessions.write().remove(session_id);
            return None;
        }

        Some(session.clone())
    }

    /// Mutate a live session in place. Returns false if it no longer exists
    pub fn update<F>(&self, session_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(session_id) {
            Some(session) if Utc::now() <= session.expires_at => {
                f(session);
                true
            }
            _ => false,
        }
    }

    /// Delete a session
    pub fn delete_session(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.sessions)
    }

    /// Build the `Set-Cookie` value for a session
    pub fn session_cookie(&self, session: &Session) -> String {
        set_session_cookie(&self.cookie_name, &session.id, session.expires_at, self.secure)
    }

    /// Build the `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> String {
        clear_session_cookie(&self.cookie_name, self.secure)
    }
}

fn purge(sessions: &SessionMap) -> usize {
    let now = Utc::now();
    let mut sessions = sessions.write();
    let before = sessions.len();
    sessions.retain(|_, session| now <= session.expires_at);
    before - sessions.len()
}

/// Cleanup expired sessions (runs periodically)
async fn cleanup_loop(sessions: Weak<SessionMap>) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(sessions) = sessions.upgrade() else {
            break;
        };
        let removed = purge(&sessions);
        if removed > 0 {
            tracing::debug!("Removed {} expired sessions", removed);
        }
    }
}

/// Session ID attached to the request by [`session_middleware`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionId(pub String);

/// Ensure every request carries a live session
///
/// A request without a cookie, or whose cookie names a destroyed or expired
/// session, is given a fresh session and a `Set-Cookie` header.
pub async fn session_middleware(
    State(store): State<SessionStore>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = read_cookie(req.headers(), store.cookie_name())
        .filter(|id| store.get_session(id).is_some());

    if let Some(session_id) = existing {
        req.extensions_mut().insert(SessionId(session_id));
        return next.run(req).await;
    }

    let session = store.create_session();
    req.extensions_mut().insert(SessionId(session.id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&store.session_cookie(&session)) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Find a cookie value by name
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Set a session cookie in the response with security flags
///
/// The `secure` parameter controls whether to set the Secure flag (requires HTTPS).
pub fn set_session_cookie(
    name: &str,
    session_id: &str,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!(
        "{}={}; Path=/; Expires={}; HttpOnly;{} SameSite=Lax",
        name,
        session_id,
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
        secure_flag
    )
}

/// Clear the session cookie with security flags
pub fn clear_session_cookie(name: &str, secure: bool) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly;{} SameSite=Lax",
        name, secure_flag
    )
}

/// Generate a secure random session ID (256 bits from the thread RNG)
fn generate_session_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
