//! Login bridge
//!
//! Accepts an email and password, verifies them with the external provider
//! and records the user locally. A pending authorization request staged in
//! the session is completed right after a successful login.

use crate::auth::server::{AuthorizeParams, authorize_session};
use crate::constants::{MSG_CREDENTIALS_INCORRECT, MSG_LOGGED_IN, MSG_UNEXPECTED};
use crate::http::response::MessageResponse;
use crate::http::session::{SessionId, SessionUser};
use crate::http::{AppState, JsonOrForm};
use crate::model::{User, normalize_username};
use crate::{MyqHomeError, Result, telemetry};
use axum::{
    Extension,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Login form body
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// `POST /login`
pub async fn handle_login(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    form: std::result::Result<JsonOrForm<LoginForm>, Response>,
) -> Response {
    let form = form.map(|JsonOrForm(form)| form).unwrap_or_default();

    let (Some(email), Some(password)) = (
        form.email.filter(|e| !e.is_empty()),
        form.password.filter(|p| !p.is_empty()),
    ) else {
        telemetry::record_login("rejected");
        return MessageResponse::fail(MSG_CREDENTIALS_INCORRECT).into_response();
    };

    match login(&state, &session_id, &email, &password).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Login failed unexpectedly: {}", e);
            telemetry::record_login("error");
            MessageResponse::fail(MSG_UNEXPECTED).into_response()
        }
    }
}

async fn login(
    state: &AppState,
    session_id: &SessionId,
    email: &str,
    password: &str,
) -> Result<Response> {
    let username = normalize_username(email);

    let result = state.provider.login(&username, password).await?;
    telemetry::record_provider_login("login", result.return_code);

    if !result.is_success() {
        telemetry::record_login("failed");
        let message = result
            .error
            .unwrap_or_else(|| MSG_CREDENTIALS_INCORRECT.to_string());
        return Ok(MessageResponse::fail(message).into_response());
    }
    let security_token = result.token.unwrap_or_default();

    let password_hash = hash_password(password, state.config.hashing.salt_rounds).await?;

    let mut pending = None;
    state.sessions.update(&session_id.0, |session| {
        session.user = Some(SessionUser {
            username: username.clone(),
            password_hash: password_hash.clone(),
            security_token: security_token.clone(),
        });
        pending = session.pending_authorization.clone();
    });

    let existing = state.storage.find_user_by_username(&username).await?;
    let user = User::upserted(existing, &username, password_hash, security_token);
    state.storage.upsert_user(&user).await?;

    telemetry::record_login("success");
    tracing::info!(user = %username, "User logged in");

    match pending.filter(|p| p.is_complete()) {
        Some(pending) => {
            Ok(authorize_session(state, session_id, &AuthorizeParams::from(&pending)).await)
        }
        None => Ok(MessageResponse::ok(MSG_LOGGED_IN).into_response()),
    }
}

/// Hash a password with bcrypt on the blocking pool
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| MyqHomeError::Other(anyhow::Error::from(e)))?
        .map_err(|e| MyqHomeError::Other(anyhow::Error::from(e)))
}
