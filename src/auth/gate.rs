//! External session gate
//!
//! Every protected request logs in to the provider again with the stored
//! credentials of the token's user. Provider sessions are never cached.

use crate::auth::middleware::AuthenticatedUser;
use crate::config::GateCredential;
use crate::error::OAuthError;
use crate::http::{AppError, AppState};
use crate::provider::ProviderSession;
use crate::telemetry;
use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Provider session opened for the current request
#[derive(Clone)]
pub struct ProviderSessionHandle(pub Arc<dyn ProviderSession>);

/// Open a provider session for the bearer-authenticated user
///
/// A non-zero provider result is returned to the caller as the whole
/// response and the route handler is never run.
pub async fn session_gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(authenticated) = req.extensions().get::<AuthenticatedUser>().cloned() else {
        return OAuthError::UnauthorizedRequest("authentication is required".to_string())
            .into_response();
    };
    let user = authenticated.user;

    let secret = match state.config.provider.gate_credential {
        GateCredential::PasswordHash => &user.password_hash,
        GateCredential::SecurityToken => &user.security_token,
    };

    let result = match state.provider.login(&user.username, secret).await {
        Ok(result) => result,
        Err(e) => return AppError::from(e).into_response(),
    };
    telemetry::record_provider_login("gate", result.return_code);

    if !result.is_success() {
        tracing::info!(
            user = %user.username,
            return_code = result.return_code,
            "Provider rejected gate login"
        );
        return Json(result).into_response();
    }

    let security_token = result.token.unwrap_or_default();
    req.extensions_mut()
        .insert(ProviderSessionHandle(state.provider.session(&security_token)));
    next.run(req).await
}
