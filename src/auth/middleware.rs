//! Bearer token middleware
//!
//! Resolves the access token of protected requests (the `Authorization:
//! Bearer` header, or an `access_token` form field) to a token pair and its
//! user, and exposes them through the
//! [`AuthenticatedUser`] extractor.

use crate::constants::MAX_TOKEN_FORM_BYTES;
use crate::error::OAuthError;
use crate::http::AppState;
use crate::model::{OAuthToken, User};
use axum::{
    body::{Body, Bytes, to_bytes},
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Authenticated user extracted from valid Bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub token: OAuthToken,
    pub user: User,
}

/// Extractor for the user placed in extensions by [`bearer_middleware`]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| OAuthError::UnauthorizedRequest("authentication is required".to_string()))
    }
}

/// Require a valid bearer access token
///
/// Failures are answered with the OAuth error body and a
/// `WWW-Authenticate` challenge.
pub async fn bearer_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let (mut req, form_body) = match buffer_form_body(req).await {
        Ok(buffered) => buffered,
        Err(err) => return err.into_response(),
    };

    let token = match extract_bearer_token(req.headers(), req.uri().query(), form_body.as_deref())
    {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };

    match state.grants.authenticate(&token).await {
        Ok(authenticated) => {
            tracing::debug!(
                user = %authenticated.user.username,
                client_id = %authenticated.token.client_id,
                "Bearer token accepted"
            );
            req.extensions_mut().insert(authenticated);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

/// Read a form-encoded body of a non-GET request so it can carry the token
///
/// The request is rebuilt with the same bytes for the handler.
async fn buffer_form_body(
    req: Request,
) -> std::result::Result<(Request, Option<Bytes>), OAuthError> {
    if req.method() == Method::GET || !is_form_encoded(req.headers()) {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_TOKEN_FORM_BYTES)
        .await
        .map_err(|_| OAuthError::invalid_request("request body could not be read"))?;
    Ok((Request::from_parts(parts, Body::from(bytes.clone())), Some(bytes)))
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn form_token(form: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(form)
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
}

/// Find the access token presented with a request
///
/// Accepted carriers are the `Authorization: Bearer` header and an
/// `access_token` field of a form-encoded body. Presenting more than one,
/// or passing the token in the query string, is an invalid request.
pub fn extract_bearer_token(
    headers: &HeaderMap,
    query: Option<&str>,
    form_body: Option<&[u8]>,
) -> std::result::Result<String, OAuthError> {
    let header_value = headers.get(header::AUTHORIZATION);
    let in_query = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == "access_token")
        })
        .unwrap_or(false);
    let in_body = form_body.and_then(form_token);

    let carriers = [header_value.is_some(), in_query, in_body.is_some()]
        .iter()
        .filter(|present| **present)
        .count();
    if carriers > 1 {
        return Err(OAuthError::invalid_request(
            "only one authentication method is allowed",
        ));
    }

    if in_query {
        return Err(OAuthError::invalid_request(
            "access token in query string is not supported",
        ));
    }

    if let Some(token) = in_body {
        if token.is_empty() {
            return Err(OAuthError::invalid_request("malformed access token"));
        }
        return Ok(token);
    }

    let Some(value) = header_value else {
        return Err(OAuthError::UnauthorizedRequest(
            "authentication is required".to_string(),
        ));
    };

    value
        .to_str()
        .ok()
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| OAuthError::invalid_request("malformed authorization header"))
}
