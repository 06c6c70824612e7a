//! OAuth 2.0 authorization server
//!
//! Implements the authorization-code grant and refresh-token grant over the
//! credential store. The authorize step does not prompt for credentials:
//! the principal comes from a [`PrincipalResolver`], which for browser
//! requests is the user the login bridge placed in the session.

use crate::auth::middleware::AuthenticatedUser;
use crate::config::OAuthConfig;
use crate::constants::*;
use crate::error::OAuthError;
use crate::http::response::{MessageResponse, ProtocolResponse, relay_response};
use crate::http::session::{SessionId, SessionUser};
use crate::http::{AppState, JsonOrForm};
use crate::model::{AuthorizationCode, OAuthClient, OAuthToken, User};
use crate::storage::Storage;
use crate::{MyqHomeError, Result, telemetry};
use async_trait::async_trait;
use axum::{
    Extension, Form,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type OAuthResult<T> = std::result::Result<T, OAuthError>;

/// Authorization request parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// `allowed=false` denies the request outright
    #[serde(default)]
    pub allowed: Option<String>,
}

impl AuthorizeParams {
    /// Fill fields missing here from `fallback`
    ///
    /// Body parameters take precedence over the query string.
    pub fn or(self, fallback: Self) -> Self {
        fn pick(value: Option<String>, fallback: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty()).or(fallback)
        }

        Self {
            response_type: pick(self.response_type, fallback.response_type),
            client_id: pick(self.client_id, fallback.client_id),
            redirect_uri: pick(self.redirect_uri, fallback.redirect_uri),
            scope: pick(self.scope, fallback.scope),
            state: pick(self.state, fallback.state),
            allowed: pick(self.allowed, fallback.allowed),
        }
    }
}

impl From<&crate::model::PendingAuthorizationRequest> for AuthorizeParams {
    fn from(pending: &crate::model::PendingAuthorizationRequest) -> Self {
        Self {
            response_type: Some(pending.response_type.clone()),
            client_id: Some(pending.client_id.clone()),
            redirect_uri: Some(pending.redirect_uri.clone()),
            scope: Some(pending.scope.clone()),
            state: Some(pending.state.clone()),
            allowed: None,
        }
    }
}

/// Token request parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Client credentials presented with a token request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Credentials arrived in an HTTP Basic `Authorization` header
    pub via_basic: bool,
}

/// Result of the authorize step
#[derive(Debug, Clone)]
pub enum AuthorizationOutcome {
    /// A code was issued; `response` is the would-be `302` to the client
    Granted {
        code: AuthorizationCode,
        response: ProtocolResponse,
    },
    /// The request was explicitly denied with `allowed=false`
    AccessDenied(String),
}

/// Tokens issued by the token endpoint
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: OAuthToken,
    pub response: ProtocolResponse,
}

/// Resolves the principal an authorization request is made for
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self) -> Result<Option<User>>;
}

/// Principal taken from a trusted server-side session
///
/// The session holds the username and the password hash written by the
/// login bridge; both must match a stored user exactly.
pub struct SessionPrincipal {
    storage: Arc<dyn Storage>,
    user: Option<SessionUser>,
}

impl SessionPrincipal {
    pub fn new(storage: Arc<dyn Storage>, user: Option<SessionUser>) -> Self {
        Self { storage, user }
    }
}

#[async_trait]
impl PrincipalResolver for SessionPrincipal {
    async fn resolve(&self) -> Result<Option<User>> {
        let Some(ref user) = self.user else {
            return Ok(None);
        };
        self.storage
            .find_user_by_credentials(&user.username, &user.password_hash)
            .await
    }
}

/// OAuth grant service
pub struct GrantService {
    storage: Arc<dyn Storage>,
    config: OAuthConfig,
}

impl GrantService {
    pub fn new(storage: Arc<dyn Storage>, config: OAuthConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Run the authorize step for the principal given by `resolver`
    pub async fn authorize(
        &self,
        params: &AuthorizeParams,
        resolver: &dyn PrincipalResolver,
    ) -> OAuthResult<AuthorizationOutcome> {
        if params.allowed.as_deref() == Some("false") {
            return Ok(AuthorizationOutcome::AccessDenied(
                "user denied the request".to_string(),
            ));
        }

        let client_id = required(&params.client_id, "client_id")?;
        let client = self.find_client(client_id).await?.ok_or_else(|| {
            OAuthError::invalid_client("client credentials are invalid", false)
        })?;

        if !client.allows_grant(GRANT_AUTHORIZATION_CODE) {
            return Err(OAuthError::UnauthorizedClient(
                "`grant_type` is invalid".to_string(),
            ));
        }

        let redirect_uri = match non_empty(&params.redirect_uri) {
            Some(uri) if client.allows_redirect(uri) => uri.to_string(),
            Some(_) => {
                return Err(OAuthError::invalid_client(
                    "`redirect_uri` does not match client value",
                    false,
                ));
            }
            None => client.redirect_uris.first().cloned().ok_or_else(|| {
                OAuthError::invalid_client("missing client `redirect_uri`", false)
            })?,
        };

        // A missing principal is a failure, not a denial
        let Some(user) = resolver.resolve().await? else {
            return Err(OAuthError::ServerError(
                "no authenticated user for this request".to_string(),
            ));
        };

        let scope = non_empty(&params.scope).unwrap_or_default().to_string();
        if !client.allows_scope(&scope) {
            return Err(OAuthError::InvalidScope(
                "`scope` is invalid".to_string(),
            ));
        }

        let state = non_empty(&params.state);
        if state.is_none() && !self.config.allow_empty_state {
            return Err(OAuthError::invalid_request("missing parameter: `state`"));
        }

        let response_type = required(&params.response_type, "response_type")?;
        if response_type != RESPONSE_TYPE_CODE {
            return Err(OAuthError::UnsupportedResponseType(
                "`response_type` is not supported".to_string(),
            ));
        }

        let mut location = url::Url::parse(&redirect_uri)
            .map_err(|_| OAuthError::invalid_request("`redirect_uri` is not a valid URI"))?;

        let code = AuthorizationCode {
            code: generate_authorization_code(),
            client_id: client.id.clone(),
            user_id: user.username.clone(),
            redirect_uri,
            scope,
            expires_at: Utc::now() + Duration::seconds(self.config.authorization_code_lifetime),
        };
        self.storage.save_code(&code).await?;

        {
            let mut query = location.query_pairs_mut();
            query.append_pair("code", &code.code);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }

        tracing::info!(
            client_id = %code.client_id,
            user = %code.user_id,
            "Issued authorization code"
        );

        Ok(AuthorizationOutcome::Granted {
            response: ProtocolResponse::found(location.to_string()),
            code,
        })
    }

    /// Exchange a code or refresh token for a new token pair
    pub async fn token(
        &self,
        params: &TokenParams,
        basic: Option<ClientCredentials>,
    ) -> OAuthResult<TokenGrant> {
        let grant_type = required(&params.grant_type, "grant_type")?;

        let credentials = match basic {
            Some(credentials) => credentials,
            None => match (non_empty(&params.client_id), non_empty(&params.client_secret)) {
                (Some(id), Some(secret)) => ClientCredentials {
                    client_id: id.to_string(),
                    client_secret: secret.to_string(),
                    via_basic: false,
                },
                _ => {
                    return Err(OAuthError::invalid_client(
                        "cannot retrieve client credentials",
                        false,
                    ));
                }
            },
        };
        let client = self.authenticate_client(&credentials).await?;

        if grant_type != GRANT_AUTHORIZATION_CODE && grant_type != GRANT_REFRESH_TOKEN {
            return Err(OAuthError::UnsupportedGrantType(
                "`grant_type` is invalid".to_string(),
            ));
        }
        if !client.allows_grant(grant_type) {
            return Err(OAuthError::UnauthorizedClient(
                "`grant_type` is invalid".to_string(),
            ));
        }

        let token = if grant_type == GRANT_AUTHORIZATION_CODE {
            self.exchange_code(&client, params).await?
        } else {
            self.rotate_refresh_token(&client, params).await?
        };

        telemetry::record_token_issued(grant_type);

        let now = Utc::now();
        let mut body = json!({
            "access_token": token.access,
            "token_type": TOKEN_TYPE_BEARER,
            "expires_in": token.expires_in(now),
        });
        if let Some(ref refresh) = token.refresh {
            body["refresh_token"] = json!(refresh);
        }
        if !token.scope.is_empty() {
            body["scope"] = json!(token.scope);
        }

        let response = ProtocolResponse::json(StatusCode::OK, body)
            .with_header(header::CACHE_CONTROL, "no-store")
            .with_header(header::PRAGMA, "no-cache");

        Ok(TokenGrant { token, response })
    }

    /// Resolve a bearer access token to its token pair and bound user
    pub async fn authenticate(&self, access_token: &str) -> OAuthResult<AuthenticatedUser> {
        let token = self
            .storage
            .find_token(access_token)
            .await?
            .ok_or_else(|| OAuthError::invalid_token("access token is invalid"))?;

        let user = self
            .storage
            .find_user_by_username(&token.user_id)
            .await?
            .ok_or_else(|| OAuthError::invalid_token("user for access token not found"))?;

        Ok(AuthenticatedUser { token, user })
    }

    async fn find_client(&self, client_id: &str) -> OAuthResult<Option<OAuthClient>> {
        Ok(self.storage.find_client(client_id).await?)
    }

    async fn authenticate_client(&self, credentials: &ClientCredentials) -> OAuthResult<OAuthClient> {
        let invalid =
            || OAuthError::invalid_client("client is invalid", credentials.via_basic);

        let client = self
            .find_client(&credentials.client_id)
            .await?
            .ok_or_else(invalid)?;

        // Constant-time comparison to prevent timing attacks
        let matches = client
            .secret
            .as_bytes()
            .ct_eq(credentials.client_secret.as_bytes())
            .unwrap_u8()
            == 1;
        if !matches {
            return Err(invalid());
        }

        Ok(client)
    }

    async fn exchange_code(
        &self,
        client: &OAuthClient,
        params: &TokenParams,
    ) -> OAuthResult<OAuthToken> {
        let code_value = required(&params.code, "code")?;

        let code = self
            .storage
            .find_code(code_value)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("authorization code is invalid"))?;

        if code.client_id != client.id {
            return Err(OAuthError::invalid_grant("authorization code is invalid"));
        }

        match non_empty(&params.redirect_uri) {
            Some(uri) if uri == code.redirect_uri => {}
            Some(_) => return Err(OAuthError::invalid_request("`redirect_uri` is invalid")),
            None => return Err(OAuthError::invalid_request("missing parameter: `redirect_uri`")),
        }

        // A concurrent exchange of the same code loses here
        let code = self
            .storage
            .take_code(code_value)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("authorization code is invalid"))?;

        self.issue_token(client, &code.user_id, &code.scope).await
    }

    async fn rotate_refresh_token(
        &self,
        client: &OAuthClient,
        params: &TokenParams,
    ) -> OAuthResult<OAuthToken> {
        let refresh = required(&params.refresh_token, "refresh_token")?;

        let existing = self
            .storage
            .find_refresh_token(refresh)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("refresh token is invalid"))?;

        if existing.client_id != client.id {
            return Err(OAuthError::invalid_grant("refresh token is invalid"));
        }

        let revoked = self
            .storage
            .take_refresh_token(refresh)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("refresh token is invalid"))?;

        self.issue_token(client, &revoked.user_id, &revoked.scope)
            .await
    }

    async fn issue_token(
        &self,
        client: &OAuthClient,
        user_id: &str,
        scope: &str,
    ) -> OAuthResult<OAuthToken> {
        let now = Utc::now();
        let with_refresh = client.allows_grant(GRANT_REFRESH_TOKEN);

        let token = OAuthToken {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client.id.clone(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            access: generate_access_token(),
            access_expires_at: now + Duration::seconds(self.config.access_token_lifetime),
            refresh: with_refresh.then(generate_refresh_token),
            refresh_expires_at: with_refresh
                .then(|| now + Duration::seconds(self.config.refresh_token_lifetime)),
        };

        self.storage.save_token(&token).await?;
        Ok(token)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> OAuthResult<&'a str> {
    non_empty(value)
        .ok_or_else(|| OAuthError::invalid_request(format!("missing parameter: `{}`", name)))
}

/// Parse HTTP Basic client credentials
///
/// Returns `Ok(None)` when no Basic header is present.
pub fn parse_basic_auth(headers: &HeaderMap) -> OAuthResult<Option<ClientCredentials>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let Some(encoded) = value.to_str().ok().and_then(|v| v.strip_prefix("Basic ")) else {
        return Ok(None);
    };

    let malformed = || OAuthError::invalid_client("malformed Basic credentials", true);

    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim())
        .map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (client_id, client_secret) = decoded.split_once(':').ok_or_else(malformed)?;

    Ok(Some(ClientCredentials {
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        via_basic: true,
    }))
}

/// Run the authorize step for the user held in a browser session
///
/// On success the session is destroyed and the redirect target is returned
/// as JSON rather than as an HTTP redirect. An access-denied outcome is an
/// empty `200` response.
pub async fn authorize_session(
    state: &AppState,
    session_id: &SessionId,
    params: &AuthorizeParams,
) -> Response {
    let user = state
        .sessions
        .get_session(&session_id.0)
        .and_then(|session| session.user);
    let resolver = SessionPrincipal::new(state.storage.clone(), user);

    match state.grants.authorize(params, &resolver).await {
        Ok(AuthorizationOutcome::Granted { response, .. }) => {
            state.sessions.delete_session(&session_id.0);

            let Some(location) = response.location() else {
                return relay_response(response);
            };
            let mut reply =
                MessageResponse::redirect(MSG_LOGGED_IN_REDIRECTING, location).into_response();
            if let Ok(cookie) = HeaderValue::from_str(&state.sessions.clear_cookie()) {
                reply.headers_mut().append(header::SET_COOKIE, cookie);
            }
            reply
        }
        Ok(AuthorizationOutcome::AccessDenied(reason)) => {
            tracing::debug!("Authorization denied: {}", reason);
            StatusCode::OK.into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `POST /oauth/authorize`
///
/// Parameters may arrive in the query string, a JSON body or a form body.
pub async fn handle_authorize(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    Query(query): Query<AuthorizeParams>,
    body: std::result::Result<JsonOrForm<AuthorizeParams>, Response>,
) -> Response {
    let params = match body {
        Ok(JsonOrForm(body)) => body.or(query),
        Err(_) => query,
    };
    authorize_session(&state, &session_id, &params).await
}

/// `POST /oauth/token`
pub async fn handle_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: std::result::Result<Form<TokenParams>, FormRejection>,
) -> Response {
    let Ok(Form(params)) = form else {
        return OAuthError::invalid_request(
            "content must be application/x-www-form-urlencoded",
        )
        .into_response();
    };

    let basic = match parse_basic_auth(&headers) {
        Ok(basic) => basic,
        Err(err) => return err.into_response(),
    };

    match state.grants.token(&params, basic).await {
        Ok(grant) => {
            let mut response = relay_response(grant.response);
            response.extensions_mut().insert(grant.token);
            response
        }
        Err(err) => {
            tracing::debug!("Token request rejected: {}", err);
            err.into_response()
        }
    }
}

/// Register a new OAuth client with generated credentials
pub async fn register_client(
    storage: &dyn Storage,
    name: &str,
    redirect_uris: Vec<String>,
    scope: &str,
    grant_types: Vec<String>,
) -> Result<OAuthClient> {
    if redirect_uris.is_empty() {
        return Err(MyqHomeError::validation("at least one redirect URI is required"));
    }
    if let Some(invalid) = redirect_uris.iter().find(|u| !is_valid_redirect_uri(u, true)) {
        return Err(MyqHomeError::validation(format!(
            "invalid redirect URI: {}",
            invalid
        )));
    }

    let grant_types = if grant_types.is_empty() {
        vec![
            GRANT_AUTHORIZATION_CODE.to_string(),
            GRANT_REFRESH_TOKEN.to_string(),
        ]
    } else {
        grant_types
    };
    if let Some(unknown) = grant_types
        .iter()
        .find(|g| *g != GRANT_AUTHORIZATION_CODE && *g != GRANT_REFRESH_TOKEN)
    {
        return Err(MyqHomeError::validation(format!(
            "unsupported grant type: {}",
            unknown
        )));
    }

    let now = Utc::now();
    let client = OAuthClient {
        id: uuid::Uuid::new_v4().to_string(),
        secret: generate_client_secret(),
        name: name.to_string(),
        redirect_uris,
        grant_types,
        scope: scope.to_string(),
        created_at: now,
        updated_at: now,
    };

    storage.save_client(&client).await?;
    Ok(client)
}

/// Validate redirect URI
fn is_valid_redirect_uri(uri: &str, allow_localhost: bool) -> bool {
    if uri.is_empty() || uri.len() > 2048 {
        return false;
    }

    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };

    // Must be HTTPS or localhost
    if parsed.scheme() != "https"
        && (!allow_localhost
            || (parsed.host_str() != Some("localhost")
                && parsed.host_str() != Some("127.0.0.1")))
    {
        return false;
    }

    // No fragments allowed
    parsed.fragment().is_none()
}

/// Generate 256 random bits, base64url encoded
fn random_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Generate secure client secret
pub fn generate_client_secret() -> String {
    random_token()
}

fn generate_authorization_code() -> String {
    random_token()
}

fn generate_access_token() -> String {
    random_token()
}

fn generate_refresh_token() -> String {
    random_token()
}

#[cfg(test)]
mod server_test {
    include!("server_test.rs");
}
