//! HTTP server for MyQ Home
//!
//! Browser routes (login page, login bridge, authorize handoff) run behind
//! the session layer. Device routes run behind bearer authentication and
//! the provider session gate.

pub mod response;
pub mod session;
pub mod template;

use self::session::{SessionId, SessionStore, session_middleware};
use self::template::{LOGIN_TEMPLATE, PRIVACY_TEMPLATE, TemplateRenderer};
use crate::auth::{
    GrantService, bearer_middleware, handle_authorize, handle_login, handle_token, session_gate,
};
use crate::config::{Config, HttpConfig};
use crate::constants::APP_NAME;
use crate::devices;
use crate::model::PendingAuthorizationRequest;
use crate::provider::IdentityProvider;
use crate::storage::Storage;
use crate::{MyqHomeError, Result};
use axum::{
    Extension, Form, Router,
    extract::{FromRequest, Json, Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub provider: Arc<dyn IdentityProvider>,
    pub grants: Arc<GrantService>,
    pub sessions: SessionStore,
    pub templates: TemplateRenderer,
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble the state from its collaborators
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let sessions = SessionStore::new(
            config.session.cookie_name.clone(),
            chrono::Duration::minutes(config.session.ttl_minutes),
            config.http.secure,
        );
        let grants = Arc::new(GrantService::new(storage.clone(), config.oauth.clone()));

        Ok(Self {
            storage,
            provider,
            grants,
            sessions,
            templates: TemplateRenderer::new()?,
            config: Arc::new(config),
        })
    }
}

/// Error type for HTTP handlers with enhanced error details
#[derive(Debug)]
pub struct AppError(MyqHomeError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self.0 {
            MyqHomeError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            MyqHomeError::OAuth(e) => return e.clone().into_response(),
            MyqHomeError::Storage(e) => {
                // Log full error details internally
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "An internal storage error occurred".to_string(),
                )
            }
            MyqHomeError::Network(e) => {
                tracing::error!("Network error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "network_error",
                    "A network error occurred".to_string(),
                )
            }
            _ => {
                tracing::error!("Internal error: {:?}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        tracing::debug!(
            error_type = error_type,
            status = %status,
            message = %message,
            "HTTP request error response"
        );

        let body = json!({
            "error": {
                "type": error_type,
                "message": message,
                "status": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<MyqHomeError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Body extractor accepting JSON or `application/x-www-form-urlencoded`
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        }
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let storage = crate::storage::create_storage_from_config(&config.storage).await?;
    let provider = crate::provider::create_provider_from_config(&config.provider)?;
    let http_config = config.http.clone();

    let _purge = crate::storage::spawn_purge_task(&storage);
    let state = AppState::new(config, storage, provider)?;
    let app = build_router(state, &http_config);

    // Determine bind address
    let addr = format!("{}:{}", http_config.host, http_config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| MyqHomeError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!("Starting HTTP server on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| MyqHomeError::config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Build the router with all endpoints
pub fn build_router(state: AppState, http_config: &HttpConfig) -> Router {
    // Browser flow: every request carries a session
    let browser_routes = Router::new()
        .route("/", get(root_handler))
        .route("/authorize", get(authorize_page))
        .route("/privacy-policy", get(privacy_page))
        .route("/login", post(handle_login))
        .route("/oauth/authorize", post(handle_authorize))
        .route_layer(from_fn_with_state(
            state.sessions.clone(),
            session_middleware,
        ));

    // Device API: bearer token first, then a fresh provider session
    let device_routes = Router::new()
        .route("/devices", get(devices::list_devices))
        .route(
            "/door/state",
            get(devices::get_door_state).put(devices::set_door_state),
        )
        .route(
            "/light/state",
            get(devices::get_light_state).put(devices::set_light_state),
        )
        .route_layer(from_fn_with_state(state.clone(), session_gate))
        .route_layer(from_fn_with_state(state.clone(), bearer_middleware));

    Router::new()
        .merge(browser_routes)
        .merge(device_routes)
        .route("/oauth/token", post(handle_token))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Tracing layer for request/response logging
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new())
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors_layer(http_config)),
        )
}

/// CORS policy: configured origins, or the local server's own origins
fn cors_layer(http_config: &HttpConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = match http_config.allowed_origins {
        Some(ref origins) => origins.iter().filter_map(|o| o.parse().ok()).collect(),
        None => [
            format!("http://localhost:{}", http_config.port),
            format!("http://127.0.0.1:{}", http_config.port),
        ]
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect(),
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Query of `GET /authorize`
#[derive(Debug, Default, Deserialize)]
struct AuthorizePageQuery {
    response_type: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    state: Option<String>,
}

async fn root_handler() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/authorize")]).into_response()
}

/// Render the login page, staging the OAuth request if it is complete
async fn authorize_page(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    Query(query): Query<AuthorizePageQuery>,
) -> std::result::Result<Html<String>, AppError> {
    let pending = PendingAuthorizationRequest::from_parts(
        query.response_type.as_deref(),
        query.client_id.as_deref(),
        query.redirect_uri.as_deref(),
        query.scope.as_deref(),
        query.state.as_deref(),
    );
    let staged = pending.is_some();

    state.sessions.update(&session_id.0, |session| {
        session.pending_authorization = pending;
    });

    let html = state.templates.render_json(
        LOGIN_TEMPLATE,
        &json!({ "app_name": APP_NAME, "pending": staged }),
    )?;
    Ok(Html(html))
}

async fn privacy_page(State(state): State<AppState>) -> std::result::Result<Html<String>, AppError> {
    let html = state
        .templates
        .render_json(PRIVACY_TEMPLATE, &json!({ "app_name": APP_NAME }))?;
    Ok(Html(html))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}
