//! Device proxy handlers
//!
//! Each handler makes exactly one provider call on the session opened by
//! the gate and returns the provider result unchanged.

use crate::auth::ProviderSessionHandle;
use crate::constants::DEVICE_TYPE_IDS;
use crate::http::{AppError, JsonOrForm};
use crate::provider::ProviderResult;
use axum::{
    Extension, Json,
    extract::Query,
};
use serde::Deserialize;

type HandlerResult = std::result::Result<Json<ProviderResult>, AppError>;

/// `?id=` query for state reads
#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of a state change
#[derive(Debug, Default, Deserialize)]
pub struct StateChange {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub state: Option<StateValue>,
}

/// Desired state, sent as a string by forms and possibly as a number in JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Number(i64),
    Text(String),
}

impl StateValue {
    fn into_string(self) -> String {
        match self {
            StateValue::Number(n) => n.to_string(),
            StateValue::Text(s) => s,
        }
    }
}

impl StateChange {
    fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.id, self.state.map(StateValue::into_string))
    }
}

/// `GET /devices`
pub async fn list_devices(Extension(session): Extension<ProviderSessionHandle>) -> HandlerResult {
    let result = session.0.get_devices(&DEVICE_TYPE_IDS).await?;
    tracing::info!(return_code = result.return_code, "GET devices: {:?}", result.fields);
    Ok(Json(result))
}

/// `GET /door/state`
pub async fn get_door_state(
    Extension(session): Extension<ProviderSessionHandle>,
    Query(query): Query<DeviceQuery>,
) -> HandlerResult {
    let result = session.0.get_door_state(query.id.as_deref()).await?;
    tracing::info!(return_code = result.return_code, "GET door state: {:?}", result.fields);
    Ok(Json(result))
}

/// `PUT /door/state`
pub async fn set_door_state(
    Extension(session): Extension<ProviderSessionHandle>,
    body: std::result::Result<JsonOrForm<StateChange>, axum::response::Response>,
) -> HandlerResult {
    let (id, state) = body
        .map(|JsonOrForm(change)| change)
        .unwrap_or_default()
        .into_parts();
    let result = session
        .0
        .set_door_state(id.as_deref(), state.as_deref())
        .await?;
    tracing::info!(return_code = result.return_code, "PUT door state: {:?}", result.fields);
    Ok(Json(result))
}

/// `GET /light/state`
///
/// Issued to the provider as a state change with no state, not as a read.
pub async fn get_light_state(
    Extension(session): Extension<ProviderSessionHandle>,
    Query(query): Query<DeviceQuery>,
) -> HandlerResult {
    let result = session.0.set_light_state(query.id.as_deref(), None).await?;
    tracing::info!(return_code = result.return_code, "GET light state: {:?}", result.fields);
    Ok(Json(result))
}

/// `PUT /light/state`
pub async fn set_light_state(
    Extension(session): Extension<ProviderSessionHandle>,
    body: std::result::Result<JsonOrForm<StateChange>, axum::response::Response>,
) -> HandlerResult {
    let (id, state) = body
        .map(|JsonOrForm(change)| change)
        .unwrap_or_default()
        .into_parts();
    let result = session
        .0
        .set_light_state(id.as_deref(), state.as_deref())
        .await?;
    tracing::info!(return_code = result.return_code, "PUT light state: {:?}", result.fields);
    Ok(Json(result))
}
