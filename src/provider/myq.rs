//! MyQ REST client
//!
//! Speaks the v4 MyQ API. MyQ answers every call with HTTP 200 and a
//! string `ReturnCode`; those codes are normalized to [`ReturnCode`].

use super::*;
use crate::NetworkError;
use crate::constants::*;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use std::time::Duration;

const LOGIN_PATH: &str = "/api/v4/User/Validate";
const DEVICES_PATH: &str = "/api/v4/UserDeviceDetails/Get";
const GET_ATTRIBUTE_PATH: &str = "/api/v4/DeviceAttribute/getDeviceAttribute";
const PUT_ATTRIBUTE_PATH: &str = "/api/v4/DeviceAttribute/PutDeviceAttribute";

const ATTR_DOOR_STATE: &str = "doorstate";
const ATTR_LIGHT_STATE: &str = "lightstate";
const ATTR_DESIRED_DOOR_STATE: &str = "desireddoorstate";
const ATTR_DESIRED_LIGHT_STATE: &str = "desiredlightstate";
const ATTR_DESCRIPTION: &str = "desc";

/// MyQ login client
#[derive(Clone)]
pub struct MyqClient {
    http: Client,
    base_url: String,
    application_id: String,
    user_agent: String,
}

impl MyqClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(NetworkError::from)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            application_id: config.application_id.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(MYQ_APPLICATION_ID_HEADER, &self.application_id)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
    }

    /// Send a request and return the body when MyQ reports success
    async fn call(&self, request: RequestBuilder) -> std::result::Result<Value, ReturnCode> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!("MyQ request failed: {}", e);
            ReturnCode::ServiceDown
        })?;

        let status = response.status();
        if status.is_server_error() {
            tracing::warn!("MyQ responded with {}", status);
            return Err(ReturnCode::ServiceDown);
        }
        if !status.is_success() {
            tracing::warn!("MyQ responded with {}", status);
            return Err(ReturnCode::Unexpected);
        }

        let body: Value = response.json().await.map_err(|e| {
            tracing::warn!("MyQ returned an unreadable body: {}", e);
            ReturnCode::Unexpected
        })?;

        match map_return_code(&body) {
            ReturnCode::Success => Ok(body),
            code => {
                tracing::debug!(
                    "MyQ returned code {:?}: {:?}",
                    body.get("ReturnCode"),
                    body.get("ErrorMessage")
                );
                Err(code)
            }
        }
    }
}

/// Map a MyQ `ReturnCode` field onto the normalized codes
fn map_return_code(body: &Value) -> ReturnCode {
    let raw = match body.get("ReturnCode") {
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };

    match raw {
        Some(0) => ReturnCode::Success,
        Some(203) => ReturnCode::BadCredentials,
        Some(205) => ReturnCode::OneTryLeft,
        Some(207) => ReturnCode::LockedOut,
        Some(-3333) => ReturnCode::NotLoggedIn,
        _ => ReturnCode::Unexpected,
    }
}

#[async_trait]
impl IdentityProvider for MyqClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        let request = self
            .request(reqwest::Method::POST, LOGIN_PATH)
            .json(&json!({ "username": username, "password": password }));

        let body = match self.call(request).await {
            Ok(body) => body,
            Err(code) => return Ok(LoginResult::failure(code)),
        };

        match body.get("SecurityToken").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(LoginResult::success(token)),
            _ => Ok(LoginResult::failure(ReturnCode::Unexpected)),
        }
    }

    fn session(&self, security_token: &str) -> Arc<dyn ProviderSession> {
        Arc::new(MyqSession {
            client: self.clone(),
            security_token: security_token.to_string(),
        })
    }
}

/// Device session bound to one MyQ security token
pub struct MyqSession {
    client: MyqClient,
    security_token: String,
}

impl MyqSession {
    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, path)
            .header(MYQ_SECURITY_TOKEN_HEADER, &self.security_token)
    }

    async fn get_attribute(&self, id: &str, attribute: &str) -> std::result::Result<Value, ReturnCode> {
        let request = self
            .request(reqwest::Method::GET, GET_ATTRIBUTE_PATH)
            .query(&[("MyQDeviceId", id), ("AttributeName", attribute)]);
        self.client.call(request).await
    }

    async fn put_attribute(
        &self,
        id: Option<&str>,
        attribute: &str,
        state: Option<&str>,
    ) -> ProviderResult {
        let (Some(id), Some(state)) = (non_empty(id), parse_state(state)) else {
            return ProviderResult::failure(ReturnCode::InvalidParameter);
        };

        let request = self
            .request(reqwest::Method::PUT, PUT_ATTRIBUTE_PATH)
            .json(&json!({
                "MyQDeviceId": id,
                "AttributeName": attribute,
                "AttributeValue": state.to_string(),
            }));

        match self.client.call(request).await {
            Ok(_) => ProviderResult::success(),
            Err(code) => ProviderResult::failure(code),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Desired states are 0 (close/off) or 1 (open/on)
fn parse_state(state: Option<&str>) -> Option<u8> {
    match non_empty(state)?.trim() {
        "0" => Some(0),
        "1" => Some(1),
        _ => None,
    }
}

fn attribute_value<'a>(device: &'a Value, name: &str) -> Option<&'a Value> {
    device
        .get("Attributes")?
        .as_array()?
        .iter()
        .find(|attr| attr.get("AttributeDisplayName").and_then(Value::as_str) == Some(name))
        .and_then(|attr| attr.get("Value"))
}

fn numeric(value: &Value) -> Value {
    match value {
        Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Reduce a MyQ device to the fields the bridge exposes
fn map_device(device: &Value) -> Value {
    let mut mapped = Map::new();
    mapped.insert(
        "id".to_string(),
        device.get("MyQDeviceId").cloned().unwrap_or(Value::Null),
    );
    mapped.insert(
        "typeId".to_string(),
        device.get("MyQDeviceTypeId").cloned().unwrap_or(Value::Null),
    );
    mapped.insert(
        "typeName".to_string(),
        device.get("MyQDeviceTypeName").cloned().unwrap_or(Value::Null),
    );
    mapped.insert(
        "name".to_string(),
        attribute_value(device, ATTR_DESCRIPTION)
            .cloned()
            .unwrap_or(Value::Null),
    );
    if let Some(state) = attribute_value(device, ATTR_DOOR_STATE) {
        mapped.insert("doorState".to_string(), numeric(state));
    }
    if let Some(state) = attribute_value(device, ATTR_LIGHT_STATE) {
        mapped.insert("lightState".to_string(), numeric(state));
    }
    Value::Object(mapped)
}

#[async_trait]
impl ProviderSession for MyqSession {
    async fn get_devices(&self, type_ids: &[u32]) -> Result<ProviderResult> {
        let request = self.request(reqwest::Method::GET, DEVICES_PATH);
        let body = match self.client.call(request).await {
            Ok(body) => body,
            Err(code) => return Ok(ProviderResult::failure(code)),
        };

        let devices: Vec<Value> = body
            .get("Devices")
            .and_then(Value::as_array)
            .map(|devices| {
                devices
                    .iter()
                    .filter(|d| {
                        d.get("MyQDeviceTypeId")
                            .and_then(Value::as_u64)
                            .is_some_and(|t| type_ids.iter().any(|id| u64::from(*id) == t))
                    })
                    .map(map_device)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ProviderResult::success().with("devices", devices))
    }

    async fn get_door_state(&self, id: Option<&str>) -> Result<ProviderResult> {
        let Some(id) = non_empty(id) else {
            return Ok(ProviderResult::failure(ReturnCode::InvalidParameter));
        };

        match self.get_attribute(id, ATTR_DOOR_STATE).await {
            Ok(body) => {
                let state = body
                    .get("AttributeValue")
                    .map(numeric)
                    .unwrap_or(Value::Null);
                Ok(ProviderResult::success().with("doorState", state))
            }
            Err(code) => Ok(ProviderResult::failure(code)),
        }
    }

    async fn set_door_state(
        &self,
        id: Option<&str>,
        state: Option<&str>,
    ) -> Result<ProviderResult> {
        Ok(self.put_attribute(id, ATTR_DESIRED_DOOR_STATE, state).await)
    }

    async fn set_light_state(
        &self,
        id: Option<&str>,
        state: Option<&str>,
    ) -> Result<ProviderResult> {
        Ok(self.put_attribute(id, ATTR_DESIRED_LIGHT_STATE, state).await)
    }
}

#[cfg(test)]
mod myq_test {
    include!("myq_test.rs");
}
