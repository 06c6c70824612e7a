//! HTTP response helpers
//!
//! JSON message bodies for the browser flow, OAuth2 error responses, and
//! relaying of protocol responses produced by the grant service.

use crate::constants::BEARER_REALM;
use crate::error::OAuthError;
use axum::{
    Json,
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

/// Body returned by the login bridge and the authorize handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            redirect_uri: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            redirect_uri: None,
        }
    }

    pub fn redirect(message: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            redirect_uri: Some(redirect_uri.into()),
        }
    }
}

impl IntoResponse for MessageResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// OAuth2 error body (RFC 6749 section 5.2)
#[derive(Debug, Serialize)]
struct OAuthErrorBody {
    error: &'static str,
    error_description: String,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = OAuthErrorBody {
            error: self.code(),
            error_description: self.description(),
        };

        let challenge = match &self {
            OAuthError::InvalidToken(_) => Some(format!(
                "Bearer realm=\"{}\", error=\"invalid_token\"",
                BEARER_REALM
            )),
            OAuthError::UnauthorizedRequest(_) => {
                Some(format!("Bearer realm=\"{}\"", BEARER_REALM))
            }
            OAuthError::InvalidClient {
                via_basic: true, ..
            } => Some(format!("Basic realm=\"{}\"", BEARER_REALM)),
            _ => None,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(challenge) = challenge
            && let Ok(value) = HeaderValue::from_str(&challenge)
        {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// A protocol response produced by the grant service, before it is relayed
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, String)>,
    pub body: Option<Value>,
}

impl ProtocolResponse {
    /// A would-be `302 Found` pointing at `location`
    pub fn found(location: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FOUND,
            headers: vec![(header::LOCATION, location.into())],
            body: None,
        }
    }

    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// First value of a header
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(&header::LOCATION)
    }
}

/// Relay a protocol response to the HTTP client
///
/// A 302 becomes a redirect to its `Location`; anything else is sent with
/// its own status, headers and body.
pub fn relay_response(response: ProtocolResponse) -> Response {
    if response.status == StatusCode::FOUND
        && let Some(location) = response.location()
    {
        return match HeaderValue::from_str(location) {
            Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
            Err(_) => write_http_error("Invalid redirect location", StatusCode::BAD_GATEWAY),
        };
    }

    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }

    let result = match response.body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    };

    result.unwrap_or_else(|e| {
        tracing::error!("Failed to build relayed response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

#[cfg(test)]
mod response_test {
    include!("response_test.rs");
}
