//! Error types for MyQ Home
//!
//! This module provides the error hierarchy using thiserror.
//! All errors can be converted to MyqHomeError for unified error handling,
//! except OAuth protocol errors which also render directly as RFC 6749 responses.

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for MyQ Home operations
#[derive(Error, Debug)]
pub enum MyqHomeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for MyqHomeError {
    fn from(err: sqlx::Error) -> Self {
        MyqHomeError::Storage(StorageError::from(err))
    }
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// OAuth 2.0 protocol errors (RFC 6749 section 5.2, RFC 6750 section 3.1)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// `via_basic` marks a failed HTTP Basic client authentication, answered with 401
    #[error("Invalid client: {message}")]
    InvalidClient { message: String, via_basic: bool },

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Unauthorized client: {0}")]
    UnauthorizedClient(String),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized request: {0}")]
    UnauthorizedRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// The `error` code sent on the wire
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient { .. } => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::UnauthorizedRequest(_) => "unauthorized_request",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// HTTP status for the error response
    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient { via_basic: true, .. }
            | OAuthError::InvalidToken(_)
            | OAuthError::UnauthorizedRequest(_) => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Human readable description (the `error_description` field)
    pub fn description(&self) -> String {
        self.to_string()
    }

    #[inline]
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        OAuthError::InvalidRequest(msg.into())
    }

    #[inline]
    pub fn invalid_grant<S: Into<String>>(msg: S) -> Self {
        OAuthError::InvalidGrant(msg.into())
    }

    #[inline]
    pub fn invalid_token<S: Into<String>>(msg: S) -> Self {
        OAuthError::InvalidToken(msg.into())
    }

    #[inline]
    pub fn invalid_client<S: Into<String>>(msg: S, via_basic: bool) -> Self {
        OAuthError::InvalidClient {
            message: msg.into(),
            via_basic,
        }
    }
}

impl From<MyqHomeError> for OAuthError {
    fn from(err: MyqHomeError) -> Self {
        match err {
            MyqHomeError::OAuth(e) => e,
            other => {
                tracing::error!("Internal error during OAuth processing: {:?}", other);
                OAuthError::ServerError("an internal error occurred".to_string())
            }
        }
    }
}

/// Convenient result type for MyQ Home operations
pub type Result<T> = std::result::Result<T, MyqHomeError>;

impl MyqHomeError {
    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        MyqHomeError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MyqHomeError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        MyqHomeError::Storage(StorageError::Database(msg.into()))
    }
}
