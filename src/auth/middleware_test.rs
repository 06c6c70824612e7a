//! Tests for middleware

use crate::auth::middleware::extract_bearer_token;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};

fn bearer(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
    headers
}

#[test]
fn test_extract_bearer_token() {
    let token = extract_bearer_token(&bearer("Bearer abc123"), None, None).unwrap();
    assert_eq!(token, "abc123");

    let token = extract_bearer_token(&bearer("Bearer abc123"), Some("id=door-1"), None).unwrap();
    assert_eq!(token, "abc123");
}

#[test]
fn test_missing_token_is_unauthorized_request() {
    let err = extract_bearer_token(&HeaderMap::new(), None, None).unwrap_err();
    assert_eq!(err.code(), "unauthorized_request");
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_malformed_header() {
    let err = extract_bearer_token(&bearer("Basic Zm9vOmJhcg=="), None, None).unwrap_err();
    assert_eq!(err.code(), "invalid_request");

    let err = extract_bearer_token(&bearer("Bearer "), None, None).unwrap_err();
    assert_eq!(err.code(), "invalid_request");
}

#[test]
fn test_query_token_rejected() {
    let err = extract_bearer_token(&HeaderMap::new(), Some("access_token=abc"), None).unwrap_err();
    assert_eq!(err.code(), "invalid_request");
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_form_body_token() {
    let form = "id=door-1&access_token=abc".as_bytes();
    let token = extract_bearer_token(&HeaderMap::new(), None, Some(form)).unwrap();
    assert_eq!(token, "abc");

    let form = "access_token=".as_bytes();
    let err = extract_bearer_token(&HeaderMap::new(), None, Some(form)).unwrap_err();
    assert_eq!(err.code(), "invalid_request");

    // A body without the field falls back to the header
    let form = "id=door-1".as_bytes();
    let token = extract_bearer_token(&bearer("Bearer abc123"), None, Some(form)).unwrap();
    assert_eq!(token, "abc123");
}

#[test]
fn test_multiple_token_carriers_rejected() {
    let form = "access_token=abc".as_bytes();
    let err = extract_bearer_token(&bearer("Bearer abc123"), None, Some(form)).unwrap_err();
    assert_eq!(err.code(), "invalid_request");

    let err = extract_bearer_token(&bearer("Bearer abc123"), Some("access_token=abc"), None)
        .unwrap_err();
    assert_eq!(err.code(), "invalid_request");
}
