// Tests for response

use super::*;
use axum::body::to_bytes;
use serde_json::json;

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_message_response_shape() {
    let body = body_json(MessageResponse::ok("Logged in!").into_response()).await;
    assert_eq!(body, json!({ "success": true, "message": "Logged in!" }));

    let body = body_json(
        MessageResponse::redirect("Redirecting", "https://example.com/cb?code=x").into_response(),
    )
    .await;
    assert_eq!(body["redirectUri"], "https://example.com/cb?code=x");
}

#[tokio::test]
async fn test_oauth_error_statuses() {
    let response = OAuthError::invalid_grant("expired").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");

    let response = OAuthError::invalid_token("unknown token").into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.starts_with("Bearer realm=\"Service\""));

    let response = OAuthError::UnauthorizedRequest("no token".into()).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Bearer realm=\"Service\""
    );

    let response = OAuthError::invalid_client("bad secret", true).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = OAuthError::invalid_client("bad secret", false).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = OAuthError::ServerError("down".into()).into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_relay_redirect() {
    let response = relay_response(ProtocolResponse::found("https://example.com/cb?code=abc"));
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://example.com/cb?code=abc"
    );
}

#[tokio::test]
async fn test_relay_json_with_headers() {
    let protocol = ProtocolResponse::json(StatusCode::OK, json!({ "access_token": "t" }))
        .with_header(header::CACHE_CONTROL, "no-store");
    let response = relay_response(protocol);

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(body_json(response).await["access_token"], "t");
}
