use super::*;
use crate::storage::MemoryStorage;

struct FixedPrincipal(Option<User>);

#[async_trait]
impl PrincipalResolver for FixedPrincipal {
    async fn resolve(&self) -> Result<Option<User>> {
        Ok(self.0.clone())
    }
}

fn user() -> User {
    User::upserted(None, "a@b.com", "$2b$04$hash".to_string(), "tok".to_string())
}

fn test_client(grant_types: &[&str]) -> OAuthClient {
    OAuthClient {
        id: "client-1".to_string(),
        secret: "secret-1".to_string(),
        name: "Assistant".to_string(),
        redirect_uris: vec!["https://example.com/cb".to_string()],
        grant_types: grant_types.iter().map(|g| g.to_string()).collect(),
        scope: "devices".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn service_with(client: OAuthClient) -> GrantService {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage.save_client(&client).await.unwrap();
    storage.upsert_user(&user()).await.unwrap();
    GrantService::new(storage, OAuthConfig::default())
}

async fn service() -> GrantService {
    service_with(test_client(&[GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN])).await
}

fn authorize_params() -> AuthorizeParams {
    AuthorizeParams {
        response_type: Some("code".to_string()),
        client_id: Some("client-1".to_string()),
        redirect_uri: Some("https://example.com/cb".to_string()),
        scope: Some("devices".to_string()),
        state: Some("xyz".to_string()),
        allowed: None,
    }
}

fn basic() -> Option<ClientCredentials> {
    Some(ClientCredentials {
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
        via_basic: true,
    })
}

async fn issue_code(grants: &GrantService) -> AuthorizationCode {
    match grants
        .authorize(&authorize_params(), &FixedPrincipal(Some(user())))
        .await
        .unwrap()
    {
        AuthorizationOutcome::Granted { code, .. } => code,
        other => panic!("expected grant, got {:?}", other),
    }
}

fn code_params(code: &str) -> TokenParams {
    TokenParams {
        grant_type: Some(GRANT_AUTHORIZATION_CODE.to_string()),
        code: Some(code.to_string()),
        redirect_uri: Some("https://example.com/cb".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_validate_redirect_uri() {
    assert!(is_valid_redirect_uri("https://example.com/callback", false));
    assert!(is_valid_redirect_uri("http://localhost:3000/callback", true));
    assert!(is_valid_redirect_uri("http://127.0.0.1:8080/callback", true));

    assert!(!is_valid_redirect_uri("http://example.com/callback", true));
    assert!(!is_valid_redirect_uri("http://localhost:3000/callback", false));
    assert!(!is_valid_redirect_uri("https://example.com/callback#fragment", false));
    assert!(!is_valid_redirect_uri("", false));
    assert!(!is_valid_redirect_uri(&"a".repeat(3000), false));
}

#[test]
fn test_generated_secrets_are_unique() {
    let a = generate_client_secret();
    let b = generate_client_secret();
    assert_eq!(a.len(), 43);
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_authorize_issues_code_and_redirect() {
    let grants = service().await;
    let outcome = grants
        .authorize(&authorize_params(), &FixedPrincipal(Some(user())))
        .await
        .unwrap();

    let AuthorizationOutcome::Granted { code, response } = outcome else {
        panic!("expected grant");
    };
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(code.user_id, "a@b.com");
    assert_eq!(code.scope, "devices");

    let location = url::Url::parse(response.location().unwrap()).unwrap();
    assert_eq!(location.host_str(), Some("example.com"));
    let pairs: Vec<(String, String)> = location.query_pairs().into_owned().collect();
    assert!(pairs.contains(&("code".to_string(), code.code.clone())));
    assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));

    assert!(grants.storage().find_code(&code.code).await.unwrap().is_some());
}

#[tokio::test]
async fn test_authorize_explicit_denial() {
    let grants = service().await;
    let params = AuthorizeParams {
        allowed: Some("false".to_string()),
        ..authorize_params()
    };
    let outcome = grants
        .authorize(&params, &FixedPrincipal(Some(user())))
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizationOutcome::AccessDenied(_)));
}

#[tokio::test]
async fn test_authorize_without_principal_is_an_error() {
    let grants = service().await;
    let err = grants
        .authorize(&authorize_params(), &FixedPrincipal(None))
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::ServerError(_)));
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(grants.storage().find_code("anything").await.unwrap().is_none());
}

#[test]
fn test_authorize_params_prefer_body_over_query() {
    let body = AuthorizeParams {
        client_id: Some("from-body".to_string()),
        state: Some(String::new()),
        ..Default::default()
    };
    let query = AuthorizeParams {
        client_id: Some("from-query".to_string()),
        state: Some("q".to_string()),
        scope: Some("devices".to_string()),
        ..Default::default()
    };

    let merged = body.or(query);
    assert_eq!(merged.client_id.as_deref(), Some("from-body"));
    assert_eq!(merged.state.as_deref(), Some("q"));
    assert_eq!(merged.scope.as_deref(), Some("devices"));
    assert!(merged.response_type.is_none());
}

#[tokio::test]
async fn test_authorize_rejects_bad_requests() {
    let grants = service().await;
    let principal = FixedPrincipal(Some(user()));

    let err = grants
        .authorize(
            &AuthorizeParams {
                client_id: Some("unknown".to_string()),
                ..authorize_params()
            },
            &principal,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_client");

    let err = grants
        .authorize(
            &AuthorizeParams {
                redirect_uri: Some("https://evil.example/cb".to_string()),
                ..authorize_params()
            },
            &principal,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_client");

    let err = grants
        .authorize(
            &AuthorizeParams {
                state: None,
                ..authorize_params()
            },
            &principal,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_request");

    let err = grants
        .authorize(
            &AuthorizeParams {
                response_type: Some("token".to_string()),
                ..authorize_params()
            },
            &principal,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unsupported_response_type");

    let err = grants
        .authorize(
            &AuthorizeParams {
                scope: Some("admin".to_string()),
                ..authorize_params()
            },
            &principal,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_scope");
}

#[tokio::test]
async fn test_authorize_defaults_to_first_redirect_uri() {
    let grants = service().await;
    let params = AuthorizeParams {
        redirect_uri: None,
        ..authorize_params()
    };
    let outcome = grants
        .authorize(&params, &FixedPrincipal(Some(user())))
        .await
        .unwrap();
    let AuthorizationOutcome::Granted { code, .. } = outcome else {
        panic!("expected grant");
    };
    assert_eq!(code.redirect_uri, "https://example.com/cb");
}

#[tokio::test]
async fn test_authorize_requires_code_grant() {
    let grants = service_with(test_client(&[GRANT_REFRESH_TOKEN])).await;
    let err = grants
        .authorize(&authorize_params(), &FixedPrincipal(Some(user())))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unauthorized_client");
}

#[tokio::test]
async fn test_code_exchange_is_single_use() {
    let grants = service().await;
    let code = issue_code(&grants).await;

    let grant = grants.token(&code_params(&code.code), basic()).await.unwrap();
    assert_eq!(grant.token.user_id, "a@b.com");
    assert!(grant.token.refresh.is_some());

    let body = grant.response.body.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["access_token"], grant.token.access);
    assert_eq!(body["scope"], "devices");
    assert!(body["expires_in"].as_i64().unwrap() > 3500);
    assert_eq!(
        grant.response.headers.iter().find(|(n, _)| n == header::CACHE_CONTROL).map(|(_, v)| v.as_str()),
        Some("no-store")
    );

    let err = grants
        .token(&code_params(&code.code), basic())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_grant");
}

#[tokio::test]
async fn test_code_exchange_checks_redirect_uri() {
    let grants = service().await;
    let code = issue_code(&grants).await;

    let params = TokenParams {
        redirect_uri: Some("https://example.com/other".to_string()),
        ..code_params(&code.code)
    };
    let err = grants.token(&params, basic()).await.unwrap_err();
    assert_eq!(err.code(), "invalid_request");

    // A failed exchange does not consume the code
    assert!(grants.token(&code_params(&code.code), basic()).await.is_ok());
}

#[tokio::test]
async fn test_client_authentication() {
    let grants = service().await;
    let code = issue_code(&grants).await;

    let wrong = Some(ClientCredentials {
        client_id: "client-1".to_string(),
        client_secret: "nope".to_string(),
        via_basic: true,
    });
    let err = grants.token(&code_params(&code.code), wrong).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

    let err = grants.token(&code_params(&code.code), None).await.unwrap_err();
    assert_eq!(err.code(), "invalid_client");
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    // Credentials in the request body
    let params = TokenParams {
        client_id: Some("client-1".to_string()),
        client_secret: Some("secret-1".to_string()),
        ..code_params(&code.code)
    };
    assert!(grants.token(&params, None).await.is_ok());
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let grants = service().await;
    let params = TokenParams {
        grant_type: Some("password".to_string()),
        ..Default::default()
    };
    let err = grants.token(&params, basic()).await.unwrap_err();
    assert_eq!(err.code(), "unsupported_grant_type");
}

#[tokio::test]
async fn test_refresh_rotates_token_pair() {
    let grants = service().await;
    let code = issue_code(&grants).await;
    let first = grants.token(&code_params(&code.code), basic()).await.unwrap().token;
    let refresh = first.refresh.clone().unwrap();

    let params = TokenParams {
        grant_type: Some(GRANT_REFRESH_TOKEN.to_string()),
        refresh_token: Some(refresh.clone()),
        ..Default::default()
    };
    let second = grants.token(&params, basic()).await.unwrap().token;
    assert_ne!(second.access, first.access);
    assert_eq!(second.user_id, first.user_id);

    // Old refresh token and its access token are gone
    let err = grants.token(&params, basic()).await.unwrap_err();
    assert_eq!(err.code(), "invalid_grant");
    assert!(grants.authenticate(&first.access).await.is_err());
    assert!(grants.authenticate(&second.access).await.is_ok());
}

#[tokio::test]
async fn test_no_refresh_token_without_refresh_grant() {
    let grants = service_with(test_client(&[GRANT_AUTHORIZATION_CODE])).await;
    let code = issue_code(&grants).await;
    let grant = grants.token(&code_params(&code.code), basic()).await.unwrap();
    assert!(grant.token.refresh.is_none());
    assert!(grant.response.body.unwrap().get("refresh_token").is_none());
}

#[tokio::test]
async fn test_authenticate() {
    let grants = service().await;
    let code = issue_code(&grants).await;
    let token = grants.token(&code_params(&code.code), basic()).await.unwrap().token;

    let authenticated = grants.authenticate(&token.access).await.unwrap();
    assert_eq!(authenticated.user.username, "a@b.com");
    assert_eq!(authenticated.token.id, token.id);

    let err = grants.authenticate("bogus").await.unwrap_err();
    assert_eq!(err.code(), "invalid_token");
}

#[tokio::test]
async fn test_session_principal_requires_matching_hash() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage.upsert_user(&user()).await.unwrap();

    let matching = SessionPrincipal::new(
        storage.clone(),
        Some(SessionUser {
            username: "a@b.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            security_token: "tok".to_string(),
        }),
    );
    assert!(matching.resolve().await.unwrap().is_some());

    let stale = SessionPrincipal::new(
        storage.clone(),
        Some(SessionUser {
            username: "a@b.com".to_string(),
            password_hash: "$2b$04$other".to_string(),
            security_token: "tok".to_string(),
        }),
    );
    assert!(stale.resolve().await.unwrap().is_none());

    let anonymous = SessionPrincipal::new(storage, None);
    assert!(anonymous.resolve().await.unwrap().is_none());
}

#[test]
fn test_parse_basic_auth() {
    let mut headers = HeaderMap::new();
    assert_eq!(parse_basic_auth(&headers).unwrap(), None);

    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_static("Basic Y2xpZW50LTE6c2VjcmV0LTE="),
    );
    let credentials = parse_basic_auth(&headers).unwrap().unwrap();
    assert_eq!(credentials.client_id, "client-1");
    assert_eq!(credentials.client_secret, "secret-1");
    assert!(credentials.via_basic);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
    assert_eq!(parse_basic_auth(&headers).unwrap_err().code(), "invalid_client");
}

#[tokio::test]
async fn test_register_client() {
    let storage = MemoryStorage::new();
    let client = register_client(
        &storage,
        "Assistant",
        vec!["https://example.com/cb".to_string()],
        "devices",
        vec![],
    )
    .await
    .unwrap();
    assert!(client.allows_grant(GRANT_AUTHORIZATION_CODE));
    assert!(client.allows_grant(GRANT_REFRESH_TOKEN));
    assert!(storage.find_client(&client.id).await.unwrap().is_some());

    let err = register_client(
        &storage,
        "Bad",
        vec!["http://example.com/cb".to_string()],
        "",
        vec![],
    )
    .await;
    assert!(err.is_err());
}
