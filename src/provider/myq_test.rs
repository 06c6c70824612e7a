use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> MyqClient {
    let config = ProviderConfig {
        base_url: server.uri(),
        application_id: "test-app".to_string(),
        timeout_secs: 5,
        ..Default::default()
    };
    MyqClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_login_success_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(header(MYQ_APPLICATION_ID_HEADER, "test-app"))
        .and(body_json(json!({ "username": "a@b.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ReturnCode": "0",
            "SecurityToken": "sec-123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).login("a@b.com", "pw").await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.token.as_deref(), Some("sec-123"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ReturnCode": "203",
            "ErrorMessage": "The username or password you entered is incorrect."
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).login("a@b.com", "bad").await.unwrap();
    assert_eq!(result.return_code, 14);
    assert_eq!(
        result.error.as_deref(),
        Some("Email and/or password are incorrect.")
    );
    assert!(result.token.is_none());
}

#[tokio::test]
async fn test_login_lockout_codes() {
    for (raw, expected) in [("205", 16), ("207", 17)] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ReturnCode": raw })),
            )
            .mount(&server)
            .await;

        let result = client_for(&server).login("a@b.com", "pw").await.unwrap();
        assert_eq!(result.return_code, expected);
    }
}

#[tokio::test]
async fn test_server_error_is_service_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client_for(&server).login("a@b.com", "pw").await.unwrap();
    assert_eq!(result.return_code, 12);
}

#[tokio::test]
async fn test_unreachable_service_is_service_down() {
    let config = ProviderConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..Default::default()
    };
    let client = MyqClient::new(&config).unwrap();

    let result = client.login("a@b.com", "pw").await.unwrap();
    assert_eq!(result.return_code, 12);
}

#[tokio::test]
async fn test_unparseable_body_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client_for(&server).login("a@b.com", "pw").await.unwrap();
    assert_eq!(result.return_code, 11);
}

#[tokio::test]
async fn test_get_devices_filters_and_maps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DEVICES_PATH))
        .and(header(MYQ_SECURITY_TOKEN_HEADER, "sec-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ReturnCode": "0",
            "Devices": [
                {
                    "MyQDeviceId": 101,
                    "MyQDeviceTypeId": 2,
                    "MyQDeviceTypeName": "GarageDoorOpener",
                    "Attributes": [
                        { "AttributeDisplayName": "desc", "Value": "Garage" },
                        { "AttributeDisplayName": "doorstate", "Value": "2" }
                    ]
                },
                {
                    "MyQDeviceId": 102,
                    "MyQDeviceTypeId": 1,
                    "MyQDeviceTypeName": "Gateway",
                    "Attributes": []
                },
                {
                    "MyQDeviceId": 103,
                    "MyQDeviceTypeId": 3,
                    "MyQDeviceTypeName": "LampModule",
                    "Attributes": [
                        { "AttributeDisplayName": "desc", "Value": "Porch" },
                        { "AttributeDisplayName": "lightstate", "Value": "1" }
                    ]
                }
            ]
        })))
        .mount(&server)
        .await;

    let session = client_for(&server).session("sec-123");
    let result = session.get_devices(&DEVICE_TYPE_IDS).await.unwrap();
    assert!(result.is_success());

    let devices = result.fields["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(
        devices[0],
        json!({
            "id": 101,
            "typeId": 2,
            "typeName": "GarageDoorOpener",
            "name": "Garage",
            "doorState": 2
        })
    );
    assert_eq!(devices[1]["lightState"], 1);
    assert!(devices[1].get("doorState").is_none());
}

#[tokio::test]
async fn test_get_door_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GET_ATTRIBUTE_PATH))
        .and(query_param("MyQDeviceId", "101"))
        .and(query_param("AttributeName", "doorstate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ReturnCode": "0",
            "AttributeValue": "1"
        })))
        .mount(&server)
        .await;

    let session = client_for(&server).session("sec-123");
    let result = session.get_door_state(Some("101")).await.unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json, json!({ "returnCode": 0, "doorState": 1 }));
}

#[tokio::test]
async fn test_missing_parameters_are_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = client_for(&server).session("sec-123");

    let result = session.get_door_state(None).await.unwrap();
    assert_eq!(result.return_code, 15);

    let result = session.set_door_state(Some("101"), None).await.unwrap();
    assert_eq!(result.return_code, 15);

    let result = session.set_light_state(Some("103"), None).await.unwrap();
    assert_eq!(result.return_code, 15);

    let result = session.set_door_state(Some("101"), Some("open")).await.unwrap();
    assert_eq!(result.return_code, 15);
}

#[tokio::test]
async fn test_set_light_state() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(PUT_ATTRIBUTE_PATH))
        .and(header(MYQ_SECURITY_TOKEN_HEADER, "sec-123"))
        .and(body_json(json!({
            "MyQDeviceId": "103",
            "AttributeName": "desiredlightstate",
            "AttributeValue": "1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ReturnCode": "0" })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client_for(&server).session("sec-123");
    let result = session.set_light_state(Some("103"), Some("1")).await.unwrap();
    assert_eq!(serde_json::to_value(&result).unwrap(), json!({ "returnCode": 0 }));
}

#[tokio::test]
async fn test_expired_security_token_is_not_logged_in() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(PUT_ATTRIBUTE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ReturnCode": "-3333" })),
        )
        .mount(&server)
        .await;

    let session = client_for(&server).session("stale");
    let result = session.set_door_state(Some("101"), Some("0")).await.unwrap();
    assert_eq!(result.return_code, 13);
    assert_eq!(result.fields["error"], "User not logged in.");
}
