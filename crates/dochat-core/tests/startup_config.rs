//! Startup configuration fetch against a mock app origin.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dochat_core::config::load_startup_config;

#[tokio::test]
async fn test_load_startup_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "websocketUrl": "wss://ws.example/prod",
            "cloudfrontDomain": "cdn.example"
        })))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let config = load_startup_config(&http, &server.uri()).await.unwrap();
    assert_eq!(config.websocket_url, "wss://ws.example/prod");
    assert_eq!(
        config.resolve_document_url("s3://bucket/key.pdf"),
        "https://cdn.example/key.pdf"
    );
}

#[tokio::test]
async fn test_missing_config_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let err = load_startup_config(&http, &server.uri()).await.unwrap_err();
    assert!(err.to_string().contains("startup config request failed"));
}

#[tokio::test]
async fn test_malformed_config_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    assert!(load_startup_config(&http, &server.uri()).await.is_err());
}
