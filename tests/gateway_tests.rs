//! HTTP gateway client against a wiremock server.

use campaigns::config::GatewayConfig;
use campaigns::gateway::{GatewayError, HttpGateway, MessageGateway, OutboundMessage, SendOutcome};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "gateway-secret";

fn config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: Some(base_url.to_string()),
        api_token: Some(TOKEN.to_string()),
        ..GatewayConfig::default()
    }
}

fn message() -> OutboundMessage {
    OutboundMessage {
        number: "+6281234567890".to_string(),
        message: "Promo starts today".to_string(),
    }
}

#[tokio::test]
async fn sends_bearer_token_and_json_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/message/send-text"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "number": "+6281234567890",
            "message": "Promo starts today"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    // Trailing slash on the base URL must not produce a double slash.
    let gateway = HttpGateway::new(&config(&format!("{}/", server.uri()))).unwrap();
    let outcome = gateway.send_text(&message()).await.unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(outcome.status(), 200);
}

#[tokio::test]
async fn server_error_is_a_rejection_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&config(&server.uri())).unwrap();
    let outcome = gateway.send_text(&message()).await.unwrap();

    assert_eq!(
        outcome,
        SendOutcome::Rejected {
            status: 500,
            body: "upstream exploded".to_string()
        }
    );
}

#[tokio::test]
async fn success_false_is_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "message": "number not on whatsapp" })),
        )
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&config(&server.uri())).unwrap();
    let outcome = gateway.send_text(&message()).await.unwrap();

    assert!(!outcome.is_accepted());
    assert_eq!(outcome.status(), 200);
}

#[tokio::test]
async fn custom_send_path_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/send"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&GatewayConfig {
        send_path: "v2/send".to_string(),
        ..config(&server.uri())
    })
    .unwrap();

    assert!(gateway.send_text(&message()).await.unwrap().is_accepted());
}

#[tokio::test]
async fn slow_gateway_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let gateway = HttpGateway::new(&GatewayConfig {
        timeout_ms: 50,
        ..config(&server.uri())
    })
    .unwrap();

    let err = gateway.send_text(&message()).await.unwrap_err();
    assert_eq!(err, GatewayError::Timeout(50));
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    // Reserve a free port, then close it so nothing is listening there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = HttpGateway::new(&config(&format!("http://{addr}"))).unwrap();
    let err = gateway.send_text(&message()).await.unwrap_err();

    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let server = MockServer::start().await;

    let gateway = HttpGateway::new(&GatewayConfig {
        api_token: Some("   ".to_string()),
        ..config(&server.uri())
    })
    .unwrap();

    assert!(matches!(
        gateway.ensure_configured(),
        Err(GatewayError::Misconfigured(_))
    ));
    assert!(matches!(
        gateway.send_text(&message()).await,
        Err(GatewayError::Misconfigured(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}
