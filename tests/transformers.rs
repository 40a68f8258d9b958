//! Request and response transformers through a live gateway.

use axum::http::StatusCode;
use serde_json::{json, Value};

use edge_gateway::gateway::Gateway;
use edge_gateway::routing::{Origin, PathMode, Route, RouteTable};
use edge_gateway::transform::json::JsonObjectModifier;
use edge_gateway::transform::{transformer_fn, Flow, Phase, TerminalResponse};

mod common;

#[tokio::test]
async fn test_configured_request_and_response_transformers() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(&format!(
        r#"
        [[routes]]
        path = "/users/{{id}}"
        mode = "params"
        origin_id = "echo"
        origin = "http://{backend}/u/{{id}}"

        [[routes.request_transformers]]
        type = "add_header"
        name = "x-gateway"
        value = "edge"

        [[routes.request_transformers]]
        type = "remove_headers"
        names = ["x-secret"]

        [[routes.request_transformers]]
        type = "add_query_param"
        key = "source"
        values = ["gw"]

        [[routes.request_transformers]]
        type = "method"
        method = "PUT"

        [[routes.response_transformers]]
        type = "add_header"
        name = "x-served-by"
        value = "edge"
        "#
    ))
    .await;

    let response = common::client()
        .get(gateway.url("/users/42?x=1"))
        .header("x-secret", "hunter2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-by"], "edge");

    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["method"], "PUT");
    assert_eq!(echoed["uri"], "/u/42?x=1&source=gw");
    assert_eq!(echoed["headers"]["x-gateway"], "edge");
    assert!(echoed["headers"].get("x-secret").is_none());
}

#[tokio::test]
async fn test_content_length_limit_short_circuits() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(&format!(
        r#"
        [[routes]]
        path = "/upload"
        origin_id = "echo"
        origin = "http://{backend}/"

        [[routes.request_transformers]]
        type = "content_length_limit"
        limit = 8
        "#
    ))
    .await;
    let client = common::client();

    let response = client
        .post(gateway.url("/upload"))
        .body("0123456789")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        response.text().await.unwrap(),
        "Request content length 10 exceeds the limit of 8"
    );

    let response = client
        .post(gateway.url("/upload"))
        .body("small")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_static_json_response_body() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(&format!(
        r#"
        [[routes]]
        path = "/status"
        origin_id = "echo"
        origin = "http://{backend}/"

        [[routes.response_transformers]]
        type = "json_body"
        body = {{ status = "replaced" }}
        "#
    ))
    .await;

    let response = common::client().get(gateway.url("/status")).send().await.unwrap();
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "replaced"}));
}

#[tokio::test]
async fn test_json_request_modifier() {
    let backend = common::start_echo_backend().await;
    let origin = Origin::of("echo", &format!("http://{backend}/")).unwrap();
    let route = Route::new("/orders", origin, PathMode::Fixed).add_request_transformer(
        JsonObjectModifier::dynamic(Phase::Request, |mut order| {
            order.insert("channel".to_string(), json!("gateway"));
            Some(order)
        }),
    );
    let gateway =
        common::start_gateway_with(Gateway::with_table(RouteTable::new([route]).unwrap())).await;
    let client = common::client();

    let response = client
        .post(gateway.url("/orders"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().starts_with("Invalid JSON body"));

    let echoed: Value = client
        .post(gateway.url("/orders"))
        .json(&json!({"item": "book"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let forwarded: Value = serde_json::from_str(echoed["body"].as_str().unwrap()).unwrap();
    assert_eq!(forwarded, json!({"item": "book", "channel": "gateway"}));
}

#[tokio::test]
async fn test_response_transformer_replaces_upstream_error() {
    let backend = common::start_programmable_backend(|| async { (500, "stack trace".to_string()) }).await;
    let origin = Origin::of("flaky", &format!("http://{backend}/")).unwrap();
    let route = Route::new("/flaky", origin, PathMode::Fixed).add_response_transformer(
        transformer_fn("mask-server-errors", |ctx| {
            let failed = ctx
                .response
                .as_ref()
                .is_some_and(|r| r.status.is_server_error());
            if failed {
                Ok(TerminalResponse::new(StatusCode::SERVICE_UNAVAILABLE)
                    .message("temporarily unavailable")
                    .respond())
            } else {
                Ok(Flow::Continue)
            }
        }),
    );
    let gateway =
        common::start_gateway_with(Gateway::with_table(RouteTable::new([route]).unwrap())).await;

    let response = common::client().get(gateway.url("/flaky")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "temporarily unavailable");
}
