//! Integration tests for Prometheus HTTP service discovery.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use serde_json::{Value, json};

async fn register(server: &TestServer, selectors: Value, targets: Value) -> Vec<i64> {
    let (status, body) = server
        .request(
            "PUT",
            "/v1/targets",
            Some(json!({ "selectors": selectors, "targets": targets })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    body["target_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect()
}

async fn discover(server: &TestServer, key: &str, value: &str) -> Vec<Value> {
    let (status, body) = server
        .request("GET", &format!("/v1/targets/selector/{key}/{value}"), None)
        .await;
    assert_eq!(status, StatusCode::OK, "discovery failed: {body}");
    body.as_array().unwrap().clone()
}

#[tokio::test]
async fn test_plain_targets_are_scraped_directly() {
    let server = TestServer::new().await;
    register(
        &server,
        json!({ "job": "node" }),
        json!([{
            "address": "10.0.0.5:9100",
            "scrape_interval": 60,
            "scrape_timeout": 20,
            "labels": { "env": "prod" }
        }]),
    )
    .await;

    let groups = discover(&server, "job", "node").await;
    assert_eq!(
        groups,
        vec![json!({
            "targets": ["10.0.0.5:9100"],
            "labels": {
                "instance": "10.0.0.5:9100",
                "__scrape_interval__": "60s",
                "__scrape_timeout__": "20s",
                "__metrics_path__": "/metrics",
                "__scheme__": "http",
                "env": "prod"
            }
        })]
    );
}

#[tokio::test]
async fn test_bearer_target_is_indirected_through_proxy() {
    let server = TestServer::new().await;
    register(
        &server,
        json!({ "job": "secure" }),
        json!([{ "address": "10.0.0.5:9100", "auth": { "bearer_token": "abc" } }]),
    )
    .await;

    let groups = discover(&server, "job", "secure").await;
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group["targets"], json!(["127.0.0.1:8080"]));
    let labels = &group["labels"];
    assert_eq!(labels["instance"], "10.0.0.5:9100");
    assert_eq!(labels["__metrics_path__"], "/v1/proxy");
    assert_eq!(labels["__scheme__"], "http");
    assert_eq!(labels["__param_host"], "10.0.0.5");
    assert_eq!(labels["__param_port"], "9100");
    assert_eq!(labels["__param_path"], "/metrics");
    assert_eq!(labels["__param_schema"], "http");
    assert_eq!(labels["__param_bearer"], "abc");
    assert!(labels.get("__param_base").is_none());
}

#[tokio::test]
async fn test_basic_auth_uses_configured_proxy_address() {
    let server = TestServer::with_config(|config| {
        config.proxy.address = "https://scrape-proxy.example.com/ph/v1/proxy".to_string();
    })
    .await;
    register(
        &server,
        json!({ "job": "db" }),
        json!([{ "address": "https://db.internal", "auth": { "base": "user:pass" } }]),
    )
    .await;

    let groups = discover(&server, "job", "db").await;
    let group = &groups[0];
    assert_eq!(group["targets"], json!(["scrape-proxy.example.com:443"]));
    let labels = &group["labels"];
    assert_eq!(labels["__scheme__"], "https");
    assert_eq!(labels["__metrics_path__"], "/ph/v1/proxy");
    assert_eq!(labels["__param_host"], "db.internal");
    assert_eq!(labels["__param_port"], "443");
    assert_eq!(labels["__param_schema"], "https");
    assert_eq!(labels["__param_base"], "dXNlcjpwYXNz");
}

#[tokio::test]
async fn test_params_and_blackbox_target() {
    let server = TestServer::new().await;
    register(
        &server,
        json!({ "job": "blackbox" }),
        json!([{
            "address": "blackbox-exporter:9115",
            "metric_path": "/probe",
            "params": { "module": "http_2xx", "target": "https://example.com" }
        }]),
    )
    .await;

    let groups = discover(&server, "job", "blackbox").await;
    let labels = &groups[0]["labels"];
    assert_eq!(groups[0]["targets"], json!(["blackbox-exporter:9115"]));
    assert_eq!(labels["__metrics_path__"], "/probe");
    assert_eq!(labels["__param_module"], "http_2xx");
    assert_eq!(labels["__param_target"], "https://example.com");
    assert_eq!(labels["instance"], "https://example.com");
}

#[tokio::test]
async fn test_deleted_targets_are_not_discovered() {
    let server = TestServer::new().await;
    let ids = register(
        &server,
        json!({ "job": "node" }),
        json!([{ "address": "a:9100" }, { "address": "b:9100" }]),
    )
    .await;

    let (status, _) = server
        .request("DELETE", &format!("/v1/targets/{}", ids[0]), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let groups = discover(&server, "job", "node").await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["targets"], json!(["b:9100"]));
}

#[tokio::test]
async fn test_unknown_selector_is_empty() {
    let server = TestServer::new().await;
    assert!(discover(&server, "job", "nothing").await.is_empty());
}

#[tokio::test]
async fn test_rows_with_same_fingerprint_collapse_into_one_group() {
    let server = TestServer::new().await;
    let first = register(
        &server,
        json!({ "job": "node", "team": "infra" }),
        json!([{ "address": "10.0.0.5:9100", "labels": { "owner": "alice" } }]),
    )
    .await[0];
    let second = register(
        &server,
        json!({ "team": "infra" }),
        json!([{ "address": "10.0.0.6:9100", "labels": { "owner": "bob", "rack": "r2" } }]),
    )
    .await[0];
    assert_ne!(first, second);

    // Moving the second row onto the first's address gives both the same fingerprint
    let (status, _) = server
        .request(
            "POST",
            &format!("/v1/targets/{second}"),
            Some(json!({ "address": "10.0.0.5:9100" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let groups = discover(&server, "team", "infra").await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["targets"], json!(["10.0.0.5:9100"]));
    assert_eq!(groups[0]["labels"]["owner"], "bob");
    assert_eq!(groups[0]["labels"]["rack"], "r2");

    let (_, inventory) = server
        .request("GET", "/v1/targets/inventory/team/infra", None)
        .await;
    let inventory = inventory.as_array().unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0]["id"].as_i64().unwrap(), first);
}

#[tokio::test]
async fn test_mixed_credential_rows_yield_a_consistent_group() {
    let server = TestServer::new().await;
    register(
        &server,
        json!({ "team": "infra" }),
        json!([{ "address": "10.0.0.5:9100", "scrape_interval": 30 }]),
    )
    .await;
    register(
        &server,
        json!({ "team": "infra" }),
        json!([{
            "address": "10.0.0.5:9100",
            "scrape_interval": 60,
            "auth": { "bearer_token": "abc" }
        }]),
    )
    .await;

    let groups = discover(&server, "team", "infra").await;
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    let labels = &group["labels"];
    assert_eq!(group["targets"], json!(["127.0.0.1:8080"]));
    assert_eq!(labels["__metrics_path__"], "/v1/proxy");
    assert_eq!(labels["__param_host"], "10.0.0.5");
    assert_eq!(labels["__param_bearer"], "abc");
    assert_eq!(labels["__scrape_interval__"], "60s");
}

#[tokio::test]
async fn test_invalid_selector_path_is_rejected() {
    let server = TestServer::new().await;
    let long = "v".repeat(300);
    let (status, body) = server
        .request("GET", &format!("/v1/targets/selector/job/{long}"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}
