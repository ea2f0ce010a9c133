mod common;

use std::time::Duration;

use mount_proxy::forward::ForwardSpec;
use mount_proxy::routing::{MatchOptions, RouteTable};
use reqwest::StatusCode;
use serde_json::Value;

fn single_route(target: String, timeout_ms: u64) -> RouteTable {
    let mut routes = RouteTable::new();
    routes
        .register(
            "api",
            "/api",
            MatchOptions::default(),
            ForwardSpec::new(target).timeout_ms(timeout_ms),
        )
        .unwrap();
    routes
}

#[tokio::test]
async fn test_connection_refused_is_503() {
    let dead = common::refused_addr().await;
    let proxy = common::start_proxy(single_route(format!("http://{dead}"), 0)).await;

    let res = common::client().get(proxy.url("/api/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/json"
    );

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ECONNREFUSED");
    assert!(body["message"].as_str().unwrap().len() > 0);

    proxy.wait_idle().await;
    let stats = proxy.engine.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 0);
}

#[tokio::test]
async fn test_engine_timeout_is_504_plain_text() {
    let silent = common::start_silent_backend().await;
    let proxy = common::start_proxy(single_route(format!("http://{silent}"), 100)).await;

    let started = std::time::Instant::now();
    let res = common::client().get(proxy.url("/api/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(res
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(res.text().await.unwrap(), "Socket timeout, timeout: 100ms");

    proxy.wait_idle().await;
    let stats = proxy.engine.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.completed(), 1);
}

#[tokio::test]
async fn test_late_upstream_response_is_not_delivered() {
    let slow = common::start_delayed_backend(Duration::from_millis(300), "too late").await;
    let proxy = common::start_proxy(single_route(format!("http://{slow}"), 100)).await;

    let res = common::client().get(proxy.url("/api/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = res.text().await.unwrap();
    assert!(!body.contains("too late"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = proxy.engine.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn test_zero_timeout_never_times_out() {
    let slow = common::start_delayed_backend(Duration::from_millis(250), "eventually").await;
    let proxy = common::start_proxy(single_route(format!("http://{slow}"), 0)).await;

    let res = common::client().get(proxy.url("/api/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "eventually");

    proxy.wait_idle().await;
    assert_eq!(proxy.engine.stats().timed_out, 0);
    assert_eq!(proxy.engine.stats().succeeded, 1);
}

#[tokio::test]
async fn test_upstream_closing_connection_is_502() {
    let closing = common::start_closing_backend().await;
    let proxy = common::start_proxy(single_route(format!("http://{closing}"), 0)).await;

    let res = common::client().get(proxy.url("/api/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ECONNRESET");
}

#[tokio::test]
async fn test_unresolvable_host_is_502() {
    let proxy = common::start_proxy(single_route("http://upstream.invalid:80".into(), 5_000)).await;

    let res = common::client().get(proxy.url("/api/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "ENOTFOUND");
}

#[tokio::test]
async fn test_proxy_timeout_option_is_transport_timeout() {
    let silent = common::start_silent_backend().await;
    let mut routes = RouteTable::new();
    routes
        .register(
            "api",
            "/api",
            MatchOptions::default(),
            ForwardSpec::new(format!("http://{silent}")).transport(
                mount_proxy::forward::TransportOptions {
                    proxy_timeout_ms: 100,
                    ..Default::default()
                },
            ),
        )
        .unwrap();
    let proxy = common::start_proxy(routes).await;

    let res = common::client().get(proxy.url("/api/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "ETIMEDOUT");

    proxy.wait_idle().await;
    assert_eq!(proxy.engine.stats().failed, 1);
    assert_eq!(proxy.engine.stats().timed_out, 0);
}
