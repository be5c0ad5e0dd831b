// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `api.rs`

use super::*;
use crate::config_store::{ConfigStore, MemoryConfigStore};
use crate::discovery::DiscoveryConfig;
use crate::dns::StaticResolver;
use crate::provider::{registry_name, RegistryWebsiteProvider};
use crate::registry::MemoryServiceRegistry;
use crate::synthesizer::{RouteSynthesizer, RoutingKeys};
use crate::validator::{OwnershipValidator, ValidatorConfig};
use axum::body::{to_bytes, Body};
use axum::http::Request;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApi {
    dir: TempDir,
    store: Arc<MemoryConfigStore>,
    registry: Arc<MemoryServiceRegistry>,
    context: Arc<Context>,
}

impl TestApi {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("home");
        std::fs::create_dir(&root).unwrap();

        let addr = "192.0.2.10".parse().unwrap();
        let resolver = StaticResolver::new()
            .with_host("alice.netsoc.co", &[addr])
            .with_host("bob.netsoc.co", &[addr])
            .with_host("blog.alice-site.com", &[addr])
            .with_txt("_homesite.alice-site.com", &["alice"]);
        let validator = OwnershipValidator::new(
            Arc::new(resolver),
            ValidatorConfig::new("netsoc.co", "_homesite"),
        );
        let store = Arc::new(MemoryConfigStore::new());
        let registry = Arc::new(MemoryServiceRegistry::new());
        let provider = Arc::new(RegistryWebsiteProvider::new(registry.clone(), "10.0.0.5", 80));

        let context = Arc::new(Context::new(
            validator,
            DiscoveryConfig {
                home_dirs_root: root.clone(),
                ..DiscoveryConfig::default()
            },
            provider,
            RouteSynthesizer::new(store.clone()),
            std::fs::canonicalize(&root).unwrap(),
            "http://webserver:8080",
        ));

        Self {
            dir,
            store,
            registry,
            context,
        }
    }

    fn site(&self, user: &str, name: &str) -> PathBuf {
        let site = self.dir.path().join("home").join(user).join("www").join(name);
        std::fs::create_dir_all(&site).unwrap();
        site
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(self.context.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.call(request).await
    }
}

#[tokio::test]
async fn test_healthz() {
    let api = TestApi::new();

    let response = router(api.context.clone())
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let api = TestApi::new();
    metrics::record_synthesis(true);

    let response = router(api.context.clone())
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("homesite_synthesis_total"));
}

#[tokio::test]
async fn test_list_websites() {
    let api = TestApi::new();
    api.site("alice", "alice.netsoc.co");
    api.site("bob", "alice.netsoc.co");

    let (status, body) = api.get("/v1/websites").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"].as_array().unwrap().len(), 1);
    assert_eq!(body["valid"][0]["user"], "alice");
    assert_eq!(body["invalid"][0]["user"], "bob");
    assert_eq!(body["invalid"][0]["reason"]["reason"], "SubdomainUserMismatch");
}

#[tokio::test]
async fn test_user_websites_missing_user() {
    let api = TestApi::new();

    let (status, body) = api.get("/v1/websites/nobody").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"]["reason"], "WwwDirMissing");
}

#[tokio::test]
async fn test_publish_website() {
    let api = TestApi::new();
    api.site("alice", "alice.netsoc.co");

    let (status, body) = api
        .post(
            "/v1/websites",
            json!({"user": "alice", "host": "alice.netsoc.co"}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"], "alice");
    assert_eq!(
        api.registry.names().await,
        vec![registry_name("alice.netsoc.co")]
    );
    let keys = RoutingKeys::for_host("alice.netsoc.co");
    assert_eq!(
        api.store.get_kv(&keys.prefix_key()).await.unwrap().as_deref(),
        Some("/alice/www/alice.netsoc.co")
    );
}

#[tokio::test]
async fn test_publish_invalid_host_reports_reason() {
    let api = TestApi::new();
    api.site("bob", "alice.netsoc.co");

    let (status, body) = api
        .post("/v1/websites", json!({"user": "bob", "host": "alice.netsoc.co"}))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"]["reason"], "SubdomainUserMismatch");
    assert!(api.registry.names().await.is_empty());
}

#[tokio::test]
async fn test_publish_unknown_host() {
    let api = TestApi::new();
    api.site("alice", "alice.netsoc.co");

    let (status, body) = api
        .post("/v1/websites", json!({"user": "alice", "host": "other.netsoc.co"}))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"]["reason"], "NotFound");
}

#[tokio::test]
async fn test_registration_lifecycle() {
    let api = TestApi::new();
    api.site("alice", "alice.netsoc.co");
    api.post("/v1/websites", json!({"user": "alice", "host": "alice.netsoc.co"}))
        .await;

    let (status, body) = api.get("/v1/registrations/alice.netsoc.co").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"], "alice");

    let request = Request::delete("/v1/registrations/alice.netsoc.co")
        .body(Body::empty())
        .unwrap();
    let (status, _) = api.call(request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = api.get("/v1/registrations/alice.netsoc.co").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"]["reason"], "NotFound");
}

#[tokio::test]
async fn test_route_virtual_host() {
    let api = TestApi::new();

    let (status, body) = api
        .post(
            "/v1/virtual-hosts",
            json!({
                "user": "alice",
                "host": "blog.alice-site.com",
                "path_prefix": "/alice/www/blog",
                "additional_request_headers": {"X-Homesite-User": "alice"}
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let keys = RoutingKeys::for_host("blog.alice-site.com");
    assert_eq!(body["router"], keys.router);
    assert_eq!(
        api.store.get_kv(&keys.service_url_key()).await.unwrap().as_deref(),
        Some("http://webserver:8080")
    );
    assert_eq!(api.store.snapshot().await.len(), 6);
}

#[tokio::test]
async fn test_route_virtual_host_rejects_foreign_domain() {
    let api = TestApi::new();

    let (status, body) = api
        .post(
            "/v1/virtual-hosts",
            json!({"user": "bob", "host": "blog.alice-site.com", "path_prefix": "/bob"}),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"]["reason"], "OwnershipProofMissing");
    assert!(api.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_route_virtual_host_rejects_relative_prefix() {
    let api = TestApi::new();

    let (status, body) = api
        .post(
            "/v1/virtual-hosts",
            json!({"user": "alice", "host": "alice.netsoc.co", "path_prefix": "alice"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"]["reason"], "BadRequest");
}

#[tokio::test]
async fn test_route_virtual_host_rejects_header_with_path_separator() {
    let api = TestApi::new();

    let (status, body) = api
        .post(
            "/v1/virtual-hosts",
            json!({
                "user": "alice",
                "host": "alice.netsoc.co",
                "path_prefix": "/alice",
                "additional_request_headers": {
                    "../../../routers/homesite-router-victim/rule": "Host(`alice.netsoc.co`)"
                }
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"]["reason"], "BadRequest");
    assert!(api.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_route_virtual_host_rejects_dot_segment_header() {
    let api = TestApi::new();

    let (status, body) = api
        .post(
            "/v1/virtual-hosts",
            json!({
                "user": "alice",
                "host": "alice.netsoc.co",
                "path_prefix": "/alice",
                "additional_request_headers": {"..": "x"}
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"]["reason"], "InvalidKey");
    assert!(api.store.snapshot().await.is_empty());
}
