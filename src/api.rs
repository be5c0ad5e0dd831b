// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP API.
//!
//! | Method | Path | Action |
//! |--------|------|--------|
//! | `GET` | `/healthz` | liveness |
//! | `GET` | `/metrics` | prometheus metrics |
//! | `GET` | `/v1/websites` | discovery pass over every user |
//! | `GET` | `/v1/websites/{user}` | discovery pass over one user |
//! | `POST` | `/v1/websites` | publish the website serving a host |
//! | `GET` | `/v1/registrations/{host}` | registered website of a host |
//! | `DELETE` | `/v1/registrations/{host}` | deregister a host |
//! | `POST` | `/v1/virtual-hosts` | validate and route a single host |
//!
//! Errors use the envelope described in [`crate::http_errors`].

use anyhow::{Context as _, Result};
use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::constants::METRICS_SERVER_PATH;
use crate::context::Context;
use crate::discovery::DiscoveryReport;
use crate::http_errors::ApiError;
use crate::metrics;
use crate::models::{VirtualHostIntent, Website};

/// Body of `POST /v1/websites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Owner of the website
    pub user: String,
    /// Any host served by the website
    pub host: String,
}

/// Body of `POST /v1/virtual-hosts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHostRequest {
    /// Claiming user
    pub user: String,
    /// Host to route
    pub host: String,
    /// Path prefixed to every forwarded request
    pub path_prefix: String,
    /// Headers injected into forwarded requests
    #[serde(default)]
    pub additional_request_headers: BTreeMap<String, String>,
}

/// Resources written for a routed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// The routed host
    pub host: String,
    /// Router resource name
    pub router: String,
    /// Service resource name
    pub service: String,
}

/// Build the API router.
pub fn router(context: Arc<Context>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(METRICS_SERVER_PATH, get(metrics_text))
        .route("/v1/websites", get(list_websites).post(publish_website))
        .route("/v1/websites/{user}", get(user_websites))
        .route(
            "/v1/registrations/{host}",
            get(read_registration).delete(delete_registration),
        )
        .route("/v1/virtual-hosts", post(route_virtual_host))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// Serve the API on `listener` until `shutdown` turns true.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    context: Arc<Context>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let address = listener.local_addr().context("Listener has no local address")?;
    info!(address = %address, "Starting HTTP API");

    axum::serve(listener, router(context))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("HTTP API server failed")?;

    info!("HTTP API stopped");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_text() -> Result<impl IntoResponse, ApiError> {
    let body = metrics::gather_metrics()
        .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

async fn list_websites(State(context): State<Arc<Context>>) -> Result<Json<DiscoveryReport>, ApiError> {
    Ok(Json(context.discovery.list().await?))
}

async fn user_websites(
    State(context): State<Arc<Context>>,
    Path(user): Path<String>,
) -> Result<Json<DiscoveryReport>, ApiError> {
    Ok(Json(context.discovery.by_user(&user).await?))
}

/// Discover `user`'s websites and publish the one serving `host`.
async fn publish_website(
    State(context): State<Arc<Context>>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<Website>), ApiError> {
    let report = context.discovery.by_user(&request.user).await?;

    if let Some(invalid) = report.invalid_for_host(&request.host) {
        return Err(invalid.reason.clone().into());
    }
    let website = report.website_for_host(&request.host).ok_or_else(|| {
        ApiError::not_found(format!(
            "User '{}' has no website serving {}",
            request.user, request.host
        ))
    })?;

    let published = publish(&context, website).await;
    metrics::record_website_operation("create", published.is_ok());
    published?;

    info!(user = %website.user, host = %request.host, root = ?website.root, "Published website");
    Ok((StatusCode::CREATED, Json(website.clone())))
}

async fn publish(context: &Context, website: &Website) -> Result<(), ApiError> {
    context.provider.create(website).await?;
    for host in &website.hosts {
        context
            .synthesizer
            .synthesize(&context.intent_for(host, website))
            .await?;
    }
    Ok(())
}

async fn read_registration(
    State(context): State<Arc<Context>>,
    Path(host): Path<String>,
) -> Result<Json<Website>, ApiError> {
    context
        .provider
        .read(&host)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No website is registered for {host}")))
}

async fn delete_registration(
    State(context): State<Arc<Context>>,
    Path(host): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = context.provider.delete(&host).await;
    metrics::record_website_operation("delete", deleted.is_ok());
    deleted?;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate ownership of a single host and write its routing configuration.
async fn route_virtual_host(
    State(context): State<Arc<Context>>,
    Json(request): Json<VirtualHostRequest>,
) -> Result<(StatusCode, Json<RouteResponse>), ApiError> {
    if !request.path_prefix.starts_with('/') {
        return Err(ApiError::bad_request(format!(
            "Path prefix '{}' must start with '/'",
            request.path_prefix
        )));
    }
    if let Some(name) = request
        .additional_request_headers
        .keys()
        .find(|name| HeaderName::from_bytes(name.as_bytes()).is_err())
    {
        return Err(ApiError::bad_request(format!(
            "'{name}' is not a valid HTTP header name"
        )));
    }

    context.validator.validate(&request.host, &request.user).await?;

    let intent = VirtualHostIntent {
        host: request.host,
        path_prefix: request.path_prefix,
        destination_server: context.destination_server.clone(),
        additional_request_headers: request.additional_request_headers,
    };
    let keys = context.synthesizer.synthesize(&intent).await?;

    Ok((
        StatusCode::CREATED,
        Json(RouteResponse {
            host: intent.host,
            router: keys.router,
            service: keys.service,
        }),
    ))
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
