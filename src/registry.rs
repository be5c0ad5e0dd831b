// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service registry capability consumed by the registration provider.
//!
//! - [`ConsulServiceRegistry`] - Consul agent and catalog HTTP API
//! - [`MemoryServiceRegistry`] - an in-process map for tests and dry runs
//!
//! The registry is shared with other tenants, so implementations only ever
//! touch the entries they are asked about.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};
use url::Url;

use crate::config_store::normalize_base_url;
use crate::constants::CONSUL_TOKEN_HEADER;
use crate::errors::RegistryError;
use crate::models::ServiceRegistryEntry;
use crate::retry::{http_backoff, retry_backend_read};

/// Timeout applied to every request against the registry
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Service-registry capability.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Register (or overwrite) an entry under its name.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the registration fails.
    async fn register(&self, entry: &ServiceRegistryEntry) -> Result<(), RegistryError>;

    /// List the entries registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the registry cannot be queried.
    async fn query(&self, name: &str) -> Result<Vec<ServiceRegistryEntry>, RegistryError>;

    /// Remove the entry registered under `name`. Removing an unknown name
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the removal fails.
    async fn deregister(&self, name: &str) -> Result<(), RegistryError>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-process service registry.
#[derive(Debug, Default)]
pub struct MemoryServiceRegistry {
    entries: Mutex<BTreeMap<String, ServiceRegistryEntry>>,
    failing_names: HashSet<String>,
}

impl MemoryServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make registrations of `name` fail with a 500 status.
    #[must_use]
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing_names.insert(name.to_string());
        self
    }

    /// Names of every registered entry.
    pub async fn names(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryServiceRegistry {
    async fn register(&self, entry: &ServiceRegistryEntry) -> Result<(), RegistryError> {
        if self.failing_names.contains(&entry.name) {
            return Err(RegistryError::UnexpectedStatus {
                service: entry.name.clone(),
                status_code: 500,
                body: "injected failure".to_string(),
            });
        }
        self.entries
            .lock()
            .await
            .insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    async fn query(&self, name: &str) -> Result<Vec<ServiceRegistryEntry>, RegistryError> {
        Ok(self.entries.lock().await.get(name).cloned().into_iter().collect())
    }

    async fn deregister(&self, name: &str) -> Result<(), RegistryError> {
        self.entries.lock().await.remove(name);
        Ok(())
    }
}

// ============================================================================
// Consul backend
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogService {
    service_name: String,
    #[serde(default)]
    service_address: String,
    #[serde(default)]
    service_port: u16,
    #[serde(default)]
    service_tags: Option<Vec<String>>,
}

impl From<CatalogService> for ServiceRegistryEntry {
    fn from(service: CatalogService) -> Self {
        Self {
            name: service.service_name,
            address: service.service_address,
            port: service.service_port,
            tags: service.service_tags.unwrap_or_default(),
        }
    }
}

/// Service registry backed by the Consul agent and catalog APIs.
#[derive(Debug, Clone)]
pub struct ConsulServiceRegistry {
    client: HttpClient,
    base_url: Url,
    token: Option<String>,
}

impl ConsulServiceRegistry {
    /// Create a registry talking to the Consul agent at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RegistryError> {
        self.base_url
            .join(path)
            .map_err(|e| RegistryError::Unavailable {
                endpoint: self.base_url.to_string(),
                reason: format!("invalid request path {path}: {e}"),
            })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.header(CONSUL_TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(
        &self,
        service: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), RegistryError> {
        let response = request.send().await.map_err(|e| RegistryError::Unavailable {
            endpoint: self.base_url.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| RegistryError::Decode {
            service: service.to_string(),
            reason: e.to_string(),
        })?;
        Ok((status, body))
    }

    async fn query_catalog(&self, name: &str) -> Result<Vec<ServiceRegistryEntry>, RegistryError> {
        let url = self.endpoint(&format!("v1/catalog/service/{name}"))?;
        let (status, body) = self
            .send(name, self.request(reqwest::Method::GET, url))
            .await?;

        if !status.is_success() {
            return Err(RegistryError::UnexpectedStatus {
                service: name.to_string(),
                status_code: status.as_u16(),
                body,
            });
        }

        let services: Vec<CatalogService> =
            serde_json::from_str(&body).map_err(|e| RegistryError::Decode {
                service: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(services
            .into_iter()
            .map(ServiceRegistryEntry::from)
            .filter(|entry| entry.name == name)
            .collect())
    }
}

#[async_trait]
impl ServiceRegistry for ConsulServiceRegistry {
    async fn register(&self, entry: &ServiceRegistryEntry) -> Result<(), RegistryError> {
        let url = self.endpoint("v1/agent/service/register")?;
        let registration = AgentServiceRegistration {
            id: &entry.name,
            name: &entry.name,
            address: &entry.address,
            port: entry.port,
            tags: &entry.tags,
        };

        let (status, body) = self
            .send(
                &entry.name,
                self.request(reqwest::Method::PUT, url).json(&registration),
            )
            .await?;

        if !status.is_success() {
            error!(service = %entry.name, status = %status, body = %body, "Consul service registration failed");
            return Err(RegistryError::UnexpectedStatus {
                service: entry.name.clone(),
                status_code: status.as_u16(),
                body,
            });
        }

        debug!(service = %entry.name, "Registered Consul service");
        Ok(())
    }

    async fn query(&self, name: &str) -> Result<Vec<ServiceRegistryEntry>, RegistryError> {
        retry_backend_read(
            http_backoff(),
            || self.query_catalog(name),
            &format!("query service {name}"),
        )
        .await
    }

    async fn deregister(&self, name: &str) -> Result<(), RegistryError> {
        let url = self.endpoint(&format!("v1/agent/service/deregister/{name}"))?;
        let (status, body) = self
            .send(name, self.request(reqwest::Method::PUT, url))
            .await?;

        if status == StatusCode::NOT_FOUND {
            debug!(service = %name, "Consul service already deregistered");
            return Ok(());
        }
        if !status.is_success() {
            error!(service = %name, status = %status, body = %body, "Consul service deregistration failed");
            return Err(RegistryError::UnexpectedStatus {
                service: name.to_string(),
                status_code: status.as_u16(),
                body,
            });
        }

        debug!(service = %name, "Deregistered Consul service");
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
