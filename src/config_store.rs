// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Key-value configuration store consumed by the routing synthesizer.
//!
//! The reverse proxy watches a key-value store for its dynamic configuration.
//! [`ConfigStore`] is the narrow capability the synthesizer writes through;
//! two backends implement it:
//!
//! - [`ConsulConfigStore`] - Consul's KV HTTP API, keys placed under a root key
//! - [`MemoryConfigStore`] - an in-process map for tests and dry runs
//!
//! ## Batch semantics
//!
//! [`ConfigStore::set_kvs`] receives an ordered batch. Backends apply it either
//! atomically or strictly in batch order, stopping at the first failed write.
//! Consul applies batches of up to 64 operations as one transaction; larger
//! batches fall back to ordered single-key writes.
//!
//! Keys are `/`-separated paths. A key with an empty, `.` or `..` segment is
//! rejected with [`StoreError::InvalidKey`] before anything is written, so a
//! key can never address a location outside its own path.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};
use url::Url;

use crate::constants::{CONSUL_MAX_TXN_OPS, CONSUL_TOKEN_HEADER};
use crate::errors::StoreError;
use crate::retry::{http_backoff, retry_backend_read};

/// Timeout applied to every request against the store
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration-store capability.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read one key. Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    async fn get_kv(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Read several keys. Keys that do not exist are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    async fn get_kvs(&self, keys: &[String]) -> Result<BTreeMap<String, String>, StoreError>;

    /// Write one key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    async fn set_kv(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write an ordered batch of keys, atomically or in order.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the first failed write. Writes after it
    /// are not attempted.
    async fn set_kvs(&self, batch: &[(String, String)]) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, String>,
    writes: Vec<String>,
}

/// In-process configuration store.
///
/// Keeps every write in order so tests can assert on write ordering, and can
/// be told to fail writes to specific keys.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: Mutex<MemoryState>,
    failing_keys: HashSet<String>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `key` fail with a 500 status.
    #[must_use]
    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.lock().await.entries.clone()
    }

    /// Every successfully written key, in write order.
    pub async fn write_log(&self) -> Vec<String> {
        self.state.lock().await.writes.clone()
    }

    fn check_writable(&self, key: &str) -> Result<(), StoreError> {
        if self.failing_keys.contains(key) {
            return Err(StoreError::UnexpectedStatus {
                key: key.to_string(),
                status_code: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_kv(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().await.entries.get(key).cloned())
    }

    async fn get_kvs(&self, keys: &[String]) -> Result<BTreeMap<String, String>, StoreError> {
        let state = self.state.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| state.entries.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }

    async fn set_kv(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.check_writable(key)?;
        let mut state = self.state.lock().await;
        state.entries.insert(key.to_string(), value.to_string());
        state.writes.push(key.to_string());
        Ok(())
    }

    async fn set_kvs(&self, batch: &[(String, String)]) -> Result<(), StoreError> {
        validate_batch(batch)?;
        let mut state = self.state.lock().await;
        for (key, value) in batch {
            self.check_writable(key)?;
            state.entries.insert(key.clone(), value.clone());
            state.writes.push(key.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Consul backend
// ============================================================================

#[derive(Serialize)]
struct TxnOperation {
    #[serde(rename = "KV")]
    kv: TxnKv,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TxnKv {
    verb: &'static str,
    key: String,
    value: String,
}

#[derive(Deserialize, Default)]
struct TxnResponse {
    #[serde(rename = "Errors", default)]
    errors: Option<Vec<TxnError>>,
}

#[derive(Deserialize)]
struct TxnError {
    #[serde(rename = "OpIndex", default)]
    op_index: usize,
    #[serde(rename = "What", default)]
    what: String,
}

/// Configuration store backed by Consul's KV HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulConfigStore {
    client: HttpClient,
    base_url: Url,
    token: Option<String>,
    root_key: String,
}

impl ConsulConfigStore {
    /// Create a store talking to the Consul agent at `base_url`.
    ///
    /// Every key is written below `root_key` (e.g. `traefik`).
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, token: Option<String>, root_key: &str) -> anyhow::Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            token,
            root_key: root_key.trim_matches('/').to_string(),
        })
    }

    /// Key as stored in Consul, including the root key.
    #[must_use]
    pub fn full_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.root_key.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.root_key)
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Unavailable {
                endpoint: self.base_url.to_string(),
                reason: format!("invalid request path {path}: {e}"),
            })
    }

    /// URL of a key under `v1/kv`, one path segment per key segment.
    fn kv_url(&self, full_key: &str) -> Result<Url, StoreError> {
        let mut url = self.endpoint("v1/kv")?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Unavailable {
                endpoint: self.base_url.to_string(),
                reason: "base URL cannot carry a path".to_string(),
            })?
            .extend(full_key.split('/'));
        Ok(url)
    }

    fn unavailable(&self, e: &reqwest::Error) -> StoreError {
        StoreError::Unavailable {
            endpoint: self.base_url.to_string(),
            reason: e.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.header(CONSUL_TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn read_key(&self, full_key: &str) -> Result<Option<String>, StoreError> {
        let mut url = self.kv_url(full_key)?;
        url.set_query(Some("raw"));

        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| self.unavailable(&e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.map_err(|e| StoreError::Decode {
            key: full_key.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                key: full_key.to_string(),
                status_code: status.as_u16(),
                body,
            });
        }
        Ok(Some(body))
    }

    async fn write_key(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let full_key = self.full_key(key);
        let url = self.kv_url(&full_key)?;

        let response = self
            .request(reqwest::Method::PUT, url)
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| self.unavailable(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(key = %full_key, status = %status, body = %body, "Consul KV write failed");
            return Err(StoreError::UnexpectedStatus {
                key: full_key,
                status_code: status.as_u16(),
                body,
            });
        }
        // Consul answers `false` when a write was not applied
        if body.trim() == "false" {
            return Err(StoreError::TransactionRejected {
                operations: 1,
                reason: format!("write to {full_key} was not applied"),
            });
        }

        debug!(key = %full_key, "Wrote Consul KV key");
        Ok(())
    }

    async fn write_transaction(&self, batch: &[(String, String)]) -> Result<(), StoreError> {
        // Consul expects base64 values inside transactions
        let operations: Vec<TxnOperation> = batch
            .iter()
            .map(|(key, value)| TxnOperation {
                kv: TxnKv {
                    verb: "set",
                    key: self.full_key(key),
                    value: BASE64.encode(value),
                },
            })
            .collect();

        let url = self.endpoint("v1/txn")?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&operations)
            .send()
            .await
            .map_err(|e| self.unavailable(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::CONFLICT {
            let parsed: TxnResponse = serde_json::from_str(&body).unwrap_or_default();
            let reason = parsed
                .errors
                .unwrap_or_default()
                .iter()
                .map(|e| format!("operation {}: {}", e.op_index, e.what))
                .collect::<Vec<_>>()
                .join("; ");
            error!(operations = batch.len(), reason = %reason, "Consul rolled back KV transaction");
            return Err(StoreError::TransactionRejected {
                operations: batch.len(),
                reason,
            });
        }
        if !status.is_success() {
            error!(operations = batch.len(), status = %status, body = %body, "Consul KV transaction failed");
            return Err(StoreError::UnexpectedStatus {
                key: "txn".to_string(),
                status_code: status.as_u16(),
                body,
            });
        }

        debug!(operations = batch.len(), "Applied Consul KV transaction");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for ConsulConfigStore {
    async fn get_kv(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let full_key = self.full_key(key);
        retry_backend_read(
            http_backoff(),
            || self.read_key(&full_key),
            &format!("get key {full_key}"),
        )
        .await
    }

    async fn get_kvs(&self, keys: &[String]) -> Result<BTreeMap<String, String>, StoreError> {
        let mut values = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get_kv(key).await? {
                values.insert(key.clone(), value);
            }
        }
        Ok(values)
    }

    async fn set_kv(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write_key(key, value).await
    }

    async fn set_kvs(&self, batch: &[(String, String)]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        validate_batch(batch)?;
        if batch.len() <= CONSUL_MAX_TXN_OPS {
            return self.write_transaction(batch).await;
        }

        for (key, value) in batch {
            self.write_key(key, value).await?;
        }
        Ok(())
    }
}

/// Check that every `/`-separated segment of `key` is a plain name.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] if a segment is empty, `.` or `..`.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn validate_batch(batch: &[(String, String)]) -> Result<(), StoreError> {
    batch.iter().try_for_each(|(key, _)| validate_key(key))
}

/// Parse a base URL, making sure its path ends with `/` so relative API
/// paths are appended instead of replacing the last segment.
pub(crate) fn normalize_base_url(base_url: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "config_store_tests.rs"]
mod config_store_tests;
