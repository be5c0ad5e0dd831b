// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Routing configuration synthesis.
//!
//! Translates a [`VirtualHostIntent`] into the key-value layout the reverse
//! proxy reads its dynamic configuration from, and writes it as one batch.
//!
//! ## Naming
//!
//! Every resource created for a host is named after the host's routing
//! namespace, the hex SHA-256 of the host. Synthesizing the same host twice
//! therefore overwrites the same keys instead of creating new resources.
//!
//! ## Layout
//!
//! For namespace `<ns>`:
//!
//! ```text
//! http/routers/homesite-router-<ns>/rule                                    Host(`<host>`)
//! http/middlewares/homesite-headers-<ns>/headers/customRequestHeaders/<H>   <value>
//! http/middlewares/homesite-prefix-<ns>/addPrefix/prefix                    <path prefix>
//! http/routers/homesite-router-<ns>/middlewares                             homesite-headers-<ns>,homesite-prefix-<ns>
//! http/services/homesite-service-<ns>/loadBalancer/servers/0/url            <destination>
//! http/routers/homesite-router-<ns>/service                                 homesite-service-<ns>
//! ```
//!
//! The batch is written in exactly that order. The router-to-service binding
//! comes last, so a router never references a service that was not written.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config_store::ConfigStore;
use crate::constants::RESOURCE_PREFIX;
use crate::errors::StoreError;
use crate::metrics;
use crate::models::VirtualHostIntent;

/// Routing namespace of a host: hex-encoded SHA-256 of the host name.
#[must_use]
pub fn routing_namespace(host: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Router match rule for a host.
#[must_use]
pub fn host_rule(host: &str) -> String {
    format!("Host(`{host}`)")
}

/// Names and keys of every resource synthesized for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeys {
    /// Hex SHA-256 of the host
    pub namespace: String,
    /// Router resource name
    pub router: String,
    /// Service resource name
    pub service: String,
    /// Headers-injection middleware name
    pub headers_middleware: String,
    /// Path-prefix middleware name
    pub prefix_middleware: String,
}

impl RoutingKeys {
    /// Derive resource names for `host`.
    #[must_use]
    pub fn for_host(host: &str) -> Self {
        let namespace = routing_namespace(host);
        Self {
            router: format!("{RESOURCE_PREFIX}-router-{namespace}"),
            service: format!("{RESOURCE_PREFIX}-service-{namespace}"),
            headers_middleware: format!("{RESOURCE_PREFIX}-headers-{namespace}"),
            prefix_middleware: format!("{RESOURCE_PREFIX}-prefix-{namespace}"),
            namespace,
        }
    }

    /// Key of the router match rule.
    #[must_use]
    pub fn rule_key(&self) -> String {
        format!("http/routers/{}/rule", self.router)
    }

    /// Key of the router-to-service binding.
    #[must_use]
    pub fn service_binding_key(&self) -> String {
        format!("http/routers/{}/service", self.router)
    }

    /// Key of the router middleware chain.
    #[must_use]
    pub fn middlewares_key(&self) -> String {
        format!("http/routers/{}/middlewares", self.router)
    }

    /// Key of one injected request header.
    #[must_use]
    pub fn header_key(&self, header: &str) -> String {
        format!(
            "http/middlewares/{}/headers/customRequestHeaders/{header}",
            self.headers_middleware
        )
    }

    /// Key of the path prefix added before forwarding.
    #[must_use]
    pub fn prefix_key(&self) -> String {
        format!("http/middlewares/{}/addPrefix/prefix", self.prefix_middleware)
    }

    /// Key of the service load-balancer target.
    #[must_use]
    pub fn service_url_key(&self) -> String {
        format!("http/services/{}/loadBalancer/servers/0/url", self.service)
    }
}

/// Build the ordered key-value batch for an intent.
///
/// Header entries are ordered by header name, so the batch is a pure
/// function of the intent.
#[must_use]
pub fn build_batch(intent: &VirtualHostIntent) -> Vec<(String, String)> {
    let keys = RoutingKeys::for_host(&intent.host);
    let mut batch = Vec::with_capacity(intent.additional_request_headers.len() + 5);

    batch.push((keys.rule_key(), host_rule(&intent.host)));
    for (header, value) in &intent.additional_request_headers {
        batch.push((keys.header_key(header), value.clone()));
    }
    batch.push((keys.prefix_key(), intent.path_prefix.clone()));
    batch.push((
        keys.middlewares_key(),
        format!("{},{}", keys.headers_middleware, keys.prefix_middleware),
    ));
    batch.push((keys.service_url_key(), intent.destination_server.clone()));
    batch.push((keys.service_binding_key(), keys.service.clone()));

    batch
}

/// Writes routing configuration for validated intents.
#[derive(Clone)]
pub struct RouteSynthesizer {
    store: Arc<dyn ConfigStore>,
}

impl RouteSynthesizer {
    /// Create a synthesizer writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Write the routing configuration for `intent`.
    ///
    /// The host must already have passed ownership validation. Returns the
    /// resource names that were written.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised by the store. No retry is
    /// attempted; the batch is idempotent and can simply be written again.
    pub async fn synthesize(&self, intent: &VirtualHostIntent) -> Result<RoutingKeys, StoreError> {
        let keys = RoutingKeys::for_host(&intent.host);
        let batch = build_batch(intent);

        debug!(
            host = %intent.host,
            namespace = %keys.namespace,
            keys = batch.len(),
            "Writing routing configuration"
        );

        match self.store.set_kvs(&batch).await {
            Ok(()) => {
                metrics::record_synthesis(true);
                info!(host = %intent.host, router = %keys.router, "Synthesized routing configuration");
                Ok(keys)
            }
            Err(e) => {
                metrics::record_synthesis(false);
                error!(
                    host = %intent.host,
                    reason = e.status_reason(),
                    error = %e,
                    "Failed to write routing configuration"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "synthesizer_tests.rs"]
mod synthesizer_tests;
