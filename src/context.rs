// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciliation loop and the HTTP API.
//!
//! Both receive the same components, so a website published through the API
//! is registered and routed exactly like one found by a discovery pass.

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::config_store::{ConfigStore, ConsulConfigStore, MemoryConfigStore};
use crate::discovery::{DiscoveryConfig, WebsiteDiscovery};
use crate::dns::HickoryResolver;
use crate::models::{VirtualHostIntent, Website};
use crate::provider::{RegistryWebsiteProvider, WebsiteProvider};
use crate::reconciler::{website_intent, Reconciler, ReconcilerConfig};
use crate::registry::{ConsulServiceRegistry, MemoryServiceRegistry, ServiceRegistry};
use crate::synthesizer::RouteSynthesizer;
use crate::validator::OwnershipValidator;

/// Components shared by the loop and the API.
#[derive(Clone)]
pub struct Context {
    /// Ownership validator
    pub validator: OwnershipValidator,

    /// Discovery engine using `validator`
    pub discovery: WebsiteDiscovery,

    /// Website registration
    pub provider: Arc<dyn WebsiteProvider>,

    /// Routing configuration writer
    pub synthesizer: RouteSynthesizer,

    /// Canonical home-directories root, base of routing path prefixes
    pub content_root: PathBuf,

    /// Web server URL written into every route
    pub destination_server: String,
}

impl Context {
    /// Wire components together.
    #[must_use]
    pub fn new(
        validator: OwnershipValidator,
        discovery_config: DiscoveryConfig,
        provider: Arc<dyn WebsiteProvider>,
        synthesizer: RouteSynthesizer,
        content_root: PathBuf,
        destination_server: impl Into<String>,
    ) -> Self {
        Self {
            discovery: WebsiteDiscovery::new(discovery_config, validator.clone()),
            validator,
            provider,
            synthesizer,
            content_root,
            destination_server: destination_server.into(),
        }
    }

    /// Build the production context: hickory DNS and Consul backends, or
    /// in-memory backends in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the Consul URL is invalid or an HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = Arc::new(HickoryResolver::new(config.dns_server, config.dns_timeout()));
        let validator = OwnershipValidator::new(resolver, config.validator_config());

        let (store, registry): (Arc<dyn ConfigStore>, Arc<dyn ServiceRegistry>) = if config.dry_run {
            info!("Dry run: routes and registrations are kept in memory");
            (
                Arc::new(MemoryConfigStore::new()),
                Arc::new(MemoryServiceRegistry::new()),
            )
        } else {
            info!(consul_url = %config.consul_url, kv_root_key = %config.kv_root_key, "Using Consul backends");
            (
                Arc::new(
                    ConsulConfigStore::new(
                        &config.consul_url,
                        config.consul_token.clone(),
                        &config.kv_root_key,
                    )
                    .context("Failed to create Consul KV store")?,
                ),
                Arc::new(
                    ConsulServiceRegistry::new(&config.consul_url, config.consul_token.clone())
                        .context("Failed to create Consul service registry")?,
                ),
            )
        };

        let provider = Arc::new(RegistryWebsiteProvider::new(
            registry,
            config.service_address.clone(),
            config.service_port,
        ));

        let content_root = std::fs::canonicalize(&config.home_dirs_root).unwrap_or_else(|e| {
            warn!(
                path = ?config.home_dirs_root,
                error = %e,
                "Cannot canonicalize home directories root, using it as configured"
            );
            config.home_dirs_root.clone()
        });

        Ok(Self::new(
            validator,
            config.discovery_config(),
            provider,
            RouteSynthesizer::new(store),
            content_root,
            config.destination_server.clone(),
        ))
    }

    /// Routing intent for one host of a validated website.
    #[must_use]
    pub fn intent_for(&self, host: &str, website: &Website) -> VirtualHostIntent {
        website_intent(host, website, &self.content_root, &self.destination_server)
    }

    /// Create a reconciler sharing this context's components.
    #[must_use]
    pub fn reconciler(&self, poll_interval: std::time::Duration) -> Reconciler {
        Reconciler::new(
            ReconcilerConfig {
                poll_interval,
                content_root: self.content_root.clone(),
                destination_server: self.destination_server.clone(),
            },
            self.discovery.clone(),
            self.provider.clone(),
            self.synthesizer.clone(),
        )
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
