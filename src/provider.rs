// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service registration of discovered websites.
//!
//! Every host of a website is registered as its own service registry entry,
//! named `homesite-website-<routing namespace>`. Sharing the routing namespace
//! with the synthesizer keeps registry names collision-free and ties a
//! registration to the routing keys of the same host.
//!
//! Entries carry `key=value` tags describing the website:
//!
//! | Tag    | Value                          |
//! |--------|--------------------------------|
//! | `host` | the virtual host               |
//! | `path` | canonical content root         |
//! | `user` | owner of the website           |
//! | `type` | `static,php`                   |
//! | `rule` | router rule, ``Host(`<host>`)`` |

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::constants::{RESOURCE_PREFIX, WEBSITE_SERVICE_TYPE};
use crate::errors::RegistryError;
use crate::models::{ServiceRegistryEntry, Website};
use crate::registry::ServiceRegistry;
use crate::synthesizer::{host_rule, routing_namespace};

/// Website registration capability.
#[async_trait]
pub trait WebsiteProvider: Send + Sync {
    /// Register every host of `website`.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`]; hosts after the failing one are
    /// not registered.
    async fn create(&self, website: &Website) -> Result<(), RegistryError>;

    /// Look up the website registered for `host`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the registry cannot be queried or the
    /// entry lacks the tags a website is rebuilt from.
    async fn read(&self, host: &str) -> Result<Option<Website>, RegistryError>;

    /// Remove the registration of `host`. Removing an unregistered host succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the removal fails.
    async fn delete(&self, host: &str) -> Result<(), RegistryError>;
}

/// Registry name of a host.
#[must_use]
pub fn registry_name(host: &str) -> String {
    format!("{RESOURCE_PREFIX}-website-{}", routing_namespace(host))
}

/// Registers websites in a [`ServiceRegistry`].
#[derive(Clone)]
pub struct RegistryWebsiteProvider {
    registry: Arc<dyn ServiceRegistry>,
    address: String,
    port: u16,
}

impl RegistryWebsiteProvider {
    /// Create a provider registering websites as served from `address:port`.
    #[must_use]
    pub fn new(registry: Arc<dyn ServiceRegistry>, address: impl Into<String>, port: u16) -> Self {
        Self {
            registry,
            address: address.into(),
            port,
        }
    }

    /// Registry entry for one host of `website`.
    #[must_use]
    pub fn entry_for(&self, host: &str, website: &Website) -> ServiceRegistryEntry {
        ServiceRegistryEntry {
            name: registry_name(host),
            address: self.address.clone(),
            port: self.port,
            tags: vec![
                format!("host={host}"),
                format!("path={}", website.root.display()),
                format!("user={}", website.user),
                format!("type={WEBSITE_SERVICE_TYPE}"),
                format!("rule={}", host_rule(host)),
            ],
        }
    }
}

fn website_from_entry(entry: &ServiceRegistryEntry) -> Result<Website, RegistryError> {
    let tag = |key: &str| {
        entry.tag(key).ok_or_else(|| RegistryError::Decode {
            service: entry.name.clone(),
            reason: format!("missing '{key}' tag"),
        })
    };
    Ok(Website::with_host(tag("host")?, tag("path")?, tag("user")?))
}

#[async_trait]
impl WebsiteProvider for RegistryWebsiteProvider {
    async fn create(&self, website: &Website) -> Result<(), RegistryError> {
        for host in &website.hosts {
            let entry = self.entry_for(host, website);
            self.registry.register(&entry).await?;
            debug!(host = %host, service = %entry.name, "Registered website host");
        }
        info!(
            root = ?website.root,
            user = %website.user,
            hosts = website.hosts.len(),
            "Registered website"
        );
        Ok(())
    }

    async fn read(&self, host: &str) -> Result<Option<Website>, RegistryError> {
        let entries = self.registry.query(&registry_name(host)).await?;
        entries.first().map(website_from_entry).transpose()
    }

    async fn delete(&self, host: &str) -> Result<(), RegistryError> {
        let name = registry_name(host);
        self.registry.deregister(&name).await?;
        info!(host = %host, service = %name, "Deregistered website host");
        Ok(())
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
