// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Homesite - website control plane for shared home-directory hosting
//!
//! Homesite turns directories in users' home folders into published
//! websites. Every user owns a `www` directory; each entry in it is named
//! after the host it serves, and symlinks between entries add aliases.
//!
//! ## Overview
//!
//! - Discovers websites by scanning every user's `www` directory
//! - Validates domain ownership through DNS (base-domain subdomains must match
//!   the username, external domains need a TXT record naming the user)
//! - Registers websites in a service registry (Consul agent)
//! - Writes reverse-proxy routing configuration into a key-value store
//!   (Traefik's Consul KV layout)
//! - Reconciles continuously, so adding or removing a directory publishes or
//!   unpublishes the website
//!
//! ## Modules
//!
//! - [`validator`] - Domain ownership validation
//! - [`discovery`] - Website discovery over home directories
//! - [`synthesizer`] - Routing configuration synthesis
//! - [`provider`] - Service registration of websites
//! - [`reconciler`] - Periodic reconciliation loop
//! - [`config_store`] / [`registry`] - Backend capabilities and implementations
//! - [`api`] - HTTP API
//!
//! ## Example
//!
//! ```rust,no_run
//! use homesite::discovery::{DiscoveryConfig, WebsiteDiscovery};
//! use homesite::dns::HickoryResolver;
//! use homesite::validator::{OwnershipValidator, ValidatorConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let resolver = HickoryResolver::new("1.1.1.1:53".parse()?, Duration::from_secs(5));
//! let validator = OwnershipValidator::new(
//!     Arc::new(resolver),
//!     ValidatorConfig::new("netsoc.co", "_homesite"),
//! );
//! let discovery = WebsiteDiscovery::new(DiscoveryConfig::default(), validator);
//!
//! let report = discovery.list().await?;
//! for website in &report.valid {
//!     println!("{} serves {:?}", website.user, website.hosts);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod config_store;
pub mod constants;
pub mod context;
pub mod discovery;
pub mod dns;
pub mod errors;
pub mod http_errors;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod status_reasons;
pub mod synthesizer;
pub mod validator;
