// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Every option can be given as a command-line flag or through a
//! `HOMESITE_*` environment variable:
//!
//! ```text
//! HOMESITE_BASE_DOMAIN=netsoc.co \
//! HOMESITE_CONSUL_URL=http://consul:8500 \
//! homesite --poll-interval-secs 10
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONSUL_URL, DEFAULT_DESTINATION_SERVER, DEFAULT_DISCOVERY_CONCURRENCY,
    DEFAULT_DNS_SERVER, DEFAULT_DNS_TIMEOUT_SECS, DEFAULT_HOME_DIRS_ROOT, DEFAULT_KV_ROOT_KEY,
    DEFAULT_LISTEN_ADDRESS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SERVICE_ADDRESS,
    DEFAULT_SERVICE_PORT, DEFAULT_TXT_LABEL, DEFAULT_WWW_DIR_NAME,
};
use crate::discovery::DiscoveryConfig;
use crate::validator::ValidatorConfig;

/// Homesite control plane
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "homesite", version, about)]
pub struct Config {
    /// Directory holding one home directory per user
    #[arg(long, env = "HOMESITE_HOME_DIRS_ROOT", default_value = DEFAULT_HOME_DIRS_ROOT)]
    pub home_dirs_root: PathBuf,

    /// Name of the web-content directory inside each home directory
    #[arg(long, env = "HOMESITE_WWW_DIR_NAME", default_value = DEFAULT_WWW_DIR_NAME)]
    pub www_dir_name: String,

    /// Operator-owned domain whose subdomains belong to the matching user
    #[arg(long, env = "HOMESITE_BASE_DOMAIN")]
    pub base_domain: String,

    /// Label of the TXT record proving ownership of external domains
    #[arg(long, env = "HOMESITE_TXT_LABEL", default_value = DEFAULT_TXT_LABEL)]
    pub txt_label: String,

    /// Address websites must resolve to (repeatable)
    #[arg(long = "allowed-address", env = "HOMESITE_ALLOWED_ADDRESSES", value_delimiter = ',')]
    pub allowed_addresses: Vec<IpAddr>,

    /// Reject hosts resolving outside the allowed addresses
    #[arg(long, env = "HOMESITE_STRICT_ADDRESS_MATCH")]
    pub strict_address_match: bool,

    /// DNS server used for TXT lookups
    #[arg(long, env = "HOMESITE_DNS_SERVER", default_value = DEFAULT_DNS_SERVER)]
    pub dns_server: SocketAddr,

    /// Timeout of a single DNS query, in seconds
    #[arg(long, env = "HOMESITE_DNS_TIMEOUT_SECS", default_value_t = DEFAULT_DNS_TIMEOUT_SECS)]
    pub dns_timeout_secs: u64,

    /// Web server URL written into every route
    #[arg(long, env = "HOMESITE_DESTINATION_SERVER", default_value = DEFAULT_DESTINATION_SERVER)]
    pub destination_server: String,

    /// Address registered for every website
    #[arg(long, env = "HOMESITE_SERVICE_ADDRESS", default_value = DEFAULT_SERVICE_ADDRESS)]
    pub service_address: String,

    /// Port registered for every website
    #[arg(long, env = "HOMESITE_SERVICE_PORT", default_value_t = DEFAULT_SERVICE_PORT)]
    pub service_port: u16,

    /// Consul HTTP API address
    #[arg(long, env = "HOMESITE_CONSUL_URL", default_value = DEFAULT_CONSUL_URL)]
    pub consul_url: String,

    /// Consul ACL token
    #[arg(long, env = "HOMESITE_CONSUL_TOKEN", hide_env_values = true)]
    pub consul_token: Option<String>,

    /// KV prefix the reverse proxy reads its configuration from
    #[arg(long, env = "HOMESITE_KV_ROOT_KEY", default_value = DEFAULT_KV_ROOT_KEY)]
    pub kv_root_key: String,

    /// Keep routes and registrations in memory instead of Consul
    #[arg(long, env = "HOMESITE_DRY_RUN")]
    pub dry_run: bool,

    /// Seconds between discovery passes
    #[arg(long, env = "HOMESITE_POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Users scanned concurrently during a discovery pass
    #[arg(long, env = "HOMESITE_DISCOVERY_CONCURRENCY", default_value_t = DEFAULT_DISCOVERY_CONCURRENCY)]
    pub discovery_concurrency: usize,

    /// Address of the HTTP API and metrics endpoint
    #[arg(long, env = "HOMESITE_LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen_address: SocketAddr,

    /// Log output format, `json` or `text`
    #[arg(long, env = "RUST_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Config {
    /// Check settings clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero poll interval or concurrency, an empty
    /// base domain, or strict address matching without allowed addresses.
    pub fn validate(&self) -> Result<()> {
        if self.base_domain.trim().trim_end_matches('.').is_empty() {
            bail!("base domain must not be empty");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be at least one second");
        }
        if self.discovery_concurrency == 0 {
            bail!("discovery concurrency must be at least 1");
        }
        if self.strict_address_match && self.allowed_addresses.is_empty() {
            bail!("strict address matching requires at least one allowed address");
        }
        Ok(())
    }

    /// Time between discovery passes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Timeout of a single DNS query.
    #[must_use]
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    /// Settings of the ownership validator.
    #[must_use]
    pub fn validator_config(&self) -> ValidatorConfig {
        let config = ValidatorConfig::new(&self.base_domain, &self.txt_label);
        if self.strict_address_match {
            config.with_strict_addresses(self.allowed_addresses.clone())
        } else {
            config
        }
    }

    /// Settings of the discovery engine.
    #[must_use]
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            home_dirs_root: self.home_dirs_root.clone(),
            www_dir_name: self.www_dir_name.clone(),
            concurrency: self.discovery_concurrency,
        }
    }

    /// Returns true if logs should be emitted as JSON.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
