// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS lookups used by the ownership validator.
//!
//! Two queries are needed to validate a claimed host:
//! - a host-address lookup (does the host resolve at all, and to what)
//! - a TXT lookup (does `<label>.<registrable domain>` name the claiming user)
//!
//! Both sit behind the [`DnsResolver`] trait so validation logic can be tested
//! without a network. [`HickoryResolver`] is the production implementation:
//! host lookups go through the system resolver, TXT queries are sent over UDP
//! to a configured DNS server with hickory-client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::rr::{DNSClass, Name, RData, RecordType};
use hickory_client::udp::UdpClientConnection;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::constants::HOST_LOOKUP_PORT;

/// DNS capability consumed by the ownership validator.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolve a host to its addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails (NXDOMAIN, timeout, resolver failure).
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>>;

    /// Fetch the TXT records published at `name`, one string per record.
    ///
    /// Multiple character-strings inside one record are concatenated. A name
    /// with no TXT records (including NXDOMAIN) yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the query could not be completed.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// Production resolver backed by the system resolver and hickory-client.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    /// Server queried for TXT records
    server: SocketAddr,
    /// Per-query timeout
    timeout: Duration,
}

impl HickoryResolver {
    /// Create a resolver sending TXT queries to `server`.
    #[must_use]
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs = tokio::time::timeout(
            self.timeout,
            tokio::net::lookup_host((host, HOST_LOOKUP_PORT)),
        )
        .await
        .with_context(|| format!("Host lookup for {host} timed out"))?
        .with_context(|| format!("Host lookup for {host} failed"))?;

        let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        ips.sort();
        ips.dedup();

        debug!(host = %host, addresses = ?ips, "Resolved host");
        Ok(ips)
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        let name_str = name.to_string();
        let server = self.server;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let conn = UdpClientConnection::with_timeout(server, timeout)
                .context("Failed to create UDP connection for TXT query")?;
            let client = SyncClient::new(conn);

            let fqdn = Name::from_str(&name_str)
                .with_context(|| format!("Invalid TXT record name: {name_str}"))?;

            let response = client
                .query(&fqdn, DNSClass::IN, RecordType::TXT)
                .with_context(|| format!("Failed to query TXT record for {fqdn}"))?;

            match response.response_code() {
                ResponseCode::NoError | ResponseCode::NXDomain => {}
                code => {
                    return Err(anyhow::anyhow!(
                        "TXT query for {fqdn} failed with response code: {code:?}"
                    ))
                }
            }

            let values: Vec<String> = response
                .answers()
                .iter()
                .filter_map(|record| match record.data() {
                    Some(RData::TXT(txt)) => Some(
                        txt.txt_data()
                            .iter()
                            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                            .collect::<String>(),
                    ),
                    _ => None,
                })
                .collect();

            debug!(name = %fqdn, values = ?values, "Resolved TXT records");
            Ok(values)
        })
        .await
        .context("TXT query task failed")?
    }
}

/// Table-driven resolver for offline runs and tests.
///
/// Hosts and TXT names not present in the tables behave like NXDOMAIN: host
/// lookups fail and TXT lookups return no records. Names registered with
/// [`StaticResolver::fail_txt`] make TXT lookups return an error.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    txt: HashMap<String, Vec<String>>,
    failing_txt: HashSet<String>,
}

impl StaticResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `host` resolve to `addrs`.
    #[must_use]
    pub fn with_host(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.hosts.insert(host.to_string(), addrs.to_vec());
        self
    }

    /// Publish TXT records at `name`.
    #[must_use]
    pub fn with_txt(mut self, name: &str, values: &[&str]) -> Self {
        self.txt.insert(
            name.to_string(),
            values.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Make TXT lookups for `name` fail.
    #[must_use]
    pub fn fail_txt(mut self, name: &str) -> Self {
        self.failing_txt.insert(name.to_string());
        self
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NXDOMAIN: {host}"))
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        if self.failing_txt.contains(name) {
            return Err(anyhow::anyhow!("SERVFAIL: {name}"));
        }
        Ok(self.txt.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "dns_tests.rs"]
mod dns_tests;
