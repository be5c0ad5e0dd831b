// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data model shared by discovery, routing and registration.
//!
//! - [`Website`] - a discovered, validated unit of hosting content
//! - [`InvalidWebsite`] - a rejected candidate with its reason
//! - [`VirtualHostIntent`] - the routing-facing projection of a website
//! - [`ServiceRegistryEntry`] - the value registered in the service registry
//!
//! None of these are persisted by the controller. Websites are rebuilt on every
//! discovery pass and identified across passes by their canonical root.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::errors::ValidationError;

/// A website discovered in a user's www directory.
///
/// Two hostnames whose entries canonicalize to the same root are aliases of
/// the same website, so `root` is the identity and `hosts` is never empty
/// once discovery has returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Website {
    /// Virtual hosts that all serve this website's content
    pub hosts: BTreeSet<String>,
    /// Canonical (symlink-resolved) absolute path to the content root
    pub root: PathBuf,
    /// Owner of the www directory the website was found in
    pub user: String,
}

impl Website {
    /// Create a website with no hosts yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            hosts: BTreeSet::new(),
            root: root.into(),
            user: user.into(),
        }
    }

    /// Create a website serving a single host.
    #[must_use]
    pub fn with_host(host: impl Into<String>, root: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        let mut website = Self::new(root, user);
        website.hosts.insert(host.into());
        website
    }

    /// Lexicographically smallest host, used to name the website in logs.
    #[must_use]
    pub fn primary_host(&self) -> Option<&str> {
        self.hosts.iter().next().map(String::as_str)
    }

    /// Returns true if this website serves `host`.
    #[must_use]
    pub fn serves(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }
}

/// A www entry that was rejected during discovery.
///
/// Purely diagnostic: invalid websites are reported, never registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidWebsite {
    /// The offending host(s), usually the single www entry name
    pub hosts: Vec<String>,
    /// Best-effort resolved root, empty if resolution itself failed
    pub root: PathBuf,
    /// Owner of the www directory the entry was found in
    pub user: String,
    /// Why the entry was rejected
    pub reason: ValidationError,
}

impl InvalidWebsite {
    /// Create an invalid website for a single www entry.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        root: impl Into<PathBuf>,
        user: impl Into<String>,
        reason: ValidationError,
    ) -> Self {
        Self {
            hosts: vec![host.into()],
            root: root.into(),
            user: user.into(),
            reason,
        }
    }

    /// Root as a path, `None` when resolution failed.
    #[must_use]
    pub fn resolved_root(&self) -> Option<&Path> {
        if self.root.as_os_str().is_empty() {
            None
        } else {
            Some(&self.root)
        }
    }
}

/// Routing intent for one host.
///
/// The host must already have passed ownership validation before an intent
/// is handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHostIntent {
    /// Host matched by the router
    pub host: String,
    /// Prefix added to the request path before it reaches the destination
    pub path_prefix: String,
    /// Load-balancer target (URL) serving the content
    pub destination_server: String,
    /// Extra request headers injected by the headers middleware
    #[serde(default)]
    pub additional_request_headers: BTreeMap<String, String>,
}

/// Entry registered in the service registry for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistryEntry {
    /// Registry name, derived from the host
    pub name: String,
    /// Address serving the website content
    pub address: String,
    /// Port serving the website content
    pub port: u16,
    /// `key=value` routing metadata (host, path, user, type, rule)
    pub tags: Vec<String>,
}

impl ServiceRegistryEntry {
    /// Look up a `key=value` tag by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find_map(|tag| {
            tag.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod models_tests;
