// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use homesite::config_store::MemoryConfigStore;
use homesite::context::Context;
use homesite::discovery::{DiscoveryConfig, WebsiteDiscovery};
use homesite::dns::StaticResolver;
use homesite::provider::RegistryWebsiteProvider;
use homesite::registry::MemoryServiceRegistry;
use homesite::synthesizer::RouteSynthesizer;
use homesite::validator::{OwnershipValidator, ValidatorConfig};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Base domain handed out to users
pub const BASE_DOMAIN: &str = "netsoc.co";

/// Label of ownership TXT records
pub const TXT_LABEL: &str = "_homesite";

/// Web server every route points at
pub const DESTINATION: &str = "http://webserver:8080";

/// Resolver knowing the hosts used across the integration tests.
///
/// `alice-site.com` carries a TXT proof for `alice`.
pub fn resolver() -> StaticResolver {
    let addr: IpAddr = "192.0.2.10".parse().unwrap();
    StaticResolver::new()
        .with_host("alice.netsoc.co", &[addr])
        .with_host("bob.netsoc.co", &[addr])
        .with_host("x.netsoc.co", &[addr])
        .with_host("blog.alice-site.com", &[addr])
        .with_host("evil.com", &[addr])
        .with_txt("_homesite.alice-site.com", &["alice"])
}

/// A temporary home-directories root with in-memory backends.
pub struct Platform {
    dir: TempDir,
    pub store: Arc<MemoryConfigStore>,
    pub registry: Arc<MemoryServiceRegistry>,
}

impl Platform {
    pub fn new() -> Self {
        let platform = Self {
            dir: TempDir::new().unwrap(),
            store: Arc::new(MemoryConfigStore::new()),
            registry: Arc::new(MemoryServiceRegistry::new()),
        };
        std::fs::create_dir(platform.root()).unwrap();
        platform
    }

    /// The home-directories root.
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Create a directory next to the home-directories root.
    pub fn outside(&self, name: &str) -> PathBuf {
        let dir = self.dir.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Create (if needed) and return `user`'s www directory.
    pub fn www(&self, user: &str) -> PathBuf {
        let www = self.root().join(user).join("www");
        std::fs::create_dir_all(&www).unwrap();
        www
    }

    /// Create a website directory named `name` in `user`'s www directory.
    pub fn site(&self, user: &str, name: &str) -> PathBuf {
        let site = self.www(user).join(name);
        std::fs::create_dir_all(&site).unwrap();
        site
    }

    /// Create a symlink named `name` in `user`'s www directory.
    #[cfg(unix)]
    pub fn link(&self, user: &str, name: &str, target: impl AsRef<Path>) {
        std::os::unix::fs::symlink(target, self.www(user).join(name)).unwrap();
    }

    pub fn validator(&self) -> OwnershipValidator {
        OwnershipValidator::new(
            Arc::new(resolver()),
            ValidatorConfig::new(BASE_DOMAIN, TXT_LABEL),
        )
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            home_dirs_root: self.root(),
            ..DiscoveryConfig::default()
        }
    }

    pub fn discovery(&self) -> WebsiteDiscovery {
        WebsiteDiscovery::new(self.discovery_config(), self.validator())
    }

    /// Context wired to this platform's in-memory backends.
    pub fn context(&self) -> Context {
        Context::new(
            self.validator(),
            self.discovery_config(),
            Arc::new(RegistryWebsiteProvider::new(
                self.registry.clone(),
                "10.0.0.5",
                80,
            )),
            RouteSynthesizer::new(self.store.clone()),
            std::fs::canonicalize(self.root()).unwrap(),
            DESTINATION,
        )
    }
}
