// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the homesite controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Discovery Constants
// ============================================================================

/// Default root under which every user's home directory lives
pub const DEFAULT_HOME_DIRS_ROOT: &str = "/home";

/// Default name of the per-user directory holding one entry per virtual host
pub const DEFAULT_WWW_DIR_NAME: &str = "www";

/// Default number of users scanned concurrently during one discovery pass
pub const DEFAULT_DISCOVERY_CONCURRENCY: usize = 8;

// ============================================================================
// DNS Constants
// ============================================================================

/// Default label prepended to the registrable domain for TXT ownership proofs
///
/// `blog.example.com` is proven by a TXT record at `_homesite.example.com`.
pub const DEFAULT_TXT_LABEL: &str = "_homesite";

/// Default DNS server queried for TXT ownership proofs
pub const DEFAULT_DNS_SERVER: &str = "1.1.1.1:53";

/// Default timeout for a single DNS query
pub const DEFAULT_DNS_TIMEOUT_SECS: u64 = 5;

/// Port used for host address lookups (only the addresses are inspected)
pub const HOST_LOOKUP_PORT: u16 = 80;

/// Maximum length of a single hostname label
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a full hostname (without trailing dot)
pub const MAX_HOSTNAME_LENGTH: usize = 253;

// ============================================================================
// Routing Constants
// ============================================================================

/// Prefix shared by every resource this controller writes
pub const RESOURCE_PREFIX: &str = "homesite";

/// Default root key under which reverse-proxy configuration is stored
pub const DEFAULT_KV_ROOT_KEY: &str = "traefik";

/// Header injected into every synthesized route carrying the owning user
pub const HEADER_WEBSITE_USER: &str = "X-Homesite-User";

/// Header injected into every synthesized route carrying the requested host
pub const HEADER_WEBSITE_HOST: &str = "X-Homesite-Host";

/// Service type advertised in registry tags
pub const WEBSITE_SERVICE_TYPE: &str = "static,php";

/// Default web server target written into every route
pub const DEFAULT_DESTINATION_SERVER: &str = "http://127.0.0.1:80";

/// Default address registered for every website
pub const DEFAULT_SERVICE_ADDRESS: &str = "127.0.0.1";

/// Default port registered for every website
pub const DEFAULT_SERVICE_PORT: u16 = 80;

// ============================================================================
// Consul Constants
// ============================================================================

/// Default Consul HTTP API address
pub const DEFAULT_CONSUL_URL: &str = "http://127.0.0.1:8500";

/// Maximum number of operations Consul accepts in a single transaction
pub const CONSUL_MAX_TXN_OPS: usize = 64;

/// Header carrying the Consul ACL token
pub const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Default number of seconds between home directory rescans
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 4;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Name prefix of Tokio worker threads
pub const TOKIO_THREAD_NAME: &str = "homesite-worker";

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Default bind address for the HTTP API and metrics server
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";
