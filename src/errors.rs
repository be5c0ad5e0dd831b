// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for website discovery, validation and backend operations.
//!
//! This module provides specialized error types for:
//! - Per-candidate validation failures (domain grammar, DNS proofs, symlinks)
//! - Discovery failures (unreadable home directories, missing www directories)
//! - Configuration store operations (Consul KV)
//! - Service registry operations (Consul agent)
//!
//! Validation failures are expected and frequent. They never abort a discovery
//! pass; they surface as an [`InvalidWebsite`](crate::models::InvalidWebsite)
//! carrying the error as its reason.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

use crate::retry::is_retryable_http_status;

use crate::status_reasons::{
    REASON_ADDRESS_NOT_ALLOWED, REASON_BACKEND_DECODE_ERROR, REASON_BACKEND_UNAVAILABLE,
    REASON_BACKEND_UNEXPECTED_STATUS, REASON_BROKEN_SYMLINK, REASON_FILESYSTEM_ERROR,
    REASON_HOME_DIRS_UNREADABLE, REASON_INVALID_KEY, REASON_INVALID_SYMLINK_TARGET,
    REASON_INVALID_USERNAME, REASON_MALFORMED_DOMAIN,
    REASON_OWNERSHIP_PROOF_MISSING, REASON_SUBDOMAIN_USER_MISMATCH, REASON_TRANSACTION_REJECTED,
    REASON_TRAVERSAL_REJECTED, REASON_UNRESOLVABLE_DOMAIN, REASON_WWW_DIR_MISSING,
    REASON_WWW_NOT_DIRECTORY,
};

/// Reasons a candidate website is rejected.
///
/// Each variant corresponds to one hard gate of the ownership validator or
/// one structural check of the discovery engine. The first failing gate
/// classifies the candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The host does not match hostname grammar
    #[error("Host '{host}' is not a valid domain name")]
    MalformedDomain {
        /// The rejected host
        host: String,
    },

    /// The host has no addresses, or the lookup itself failed
    #[error("Host '{host}' does not resolve: {reason}")]
    UnresolvableDomain {
        /// The rejected host
        host: String,
        /// Lookup error or "no A/AAAA records"
        reason: String,
    },

    /// The host resolves to an address outside the allow-list (strict mode only)
    #[error("Host '{host}' resolves to {address}, which is not one of the allowed addresses")]
    AddressNotAllowed {
        /// The rejected host
        host: String,
        /// The first address that was not allowed
        address: String,
    },

    /// A base-domain subdomain whose label differs from the claiming user
    #[error("Host '{host}' - subdomain '{subdomain}' must be the same as the owner's username '{user}'")]
    SubdomainUserMismatch {
        /// The rejected host
        host: String,
        /// The label(s) in front of the base domain
        subdomain: String,
        /// The claiming user
        user: String,
    },

    /// An external domain lacks a TXT record naming the claiming user
    #[error("Host '{host}' - no TXT record {record} set to '{user}': {reason}")]
    OwnershipProofMissing {
        /// The rejected host
        host: String,
        /// The TXT record name that was queried
        record: String,
        /// The claiming user (expected TXT value)
        user: String,
        /// What was found instead, or why the lookup failed
        reason: String,
    },

    /// A www entry is a symlink that cannot be resolved
    #[error("Entry '{entry}' is a broken symlink: {reason}")]
    BrokenSymlink {
        /// The www entry name
        entry: String,
        /// The resolution error
        reason: String,
    },

    /// A www entry is a symlink to something that is not a directory
    #[error("Entry '{entry}' points to {target}, which is not a directory")]
    InvalidSymlinkTarget {
        /// The www entry name
        entry: String,
        /// The canonical target
        target: PathBuf,
    },

    /// A www entry is a symlink escaping the www directory
    #[error("Entry '{entry}' points to {target}, which is outside the www directory")]
    TraversalRejected {
        /// The www entry name
        entry: String,
        /// The canonical target
        target: PathBuf,
    },
}

impl ValidationError {
    /// Returns the stable reason code for this failure.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::MalformedDomain { .. } => REASON_MALFORMED_DOMAIN,
            Self::UnresolvableDomain { .. } => REASON_UNRESOLVABLE_DOMAIN,
            Self::AddressNotAllowed { .. } => REASON_ADDRESS_NOT_ALLOWED,
            Self::SubdomainUserMismatch { .. } => REASON_SUBDOMAIN_USER_MISMATCH,
            Self::OwnershipProofMissing { .. } => REASON_OWNERSHIP_PROOF_MISSING,
            Self::BrokenSymlink { .. } => REASON_BROKEN_SYMLINK,
            Self::InvalidSymlinkTarget { .. } => REASON_INVALID_SYMLINK_TARGET,
            Self::TraversalRejected { .. } => REASON_TRAVERSAL_REJECTED,
        }
    }

    /// Returns true if the failure came from DNS rather than from the filesystem or grammar.
    ///
    /// DNS failures may clear up on their own; the reconciler uses this to
    /// avoid tearing down websites during a resolver outage.
    #[must_use]
    pub fn is_dns_failure(&self) -> bool {
        matches!(
            self,
            Self::UnresolvableDomain { .. }
                | Self::AddressNotAllowed { .. }
                | Self::OwnershipProofMissing { .. }
        )
    }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationError", 2)?;
        state.serialize_field("reason", self.status_reason())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Errors raised while scanning home directories.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The home-directories root itself could not be listed (fatal to a pass)
    #[error("Cannot read home directories root {path}: {source}")]
    HomeDirsUnreadable {
        /// The configured home-directories root
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The username cannot name a directory under the home-directories root
    #[error("'{user}' is not a valid username")]
    InvalidUsername {
        /// The rejected username
        user: String,
    },

    /// The user has no www directory
    #[error("www directory {path} for user '{user}' does not exist")]
    WwwDirMissing {
        /// The user being scanned
        user: String,
        /// The expected www directory
        path: PathBuf,
    },

    /// The user's www path exists but is not a directory
    #[error("www path {path} for user '{user}' is not a directory")]
    WwwNotDirectory {
        /// The user being scanned
        user: String,
        /// The www path
        path: PathBuf,
    },

    /// Any other I/O failure while scanning one user
    #[error("Failed to scan {path} for user '{user}': {source}")]
    Io {
        /// The user being scanned
        user: String,
        /// The path that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    /// Returns true if the error only concerns a single user.
    ///
    /// `List()` skips users failing with a per-user error; any other error
    /// aborts the pass.
    #[must_use]
    pub fn is_per_user(&self) -> bool {
        !matches!(self, Self::HomeDirsUnreadable { .. })
    }

    /// Returns the stable reason code for this error.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::HomeDirsUnreadable { .. } => REASON_HOME_DIRS_UNREADABLE,
            Self::InvalidUsername { .. } => REASON_INVALID_USERNAME,
            Self::WwwDirMissing { .. } => REASON_WWW_DIR_MISSING,
            Self::WwwNotDirectory { .. } => REASON_WWW_NOT_DIRECTORY,
            Self::Io { .. } => REASON_FILESYSTEM_ERROR,
        }
    }
}

/// Errors returned by a configuration store backend.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The store could not be reached (connection refused, timeout)
    #[error("Configuration store at {endpoint} unavailable: {reason}")]
    Unavailable {
        /// Store endpoint
        endpoint: String,
        /// Transport error
        reason: String,
    },

    /// The store answered with an unexpected HTTP status
    #[error("Configuration store returned HTTP {status_code} for key '{key}': {body}")]
    UnexpectedStatus {
        /// Key (or transaction) being operated on
        key: String,
        /// HTTP status code
        status_code: u16,
        /// Response body
        body: String,
    },

    /// The store rolled back an atomic multi-key write
    #[error("Configuration store rejected transaction of {operations} operations: {reason}")]
    TransactionRejected {
        /// Number of operations in the rejected transaction
        operations: usize,
        /// Errors reported by the store
        reason: String,
    },

    /// A key has an empty, `.` or `..` path segment
    #[error("Configuration key '{key}' has an empty or relative path segment")]
    InvalidKey {
        /// Offending key
        key: String,
    },

    /// The response body could not be decoded
    #[error("Failed to decode configuration store response for '{key}': {reason}")]
    Decode {
        /// Key being read
        key: String,
        /// Decoding error
        reason: String,
    },
}

impl StoreError {
    /// Returns true if this error is transient and the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::UnexpectedStatus { status_code, .. } => retryable_status(*status_code),
            Self::TransactionRejected { .. } | Self::InvalidKey { .. } | Self::Decode { .. } => {
                false
            }
        }
    }

    /// Returns the stable reason code for this error.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => REASON_BACKEND_UNAVAILABLE,
            Self::UnexpectedStatus { .. } => REASON_BACKEND_UNEXPECTED_STATUS,
            Self::TransactionRejected { .. } => REASON_TRANSACTION_REJECTED,
            Self::InvalidKey { .. } => REASON_INVALID_KEY,
            Self::Decode { .. } => REASON_BACKEND_DECODE_ERROR,
        }
    }
}

/// Errors returned by a service registry backend.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// The registry could not be reached
    #[error("Service registry at {endpoint} unavailable: {reason}")]
    Unavailable {
        /// Registry endpoint
        endpoint: String,
        /// Transport error
        reason: String,
    },

    /// The registry answered with an unexpected HTTP status
    #[error("Service registry returned HTTP {status_code} for service '{service}': {body}")]
    UnexpectedStatus {
        /// Service name being operated on
        service: String,
        /// HTTP status code
        status_code: u16,
        /// Response body
        body: String,
    },

    /// The response body could not be decoded
    #[error("Failed to decode service registry response for '{service}': {reason}")]
    Decode {
        /// Service name being read
        service: String,
        /// Decoding error
        reason: String,
    },
}

impl RegistryError {
    /// Returns true if this error is transient and the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::UnexpectedStatus { status_code, .. } => retryable_status(*status_code),
            Self::Decode { .. } => false,
        }
    }

    /// Returns the stable reason code for this error.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => REASON_BACKEND_UNAVAILABLE,
            Self::UnexpectedStatus { .. } => REASON_BACKEND_UNEXPECTED_STATUS,
            Self::Decode { .. } => REASON_BACKEND_DECODE_ERROR,
        }
    }
}

fn retryable_status(status_code: u16) -> bool {
    StatusCode::from_u16(status_code).is_ok_and(is_retryable_http_status)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
