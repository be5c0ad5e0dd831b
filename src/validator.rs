// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain ownership validation.
//!
//! A user may serve a host from their www directory only if they can prove
//! they own it. Validation runs a fixed sequence of hard gates; the first
//! failing gate classifies the result:
//!
//! 1. **Grammar** - the host must be a syntactically valid hostname
//! 2. **Resolvability** - the host must have at least one address; with strict
//!    address matching every address must also be in the allow-list
//! 3. **Ownership proof**, depending on the shape of the host:
//!    - `<label>.<base domain>`: the label must equal the user exactly
//!    - any other domain: the first TXT record at
//!      `<txt label>.<registrable domain>` must equal the user
//!
//! # Example
//!
//! ```rust
//! use homesite::dns::StaticResolver;
//! use homesite::validator::{OwnershipValidator, ValidatorConfig};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let resolver = StaticResolver::new().with_host("jim.netsoc.co", &["192.0.2.1".parse().unwrap()]);
//! let validator = OwnershipValidator::new(
//!     Arc::new(resolver),
//!     ValidatorConfig::new("netsoc.co", "_homesite"),
//! );
//!
//! assert!(validator.validate("jim.netsoc.co", "jim").await.is_ok());
//! assert!(validator.validate("jim.netsoc.co", "jimmy").await.is_err());
//! # }
//! ```

use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use crate::constants::{MAX_HOSTNAME_LENGTH, MAX_LABEL_LENGTH};
use crate::dns::DnsResolver;
use crate::errors::ValidationError;

/// Settings for the ownership validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Domain under which users get `<user>.<base_domain>` for free
    pub base_domain: String,
    /// Label prepended to the registrable domain for TXT proofs
    pub txt_label: String,
    /// Addresses the platform serves from
    pub allowed_addresses: Vec<IpAddr>,
    /// Require every resolved address to be in `allowed_addresses`
    pub strict_address_match: bool,
}

impl ValidatorConfig {
    /// Create a configuration without address matching.
    #[must_use]
    pub fn new(base_domain: impl Into<String>, txt_label: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into().trim_end_matches('.').to_string(),
            txt_label: txt_label.into(),
            allowed_addresses: Vec::new(),
            strict_address_match: false,
        }
    }

    /// Enable strict matching of resolved addresses against `addresses`.
    #[must_use]
    pub fn with_strict_addresses(mut self, addresses: Vec<IpAddr>) -> Self {
        self.allowed_addresses = addresses;
        self.strict_address_match = true;
        self
    }
}

/// Validates that a user owns the hosts they publish.
///
/// Stateless apart from its configuration: every call performs fresh DNS
/// lookups, since ownership is user-scoped and must not be cached across users.
#[derive(Clone)]
pub struct OwnershipValidator {
    resolver: Arc<dyn DnsResolver>,
    config: ValidatorConfig,
}

impl OwnershipValidator {
    /// Create a validator using `resolver` for DNS lookups.
    #[must_use]
    pub fn new(resolver: Arc<dyn DnsResolver>, config: ValidatorConfig) -> Self {
        Self { resolver, config }
    }

    /// The validator's configuration.
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate that `user` may serve `host`.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of the first gate that fails. DNS lookup
    /// errors are validation failures, never system failures.
    pub async fn validate(&self, host: &str, user: &str) -> Result<(), ValidationError> {
        if !is_valid_hostname(host) {
            return Err(ValidationError::MalformedDomain {
                host: host.to_string(),
            });
        }

        self.check_resolvable(host).await?;

        match base_domain_subdomain(host, &self.config.base_domain) {
            Some(subdomain) => check_subdomain_owner(host, subdomain, user)?,
            None => self.check_txt_proof(host, user).await?,
        }

        debug!(host = %host, user = %user, "Host ownership validated");
        Ok(())
    }

    async fn check_resolvable(&self, host: &str) -> Result<(), ValidationError> {
        let addresses =
            self.resolver
                .lookup_host(host)
                .await
                .map_err(|e| ValidationError::UnresolvableDomain {
                    host: host.to_string(),
                    reason: format!("{e:#}"),
                })?;

        if addresses.is_empty() {
            return Err(ValidationError::UnresolvableDomain {
                host: host.to_string(),
                reason: "no A or AAAA records present".to_string(),
            });
        }

        if self.config.strict_address_match {
            if let Some(address) = addresses
                .iter()
                .find(|address| !self.config.allowed_addresses.contains(address))
            {
                return Err(ValidationError::AddressNotAllowed {
                    host: host.to_string(),
                    address: address.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn check_txt_proof(&self, host: &str, user: &str) -> Result<(), ValidationError> {
        // Grammar guarantees at least two labels
        let registrable = registrable_domain(host).unwrap_or(host);
        let record = format!("{}.{registrable}", self.config.txt_label);

        let missing = |reason: String| ValidationError::OwnershipProofMissing {
            host: host.to_string(),
            record: record.clone(),
            user: user.to_string(),
            reason,
        };

        let values = self
            .resolver
            .lookup_txt(&record)
            .await
            .map_err(|e| missing(format!("unable to look up record: {e:#}")))?;

        match values.first() {
            Some(value) if value == user => Ok(()),
            Some(value) => Err(missing(format!("found '{value}' instead"))),
            None => Err(missing("no TXT record found".to_string())),
        }
    }
}

fn check_subdomain_owner(host: &str, subdomain: &str, user: &str) -> Result<(), ValidationError> {
    if subdomain == user {
        Ok(())
    } else {
        Err(ValidationError::SubdomainUserMismatch {
            host: host.to_string(),
            subdomain: subdomain.to_string(),
            user: user.to_string(),
        })
    }
}

/// Check strict hostname grammar.
///
/// - 1 to 253 characters, at least two labels, no trailing dot
/// - every label 1 to 63 characters of ASCII letters, digits and hyphens,
///   not starting or ending with a hyphen
/// - the last label is TLD-like: at least two letters, or an `xn--` IDN label
#[must_use]
pub fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LENGTH {
        return false;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|label| is_valid_label(label)) {
        return false;
    }

    labels.last().is_some_and(|tld| is_tld_like(tld))
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LENGTH
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn is_tld_like(tld: &str) -> bool {
    let lower = tld.to_ascii_lowercase();
    lower.starts_with("xn--") || (lower.len() >= 2 && lower.bytes().all(|b| b.is_ascii_alphabetic()))
}

/// The registrable domain of `host`: its last two labels.
///
/// Returns `None` for single-label names.
#[must_use]
pub fn registrable_domain(host: &str) -> Option<&str> {
    let host = host.trim_end_matches('.');
    let mut dots = host.rmatch_indices('.');
    let _tld_dot = dots.next()?;
    match dots.next() {
        Some((index, _)) => Some(&host[index + 1..]),
        None => Some(host),
    }
}

/// If `host` is `base_domain` or lies under it, return the part in front.
///
/// `jim.netsoc.co` yields `Some("jim")`, `a.jim.netsoc.co` yields `Some("a.jim")`
/// and `netsoc.co` itself yields `Some("")`. The suffix comparison is
/// case-insensitive, as DNS is; the returned part keeps its original case.
#[must_use]
pub fn base_domain_subdomain<'a>(host: &'a str, base_domain: &str) -> Option<&'a str> {
    if base_domain.is_empty() {
        return None;
    }
    if host.eq_ignore_ascii_case(base_domain) {
        return Some("");
    }

    let split = host.len().checked_sub(base_domain.len() + 1)?;
    let (prefix, suffix) = (host.get(..split)?, host.get(split..)?);
    let matches = suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(base_domain);
    matches.then_some(prefix)
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod validator_tests;
