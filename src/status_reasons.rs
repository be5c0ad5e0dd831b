// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard reason codes reported for rejected websites and failed operations.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a website
//! was rejected or why an operation failed. They appear in API responses, in
//! log lines and as the `reason` label of the `homesite_invalid_websites_total`
//! metric, so they must stay stable.
//!
//! # Example API output
//!
//! ```json
//! {
//!   "hosts": ["evil.com"],
//!   "root": "/etc",
//!   "user": "bob",
//!   "reason": {
//!     "reason": "TraversalRejected",
//!     "message": "Entry 'evil.com' points to /etc, which is outside the www directory"
//!   }
//! }
//! ```

// ============================================================================
// Domain Validation Reasons
// ============================================================================

/// The candidate host is not a syntactically valid hostname.
pub const REASON_MALFORMED_DOMAIN: &str = "MalformedDomain";

/// The candidate host has no A/AAAA records or the lookup failed.
pub const REASON_UNRESOLVABLE_DOMAIN: &str = "UnresolvableDomain";

/// The candidate host resolves to an address outside the configured allow-list.
///
/// Only produced when strict address matching is enabled.
pub const REASON_ADDRESS_NOT_ALLOWED: &str = "AddressNotAllowed";

/// A subdomain of the base domain whose label is not the claiming user.
///
/// `jim.netsoc.co` may only be claimed by `jim`.
pub const REASON_SUBDOMAIN_USER_MISMATCH: &str = "SubdomainUserMismatch";

/// An external domain without a TXT record naming the claiming user.
pub const REASON_OWNERSHIP_PROOF_MISSING: &str = "OwnershipProofMissing";

// ============================================================================
// Filesystem Reasons
// ============================================================================

/// A www entry is a symlink whose target does not exist.
pub const REASON_BROKEN_SYMLINK: &str = "BrokenSymlink";

/// A www entry is a symlink to something other than a directory.
pub const REASON_INVALID_SYMLINK_TARGET: &str = "InvalidSymlinkTarget";

/// A www entry is a symlink that escapes the user's www directory.
///
/// This is a security control: it prevents a user from publishing content
/// rooted outside their own sandboxed tree.
pub const REASON_TRAVERSAL_REJECTED: &str = "TraversalRejected";

// ============================================================================
// Discovery Reasons
// ============================================================================

/// The home-directories root could not be read.
pub const REASON_HOME_DIRS_UNREADABLE: &str = "HomeDirsUnreadable";

/// The username is not a single path component.
pub const REASON_INVALID_USERNAME: &str = "InvalidUsername";

/// The user has no www directory.
pub const REASON_WWW_DIR_MISSING: &str = "WwwDirMissing";

/// The user's www path exists but is not a directory.
pub const REASON_WWW_NOT_DIRECTORY: &str = "WwwNotDirectory";

/// Generic filesystem failure while scanning a user's www directory.
pub const REASON_FILESYSTEM_ERROR: &str = "FilesystemError";

// ============================================================================
// Backend Reasons
// ============================================================================

/// The configuration store or service registry could not be reached.
pub const REASON_BACKEND_UNAVAILABLE: &str = "BackendUnavailable";

/// The backend answered with an unexpected HTTP status.
pub const REASON_BACKEND_UNEXPECTED_STATUS: &str = "BackendUnexpectedStatus";

/// The backend rolled back an atomic transaction.
pub const REASON_TRANSACTION_REJECTED: &str = "TransactionRejected";

/// The backend answered with a body that could not be decoded.
pub const REASON_BACKEND_DECODE_ERROR: &str = "BackendDecodeError";

/// A configuration key was malformed and never sent to the store.
pub const REASON_INVALID_KEY: &str = "InvalidKey";

// ============================================================================
// API Reasons
// ============================================================================

/// The requested resource does not exist.
pub const REASON_NOT_FOUND: &str = "NotFound";

/// The request body was malformed.
pub const REASON_BAD_REQUEST: &str = "BadRequest";

/// An unexpected internal error.
pub const REASON_INTERNAL_ERROR: &str = "InternalError";

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
