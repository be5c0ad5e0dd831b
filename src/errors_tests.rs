// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;
    use std::path::PathBuf;

    #[test]
    fn test_malformed_domain_error() {
        let error = ValidationError::MalformedDomain {
            host: "-bad-.com".to_string(),
        };

        assert_eq!(error.to_string(), "Host '-bad-.com' is not a valid domain name");
        assert_eq!(error.status_reason(), "MalformedDomain");
        assert!(!error.is_dns_failure());
    }

    #[test]
    fn test_subdomain_user_mismatch_error() {
        let error = ValidationError::SubdomainUserMismatch {
            host: "jimmy.netsoc.co".to_string(),
            subdomain: "jimmy".to_string(),
            user: "jim".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Host 'jimmy.netsoc.co' - subdomain 'jimmy' must be the same as the owner's username 'jim'"
        );
        assert_eq!(error.status_reason(), "SubdomainUserMismatch");
    }

    #[test]
    fn test_traversal_rejected_error() {
        let error = ValidationError::TraversalRejected {
            entry: "evil.com".to_string(),
            target: PathBuf::from("/etc"),
        };

        assert_eq!(
            error.to_string(),
            "Entry 'evil.com' points to /etc, which is outside the www directory"
        );
        assert_eq!(error.status_reason(), "TraversalRejected");
    }

    #[test]
    fn test_dns_failures_are_flagged() {
        let unresolvable = ValidationError::UnresolvableDomain {
            host: "example.com".to_string(),
            reason: "no A/AAAA records".to_string(),
        };
        let proof = ValidationError::OwnershipProofMissing {
            host: "example.com".to_string(),
            record: "_homesite.example.com".to_string(),
            user: "alice".to_string(),
            reason: "NXDOMAIN".to_string(),
        };
        let broken = ValidationError::BrokenSymlink {
            entry: "example.com".to_string(),
            reason: "No such file or directory".to_string(),
        };

        assert!(unresolvable.is_dns_failure());
        assert!(proof.is_dns_failure());
        assert!(!broken.is_dns_failure());
    }

    #[test]
    fn test_validation_error_serializes_reason_and_message() {
        let error = ValidationError::InvalidSymlinkTarget {
            entry: "files.example.com".to_string(),
            target: PathBuf::from("/home/alice/www/index.html"),
        };

        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["reason"], "InvalidSymlinkTarget");
        assert_eq!(
            json["message"],
            "Entry 'files.example.com' points to /home/alice/www/index.html, which is not a directory"
        );
    }

    #[test]
    fn test_discovery_error_per_user_classification() {
        let fatal = DiscoveryError::HomeDirsUnreadable {
            path: PathBuf::from("/home"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let missing = DiscoveryError::WwwDirMissing {
            user: "alice".to_string(),
            path: PathBuf::from("/home/alice/www"),
        };

        assert!(!fatal.is_per_user());
        assert_eq!(fatal.status_reason(), "HomeDirsUnreadable");
        assert!(missing.is_per_user());
        assert_eq!(missing.status_reason(), "WwwDirMissing");
    }

    #[test]
    fn test_store_error_transient_classification() {
        let unavailable = StoreError::Unavailable {
            endpoint: "http://127.0.0.1:8500".to_string(),
            reason: "connection refused".to_string(),
        };
        let server_error = StoreError::UnexpectedStatus {
            key: "traefik/http/routers/x/rule".to_string(),
            status_code: 503,
            body: String::new(),
        };
        let forbidden = StoreError::UnexpectedStatus {
            key: "traefik/http/routers/x/rule".to_string(),
            status_code: 403,
            body: "ACL not found".to_string(),
        };
        let rejected = StoreError::TransactionRejected {
            operations: 6,
            reason: "index mismatch".to_string(),
        };

        assert!(unavailable.is_transient());
        assert!(server_error.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!rejected.is_transient());
        assert_eq!(rejected.status_reason(), "TransactionRejected");
    }

    #[test]
    fn test_backend_status_transience_follows_retry_policy() {
        let status = |status_code| StoreError::UnexpectedStatus {
            key: "traefik/http/routers/x/rule".to_string(),
            status_code,
            body: String::new(),
        };

        assert!(status(429).is_transient());
        assert!(status(502).is_transient());
        assert!(!status(501).is_transient());
        assert!(!status(999).is_transient());
        assert!(!RegistryError::UnexpectedStatus {
            service: "homesite-website-abc".to_string(),
            status_code: 505,
            body: String::new(),
        }
        .is_transient());
    }

    #[test]
    fn test_registry_error_display() {
        let error = RegistryError::UnexpectedStatus {
            service: "homesite-website-abc".to_string(),
            status_code: 500,
            body: "internal".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Service registry returned HTTP 500 for service 'homesite-website-abc': internal"
        );
        assert!(error.is_transient());
        assert_eq!(error.status_reason(), "BackendUnexpectedStatus");
    }
}
