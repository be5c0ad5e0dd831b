// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dns.rs`

use super::*;
use std::net::Ipv4Addr;

#[tokio::test]
async fn test_static_resolver_known_host() {
    let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    let resolver = StaticResolver::new().with_host("alice.netsoc.co", &[addr]);

    let addrs = resolver.lookup_host("alice.netsoc.co").await.unwrap();
    assert_eq!(addrs, vec![addr]);
}

#[tokio::test]
async fn test_static_resolver_unknown_host_fails() {
    let resolver = StaticResolver::new();
    assert!(resolver.lookup_host("nowhere.example").await.is_err());
}

#[tokio::test]
async fn test_static_resolver_txt_records() {
    let resolver = StaticResolver::new()
        .with_txt("_homesite.example.com", &["alice", "v=spf1 -all"])
        .fail_txt("_homesite.broken.com");

    assert_eq!(
        resolver.lookup_txt("_homesite.example.com").await.unwrap(),
        vec!["alice".to_string(), "v=spf1 -all".to_string()]
    );
    assert!(resolver
        .lookup_txt("_homesite.missing.com")
        .await
        .unwrap()
        .is_empty());
    assert!(resolver.lookup_txt("_homesite.broken.com").await.is_err());
}

#[test]
fn test_hickory_resolver_construction() {
    let server: SocketAddr = "127.0.0.1:53".parse().unwrap();
    let resolver = HickoryResolver::new(server, Duration::from_secs(2));

    assert_eq!(resolver.server, server);
    assert_eq!(resolver.timeout, Duration::from_secs(2));
}
