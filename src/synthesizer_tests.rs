// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `synthesizer.rs`

use super::*;
use crate::config_store::MemoryConfigStore;
use std::collections::BTreeMap;

fn intent(host: &str, headers: &[(&str, &str)]) -> VirtualHostIntent {
    VirtualHostIntent {
        host: host.to_string(),
        path_prefix: "/jim/www/x.netsoc.co".to_string(),
        destination_server: "http://webserver:8080".to_string(),
        additional_request_headers: headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

#[test]
fn test_routing_namespace_is_sha256_hex() {
    assert_eq!(
        routing_namespace("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(routing_namespace("x.netsoc.co").len(), 64);
    assert_ne!(routing_namespace("x.netsoc.co"), routing_namespace("y.netsoc.co"));
}

#[test]
fn test_routing_keys_are_namespaced() {
    let keys = RoutingKeys::for_host("x.netsoc.co");
    let ns = routing_namespace("x.netsoc.co");

    assert_eq!(keys.router, format!("homesite-router-{ns}"));
    assert_eq!(keys.service, format!("homesite-service-{ns}"));
    assert_eq!(keys.rule_key(), format!("http/routers/homesite-router-{ns}/rule"));
    assert_eq!(
        keys.header_key("X-Homesite-User"),
        format!("http/middlewares/homesite-headers-{ns}/headers/customRequestHeaders/X-Homesite-User")
    );
    assert_eq!(
        keys.service_url_key(),
        format!("http/services/homesite-service-{ns}/loadBalancer/servers/0/url")
    );
}

#[test]
fn test_batch_order() {
    let intent = intent("x.netsoc.co", &[("X-B", "2"), ("X-A", "1")]);
    let keys = RoutingKeys::for_host("x.netsoc.co");

    let order: Vec<String> = build_batch(&intent).into_iter().map(|(k, _)| k).collect();

    assert_eq!(
        order,
        vec![
            keys.rule_key(),
            keys.header_key("X-A"),
            keys.header_key("X-B"),
            keys.prefix_key(),
            keys.middlewares_key(),
            keys.service_url_key(),
            keys.service_binding_key(),
        ]
    );
}

#[test]
fn test_batch_values() {
    let intent = intent("x.netsoc.co", &[]);
    let keys = RoutingKeys::for_host("x.netsoc.co");

    let batch: BTreeMap<String, String> = build_batch(&intent).into_iter().collect();

    assert_eq!(batch[&keys.rule_key()], "Host(`x.netsoc.co`)");
    assert_eq!(batch[&keys.prefix_key()], "/jim/www/x.netsoc.co");
    assert_eq!(batch[&keys.service_url_key()], "http://webserver:8080");
    assert_eq!(batch[&keys.service_binding_key()], keys.service);
    assert_eq!(
        batch[&keys.middlewares_key()],
        format!("{},{}", keys.headers_middleware, keys.prefix_middleware)
    );
}

#[tokio::test]
async fn test_synthesize_is_idempotent() {
    let store = Arc::new(MemoryConfigStore::new());
    let synthesizer = RouteSynthesizer::new(store.clone());
    let intent = intent("x.netsoc.co", &[("X-Homesite-User", "jim")]);

    synthesizer.synthesize(&intent).await.unwrap();
    let once = store.snapshot().await;
    synthesizer.synthesize(&intent).await.unwrap();
    let twice = store.snapshot().await;

    assert_eq!(once, twice);
    assert_eq!(once.len(), 6);
}

#[tokio::test]
async fn test_added_header_adds_exactly_one_key() {
    let store = Arc::new(MemoryConfigStore::new());
    let synthesizer = RouteSynthesizer::new(store.clone());

    synthesizer
        .synthesize(&intent("x.netsoc.co", &[("X-Homesite-User", "jim")]))
        .await
        .unwrap();
    let before = store.snapshot().await;

    let keys = synthesizer
        .synthesize(&intent(
            "x.netsoc.co",
            &[("X-Homesite-User", "jim"), ("X-Extra", "1")],
        ))
        .await
        .unwrap();
    let after = store.snapshot().await;

    assert_eq!(after.len(), before.len() + 1);
    assert!(after.contains_key(&keys.header_key("X-Extra")));
    let routers: Vec<&String> = after
        .keys()
        .filter(|k| k.ends_with("/rule"))
        .collect();
    assert_eq!(routers.len(), 1, "no duplicate router");
}

#[tokio::test]
async fn test_failure_stops_before_service_binding() {
    let keys = RoutingKeys::for_host("x.netsoc.co");
    let store = Arc::new(MemoryConfigStore::new().failing_on(&keys.prefix_key()));
    let synthesizer = RouteSynthesizer::new(store.clone());

    let err = synthesizer
        .synthesize(&intent("x.netsoc.co", &[]))
        .await
        .unwrap_err();

    assert_eq!(err.status_reason(), "BackendUnexpectedStatus");
    assert_eq!(store.write_log().await, vec![keys.rule_key()]);
    assert_eq!(store.get_kv(&keys.service_binding_key()).await.unwrap(), None);
}

#[tokio::test]
async fn test_distinct_hosts_do_not_share_keys() {
    let store = Arc::new(MemoryConfigStore::new());
    let synthesizer = RouteSynthesizer::new(store.clone());

    synthesizer.synthesize(&intent("x.netsoc.co", &[])).await.unwrap();
    synthesizer.synthesize(&intent("y.netsoc.co", &[])).await.unwrap();

    assert_eq!(store.snapshot().await.len(), 10);
}

#[tokio::test]
async fn test_relative_header_name_cannot_reach_other_namespace() {
    let store = Arc::new(MemoryConfigStore::new());
    let synthesizer = RouteSynthesizer::new(store.clone());
    let victim = RoutingKeys::for_host("victim.netsoc.co");
    let header = format!("../../../routers/{}/rule", victim.router);

    let err = synthesizer
        .synthesize(&intent("x.netsoc.co", &[(header.as_str(), "Host(`x.netsoc.co`)")]))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidKey { .. }));
    assert!(store.snapshot().await.is_empty());
}
