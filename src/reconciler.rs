// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Periodic reconciliation of discovered websites.
//!
//! On every tick the reconciler runs a full discovery pass, diffs the valid
//! websites against what it applied previously (keyed by canonical root) and
//! applies the difference:
//!
//! - **added** roots are registered and get routing configuration per host
//! - **changed** roots (different host set) have dropped hosts deregistered,
//!   then are registered and synthesized again
//! - **removed** roots have their hosts deregistered
//!
//! Invalid websites never drive a removal: a host that is currently rejected
//! for its owner is left in place, so a transient DNS failure cannot take a
//! live website down.
//!
//! The applied state lives in the reconciler only. A website whose apply fails
//! keeps its previous applied state, so the next tick retries it.
//!
//! A host that moves to another root is never deregistered: the root now
//! serving it owns its registration.
//!
//! Routing keys of deregistered hosts are left in the configuration store,
//! since the store capability offers no delete operation. Each such host is
//! logged at `warn` with its router name.

use anyhow::{Context as _, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::constants::{HEADER_WEBSITE_HOST, HEADER_WEBSITE_USER};
use crate::discovery::{DiscoveryReport, WebsiteDiscovery};
use crate::metrics;
use crate::models::{VirtualHostIntent, Website};
use crate::provider::WebsiteProvider;
use crate::synthesizer::{RouteSynthesizer, RoutingKeys};

/// Settings for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Time between discovery passes
    pub poll_interval: Duration,
    /// Canonical home-directories root; routing path prefixes are relative to it
    pub content_root: PathBuf,
    /// Load-balancer target written into every route
    pub destination_server: String,
}

/// A root whose host set differs from what was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteUpdate {
    /// The website as applied previously
    pub previous: Website,
    /// The website as discovered now
    pub website: Website,
    /// Previously applied hosts to deregister
    pub stale_hosts: BTreeSet<String>,
    /// Previously applied hosts kept registered because they are currently invalid
    pub retained_hosts: BTreeSet<String>,
}

/// An applied root that is no longer a valid website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteRemoval {
    /// The website as applied previously
    pub previous: Website,
    /// Hosts to deregister
    pub stale_hosts: BTreeSet<String>,
    /// Hosts kept registered because they are currently invalid
    pub retained_hosts: BTreeSet<String>,
}

/// Difference between the applied websites and a discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebsiteDiff {
    /// Websites whose root was not applied before
    pub added: Vec<Website>,
    /// Websites whose root was applied with a different host set
    pub changed: Vec<WebsiteUpdate>,
    /// Applied roots that disappeared
    pub removed: Vec<WebsiteRemoval>,
}

impl WebsiteDiff {
    /// Returns true if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Compute what has to be applied to move from `applied` to `report`.
///
/// A host dropped from an applied root is deregistered unless it is currently
/// reported invalid for the same user (it is retained) or another valid root
/// serves it now (that root owns its registration). Roots currently reported
/// invalid are left untouched.
#[must_use]
pub fn diff_websites(applied: &BTreeMap<PathBuf, Website>, report: &DiscoveryReport) -> WebsiteDiff {
    let invalid_hosts: HashSet<(&str, &str)> = report
        .invalid
        .iter()
        .flat_map(|invalid| {
            invalid
                .hosts
                .iter()
                .map(move |host| (invalid.user.as_str(), host.as_str()))
        })
        .collect();
    let invalid_roots: HashSet<&Path> = report
        .invalid
        .iter()
        .filter_map(|invalid| invalid.resolved_root())
        .collect();
    let valid_roots: HashSet<&Path> = report.valid.iter().map(|w| w.root.as_path()).collect();
    let valid_hosts: HashSet<&str> = report
        .valid
        .iter()
        .flat_map(|w| w.hosts.iter().map(String::as_str))
        .collect();

    // Split the hosts of `previous` missing from `kept` into (stale, retained)
    let dropped_hosts = |previous: &Website, kept: &BTreeSet<String>| {
        let mut stale = BTreeSet::new();
        let mut retained = BTreeSet::new();
        for host in previous.hosts.difference(kept) {
            if valid_hosts.contains(host.as_str()) {
                continue;
            }
            if invalid_hosts.contains(&(previous.user.as_str(), host.as_str())) {
                retained.insert(host.clone());
            } else {
                stale.insert(host.clone());
            }
        }
        (stale, retained)
    };
    let mut diff = WebsiteDiff::default();

    for website in &report.valid {
        let Some(previous) = applied.get(&website.root) else {
            diff.added.push(website.clone());
            continue;
        };

        let (stale_hosts, retained_hosts) = dropped_hosts(previous, &website.hosts);
        let next_hosts: BTreeSet<String> = website.hosts.union(&retained_hosts).cloned().collect();

        if next_hosts != previous.hosts || previous.user != website.user {
            diff.changed.push(WebsiteUpdate {
                previous: previous.clone(),
                website: website.clone(),
                stale_hosts,
                retained_hosts,
            });
        }
    }

    for (root, previous) in applied {
        if valid_roots.contains(root.as_path()) || invalid_roots.contains(root.as_path()) {
            continue;
        }
        let (stale_hosts, retained_hosts) = dropped_hosts(previous, &BTreeSet::new());
        if retained_hosts != previous.hosts {
            diff.removed.push(WebsiteRemoval {
                previous: previous.clone(),
                stale_hosts,
                retained_hosts,
            });
        }
    }

    diff
}

/// Routing path prefix of a website: its root relative to `content_root`.
///
/// `/home/jim/www/x.netsoc.co` under `/home` becomes `/jim/www/x.netsoc.co`.
/// Roots outside `content_root` keep their full path.
#[must_use]
pub fn path_prefix(content_root: &Path, root: &Path) -> String {
    let relative = root.strip_prefix(content_root).unwrap_or(root);
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Routing intent for one host of a validated website.
#[must_use]
pub fn website_intent(
    host: &str,
    website: &Website,
    content_root: &Path,
    destination_server: &str,
) -> VirtualHostIntent {
    VirtualHostIntent {
        host: host.to_string(),
        path_prefix: path_prefix(content_root, &website.root),
        destination_server: destination_server.to_string(),
        additional_request_headers: BTreeMap::from([
            (HEADER_WEBSITE_USER.to_string(), website.user.clone()),
            (HEADER_WEBSITE_HOST.to_string(), host.to_string()),
        ]),
    }
}

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Valid websites discovered
    pub valid: usize,
    /// Rejected entries discovered
    pub invalid: usize,
    /// Websites registered for the first time
    pub created: usize,
    /// Websites whose host set changed
    pub updated: usize,
    /// Applied roots that are no longer valid websites
    pub removed: usize,
    /// Websites whose apply failed and will be retried
    pub failed: usize,
    /// True if shutdown stopped the pass early
    pub interrupted: bool,
}

/// Drives discovery and applies its results.
pub struct Reconciler {
    config: ReconcilerConfig,
    discovery: WebsiteDiscovery,
    provider: Arc<dyn WebsiteProvider>,
    synthesizer: RouteSynthesizer,
    applied: BTreeMap<PathBuf, Website>,
}

impl Reconciler {
    /// Create a reconciler with empty applied state.
    #[must_use]
    pub fn new(
        config: ReconcilerConfig,
        discovery: WebsiteDiscovery,
        provider: Arc<dyn WebsiteProvider>,
        synthesizer: RouteSynthesizer,
    ) -> Self {
        Self {
            config,
            discovery,
            provider,
            synthesizer,
            applied: BTreeMap::new(),
        }
    }

    /// Websites applied so far, keyed by canonical root.
    #[must_use]
    pub fn applied(&self) -> &BTreeMap<PathBuf, Website> {
        &self.applied
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    ///
    /// Passes never overlap: a tick that fires during a slow pass is skipped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_interval = ?self.config.poll_interval,
            "Starting reconciliation loop"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            let start = Instant::now();
            match self.reconcile_once(&mut shutdown).await {
                Ok(summary) => {
                    metrics::record_reconciliation_success(start.elapsed());
                    if summary.interrupted {
                        break;
                    }
                }
                Err(e) => {
                    metrics::record_reconciliation_error(start.elapsed());
                    error!(error = %format!("{e:#}"), "Reconciliation pass failed, retrying on next tick");
                }
            }
        }

        info!("Reconciliation loop stopped");
    }

    /// Run one discovery pass and apply the resulting diff.
    ///
    /// Shutdown aborts discovery immediately and stops the apply phase
    /// between websites; a website being applied is always finished.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails as a whole (e.g. the
    /// home-directories root is unreadable). Failures applying a single
    /// website are logged and counted, not returned.
    pub async fn reconcile_once(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<PassSummary> {
        let report = tokio::select! {
            report = self.discovery.list() => report.context("Discovery pass failed")?,
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("Shutdown requested during discovery");
                return Ok(PassSummary { interrupted: true, ..PassSummary::default() });
            }
        };

        metrics::record_discovery(
            report.valid.len(),
            report.invalid.iter().map(|invalid| invalid.reason.status_reason()),
        );

        let diff = diff_websites(&self.applied, &report);
        let mut summary = PassSummary {
            valid: report.valid.len(),
            invalid: report.invalid.len(),
            ..PassSummary::default()
        };

        if diff.is_empty() {
            debug!(valid = summary.valid, invalid = summary.invalid, "No website changes");
            return Ok(summary);
        }

        for website in diff.added {
            if *shutdown.borrow() {
                summary.interrupted = true;
                break;
            }
            let ok = self.apply_added(website).await;
            metrics::record_website_operation("create", ok);
            if ok {
                summary.created += 1;
            } else {
                summary.failed += 1;
            }
        }

        for update in diff.changed {
            if summary.interrupted || *shutdown.borrow() {
                summary.interrupted = true;
                break;
            }
            let ok = self.apply_changed(update).await;
            metrics::record_website_operation("update", ok);
            if ok {
                summary.updated += 1;
            } else {
                summary.failed += 1;
            }
        }

        for website in diff.removed {
            if summary.interrupted || *shutdown.borrow() {
                summary.interrupted = true;
                break;
            }
            let ok = self.apply_removed(website).await;
            metrics::record_website_operation("delete", ok);
            if ok {
                summary.removed += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            valid = summary.valid,
            invalid = summary.invalid,
            created = summary.created,
            updated = summary.updated,
            removed = summary.removed,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }

    /// Register and route every host of `website`.
    async fn publish(&self, website: &Website) -> Result<()> {
        self.provider
            .create(website)
            .await
            .context("Failed to register website")?;

        for host in &website.hosts {
            let intent = website_intent(
                host,
                website,
                &self.config.content_root,
                &self.config.destination_server,
            );
            self.synthesizer
                .synthesize(&intent)
                .await
                .with_context(|| format!("Failed to synthesize routing for {host}"))?;
        }
        Ok(())
    }

    async fn unpublish(&self, hosts: &BTreeSet<String>) -> Result<()> {
        for host in hosts {
            self.provider
                .delete(host)
                .await
                .with_context(|| format!("Failed to deregister {host}"))?;
            warn!(
                host = %host,
                router = %RoutingKeys::for_host(host).router,
                "Deregistered host; its routing keys remain in the configuration store"
            );
        }
        Ok(())
    }

    async fn apply_added(&mut self, website: Website) -> bool {
        match self.publish(&website).await {
            Ok(()) => {
                info!(root = ?website.root, user = %website.user, hosts = ?website.hosts, "Website created");
                self.applied.insert(website.root.clone(), website);
                true
            }
            Err(e) => {
                error!(root = ?website.root, user = %website.user, error = %format!("{e:#}"), "Failed to create website");
                false
            }
        }
    }

    async fn apply_changed(&mut self, update: WebsiteUpdate) -> bool {
        let WebsiteUpdate {
            previous,
            website,
            stale_hosts,
            retained_hosts,
        } = update;

        let result = async {
            self.unpublish(&stale_hosts).await?;
            self.publish(&website).await
        }
        .await;

        match result {
            Ok(()) => {
                if !retained_hosts.is_empty() {
                    warn!(root = ?website.root, hosts = ?retained_hosts, "Keeping hosts that are currently invalid");
                }
                info!(
                    root = ?website.root,
                    user = %website.user,
                    previous_user = %previous.user,
                    hosts = ?website.hosts,
                    removed_hosts = ?stale_hosts,
                    "Website updated"
                );
                let mut applied = website;
                applied.hosts.extend(retained_hosts);
                self.applied.insert(applied.root.clone(), applied);
                true
            }
            Err(e) => {
                error!(root = ?website.root, user = %website.user, error = %format!("{e:#}"), "Failed to update website");
                false
            }
        }
    }

    async fn apply_removed(&mut self, removal: WebsiteRemoval) -> bool {
        let WebsiteRemoval {
            previous,
            stale_hosts,
            retained_hosts,
        } = removal;

        match self.unpublish(&stale_hosts).await {
            Ok(()) => {
                info!(root = ?previous.root, user = %previous.user, hosts = ?stale_hosts, "Website removed");
                if retained_hosts.is_empty() {
                    self.applied.remove(&previous.root);
                } else {
                    warn!(root = ?previous.root, hosts = ?retained_hosts, "Keeping hosts that are currently invalid");
                    let root = previous.root.clone();
                    self.applied.insert(
                        root,
                        Website {
                            hosts: retained_hosts,
                            ..previous
                        },
                    );
                }
                true
            }
            Err(e) => {
                error!(root = ?previous.root, user = %previous.user, error = %format!("{e:#}"), "Failed to remove website");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
