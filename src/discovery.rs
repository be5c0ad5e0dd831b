// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Website discovery in users' home directories.
//!
//! Every entry under the home-directories root is a username; every entry of
//! `<root>/<user>/<www>` is a candidate virtual host. Plain directories become
//! websites rooted at themselves. Symlinks either alias an already-discovered
//! website (same canonical target) or create a new website rooted at a
//! directory strictly inside the www tree.
//!
//! ## Ordering
//!
//! A user's www directory is scanned in two passes: plain directories first,
//! then symlinks. A symlink may only merge into a website the directory pass
//! has already produced. Within a pass, DNS validation of the candidates runs
//! concurrently, but results are applied in entry-name order so a scan is
//! deterministic. Different users are scanned concurrently, bounded by
//! [`DiscoveryConfig::concurrency`].
//!
//! ## Traversal control
//!
//! A symlink whose canonical target is not strictly inside the canonical www
//! directory is rejected as [`ValidationError::TraversalRejected`] before any
//! DNS lookup. Targets are compared after full canonicalization, so `..`
//! segments and multi-hop links cannot escape the tree.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_DISCOVERY_CONCURRENCY, DEFAULT_HOME_DIRS_ROOT, DEFAULT_WWW_DIR_NAME};
use crate::errors::{DiscoveryError, ValidationError};
use crate::models::{InvalidWebsite, Website};
use crate::validator::OwnershipValidator;

/// Where and how to look for websites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Directory whose entries are users' home directories
    pub home_dirs_root: PathBuf,
    /// Name of the web directory inside each home directory
    pub www_dir_name: String,
    /// Maximum number of users scanned at once
    pub concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            home_dirs_root: PathBuf::from(DEFAULT_HOME_DIRS_ROOT),
            www_dir_name: DEFAULT_WWW_DIR_NAME.to_string(),
            concurrency: DEFAULT_DISCOVERY_CONCURRENCY,
        }
    }
}

/// Result of a discovery pass: valid websites and rejected candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Websites that passed every check
    pub valid: Vec<Website>,
    /// Candidates that were rejected, with their reasons
    pub invalid: Vec<InvalidWebsite>,
}

impl DiscoveryReport {
    /// Find the valid website serving `host`.
    #[must_use]
    pub fn website_for_host(&self, host: &str) -> Option<&Website> {
        self.valid.iter().find(|website| website.serves(host))
    }

    /// Find the rejection recorded for `host`.
    #[must_use]
    pub fn invalid_for_host(&self, host: &str) -> Option<&InvalidWebsite> {
        self.invalid
            .iter()
            .find(|invalid| invalid.hosts.iter().any(|h| h == host))
    }

    fn extend(&mut self, other: DiscoveryReport) {
        self.valid.extend(other.valid);
        self.invalid.extend(other.invalid);
    }
}

/// Discovers websites in users' www directories.
#[derive(Clone)]
pub struct WebsiteDiscovery {
    config: DiscoveryConfig,
    validator: OwnershipValidator,
}

/// What a www entry turned into before DNS validation.
enum Candidate {
    /// New website rooted at the given canonical path
    Root(PathBuf),
    /// Alias of the already-discovered website rooted at the given path
    Alias(PathBuf),
}

/// Accumulator owned by a single `by_user` call.
struct UserScan<'a> {
    user: &'a str,
    websites: BTreeMap<PathBuf, Website>,
    invalid: Vec<InvalidWebsite>,
}

impl<'a> UserScan<'a> {
    fn new(user: &'a str) -> Self {
        Self {
            user,
            websites: BTreeMap::new(),
            invalid: Vec::new(),
        }
    }

    fn reject(&mut self, name: &str, root: impl Into<PathBuf>, reason: ValidationError) {
        warn!(
            user = %self.user,
            host = %name,
            reason = reason.status_reason(),
            "Rejected website: {reason}"
        );
        self.invalid
            .push(InvalidWebsite::new(name, root, self.user, reason));
    }

    fn accept(&mut self, name: &str, candidate: Candidate) {
        let root = match candidate {
            Candidate::Root(root) | Candidate::Alias(root) => root,
        };
        debug!(user = %self.user, host = %name, root = ?root, "Accepted website host");
        self.websites
            .entry(root.clone())
            .or_insert_with(|| Website::new(root, self.user))
            .hosts
            .insert(name.to_string());
    }

    fn into_report(self) -> DiscoveryReport {
        DiscoveryReport {
            valid: self.websites.into_values().collect(),
            invalid: self.invalid,
        }
    }
}

impl WebsiteDiscovery {
    /// Create a discovery engine validating hosts with `validator`.
    #[must_use]
    pub fn new(config: DiscoveryConfig, validator: OwnershipValidator) -> Self {
        Self { config, validator }
    }

    /// The discovery configuration.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Path of `user`'s www directory (not canonicalized).
    #[must_use]
    pub fn www_dir(&self, user: &str) -> PathBuf {
        self.config
            .home_dirs_root
            .join(user)
            .join(&self.config.www_dir_name)
    }

    /// Discover the websites of every user.
    ///
    /// Users failing with a per-user error (no www directory, unreadable www
    /// directory) are skipped. Websites are returned grouped by user in
    /// username order.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::HomeDirsUnreadable`] if the home-directories
    /// root itself cannot be listed.
    pub async fn list(&self) -> Result<DiscoveryReport, DiscoveryError> {
        let users = self.list_users().await?;

        let results: Vec<(String, Result<DiscoveryReport, DiscoveryError>)> = stream::iter(users)
            .map(|user| async move {
                let result = self.by_user(&user).await;
                (user, result)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = DiscoveryReport::default();
        for (user, result) in results {
            match result {
                Ok(user_report) => report.extend(user_report),
                Err(e) if e.is_per_user() => {
                    debug!(user = %user, reason = e.status_reason(), "Skipping user: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            valid = report.valid.len(),
            invalid = report.invalid.len(),
            "Discovery pass complete"
        );
        Ok(report)
    }

    /// Discover the websites of a single user.
    ///
    /// # Errors
    ///
    /// Returns a per-user [`DiscoveryError`] if the username is not a plain
    /// directory name, or if the user's www directory is missing, not a
    /// directory or cannot be read.
    pub async fn by_user(&self, user: &str) -> Result<DiscoveryReport, DiscoveryError> {
        if !is_plain_name(user) {
            return Err(DiscoveryError::InvalidUsername {
                user: user.to_string(),
            });
        }

        let www = self.www_dir(user);
        let io_error = |path: &Path, source: std::io::Error| DiscoveryError::Io {
            user: user.to_string(),
            path: path.to_path_buf(),
            source,
        };

        match tokio::fs::metadata(&www).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(DiscoveryError::WwwNotDirectory {
                    user: user.to_string(),
                    path: www,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DiscoveryError::WwwDirMissing {
                    user: user.to_string(),
                    path: www,
                })
            }
            Err(e) => return Err(io_error(&www, e)),
        }

        let canonical_www = tokio::fs::canonicalize(&www)
            .await
            .map_err(|e| io_error(&www, e))?;
        let (directories, symlinks) = self
            .read_entries(&www)
            .await
            .map_err(|e| io_error(&www, e))?;

        debug!(
            user = %user,
            directories = directories.len(),
            symlinks = symlinks.len(),
            "Scanning www directory"
        );

        let mut scan = UserScan::new(user);

        let candidates = self.classify_directories(&mut scan, &www, directories).await;
        self.validate_and_apply(&mut scan, candidates).await;

        let candidates = self
            .classify_symlinks(&mut scan, &www, &canonical_www, symlinks)
            .await;
        self.validate_and_apply(&mut scan, candidates).await;

        Ok(scan.into_report())
    }

    async fn list_users(&self) -> Result<Vec<String>, DiscoveryError> {
        let root = &self.config.home_dirs_root;
        let unreadable = |source| DiscoveryError::HomeDirsUnreadable {
            path: root.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(root).await.map_err(unreadable)?;
        let mut users = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            match entry.file_name().into_string() {
                Ok(name) => users.push(name),
                Err(name) => warn!(entry = ?name, "Skipping home directory with non UTF-8 name"),
            }
        }
        users.sort();
        Ok(users)
    }

    /// Split a www directory's entries into (directories, symlinks), each
    /// sorted by name. Other entries are ignored.
    async fn read_entries(&self, www: &Path) -> std::io::Result<(Vec<String>, Vec<String>)> {
        let mut directories = Vec::new();
        let mut symlinks = Vec::new();

        let mut entries = tokio::fs::read_dir(www).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(entry = ?entry.file_name(), "Skipping www entry with non UTF-8 name");
                continue;
            };

            if file_type.is_symlink() {
                symlinks.push(name);
            } else if file_type.is_dir() {
                directories.push(name);
            } else {
                debug!(entry = %name, "Ignoring www entry that is neither a directory nor a symlink");
            }
        }

        directories.sort();
        symlinks.sort();
        Ok((directories, symlinks))
    }

    async fn classify_directories(
        &self,
        scan: &mut UserScan<'_>,
        www: &Path,
        names: Vec<String>,
    ) -> Vec<(String, Candidate)> {
        let mut candidates = Vec::with_capacity(names.len());
        for name in names {
            match tokio::fs::canonicalize(www.join(&name)).await {
                Ok(root) => candidates.push((name, Candidate::Root(root))),
                Err(e) => {
                    let reason = ValidationError::BrokenSymlink {
                        entry: name.clone(),
                        reason: e.to_string(),
                    };
                    scan.reject(&name, PathBuf::new(), reason);
                }
            }
        }
        candidates
    }

    async fn classify_symlinks(
        &self,
        scan: &mut UserScan<'_>,
        www: &Path,
        canonical_www: &Path,
        names: Vec<String>,
    ) -> Vec<(String, Candidate)> {
        let mut candidates = Vec::with_capacity(names.len());
        for name in names {
            let target = match tokio::fs::canonicalize(www.join(&name)).await {
                Ok(target) => target,
                Err(e) => {
                    let reason = ValidationError::BrokenSymlink {
                        entry: name.clone(),
                        reason: e.to_string(),
                    };
                    scan.reject(&name, PathBuf::new(), reason);
                    continue;
                }
            };

            if scan.websites.contains_key(&target) {
                candidates.push((name, Candidate::Alias(target)));
                continue;
            }

            if !is_strictly_inside(canonical_www, &target) {
                let reason = ValidationError::TraversalRejected {
                    entry: name.clone(),
                    target: target.clone(),
                };
                scan.reject(&name, target, reason);
                continue;
            }

            // canonicalize succeeded, so the target exists
            let is_dir = tokio::fs::metadata(&target)
                .await
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
            if !is_dir {
                let reason = ValidationError::InvalidSymlinkTarget {
                    entry: name.clone(),
                    target: target.clone(),
                };
                scan.reject(&name, target, reason);
                continue;
            }

            candidates.push((name, Candidate::Root(target)));
        }
        candidates
    }

    /// Validate every candidate concurrently, then apply results in order.
    async fn validate_and_apply(&self, scan: &mut UserScan<'_>, candidates: Vec<(String, Candidate)>) {
        let user = scan.user;
        let results = join_all(
            candidates
                .iter()
                .map(|(name, _)| self.validator.validate(name, user)),
        )
        .await;

        for ((name, candidate), result) in candidates.into_iter().zip(results) {
            match result {
                Ok(()) => scan.accept(&name, candidate),
                Err(reason) => {
                    let root = match &candidate {
                        Candidate::Root(root) | Candidate::Alias(root) => root.clone(),
                    };
                    scan.reject(&name, root, reason);
                }
            }
        }
    }
}

/// Returns true if `target` lies strictly below `base`.
///
/// Both paths must already be canonical. `base` itself is not inside `base`.
#[must_use]
pub fn is_strictly_inside(base: &Path, target: &Path) -> bool {
    target
        .strip_prefix(base)
        .is_ok_and(|rest| rest.components().next().is_some())
}

/// Returns true if `name` is a single normal path component.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod discovery_tests;
