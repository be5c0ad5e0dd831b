// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for context.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn config(args: &[&str]) -> Config {
        let argv = ["homesite", "--base-domain", "netsoc.co"]
            .into_iter()
            .chain(args.iter().copied());
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_from_config_dry_run() {
        let homes = TempDir::new().unwrap();
        let root = homes.path().to_str().unwrap();

        let context = Context::from_config(&config(&["--dry-run", "--home-dirs-root", root])).unwrap();

        assert_eq!(
            context.content_root,
            std::fs::canonicalize(homes.path()).unwrap()
        );
        assert_eq!(context.discovery.config().home_dirs_root, homes.path());
        assert_eq!(context.validator.config().base_domain, "netsoc.co");
    }

    #[test]
    fn test_from_config_keeps_missing_root() {
        let context = Context::from_config(&config(&[
            "--dry-run",
            "--home-dirs-root",
            "/nonexistent/homesite/homes",
        ]))
        .unwrap();

        assert_eq!(
            context.content_root,
            PathBuf::from("/nonexistent/homesite/homes")
        );
    }

    #[test]
    fn test_from_config_consul() {
        let context = Context::from_config(&config(&["--consul-url", "http://consul:8500"]));
        assert!(context.is_ok());
    }

    #[test]
    fn test_from_config_rejects_bad_consul_url() {
        let context = Context::from_config(&config(&["--consul-url", "not a url"]));
        assert!(context.is_err());
    }

    #[test]
    fn test_intent_for() {
        let context = Context::from_config(&config(&[
            "--dry-run",
            "--home-dirs-root",
            "/nonexistent/homes",
            "--destination-server",
            "http://web:8081",
        ]))
        .unwrap();
        let website = Website::with_host(
            "alice.netsoc.co",
            "/nonexistent/homes/alice/www/alice.netsoc.co",
            "alice",
        );

        let intent = context.intent_for("alice.netsoc.co", &website);

        assert_eq!(intent.path_prefix, "/alice/www/alice.netsoc.co");
        assert_eq!(intent.destination_server, "http://web:8081");
        assert_eq!(intent.additional_request_headers.len(), 2);
    }
}
