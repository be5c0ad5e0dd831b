// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_backoff() -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(2),
            Some(Duration::from_secs(5)),
            2.0,
            0.0,
        )
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable {
            endpoint: "http://127.0.0.1:8500".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    /// Test that backoff configuration has expected values
    #[test]
    fn test_http_backoff_configuration() {
        let backoff = http_backoff();

        assert_eq!(backoff.current_interval, Duration::from_millis(50));
        assert_eq!(backoff.max_interval, Duration::from_secs(2));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(10)));

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(backoff.multiplier, 2.0);
            assert_eq!(backoff.randomization_factor, 0.1);
        }
    }

    /// Test that intervals double and are capped at the maximum
    #[test]
    fn test_backoff_growth_and_capping() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(350),
            None,
            2.0,
            0.0,
        );

        let intervals: Vec<Duration> = (0..4).filter_map(|_| backoff.next_backoff()).collect();

        assert_eq!(
            intervals,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    /// Test that jitter stays within the randomization factor
    #[test]
    fn test_jitter_bounds() {
        let mut backoff = http_backoff();

        let first = backoff.next_backoff().unwrap();

        assert!(first >= Duration::from_millis(44), "{first:?}");
        assert!(first <= Duration::from_millis(56), "{first:?}");
    }

    /// Test that the backoff stops after the maximum elapsed time
    #[test]
    fn test_backoff_exhausts() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Some(Duration::ZERO),
            2.0,
            0.0,
        );

        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn test_retryable_http_statuses() {
        for status in [429, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(status).unwrap();
            assert!(is_retryable_http_status(status), "{status}");
        }
        for status in [400, 401, 403, 404, 409, 501] {
            let status = StatusCode::from_u16(status).unwrap();
            assert!(!is_retryable_http_status(status), "{status}");
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result: Result<&str, StoreError> = retry_backend_read(
            fast_backoff(),
            || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok("value")
                }
            },
            "get key",
        )
        .await;

        assert_eq!(result.unwrap(), "value");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result: Result<(), RegistryError> = retry_backend_read(
            fast_backoff(),
            || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::UnexpectedStatus {
                    service: "homesite-website-abc".to_string(),
                    status_code: 403,
                    body: "Permission denied".to_string(),
                })
            },
            "query service",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_backoff_returns_last_error() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Some(Duration::from_millis(20)),
            1.0,
            0.0,
        );

        let result: Result<(), StoreError> =
            retry_backend_read(backoff, || async { Err(unavailable()) }, "get key").await;

        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
