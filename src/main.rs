// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use homesite::{
    api,
    config::Config,
    constants::{TOKIO_THREAD_NAME, TOKIO_WORKER_THREADS},
    context::Context,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize logging with custom format
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Respects RUST_LOG_FORMAT (or --log-format) for output format
    init_tracing(config.json_logs());
    config.validate()?;

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(TOKIO_THREAD_NAME)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .with_ansi(true)
            .compact()
            .init();
    }
}

async fn async_main(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting homesite control plane");
    debug!(
        home_dirs_root = ?config.home_dirs_root,
        base_domain = %config.base_domain,
        dry_run = config.dry_run,
        "Loaded configuration"
    );

    let context = Arc::new(Context::from_config(&config)?);
    let listener = TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_address))?;

    run_until(
        context,
        listener,
        config.poll_interval(),
        wait_for_shutdown_signal(),
    )
    .await
}

/// Run the reconciliation loop and the API until `signal` resolves or the
/// API exits on its own.
async fn run_until<F>(
    context: Arc<Context>,
    listener: TcpListener,
    poll_interval: Duration,
    signal: F,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = tokio::spawn(context.reconciler(poll_interval).run(shutdown_rx.clone()));
    let mut server = tokio::spawn(api::serve(listener, context, shutdown_rx));

    let outcome = tokio::select! {
        result = signal => {
            let _ = shutdown_tx.send(true);
            result.context("Failed to install signal handlers")?;
            info!("Initiating graceful shutdown");
            server.await.context("HTTP API task panicked")?
        }
        result = &mut server => {
            error!("CRITICAL: HTTP API exited unexpectedly");
            let _ = shutdown_tx.send(true);
            result.context("HTTP API task panicked")?
        }
    };

    reconciler.await.context("Reconciliation loop panicked")?;
    outcome?;

    info!("Graceful shutdown completed successfully");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
