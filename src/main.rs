//! flowsink: batch newline-delimited input with reader backpressure.
//!
//! # Usage
//!
//! ```bash
//! flowsink --input events.log --buffer-size 100 --queue-limit 4 > batches.jsonl
//! ```
//!
//! Environment variables can also be used:
//! - `FLOWSINK_BUFFER_SIZE`: Units per batch
//! - `FLOWSINK_QUEUE_LIMIT`: Queued batches before the reader pauses
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::{Context, Result};
use flowsink::config::Config;
use flowsink::observability::metrics::init_metrics_with_endpoint;
use flowsink::observability::tracing::init_tracing;
use flowsink::pipeline::run_pipeline;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let input = config
        .input
        .as_ref()
        .map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
    eprintln!(
        r#"
  flowsink v{}

  Configuration:
    Input:         {}
    Buffer Size:   {}
    Queue Limit:   {}
    Failures:      {:?}
    Backpressure:  {:?}

  Press Ctrl+C to stop reading and drain.
"#,
        version,
        input,
        config.buffer_size,
        config.queue_limit,
        config.failure_policy,
        config.backpressure_mode
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    init_tracing(&config.log_level, config.log_json);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    print_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx_clone.send(true);
    });

    let stdout = tokio::io::stdout();
    let report = match &config.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input: {}", path.display()))?;
            run_pipeline(&config, file, stdout, shutdown_rx).await?
        }
        None => run_pipeline(&config, tokio::io::stdin(), stdout, shutdown_rx).await?,
    };

    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    drop(shutdown_tx);
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        tracing::info!("Received SIGINT (Ctrl+C), finishing input...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, finishing input...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                tracing::info!("Received SIGINT (Ctrl+C), finishing input...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if ctrl_c.await.is_ok() {
            tracing::info!("Received Ctrl+C, finishing input...");
        }
    }
}
