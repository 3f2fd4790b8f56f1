use clap::Parser;
use publications_core::config;
use publications_core::storage::load_from_dir;
use publications_server::api::create_router;
use publications_server::api::handlers::{save_and_truncate, AppState};
use publications_server::api::metrics;
use publications_server::wal_async::WriteAheadLog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "publications-server", about = "Rental publications service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PUBLICATIONS_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Data directory for the snapshot and the WAL
    #[arg(short, long, env = "PUBLICATIONS_DATA_DIR", default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Snapshot interval in seconds (0 = disabled)
    #[arg(long, env = "PUBLICATIONS_SNAPSHOT_INTERVAL", default_value_t = config::DEFAULT_SNAPSHOT_INTERVAL_SECS)]
    snapshot_interval: u64,

    /// Graceful shutdown timeout in seconds
    #[arg(long, env = "PUBLICATIONS_SHUTDOWN_TIMEOUT", default_value_t = config::DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    shutdown_timeout: u64,

    /// Fail startup if WAL replay encounters errors (strict mode)
    #[arg(long, env = "PUBLICATIONS_WAL_STRICT", default_value_t = false)]
    wal_strict: bool,

    /// TLS certificate file path
    #[arg(long, env = "PUBLICATIONS_TLS_CERT")]
    tls_cert: Option<String>,

    /// TLS private key file path
    #[arg(long, env = "PUBLICATIONS_TLS_KEY")]
    tls_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(
                    "publications_server=info"
                        .parse()
                        .expect("valid directive literal"),
                )
                .add_directive(
                    "publications_core=info"
                        .parse()
                        .expect("valid directive literal"),
                ),
        )
        .init();

    let args = Args::parse();

    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }
    if args.data_dir.exists() && !args.data_dir.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            args.data_dir.display()
        );
        std::process::exit(1);
    }

    // A snapshot that exists but cannot be read is fatal: starting empty would
    // let the next snapshot overwrite it.
    let store = match load_from_dir(&args.data_dir) {
        Ok(store) => {
            tracing::info!(publications = store.len(), "Snapshot loaded");
            store
        }
        Err(e) => {
            eprintln!(
                "Error: could not load snapshot from '{}': {}",
                args.data_dir.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let wal = Arc::new(WriteAheadLog::new(&args.data_dir)?);

    match wal.replay() {
        Ok((entries, stats)) => {
            if !stats.is_clean() {
                tracing::warn!(
                    "WAL replay stats: {} ok, {} skipped, {} CRC errors, truncated={}",
                    stats.success,
                    stats.skipped,
                    stats.crc_errors,
                    stats.truncated
                );
                if args.wal_strict {
                    eprintln!(
                        "Error: WAL replay encountered errors (strict mode). \
                         {} CRC errors, {} skipped, truncated={}. \
                         Fix the WAL or restart without --wal-strict.",
                        stats.crc_errors, stats.skipped, stats.truncated
                    );
                    std::process::exit(1);
                }
            }
            if !entries.is_empty() {
                tracing::info!("Replaying {} WAL entries", entries.len());
                let applied = store.replay(&entries);
                tracing::info!(
                    "WAL replay complete: {applied}/{} entries applied",
                    entries.len()
                );
            }
        }
        Err(e) => {
            if args.wal_strict {
                eprintln!(
                    "Error: WAL replay failed (strict mode): {}. \
                     Fix the WAL or restart without --wal-strict.",
                    e
                );
                std::process::exit(1);
            }
            tracing::warn!("WAL replay failed: {}", e);
        }
    }

    let prometheus_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let state = AppState::new(
        store.clone(),
        args.data_dir.clone(),
        wal.clone(),
        prometheus_handle,
    )?;

    let app = create_router(state.clone());
    let addr = format!("0.0.0.0:{}", args.port);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        data_dir = %args.data_dir.display(),
        snapshot_interval_secs = args.snapshot_interval,
        tls = args.tls_cert.is_some(),
        publications = store.len(),
        "publications service ready"
    );

    // Store gauges
    let metrics_store = store.clone();
    let metrics_wal = wal.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            interval.tick().await;
            metrics::update_store_metrics(&metrics_store);
            metrics::update_wal_metrics(metrics_wal.path());
        }
    });

    if args.snapshot_interval > 0 {
        let snap_state = state.clone();
        let snap_interval = args.snapshot_interval;
        tracing::info!("Auto-snapshots enabled every {}s", snap_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(snap_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                match save_and_truncate(&snap_state).await {
                    Ok(count) => tracing::info!(
                        publications = count,
                        "Periodic snapshot complete, WAL truncated"
                    ),
                    Err(e) => tracing::error!("Periodic snapshot failed: {}", e),
                }
            }
        });
    }

    let shutdown_timeout = args.shutdown_timeout;
    match (args.tls_cert, args.tls_key) {
        (Some(cert), Some(key)) => {
            tracing::info!("TLS enabled");
            let tls_config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key).await?;
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                wait_for_signal().await;
                shutdown_handle.graceful_shutdown(Some(Duration::from_secs(shutdown_timeout)));
            });
            axum_server::bind_rustls(addr.parse()?, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        (None, None) => {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_signal())
                .await?;
        }
        _ => {
            eprintln!("Error: Both --tls-cert and --tls-key must be provided together");
            std::process::exit(1);
        }
    }

    flush_and_shutdown(&state, shutdown_timeout).await;

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down gracefully, draining in-flight requests...");
}

/// Final snapshot. On failure or timeout the WAL is kept for the next start.
async fn flush_and_shutdown(state: &AppState, timeout_secs: u64) {
    tracing::info!("All requests drained, flushing data...");

    match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        save_and_truncate(state),
    )
    .await
    {
        Ok(Ok(count)) => {
            tracing::info!(publications = count, "Snapshot saved on shutdown, WAL truncated")
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to save snapshot on shutdown: {}", e);
            tracing::warn!("WAL preserved for recovery");
        }
        Err(_) => {
            tracing::error!(
                "Shutdown flush timeout ({}s) exceeded, WAL preserved for recovery",
                timeout_secs
            );
        }
    }
}
