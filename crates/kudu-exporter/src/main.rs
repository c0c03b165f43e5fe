//! kudu-exporter — republishes a Kudu server's `/metrics` as Prometheus gauges.
//!
//! Assembles:
//! - Upstream poll loop (fetch, decode, map)
//! - Filter file reload loop
//! - `/metrics` + `/healthz` HTTP server
//!
//! # Usage
//!
//! ```text
//! kudu-exporter --url http://kudu-tserver:8050/metrics --include-file include.txt
//! ```
//!
//! The process exits non-zero when the upstream fails more than
//! `--max-fetch-failures` times in a row.

use std::net::SocketAddr;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kudu_exporter::{AppState, Cli, Config, build_router};
use kudu_exporter_metrics::registry::DEFAULT_SOURCE;
use kudu_exporter_metrics::{FilterSet, MetricRegistry};
use kudu_exporter_poller::{
    ExporterState, FailureBudget, HttpFetcher, PollLoop, PollStats, ReloadLoop, SharedState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli)?;

    init_tracing(config.log_json);

    run(config).await
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kudu_exporter=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(url = %config.url, port = config.port, "kudu exporter starting");

    // ── Initialize state ───────────────────────────────────────

    let filters = FilterSet::load(&config.filters)?;
    let registry = MetricRegistry::with_naming(config.prefix.clone(), DEFAULT_SOURCE);
    let stats = PollStats::register(registry.prometheus())?;
    let state = SharedState::new(ExporterState::new(filters, registry));

    let fetcher = HttpFetcher::new(&config.url, config.fetch_timeout)?;
    let poll = PollLoop::new(
        fetcher,
        state.clone(),
        config.interval,
        FailureBudget::new(config.max_fetch_failures),
    )
    .with_stats(stats.clone());

    let reload = if config.filters.is_empty() {
        None
    } else {
        Some(ReloadLoop::new(state.clone(), config.filters.clone(), config.reload_interval)?.with_stats(stats.clone()))
    };

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut poll_handle = tokio::spawn(poll.run(shutdown_rx.clone()));
    let reload_handle = reload.map(|reload| tokio::spawn(reload.run(shutdown_rx.clone())));

    // ── Start exposition server ────────────────────────────────

    let router = build_router(AppState { state, stats });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving /metrics");

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    // Run until Ctrl-C or until the poll loop gives up.
    let finished = tokio::select! {
        result = &mut poll_handle => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
            None
        }
    };
    let _ = shutdown_tx.send(true);

    let poll_result = match finished {
        Some(result) => result,
        None => poll_handle.await,
    }?;
    if let Some(handle) = reload_handle {
        let _ = handle.await;
    }
    server.await??;

    if let Err(e) = &poll_result {
        error!(error = %e, "exporter stopping");
    }
    poll_result?;

    info!("kudu exporter stopped");
    Ok(())
}
