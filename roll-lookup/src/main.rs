use anyhow::Context;
use envconfig::Envconfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use roll_lookup::api::router;
use roll_lookup::bootstrap;
use roll_lookup::config::Config;

async fn shutdown_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

fn setup_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    const BUCKETS: &[f64] = &[
        1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 30000.0, 120000.0,
    ];

    Ok(PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .install_recorder()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("Invalid configuration")?;

    let log_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(log_layer)
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    tracing::info!("Starting roll-lookup service");
    tracing::info!("Data directory: {}", config.data_dir.display());

    if config.token.is_empty() {
        tracing::warn!("TOKEN is empty, every lookup will be rejected");
    }

    let plan = bootstrap::plan(&config.data_dir, &config.database_file)?;
    let service = bootstrap::open_service(&config, &plan).await?;

    let metrics = if *config.enable_metrics {
        Some(setup_metrics_recorder()?)
    } else {
        None
    };

    // Serve probes while the roll is imported; lookups answer 503 until ready.
    let app = router(service.clone(), &config.token, metrics);
    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .with_context(|| format!("could not bind {}", config.address))?;
    tracing::info!("Listening on {}", config.address);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    if let Err(e) = bootstrap::load(&service, &plan, config.source_encoding).await {
        tracing::error!(error = %e, "Roll import failed");
        return Err(e.into());
    }

    server.await??;
    service.close().await;
    Ok(())
}
