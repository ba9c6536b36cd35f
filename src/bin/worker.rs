use art_intake::{
    config::AppConfig,
    db::{self, jobs::PgJobQueue, targets::PgTargetStore},
    services::{
        fetch::HttpImageFetcher,
        vision::GoogleVisionClient,
        worker::{Pipeline, Worker},
    },
    telemetry,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting image intake worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    telemetry::describe_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, config.pool_size())
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let fetcher = HttpImageFetcher::new(config.fetch_timeout(), config.max_image_bytes)
        .expect("Failed to initialize image fetcher");

    let vision = GoogleVisionClient::new(
        &config.vision_endpoint,
        &config.vision_api_key,
        config.vision_timeout(),
    )
    .expect("Failed to initialize vision client");

    let pipeline = Pipeline::new(
        Arc::new(PgJobQueue::new(db_pool.clone())),
        Arc::new(PgTargetStore::new(db_pool)),
        Arc::new(vision),
        Arc::new(fetcher),
    );

    let worker = Worker::new(config.worker_settings(), pipeline);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("Worker ready, starting job processing loop");
    worker.run(shutdown_rx).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
