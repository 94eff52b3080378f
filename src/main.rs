//! putio-fetch - put.io transfer fetcher
//!
//! Listens for put.io transfer webhooks and pulls the finished files into the
//! local library.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use putio_fetch::jobs;
use putio_fetch::services::{
    CompletionHandler, DownloadDispatcher, ExtensionFilter, ExtractorService, HttpDownloader,
    NotificationService, PutioClient, TransferMetadataStore, TransferPipeline, download_bus,
    init_tracing,
};
use putio_fetch::{AppState, Config, build_app};

/// Unread download events buffered per subscriber
const DOWNLOAD_BUS_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env()?);
    init_tracing(&config)?;

    tracing::info!("Starting putio-fetch");
    tracing::info!(
        download_dir = %config.download_dir.display(),
        monitor_folders = ?config.monitor_folders,
        accepted_file_types = ?config.accepted_file_types,
        retry_attempts = config.retry_attempts,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let store = TransferMetadataStore::new(config.in_progress_dir());

    // Downloads and extraction
    let bus = download_bus(DOWNLOAD_BUS_CAPACITY);
    let downloader = HttpDownloader::new(
        config.download_dir.clone(),
        bus.clone(),
        config.download_max_concurrent,
    );
    let notifications = NotificationService::with_defaults();
    let extractor = Arc::new(ExtractorService::new(
        config.download_dir.clone(),
        ExtensionFilter::new(&config.accepted_file_types),
        store.clone(),
        notifications,
    ));
    let completion_handler = CompletionHandler::new(bus, extractor.clone()).start();

    // Pipeline
    let remote = Arc::new(PutioClient::new(
        &config.putio_base_url,
        config.putio_token.clone(),
    ));
    let pipeline = TransferPipeline::new(
        config.clone(),
        remote,
        store.clone(),
        DownloadDispatcher::new(Arc::new(downloader)),
        shutdown.clone(),
    );

    // Finish or clear what a previous run left behind, then hourly
    jobs::run_sweep(extractor.clone(), config.orphan_max_age).await;
    let mut scheduler = jobs::start_scheduler(extractor, config.orphan_max_age).await?;
    tracing::info!("Job scheduler started");

    let app = build_app(AppState {
        config: config.clone(),
        launcher: Arc::new(pipeline),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, webhook_id = %config.webhook_id, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // In-flight polls observe the token; give the handler a chance to finish
    shutdown.cancel();
    completion_handler.stop().await;
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Failed to stop job scheduler: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels every in-flight pipeline
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
    shutdown.cancel();
}
