//! Download completion handler
//!
//! Subscribes to the download bus and extracts finished zips as soon as they
//! land. Downloads that are not ours (no correlation id and a filename that
//! does not look like `{zip_id}.zip`) are ignored.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::services::downloader::{DownloadBus, DownloadEvent};
use crate::services::extractor::ExtractorService;
use crate::transfer::{ZipId, zip_id_from_filename};

/// Download completion handler
///
/// Spawns a background task that listens for completion events and
/// extracts each archive on the blocking pool.
pub struct CompletionHandler {
    bus: DownloadBus,
    extractor: Arc<ExtractorService>,
}

impl CompletionHandler {
    pub fn new(bus: DownloadBus, extractor: Arc<ExtractorService>) -> Self {
        Self { bus, extractor }
    }

    /// Start the completion handler
    ///
    /// Returns a handle that can be used to stop the handler. The handler
    /// keeps only a receiver, so it also stops once every sender is dropped.
    pub fn start(self) -> CompletionHandlerHandle {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        // Subscribe before spawning so no event published after start() is missed
        let event_rx = self.bus.subscribe();

        let handle = tokio::spawn(Self::run(self.extractor, event_rx, shutdown_rx));

        CompletionHandlerHandle {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(handle),
        }
    }

    /// Main run loop
    async fn run(
        extractor: Arc<ExtractorService>,
        mut event_rx: broadcast::Receiver<DownloadEvent>,
        mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) {
        info!("Download completion handler started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Download completion handler shutting down");
                    break;
                }

                event = event_rx.recv() => {
                    match event {
                        Ok(DownloadEvent::Completed { filename, zip_id, .. }) => {
                            debug!(filename = %filename, "Download finished");
                            let Some(zip_id) = correlate(zip_id, &filename) else {
                                debug!(filename = %filename, "Ignoring download without a zip id");
                                continue;
                            };

                            let extractor = extractor.clone();
                            tokio::spawn(async move {
                                handle_completed(extractor, zip_id).await;
                            });
                        }
                        Ok(DownloadEvent::Failed { filename, zip_id, error }) => {
                            error!(
                                filename = %filename,
                                zip_id = ?correlate(zip_id, &filename),
                                error = %error,
                                "Zip download failed; transfer left for the sweeper"
                            );
                        }
                        Err(broadcast::error::RecvError::Lagged(count)) => {
                            warn!(
                                lagged_count = count,
                                "Completion handler lagged behind, missed archives wait for the next sweep"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Download event channel closed, stopping handler");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Prefer the typed correlation id, fall back to the filename contract
fn correlate(zip_id: Option<ZipId>, filename: &str) -> Option<ZipId> {
    zip_id.or_else(|| zip_id_from_filename(filename))
}

async fn handle_completed(extractor: Arc<ExtractorService>, zip_id: ZipId) {
    match extractor.extract_blocking(zip_id).await {
        Ok(report) => {
            if !report.failed.is_empty() {
                warn!(zip_id, failed = ?report.failed, "Some members were not extracted");
            }
        }
        Err(PipelineError::ExtractionInProgress { .. }) => {
            debug!(zip_id, "Archive is already being extracted");
        }
        Err(e @ PipelineError::MetadataNotFound { .. }) => {
            error!(zip_id, error = %e, "Archive left in place for manual recovery");
        }
        Err(e) => {
            error!(zip_id, error = %e, "Failed to extract archive");
        }
    }
}

/// Handle for controlling the completion handler
pub struct CompletionHandlerHandle {
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CompletionHandlerHandle {
    /// Stop the completion handler
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CompletionHandlerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}
