//! Transfer pipeline
//!
//! One run per webhook event:
//! 1. Classify the remote file by its parent folder
//! 2. Stop unless that category is monitored
//! 3. Request a zip and poll until it is ready
//! 4. Write the correlation record
//! 5. Hand the zip URL to the downloader
//!
//! Extraction happens later, when the download completes (see
//! [CompletionHandler](crate::services::completion_handler::CompletionHandler)).

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::services::classifier::classify;
use crate::services::downloader::DownloadDispatcher;
use crate::services::metadata_store::TransferMetadataStore;
use crate::services::putio::RemoteStorage;
use crate::services::zipper::ZipEngine;
use crate::transfer::{Category, FileId, TransferRecord};

/// Result of a pipeline run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// File is outside the monitored folders
    Skipped(Category),
    /// Zip download handed to the downloader
    Dispatched(TransferRecord),
}

/// Starts pipeline runs without waiting for them
pub trait TransferLauncher: Send + Sync {
    fn launch(&self, file_id: FileId);
}

/// Everything one pipeline run needs, passed explicitly
#[derive(Clone)]
pub struct TransferPipeline {
    config: Arc<Config>,
    remote: Arc<dyn RemoteStorage>,
    zipper: ZipEngine,
    store: TransferMetadataStore,
    dispatcher: DownloadDispatcher,
    cancel: CancellationToken,
}

impl TransferPipeline {
    pub fn new(
        config: Arc<Config>,
        remote: Arc<dyn RemoteStorage>,
        store: TransferMetadataStore,
        dispatcher: DownloadDispatcher,
        cancel: CancellationToken,
    ) -> Self {
        let zipper = ZipEngine::new(remote.clone(), config.poll_interval);
        Self {
            config,
            remote,
            zipper,
            store,
            dispatcher,
            cancel,
        }
    }

    /// Run the pipeline for one file to the point of dispatching its download
    pub async fn run(&self, file_id: FileId) -> Result<PipelineOutcome> {
        debug!(file_id, "New file");

        let category = classify(self.remote.as_ref(), file_id).await?;
        if !self.config.is_monitored(category) {
            debug!(file_id, category = %category, "File not in monitored folder");
            return Ok(PipelineOutcome::Skipped(category));
        }

        let zip_id = self.zipper.request_zip(file_id).await?;
        let cancel = self.cancel.child_token();
        let download_url = self
            .zipper
            .poll_until_ready(zip_id, self.config.retry_attempts, &cancel)
            .await?;

        let record = TransferRecord {
            zip_id,
            download_url,
            file_id,
            category,
        };

        // The record must be on disk before the download can complete
        let store = self.store.clone();
        let to_write = record.clone();
        tokio::task::spawn_blocking(move || store.write(&to_write))
            .await
            .map_err(|e| PipelineError::Io(io::Error::other(e)))??;

        self.dispatcher.dispatch(zip_id, &record.download_url);

        info!(file_id, zip_id, category = %category, "Transfer dispatched");
        Ok(PipelineOutcome::Dispatched(record))
    }
}

impl TransferLauncher for TransferPipeline {
    fn launch(&self, file_id: FileId) {
        let pipeline = self.clone();
        let span = info_span!("transfer", file_id);
        tokio::spawn(
            async move {
                match pipeline.run(file_id).await {
                    Ok(_) => {}
                    Err(PipelineError::Cancelled) => info!("Transfer cancelled"),
                    Err(e) => error!(error = %e, "Transfer failed"),
                }
            }
            .instrument(span),
        );
    }
}
