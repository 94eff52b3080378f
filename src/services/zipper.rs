//! Server-side zip creation and readiness polling
//!
//! put.io bundles a file into a zip asynchronously. The poller waits a
//! linearly growing interval before each status check (15s, 30s, 45s, ...)
//! and hands back the archive URL as soon as the job reports done.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::services::putio::RemoteStorage;
use crate::transfer::{FileId, ZipId};

/// Linear wait schedule for zip status polls.
///
/// A configured attempt count of `n` yields `n - 1` waits of `step * i`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step: Duration,
    configured_attempts: u32,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(step: Duration, configured_attempts: u32) -> Self {
        Self {
            step,
            configured_attempts,
            attempt: 0,
        }
    }

    /// Number of polls this schedule allows
    pub fn polls(&self) -> u32 {
        self.configured_attempts.saturating_sub(1)
    }

    /// Polls handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.polls() {
            return None;
        }
        // A wait too long to represent ends the schedule
        let wait = self.step.checked_mul(self.attempt + 1)?;
        self.attempt += 1;
        Some(wait)
    }
}

/// Requests zips from the remote and waits for them to become downloadable
#[derive(Clone)]
pub struct ZipEngine {
    remote: Arc<dyn RemoteStorage>,
    poll_interval: Duration,
}

impl ZipEngine {
    pub fn new(remote: Arc<dyn RemoteStorage>, poll_interval: Duration) -> Self {
        Self {
            remote,
            poll_interval,
        }
    }

    /// Ask the remote to package a single file
    pub async fn request_zip(&self, file_id: FileId) -> Result<ZipId> {
        debug!(file_id, "Zipping file");

        let zip_id = self
            .remote
            .create_zip(file_id)
            .await
            .map_err(|e| PipelineError::ZipRequest(format!("{:#}", e)))?;

        info!(file_id, zip_id, "Zip requested");
        Ok(zip_id)
    }

    /// Poll the zip job until it is done, returning its download URL.
    ///
    /// Sleeps before every poll, including the first. Cancelling the token
    /// aborts the wait immediately.
    pub async fn poll_until_ready(
        &self,
        zip_id: ZipId,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut schedule = LinearBackoff::new(self.poll_interval, max_attempts);

        while let Some(wait) = schedule.next_backoff() {
            let attempt = schedule.attempt();
            debug!(zip_id, attempt, wait_secs = wait.as_secs(), "Waiting for zip");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(zip_id, attempt, "Zip polling cancelled");
                    return Err(PipelineError::Cancelled);
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let status = self
                .remote
                .zip_status(zip_id)
                .await
                .map_err(|e| PipelineError::ZipRequest(format!("{:#}", e)))?;

            if status.is_ready() {
                match status.url {
                    Some(url) if !url.is_empty() => {
                        info!(zip_id, attempt, "Zip ready");
                        return Ok(url);
                    }
                    _ => warn!(zip_id, attempt, "Zip reported done without a URL"),
                }
            } else {
                debug!(
                    zip_id,
                    attempt,
                    status = %status.status,
                    zip_status = %status.zip_status,
                    "Zip not ready yet"
                );
            }
        }

        Err(PipelineError::ZipTimeout {
            zip_id,
            attempts: schedule.attempt(),
        })
    }
}
