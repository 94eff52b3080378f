//! Staging directory reconciliation
//!
//! A completion event can be missed: the process may stop between download and
//! extraction, or the handler may lag behind the bus. Every sweep therefore
//! extracts any fully downloaded archive that still has its correlation record.
//! Records older than the configured age whose download never finished are
//! removed together with their partial download. Archives without a record
//! are left for manual recovery.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::services::downloader::partial_path;
use crate::services::extractor::ExtractorService;
use crate::services::metadata_store::TransferMetadataStore;
use crate::transfer::{ZipId, archive_filename, zip_id_from_filename};

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Completed archives extracted by the sweep
    pub recovered: usize,
    /// Stale unfinished transfers removed
    pub swept: usize,
}

/// Recover completed archives, then remove stale unfinished transfers
pub fn sweep(extractor: &ExtractorService, max_age: Duration) -> Result<SweepReport> {
    let store = extractor.store();
    let mut report = SweepReport::default();

    for zip_id in completed_archives(store) {
        match extractor.extract(zip_id) {
            Ok(extraction) => {
                info!(
                    zip_id,
                    extracted = extraction.extracted.len(),
                    "Recovered completed transfer"
                );
                report.recovered += 1;
            }
            Err(PipelineError::ExtractionInProgress { .. }) => {
                debug!(zip_id, "Archive is already being extracted");
            }
            Err(e) => {
                warn!(zip_id, error = %e, "Completed archive could not be recovered");
            }
        }
    }

    let stale = store
        .stale(max_age)
        .context("Failed to scan transfer metadata")?;

    for zip_id in stale {
        let archive = store.dir().join(archive_filename(zip_id));
        let partial = partial_path(&archive);
        if is_complete(&archive) {
            warn!(zip_id, archive = %archive.display(), "Stale transfer has a complete archive, leaving it for manual recovery");
            continue;
        }

        info!(
            zip_id,
            max_age_hours = max_age.as_secs() / 3600,
            "Sweeping stale transfer"
        );
        remove_if_present(&partial)?;
        remove_if_present(&archive)?;
        store
            .delete(zip_id)
            .with_context(|| format!("Failed to delete metadata for zip {}", zip_id))?;
        report.swept += 1;
    }

    for zip_id in unclaimed_archives(store) {
        warn!(zip_id, "Archive without transfer metadata awaits manual recovery");
    }

    Ok(report)
}

/// A finished download has been renamed into place and has no partial sibling
fn is_complete(archive: &Path) -> bool {
    archive.is_file() && !partial_path(archive).exists()
}

fn staged_archives(store: &TransferMetadataStore) -> impl Iterator<Item = ZipId> + '_ {
    WalkDir::new(store.dir())
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().and_then(zip_id_from_filename))
}

/// Downloaded archives whose completion was never processed
fn completed_archives(store: &TransferMetadataStore) -> Vec<ZipId> {
    staged_archives(store)
        .filter(|zip_id| store.path_for(*zip_id).exists())
        .filter(|zip_id| is_complete(&store.dir().join(archive_filename(*zip_id))))
        .collect()
}

/// Archives in the staging directory that have no correlation record
fn unclaimed_archives(store: &TransferMetadataStore) -> Vec<ZipId> {
    staged_archives(store)
        .filter(|zip_id| !store.path_for(*zip_id).exists())
        .collect()
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
