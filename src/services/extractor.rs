//! Archive extraction service
//!
//! Unpacks a finished zip into the library. Members are flattened to their
//! base names, filtered by the accepted suffixes and placed under
//! `{download_dir}/{category}/`, with an extra show folder for TV. Runs on the
//! blocking pool since decompression is disk and CPU bound.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};
use crate::services::filename_parser::{ExtensionFilter, show_folder};
use crate::services::metadata_store::TransferMetadataStore;
use crate::services::notifications::NotificationService;
use crate::transfer::{Category, ZipId, archive_filename};

/// What happened to one archive
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub zip_id: ZipId,
    /// Files written to the library
    pub extracted: Vec<PathBuf>,
    /// Members that matched the filter but could not be placed
    pub failed: Vec<String>,
}

/// Archive extraction service
pub struct ExtractorService {
    download_dir: PathBuf,
    filter: ExtensionFilter,
    store: TransferMetadataStore,
    notifications: NotificationService,
    /// Zip ids currently being extracted
    in_flight: Mutex<HashSet<ZipId>>,
}

/// Exclusive right to extract one zip, released on drop
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<ZipId>>,
    zip_id: ZipId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.zip_id);
    }
}

impl ExtractorService {
    pub fn new(
        download_dir: PathBuf,
        filter: ExtensionFilter,
        store: TransferMetadataStore,
        notifications: NotificationService,
    ) -> Self {
        Self {
            download_dir,
            filter,
            store,
            notifications,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &TransferMetadataStore {
        &self.store
    }

    fn claim(&self, zip_id: ZipId) -> Option<Claim<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.insert(zip_id).then_some(Claim {
            in_flight: &self.in_flight,
            zip_id,
        })
    }

    /// Staged archive for a zip id
    pub fn archive_path(&self, zip_id: ZipId) -> PathBuf {
        self.store.dir().join(archive_filename(zip_id))
    }

    /// Library directory a member with this base name belongs in
    pub fn destination_dir(&self, category: Category, filename: &str) -> Result<PathBuf> {
        let mut dir = self.download_dir.join(category.as_str());
        if category == Category::Tv {
            let show = show_folder(filename)
                .ok_or_else(|| PipelineError::member(filename, "no SxxEyy episode marker"))?;
            dir.push(sanitize_filename::sanitize(show));
        }
        Ok(dir)
    }

    /// Extract on the blocking pool
    pub async fn extract_blocking(self: Arc<Self>, zip_id: ZipId) -> Result<ExtractionReport> {
        tokio::task::spawn_blocking(move || self.extract(zip_id))
            .await
            .map_err(|e| PipelineError::Io(io::Error::other(e)))?
    }

    /// Extract a staged archive, then remove it and its transfer record.
    ///
    /// A missing record is fatal and leaves the archive where it is. Problems
    /// with individual members are logged and skipped. Only one extraction per
    /// zip id runs at a time; a second caller gets `ExtractionInProgress`.
    pub fn extract(&self, zip_id: ZipId) -> Result<ExtractionReport> {
        let Some(_claim) = self.claim(zip_id) else {
            return Err(PipelineError::ExtractionInProgress { zip_id });
        };
        let record = self.store.read(zip_id)?;
        let archive_path = self.archive_path(zip_id);

        info!(
            zip_id,
            file_id = record.file_id,
            category = %record.category,
            archive = %archive_path.display(),
            "Extracting archive"
        );

        let mut archive = ZipArchive::new(BufReader::new(File::open(&archive_path)?))?;
        let mut report = ExtractionReport {
            zip_id,
            ..Default::default()
        };

        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(zip_id, index, error = %e, "Unreadable archive member");
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }

            let Some(filename) = base_name(entry.name()) else {
                continue;
            };
            let filename = filename.to_string();

            if !self.filter.allows(&filename) {
                debug!(zip_id, member = %filename, "Skipping member by extension");
                continue;
            }

            match self.place(record.category, &filename, &mut entry) {
                Ok(path) => {
                    debug!(zip_id, member = %filename, destination = %path.display(), "Extracted");
                    self.notifications.file_downloaded(&filename);
                    report.extracted.push(path);
                }
                Err(e) => {
                    warn!(zip_id, member = %filename, error = %e, "Skipping member");
                    report.failed.push(filename);
                }
            }
        }
        drop(archive);

        fs::remove_file(&archive_path)?;
        self.store.delete(zip_id)?;

        info!(
            zip_id,
            extracted = report.extracted.len(),
            failed = report.failed.len(),
            "Archive extraction complete"
        );

        Ok(report)
    }

    fn place(&self, category: Category, filename: &str, reader: &mut impl io::Read) -> Result<PathBuf> {
        let dir = self.destination_dir(category, filename)?;
        fs::create_dir_all(&dir)?;

        let path = dir.join(filename);
        let mut out = File::create(&path)?;
        if let Err(e) = io::copy(reader, &mut out) {
            drop(out);
            let _ = fs::remove_file(&path);
            return Err(PipelineError::member(filename, e.to_string()));
        }
        Ok(path)
    }
}

/// Last path component of an archive member name, if it names a file
fn base_name(member: &str) -> Option<&str> {
    let name = member.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
