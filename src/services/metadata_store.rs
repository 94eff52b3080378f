//! Transfer correlation records
//!
//! Each in-flight transfer leaves `{zip_id}_meta.json` in the staging
//! directory next to the archive being downloaded. The completion handler
//! uses it to learn where the archive's contents belong.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::transfer::{TransferRecord, ZipId};

const META_SUFFIX: &str = "_meta.json";

/// File-backed store of transfer records, one file per zip id
#[derive(Debug, Clone)]
pub struct TransferMetadataStore {
    dir: PathBuf,
}

impl TransferMetadataStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Side-file path for a zip id
    pub fn path_for(&self, zip_id: ZipId) -> PathBuf {
        self.dir.join(format!("{}{}", zip_id, META_SUFFIX))
    }

    /// Persist a record. The file appears atomically so a racing reader never
    /// sees a partial record.
    pub fn write(&self, record: &TransferRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(record.zip_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(record)?)?;
        fs::rename(&tmp, &path)?;

        debug!(zip_id = record.zip_id, path = %path.display(), "Wrote transfer metadata");
        Ok(())
    }

    /// Load the record for a zip id
    pub fn read(&self, zip_id: ZipId) -> Result<TransferRecord> {
        let path = self.path_for(zip_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::MetadataNotFound { zip_id, path });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Remove the record; a missing file is fine
    pub fn delete(&self, zip_id: ZipId) -> Result<()> {
        let path = self.path_for(zip_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(zip_id, "Transfer metadata already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Zip ids whose records were last written more than `max_age` ago
    pub fn stale(&self, max_age: Duration) -> Result<Vec<ZipId>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut stale = Vec::new();

        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some(zip_id) = name
                .to_str()
                .and_then(|n| n.strip_suffix(META_SUFFIX))
                .and_then(|id| id.parse::<ZipId>().ok())
            else {
                continue;
            };

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(zip_id, error = %e, "Cannot read transfer metadata age");
                    continue;
                }
            };

            if now.duration_since(modified).unwrap_or_default() > max_age {
                stale.push(zip_id);
            }
        }

        stale.sort_unstable();
        Ok(stale)
    }
}
