//! Pipeline error taxonomy

use std::path::PathBuf;

use thiserror::Error;

use crate::transfer::{FileId, ZipId};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to classify file {file_id}: {reason}")]
    Classifier { file_id: FileId, reason: String },

    #[error("zip request failed: {0}")]
    ZipRequest(String),

    #[error("zip {zip_id} was not ready after {attempts} polling attempts")]
    ZipTimeout { zip_id: ZipId, attempts: u32 },

    #[error("no transfer metadata for zip {zip_id} at {path}")]
    MetadataNotFound { zip_id: ZipId, path: PathBuf },

    #[error("zip {zip_id} is already being extracted")]
    ExtractionInProgress { zip_id: ZipId },

    #[error("cannot extract member {member}: {reason}")]
    ExtractionMember { member: String, reason: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl PipelineError {
    pub fn classifier(file_id: FileId, reason: impl std::fmt::Display) -> Self {
        Self::Classifier {
            file_id,
            reason: reason.to_string(),
        }
    }

    pub fn member(member: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtractionMember {
            member: member.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
