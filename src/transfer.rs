//! Transfer domain types shared by the pipeline stages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

/// put.io file identifier
pub type FileId = u64;

/// put.io identifier of a server-side zip job
pub type ZipId = u64;

/// Library category a remote file is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Movies,
    #[serde(rename = "TV")]
    Tv,
    Other,
}

impl Category {
    /// Name used both for the remote folder lookup and the local destination folder
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movies => "Movies",
            Category::Tv => "TV",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movies" => Ok(Category::Movies),
            "tv" => Ok(Category::Tv),
            "other" => Ok(Category::Other),
            other => anyhow::bail!("unknown category: {}", other),
        }
    }
}

/// Correlation record persisted next to an in-flight download.
///
/// Field names match the side-file format consumed by older installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub zip_id: ZipId,
    #[serde(rename = "zip_download_link")]
    pub download_url: String,
    /// Older installs stored the webhook's form value verbatim, as a string
    #[serde(deserialize_with = "string_or_number")]
    pub file_id: FileId,
    #[serde(rename = "sub_folder")]
    pub category: Category,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<FileId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(FileId),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(id) => Ok(id),
        Raw::Text(text) => text.trim().parse().map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Str(&text), &"a numeric file id")
        }),
    }
}

/// Filename the downloader writes the archive to
pub fn archive_filename(zip_id: ZipId) -> String {
    format!("{}.zip", zip_id)
}

/// Recover the zip id from an archive filename such as `42.zip`
pub fn zip_id_from_filename(filename: &str) -> Option<ZipId> {
    let name = std::path::Path::new(filename).file_name()?.to_str()?;
    name.strip_suffix(".zip")?.parse().ok()
}
