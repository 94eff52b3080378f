//! put.io API client
//!
//! Covers the handful of endpoints the transfer pipeline needs: file lookup,
//! folder search, and the zip create/status pair.
//! Base URL: https://api.put.io/v2

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::transfer::{FileId, ZipId};

/// File or folder entry from put.io
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutioFile {
    pub id: FileId,
    pub name: String,
    /// Root entries have no parent
    pub parent_id: Option<FileId>,
}

/// Status of a server-side zip job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZipStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub zip_status: String,
    pub url: Option<String>,
}

impl ZipStatus {
    /// The archive can be fetched once the request succeeded and the job is done
    pub fn is_ready(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok") && self.zip_status.eq_ignore_ascii_case("done")
    }
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    file: PutioFile,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    files: Vec<PutioFile>,
}

#[derive(Debug, Deserialize)]
struct CreateZipResponse {
    zip_id: ZipId,
}

/// Remote storage operations used by the pipeline
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Fetch a file's metadata
    async fn get_file(&self, file_id: FileId) -> Result<PutioFile>;

    /// Search files and folders by name
    async fn search(&self, query: &str) -> Result<Vec<PutioFile>>;

    /// Ask the service to bundle a file into a zip archive
    async fn create_zip(&self, file_id: FileId) -> Result<ZipId>;

    /// Fetch the status of a zip job
    async fn zip_status(&self, zip_id: ZipId) -> Result<ZipStatus>;
}

/// put.io API client
pub struct PutioClient {
    client: Client,
    base_url: String,
    token: String,
}

impl PutioClient {
    pub fn new(base_url: &Url, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }
}

#[async_trait]
impl RemoteStorage for PutioClient {
    async fn get_file(&self, file_id: FileId) -> Result<PutioFile> {
        debug!(file_id, "Fetching file from put.io");

        let response = self
            .client
            .get(self.url(&format!("/files/{}", file_id)))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .context("Failed to fetch file from put.io")?;

        if !response.status().is_success() {
            anyhow::bail!("put.io get file failed with status: {}", response.status());
        }

        let body: FileResponse = response
            .json()
            .await
            .context("Failed to parse put.io file")?;

        Ok(body.file)
    }

    async fn search(&self, query: &str) -> Result<Vec<PutioFile>> {
        debug!(query = %query, "Searching put.io");

        let response = self
            .client
            .get(self.url("/files/search"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("query", query)])
            .send()
            .await
            .context("Failed to search put.io")?;

        if !response.status().is_success() {
            anyhow::bail!("put.io search failed with status: {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse put.io search results")?;

        debug!(count = body.files.len(), "put.io search returned results");
        Ok(body.files)
    }

    async fn create_zip(&self, file_id: FileId) -> Result<ZipId> {
        debug!(file_id, "Requesting zip from put.io");

        let response = self
            .client
            .post(self.url("/zips/create"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .form(&[("file_ids", file_id.to_string())])
            .send()
            .await
            .context("Failed to create zip on put.io")?;

        if !response.status().is_success() {
            anyhow::bail!("put.io create zip failed with status: {}", response.status());
        }

        let body: CreateZipResponse = response
            .json()
            .await
            .context("Failed to parse put.io zip response")?;

        Ok(body.zip_id)
    }

    async fn zip_status(&self, zip_id: ZipId) -> Result<ZipStatus> {
        let response = self
            .client
            .get(self.url(&format!("/zips/{}", zip_id)))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .context("Failed to fetch zip status from put.io")?;

        if !response.status().is_success() {
            anyhow::bail!("put.io zip status failed with status: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse put.io zip status")
    }
}
