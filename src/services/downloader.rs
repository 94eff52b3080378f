//! Generic HTTP downloader and the download dispatcher
//!
//! The downloader knows nothing about put.io: it fetches a URL into
//! `{root}/{subdir}/{filename}` and announces the outcome on the download bus.
//! Whoever cares about a particular file subscribes to the bus and recognises
//! it by its correlation id / filename.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, broadcast};
use tracing::{debug, error, info};

use crate::config::IN_PROGRESS_DIR;
use crate::error::{PipelineError, Result};
use crate::transfer::{ZipId, archive_filename};

/// Broadcast channel carrying download outcomes
pub type DownloadBus = broadcast::Sender<DownloadEvent>;

/// Create a download bus with room for `capacity` unread events per subscriber
pub fn download_bus(capacity: usize) -> DownloadBus {
    broadcast::channel(capacity).0
}

/// A single file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    pub overwrite: bool,
    /// Directory below the download root
    pub subdir: Option<String>,
    /// Correlation id echoed back on the completion event
    pub zip_id: Option<ZipId>,
}

/// Outcome of a download, published on the bus
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Completed {
        filename: String,
        zip_id: Option<ZipId>,
        path: PathBuf,
    },
    Failed {
        filename: String,
        zip_id: Option<ZipId>,
        error: String,
    },
}

/// Something that accepts download requests and reports back on the bus
pub trait DownloadService: Send + Sync {
    /// Queue a download. Returns immediately; completion arrives as a bus event.
    fn submit(&self, request: DownloadRequest);
}

/// Streams HTTP downloads to disk with bounded parallelism
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
    root: PathBuf,
    bus: DownloadBus,
    permits: Arc<Semaphore>,
}

impl HttpDownloader {
    pub fn new(root: PathBuf, bus: DownloadBus, max_concurrent: usize) -> Self {
        Self {
            client: Client::new(),
            root,
            bus,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Where a request's file ends up
    pub fn destination(&self, request: &DownloadRequest) -> PathBuf {
        let mut dir = self.root.clone();
        if let Some(subdir) = request.subdir.as_deref().filter(|s| !s.is_empty()) {
            dir.push(sanitize_filename::sanitize(subdir));
        }
        dir.join(sanitize_filename::sanitize(&request.filename))
    }

    /// Download and publish the outcome. Waits for a free slot first.
    pub async fn run(&self, request: DownloadRequest) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let event = match self.fetch(&request).await {
            Ok(path) => DownloadEvent::Completed {
                filename: request.filename.clone(),
                zip_id: request.zip_id,
                path,
            },
            Err(e) => {
                error!(url = %request.url, filename = %request.filename, error = %e, "Download failed");
                DownloadEvent::Failed {
                    filename: request.filename.clone(),
                    zip_id: request.zip_id,
                    error: e.to_string(),
                }
            }
        };

        if self.bus.send(event).is_err() {
            debug!(filename = %request.filename, "No listeners for download event");
        }
    }

    async fn fetch(&self, request: &DownloadRequest) -> Result<PathBuf> {
        let path = self.destination(request);

        if !request.overwrite && tokio::fs::try_exists(&path).await? {
            return Err(PipelineError::Download(format!(
                "{} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(url = %request.url, destination = %path.display(), "Starting download");

        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Download(format!(
                "server responded with {}",
                response.status()
            )));
        }

        let partial = partial_path(&path);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| PipelineError::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, &path).await?;

        info!(destination = %path.display(), bytes = written, "Download finished");
        Ok(path)
    }
}

impl DownloadService for HttpDownloader {
    fn submit(&self, request: DownloadRequest) {
        let downloader = self.clone();
        tokio::spawn(async move { downloader.run(request).await });
    }
}

/// In-flight bytes are written beside the final name
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Hands finished zips to the download service
#[derive(Clone)]
pub struct DownloadDispatcher {
    service: Arc<dyn DownloadService>,
}

impl DownloadDispatcher {
    pub fn new(service: Arc<dyn DownloadService>) -> Self {
        Self { service }
    }

    /// Build the staging download request for a zip
    pub fn request_for(zip_id: ZipId, url: &str) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            filename: archive_filename(zip_id),
            overwrite: true,
            subdir: Some(IN_PROGRESS_DIR.to_string()),
            zip_id: Some(zip_id),
        }
    }

    /// Queue the archive download. Completion is observed on the bus.
    pub fn dispatch(&self, zip_id: ZipId, url: &str) {
        info!(zip_id, "Dispatching zip download");
        self.service.submit(Self::request_for(zip_id, url));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingService {
        requests: Mutex<Vec<DownloadRequest>>,
    }

    impl DownloadService for RecordingService {
        fn submit(&self, request: DownloadRequest) {
            self.requests.lock().unwrap().push(request);
        }
    }

    #[test]
    fn test_dispatch_builds_staging_request() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = DownloadDispatcher::new(service.clone());

        dispatcher.dispatch(42, "http://x/42.zip");

        let requests = service.requests.lock().unwrap();
        assert_eq!(
            *requests,
            vec![DownloadRequest {
                url: "http://x/42.zip".to_string(),
                filename: "42.zip".to_string(),
                overwrite: true,
                subdir: Some("InProgress".to_string()),
                zip_id: Some(42),
            }]
        );
    }

    #[test]
    fn test_destination_sanitizes_names() {
        let downloader = HttpDownloader::new(PathBuf::from("/data"), download_bus(4), 1);
        let request = DownloadRequest {
            url: String::new(),
            filename: "../42.zip".to_string(),
            overwrite: true,
            subdir: Some("InProgress".to_string()),
            zip_id: None,
        };
        let dest = downloader.destination(&request);
        assert!(dest.starts_with("/data/InProgress"));
        assert_eq!(dest.parent(), Some(Path::new("/data/InProgress")));
    }

    #[tokio::test]
    async fn test_download_publishes_completion() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/download/42")
            .with_status(200)
            .with_body("zip-bytes")
            .create_async()
            .await;

        let temp = tempfile::tempdir().unwrap();
        let bus = download_bus(4);
        let mut events = bus.subscribe();
        let downloader = HttpDownloader::new(temp.path().to_path_buf(), bus, 1);

        downloader
            .run(DownloadDispatcher::request_for(
                42,
                &format!("{}/download/42", server.url()),
            ))
            .await;

        let event = events.recv().await.unwrap();
        let expected = temp.path().join("InProgress/42.zip");
        assert_matches!(
            event,
            DownloadEvent::Completed { ref filename, zip_id: Some(42), ref path }
                if filename == "42.zip" && *path == expected
        );
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "zip-bytes");
        assert!(!partial_path(&expected).exists());
    }

    #[tokio::test]
    async fn test_download_failure_is_published() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let temp = tempfile::tempdir().unwrap();
        let bus = download_bus(4);
        let mut events = bus.subscribe();
        let downloader = HttpDownloader::new(temp.path().to_path_buf(), bus, 1);

        downloader
            .run(DownloadDispatcher::request_for(7, &format!("{}/gone", server.url())))
            .await;

        assert_matches!(
            events.recv().await.unwrap(),
            DownloadEvent::Failed { zip_id: Some(7), .. }
        );
    }

    #[tokio::test]
    async fn test_refuses_to_clobber_without_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.zip"), b"keep").unwrap();

        let bus = download_bus(4);
        let mut events = bus.subscribe();
        let downloader = HttpDownloader::new(temp.path().to_path_buf(), bus, 1);

        downloader
            .run(DownloadRequest {
                url: "http://127.0.0.1:9/never".to_string(),
                filename: "a.zip".to_string(),
                overwrite: false,
                subdir: None,
                zip_id: None,
            })
            .await;

        assert_matches!(events.recv().await.unwrap(), DownloadEvent::Failed { .. });
        assert_eq!(std::fs::read(temp.path().join("a.zip")).unwrap(), b"keep");
    }
}
