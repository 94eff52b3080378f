//! Pipeline services and external integrations

pub mod classifier;
pub mod completion_handler;
pub mod downloader;
pub mod extractor;
pub mod filename_parser;
pub mod logging;
pub mod metadata_store;
pub mod notifications;
pub mod pipeline;
pub mod putio;
pub mod zipper;

pub use completion_handler::{CompletionHandler, CompletionHandlerHandle};
pub use downloader::{
    DownloadBus, DownloadDispatcher, DownloadEvent, DownloadRequest, DownloadService,
    HttpDownloader, download_bus,
};
pub use extractor::{ExtractionReport, ExtractorService};
pub use filename_parser::ExtensionFilter;
pub use logging::init_tracing;
pub use metadata_store::TransferMetadataStore;
pub use notifications::{Notification, NotificationService};
pub use pipeline::{PipelineOutcome, TransferLauncher, TransferPipeline};
pub use putio::{PutioClient, RemoteStorage};
pub use zipper::ZipEngine;
