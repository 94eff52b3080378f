//! putio-fetch: fetches finished put.io transfers into a local media library
//!
//! A webhook names a finished file; the file is classified by its put.io
//! folder, zipped remotely, downloaded into a staging directory and extracted
//! into `{download_dir}/{Movies|TV|Other}`.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod services;
pub mod transfer;

pub use app::{AppState, build_app};
pub use config::Config;
pub use error::{PipelineError, Result};
