//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::transfer::Category;

/// Staging directory (relative to the download root) for archives in flight
pub const IN_PROGRESS_DIR: &str = "InProgress";

const DEFAULT_BASE_URL: &str = "https://api.put.io/v2";
const DEFAULT_WEBHOOK_ID: &str = "putio_transfer_completed";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// put.io API token
    pub putio_token: String,

    /// put.io API root
    pub putio_base_url: Url,

    /// Filename suffixes extracted from finished archives; `[""]` accepts everything
    pub accepted_file_types: Vec<String>,

    /// Categories the pipeline acts on
    pub monitor_folders: Vec<String>,

    /// Configured poll attempts. The poller makes `retry_attempts - 1` requests.
    pub retry_attempts: u32,

    /// Linear step between zip status polls
    pub poll_interval: Duration,

    /// Download root; categories are sorted beneath it
    pub download_dir: PathBuf,

    /// Path id of the inbound webhook
    pub webhook_id: String,

    /// Maximum parallel archive downloads
    pub download_max_concurrent: usize,

    /// Age after which unfinished transfers are swept
    pub orphan_max_age: Duration,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let putio_token = lookup("PUTIO_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .context("PUTIO_TOKEN is required")?;

        let putio_base_url = lookup("PUTIO_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let putio_base_url = Url::parse(putio_base_url.trim_end_matches('/'))
            .context("Invalid PUTIO_BASE_URL")?;

        let retry_attempts: u32 = lookup("RETRY_ATTEMPTS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("Invalid RETRY_ATTEMPTS")?;
        if retry_attempts == 0 {
            anyhow::bail!("RETRY_ATTEMPTS must be a positive integer");
        }

        let poll_interval_secs: u64 = lookup("POLL_INTERVAL_SECS")
            .unwrap_or_else(|| "15".to_string())
            .parse()
            .context("Invalid POLL_INTERVAL_SECS")?;

        let download_max_concurrent: usize = lookup("DOWNLOAD_MAX_CONCURRENT")
            .unwrap_or_else(|| "2".to_string())
            .parse()
            .context("Invalid DOWNLOAD_MAX_CONCURRENT")?;
        if download_max_concurrent == 0 {
            anyhow::bail!("DOWNLOAD_MAX_CONCURRENT must be a positive integer");
        }

        let orphan_max_age_hours: u64 = lookup("ORPHAN_MAX_AGE_HOURS")
            .unwrap_or_else(|| "24".to_string())
            .parse()
            .context("Invalid ORPHAN_MAX_AGE_HOURS")?;

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port: lookup("PORT")
                .unwrap_or_else(|| "8123".to_string())
                .parse()
                .context("Invalid PORT")?,

            putio_token,
            putio_base_url,

            accepted_file_types: parse_csv_list(
                &lookup("ACCEPTED_FILE_TYPES").unwrap_or_default(),
            ),

            monitor_folders: parse_csv_list(&lookup("MONITOR_FOLDERS").unwrap_or_default()),

            retry_attempts,
            poll_interval: Duration::from_secs(poll_interval_secs),

            download_dir: PathBuf::from(
                lookup("DOWNLOAD_DIR").unwrap_or_else(|| "./data/downloads".to_string()),
            ),

            webhook_id: lookup("WEBHOOK_ID").unwrap_or_else(|| DEFAULT_WEBHOOK_ID.to_string()),

            download_max_concurrent,
            orphan_max_age: Duration::from_secs(orphan_max_age_hours.saturating_mul(3600)),

            log_format,
        })
    }

    /// Directory archives and correlation records are staged in
    pub fn in_progress_dir(&self) -> PathBuf {
        self.download_dir.join(IN_PROGRESS_DIR)
    }

    /// Whether the pipeline should act on files of this category
    pub fn is_monitored(&self, category: Category) -> bool {
        self.monitor_folders
            .iter()
            .any(|folder| folder == category.as_str())
    }
}

/// Split a comma separated setting, trimming each entry.
///
/// An empty input yields a single empty entry, matching how the setting has
/// always defaulted.
pub fn parse_csv_list(value: &str) -> Vec<String> {
    value.split(',').map(|item| item.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("PUTIO_TOKEN", "abc")]).unwrap();
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.accepted_file_types, vec![String::new()]);
        assert_eq!(config.monitor_folders, vec![String::new()]);
        assert_eq!(config.webhook_id, "putio_transfer_completed");
        assert_eq!(config.putio_base_url.as_str(), "https://api.put.io/v2");
        assert_eq!(config.in_progress_dir(), PathBuf::from("./data/downloads/InProgress"));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_token_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("PUTIO_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_retry_attempts_must_be_positive() {
        assert!(load(&[("PUTIO_TOKEN", "abc"), ("RETRY_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("PUTIO_TOKEN", "abc"), ("RETRY_ATTEMPTS", "-1")]).is_err());
    }

    #[test]
    fn test_numeric_settings_reject_garbage() {
        let invalid = [
            ("DOWNLOAD_MAX_CONCURRENT", "lots"),
            ("DOWNLOAD_MAX_CONCURRENT", "0"),
            ("ORPHAN_MAX_AGE_HOURS", "a day"),
            ("ORPHAN_MAX_AGE_HOURS", "-3"),
        ];
        for (key, value) in invalid {
            assert!(load(&[("PUTIO_TOKEN", "abc"), (key, value)]).is_err(), "{}={}", key, value);
        }
    }

    #[test]
    fn test_orphan_max_age() {
        let config = load(&[("PUTIO_TOKEN", "abc")]).unwrap();
        assert_eq!(config.orphan_max_age, Duration::from_secs(24 * 3600));
        assert_eq!(config.download_max_concurrent, 2);

        let huge = load(&[("PUTIO_TOKEN", "abc"), ("ORPHAN_MAX_AGE_HOURS", "18446744073709551615")])
            .unwrap();
        assert_eq!(huge.orphan_max_age, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_csv_lists_and_monitoring() {
        let config = load(&[
            ("PUTIO_TOKEN", "abc"),
            ("ACCEPTED_FILE_TYPES", "mkv, mp4"),
            ("MONITOR_FOLDERS", "Movies,TV"),
        ])
        .unwrap();
        assert_eq!(config.accepted_file_types, vec!["mkv", "mp4"]);
        assert!(config.is_monitored(Category::Movies));
        assert!(config.is_monitored(Category::Tv));
        assert!(!config.is_monitored(Category::Other));
    }

    #[test]
    fn test_nothing_monitored_by_default() {
        let config = load(&[("PUTIO_TOKEN", "abc")]).unwrap();
        assert!(!config.is_monitored(Category::Movies));
        assert!(!config.is_monitored(Category::Tv));
        assert!(!config.is_monitored(Category::Other));
    }
}
