//! Filename helpers for sorting extracted files
//!
//! Episode files are grouped by show, e.g.:
//! - "Show.Name.S01E02.mkv" -> "Show Name"
//! - "Chicago Fire S14E08 1080p WEB h264-ETHEL.mkv" -> "Chicago Fire"

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// `<showname><separators>S<digits>E<digits>`, case-insensitive
static EPISODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<showname>[ .\w]*?)[ ._-]*s(?P<season>\d+)e(?P<episode>\d+)")
        .expect("episode pattern is valid")
});

/// Derive the show folder name from an episode filename.
///
/// Dots become spaces and surrounding whitespace is trimmed. Returns `None`
/// when the name carries no `SxxEyy` marker or nothing precedes it.
pub fn show_folder(filename: &str) -> Option<String> {
    let caps = EPISODE_RE.captures(filename)?;
    let show = caps
        .name("showname")?
        .as_str()
        .replace('.', " ")
        .trim()
        .to_string();

    debug!(filename, show = %show, "Parsed show name");

    if show.is_empty() { None } else { Some(show) }
}

/// Allow-list of filename suffixes for extracted members
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    /// An empty list, or one containing an empty entry, accepts every name
    pub fn new(suffixes: &[String]) -> Self {
        Self {
            suffixes: suffixes.to_vec(),
        }
    }

    pub fn allows(&self, filename: &str) -> bool {
        self.suffixes.is_empty() || self.suffixes.iter().any(|s| filename.ends_with(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_folder_dotted() {
        assert_eq!(show_folder("Show.Name.S01E02.mkv").as_deref(), Some("Show Name"));
    }

    #[test]
    fn test_show_folder_spaced_scene_name() {
        assert_eq!(
            show_folder("Chicago Fire S14E08 1080p WEB h264-ETHEL.mkv").as_deref(),
            Some("Chicago Fire")
        );
    }

    #[test]
    fn test_show_folder_is_case_insensitive() {
        assert_eq!(show_folder("the.office.s03e10.mp4").as_deref(), Some("the office"));
    }

    #[test]
    fn test_show_folder_uses_first_marker() {
        assert_eq!(
            show_folder("Show.S01E01.Recap.S00E01.mkv").as_deref(),
            Some("Show")
        );
    }

    #[test]
    fn test_show_folder_skips_leading_tags() {
        assert_eq!(show_folder("[grp] Show S02E03.mkv").as_deref(), Some("Show"));
    }

    #[test]
    fn test_show_folder_without_marker() {
        assert_eq!(show_folder("Some.Movie.2019.mkv"), None);
        assert_eq!(show_folder("readme.txt"), None);
        assert_eq!(show_folder("S01E02.mkv"), None);
    }

    #[test]
    fn test_extension_filter() {
        let mkv = ExtensionFilter::new(&["mkv".to_string()]);
        assert!(mkv.allows("Show.Name.S01E02.mkv"));
        assert!(!mkv.allows("readme.txt"));

        let all = ExtensionFilter::new(&[String::new()]);
        assert!(all.allows("readme.txt"));
        assert!(ExtensionFilter::new(&[]).allows("anything"));
    }
}
