//! Relay configuration.
//!
//! A [`RelayConfig`] is loaded once at startup and passed read-only to every
//! component; nothing in the pipeline mutates it afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// What a qualifying file is, as far as the relay cares.
///
/// Segments are immutable once finalized and are removed or archived after
/// delivery. Manifests are rewritten continuously by the upstream producer
/// and are never touched after delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Segment,
    Manifest,
}

/// Immutable settings for one relay process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Destination URLs, attempted in order for every file.
    pub target_urls: Vec<String>,
    /// Directory the segmenter drops files into; watched recursively.
    pub cache_dir: PathBuf,
    /// Where delivered segments are moved when `recording` is on.
    pub record_dir: PathBuf,
    /// Logical remote directory name sent alongside every upload.
    pub remote_dir: String,
    /// Archive delivered segments instead of deleting them.
    pub recording: bool,
    /// Extensions (without the dot) treated as segments.
    pub segment_exts: Vec<String>,
    /// Extensions (without the dot) treated as manifests.
    pub manifest_exts: Vec<String>,
    /// Per-request timeout so one unresponsive target cannot stall the
    /// pipeline forever.
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target_urls: Vec::new(),
            cache_dir: PathBuf::from("cache.dir"),
            record_dir: PathBuf::from("record.dir"),
            remote_dir: "events".to_string(),
            recording: false,
            segment_exts: vec!["ts".to_string()],
            manifest_exts: vec!["m3u8".to_string()],
            request_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    /// Load settings from a JSON file. Absent fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Classify a path by its extension, or `None` if the relay should
    /// ignore it entirely. Extension matching is case-sensitive on the text
    /// after the last `.`; segments win when an extension is listed in both
    /// sets.
    pub fn classify(&self, path: &Path) -> Option<FileClass> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        if self.segment_exts.iter().any(|s| s == ext) {
            Some(FileClass::Segment)
        } else if self.manifest_exts.iter().any(|m| m == ext) {
            Some(FileClass::Manifest)
        } else {
            None
        }
    }

    /// Create the cache directory, and the record directory when recording
    /// is enabled. Failure here is fatal at startup.
    pub fn ensure_directories(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        if self.recording && !self.record_dir.exists() {
            fs::create_dir_all(&self.record_dir)?;
        }
        Ok(())
    }
}
