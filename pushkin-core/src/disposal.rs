//! Post-delivery fate of a file.
//!
//! Runs only after every target acknowledged the file. Manifests stay where
//! they are, since the segmenter keeps rewriting them and the next cycle
//! needs them readable. Segments are finished goods: archived when recording,
//! deleted otherwise. Disposal failures are swallowed; delivery already
//! succeeded and the file simply stays in place.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::config::{FileClass, RelayConfig};

/// Apply the disposal policy to a fully delivered file.
pub async fn dispose(path: &Path, class: FileClass, config: &RelayConfig) {
    match class {
        FileClass::Manifest => {
            debug!(path = %path.display(), "manifest left in place");
        }
        FileClass::Segment => {
            if config.recording {
                archive(path, config).await;
            } else {
                delete(path).await;
            }
        }
    }
}

async fn archive(path: &Path, config: &RelayConfig) {
    let Some(basename) = path.file_name() else {
        warn!(path = %path.display(), "segment path has no basename, leaving in place");
        return;
    };
    let target = config.record_dir.join(basename);
    match fs::rename(path, &target).await {
        Ok(()) => debug!(path = %path.display(), target = %target.display(), "segment archived"),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to archive segment, leaving in place");
        }
    }
}

async fn delete(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "segment deleted"),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to delete segment, leaving in place");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(root: &Path, recording: bool) -> RelayConfig {
        RelayConfig {
            cache_dir: root.join("cache"),
            record_dir: root.join("record"),
            recording,
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn deletes_segment_when_not_recording() {
        let root = tempfile::tempdir().unwrap();
        let config = config_with(root.path(), false);
        let seg = root.path().join("seg001.ts");
        std::fs::write(&seg, b"payload").unwrap();

        dispose(&seg, FileClass::Segment, &config).await;
        assert!(!seg.exists());
    }

    #[tokio::test]
    async fn archives_segment_byte_for_byte_when_recording() {
        let root = tempfile::tempdir().unwrap();
        let config = config_with(root.path(), true);
        std::fs::create_dir_all(&config.record_dir).unwrap();
        let seg = root.path().join("seg001.ts");
        std::fs::write(&seg, b"\x00\x01segment-bytes\xff").unwrap();

        dispose(&seg, FileClass::Segment, &config).await;

        assert!(!seg.exists());
        let archived = std::fs::read(config.record_dir.join("seg001.ts")).unwrap();
        assert_eq!(archived, b"\x00\x01segment-bytes\xff");
    }

    #[tokio::test]
    async fn manifest_is_never_touched() {
        let root = tempfile::tempdir().unwrap();
        let config = config_with(root.path(), true);
        let manifest = root.path().join("index.m3u8");
        std::fs::write(&manifest, b"#EXTM3U").unwrap();

        dispose(&manifest, FileClass::Manifest, &config).await;
        assert!(manifest.exists());
    }

    #[tokio::test]
    async fn disposal_failure_is_swallowed() {
        let root = tempfile::tempdir().unwrap();
        let config = config_with(root.path(), false);

        // Deleting a path that no longer exists must not panic or error.
        dispose(&root.path().join("vanished.ts"), FileClass::Segment, &config).await;
    }

    #[tokio::test]
    async fn archive_failure_leaves_file_in_place() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_with(root.path(), true);
        // Point the record dir at a path that cannot exist.
        config.record_dir = root.path().join("missing").join("record");
        let seg = root.path().join("seg001.ts");
        std::fs::write(&seg, b"payload").unwrap();

        dispose(&seg, FileClass::Segment, &config).await;
        assert!(seg.exists());
    }
}
