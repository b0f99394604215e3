//! Backlog scan: pick up files already sitting in the cache directory.
//!
//! Files dropped before the watcher attaches would otherwise never be seen.
//! The scan runs once at startup and enqueues everything that passes the
//! same extension filter the watcher applies. A file that is also reported
//! by the watcher gets queued twice; duplicate delivery is tolerated.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::RelayConfig;
use crate::queue::PendingQueue;

/// Recursively collect qualifying regular files under `root`, oldest first
/// by modification time. `root` should already be absolute so the queued
/// paths are absolute too.
pub fn backlog_paths(root: &Path, config: &RelayConfig) -> Vec<PathBuf> {
    let mut found: Vec<(PathBuf, SystemTime)> = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry during backlog scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if config.classify(entry.path()).is_none() {
            continue;
        }

        let mtime = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((entry.into_path(), mtime));
    }

    found.sort_by_key(|(_, mtime)| *mtime);
    found.into_iter().map(|(path, _)| path).collect()
}

/// Scan `root` and push every qualifying file onto the queue. Returns the
/// number of files enqueued.
pub fn enqueue_backlog(root: &Path, config: &RelayConfig, queue: &PendingQueue) -> usize {
    let paths = backlog_paths(root, config);
    let count = paths.len();
    for path in paths {
        debug!(path = %path.display(), "backlog file enqueued");
        queue.push(path);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn collects_only_qualifying_files() {
        let root = tempfile::tempdir().unwrap();
        let config = RelayConfig::default();

        touch(&root.path().join("seg001.ts"));
        touch(&root.path().join("index.m3u8"));
        touch(&root.path().join("seg001.ts.tmp"));
        touch(&root.path().join("notes.txt"));

        let paths = backlog_paths(root.path(), &config);
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(paths.len(), 2);
        assert!(names.contains(&"seg001.ts".to_string()));
        assert!(names.contains(&"index.m3u8".to_string()));
    }

    #[test]
    fn recurses_into_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        let config = RelayConfig::default();

        let nested = root.path().join("stream1").join("hi");
        fs::create_dir_all(&nested).unwrap();
        touch(&nested.join("seg042.ts"));

        let paths = backlog_paths(root.path(), &config);
        assert_eq!(paths, vec![nested.join("seg042.ts")]);
    }

    #[test]
    fn orders_by_modification_time() {
        let root = tempfile::tempdir().unwrap();
        let config = RelayConfig::default();

        // Filesystem mtime granularity can be coarse; space the writes out.
        touch(&root.path().join("older.ts"));
        std::thread::sleep(Duration::from_millis(50));
        touch(&root.path().join("newer.ts"));

        let paths = backlog_paths(root.path(), &config);
        assert_eq!(
            paths,
            vec![root.path().join("older.ts"), root.path().join("newer.ts")]
        );
    }

    #[test]
    fn enqueue_backlog_feeds_the_queue() {
        let root = tempfile::tempdir().unwrap();
        let config = RelayConfig::default();
        let queue = PendingQueue::new();

        touch(&root.path().join("seg001.ts"));
        touch(&root.path().join("index.m3u8"));

        let count = enqueue_backlog(root.path(), &config, &queue);
        assert_eq!(count, 2);
        assert_eq!(queue.depth(), 2);
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let root = tempfile::tempdir().unwrap();
        let config = RelayConfig::default();

        assert!(backlog_paths(root.path(), &config).is_empty());
    }
}
