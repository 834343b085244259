use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Polls a file's modification time every `interval`. The only state shared
/// with the event loop is the `changed` flag.
pub struct FileWatcher {
    path: PathBuf,
    changed: Arc<AtomicBool>,
    _watcher: PollWatcher,
}

impl FileWatcher {
    pub fn spawn(path: &Path, interval: Duration) -> Result<Self> {
        let changed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&changed);
        let handler = move |result: notify::Result<notify::Event>| match result {
            Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                debug!(paths = ?event.paths, "document changed on disk");
                flag.store(true, Ordering::Release);
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "file watcher error"),
        };

        let mut watcher = PollWatcher::new(handler, Config::default().with_poll_interval(interval))
            .context("failed to start file watcher")?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {:?}", path))?;

        Ok(Self {
            path: path.to_path_buf(),
            changed,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once per observed modification.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Instant, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn reports_modification_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"v1").unwrap();

        let watcher = FileWatcher::spawn(&path, Duration::from_millis(50)).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert!(!watcher.take_changed());

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        drop(file);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline {
            if watcher.take_changed() {
                seen = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(seen);
        thread::sleep(Duration::from_millis(150));
        assert!(!watcher.take_changed());
    }

    #[test]
    fn remembers_watched_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"v1").unwrap();
        let watcher = FileWatcher::spawn(&path, Duration::from_secs(10)).unwrap();
        assert_eq!(watcher.path(), path.as_path());
        assert!(!watcher.take_changed());
    }
}
