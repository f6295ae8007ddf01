//! Tree walker for discovering files to scan.
//!
//! The walker reads filesystem metadata only. It filters entries by an
//! extension allow-list and hands matching paths to the worker pool through
//! a bounded queue, giving up promptly when the cancellation signal fires.

use crate::error::PipelineError;
use crate::models::{StatsCounters, WorkItem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include, without the dot (e.g. ["go", "txt"])
    pub extensions: Vec<String>,
    /// Directory or file names to prune from the walk
    pub excludes: Vec<String>,
    /// Whether names without any `.` are scanned
    pub include_extensionless: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["go", "txt", "js", "py"]
                .into_iter()
                .map(String::from)
                .collect(),
            excludes: Vec::new(),
            include_extensionless: false,
        }
    }
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            include_extensionless: config.include_extensionless,
        }
    }
}

/// Returns the text after the last `.` of a file name, or `None` when the
/// name has no dot at all.
///
/// A trailing dot yields `Some("")`; a leading dot (`.bashrc`) yields the
/// rest of the name.
pub fn extension_of(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

/// What the walker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Paths successfully handed to the worker pool.
    pub emitted: u64,
    /// The walk stopped early because of cancellation.
    pub cancelled: bool,
}

/// File scanner for discovering matching files under a root.
#[derive(Debug, Clone)]
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Check if a file name passes the extension filter.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!("Skipping non UTF-8 file name: {}", path.display());
            return false;
        };

        match extension_of(name) {
            Some(ext) => self.config.extensions.iter().any(|allowed| allowed == ext),
            None => self.config.include_extensionless,
        }
    }

    /// Check if a name matches exclusion patterns.
    fn is_excluded(&self, name: &str) -> bool {
        self.config.excludes.iter().any(|pattern| name == pattern)
    }

    /// Every entry below the root, excluded names pruned, in file name order.
    ///
    /// Symlinks are not followed.
    fn entries(&self) -> impl Iterator<Item = walkdir::Result<DirEntry>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| self.is_excluded(name))
            })
    }

    /// Keep traversal errors and matching files; drop everything else.
    fn select(
        &self,
        entry: walkdir::Result<DirEntry>,
    ) -> Option<Result<PathBuf, walkdir::Error>> {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => None,
            Ok(entry) if self.matches(entry.path()) => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Lazily walk the tree, yielding matching file paths.
    ///
    /// Traversal errors are yielded in place.
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, walkdir::Error>> + '_ {
        self.entries().filter_map(move |entry| self.select(entry))
    }

    /// Collect all matching files, stopping at the first traversal error.
    pub fn scan(&self) -> Result<Vec<PathBuf>, PipelineError> {
        self.walk()
            .map(|entry| entry.map_err(|e| self.traversal_error(e)))
            .collect()
    }

    fn traversal_error(&self, source: walkdir::Error) -> PipelineError {
        let path = source
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        PipelineError::Traversal { path, source }
    }

    /// Walk the tree and push every match into `paths`.
    ///
    /// Blocks the calling thread; each hand-off is driven on `handle` and
    /// raced against `cancel`. Returns the first traversal error, if any.
    /// Dropping `paths` on return closes the queue for the workers.
    pub fn feed(
        &self,
        handle: &Handle,
        paths: mpsc::Sender<WorkItem>,
        cancel: &CancellationToken,
        stats: &StatsCounters,
    ) -> Result<WalkSummary, PipelineError> {
        let mut summary = WalkSummary::default();

        // Cancellation is checked per raw entry, not per match.
        for entry in self.entries() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let Some(entry) = self.select(entry) else {
                continue;
            };
            let path = entry.map_err(|e| self.traversal_error(e))?;
            debug!("walker: {}", path.display());

            let delivered = handle.block_on(async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = paths.send(WorkItem::new(path)) => sent.is_ok(),
                }
            });

            if !delivered {
                // Either cancelled, or every worker is gone.
                summary.cancelled = true;
                break;
            }

            stats.file_matched();
            summary.emitted += 1;
        }

        info!(
            "Walker finished: {} files emitted{}",
            summary.emitted,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }
}

/// Run the walker on the blocking pool.
///
/// The returned handle resolves to the walker's single-slot terminal result.
pub fn spawn_walker(
    scanner: FileScanner,
    paths: mpsc::Sender<WorkItem>,
    cancel: CancellationToken,
    stats: Arc<StatsCounters>,
) -> JoinHandle<Result<WalkSummary, PipelineError>> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || scanner.feed(&handle, paths, &cancel, &stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "aab").unwrap();
        fs::write(dir.path().join("b.go"), "bbc").unwrap();
        fs::write(dir.path().join("c.rs"), "ignored").unwrap();
        fs::write(dir.path().join("README"), "no dot").unwrap();
        fs::create_dir_all(dir.path().join("nested.js/deeper")).unwrap();
        fs::write(dir.path().join("nested.js/deeper/d.py"), "x").unwrap();
        fs::create_dir_all(dir.path().join("skipme")).unwrap();
        fs::write(dir.path().join("skipme/e.txt"), "y").unwrap();
        dir
    }

    fn names(mut paths: Vec<PathBuf>) -> Vec<String> {
        paths.sort();
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("main.go"), Some("go"));
        assert_eq!(extension_of("archive.tar.txt"), Some("txt"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of("trailing."), Some(""));
        assert_eq!(extension_of(".bashrc"), Some("bashrc"));
    }

    #[test]
    fn test_matches_is_case_sensitive() {
        let scanner = FileScanner::new(PathBuf::from("."), ScanConfig::default());
        assert!(scanner.matches(Path::new("x/y.txt")));
        assert!(!scanner.matches(Path::new("x/y.TXT")));
        assert!(!scanner.matches(Path::new("x/Makefile")));
    }

    #[test]
    fn test_extensionless_fallback() {
        let config = ScanConfig {
            include_extensionless: true,
            ..ScanConfig::default()
        };
        let scanner = FileScanner::new(PathBuf::from("."), config);
        assert!(scanner.matches(Path::new("x/Makefile")));
        assert!(!scanner.matches(Path::new("x/lib.rs")));
    }

    #[test]
    fn test_scan_skips_directories_with_dotted_names() {
        let dir = fixture();
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let found = names(scanner.scan().unwrap());
        assert_eq!(found, vec!["a.txt", "b.go", "d.py", "e.txt"]);
    }

    #[test]
    fn test_scan_prunes_excluded_names() {
        let dir = fixture();
        let config = ScanConfig {
            excludes: vec!["skipme".to_string()],
            ..ScanConfig::default()
        };
        let scanner = FileScanner::new(dir.path().to_path_buf(), config);
        let found = names(scanner.scan().unwrap());
        assert_eq!(found, vec!["a.txt", "b.go", "d.py"]);
    }

    #[test]
    fn test_missing_root_is_traversal_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let scanner = FileScanner::new(missing.clone(), ScanConfig::default());

        match scanner.scan() {
            Err(PipelineError::Traversal { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected traversal error, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_walker_feeds_queue_and_closes_it() {
        let dir = fixture();
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let stats = Arc::new(StatsCounters::default());
        let (tx, mut rx) = mpsc::channel(1);

        let walker = spawn_walker(scanner, tx, CancellationToken::new(), stats.clone());

        let mut received = Vec::new();
        while let Some(item) = rx.recv().await {
            received.push(item.path().to_path_buf());
        }

        let summary = walker.await.unwrap().unwrap();
        assert_eq!(summary.emitted, 4);
        assert!(!summary.cancelled);
        assert_eq!(stats.snapshot().files_matched, 4);
        assert_eq!(names(received), vec!["a.txt", "b.go", "d.py", "e.txt"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_walker_aborts_blocked_handoff_on_cancel() {
        let dir = fixture();
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);

        // Nobody drains the queue, so the second hand-off blocks.
        let walker = spawn_walker(
            scanner,
            tx,
            cancel.clone(),
            Arc::new(StatsCounters::default()),
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let summary = tokio::time::timeout(std::time::Duration::from_secs(5), walker)
            .await
            .expect("walker did not stop after cancel")
            .unwrap()
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.emitted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_walk_stops_among_non_matching_entries() {
        let dir = TempDir::new().unwrap();
        for i in 0..500 {
            fs::write(dir.path().join(format!("blob{}.bin", i)), "x").unwrap();
        }
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel(1);

        let summary = spawn_walker(scanner, tx, cancel, Arc::new(StatsCounters::default()))
            .await
            .unwrap()
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.emitted, 0);
    }
}
