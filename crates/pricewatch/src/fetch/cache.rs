//! Two-tier page cache: in-memory map in front of one HTML file per URI.
//!
//! Both tiers share one TTL. An entry is fresh while `cached_at + ttl` lies in
//! the future; on disk, `cached_at` is the file's modification time. Stale
//! entries are dropped from whichever tier they were found in.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::text;

/// Unique suffix source for temporary cache files.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

struct CacheEntry {
    cached_at: SystemTime,
    content: String,
}

fn is_fresh(cached_at: SystemTime, ttl: Duration) -> bool {
    match SystemTime::now().duration_since(cached_at) {
        Ok(age) => age < ttl,
        // Written "in the future" by a skewed clock.
        Err(_) => true,
    }
}

/// Page cache keyed by absolute URI.
pub struct PageCache {
    /// Directory for `.html` files; `None` keeps the cache in memory only.
    dir: Option<PathBuf>,
    ttl: Duration,
    memory: DashMap<String, CacheEntry>,
}

impl PageCache {
    pub fn new(dir: Option<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir,
            ttl,
            memory: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Disk location for a URI, if the disk tier is enabled.
    pub fn path_for(&self, uri: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.html", text::uri_to_filename(uri))))
    }

    /// Fresh content from memory. Stale entries are evicted.
    pub fn get_memory(&self, uri: &str) -> Option<String> {
        let hit = self
            .memory
            .get(uri)
            .map(|entry| (is_fresh(entry.cached_at, self.ttl), entry.content.clone()));

        match hit {
            Some((true, content)) => Some(content),
            Some((false, _)) => {
                debug!(uri, "memory cache entry expired");
                self.memory.remove(uri);
                None
            }
            None => None,
        }
    }

    /// Fresh content from disk, promoted into memory on a hit. Stale or empty
    /// files are deleted.
    pub fn get_disk(&self, uri: &str) -> Option<String> {
        let path = self.path_for(uri)?;
        let meta = fs::metadata(&path).ok()?;
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if meta.len() == 0 || !is_fresh(modified, self.ttl) {
            debug!(uri, path = %path.display(), "disk cache entry stale, removing");
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), "failed to remove stale cache file: {e}");
            }
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(content) => {
                self.memory.insert(
                    uri.to_string(),
                    CacheEntry {
                        cached_at: modified,
                        content: content.clone(),
                    },
                );
                Some(content)
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to read cache file: {e}");
                None
            }
        }
    }

    /// Memory first, then disk.
    pub fn get(&self, uri: &str) -> Option<String> {
        self.get_memory(uri).or_else(|| self.get_disk(uri))
    }

    /// Store fresh content in both tiers. Disk failures are logged, not raised.
    pub fn put(&self, uri: &str, content: &str) {
        self.memory.insert(
            uri.to_string(),
            CacheEntry {
                cached_at: SystemTime::now(),
                content: content.to_string(),
            },
        );

        if let Some(path) = self.path_for(uri) {
            if let Err(e) = write_atomic(&path, content) {
                warn!(path = %path.display(), "failed to write cache file: {e}");
            }
        }
    }

    /// Drop a URI from both tiers.
    pub fn invalidate(&self, uri: &str) {
        self.memory.remove(uri);
        if let Some(path) = self.path_for(uri) {
            let _ = fs::remove_file(path);
        }
    }

    /// Number of entries held in memory (including stale ones).
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

/// Write through a temporary sibling and rename, so readers never see a
/// partially written page.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{n}.tmp", std::process::id()));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}
