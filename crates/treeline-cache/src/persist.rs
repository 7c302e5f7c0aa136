//! Disk Persistence
//!
//! Optional disk mirror for cache entries. Each key becomes two files
//! named by an FNV-64 hash of the key: a JSON metadata sidecar and a
//! raw value blob. Reads are strictly best-effort: any missing file,
//! parse failure, hash collision, or expired ttl is a miss.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use treeline_core::CacheCategory;

use crate::entry::CacheEntry;

/// Metadata sidecar persisted next to the value blob.
///
/// `created_unix_ms` + `ttl_ms` pin the absolute expiry deadline. A
/// reload rehydrates `ttl` as the span still remaining, so the
/// deadline survives a restart even though the stored span does not
/// round-trip byte-equal.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Full key, checked on load to reject filename-hash collisions
    pub key: String,
    pub category: CacheCategory,
    pub size_bytes: usize,
    pub created_unix_ms: u64,
    pub ttl_ms: Option<u64>,
    pub priority: u8,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
}

fn fnv64(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl DiskCache {
    /// Opens (and creates if needed) the cache directory.
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:016x}.meta.json", fnv64(key)))
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:016x}.bin", fnv64(key)))
    }

    pub fn save(&self, key: &str, entry: &CacheEntry) -> std::io::Result<()> {
        let meta = EntryMeta {
            key: key.to_string(),
            category: entry.category,
            size_bytes: entry.size_bytes,
            created_unix_ms: now_unix_ms(),
            ttl_ms: entry.ttl.map(|t| t.as_millis() as u64),
            priority: entry.priority,
            tags: entry.tags.clone(),
            dependencies: entry.dependencies.clone(),
        };
        let json = serde_json::to_vec(&meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(self.value_path(key), entry.value.as_slice())?;
        fs::write(self.meta_path(key), json)?;
        Ok(())
    }

    /// Loads a key back into an in-memory entry. Expired-on-disk
    /// entries are deleted and reported as a miss; a surviving ttl is
    /// rehydrated as the time remaining, not the original span.
    pub fn load(&self, key: &str) -> Option<CacheEntry> {
        let meta_bytes = fs::read(self.meta_path(key)).ok()?;
        let meta: EntryMeta = serde_json::from_slice(&meta_bytes).ok()?;
        if meta.key != key {
            return None;
        }

        let remaining_ttl = match meta.ttl_ms {
            Some(ttl_ms) => {
                let age = now_unix_ms().saturating_sub(meta.created_unix_ms);
                if age >= ttl_ms {
                    self.remove(key);
                    return None;
                }
                Some(Duration::from_millis(ttl_ms - age))
            }
            None => None,
        };

        let value = fs::read(self.value_path(key)).ok()?;
        let mut entry = CacheEntry::new(Arc::new(value), meta.category, meta.size_bytes);
        entry.priority = meta.priority;
        entry.ttl = remaining_ttl;
        entry.tags = meta.tags;
        entry.dependencies = meta.dependencies;
        Some(entry)
    }

    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.value_path(key));
        let _ = fs::remove_file(self.meta_path(key));
    }

    pub fn clear(&self) {
        let Ok(read) = fs::read_dir(&self.dir) else {
            return;
        };
        for item in read.flatten() {
            let path = item.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with(".bin") || name.ends_with(".meta.json") {
                let _ = fs::remove_file(path);
            }
        }
    }
}
