//! Persistent tile storage.
//!
//! The cache reads and writes tiles through the [`TileSource`] trait using
//! string keys of the form `"{version}/{name}.hgt"` (unpacked) or
//! `"{version}/{name}.hgt.zip"` (packed). Two implementations ship with the
//! crate:
//!
//! - [`DirectoryStore`]: one file per key under a root directory. Unpacked
//!   tiles are memory-mapped on read.
//! - [`MemoryStore`]: an in-process map, handy for tests and for callers
//!   that manage persistence themselves.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::filename::TileName;
use crate::tile::TileBytes;
use crate::version::VersionTag;

/// Store key of an unpacked tile, e.g. `v2.3/N46E013.hgt`.
pub fn unpacked_key(name: TileName, version: VersionTag) -> String {
    format!("{}/{}", version, name.file_name())
}

/// Store key of a packed tile, e.g. `v2.3/N46E013.hgt.zip`.
pub fn packed_key(name: TileName, version: VersionTag) -> String {
    format!("{}/{}", version, name.archive_name())
}

/// Byte store holding tiles between runs.
///
/// Errors from `read` and `write` are propagated to the caller unchanged.
pub trait TileSource: Send + Sync {
    /// Whether `key` is stored.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Contents stored under `key`.
    fn read(&self, key: &str) -> Result<TileBytes>;

    /// Store `bytes` under `key`, replacing any previous contents.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Tiles stored as files below a root directory.
///
/// ```
/// use hgtcache::storage::{DirectoryStore, TileSource};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = DirectoryStore::new(dir.path());
///
/// store.write("v2.3/N46E013.hgt.zip", b"packed").unwrap();
/// assert!(store.exists("v2.3/N46E013.hgt.zip").unwrap());
/// assert!(dir.path().join("v2.3").join("N46E013.hgt.zip").is_file());
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Tiles stored for `version`, packed or unpacked, sorted by name.
    ///
    /// Files that do not parse as tile names are ignored; a missing version
    /// directory yields an empty list.
    pub fn scan(&self, version: VersionTag) -> Vec<TileName> {
        let entries = match fs::read_dir(self.root.join(version.as_str())) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names = BTreeSet::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !(file_name.ends_with(".hgt") || file_name.ends_with(".hgt.zip")) {
                continue;
            }
            if let Some(name) = TileName::parse(&file_name) {
                names.insert(name);
            }
        }

        names.into_iter().collect()
    }
}

impl TileSource for DirectoryStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn read(&self, key: &str) -> Result<TileBytes> {
        let path = self.path_for(key);

        if key.ends_with(".hgt") {
            let file = File::open(&path)?;
            if file.metadata()?.len() > 0 {
                // SAFETY: Memory mapping is safe as long as the file is not
                // modified while mapped. Tiles are written once and replaced
                // by rename, never rewritten in place.
                let mmap = unsafe { Mmap::map(&file)? };
                return Ok(TileBytes::Mapped(mmap));
            }
        }

        Ok(TileBytes::Owned(fs::read(&path)?))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid key {}", key))
        })?;
        fs::create_dir_all(parent)?;

        // Write to a uniquely named file next to the target and rename it
        // into place, so readers never map a partially written file
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "stored tile");
        Ok(())
    }
}

/// Tiles held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl TileSource for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(key))
    }

    fn read(&self, key: &str) -> Result<TileBytes> {
        self.files
            .read()
            .get(key)
            .map(|bytes| TileBytes::Owned(bytes.clone()))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, key.to_string()).into())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.files.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
