//! Resident tile sets.
//!
//! A [`ResidentSet`] decides which decoded tiles stay in memory. The cache
//! picks one strategy at construction:
//!
//! - [`RetainAll`]: every tile stays resident, optionally bounded by an
//!   entry count with LRU-style eviction.
//! - [`SingleSlot`]: at most one tile is resident; each load replaces it.
//!
//! Both guarantee that a key is either absent or bound to a fully decoded
//! tile, and that concurrent requests for the same key load it once.

use std::sync::Arc;

use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};

use crate::error::{ElevationError, Result};
use crate::filename::TileName;
use crate::tile::DecodedTile;
use crate::version::VersionTag;

/// Key of a resident tile.
pub type CacheKey = (TileName, VersionTag);

/// Loads a tile on a miss. `Ok(None)` means the tile does not exist.
pub type Loader<'a> = &'a (dyn Fn() -> Result<Option<DecodedTile>> + Send + Sync);

/// Result of a resident-set lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The tile was already resident.
    Hit(Arc<DecodedTile>),
    /// The tile was loaded by this call or one it waited on.
    Loaded(Arc<DecodedTile>),
    /// The tile does not exist.
    Absent,
}

impl Lookup {
    /// The tile, if any.
    pub fn tile(self) -> Option<Arc<DecodedTile>> {
        match self {
            Lookup::Hit(tile) | Lookup::Loaded(tile) => Some(tile),
            Lookup::Absent => None,
        }
    }
}

/// Eviction strategy for decoded tiles.
pub trait ResidentSet: Send + Sync {
    /// Resident tile for `key`, loading it with `load` on a miss.
    fn get_or_load(&self, key: CacheKey, load: Loader<'_>) -> Result<Lookup>;

    /// Resident tile for `key` without loading.
    fn get(&self, key: &CacheKey) -> Option<Arc<DecodedTile>>;

    /// Number of resident tiles.
    fn len(&self) -> u64;

    /// Whether no tile is resident.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the resident tiles, sorted.
    fn keys(&self) -> Vec<CacheKey>;

    /// Drop every resident tile.
    fn clear(&self);
}

/// Why a coalesced load produced no tile.
enum Miss {
    Absent,
    Failed(ElevationError),
}

/// Keep every decoded tile, or the most useful `capacity` of them.
pub struct RetainAll {
    tiles: Cache<CacheKey, Arc<DecodedTile>>,
}

impl RetainAll {
    /// Retain every tile for the lifetime of the cache.
    pub fn unbounded() -> Self {
        Self {
            tiles: Cache::builder().build(),
        }
    }

    /// Retain at most `capacity` tiles.
    pub fn bounded(capacity: u64) -> Self {
        Self {
            tiles: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Configured capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<u64> {
        self.tiles.policy().max_capacity()
    }
}

impl ResidentSet for RetainAll {
    fn get_or_load(&self, key: CacheKey, load: Loader<'_>) -> Result<Lookup> {
        if let Some(tile) = self.tiles.get(&key) {
            return Ok(Lookup::Hit(tile));
        }

        // Concurrent callers for the same key wait on a single load. The
        // caller running it keeps the original error, waiters get a copy.
        let mut failure = None;
        let loaded = self.tiles.try_get_with(key, || match load() {
            Ok(Some(tile)) => Ok(Arc::new(tile)),
            Ok(None) => Err(Miss::Absent),
            Err(e) => {
                let miss = Miss::Failed(e.shared());
                failure = Some(e);
                Err(miss)
            }
        });

        match (loaded, failure) {
            (Ok(tile), _) => Ok(Lookup::Loaded(tile)),
            (Err(_), Some(err)) => Err(err),
            (Err(miss), None) => match &*miss {
                Miss::Absent => Ok(Lookup::Absent),
                Miss::Failed(err) => Err(err.shared()),
            },
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<DecodedTile>> {
        self.tiles.get(key)
    }

    fn len(&self) -> u64 {
        self.tiles.run_pending_tasks();
        self.tiles.entry_count()
    }

    fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.tiles.iter().map(|(key, _)| *key).collect();
        keys.sort();
        keys
    }

    fn clear(&self) {
        self.tiles.invalidate_all();
        self.tiles.run_pending_tasks();
    }
}

/// Keep only the most recently loaded tile.
///
/// Loads are serialized; a successful load replaces the slot in one write.
/// Queries already holding the previous tile keep it alive through their
/// `Arc` until they finish.
#[derive(Default)]
pub struct SingleSlot {
    slot: RwLock<Option<(CacheKey, Arc<DecodedTile>)>>,
    loading: Mutex<()>,
}

impl SingleSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResidentSet for SingleSlot {
    fn get_or_load(&self, key: CacheKey, load: Loader<'_>) -> Result<Lookup> {
        if let Some(tile) = self.get(&key) {
            return Ok(Lookup::Hit(tile));
        }

        let _loading = self.loading.lock();

        // Another caller may have loaded it while we waited
        if let Some(tile) = self.get(&key) {
            return Ok(Lookup::Loaded(tile));
        }

        match load()? {
            Some(tile) => {
                let tile = Arc::new(tile);
                *self.slot.write() = Some((key, Arc::clone(&tile)));
                Ok(Lookup::Loaded(tile))
            }
            None => Ok(Lookup::Absent),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<DecodedTile>> {
        match &*self.slot.read() {
            Some((resident, tile)) if resident == key => Some(Arc::clone(tile)),
            _ => None,
        }
    }

    fn len(&self) -> u64 {
        u64::from(self.slot.read().is_some())
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.slot.read().iter().map(|(key, _)| *key).collect()
    }

    fn clear(&self) {
        *self.slot.write() = None;
    }
}
