//! Versioned tile cache with fallback.
//!
//! This module provides [`TileCache`], the entry point for elevation
//! queries. For each query it names the tile, walks the version fallback
//! chain until some version yields the tile, and interpolates inside it.
//!
//! # Tile Materialization
//!
//! A tile missing from the resident set is obtained in this order:
//!
//! 1. unpacked copy in the store (`v2.3/N46E013.hgt`)
//! 2. packed copy in the store (`v2.3/N46E013.hgt.zip`), unpacked on load
//! 3. remote archive from the index URL, written back to the store packed
//!    or unpacked depending on `leave_zipped`
//!
//! A tile without an index entry for the version is absent, which is not an
//! error: the next version of the chain is tried, and `Ok(None)` comes back
//! once the chain is exhausted.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hgtcache::storage::{MemoryStore, TileSource};
//! use hgtcache::{TileCache, TileIndex, TileName, VersionTag};
//!
//! // 3 × 3 tile, all samples at 812 m
//! let bytes: Vec<u8> = (0..9).flat_map(|_| 812i16.to_be_bytes()).collect();
//! let store = Arc::new(MemoryStore::new());
//! store.write("v2.3/N46E013.hgt", &bytes).unwrap();
//!
//! let cache = TileCache::builder(TileIndex::new())
//!     .store(store)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(812.0));
//! // Open ocean: no tile in any version
//! assert_eq!(cache.get_elevation(0.5, -150.5, false, None).unwrap(), None);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::archive;
use crate::error::{ElevationError, Result};
use crate::fetch::Fetcher;
use crate::filename::TileName;
use crate::index::TileIndex;
use crate::interpolate::{ElevationQuery, Interpolation, NeighborLookup};
use crate::resident::{CacheKey, Lookup, ResidentSet, RetainAll, SingleSlot};
use crate::storage::{packed_key, unpacked_key, DirectoryStore, TileSource};
use crate::tile::DecodedTile;
use crate::version::{FallbackChain, VersionTag};

#[cfg(feature = "download")]
use crate::fetch::{DownloadConfig, HttpFetcher};

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently resident.
    pub resident_count: u64,
    /// Number of lookups served by a resident tile.
    pub hit_count: u64,
    /// Number of lookups that had to materialize (or found nothing).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Elevation lookups over versioned tiles with a fallback chain.
///
/// `TileCache` is `Send + Sync`; share it between threads by reference or
/// through an `Arc`.
pub struct TileCache {
    index: Arc<TileIndex>,
    store: Arc<dyn TileSource>,
    fetcher: Option<Arc<dyn Fetcher>>,
    resident: Box<dyn ResidentSet>,
    default_version: VersionTag,
    fallback: bool,
    chain: FallbackChain,
    leave_zipped: bool,
    batch_mode: bool,
    url_templates: HashMap<VersionTag, String>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl TileCache {
    /// Create a builder around a tile index.
    pub fn builder(index: impl Into<Arc<TileIndex>>) -> TileCacheBuilder {
        TileCacheBuilder::new(index)
    }

    /// Elevation at `(lat, lon)`.
    ///
    /// With `approximate` the four neighbouring samples are blended,
    /// otherwise the nearest sample is returned. `version` defaults to the
    /// configured default version.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(elevation))` - elevation in meters
    /// - `Ok(None)` - no-data sample, or no version of the chain has the tile
    /// - `Err(...)` - invalid coordinates, corrupt data, or a transport
    ///   failure no later version could make up for
    pub fn get_elevation(
        &self,
        lat: f64,
        lon: f64,
        approximate: bool,
        version: Option<VersionTag>,
    ) -> Result<Option<f64>> {
        self.get_elevation_with(lat, lon, Interpolation::from_approximate(approximate), version)
    }

    /// Elevation at `(lat, lon)` using an explicit interpolation mode.
    pub fn get_elevation_with(
        &self,
        lat: f64,
        lon: f64,
        mode: Interpolation,
        version: Option<VersionTag>,
    ) -> Result<Option<f64>> {
        if let Interpolation::Idw { radius } = mode {
            if !(1..=2).contains(&radius) {
                return Err(ElevationError::InvalidRadius(radius));
            }
        }

        let Some(tile) = self.get_tile(lat, lon, version)? else {
            return Ok(None);
        };
        ElevationQuery::new(&tile, self).evaluate(lat, lon, mode)
    }

    /// Inverse-distance-weighted elevation with kernel `radius` (1 or 2).
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidRadius`] for any other radius, even
    /// where no tile exists.
    pub fn get_elevation_idw(
        &self,
        lat: f64,
        lon: f64,
        radius: u8,
        version: Option<VersionTag>,
    ) -> Result<Option<f64>> {
        self.get_elevation_with(lat, lon, Interpolation::Idw { radius }, version)
    }

    /// Elevations for a batch of coordinates, in input order.
    ///
    /// Coordinates are visited grouped by tile so that each tile is touched
    /// in one run, which keeps batch mode from reloading tiles. Each point
    /// gets its own result.
    pub fn get_elevations_batch(
        &self,
        coords: &[(f64, f64)],
        mode: Interpolation,
    ) -> Vec<Result<Option<f64>>> {
        let mut order: Vec<usize> = (0..coords.len()).collect();
        order.sort_by_key(|&i| TileName::from_coords(coords[i].0, coords[i].1));

        let mut results: Vec<Option<Result<Option<f64>>>> =
            std::iter::repeat_with(|| None).take(coords.len()).collect();
        for i in order {
            let (lat, lon) = coords[i];
            results[i] = Some(self.get_elevation_with(lat, lon, mode, None));
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Ok(None)))
            .collect()
    }

    /// Tile covering `(lat, lon)`, walking the fallback chain from `version`.
    ///
    /// Transport failures move on to the next version. If no later version
    /// yields the tile, the first transport failure is returned rather than
    /// `Ok(None)`.
    pub fn get_tile(
        &self,
        lat: f64,
        lon: f64,
        version: Option<VersionTag>,
    ) -> Result<Option<Arc<DecodedTile>>> {
        let name = TileName::from_coords(lat, lon);
        let mut current = Some(version.unwrap_or(self.default_version));
        let mut transport_error = None;

        while let Some(v) = current {
            match self.tile(name, v) {
                Ok(Some(tile)) => return Ok(Some(tile)),
                Ok(None) => {}
                Err(e) if self.fallback && e.is_transport() => {
                    tracing::warn!(tile = %name, version = %v, error = %e, "retrieval failed, trying next version");
                    transport_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }

            if !self.fallback {
                break;
            }
            current = self.chain.next(v);
            if let Some(next) = current {
                tracing::debug!(tile = %name, from = %v, to = %next, "falling back");
            }
        }

        match transport_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Tile `name` in exactly `version`, without fallback.
    pub fn tile(&self, name: TileName, version: VersionTag) -> Result<Option<Arc<DecodedTile>>> {
        let key: CacheKey = (name, version);
        let lookup = self
            .resident
            .get_or_load(key, &|| self.materialize(name, version))?;

        match &lookup {
            Lookup::Hit(_) => self.hit_count.fetch_add(1, Ordering::Relaxed),
            Lookup::Loaded(_) | Lookup::Absent => self.miss_count.fetch_add(1, Ordering::Relaxed),
        };
        Ok(lookup.tile())
    }

    /// Download URL of `name` in `version`, honouring template overrides.
    pub fn url(&self, name: TileName, version: VersionTag) -> Option<String> {
        match self.url_templates.get(&version) {
            Some(template) => self.index.url_with_template(name, version, template),
            None => self.index.url(name, version),
        }
    }

    /// Obtain and decode a tile that is not resident.
    fn materialize(&self, name: TileName, version: VersionTag) -> Result<Option<DecodedTile>> {
        let unpacked = unpacked_key(name, version);
        if self.store.exists(&unpacked)? {
            tracing::debug!(key = %unpacked, "loading stored tile");
            let bytes = self.store.read(&unpacked)?;
            return DecodedTile::from_bytes(name, version, bytes).map(Some);
        }

        let packed = packed_key(name, version);
        if self.store.exists(&packed)? {
            tracing::debug!(key = %packed, "loading stored archive");
            let bytes = self.store.read(&packed)?;
            let data = archive::unpack(&name.archive_name(), &bytes)?;
            return DecodedTile::from_bytes(name, version, data).map(Some);
        }

        let Some(url) = self.url(name, version) else {
            tracing::debug!(tile = %name, %version, "not in index");
            return Ok(None);
        };
        let Some(fetcher) = &self.fetcher else {
            tracing::debug!(tile = %name, %version, %url, "no fetcher configured");
            return Ok(None);
        };

        tracing::info!(%url, "retrieving tile");
        let archive_bytes = fetcher.fetch(&url)?;
        tracing::info!(%url, bytes = archive_bytes.len(), "received tile");

        let data = archive::unpack(&name.archive_name(), &archive_bytes)?;
        let tile = DecodedTile::from_bytes(name, version, data)?;

        if self.leave_zipped {
            self.store.write(&packed, &archive_bytes)?;
        } else {
            self.store.write(&unpacked, tile.as_bytes())?;
        }

        Ok(Some(tile))
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident_count: self.resident.len(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Keys of the resident tiles, sorted.
    pub fn resident_keys(&self) -> Vec<CacheKey> {
        self.resident.keys()
    }

    /// Drop every resident tile. Stored tiles are kept.
    pub fn clear_cache(&self) {
        self.resident.clear();
    }

    /// Tile index in use.
    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    /// Version used when a query names none.
    pub fn default_version(&self) -> VersionTag {
        self.default_version
    }

    /// Fallback chain in use.
    pub fn fallback_chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Whether absent tiles fall back to the next version.
    pub fn fallback_enabled(&self) -> bool {
        self.fallback
    }

    /// Whether at most one tile is kept resident.
    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode
    }

    /// Whether remote tiles can be retrieved.
    pub fn has_fetcher(&self) -> bool {
        self.fetcher.is_some()
    }
}

impl NeighborLookup for TileCache {
    fn neighbor_elevation(&self, lat: f64, lon: f64, version: VersionTag) -> Result<Option<f64>> {
        self.get_elevation(lat, lon, false, Some(version))
    }
}

/// Default store directory: `<user cache dir>/hgtcache`.
pub fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hgtcache")
}

/// Builder for [`TileCache`].
///
/// # Example
///
/// ```ignore
/// use hgtcache::{TileCache, TileIndex, VersionTag};
/// use hgtcache::fetch::DownloadConfig;
///
/// let cache = TileCache::builder(TileIndex::from_path("tiles.json")?)
///     .data_dir("/data/srtm")
///     .default_version(VersionTag::V3Srtm1)
///     .auto_download(DownloadConfig::nasa_earthdata("user", "password"))
///     .build()?;
/// ```
pub struct TileCacheBuilder {
    index: Arc<TileIndex>,
    data_dir: Option<PathBuf>,
    store: Option<Arc<dyn TileSource>>,
    default_version: VersionTag,
    fallback: bool,
    chain: FallbackChain,
    batch_mode: bool,
    cache_size: Option<u64>,
    leave_zipped: bool,
    url_templates: HashMap<VersionTag, String>,
    fetcher: Option<Arc<dyn Fetcher>>,
    #[cfg(feature = "download")]
    download_config: Option<DownloadConfig>,
}

impl TileCacheBuilder {
    /// Create a builder with default settings.
    pub fn new(index: impl Into<Arc<TileIndex>>) -> Self {
        Self {
            index: index.into(),
            data_dir: None,
            store: None,
            default_version: VersionTag::default(),
            fallback: true,
            chain: FallbackChain::default(),
            batch_mode: false,
            cache_size: None,
            leave_zipped: false,
            url_templates: HashMap::new(),
            fetcher: None,
            #[cfg(feature = "download")]
            download_config: None,
        }
    }

    /// Create a builder from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `HGTCACHE_INDEX` (required): Path to the tile index JSON
    /// - `HGTCACHE_DATA_DIR` (optional): Tile store directory
    /// - `HGTCACHE_VERSION` (optional): Default version (default: v2.3)
    /// - `HGTCACHE_FALLBACK` (optional): Enable version fallback (default: true)
    /// - `HGTCACHE_BATCH_MODE` (optional): Keep one resident tile (default: false)
    /// - `HGTCACHE_LEAVE_ZIPPED` (optional): Store fetched archives packed (default: false)
    /// - `HGTCACHE_CACHE_SIZE` (optional): Maximum resident tiles (default: unbounded)
    ///
    /// With the `download` feature:
    /// - `HGTCACHE_TIMEOUT` (optional): HTTP timeout in seconds (default: 15)
    /// - `HGTCACHE_EARTHDATA_USER`, `HGTCACHE_EARTHDATA_PASSWORD` (optional):
    ///   NASA Earthdata credentials
    pub fn from_env() -> Result<Self> {
        let index_path = std::env::var("HGTCACHE_INDEX").map_err(|_| {
            ElevationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HGTCACHE_INDEX environment variable not set",
            ))
        })?;
        let index = TileIndex::from_path(&index_path)?;

        let mut builder = Self::new(index)
            .fallback(env_flag("HGTCACHE_FALLBACK", true))
            .batch_mode(env_flag("HGTCACHE_BATCH_MODE", false))
            .leave_zipped(env_flag("HGTCACHE_LEAVE_ZIPPED", false));

        if let Ok(dir) = std::env::var("HGTCACHE_DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        if let Ok(version) = std::env::var("HGTCACHE_VERSION") {
            builder = builder.default_version(version.parse()?);
        }
        if let Some(size) = std::env::var("HGTCACHE_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            builder = builder.cache_size(size);
        }

        #[cfg(feature = "download")]
        {
            let mut config = DownloadConfig::new();
            if let Some(timeout) = std::env::var("HGTCACHE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
            {
                config = config.with_timeout(timeout);
            }
            if let (Ok(user), Ok(password)) = (
                std::env::var("HGTCACHE_EARTHDATA_USER"),
                std::env::var("HGTCACHE_EARTHDATA_PASSWORD"),
            ) {
                config = config.with_credentials(user, password);
            }
            builder = builder.auto_download(config);
        }

        Ok(builder)
    }

    /// Store tiles as files under `path`.
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a custom tile store. Takes precedence over `data_dir`.
    pub fn store(mut self, store: Arc<dyn TileSource>) -> Self {
        self.store = Some(store);
        self
    }

    /// Version used when a query names none.
    pub fn default_version(mut self, version: VersionTag) -> Self {
        self.default_version = version;
        self
    }

    /// Enable or disable version fallback.
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback = enabled;
        self
    }

    /// Replace the fallback chain.
    pub fn fallback_chain(mut self, chain: FallbackChain) -> Self {
        self.chain = chain;
        self
    }

    /// Keep at most one resident tile.
    pub fn batch_mode(mut self, enabled: bool) -> Self {
        self.batch_mode = enabled;
        self
    }

    /// Keep at most `size` resident tiles. Ignored in batch mode.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = Some(size);
        self
    }

    /// Store fetched tiles as the downloaded archive instead of unpacked.
    pub fn leave_zipped(mut self, enabled: bool) -> Self {
        self.leave_zipped = enabled;
        self
    }

    /// Override the download URL template of `version`.
    ///
    /// `{name}` and `{region}` are substituted as in the default templates.
    pub fn url_template(mut self, version: VersionTag, template: impl Into<String>) -> Self {
        self.url_templates.insert(version, template.into());
        self
    }

    /// Retrieve remote tiles through `fetcher`.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Enable automatic downloading over HTTP.
    ///
    /// Ignored when a custom fetcher is set.
    #[cfg(feature = "download")]
    pub fn auto_download(mut self, config: DownloadConfig) -> Self {
        self.download_config = Some(config);
        self
    }

    /// Build the cache.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be created.
    pub fn build(self) -> Result<TileCache> {
        let store: Arc<dyn TileSource> = match self.store {
            Some(store) => store,
            None => Arc::new(DirectoryStore::new(
                self.data_dir.unwrap_or_else(default_data_dir),
            )),
        };

        #[cfg(feature = "download")]
        let fetcher = match (self.fetcher, self.download_config) {
            (Some(fetcher), _) => Some(fetcher),
            (None, Some(config)) => Some(Arc::new(HttpFetcher::new(config)?) as Arc<dyn Fetcher>),
            (None, None) => None,
        };
        #[cfg(not(feature = "download"))]
        let fetcher = self.fetcher;

        let resident: Box<dyn ResidentSet> = if self.batch_mode {
            if self.cache_size.is_some() {
                tracing::debug!("cache size ignored in batch mode");
            }
            Box::new(SingleSlot::new())
        } else {
            match self.cache_size {
                Some(size) => Box::new(RetainAll::bounded(size)),
                None => Box::new(RetainAll::unbounded()),
            }
        };

        Ok(TileCache {
            index: self.index,
            store,
            fetcher,
            resident,
            default_version: self.default_version,
            fallback: self.fallback,
            chain: self.chain,
            leave_zipped: self.leave_zipped,
            batch_mode: self.batch_mode,
            url_templates: self.url_templates,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }
}

/// Boolean environment flag: `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`.
fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_flag(&value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::pack;
    use crate::storage::MemoryStore;
    use crate::tile::tests::grid_bytes;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Fetcher serving canned archives and recording requested URLs.
    #[derive(Default)]
    struct MockFetcher {
        archives: HashMap<String, Vec<u8>>,
        failing: Vec<String>,
        requests: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl MockFetcher {
        fn serve(mut self, url: &str, archive: Vec<u8>) -> Self {
            self.archives.insert(url.to_string(), archive);
            self
        }

        fn fail(mut self, url: &str) -> Self {
            self.failing.push(url.to_string());
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    impl Fetcher for MockFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.lock().push(url.to_string());
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if self.failing.iter().any(|u| u == url) {
                return Err(ElevationError::DownloadFailed {
                    url: url.to_string(),
                    reason: "HTTP 503".to_string(),
                });
            }
            self.archives
                .get(url)
                .cloned()
                .ok_or_else(|| ElevationError::DownloadFailed {
                    url: url.to_string(),
                    reason: "HTTP 404".to_string(),
                })
        }
    }

    /// 5 × 5 grid filled with `value`.
    fn flat(value: i16) -> Vec<u8> {
        grid_bytes(&[value; 25])
    }

    fn template(version: VersionTag) -> String {
        format!("https://mirror.test/{}/{{name}}.hgt.zip", version)
    }

    fn url(version: VersionTag, name: &str) -> String {
        format!("https://mirror.test/{}/{}.hgt.zip", version, name)
    }

    fn builder_with(
        index: TileIndex,
        store: Arc<MemoryStore>,
        fetcher: Arc<MockFetcher>,
    ) -> TileCacheBuilder {
        let mut builder = TileCache::builder(index).store(store).fetcher(fetcher);
        for version in VersionTag::ALL {
            builder = builder.url_template(version, template(version));
        }
        builder
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            resident_count: 5,
            hit_count: 80,
            miss_count: 20,
        };
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_store_hit_unpacked_and_packed() {
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat(100)).unwrap();
        store
            .write("v2.3/N47E013.hgt.zip", &pack("N47E013.hgt", &flat(200)).unwrap())
            .unwrap();

        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .build()
            .unwrap();

        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(100.0));
        assert_eq!(cache.get_elevation(47.5, 13.5, false, None).unwrap(), Some(200.0));
        assert!(!cache.has_fetcher());
    }

    #[test]
    fn test_unpacked_copy_preferred() {
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat(100)).unwrap();
        store
            .write("v2.3/N46E013.hgt.zip", &pack("N46E013.hgt", &flat(999)).unwrap())
            .unwrap();

        let cache = TileCache::builder(TileIndex::new()).store(store).build().unwrap();
        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(100.0));
    }

    #[test]
    fn test_absent_everywhere_is_none() {
        let cache = TileCache::builder(TileIndex::new())
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();

        for version in VersionTag::ALL {
            assert_eq!(cache.get_elevation(0.5, -150.5, false, Some(version)).unwrap(), None);
        }
        assert_eq!(cache.stats().resident_count, 0);
    }

    #[test]
    fn test_fetch_and_write_back_unpacked() {
        let name = TileName::new(46, 13);
        let index = TileIndex::from_records([(name, VersionTag::V2Srtm3, b'E')]);
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(
            MockFetcher::default().serve(&url(VersionTag::V2Srtm3, "N46E013"), pack("N46E013.hgt", &flat(321)).unwrap()),
        );

        let cache = builder_with(index, store.clone(), fetcher.clone()).build().unwrap();
        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(321.0));

        assert_eq!(store.keys(), vec!["v2.3/N46E013.hgt".to_string()]);
        assert_eq!(&store.read("v2.3/N46E013.hgt").unwrap()[..], &flat(321)[..]);
        assert_eq!(fetcher.requests().len(), 1);

        // A fresh cache over the same store does not fetch again
        let cache = builder_with(
            TileIndex::from_records([(name, VersionTag::V2Srtm3, b'E')]),
            store,
            fetcher.clone(),
        )
        .build()
        .unwrap();
        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(321.0));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_fetch_and_write_back_packed() {
        let name = TileName::new(46, 13);
        let index = TileIndex::from_records([(name, VersionTag::V2Srtm3, b'E')]);
        let store = Arc::new(MemoryStore::new());
        let archive = pack("N46E013.hgt", &flat(321)).unwrap();
        let fetcher = Arc::new(
            MockFetcher::default().serve(&url(VersionTag::V2Srtm3, "N46E013"), archive.clone()),
        );

        let cache = builder_with(index, store.clone(), fetcher)
            .leave_zipped(true)
            .build()
            .unwrap();
        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(321.0));

        assert_eq!(store.keys(), vec!["v2.3/N46E013.hgt.zip".to_string()]);
        assert_eq!(&store.read("v2.3/N46E013.hgt.zip").unwrap()[..], &archive[..]);
    }

    #[test]
    fn test_default_url_template_used() {
        let name = TileName::new(46, 13);
        let index = TileIndex::from_records([(name, VersionTag::V2Srtm3, b'E')]);
        let default_url = "https://terrain.ardupilot.org/SRTM3/Eurasia/N46E013.hgt.zip";
        let fetcher = Arc::new(
            MockFetcher::default().serve(default_url, pack("N46E013.hgt", &flat(7)).unwrap()),
        );

        let cache = TileCache::builder(index)
            .store(Arc::new(MemoryStore::new()))
            .fetcher(fetcher.clone())
            .build()
            .unwrap();

        assert_eq!(cache.url(name, VersionTag::V2Srtm3).unwrap(), default_url);
        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(7.0));
        assert_eq!(fetcher.requests(), vec![default_url.to_string()]);
    }

    #[test]
    fn test_fallback_chain() {
        // Only v2.3 has the tile; asking for v3.1 walks v3.1 -> v3.3 -> v2.3
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat(55)).unwrap();

        let cache = TileCache::builder(TileIndex::new())
            .store(store.clone())
            .build()
            .unwrap();
        assert_eq!(
            cache.get_elevation(46.5, 13.5, false, Some(VersionTag::V3Srtm1)).unwrap(),
            Some(55.0)
        );
        assert_eq!(
            cache.get_tile(46.5, 13.5, Some(VersionTag::V3Srtm1)).unwrap().unwrap().version(),
            VersionTag::V2Srtm3
        );

        // v1.1 -> v1.3 never reaches v2.3
        assert_eq!(
            cache.get_elevation(46.5, 13.5, false, Some(VersionTag::V1Srtm1)).unwrap(),
            None
        );

        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .fallback(false)
            .build()
            .unwrap();
        assert_eq!(
            cache.get_elevation(46.5, 13.5, false, Some(VersionTag::V3Srtm1)).unwrap(),
            None
        );
    }

    #[test]
    fn test_custom_fallback_chain() {
        let store = Arc::new(MemoryStore::new());
        store.write("v1.3/N46E013.hgt", &flat(13)).unwrap();

        let chain = FallbackChain::new([(VersionTag::V2Srtm3, VersionTag::V1Srtm3)]).unwrap();
        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .fallback_chain(chain)
            .build()
            .unwrap();

        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), Some(13.0));
    }

    #[test]
    fn test_transport_failure_falls_back() {
        let name = TileName::new(46, 13);
        let index = TileIndex::from_records([
            (name, VersionTag::V3Srtm1, b'+'),
            (name, VersionTag::V3Srtm3, b'+'),
        ]);
        let fetcher = Arc::new(
            MockFetcher::default()
                .fail(&url(VersionTag::V3Srtm1, "N46E013"))
                .serve(&url(VersionTag::V3Srtm3, "N46E013"), pack("N46E013.hgt", &flat(42)).unwrap()),
        );

        let cache = builder_with(index, Arc::new(MemoryStore::new()), fetcher.clone())
            .build()
            .unwrap();
        assert_eq!(
            cache.get_elevation(46.5, 13.5, false, Some(VersionTag::V3Srtm1)).unwrap(),
            Some(42.0)
        );
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn test_transport_failure_not_silenced() {
        let name = TileName::new(46, 13);
        let index = TileIndex::from_records([(name, VersionTag::V3Srtm1, b'+')]);
        let fetcher = Arc::new(MockFetcher::default().fail(&url(VersionTag::V3Srtm1, "N46E013")));

        let cache = builder_with(index, Arc::new(MemoryStore::new()), fetcher)
            .build()
            .unwrap();

        // v3.3 and v2.3 are absent, so the failure surfaces
        let err = cache
            .get_elevation(46.5, 13.5, false, Some(VersionTag::V3Srtm1))
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(cache.stats().resident_count, 0);
    }

    #[test]
    fn test_corrupt_tile_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.write("v3.1/N46E013.hgt", &[0u8; 1000]).unwrap();
        store.write("v3.3/N46E013.hgt", &flat(1)).unwrap();

        let cache = TileCache::builder(TileIndex::new()).store(store).build().unwrap();
        assert!(matches!(
            cache.get_elevation(46.5, 13.5, false, Some(VersionTag::V3Srtm1)),
            Err(ElevationError::InvalidTileSize { .. })
        ));
    }

    #[test]
    fn test_ambiguous_archive_is_fatal() {
        let mut buffer = Vec::new();
        {
            use std::io::Write;
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            for entry in ["N46E013.hgt", "N46E014.hgt"] {
                zip.start_file(entry, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(&flat(1)).unwrap();
            }
            zip.finish().unwrap();
        }
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt.zip", &buffer).unwrap();

        let cache = TileCache::builder(TileIndex::new()).store(store).build().unwrap();
        assert!(matches!(
            cache.get_elevation(46.5, 13.5, false, None),
            Err(ElevationError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_determinism_and_resident_count() {
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat(100)).unwrap();
        store.write("v2.3/N47E013.hgt", &flat(200)).unwrap();

        let cache = TileCache::builder(TileIndex::new()).store(store).build().unwrap();

        let first = cache.get_elevation(46.5, 13.5, false, None).unwrap();
        for _ in 0..5 {
            assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), first);
            assert_eq!(cache.get_elevation(47.2, 13.1, false, None).unwrap(), Some(200.0));
        }

        let stats = cache.stats();
        assert_eq!(stats.resident_count, 2);
        assert_eq!(stats.miss_count, 2);
        assert_eq!(stats.hit_count, 9);
        assert_eq!(
            cache.resident_keys(),
            vec![
                (TileName::new(46, 13), VersionTag::V2Srtm3),
                (TileName::new(47, 13), VersionTag::V2Srtm3),
            ]
        );

        cache.clear_cache();
        assert_eq!(cache.get_elevation(46.5, 13.5, false, None).unwrap(), first);
        assert_eq!(cache.stats().miss_count, 3);
    }

    #[test]
    fn test_batch_mode_keeps_latest_tile() {
        let store = Arc::new(MemoryStore::new());
        for lat in 40..45 {
            store
                .write(&format!("v2.3/N{:02}E013.hgt", lat), &flat(lat as i16))
                .unwrap();
        }

        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .batch_mode(true)
            .cache_size(100)
            .build()
            .unwrap();
        assert!(cache.is_batch_mode());

        for lat in 40..45 {
            let value = cache.get_elevation(lat as f64 + 0.5, 13.5, false, None).unwrap();
            assert_eq!(value, Some(lat as f64));
            assert_eq!(cache.stats().resident_count, 1);
            assert_eq!(
                cache.resident_keys(),
                vec![(TileName::new(lat, 13), VersionTag::V2Srtm3)]
            );
        }
    }

    #[test]
    fn test_bounded_cache_size() {
        let store = Arc::new(MemoryStore::new());
        for lon in 0..20 {
            store
                .write(&format!("v2.3/N46E{:03}.hgt", lon), &flat(1))
                .unwrap();
        }

        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .cache_size(5)
            .build()
            .unwrap();
        for lon in 0..20 {
            cache.get_elevation(46.5, lon as f64 + 0.5, false, None).unwrap();
        }
        assert!(cache.stats().resident_count <= 5);
    }

    #[test]
    fn test_approximate_crosses_tiles() {
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat(100)).unwrap();
        store.write("v2.3/N46E014.hgt", &flat(300)).unwrap();

        let cache = TileCache::builder(TileIndex::new()).store(store).build().unwrap();

        let nearest = cache.get_elevation(46.5, 13.99, false, None).unwrap().unwrap();
        let approximate = cache.get_elevation(46.5, 13.99, true, None).unwrap().unwrap();
        assert_eq!(nearest, 100.0);
        assert!(approximate > 100.0 && approximate < 300.0);
        assert_eq!(cache.stats().resident_count, 2);
    }

    #[test]
    fn test_idw_radius_validated_first() {
        let cache = TileCache::builder(TileIndex::new())
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        assert!(matches!(
            cache.get_elevation_idw(0.5, -150.5, 3, None),
            Err(ElevationError::InvalidRadius(3))
        ));
        assert_eq!(cache.get_elevation_idw(0.5, -150.5, 2, None).unwrap(), None);
    }

    #[test]
    fn test_idw_exact_cell() {
        let store = Arc::new(MemoryStore::new());
        let samples: Vec<i16> = (0..25).collect();
        store.write("v2.3/N46E013.hgt", &grid_bytes(&samples)).unwrap();

        let cache = TileCache::builder(TileIndex::new()).store(store).build().unwrap();
        let nearest = cache.get_elevation(46.75, 13.25, false, None).unwrap();
        assert_eq!(nearest, Some(6.0));
        assert_eq!(cache.get_elevation_idw(46.75, 13.25, 1, None).unwrap(), nearest);
        assert_eq!(cache.get_elevation_idw(46.75, 13.25, 2, None).unwrap(), nearest);
    }

    #[test]
    fn test_batch_helper_preserves_order() {
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat(100)).unwrap();
        store.write("v2.3/N47E013.hgt", &flat(200)).unwrap();

        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .batch_mode(true)
            .build()
            .unwrap();

        let coords = [(46.5, 13.5), (47.5, 13.5), (46.1, 13.1), (0.5, -150.5), (47.1, 13.9)];
        let results = cache.get_elevations_batch(&coords, Interpolation::Nearest);
        let values: Vec<Option<f64>> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            values,
            vec![Some(100.0), Some(200.0), Some(100.0), None, Some(200.0)]
        );
        // Grouping touched each tile once
        assert_eq!(cache.stats().miss_count, 3);
    }

    #[test]
    fn test_concurrent_queries_fetch_once() {
        let name = TileName::new(46, 13);
        let index = TileIndex::from_records([(name, VersionTag::V2Srtm3, b'E')]);
        let mut fetcher = MockFetcher::default()
            .serve(&url(VersionTag::V2Srtm3, "N46E013"), pack("N46E013.hgt", &flat(77)).unwrap());
        fetcher.delay = Some(Duration::from_millis(50));
        let fetcher = Arc::new(fetcher);

        let cache = Arc::new(
            builder_with(index, Arc::new(MemoryStore::new()), fetcher.clone())
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache
                        .get_elevation(46.1 + i as f64 * 0.1, 13.5, false, None)
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(77.0));
        }
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("Off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_default_data_dir() {
        assert!(default_data_dir().ends_with("hgtcache"));
    }
}
