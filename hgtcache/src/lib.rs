//! # hgtcache - Versioned SRTM Elevation Cache
//!
//! Library for querying elevation from SRTM (Shuttle Radar Topography
//! Mission) `.hgt` tiles across several data-source generations, with
//! fallback between versions, on-demand retrieval and interpolation.
//!
//! ## Features
//!
//! - **Versioned**: tiles are cached per `(name, version)`, with a
//!   configurable fallback chain (v3.1 → v3.3 → v2.3 by default)
//! - **Fast**: stored tiles are memory-mapped, decoded tiles stay resident
//! - **Batch Mode**: keep a single resident tile for sequential workloads
//! - **Interpolation**: nearest sample, 4-neighbour approximation across
//!   tile borders, or inverse distance weighting
//! - **Auto-Download**: fetch missing tiles over HTTP with NASA Earthdata
//!   credentials (requires the `download` feature)
//!
//! ## Quick Start
//!
//! ```ignore
//! use hgtcache::{TileCache, TileIndex, VersionTag};
//!
//! let cache = TileCache::builder(TileIndex::from_path("tiles.json")?)
//!     .data_dir("/data/srtm")
//!     .build()?;
//!
//! // Nearest sample in v2.3
//! let elevation = cache.get_elevation(46.5, 13.5, false, None)?;
//!
//! // Blended over the four neighbours, v3.1 with fallback
//! let smooth = cache.get_elevation(46.5, 13.5, true, Some(VersionTag::V3Srtm1))?;
//! ```
//!
//! ## SRTM Data Format
//!
//! A tile is a square grid of 16-bit big-endian signed integers, row 0 at
//! the north edge. The grid side follows from the file size:
//!
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m) resolution
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m) resolution
//!
//! Samples outside -1000..=10000 m (including the void value -32768) are
//! treated as no data.

pub mod archive;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod filename;
pub mod index;
pub mod interpolate;
pub mod resident;
pub mod storage;
pub mod tile;
pub mod version;

// Re-export main types at crate root for convenience
pub use cache::{default_data_dir, CacheStats, TileCache, TileCacheBuilder};
pub use error::{ElevationError, Result};
pub use fetch::Fetcher;
pub use filename::TileName;
pub use index::{TileIndex, TileIndexEntry};
pub use interpolate::{ElevationQuery, Interpolation, NeighborLookup};
pub use resident::{ResidentSet, RetainAll, SingleSlot};
pub use storage::{DirectoryStore, MemoryStore, TileSource};
pub use tile::{DecodedTile, TileBytes, MAX_ELEVATION, MIN_ELEVATION};
pub use version::{FallbackChain, VersionTag};

#[cfg(feature = "download")]
pub use fetch::{DownloadConfig, HttpFetcher};
