//! Tile decoding and grid geometry.
//!
//! This module provides [`DecodedTile`], a square grid of big-endian `i16`
//! samples covering one 1° × 1° cell, and the coordinate/cell conversions
//! used by every interpolation mode.
//!
//! Rows are inverted: row 0 is the north edge (top of file), and the file
//! stores data from north to south, left to right.

use std::fmt;
use std::ops::Deref;

use memmap2::Mmap;

use crate::error::{ElevationError, Result};
use crate::filename::TileName;
use crate::version::VersionTag;

/// Lowest sample value treated as real terrain.
pub const MIN_ELEVATION: i16 = -1000;

/// Highest sample value treated as real terrain.
pub const MAX_ELEVATION: i16 = 10000;

/// Raw tile bytes, either owned or memory-mapped from the store.
pub enum TileBytes {
    /// Bytes held in memory (unpacked archives, fetched data).
    Owned(Vec<u8>),
    /// Read-only mapping of an unpacked file on disk.
    Mapped(Mmap),
}

impl Deref for TileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            TileBytes::Owned(bytes) => bytes,
            TileBytes::Mapped(mmap) => mmap,
        }
    }
}

impl From<Vec<u8>> for TileBytes {
    fn from(bytes: Vec<u8>) -> Self {
        TileBytes::Owned(bytes)
    }
}

impl From<Mmap> for TileBytes {
    fn from(mmap: Mmap) -> Self {
        TileBytes::Mapped(mmap)
    }
}

impl fmt::Debug for TileBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            TileBytes::Owned(_) => "Owned",
            TileBytes::Mapped(_) => "Mapped",
        };
        write!(f, "TileBytes::{}({} bytes)", kind, self.len())
    }
}

/// A decoded tile ready for fast elevation lookups.
///
/// The grid side is derived from the byte length alone, so any square grid
/// decodes (3601 for 1 arc-second data, 1201 for 3 arc-second data).
///
/// # Example
///
/// ```
/// use hgtcache::{DecodedTile, TileName, VersionTag};
///
/// // 3 × 3 grid, all samples at 100 m
/// let bytes: Vec<u8> = (0..9).flat_map(|_| 100i16.to_be_bytes()).collect();
/// let tile = DecodedTile::from_bytes(TileName::new(46, 13), VersionTag::V2Srtm3, bytes).unwrap();
///
/// assert_eq!(tile.side(), 3);
/// assert_eq!(tile.get_elevation(46.5, 13.5).unwrap(), Some(100.0));
/// ```
#[derive(Debug)]
pub struct DecodedTile {
    name: TileName,
    version: VersionTag,
    side: usize,
    resolution: f64,
    data: TileBytes,
}

impl DecodedTile {
    /// Decode a raw tile buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidTileSize`] unless the buffer holds
    /// `side * side` samples for an integer `side >= 2`.
    pub fn from_bytes(
        name: TileName,
        version: VersionTag,
        data: impl Into<TileBytes>,
    ) -> Result<Self> {
        let data = data.into();
        let size = data.len();

        let side = square_side(size).ok_or_else(|| ElevationError::InvalidTileSize {
            file_name: name.file_name(),
            size,
        })?;

        if side != version.samples() {
            tracing::debug!(
                tile = %name,
                %version,
                side,
                expected = version.samples(),
                "tile side differs from nominal version resolution"
            );
        }

        Ok(Self {
            name,
            version,
            side,
            resolution: 1.0 / (side - 1) as f64,
            data,
        })
    }

    /// Tile name.
    pub fn name(&self) -> TileName {
        self.name
    }

    /// Version this tile was decoded from.
    pub fn version(&self) -> VersionTag {
        self.version
    }

    /// File name used in error messages, e.g. `N47E013.hgt`.
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }

    /// Latitude of the southwest corner.
    pub fn latitude(&self) -> f64 {
        self.name.lat() as f64
    }

    /// Longitude of the southwest corner.
    pub fn longitude(&self) -> f64 {
        self.name.lon() as f64
    }

    /// Samples per row/column.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Degrees between adjacent samples.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Total number of samples.
    pub fn sample_count(&self) -> usize {
        self.side * self.side
    }

    /// Raw big-endian sample buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether the sample buffer is memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self.data, TileBytes::Mapped(_))
    }

    /// Reject coordinates outside the domain this tile accepts.
    ///
    /// Latitude must lie in `[lat0 - res, lat0 + 1)` and longitude in
    /// `[lon0, lon0 + 1 + res)`, which lets callers probe one cell past the
    /// nominal southern and eastern edges.
    pub fn check_domain(&self, lat: f64, lon: f64) -> Result<()> {
        let lat0 = self.latitude();
        let lon0 = self.longitude();

        if !(lat0 - self.resolution <= lat && lat < lat0 + 1.0) {
            return Err(ElevationError::InvalidLatitude {
                lat,
                file_name: self.file_name(),
            });
        }
        if !(lon0 <= lon && lon < lon0 + 1.0 + self.resolution) {
            return Err(ElevationError::InvalidLongitude {
                lon,
                file_name: self.file_name(),
            });
        }
        Ok(())
    }

    /// Grid cell containing a coordinate, as `(row, column)`.
    ///
    /// Not range checked: coordinates outside the tile give cells outside
    /// the grid.
    pub fn row_and_column(&self, lat: f64, lon: f64) -> (i64, i64) {
        let steps = (self.side - 1) as f64;
        let row = ((self.latitude() + 1.0 - lat) * steps).floor() as i64;
        let col = ((lon - self.longitude()) * steps).floor() as i64;
        (row, col)
    }

    /// Coordinate of a grid cell, inverse of [`row_and_column`](Self::row_and_column).
    pub fn lat_and_lon(&self, row: i64, col: i64) -> (f64, f64) {
        (
            self.latitude() + 1.0 - row as f64 * self.resolution,
            self.longitude() + col as f64 * self.resolution,
        )
    }

    /// Whether `(row, col)` addresses a sample of this grid.
    pub fn contains_cell(&self, row: i64, col: i64) -> bool {
        let side = self.side as i64;
        (0..side).contains(&row) && (0..side).contains(&col)
    }

    /// Sample at a grid cell, `None` for no-data values.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::SampleIndexOutOfRange`] if the linear index
    /// falls outside the sample buffer.
    pub fn sample(&self, row: i64, col: i64) -> Result<Option<i16>> {
        let index = row * self.side as i64 + col;
        if row < 0 || col < 0 || index >= self.sample_count() as i64 {
            return Err(ElevationError::SampleIndexOutOfRange {
                file_name: self.file_name(),
                index,
                samples: self.sample_count(),
            });
        }

        let offset = index as usize * 2;
        let value = i16::from_be_bytes([self.data[offset], self.data[offset + 1]]);

        if (MIN_ELEVATION..=MAX_ELEVATION).contains(&value) {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Nearest-cell elevation at a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidLatitude`] or
    /// [`ElevationError::InvalidLongitude`] outside the tile domain.
    pub fn get_elevation(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        self.check_domain(lat, lon)?;
        let (row, col) = self.row_and_column(lat, lon);
        Ok(self.sample(row, col)?.map(f64::from))
    }
}

/// Side of a square grid of big-endian `i16` samples, if `len` describes one.
fn square_side(len: usize) -> Option<usize> {
    if len % 2 != 0 {
        return None;
    }
    let samples = len / 2;
    let side = (samples as f64).sqrt().round() as usize;
    (side >= 2 && side * side == samples).then_some(side)
}
