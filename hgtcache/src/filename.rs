//! Tile naming.
//!
//! This module provides [`TileName`] and functions for converting between
//! coordinates and SRTM `.hgt` filenames.
//!
//! # Filename Format
//!
//! SRTM files follow the naming convention: `{N|S}{lat}{E|W}{lon}.hgt`
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N35, S12)
//! - Longitude: 3 digits with E/W prefix (e.g., E138, W077)
//!
//! The filename represents the **southwest corner** of the 1° × 1° tile.

use std::fmt;
use std::str::FromStr;

use crate::error::ElevationError;

/// Name of a 1° × 1° tile, identified by its southwest corner.
///
/// ```
/// use hgtcache::TileName;
///
/// let name = TileName::from_coords(46.3, 13.7);
/// assert_eq!(name.to_string(), "N46E013");
/// assert_eq!(name.file_name(), "N46E013.hgt");
/// assert_eq!("S13W078.hgt".parse::<TileName>().unwrap(), TileName::new(-13, -78));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileName {
    lat: i32,
    lon: i32,
}

impl TileName {
    /// Create a name from the integer southwest corner.
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Name of the tile containing `(lat, lon)`.
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat.floor() as i32,
            lon: lon.floor() as i32,
        }
    }

    /// Parse a tile name, with or without path and `.hgt` extension.
    pub fn parse(name: &str) -> Option<Self> {
        filename_to_lat_lon(name).map(|(lat, lon)| Self { lat, lon })
    }

    /// Latitude of the southwest corner.
    pub fn lat(&self) -> i32 {
        self.lat
    }

    /// Longitude of the southwest corner.
    pub fn lon(&self) -> i32 {
        self.lon
    }

    /// Unpacked file name, e.g. `N46E013.hgt`.
    pub fn file_name(&self) -> String {
        format!("{}.hgt", self)
    }

    /// Packed archive name, e.g. `N46E013.hgt.zip`.
    pub fn archive_name(&self) -> String {
        format!("{}.hgt.zip", self)
    }
}

impl fmt::Display for TileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat_prefix = if self.lat >= 0 { 'N' } else { 'S' };
        let lon_prefix = if self.lon >= 0 { 'E' } else { 'W' };
        write!(
            f,
            "{}{:02}{}{:03}",
            lat_prefix,
            self.lat.unsigned_abs(),
            lon_prefix,
            self.lon.unsigned_abs()
        )
    }
}

impl FromStr for TileName {
    type Err = ElevationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TileName::parse(s).ok_or_else(|| ElevationError::InvalidTileName(s.to_string()))
    }
}

/// Convert latitude and longitude to an SRTM `.hgt` filename.
///
/// # Examples
///
/// ```
/// use hgtcache::filename::lat_lon_to_filename;
///
/// assert_eq!(lat_lon_to_filename(35.5, 138.7), "N35E138.hgt");
/// assert_eq!(lat_lon_to_filename(-12.3, -77.1), "S13W078.hgt");
/// assert_eq!(lat_lon_to_filename(0.5, -0.5), "N00W001.hgt");
/// ```
pub fn lat_lon_to_filename(lat: f64, lon: f64) -> String {
    TileName::from_coords(lat, lon).file_name()
}

/// Parse an SRTM filename to extract the base coordinates.
///
/// Returns the (latitude, longitude) of the southwest corner, or `None` if
/// parsing fails.
///
/// # Examples
///
/// ```
/// use hgtcache::filename::filename_to_lat_lon;
///
/// assert_eq!(filename_to_lat_lon("N35E138.hgt"), Some((35, 138)));
/// assert_eq!(filename_to_lat_lon("S12W077.hgt"), Some((-12, -77)));
/// assert_eq!(filename_to_lat_lon("/path/to/N00E000.hgt"), Some((0, 0)));
/// assert_eq!(filename_to_lat_lon("invalid"), None);
/// ```
pub fn filename_to_lat_lon(filename: &str) -> Option<(i32, i32)> {
    // Extract just the filename if a path is given
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let name = name
        .strip_suffix(".hgt.zip")
        .or_else(|| name.strip_suffix(".hgt"))
        .unwrap_or(name);

    // Must be exactly 7 ASCII characters: N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }

    let bytes = name.as_bytes();

    let lat_sign = match bytes[0] {
        b'N' | b'n' => 1,
        b'S' | b's' => -1,
        _ => return None,
    };
    let lon_sign = match bytes[3] {
        b'E' | b'e' => 1,
        b'W' | b'w' => -1,
        _ => return None,
    };

    if !name[1..3].bytes().all(|b| b.is_ascii_digit())
        || !name[4..7].bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let lat: i32 = name[1..3].parse().ok()?;
    let lon: i32 = name[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}
