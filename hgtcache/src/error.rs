//! Error types for the hgtcache library.

use thiserror::Error;

/// Errors that can occur when resolving, decoding or querying tiles.
///
/// Absence of data is not an error: a tile missing from the index or a
/// no-data sample comes back as `Ok(None)` from the query methods.
#[derive(Error, Debug)]
pub enum ElevationError {
    /// IO error from the tile store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tile byte length is not `2 * side * side` for an integer side.
    #[error("Invalid tile size: {size} bytes for file {file_name}")]
    InvalidTileSize { file_name: String, size: usize },

    /// Latitude outside the domain accepted by a tile.
    #[error("Invalid latitude {lat} for file {file_name}")]
    InvalidLatitude { lat: f64, file_name: String },

    /// Longitude outside the domain accepted by a tile.
    #[error("Invalid longitude {lon} for file {file_name}")]
    InvalidLongitude { lon: f64, file_name: String },

    /// IDW radius other than 1 or 2.
    #[error("Radius {0} invalid, expected 1 or 2")]
    InvalidRadius(u8),

    /// A computed sample index fell outside the tile buffer.
    #[error("Sample index {index} out of range for {file_name} ({samples} samples)")]
    SampleIndexOutOfRange {
        file_name: String,
        index: i64,
        samples: usize,
    },

    /// String is not a `N00E000` style tile name.
    #[error("Invalid tile name: {0}")]
    InvalidTileName(String),

    /// String is not a known version tag.
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    /// A fallback table that loops back on itself.
    #[error("Fallback chain starting at {0} never terminates")]
    CyclicFallback(String),

    /// Packed archive without exactly one usable entry.
    #[error("Invalid archive {file_name}: {reason}")]
    InvalidArchive { file_name: String, reason: String },

    /// ZIP container could not be read.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Tile index document is malformed.
    #[error("Invalid tile index: {0}")]
    InvalidIndex(String),

    /// Tile index JSON could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error.
    #[cfg(feature = "download")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote retrieval failed (status, redirect loop, timeout).
    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Failure of a load another caller ran for the same tile.
    #[error("{reason}")]
    Shared { reason: String, transport: bool },
}

impl ElevationError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Transport failures are retrievable; invalid input and corrupt data
    /// are not.
    pub fn is_transport(&self) -> bool {
        match self {
            ElevationError::DownloadFailed { .. } => true,
            #[cfg(feature = "download")]
            ElevationError::Http(_) => true,
            ElevationError::Shared { transport, .. } => *transport,
            _ => false,
        }
    }
}

impl ElevationError {
    /// Copy of this error for callers that waited on the failed load.
    pub(crate) fn shared(&self) -> Self {
        ElevationError::Shared {
            reason: self.to_string(),
            transport: self.is_transport(),
        }
    }
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
