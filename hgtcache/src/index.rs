//! Static tile index: which tiles exist in which version, and where.
//!
//! The index is loaded once (usually from a JSON document produced by a
//! directory-listing crawl) and shared read-only between caches through an
//! `Arc<TileIndex>`.
//!
//! # Document Format
//!
//! ```json
//! {
//!   "format": 1,
//!   "versions": ["v1.1", "v1.3", "v2.1", "v2.3", "v3.1", "v3.3", "v3.3s"],
//!   "tiles": { "N46E013": "-E-E+++" }
//! }
//! ```
//!
//! Each record holds one code byte per entry of `versions`: `-` marks the
//! tile absent from that version, anything else is a region code (see
//! [`region_directory`](crate::version::region_directory)).

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ElevationError, Result};
use crate::filename::TileName;
use crate::version::{region_directory, VersionTag};

/// Supported document format revision.
pub const INDEX_FORMAT: u32 = 1;

/// Code byte marking a tile absent from a version.
pub const ABSENT: u8 = b'-';

/// Per-tile availability record, one region code per version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileIndexEntry {
    codes: [u8; VersionTag::COUNT],
}

impl TileIndexEntry {
    /// An entry absent from every version.
    pub fn empty() -> Self {
        Self {
            codes: [ABSENT; VersionTag::COUNT],
        }
    }

    /// Region code for `version`, or `None` if absent there.
    pub fn code(&self, version: VersionTag) -> Option<u8> {
        match self.codes[version.ordinal()] {
            ABSENT => None,
            code => Some(code),
        }
    }

    /// Whether the tile exists in `version`.
    pub fn contains(&self, version: VersionTag) -> bool {
        self.code(version).is_some()
    }

    /// Set the region code of `version`; `ABSENT` removes it.
    pub fn set(&mut self, version: VersionTag, code: u8) {
        self.codes[version.ordinal()] = code;
    }
}

impl Default for TileIndexEntry {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Serialize, Deserialize)]
struct IndexDocument {
    format: u32,
    versions: Vec<String>,
    tiles: BTreeMap<String, String>,
}

/// Immutable table from tile name to per-version availability.
#[derive(Debug, Clone, Default)]
pub struct TileIndex {
    entries: HashMap<TileName, TileIndexEntry>,
}

impl TileIndex {
    /// An index with no tiles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(name, version, region code)` triples.
    ///
    /// ```
    /// use hgtcache::{TileIndex, TileName, VersionTag};
    ///
    /// let index = TileIndex::from_records([
    ///     (TileName::new(46, 13), VersionTag::V2Srtm3, b'E'),
    ///     (TileName::new(46, 13), VersionTag::V3Srtm3, b'+'),
    /// ]);
    /// assert!(index.contains(TileName::new(46, 13), VersionTag::V2Srtm3));
    /// assert!(!index.contains(TileName::new(46, 13), VersionTag::V2Srtm1));
    /// ```
    pub fn from_records(records: impl IntoIterator<Item = (TileName, VersionTag, u8)>) -> Self {
        let mut entries: HashMap<TileName, TileIndexEntry> = HashMap::new();
        for (name, version, code) in records {
            entries.entry(name).or_default().set(version, code);
        }
        Self { entries }
    }

    /// Load an index document from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse an index document.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidIndex`] on an unsupported format,
    /// unknown version column, bad tile name or record of the wrong width.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let document: IndexDocument = serde_json::from_reader(reader)?;

        if document.format != INDEX_FORMAT {
            return Err(ElevationError::InvalidIndex(format!(
                "unsupported format {}",
                document.format
            )));
        }

        let columns = document
            .versions
            .iter()
            .map(|v| {
                v.parse::<VersionTag>()
                    .map_err(|_| ElevationError::InvalidIndex(format!("unknown version {}", v)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut entries = HashMap::with_capacity(document.tiles.len());
        for (name, record) in &document.tiles {
            let tile = TileName::parse(name)
                .ok_or_else(|| ElevationError::InvalidIndex(format!("bad tile name {}", name)))?;

            if record.len() != columns.len() {
                return Err(ElevationError::InvalidIndex(format!(
                    "record for {} has {} codes, expected {}",
                    name,
                    record.len(),
                    columns.len()
                )));
            }

            let mut entry = TileIndexEntry::empty();
            for (version, code) in columns.iter().zip(record.bytes()) {
                entry.set(*version, code);
            }
            entries.insert(tile, entry);
        }

        tracing::debug!(tiles = entries.len(), "loaded tile index");

        Ok(Self { entries })
    }

    /// Write the index as a JSON document covering every version.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let tiles = self
            .entries
            .iter()
            .map(|(name, entry)| {
                let record = VersionTag::ALL
                    .iter()
                    .map(|v| entry.code(*v).unwrap_or(ABSENT) as char)
                    .collect();
                (name.to_string(), record)
            })
            .collect();

        let document = IndexDocument {
            format: INDEX_FORMAT,
            versions: VersionTag::ALL.iter().map(|v| v.to_string()).collect(),
            tiles,
        };
        serde_json::to_writer(BufWriter::new(writer), &document)?;
        Ok(())
    }

    /// Index entry for a tile, if the tile is known at all.
    pub fn entry(&self, name: TileName) -> Option<&TileIndexEntry> {
        self.entries.get(&name)
    }

    /// Whether `name` exists in `version`.
    pub fn contains(&self, name: TileName, version: VersionTag) -> bool {
        self.entry(name).is_some_and(|e| e.contains(version))
    }

    /// Download URL for `name` in `version` using the default templates.
    ///
    /// `None` means the tile does not exist in that version.
    pub fn url(&self, name: TileName, version: VersionTag) -> Option<String> {
        self.url_with_template(name, version, version.default_url_template())
    }

    /// Download URL for `name` in `version` expanded from `template`.
    pub fn url_with_template(
        &self,
        name: TileName,
        version: VersionTag,
        template: &str,
    ) -> Option<String> {
        let code = self.entry(name)?.code(version)?;
        Some(
            template
                .replace("{name}", &name.to_string())
                .replace("{region}", region_directory(code)),
        )
    }

    /// Number of tiles known to the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index knows no tiles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of all tiles present in `version`, sorted.
    pub fn tiles_in(&self, version: VersionTag) -> Vec<TileName> {
        let mut names: Vec<TileName> = self
            .entries
            .iter()
            .filter(|(_, e)| e.contains(version))
            .map(|(name, _)| *name)
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "format": 1,
        "versions": ["v1.1", "v1.3", "v2.1", "v2.3", "v3.1", "v3.3", "v3.3s"],
        "tiles": {
            "N46E013": "-E-E+++",
            "N36W117": "1N3N+++",
            "S70E000": "----++-"
        }
    }"#;

    #[test]
    fn test_load_document() {
        let index = TileIndex::from_reader(DOCUMENT.as_bytes()).unwrap();
        assert_eq!(index.len(), 3);

        let alps = TileName::new(46, 13);
        assert!(!index.contains(alps, VersionTag::V1Srtm1));
        assert!(index.contains(alps, VersionTag::V1Srtm3));
        assert!(index.contains(alps, VersionTag::V3Srtm3Sampled));

        let antarctica = TileName::new(-70, 0);
        assert!(!index.contains(antarctica, VersionTag::V2Srtm3));
        assert!(index.contains(antarctica, VersionTag::V3Srtm1));
        assert!(!index.contains(antarctica, VersionTag::V3Srtm3Sampled));
    }

    #[test]
    fn test_unknown_tile_is_absent() {
        let index = TileIndex::from_reader(DOCUMENT.as_bytes()).unwrap();
        let ocean = TileName::new(0, -150);
        assert!(index.entry(ocean).is_none());
        assert_eq!(index.url(ocean, VersionTag::V2Srtm3), None);
    }

    #[test]
    fn test_subset_of_columns() {
        let document = r#"{"format": 1, "versions": ["v3.1"], "tiles": {"N00E010": "+"}}"#;
        let index = TileIndex::from_reader(document.as_bytes()).unwrap();
        let name = TileName::new(0, 10);
        assert!(index.contains(name, VersionTag::V3Srtm1));
        assert!(!index.contains(name, VersionTag::V3Srtm3));
    }

    #[test]
    fn test_invalid_documents() {
        let wrong_width = r#"{"format": 1, "versions": ["v3.1", "v3.3"], "tiles": {"N00E010": "+"}}"#;
        assert!(matches!(
            TileIndex::from_reader(wrong_width.as_bytes()),
            Err(ElevationError::InvalidIndex(_))
        ));

        let bad_version = r#"{"format": 1, "versions": ["v9.9"], "tiles": {}}"#;
        assert!(TileIndex::from_reader(bad_version.as_bytes()).is_err());

        let bad_name = r#"{"format": 1, "versions": ["v3.1"], "tiles": {"X00E010": "+"}}"#;
        assert!(TileIndex::from_reader(bad_name.as_bytes()).is_err());

        let bad_format = r#"{"format": 2, "versions": [], "tiles": {}}"#;
        assert!(TileIndex::from_reader(bad_format.as_bytes()).is_err());

        assert!(matches!(
            TileIndex::from_reader("not json".as_bytes()),
            Err(ElevationError::Json(_))
        ));
    }

    #[test]
    fn test_urls() {
        let index = TileIndex::from_reader(DOCUMENT.as_bytes()).unwrap();

        assert_eq!(
            index.url(TileName::new(46, 13), VersionTag::V2Srtm3).unwrap(),
            "https://terrain.ardupilot.org/SRTM3/Eurasia/N46E013.hgt.zip"
        );
        assert_eq!(
            index.url(TileName::new(36, -117), VersionTag::V2Srtm1).unwrap(),
            "https://dds.cr.usgs.gov/srtm/version2_1/SRTM1/Region_03/N36W117.hgt.zip"
        );
        assert_eq!(
            index.url(TileName::new(-70, 0), VersionTag::V3Srtm1).unwrap(),
            "https://e4ftl01.cr.usgs.gov/MEASURES/SRTMGL1.003/2000.02.11/S70E000.SRTMGL1.hgt.zip"
        );
        assert_eq!(index.url(TileName::new(46, 13), VersionTag::V2Srtm1), None);
    }

    #[test]
    fn test_custom_template() {
        let index = TileIndex::from_records([(TileName::new(35, 138), VersionTag::V2Srtm3, b'E')]);
        let url = index
            .url_with_template(
                TileName::new(35, 138),
                VersionTag::V2Srtm3,
                "https://mirror.example.com/{region}/{name}.hgt.zip",
            )
            .unwrap();
        assert_eq!(url, "https://mirror.example.com/Eurasia/N35E138.hgt.zip");
    }

    #[test]
    fn test_write_and_reload() {
        let index = TileIndex::from_reader(DOCUMENT.as_bytes()).unwrap();
        let mut buffer = Vec::new();
        index.to_writer(&mut buffer).unwrap();

        let reloaded = TileIndex::from_reader(buffer.as_slice()).unwrap();
        assert_eq!(reloaded.len(), index.len());
        for name in [TileName::new(46, 13), TileName::new(36, -117), TileName::new(-70, 0)] {
            assert_eq!(reloaded.entry(name), index.entry(name));
        }
    }

    #[test]
    fn test_tiles_in() {
        let index = TileIndex::from_reader(DOCUMENT.as_bytes()).unwrap();
        assert_eq!(
            index.tiles_in(VersionTag::V2Srtm3),
            vec![TileName::new(36, -117), TileName::new(46, 13)]
        );
        assert_eq!(index.tiles_in(VersionTag::V3Srtm1).len(), 3);
    }
}
