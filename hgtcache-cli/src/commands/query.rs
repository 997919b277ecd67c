use anyhow::{Context, Result};
use hgtcache::{ElevationError, ElevationQuery, Interpolation, TileCache, VersionTag};
use serde::Serialize;

use super::CacheOptions;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    /// Version that supplied the tile, after fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    method: &'static str,
}

pub fn run(
    options: &CacheOptions,
    lat: f64,
    lon: f64,
    mode: Interpolation,
    version: Option<VersionTag>,
    fallback: bool,
    json: bool,
) -> Result<()> {
    let cache = options
        .builder(version)?
        .fallback(fallback)
        .build()
        .context("Failed to create tile cache")?;

    let (elevation, source) =
        elevation_and_source(&cache, lat, lon, mode).context("Failed to get elevation")?;

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
            version: source.map(|v| v.to_string()),
            method: method_name(mode),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match elevation {
            None => println!("void"),
            Some(elev) if mode == Interpolation::Nearest => println!("{}", elev),
            Some(elev) => println!("{:.2}", elev),
        }
    }

    Ok(())
}

/// Elevation at a point and the version of the tile that answered it.
fn elevation_and_source(
    cache: &TileCache,
    lat: f64,
    lon: f64,
    mode: Interpolation,
) -> hgtcache::Result<(Option<f64>, Option<VersionTag>)> {
    if let Interpolation::Idw { radius } = mode {
        if !(1..=2).contains(&radius) {
            return Err(ElevationError::InvalidRadius(radius));
        }
    }

    let Some(tile) = cache.get_tile(lat, lon, None)? else {
        return Ok((None, None));
    };
    let elevation = ElevationQuery::new(&tile, cache).evaluate(lat, lon, mode)?;
    Ok((elevation, Some(tile.version())))
}

fn method_name(mode: Interpolation) -> &'static str {
    match mode {
        Interpolation::Nearest => "nearest",
        Interpolation::Approximate => "approximate",
        Interpolation::Idw { .. } => "idw",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgtcache::{MemoryStore, TileIndex, TileSource};
    use std::sync::Arc;

    fn flat_tile(value: i16) -> Vec<u8> {
        std::iter::repeat(value.to_be_bytes())
            .take(1201 * 1201)
            .flatten()
            .collect()
    }

    #[test]
    fn test_source_is_fallback_version() {
        let store = Arc::new(MemoryStore::new());
        store.write("v2.3/N46E013.hgt", &flat_tile(812)).unwrap();
        let cache = TileCache::builder(TileIndex::new())
            .store(store)
            .default_version(VersionTag::V3Srtm1)
            .build()
            .unwrap();

        let (elevation, source) =
            elevation_and_source(&cache, 46.5, 13.5, Interpolation::Nearest).unwrap();
        assert_eq!(elevation, Some(812.0));
        assert_eq!(source, Some(VersionTag::V2Srtm3));
    }

    #[test]
    fn test_missing_tile_has_no_source() {
        let store = Arc::new(MemoryStore::new());
        let cache = TileCache::builder(TileIndex::new())
            .store(store.clone())
            .build()
            .unwrap();

        let (elevation, source) =
            elevation_and_source(&cache, 46.5, 13.5, Interpolation::Approximate).unwrap();
        assert_eq!((elevation, source), (None, None));
        assert_eq!(cache.stats().resident_count, 0);
    }

    #[test]
    fn test_invalid_radius() {
        let cache = TileCache::builder(TileIndex::new())
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        assert!(matches!(
            elevation_and_source(&cache, 46.5, 13.5, Interpolation::Idw { radius: 3 }),
            Err(ElevationError::InvalidRadius(3))
        ));
    }
}
