use anyhow::{anyhow, Context, Result};
use hgtcache::{DecodedTile, TileName, VersionTag};

use super::{format_size, CacheOptions};

pub fn run(
    options: &CacheOptions,
    tile: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    version: Option<VersionTag>,
) -> Result<()> {
    let name = match (tile, lat, lon) {
        (_, Some(lat), Some(lon)) => TileName::from_coords(lat, lon),
        (Some(tile), _, _) => tile
            .parse::<TileName>()
            .with_context(|| format!("Invalid tile name: {}", tile))?,
        _ => return Err(anyhow!("Give a tile name or --lat and --lon")),
    };

    let cache = options
        .builder(version)?
        .build()
        .context("Failed to create tile cache")?;
    let version = cache.default_version();

    let tile = cache
        .tile(name, version)
        .context("Failed to load tile")?
        .ok_or_else(|| anyhow!("Tile {} is not available in {}", name, version))?;

    print_summary(&tile);

    if let Some(url) = cache.url(name, version) {
        println!("Source: {}", url);
    }
    Ok(())
}

fn print_summary(tile: &DecodedTile) {
    let side = tile.side() as i64;
    let (mut min_elev, mut max_elev) = (i16::MAX, i16::MIN);
    let mut void_count = 0u64;

    // Row 0 is the north edge, column 0 the west edge
    for row in 0..side {
        for col in 0..side {
            match tile.sample(row, col) {
                Ok(Some(elev)) => {
                    min_elev = min_elev.min(elev);
                    max_elev = max_elev.max(elev);
                }
                Ok(None) | Err(_) => void_count += 1,
            }
        }
    }

    let name = tile.name();
    let arc_seconds = tile.resolution() * 3600.0;

    println!("Tile: {}", name);
    println!("Version: {}", tile.version());
    println!();
    println!(
        "Resolution: {:.2}\" ({}x{} samples)",
        arc_seconds,
        tile.side(),
        tile.side()
    );
    println!(
        "Coverage: {} to {}, {} to {}",
        latitude_label(name.lat()),
        latitude_label(name.lat() + 1),
        longitude_label(name.lon()),
        longitude_label(name.lon() + 1)
    );
    println!(
        "Size: {}{}",
        format_size(tile.as_bytes().len() as u64),
        if tile.is_mapped() { " (memory-mapped)" } else { "" }
    );
    println!();

    if min_elev <= max_elev {
        println!("Min elevation: {}m", min_elev);
        println!("Max elevation: {}m", max_elev);
    }

    if void_count > 0 {
        let total_samples = tile.sample_count() as f64;
        let void_pct = (void_count as f64 / total_samples) * 100.0;
        println!("No-data samples: {} ({:.1}%)", void_count, void_pct);
    }
}

fn latitude_label(lat: i32) -> String {
    format!("{}{:02}", if lat >= 0 { "N" } else { "S" }, lat.abs())
}

fn longitude_label(lon: i32) -> String {
    format!("{}{:03}", if lon >= 0 { "E" } else { "W" }, lon.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(latitude_label(46), "N46");
        assert_eq!(latitude_label(-3), "S03");
        assert_eq!(longitude_label(13), "E013");
        assert_eq!(longitude_label(-78), "W078");
    }
}
