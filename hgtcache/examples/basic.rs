//! Basic example demonstrating hgtcache library usage.
//!
//! Run with: cargo run --example basic -- /path/to/tiles.json /path/to/store

use hgtcache::{ElevationError, TileCache, TileIndex};
use std::env;

fn main() -> Result<(), ElevationError> {
    let mut args = env::args().skip(1);
    let (Some(index_path), Some(data_dir)) = (args.next(), args.next()) else {
        eprintln!("Usage: cargo run --example basic -- /path/to/tiles.json /path/to/store");
        std::process::exit(1);
    };

    let cache = TileCache::builder(TileIndex::from_path(&index_path)?)
        .data_dir(&data_dir)
        .cache_size(10)
        .build()?;

    // Query some famous places
    let locations = [
        ("Mount Fuji, Japan", 35.3606, 138.7274),
        ("Mount Everest, Nepal", 27.9881, 86.9250),
        ("Dead Sea shore", 31.5, 35.5),
        ("Pacific Ocean", 0.5, -150.5),
    ];

    println!("Elevation queries (nearest sample, v2.3):");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        match cache.get_elevation(*lat, *lon, false, None) {
            Ok(Some(elevation)) => println!("{}: {}m", name, elevation),
            Ok(None) => println!("{}: no data", name),
            Err(e) => println!("{}: error - {}", name, e),
        }
    }

    // Show cache statistics
    let stats = cache.stats();
    println!("\nCache statistics:");
    println!("  Resident tiles: {}", stats.resident_count);
    println!("  Hits: {}", stats.hit_count);
    println!("  Misses: {}", stats.miss_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
