//! Example comparing the interpolation modes at one point.
//!
//! Run with: cargo run --example interpolation -- /path/to/tiles.json /path/to/store

use hgtcache::{ElevationError, Interpolation, TileCache, TileIndex};
use std::env;

fn main() -> Result<(), ElevationError> {
    let mut args = env::args().skip(1);
    let (Some(index_path), Some(data_dir)) = (args.next(), args.next()) else {
        eprintln!("Usage: cargo run --example interpolation -- /path/to/tiles.json /path/to/store");
        std::process::exit(1);
    };

    let cache = TileCache::builder(TileIndex::from_path(&index_path)?)
        .data_dir(&data_dir)
        .build()?;

    let lat = 35.3606;
    let lon = 138.7274;

    println!("Comparing elevation methods at ({}, {}):", lat, lon);
    println!("{:-<50}", "");

    let modes = [
        ("Nearest", Interpolation::Nearest),
        ("Approximate", Interpolation::Approximate),
        ("IDW (radius 1)", Interpolation::Idw { radius: 1 }),
        ("IDW (radius 2)", Interpolation::Idw { radius: 2 }),
    ];

    for (label, mode) in modes {
        match cache.get_elevation_with(lat, lon, mode, None) {
            Ok(Some(elevation)) => println!("{:<16} {:.2}m", label, elevation),
            Ok(None) => println!("{:<16} no data", label),
            Err(e) => {
                println!("{:<16} error - {}", label, e);
                return Ok(());
            }
        }
    }

    Ok(())
}
