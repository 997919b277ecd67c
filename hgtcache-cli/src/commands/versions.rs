use anyhow::Result;
use hgtcache::{DirectoryStore, FallbackChain, VersionTag};

use super::CacheOptions;

pub fn run(options: &CacheOptions) -> Result<()> {
    let data_dir = options.data_dir();
    let store = DirectoryStore::new(&data_dir);
    let index = options.load_index()?;
    let chain = FallbackChain::default();

    println!(
        "{:<7} {:>5} {:>8} {:>8}  {}",
        "VERSION", "ARC", "INDEXED", "STORED", "FALLBACK"
    );
    println!("{}", "-".repeat(56));

    let mut total_stored = 0;
    for version in VersionTag::ALL {
        let stored = store.scan(version).len();
        total_stored += stored;

        println!(
            "{:<7} {:>4}\" {:>8} {:>8}  {}",
            version.as_str(),
            version.arc_seconds(),
            index.tiles_in(version).len(),
            stored,
            fallback_label(&chain, version)
        );
    }

    println!();
    println!("Download templates:");
    for version in VersionTag::ALL {
        println!("  {:<6} {}", version.as_str(), version.default_url_template());
    }

    println!();
    println!("Summary:");
    println!("  Indexed tiles: {}", index.len());
    println!("  Stored tiles: {}", total_stored);
    println!("  Data directory: {}", data_dir.display());

    Ok(())
}

/// Chain walked after `version`, e.g. `v3.3 -> v2.3`.
fn fallback_label(chain: &FallbackChain, version: VersionTag) -> String {
    let rest: Vec<&str> = chain
        .walk(version)
        .into_iter()
        .skip(1)
        .map(|v| v.as_str())
        .collect();
    if rest.is_empty() {
        "-".to_string()
    } else {
        rest.join(" -> ")
    }
}
