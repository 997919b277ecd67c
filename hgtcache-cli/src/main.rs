use anyhow::Result;
use clap::{Parser, Subcommand};
use hgtcache::VersionTag;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CacheOptions;

/// Versioned SRTM elevation CLI tool
#[derive(Parser)]
#[command(name = "hgtcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tile store directory
    #[arg(short, long, env = "HGTCACHE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Tile index JSON (needed to download missing tiles)
    #[arg(short, long, env = "HGTCACHE_INDEX", global = true)]
    index: Option<PathBuf>,

    /// Maximum resident tiles
    #[arg(short, long, env = "HGTCACHE_CACHE_SIZE", global = true)]
    cache_size: Option<u64>,

    /// Store downloaded tiles as the original archives
    #[arg(long, env = "HGTCACHE_LEAVE_ZIPPED", global = true)]
    leave_zipped: bool,

    /// HTTP timeout in seconds
    #[arg(long, env = "HGTCACHE_TIMEOUT", default_value = "15", global = true)]
    timeout: u64,

    /// NASA Earthdata username
    #[arg(long, env = "HGTCACHE_EARTHDATA_USER", global = true)]
    earthdata_user: Option<String>,

    /// NASA Earthdata password
    #[arg(
        long,
        env = "HGTCACHE_EARTHDATA_PASSWORD",
        hide_env_values = true,
        global = true
    )]
    earthdata_password: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Blend the four neighbouring samples
        #[arg(short, long, conflicts_with = "idw")]
        approximate: bool,

        /// Inverse distance weighting with kernel radius 1 or 2
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        idw: Option<u8>,

        /// Data version (v1.1, v1.3, v2.1, v2.3, v3.1, v3.3, v3.3s)
        #[arg(long = "version", value_name = "VERSION")]
        data_version: Option<VersionTag>,

        /// Only query the requested version
        #[arg(long)]
        no_fallback: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an elevation column to a CSV file
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Blend the four neighbouring samples
        #[arg(short, long, conflicts_with = "idw")]
        approximate: bool,

        /// Inverse distance weighting with kernel radius 1 or 2
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        idw: Option<u8>,

        /// Data version
        #[arg(long = "version", value_name = "VERSION")]
        data_version: Option<VersionTag>,
    },

    /// Display information about a tile
    Info {
        /// Tile name (e.g., N46E013)
        #[arg(required_unless_present_all = ["lat", "lon"])]
        tile: Option<String>,

        /// Specify tile by latitude instead of name
        #[arg(long, conflicts_with = "tile", requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Specify tile by longitude instead of name
        #[arg(long, conflicts_with = "tile", requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Data version
        #[arg(long = "version", value_name = "VERSION")]
        data_version: Option<VersionTag>,
    },

    /// List versions, fallback chains and local tile counts
    Versions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "hgtcache=debug"
    } else {
        "hgtcache=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = CacheOptions {
        data_dir: cli.data_dir,
        index: cli.index,
        cache_size: cli.cache_size,
        leave_zipped: cli.leave_zipped,
        timeout: cli.timeout,
        earthdata_user: cli.earthdata_user,
        earthdata_password: cli.earthdata_password,
    };

    match cli.command {
        Commands::Query {
            lat,
            lon,
            approximate,
            idw,
            data_version,
            no_fallback,
            json,
        } => commands::query::run(
            &options,
            lat,
            lon,
            commands::interpolation(approximate, idw),
            data_version,
            !no_fallback,
            json,
        ),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
            approximate,
            idw,
            data_version,
        } => commands::batch::run(
            &options,
            input,
            output,
            &lat_col,
            &lon_col,
            commands::interpolation(approximate, idw),
            data_version,
        ),
        Commands::Info {
            tile,
            lat,
            lon,
            data_version,
        } => commands::info::run(&options, tile, lat, lon, data_version),
        Commands::Versions => commands::versions::run(&options),
    }
}
