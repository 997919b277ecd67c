pub mod batch;
pub mod info;
pub mod query;
pub mod versions;

use anyhow::{Context, Result};
use hgtcache::{DownloadConfig, Interpolation, TileCache, TileCacheBuilder, TileIndex, VersionTag};
use std::path::PathBuf;

/// Cache settings shared by every command.
pub struct CacheOptions {
    pub data_dir: Option<PathBuf>,
    pub index: Option<PathBuf>,
    pub cache_size: Option<u64>,
    pub leave_zipped: bool,
    pub timeout: u64,
    pub earthdata_user: Option<String>,
    pub earthdata_password: Option<String>,
}

impl CacheOptions {
    /// Store directory, falling back to the user cache directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(hgtcache::default_data_dir)
    }

    /// Load the tile index, or an empty one when none is configured.
    pub fn load_index(&self) -> Result<TileIndex> {
        match &self.index {
            Some(path) => TileIndex::from_path(path)
                .with_context(|| format!("Failed to load tile index {}", path.display())),
            None => {
                tracing::warn!("no tile index given, only stored tiles are available");
                Ok(TileIndex::new())
            }
        }
    }

    /// Builder configured from these options.
    pub fn builder(&self, version: Option<VersionTag>) -> Result<TileCacheBuilder> {
        let mut builder = TileCache::builder(self.load_index()?)
            .data_dir(self.data_dir())
            .leave_zipped(self.leave_zipped);

        if let Some(version) = version {
            builder = builder.default_version(version);
        }
        if let Some(size) = self.cache_size {
            builder = builder.cache_size(size);
        }

        let mut config = DownloadConfig::new().with_timeout(self.timeout);
        if let (Some(user), Some(password)) = (&self.earthdata_user, &self.earthdata_password) {
            config = config.with_credentials(user.as_str(), password.as_str());
        }

        Ok(builder.auto_download(config))
    }
}

/// Interpolation mode from the command-line flags.
pub fn interpolation(approximate: bool, idw: Option<u8>) -> Interpolation {
    match idw {
        Some(radius) => Interpolation::Idw { radius },
        None => Interpolation::from_approximate(approximate),
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
