//! Data-source generations and the fallback chain between them.
//!
//! Every [`VersionTag`] names one SRTM release at one resolution. The same
//! tile name decodes to a different grid in each version, so tiles are
//! cached per `(name, version)`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ElevationError, Result};

/// One generation/resolution of source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum VersionTag {
    /// SRTM version 1, 1 arc-second (United States only).
    V1Srtm1,
    /// SRTM version 1, 3 arc-second.
    V1Srtm3,
    /// SRTM version 2.1, 1 arc-second (United States only).
    V2Srtm1,
    /// SRTM version 2.1, 3 arc-second.
    #[default]
    V2Srtm3,
    /// SRTM version 3 (SRTMGL1), 1 arc-second, global.
    V3Srtm1,
    /// SRTM version 3 (SRTMGL3), 3 arc-second, global.
    V3Srtm3,
    /// SRTM version 3 (SRTMGL3S), 3 arc-second sampled from 1 arc-second.
    V3Srtm3Sampled,
}

impl VersionTag {
    /// Every version, in index-column order.
    pub const ALL: [VersionTag; 7] = [
        VersionTag::V1Srtm1,
        VersionTag::V1Srtm3,
        VersionTag::V2Srtm1,
        VersionTag::V2Srtm3,
        VersionTag::V3Srtm1,
        VersionTag::V3Srtm3,
        VersionTag::V3Srtm3Sampled,
    ];

    /// Number of distinct versions.
    pub const COUNT: usize = Self::ALL.len();

    /// Short tag, e.g. `v2.3`.
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionTag::V1Srtm1 => "v1.1",
            VersionTag::V1Srtm3 => "v1.3",
            VersionTag::V2Srtm1 => "v2.1",
            VersionTag::V2Srtm3 => "v2.3",
            VersionTag::V3Srtm1 => "v3.1",
            VersionTag::V3Srtm3 => "v3.3",
            VersionTag::V3Srtm3Sampled => "v3.3s",
        }
    }

    /// Position of this version in [`VersionTag::ALL`].
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Nominal spacing between samples in arc-seconds.
    pub fn arc_seconds(&self) -> u32 {
        match self {
            VersionTag::V1Srtm1 | VersionTag::V2Srtm1 | VersionTag::V3Srtm1 => 1,
            VersionTag::V1Srtm3
            | VersionTag::V2Srtm3
            | VersionTag::V3Srtm3
            | VersionTag::V3Srtm3Sampled => 3,
        }
    }

    /// Expected samples per row/column (3601 or 1201).
    pub fn samples(&self) -> usize {
        3600 / self.arc_seconds() as usize + 1
    }

    /// Default download URL template.
    ///
    /// `{name}` expands to the tile name (`N46E013`) and `{region}` to the
    /// region directory decoded from the tile index entry.
    pub fn default_url_template(&self) -> &'static str {
        match self {
            VersionTag::V1Srtm1 => {
                "https://dds.cr.usgs.gov/srtm/version1/SRTM1/{region}/{name}.hgt.zip"
            }
            VersionTag::V1Srtm3 => {
                "https://dds.cr.usgs.gov/srtm/version1/SRTM3/{region}/{name}.hgt.zip"
            }
            VersionTag::V2Srtm1 => {
                "https://dds.cr.usgs.gov/srtm/version2_1/SRTM1/{region}/{name}.hgt.zip"
            }
            VersionTag::V2Srtm3 => "https://terrain.ardupilot.org/SRTM3/{region}/{name}.hgt.zip",
            VersionTag::V3Srtm1 => {
                "https://e4ftl01.cr.usgs.gov/MEASURES/SRTMGL1.003/2000.02.11/{name}.SRTMGL1.hgt.zip"
            }
            VersionTag::V3Srtm3 => {
                "https://e4ftl01.cr.usgs.gov/MEASURES/SRTMGL3.003/2000.02.11/{name}.SRTMGL3.hgt.zip"
            }
            VersionTag::V3Srtm3Sampled => {
                "https://e4ftl01.cr.usgs.gov/MEASURES/SRTMGL3S.003/2000.02.11/{name}.SRTMGL3S.hgt.zip"
            }
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionTag {
    type Err = ElevationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        VersionTag::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ElevationError::UnknownVersion(s.to_string()))
    }
}

/// Decode an index region code into the directory used by URL templates.
///
/// `-` means the tile is absent and never reaches this function; any code
/// without a directory mapping yields an empty region.
pub fn region_directory(code: u8) -> &'static str {
    match code {
        b'A' => "Africa",
        b'U' => "Australia",
        b'E' => "Eurasia",
        b'I' => "Islands",
        b'N' => "North_America",
        b'S' => "South_America",
        b'1' => "Region_01",
        b'2' => "Region_02",
        b'3' => "Region_03",
        b'4' => "Region_04",
        b'5' => "Region_05",
        b'6' => "Region_06",
        b'7' => "Region_07",
        _ => "",
    }
}

/// Strategy mapping each version to the next one to try.
///
/// The table is validated on construction: following `next` from any
/// version terminates within [`VersionTag::COUNT`] steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    next: HashMap<VersionTag, VersionTag>,
}

impl FallbackChain {
    /// Build a chain from `(version, next)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::CyclicFallback`] if any chain loops.
    pub fn new(pairs: impl IntoIterator<Item = (VersionTag, VersionTag)>) -> Result<Self> {
        let chain = Self {
            next: pairs.into_iter().collect(),
        };

        for start in VersionTag::ALL {
            let mut current = start;
            let mut steps = 0;
            while let Some(next) = chain.next(current) {
                steps += 1;
                if steps > VersionTag::COUNT {
                    return Err(ElevationError::CyclicFallback(start.to_string()));
                }
                current = next;
            }
        }

        Ok(chain)
    }

    /// A chain where every version is terminal.
    pub fn none() -> Self {
        Self {
            next: HashMap::new(),
        }
    }

    /// Next version to try after `version`, or `None` at the end.
    pub fn next(&self, version: VersionTag) -> Option<VersionTag> {
        self.next.get(&version).copied()
    }

    /// Versions visited starting at `version`, itself included.
    pub fn walk(&self, version: VersionTag) -> Vec<VersionTag> {
        let mut visited = vec![version];
        let mut current = version;
        while let Some(next) = self.next(current) {
            visited.push(next);
            current = next;
        }
        visited
    }
}

impl Default for FallbackChain {
    fn default() -> Self {
        use VersionTag::*;

        Self {
            next: HashMap::from([
                (V3Srtm1, V3Srtm3),
                (V3Srtm3, V2Srtm3),
                (V3Srtm3Sampled, V3Srtm3),
                (V2Srtm1, V2Srtm3),
                (V1Srtm1, V1Srtm3),
            ]),
        }
    }
}
