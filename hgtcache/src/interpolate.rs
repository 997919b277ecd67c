//! Elevation interpolation over decoded tiles.
//!
//! Three modes are available through [`Interpolation`]:
//!
//! - **Nearest**: the grid sample containing the point.
//! - **Approximate**: weighted average of the four samples one grid step
//!   north, south, east and west. Neighbours come from a [`NeighborLookup`],
//!   so they may live in an adjacent tile.
//! - **Idw**: inverse-distance weighting over a 5-point (radius 1) or
//!   13-point (radius 2) kernel inside the tile.

use crate::error::{ElevationError, Result};
use crate::tile::DecodedTile;
use crate::version::VersionTag;

/// Metres per degree of latitude used by [`distance`].
pub const ONE_DEGREE: f64 = 1000.0 * 10000.8 / 90.0;

/// Radius 1 kernel as `(row, column)` offsets.
const KERNEL_RADIUS_1: [(i64, i64); 5] = [(0, 1), (-1, 0), (0, 0), (1, 0), (0, -1)];

/// Radius 2 kernel as `(row, column)` offsets.
const KERNEL_RADIUS_2: [(i64, i64); 13] = [
    (0, 2),
    (-1, 1),
    (0, 1),
    (1, 1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (2, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (0, -2),
];

/// Flat-earth distance in metres between two points.
///
/// The longitude difference is scaled by the cosine of the first latitude.
/// Good enough for weighting samples a few hundred metres apart.
///
/// ```
/// use hgtcache::interpolate::{distance, ONE_DEGREE};
///
/// assert!((distance(46.0, 13.0, 47.0, 13.0) - ONE_DEGREE).abs() < 1e-6);
/// assert_eq!(distance(46.0, 13.0, 46.0, 13.0), 0.0);
/// ```
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let coef = lat1.to_radians().cos();
    let x = lat1 - lat2;
    let y = (lon1 - lon2) * coef;
    (x * x + y * y).sqrt() * ONE_DEGREE
}

/// Distance from a grid node, in cells, still treated as on the node.
const GRID_NODE_TOLERANCE: f64 = 1e-6;

/// Whether the point sits on a sample coordinate of `tile`.
///
/// Grid coordinates like `47 - row / 1200` are not exact in binary, so the
/// floor in [`DecodedTile::row_and_column`] may land one cell off. Checking
/// against the rounded grid position catches both sides.
fn on_grid_node(tile: &DecodedTile, lat: f64, lon: f64) -> bool {
    let rows = (tile.latitude() + 1.0 - lat) / tile.resolution();
    let cols = (lon - tile.longitude()) / tile.resolution();
    (rows - rows.round()).abs() < GRID_NODE_TOLERANCE
        && (cols - cols.round()).abs() < GRID_NODE_TOLERANCE
}

/// How to turn grid samples into an elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Nearest grid sample.
    #[default]
    Nearest,
    /// Four-neighbour importance weighting, may cross tile edges.
    Approximate,
    /// Inverse-distance weighting with the given kernel radius (1 or 2).
    Idw { radius: u8 },
}

impl Interpolation {
    /// Build a mode from the `approximate` flag of a plain query.
    pub fn from_approximate(approximate: bool) -> Self {
        if approximate {
            Interpolation::Approximate
        } else {
            Interpolation::Nearest
        }
    }
}

/// Resolves nearest-cell elevations for points that may lie outside the
/// tile being interpolated.
pub trait NeighborLookup {
    /// Nearest-cell elevation at `(lat, lon)` starting from `version`.
    fn neighbor_elevation(&self, lat: f64, lon: f64, version: VersionTag)
        -> Result<Option<f64>>;
}

/// Importance sums below this fraction of the grid step are rounding noise.
const DEGENERATE_IMPORTANCE: f64 = 1e-9;

/// Normalized importances of the north, south, east and west neighbours.
///
/// A neighbour's importance is the grid step in metres minus its distance
/// to the query point. When the importances vanish (at the equator) the
/// neighbours are weighted equally.
pub fn neighbor_weights(lat: f64, lon: f64, side: usize) -> [f64; 4] {
    let d = 1.0 / side as f64;
    let d_meters = d * ONE_DEGREE;

    let importances = neighbor_points(lat, lon, d)
        .map(|(n_lat, n_lon)| d_meters - distance(n_lat, n_lon, lat, lon));
    let sum: f64 = importances.iter().sum();

    if sum.abs() <= d_meters * DEGENERATE_IMPORTANCE {
        return [0.25; 4];
    }
    importances.map(|importance| importance / sum)
}

fn neighbor_points(lat: f64, lon: f64, d: f64) -> [(f64, f64); 4] {
    [(lat + d, lon), (lat - d, lon), (lat, lon + d), (lat, lon - d)]
}

/// Elevation query bound to one decoded tile.
pub struct ElevationQuery<'a, L: NeighborLookup + ?Sized> {
    tile: &'a DecodedTile,
    lookup: &'a L,
}

impl<'a, L: NeighborLookup + ?Sized> ElevationQuery<'a, L> {
    /// Query `tile`, resolving cross-tile neighbours through `lookup`.
    pub fn new(tile: &'a DecodedTile, lookup: &'a L) -> Self {
        Self { tile, lookup }
    }

    /// Elevation at `(lat, lon)` using `mode`.
    ///
    /// # Errors
    ///
    /// Invalid coordinates for the tile, an invalid IDW radius, or errors
    /// raised while resolving neighbours.
    pub fn evaluate(&self, lat: f64, lon: f64, mode: Interpolation) -> Result<Option<f64>> {
        match mode {
            Interpolation::Nearest => self.tile.get_elevation(lat, lon),
            Interpolation::Approximate => self.approximate(lat, lon),
            Interpolation::Idw { radius } => self.idw(lat, lon, radius),
        }
    }

    /// Four-neighbour approximation.
    ///
    /// A missing neighbour is replaced by the nearest-cell value at the
    /// query point; if that is missing too the result is `None`.
    pub fn approximate(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        self.tile.check_domain(lat, lon)?;

        let d = 1.0 / self.tile.side() as f64;
        let version = self.tile.version();

        let mut elevations = [None; 4];
        for (slot, (n_lat, n_lon)) in elevations.iter_mut().zip(neighbor_points(lat, lon, d)) {
            *slot = self.lookup.neighbor_elevation(n_lat, n_lon, version)?;
        }

        let elevations = if elevations.iter().any(Option::is_none) {
            let Some(direct) = self.tile.get_elevation(lat, lon)? else {
                return Ok(None);
            };
            elevations.map(|e| e.unwrap_or(direct))
        } else {
            elevations.map(|e| e.unwrap_or_default())
        };

        let weights = neighbor_weights(lat, lon, self.tile.side());
        Ok(Some(
            weights
                .iter()
                .zip(elevations.iter())
                .map(|(w, e)| w * e)
                .sum(),
        ))
    }

    /// Inverse-distance-weighted elevation over the in-tile kernel.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidRadius`] for radii other than 1 or 2.
    pub fn idw(&self, lat: f64, lon: f64, radius: u8) -> Result<Option<f64>> {
        let kernel: &[(i64, i64)] = match radius {
            1 => &KERNEL_RADIUS_1,
            2 => &KERNEL_RADIUS_2,
            _ => return Err(ElevationError::InvalidRadius(radius)),
        };

        let tile = self.tile;
        tile.check_domain(lat, lon)?;

        let (row, col) = tile.row_and_column(lat, lon);
        if on_grid_node(tile, lat, lon) {
            return Ok(tile.sample(row, col)?.map(f64::from));
        }
        let (center_lat, center_lon) = tile.lat_and_lon(row, col);

        let step = tile.resolution();
        let mut weights = 0.0;
        let mut elevation = 0.0;

        for &(d_row, d_col) in kernel {
            let (cell_row, cell_col) = (row + d_row, col + d_col);
            if !tile.contains_cell(cell_row, cell_col) {
                continue;
            }
            let Some(cell) = tile.sample(cell_row, cell_col)? else {
                continue;
            };

            // Offsets are applied to the center coordinate as-is, so the row
            // offset moves north while the sampled row moves south.
            let dist = distance(
                lat,
                lon,
                center_lat + d_row as f64 * step,
                center_lon + d_col as f64 * step,
            );
            if dist == 0.0 {
                // Rounding put the query on a kernel point, answer as on a
                // grid node.
                return Ok(tile.sample(row, col)?.map(f64::from));
            }
            weights += 1.0 / dist;
            elevation += f64::from(cell) / dist;
        }

        if weights == 0.0 {
            return Ok(None);
        }
        Ok(Some(elevation / weights))
    }
}
