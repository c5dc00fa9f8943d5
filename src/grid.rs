//! Rectangular geographic grid for spatial binning.
//!
//! A [`Region`] subdivides a bounded lon/lat rectangle into `lon_bins x
//! lat_bins` cells and maps an observation to a flat row-major cell index:
//! `index = lon_bin * lat_bins + lat_bin`. Bins are half-open on each axis;
//! a coordinate exactly on the upper boundary clamps into the last bin so
//! that the index never overflows the grid.

use crate::error::{Error, Result};

/// Immutable rectangular region with a fixed bin layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
    lon_bins: usize,
    lat_bins: usize,
}

impl Region {
    /// Create a region with explicit bin counts per axis.
    pub fn new(
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        lon_bins: usize,
        lat_bins: usize,
    ) -> Result<Self> {
        if !(min_lon < max_lon) || !(min_lat < max_lat) {
            return Err(Error::InvalidRegion(format!(
                "bounds must satisfy min < max, got lon [{min_lon}, {max_lon}], lat [{min_lat}, {max_lat}]"
            )));
        }
        if lon_bins == 0 || lat_bins == 0 {
            return Err(Error::InvalidRegion(format!(
                "bin counts must be positive, got {lon_bins} x {lat_bins}"
            )));
        }
        Ok(Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
            lon_bins,
            lat_bins,
        })
    }

    /// Create a region from a nominal bin width shared by both axes; the
    /// per-axis bin count is the rounded span/width. Geographic cells come
    /// out roughly square this way.
    pub fn with_bin_width(
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        bin_width: f64,
    ) -> Result<Self> {
        if !(bin_width > 0.0) {
            return Err(Error::InvalidRegion(format!(
                "bin width must be positive, got {bin_width}"
            )));
        }
        let lon_bins = ((max_lon - min_lon) / bin_width).round() as usize;
        let lat_bins = ((max_lat - min_lat) / bin_width).round() as usize;
        Self::new(min_lon, max_lon, min_lat, max_lat, lon_bins, lat_bins)
    }

    pub fn lon_bins(&self) -> usize {
        self.lon_bins
    }

    pub fn lat_bins(&self) -> usize {
        self.lat_bins
    }

    /// Total number of grid cells.
    pub fn cell_count(&self) -> usize {
        self.lon_bins * self.lat_bins
    }

    pub fn lon_bin_width(&self) -> f64 {
        (self.max_lon - self.min_lon) / self.lon_bins as f64
    }

    pub fn lat_bin_width(&self) -> f64 {
        (self.max_lat - self.min_lat) / self.lat_bins as f64
    }

    /// Whether a point lies strictly inside the bounds. The catalog filter
    /// uses strict comparisons on all four edges, matching the upstream
    /// catalog producers.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon > self.min_lon && lon < self.max_lon && lat > self.min_lat && lat < self.max_lat
    }

    /// Map a coordinate to its flat cell index.
    ///
    /// Bins are half-open `[low, high)`; the maximum-edge coordinate is
    /// accepted and clamped to the last bin rather than rejected.
    pub fn cell_index(&self, lon: f64, lat: f64) -> Result<usize> {
        if !(self.min_lon..=self.max_lon).contains(&lon)
            || !(self.min_lat..=self.max_lat).contains(&lat)
        {
            return Err(Error::OutOfRegion { lon, lat });
        }
        let lon_bin =
            (((lon - self.min_lon) / self.lon_bin_width()) as usize).min(self.lon_bins - 1);
        let lat_bin =
            (((lat - self.min_lat) / self.lat_bin_width()) as usize).min(self.lat_bins - 1);
        Ok(lon_bin * self.lat_bins + lat_bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kanto() -> Region {
        Region::new(138.8, 141.05, 34.8, 37.05, 45, 45).unwrap()
    }

    #[test]
    fn rejects_bad_bounds_and_zero_bins() {
        assert!(Region::new(10.0, 5.0, 0.0, 1.0, 4, 4).is_err());
        assert!(Region::new(0.0, 1.0, 3.0, 3.0, 4, 4).is_err());
        assert!(Region::new(0.0, 1.0, 0.0, 1.0, 0, 4).is_err());
    }

    #[test]
    fn derives_bins_from_width() {
        let r = Region::with_bin_width(138.8, 141.05, 34.8, 37.05, 0.05).unwrap();
        assert_eq!(r.lon_bins(), 45);
        assert_eq!(r.lat_bins(), 45);
        assert_eq!(r.cell_count(), 2025);
    }

    #[test]
    fn index_is_row_major() {
        let r = Region::new(0.0, 4.0, 0.0, 2.0, 4, 2).unwrap();
        // lon bin 0, lat bin 0
        assert_eq!(r.cell_index(0.5, 0.5).unwrap(), 0);
        // lon bin 0, lat bin 1
        assert_eq!(r.cell_index(0.5, 1.5).unwrap(), 1);
        // lon bin 3, lat bin 1
        assert_eq!(r.cell_index(3.9, 1.9).unwrap(), 7);
    }

    #[test]
    fn same_cell_same_index_distinct_cells_distinct_index() {
        let r = kanto();
        let a = r.cell_index(139.01, 35.01).unwrap();
        let b = r.cell_index(139.04, 35.02).unwrap();
        assert_eq!(a, b);

        let c = r.cell_index(139.06, 35.01).unwrap();
        assert_ne!(a, c);
        assert!(a < r.cell_count());
        assert!(c < r.cell_count());
    }

    #[test]
    fn upper_edge_clamps_into_last_bin() {
        let r = Region::new(0.0, 1.0, 0.0, 1.0, 10, 10).unwrap();
        assert_eq!(r.cell_index(1.0, 1.0).unwrap(), r.cell_count() - 1);
        assert_eq!(r.cell_index(0.0, 1.0).unwrap(), 9);
    }

    #[test]
    fn out_of_region_is_an_error() {
        let r = kanto();
        assert!(matches!(
            r.cell_index(150.0, 35.0),
            Err(Error::OutOfRegion { .. })
        ));
        assert!(matches!(
            r.cell_index(139.0, 90.0),
            Err(Error::OutOfRegion { .. })
        ));
    }
}
