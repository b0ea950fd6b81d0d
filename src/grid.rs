//! ISIN (Integerized Sinusoidal) grid geometry: row/column arithmetic over
//! a globe divided into equal-latitude rows, each with a row-specific
//! number of equal-longitude cells proportional to cos(latitude).

use crate::error::BinError;

/// Bin resolution codes, mapping to a fixed row count. `nrows` values match
/// the `resolve` parameter table in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Q,
    H,
    R1,
    R2,
    R4,
    R9,
    R36,
}

impl Resolution {
    pub fn nrows(self) -> usize {
        match self {
            Resolution::Q => 2160 * 32,
            Resolution::H => 2160 * 16,
            Resolution::R1 => 2160 * 8,
            Resolution::R2 => 2160 * 4,
            Resolution::R4 => 2160 * 2,
            Resolution::R9 => 2160,
            Resolution::R36 => 2160 / 4,
        }
    }

    /// Parses the `resolve` parameter string, e.g. "9", "H", "36".
    pub fn parse(s: &str) -> Result<Resolution, BinError> {
        match s {
            "Q" => Ok(Resolution::Q),
            "H" => Ok(Resolution::H),
            "1" => Ok(Resolution::R1),
            "2" => Ok(Resolution::R2),
            "4" => Ok(Resolution::R4),
            "9" => Ok(Resolution::R9),
            "36" => Ok(Resolution::R36),
            other => Err(BinError::Config(format!(
                "grid resolution not defined: {other:?}"
            ))),
        }
    }
}

/// Immutable derived grid tables: `numbin[row]` (cell count per row) and
/// `basebin[row]` (1-based global bin number of the first cell in `row`).
/// Lifetime is the whole run; built once from `nrows`.
#[derive(Debug, Clone)]
pub struct Grid {
    nrows: usize,
    numbin: Vec<i64>,
    /// Length `nrows + 1`; `basebin[nrows]` is one past the last valid bin,
    /// i.e. `total_bins() + 1`.
    basebin: Vec<i64>,
}

impl Grid {
    pub fn new(nrows: usize) -> Grid {
        let mut numbin = Vec::with_capacity(nrows);
        for i in 0..nrows {
            let lat = (i as f64 + 0.5) * 180.0 / nrows as f64 - 90.0;
            let n = (lat.to_radians().cos() * 2.0 * nrows as f64).round() as i64;
            numbin.push(n.max(1));
        }

        let mut basebin = Vec::with_capacity(nrows + 1);
        basebin.push(1i64);
        for i in 0..nrows {
            basebin.push(basebin[i] + numbin[i]);
        }

        Grid {
            nrows,
            numbin,
            basebin,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn numbin(&self, row: usize) -> i64 {
        self.numbin[row]
    }

    /// 1-based global bin number of the first cell of `row`.
    pub fn basebin(&self, row: usize) -> i64 {
        self.basebin[row]
    }

    /// Total number of bins in the grid (`basebin[nrows] - 1`).
    pub fn total_bins(&self) -> i64 {
        self.basebin[self.nrows] - 1
    }

    /// Assigns a 1-based global bin number to a geolocated pixel. Rejects
    /// latitudes outside `[-90, 90)` (a pixel exactly at +90 falls into row
    /// `nrows`, which is out of range and therefore bad) and any row index
    /// that would fall outside `[0, nrows)`.
    pub fn bin_of(&self, lat: f64, lon: f64) -> Option<i64> {
        let row = ((90.0 + lat) * self.nrows as f64 / 180.0).floor() as i64;
        if row < 0 || row >= self.nrows as i64 {
            return None;
        }
        let row = row as usize;
        let col = (self.numbin[row] as f64 * (lon + 180.0) / 360.0).floor() as i64;
        Some(self.basebin[row] + col)
    }

    /// Finds the row containing a 1-based global `bin` number via binary
    /// search into `basebin`.
    pub fn row_of(&self, bin: i64) -> Option<usize> {
        if bin < 1 || bin > self.total_bins() {
            return None;
        }
        match self.basebin.binary_search(&bin) {
            Ok(row) => Some(row),
            Err(insertion) => Some(insertion - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbin_sums_to_total_bins() {
        let grid = Grid::new(2160);
        let sum: i64 = (0..grid.nrows()).map(|r| grid.numbin(r)).sum();
        assert_eq!(sum, grid.total_bins());
    }

    #[test]
    fn basebin_strictly_increasing() {
        let grid = Grid::new(2160);
        for r in 0..grid.nrows() {
            assert!(grid.basebin(r) < grid.basebin(r + 1));
        }
    }

    #[test]
    fn row_of_matches_basebin_span() {
        let grid = Grid::new(2160);
        for bin in [1i64, 2, grid.total_bins() / 2, grid.total_bins()] {
            let row = grid.row_of(bin).unwrap();
            assert!(grid.basebin(row) <= bin && bin < grid.basebin(row + 1));
        }
    }

    #[test]
    fn bin_of_rejects_north_pole() {
        let grid = Grid::new(2160);
        assert_eq!(grid.bin_of(90.0, 0.0), None);
        assert!(grid.bin_of(89.999, 0.0).is_some());
    }

    #[test]
    fn bin_of_in_range_for_valid_inputs() {
        let grid = Grid::new(2160);
        for lat_i in -900..900 {
            let lat = lat_i as f64 * 0.1;
            for lon_i in [-1800, -900, -1, 0, 899, 1799] {
                let lon = lon_i as f64 * 0.1;
                let bin = grid.bin_of(lat, lon).expect("in-range pixel must bin");
                assert!(bin >= 1 && bin < grid.basebin(grid.nrows()));
            }
        }
    }

    #[test]
    fn row_round_trip_within_one_row_height(){
        let grid = Grid::new(2160);
        let row_height = 180.0 / grid.nrows() as f64;
        for lat_i in -895..895 {
            let lat = lat_i as f64 * 0.1;
            let bin = grid.bin_of(lat, 0.0).unwrap();
            let row = grid.row_of(bin).unwrap();
            let row_center = (row as f64 + 0.5) * row_height - 90.0;
            assert!((row_center - lat).abs() <= row_height);
        }
    }

    #[test]
    fn resolution_nrows_table() {
        assert_eq!(Resolution::R9.nrows(), 2160);
        assert_eq!(Resolution::R1.nrows(), 2160 * 8);
        assert_eq!(Resolution::Q.nrows(), 2160 * 32);
        assert_eq!(Resolution::R36.nrows(), 2160 / 4);
    }
}
