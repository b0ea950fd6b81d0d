//! Scan-row envelope: for each scan in a granule, the bin-row span its
//! pixels can possibly fall into, padded to absorb geolocation jitter.
//!
//! Grounded on `l2bin.c`'s `bscan`/`escan` computation in the row-group
//! loop, which derives a scan's row span from its start/end latitudes only
//! (never the scan center), swaps the two if they come out inverted, then
//! pads them in opposite directions before testing against the row-group
//! currently being accumulated.

use crate::grid::Grid;

/// Row padding applied to a scan's raw latitude-derived row span, matching
/// the literal `+/-10` in `l2bin.c`.
pub const ROW_PAD: i64 = 10;

/// Padded row span for one scan, derived from `slat`/`elat` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEnvelope {
    pub bscan: i64,
    pub escan: i64,
}

impl ScanEnvelope {
    /// True when this scan's envelope covers the row-group `[group_start,
    /// group_end]` (both inclusive row indices, `group_end = group_start +
    /// row_group - 1`), per `l2bin.c`'s asymmetric `bscan >= krow && escan
    /// < krow+row_group-1` test (the right-hand side is `group_end`, since
    /// `krow+row_group-1` is exactly the row-group's last row).
    pub fn overlaps(&self, group_start: i64, group_end: i64) -> bool {
        self.bscan >= group_start && self.escan < group_end
    }
}

/// Computes the padded row envelope for a single scan from its start/end
/// latitudes (spec.md §4.3): `e`/`b` are the raw (unpadded) row positions of
/// `elat`/`slat`, swapped if `e > b`, then `escan = floor(e) - ROW_PAD` and
/// `bscan = floor(b) + ROW_PAD`.
pub fn scan_envelope(grid: &Grid, slat: f64, elat: f64) -> ScanEnvelope {
    let row_of_lat = |lat: f64| -> f64 { (90.0 + lat) * grid.nrows() as f64 / 180.0 };

    let mut e = row_of_lat(elat);
    let mut b = row_of_lat(slat);
    if e > b {
        std::mem::swap(&mut e, &mut b);
    }

    let escan = e.floor() as i64 - ROW_PAD;
    let bscan = b.floor() as i64 + ROW_PAD;

    ScanEnvelope { bscan, escan }
}

/// Computes the envelope for every scan of a granule in one pass.
pub fn scan_envelopes(grid: &Grid, slat: &[f64], elat: &[f64]) -> Vec<ScanEnvelope> {
    (0..slat.len()).map(|i| scan_envelope(grid, slat[i], elat[i])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_swaps_when_end_precedes_start() {
        let grid = Grid::new(2160);
        let normal = scan_envelope(&grid, -1.0, 1.0);
        let swapped = scan_envelope(&grid, 1.0, -1.0);
        assert_eq!(normal, swapped);
    }

    #[test]
    fn envelope_pads_in_opposite_directions() {
        let grid = Grid::new(2160);
        let env = scan_envelope(&grid, 0.0, 0.0);
        let center_row = (90.0 * grid.nrows() as f64 / 180.0).floor() as i64;
        assert_eq!(env.bscan, center_row + ROW_PAD);
        assert_eq!(env.escan, center_row - ROW_PAD);
    }

    #[test]
    fn overlap_is_asymmetric_about_the_group_end() {
        let env = ScanEnvelope { bscan: 120, escan: 100 };
        // group_end=130: bscan=120 >= 110, escan=100 < 130 -> true
        assert!(env.overlaps(110, 130));
        // group_start=121: bscan=120 not >= 121 -> false
        assert!(!env.overlaps(121, 200));
        // group_end=100: escan=100 not < 100 -> false
        assert!(!env.overlaps(0, 100));
    }
}
