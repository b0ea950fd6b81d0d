//! Dataday/swath-edge classification: deciding, per granule, which side of
//! the international date line a granule is allowed to contribute bins to.
//!
//! Grounded on the `brk_scan[ifile]` assignment blocks in `l2bin.c`'s
//! `main()` (the day/night, sensor-specific branches that inspect node
//! direction, start time, and neighbouring granules to decide whether a
//! granule's scans should be clipped to east-only, west-only, dropped
//! entirely, or left unclipped), following the per-sensor temporal
//! selection table exactly rather than approximating it.

use crate::error::BinError;
use crate::granule::{GranuleMeta, Node};

/// Sensors the classifier has an explicit temporal table for. Unlisted
/// sensors fall back to `BrkScan::All` (no clipping), matching `l2bin.c`'s
/// default `brk_scan[ifile] = 0` when no sensor-specific branch fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    ModisAqua,
    ModisTerra,
    SeaWifs,
    Czcs,
    Ocm2,
    Meris,
    Octs,
    Other,
}

impl Sensor {
    pub fn parse(name: &str) -> Sensor {
        match name {
            "modisa" | "aqua" => Sensor::ModisAqua,
            "modist" | "terra" => Sensor::ModisTerra,
            "seawifs" => Sensor::SeaWifs,
            "czcs" => Sensor::Czcs,
            "ocm2" => Sensor::Ocm2,
            "meris" => Sensor::Meris,
            "octs" => Sensor::Octs,
            _ => Sensor::Other,
        }
    }
}

/// Day-vs-regional product type (spec.md §3/§4.2). Regional runs skip
/// dataday classification entirely: every granule gets `brk_scan = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prodtype {
    Day,
    Regional,
}

/// A granule's dateline disposition for this binning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrkScan {
    /// Granule contributes no bins at all.
    Drop,
    /// Only pixels east of the scan's crossing longitude are kept.
    EastOnly,
    /// Only pixels west of the scan's crossing longitude are kept.
    WestOnly,
    /// No dateline clipping; every pixel is eligible.
    All,
}

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Day-of-year difference between two `YYYYDDD`-encoded dates, correctly
/// spanning year boundaries (including leap years). Positive when `date2`
/// is later than `date1`.
pub fn diffday(date1: i32, date2: i32) -> i32 {
    let (y1, d1) = (date1 / 1000, date1 % 1000);
    let (y2, d2) = (date2 / 1000, date2 % 1000);
    if y1 == y2 {
        return d2 - d1;
    }
    let mut total = 0;
    if y1 < y2 {
        total += days_in_year(y1) - d1;
        for y in (y1 + 1)..y2 {
            total += days_in_year(y);
        }
        total += d2;
    } else {
        total -= days_in_year(y2) - d2;
        for y in (y2 + 1)..y1 {
            total -= days_in_year(y);
        }
        total -= d1;
    }
    total
}

pub fn isleap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_year(year: i32) -> i32 {
    if isleap(year) {
        366
    } else {
        365
    }
}

/// MODIS-family `scancross`: scan from the last scan backward; true as soon
/// as a scan satisfies `elon*snode > 0 ∧ slon*snode < 0 ∧ mean(|elat|,
/// |slat|) < 70` (spec.md §4.2).
fn modis_scancross(g: &GranuleMeta) -> bool {
    let snode = g.snode.sign() as f64;
    let n = g.slon.len().min(g.elon.len()).min(g.slat.len()).min(g.elat.len());
    for j in (0..n).rev() {
        let elon = g.elon[j];
        let slon = g.slon[j];
        let mean_abs_lat = (g.elat[j].abs() + g.slat[j].abs()) / 2.0;
        if elon * snode > 0.0 && slon * snode < 0.0 && mean_abs_lat < 70.0 {
            return true;
        }
    }
    false
}

/// Single-polar-orbit-family `scancross`: true when any consecutive pair of
/// scans has `slon[j] ≥ 0 ∧ slon[j-1] < 0`; MERIS additionally checks
/// `slon[j] ≥ 0 ∧ elon[j] < 0` (spec.md §4.2).
fn orbit_scancross(g: &GranuleMeta, meris: bool) -> bool {
    for j in 1..g.slon.len() {
        if g.slon[j] >= 0.0 && g.slon[j - 1] < 0.0 {
            return true;
        }
        if meris && g.slon[j] >= 0.0 && g.elon.get(j).copied().unwrap_or(0.0) < 0.0 {
            return true;
        }
    }
    false
}

/// MODIS polar filter (spec.md §4.2): when the granule is non-polar
/// (`|clat[0]| < 75 ∧ |clat[last]| < 75`), ascending night (Aqua) / descending
/// day (Aqua) granules are dropped outright; Terra uses the inverse.
fn modis_polar_drop(g: &GranuleMeta, night: bool, is_aqua: bool) -> bool {
    let first = g.clat.first().copied().unwrap_or(0.0);
    let last = g.clat.last().copied().unwrap_or(0.0);
    let non_polar = first.abs() < 75.0 && last.abs() < 75.0;
    if !non_polar {
        return false;
    }
    let ascending = g.snode == Node::Ascending;
    if is_aqua {
        (night && ascending) || (!night && !ascending)
    } else {
        (night && !ascending) || (!night && ascending)
    }
}

/// One sensor's day/night threshold set, in hours, for `modis_table`.
struct Thresholds {
    /// `diffday_beg=0 ∧ scancross=0` drop threshold.
    low: f64,
    /// `diffday_beg=0 ∧ scancross=1` east/west split threshold.
    mid: f64,
    /// `diffday_end=+1` unconditional drop threshold.
    high: f64,
    /// `diffday_end=+1 ∧ scancross=0` sticky-drop threshold.
    sticky: f64,
}

const MODIS_A_DAY: Thresholds = Thresholds { low: 0.92, mid: 12.0, high: 2.42, sticky: 2.2 };
const MODIS_A_NIGHT: Thresholds = Thresholds { low: 12.0, mid: 12.76, high: 14.42, sticky: 14.2 };
const MODIS_T_DAY: Thresholds = Thresholds { low: 22.0, mid: 12.0, high: 23.0, sticky: 21.0 };
const MODIS_T_NIGHT: Thresholds = Thresholds { low: 10.1, mid: 12.0, high: 11.0, sticky: 9.25 };

/// Implements the MODIS-A/MODIS-T day/night temporal table (spec.md §4.2).
/// `beg_limit` is the `diffday_beg` cutoff below which the granule is
/// dropped outright (`-1` for the day tables, `-2` for MODIS-A night, per
/// the spec's "day-boundary offsets are ±2 instead of {-1,+2}" note).
/// Returns `(brk_scan, reason_code, sticky_out)`; `sticky_out` latches once
/// set and is threaded forward by the caller across the remaining granules
/// of the run (the `brk_scan[ifile-1]` dependency noted in spec.md §9).
fn modis_table(
    diffday_beg: i32,
    diffday_end: i32,
    ssec: f64,
    scancross: bool,
    prior_brk: Option<BrkScan>,
    sticky_in: bool,
    beg_limit: i32,
    t: &Thresholds,
) -> (BrkScan, Option<u8>, bool) {
    if sticky_in {
        return (BrkScan::Drop, Some(10), true);
    }
    if diffday_beg <= beg_limit {
        return (BrkScan::Drop, Some(3), false);
    }
    if diffday_end >= 2 {
        return (BrkScan::Drop, Some(4), false);
    }
    if diffday_beg == 0 {
        if !scancross && ssec < t.low * SECONDS_PER_HOUR {
            return (BrkScan::Drop, Some(5), false);
        }
        if scancross {
            return if ssec <= t.mid * SECONDS_PER_HOUR {
                (BrkScan::EastOnly, None, false)
            } else {
                (BrkScan::WestOnly, None, false)
            };
        }
    }
    if diffday_end == 1 {
        if !scancross {
            if prior_brk == Some(BrkScan::WestOnly) {
                return (BrkScan::Drop, Some(6), false);
            }
            if prior_brk == Some(BrkScan::EastOnly) {
                return (BrkScan::Drop, Some(9), false);
            }
        }
        if scancross {
            return (BrkScan::WestOnly, None, false);
        }
        if ssec > t.high * SECONDS_PER_HOUR {
            return (BrkScan::Drop, Some(7), false);
        }
        if ssec > t.sticky * SECONDS_PER_HOUR {
            return (BrkScan::Drop, Some(8), true);
        }
    }
    (BrkScan::All, None, false)
}

/// SeaWiFS/CZCS/OCM2/OCTS temporal table (spec.md §4.2): `p1hr`/`m1hr` are
/// the sensor's "after this many hours, west-only" / "before this many
/// hours, east-only" thresholds, in hours.
fn orbit_table(diffday_beg: i32, diffday_end: i32, ssec: f64, scancross: bool, p1hr: f64, m1hr: f64) -> (BrkScan, Option<u8>) {
    if diffday_beg < -1 || diffday_end > 1 {
        return (BrkScan::Drop, Some(3));
    }
    if diffday_beg == -1 {
        return if ssec > p1hr * SECONDS_PER_HOUR && scancross {
            (BrkScan::EastOnly, None)
        } else {
            (BrkScan::Drop, Some(5))
        };
    }
    if diffday_end == 1 {
        return if ssec < m1hr * SECONDS_PER_HOUR && scancross {
            (BrkScan::WestOnly, None)
        } else {
            (BrkScan::Drop, Some(7))
        };
    }
    if scancross {
        if ssec > p1hr * SECONDS_PER_HOUR {
            return (BrkScan::WestOnly, None);
        }
        if ssec < m1hr * SECONDS_PER_HOUR {
            return (BrkScan::EastOnly, None);
        }
    }
    (BrkScan::All, None)
}

/// MERIS temporal table: as `orbit_table`, but a granule that starts after
/// `p1hr` without crossing the dateline is kept whole, and any granule
/// landing in the next dataday is dropped unconditionally (spec.md §4.2).
fn meris_table(diffday_beg: i32, diffday_end: i32, ssec: f64, scancross: bool) -> (BrkScan, Option<u8>) {
    const P1HR: f64 = 19.0;
    const M1HR: f64 = 6.0;
    if diffday_beg == -1 && ssec > P1HR * SECONDS_PER_HOUR && !scancross {
        return (BrkScan::All, None);
    }
    if diffday_end == 1 {
        return (BrkScan::Drop, Some(7));
    }
    orbit_table(diffday_beg, diffday_end, ssec, scancross, P1HR, M1HR)
}

/// Per-granule classification output, mirrored 1:1 against `brk_scan[ifile]`
/// in the original source, plus the diagnostic `cde` reason code.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub brk_scan: BrkScan,
    pub scancross: bool,
    pub cde: Option<u8>,
}

/// Classifies every granule in `granules`, in input order, against the
/// configured dataday window `[proc_day_beg, proc_day_end]` (`YYYYDDD`).
///
/// The MODIS-A night table inspects the *previous* granule's resolved
/// `brk_scan` value and a sticky "already dropped" flag that latches once
/// set (`l2bin.c` reads `brk_scan[ifile-1]`), so this function takes the
/// whole input-ordered slice rather than classifying granules
/// independently.
///
/// Returns `Err(BinError::NoOutput)` for the single-granule SeaWiFS/MERIS/
/// OCTS edge case (spec.md §4.2): a lone non-crossing granule whose date
/// doesn't match a same-day processing window can never contribute, so the
/// run produces no output (exit 110) rather than a classification.
pub fn classify_all(
    granules: &[GranuleMeta],
    proc_day_beg: i32,
    proc_day_end: i32,
    night: bool,
    prodtype: Prodtype,
) -> Result<Vec<Classification>, BinError> {
    if prodtype == Prodtype::Regional {
        return Ok(granules
            .iter()
            .map(|_| Classification {
                brk_scan: BrkScan::All,
                scancross: false,
                cde: None,
            })
            .collect());
    }

    let mut out = Vec::with_capacity(granules.len());
    let mut prev_brk: Option<BrkScan> = None;
    let mut sticky = false;

    for g in granules {
        let scancross_val = match g.sensor {
            Sensor::ModisAqua | Sensor::ModisTerra => modis_scancross(g),
            Sensor::Meris => orbit_scancross(g, true),
            Sensor::SeaWifs | Sensor::Czcs | Sensor::Ocm2 | Sensor::Octs => orbit_scancross(g, false),
            Sensor::Other => false,
        };

        if granules.len() == 1
            && matches!(g.sensor, Sensor::SeaWifs | Sensor::Meris | Sensor::Octs)
            && !scancross_val
            && proc_day_beg == proc_day_end
            && g.date() != proc_day_beg
        {
            return Err(BinError::NoOutput);
        }

        // Positive when the granule starts after the window edge, negative
        // when it starts before: diffday_beg<0 means "before the window
        // opened", diffday_end>0 means "after the window closed".
        let diffday_beg = diffday(proc_day_beg, g.date());
        let diffday_end = diffday(proc_day_end, g.date());
        let ssec = g.start_sec();

        let (brk, cde, new_sticky) = match g.sensor {
            Sensor::ModisAqua | Sensor::ModisTerra => {
                let is_aqua = g.sensor == Sensor::ModisAqua;
                if modis_polar_drop(g, night, is_aqua) {
                    (BrkScan::Drop, Some(2), false)
                } else {
                    let (t, beg_limit) = match (is_aqua, night) {
                        (true, false) => (&MODIS_A_DAY, -1),
                        (true, true) => (&MODIS_A_NIGHT, -2),
                        (false, false) => (&MODIS_T_DAY, -1),
                        (false, true) => (&MODIS_T_NIGHT, -1),
                    };
                    modis_table(diffday_beg, diffday_end, ssec, scancross_val, prev_brk, sticky, beg_limit, t)
                }
            }
            Sensor::SeaWifs | Sensor::Czcs | Sensor::Ocm2 => {
                let (brk, cde) = orbit_table(diffday_beg, diffday_end, ssec, scancross_val, 18.0, 6.0);
                (brk, cde, false)
            }
            Sensor::Meris => {
                let (brk, cde) = meris_table(diffday_beg, diffday_end, ssec, scancross_val);
                (brk, cde, false)
            }
            Sensor::Octs => {
                let (brk, cde) = orbit_table(diffday_beg, diffday_end, ssec, scancross_val, 18.0 - 1.333, 6.0 - 1.333);
                (brk, cde, false)
            }
            Sensor::Other => (BrkScan::All, None, false),
        };

        sticky = sticky || new_sticky;
        prev_brk = Some(brk);
        out.push(Classification {
            brk_scan: brk,
            scancross: scancross_val,
            cde,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(sensor: Sensor, snode: Node, start_year: i32, start_day: i32, start_msec: i64) -> GranuleMeta {
        GranuleMeta {
            filename: "g".into(),
            sensor,
            snode,
            enode: snode,
            start_year,
            start_day,
            start_msec,
            num_scans: 2,
            samples_per_scan: 1,
            slon: vec![170.0, 170.0],
            elon: vec![-170.0, -170.0],
            clon: vec![180.0, 180.0],
            slat: vec![0.0, 0.0],
            elat: vec![0.0, 0.0],
            clat: vec![10.0, 12.0],
            tilt_ranges: vec![],
            flagnames: vec![],
        }
    }

    #[test]
    fn diffday_same_year() {
        assert_eq!(diffday(2020100, 2020105), 5);
        assert_eq!(diffday(2020105, 2020100), -5);
    }

    #[test]
    fn diffday_across_leap_year_boundary() {
        assert_eq!(diffday(2020366, 2021001), 1);
        assert_eq!(diffday(2021001, 2020366), -1);
    }

    #[test]
    fn isleap_table() {
        assert!(isleap(2020));
        assert!(!isleap(2021));
        assert!(!isleap(1900));
        assert!(isleap(2000));
    }

    #[test]
    fn orbit_scancross_detects_dateline_straddle() {
        let mut g = meta(Sensor::SeaWifs, Node::Ascending, 2020, 1, 0);
        g.slon = vec![-10.0, 10.0];
        assert!(orbit_scancross(&g, false));
        g.slon = vec![10.0, 20.0];
        assert!(!orbit_scancross(&g, false));
    }

    #[test]
    fn regional_prodtype_skips_classification() {
        let g = meta(Sensor::ModisAqua, Node::Ascending, 2020, 1, 0);
        let out = classify_all(&[g], 2020001, 2020001, false, Prodtype::Regional).unwrap();
        assert_eq!(out[0].brk_scan, BrkScan::All);
    }

    #[test]
    fn single_seawifs_granule_outside_window_is_no_output() {
        let g = meta(Sensor::SeaWifs, Node::Ascending, 2020, 5, 0);
        let mut g = g;
        g.slon = vec![10.0, 20.0];
        let err = classify_all(&[g], 2020001, 2020001, false, Prodtype::Day).unwrap_err();
        assert!(matches!(err, BinError::NoOutput));
    }

    #[test]
    fn unsupported_sensor_is_never_clipped() {
        let g = meta(Sensor::Other, Node::Ascending, 2020, 1, 0);
        let out = classify_all(&[g], 2020001, 2020001, false, Prodtype::Day).unwrap();
        assert_eq!(out[0].brk_scan, BrkScan::All);
    }

    #[test]
    fn modis_polar_granule_skips_polar_filter() {
        // |clat| = 80, 82: polar, so the non-polar ascending/night drop
        // must NOT apply; classification proceeds to the day/night table.
        let mut g = meta(Sensor::ModisAqua, Node::Ascending, 2020, 1, 0);
        g.clat = vec![80.0, 82.0];
        g.slon = vec![10.0, 20.0];
        g.elon = vec![30.0, 40.0];
        let out = classify_all(&[g.clone(), g], 2020001, 2020002, true, Prodtype::Day).unwrap();
        assert_ne!(out[0].cde, Some(2));
    }

    #[test]
    fn modis_a_day_drops_granules_before_window() {
        let mut g = meta(Sensor::ModisAqua, Node::Ascending, 2019, 364, 0);
        g.slon = vec![10.0, 20.0];
        g.elon = vec![30.0, 40.0];
        let out = classify_all(&[g.clone(), g], 2020001, 2020001, false, Prodtype::Day).unwrap();
        assert_eq!(out[0].brk_scan, BrkScan::Drop);
        assert_eq!(out[0].cde, Some(3));
    }
}
