//! Run configuration: the resolved set of parameters the pipeline needs,
//! built from a parameter file and/or CLI overrides.
//!
//! Grounded on `l2bin.c`'s parameter file reader, which accepts a flat
//! `key=value` token stream (one per line, or space/newline separated) and
//! the equivalent `--key value`/`--key=value` forms on the command line,
//! with the command line taking precedence over the parameter file.

use std::collections::HashMap;

use crate::aggregate::AveragingMode;
use crate::dataday::Prodtype;
use crate::error::BinError;
use crate::grid::Resolution;
use crate::product::{parse_product_list, ProductSpec};

/// Fully resolved run configuration, independent of how it was supplied.
#[derive(Debug, Clone)]
pub struct Config {
    pub infiles: Vec<String>,
    pub ofile: String,
    pub resolution: Resolution,
    pub products: Vec<ProductSpec>,
    pub averaging_mode: AveragingMode,
    pub flaguse: String,
    pub qual_max: u8,
    pub minobs: u32,
    pub row_group: Option<usize>,
    pub n_allocperbin: usize,
    /// Day-vs-regional product type (spec.md §3). Regional runs skip
    /// dataday classification entirely.
    pub prodtype: Prodtype,
    /// Inclusive dataday processing window, `YYYYDDD`.
    pub sday: i32,
    pub eday: i32,
    /// Whether this run bins the night pass (affects the MODIS day/night
    /// table selection in `dataday::classify_all`).
    pub night: bool,
    /// L2 product name used as each pixel's quality indicator; `None` means
    /// every pixel is treated as quality 0.
    pub qual_prod: Option<String>,
    pub lonwest: Option<f64>,
    pub loneast: Option<f64>,
    pub latsouth: Option<f64>,
    pub latnorth: Option<f64>,
    pub pversion: Option<String>,
    pub dcinfo: bool,
    pub verbose: bool,
}

impl Config {
    /// Builds a `Config` from a flat `key=value` token map, resolving
    /// `product_list` against `available_products` (the union of product
    /// names across all input granules, used only to expand `ALL`/`all`).
    pub fn from_tokens(
        tokens: &HashMap<String, String>,
        available_products: &[String],
    ) -> Result<Config, BinError> {
        let get = |key: &str| -> Result<&String, BinError> {
            tokens
                .get(key)
                .ok_or_else(|| BinError::Config(format!("missing required parameter: {key}")))
        };

        let infiles: Vec<String> = get("infile")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if infiles.is_empty() {
            return Err(BinError::Config("infile parameter is empty".to_string()));
        }

        let ofile = get("ofile")?.clone();

        let resolution = Resolution::parse(tokens.get("resolve").map(String::as_str).unwrap_or("9"))?;

        let product_list = get("l3bprod")?;
        let products = parse_product_list(product_list, available_products)?;

        let prodtype = match tokens.get("prodtype").map(String::as_str).unwrap_or("day") {
            "day" => Prodtype::Day,
            "regional" => Prodtype::Regional,
            other => {
                return Err(BinError::Config(format!(
                    "unknown prodtype {other:?}, expected day/regional"
                )))
            }
        };

        let averaging_mode = parse_average_token(tokens.get("average"))?;

        let flaguse = tokens.get("flaguse").cloned().unwrap_or_default();

        let qual_max = match tokens.get("qual_max") {
            Some(s) => s
                .parse()
                .map_err(|_| BinError::Config(format!("bad qual_max: {s:?}")))?,
            None => 2,
        };

        let minobs = match tokens.get("minobs") {
            Some(s) => s
                .parse()
                .map_err(|_| BinError::Config(format!("bad minobs: {s:?}")))?,
            None => 0,
        };

        let row_group = match tokens.get("row_group") {
            Some(s) => Some(
                s.parse()
                    .map_err(|_| BinError::Config(format!("bad row_group: {s:?}")))?,
            ),
            None => None,
        };

        let n_allocperbin = match tokens.get("n_allocperbin") {
            Some(s) => s
                .parse()
                .map_err(|_| BinError::Config(format!("bad n_allocperbin: {s:?}")))?,
            None => crate::accumulator::DEFAULT_ALLOC_PER_BIN,
        };

        let sday = parse_dataday_token(get("sday")?)?;
        let eday = parse_dataday_token(get("eday")?)?;

        let night = match tokens.get("night").map(String::as_str) {
            Some("1") => true,
            Some("0") | None => false,
            Some(other) => return Err(BinError::Config(format!("bad night (expected 0/1): {other:?}"))),
        };

        let qual_prod = tokens.get("qual_prod").cloned();

        let lonwest = parse_optional_f64(tokens.get("lonwest"), "lonwest")?;
        let loneast = parse_optional_f64(tokens.get("loneast"), "loneast")?;
        let latsouth = parse_optional_f64(tokens.get("latsouth"), "latsouth")?;
        let latnorth = parse_optional_f64(tokens.get("latnorth"), "latnorth")?;

        let pversion = tokens.get("pversion").cloned();

        let dcinfo = match tokens.get("dcinfo").map(String::as_str) {
            Some("1") => true,
            Some("0") | None => false,
            Some(other) => return Err(BinError::Config(format!("bad dcinfo (expected 0/1): {other:?}"))),
        };

        let verbose = match tokens.get("verbose").map(String::as_str) {
            Some("1") => true,
            Some("0") | None => false,
            Some(other) => return Err(BinError::Config(format!("bad verbose (expected 0/1): {other:?}"))),
        };

        Ok(Config {
            infiles,
            ofile,
            resolution,
            products,
            averaging_mode,
            flaguse,
            qual_max,
            minobs,
            row_group,
            n_allocperbin,
            prodtype,
            sday,
            eday,
            night,
            qual_prod,
            lonwest,
            loneast,
            latsouth,
            latnorth,
            pversion,
            dcinfo,
            verbose,
        })
    }
}

/// Parses the `average` key: `mean`, or `median:<product>`/`midaverage:<product>`
/// naming the designated product whose values decide which observations
/// survive the collapse (spec.md §4.6).
fn parse_average_token(token: Option<&String>) -> Result<AveragingMode, BinError> {
    let Some(s) = token else { return Ok(AveragingMode::Mean) };
    match s.split_once(':') {
        Some(("median", prod)) if !prod.is_empty() => Ok(AveragingMode::Median(prod.to_string())),
        Some(("midaverage", prod)) if !prod.is_empty() => Ok(AveragingMode::Midaverage(prod.to_string())),
        _ if s == "mean" => Ok(AveragingMode::Mean),
        _ => Err(BinError::Config(format!(
            "unknown average {s:?}, expected mean, median:<product>, or midaverage:<product>"
        ))),
    }
}

/// Parses a `YYYYDDD` dataday parameter, matching `l2bin.c`'s `sday`/`eday`.
fn parse_dataday_token(s: &str) -> Result<i32, BinError> {
    let value: i32 = s
        .parse()
        .map_err(|_| BinError::Config(format!("bad date (expected YYYYDDD): {s:?}")))?;
    let day = value % 1000;
    if !(1..=366).contains(&day) {
        return Err(BinError::Config(format!("bad date (expected YYYYDDD): {s:?}")));
    }
    Ok(value)
}

fn parse_optional_f64(token: Option<&String>, key: &str) -> Result<Option<f64>, BinError> {
    match token {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| BinError::Config(format!("bad {key}: {s:?}"))),
        None => Ok(None),
    }
}

/// Parses a parameter-file's text into a flat `key=value` token map, one
/// assignment per non-blank, non-comment line. `#` introduces a
/// line-comment, matching `l2bin.c`'s parameter file grammar.
pub fn parse_parfile(text: &str) -> Result<HashMap<String, String>, BinError> {
    let mut tokens = HashMap::new();
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            BinError::Config(format!("parfile line {}: expected key=value", lineno + 1))
        })?;
        tokens.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(tokens)
}

/// Merges CLI-supplied overrides over parfile-supplied defaults, CLI wins.
pub fn merge_tokens(parfile: HashMap<String, String>, cli: HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = parfile;
    merged.extend(cli);
    merged
}
