//! Command-line entry point: parses arguments, assembles a `Config`, opens
//! the input granules, and runs the binning pipeline.
//!
//! Grounded on procDARN's `src/bin/grid.rs`: a `clap::Parser` derive struct
//! for the CLI surface, with a parameter file accepted as an alternative
//! (here, `--parfile`) to individually-named flags, and the binary
//! initializing logging while the library stays logger-agnostic.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use oceanbin::config::{merge_tokens, parse_parfile, Config};
use oceanbin::error::BinError;
use oceanbin::flags::{FlagCompiler, StaticFlagCompiler};
use oceanbin::granule::L2Reader;

#[derive(Parser, Debug)]
#[command(name = "l2bin", about = "Bin Level-2 ocean-color granules onto an equal-area Level-3 grid")]
struct Args {
    /// Parameter file containing key=value tokens. CLI flags below
    /// override values it sets.
    #[arg(long)]
    parfile: Option<PathBuf>,

    /// Comma-separated list of input L2 granule paths.
    #[arg(long)]
    infile: Option<String>,

    /// Output container path.
    #[arg(long)]
    ofile: Option<String>,

    /// Grid resolution code: Q, H, 1, 2, 4, 9, 36.
    #[arg(long)]
    resolve: Option<String>,

    /// Comma/colon/space-delimited product list, or ALL.
    #[arg(long)]
    l3bprod: Option<String>,

    /// day or regional.
    #[arg(long)]
    prodtype: Option<String>,

    /// mean, median:<product>, or midaverage:<product>.
    #[arg(long)]
    average: Option<String>,

    /// Comma-separated flag names to require/forbid (prefix `~` to require).
    #[arg(long)]
    flaguse: Option<String>,

    /// Maximum quality value eligible for binning.
    #[arg(long)]
    qual_max: Option<String>,

    /// L2 product supplying each pixel's quality indicator.
    #[arg(long)]
    qual_prod: Option<String>,

    /// Minimum surviving observation count per bin.
    #[arg(long)]
    minobs: Option<String>,

    /// Number of bin rows processed per row-group.
    #[arg(long)]
    row_group: Option<String>,

    /// Earliest dataday to include, as YYYYDDD.
    #[arg(long)]
    sday: Option<String>,

    /// Latest dataday to include, as YYYYDDD.
    #[arg(long)]
    eday: Option<String>,

    /// Bin the night pass (0/1).
    #[arg(long)]
    night: Option<String>,

    #[arg(long)]
    lonwest: Option<String>,
    #[arg(long)]
    loneast: Option<String>,
    #[arg(long)]
    latsouth: Option<String>,
    #[arg(long)]
    latnorth: Option<String>,

    #[arg(long)]
    pversion: Option<String>,

    #[arg(long)]
    dcinfo: Option<String>,

    #[arg(long)]
    verbose: Option<String>,
}

impl Args {
    fn as_tokens(&self) -> HashMap<String, String> {
        let mut tokens = HashMap::new();
        macro_rules! put {
            ($key:literal, $field:expr) => {
                if let Some(v) = &$field {
                    tokens.insert($key.to_string(), v.clone());
                }
            };
        }
        put!("infile", self.infile);
        put!("ofile", self.ofile);
        put!("resolve", self.resolve);
        put!("l3bprod", self.l3bprod);
        put!("prodtype", self.prodtype);
        put!("average", self.average);
        put!("flaguse", self.flaguse);
        put!("qual_max", self.qual_max);
        put!("qual_prod", self.qual_prod);
        put!("minobs", self.minobs);
        put!("row_group", self.row_group);
        put!("sday", self.sday);
        put!("eday", self.eday);
        put!("night", self.night);
        put!("lonwest", self.lonwest);
        put!("loneast", self.loneast);
        put!("latsouth", self.latsouth);
        put!("latnorth", self.latnorth);
        put!("pversion", self.pversion);
        put!("dcinfo", self.dcinfo);
        put!("verbose", self.verbose);
        tokens
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code().rem_euclid(256) as u8)
        }
    }
}

fn run() -> Result<(), BinError> {
    let args = Args::parse();

    let parfile_tokens = match &args.parfile {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            parse_parfile(&text)?
        }
        None => HashMap::new(),
    };
    let tokens = merge_tokens(parfile_tokens, args.as_tokens());

    // Real granule opening (HDF/netCDF) lives behind the `L2Reader` trait
    // and is an external collaborator's concern this crate does not
    // implement. Report that plainly rather than silently running with an
    // empty reader set, which would otherwise produce the same exit-110
    // "no output" outcome a genuinely empty input list does.
    warn!("no L2 reader backend is wired into this binary; running with zero input granules");
    let readers: Vec<NullReader> = Vec::new();
    let available_products: Vec<String> = Vec::new();

    let config = Config::from_tokens(&tokens, &available_products)?;
    let compiler = StaticFlagCompiler::new(Vec::new());
    let flag_mask = compiler.compile(&config.flaguse)?;

    let outfile = fs::File::create(&config.ofile)?;
    let result = oceanbin::pipeline::run(&config, readers, flag_mask, outfile);
    if let Err(BinError::NoOutput) = &result {
        // Drop the just-created (empty) output file rather than leaving a
        // zero-byte partial artifact behind on the exit-110 path (spec.md
        // §7).
        let _ = fs::remove_file(&config.ofile);
    }
    result
}

/// Placeholder reader type satisfying `L2Reader` so this binary type-checks
/// without a concrete HDF/netCDF backend; always yields zero granules.
struct NullReader;

impl L2Reader for NullReader {
    fn meta(&self) -> &oceanbin::granule::GranuleMeta {
        unreachable!("NullReader is never instantiated")
    }

    fn product_names(&self) -> &[String] {
        &[]
    }

    fn read_scan(&mut self, _index: usize) -> Result<Option<oceanbin::granule::ScanRecord>, BinError> {
        Ok(None)
    }
}
