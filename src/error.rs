use thiserror::Error;

/// Errors raised by the binning engine, grouped into the four families
/// described by the error handling design: configuration, semantic, I/O,
/// and the "no output produced" terminal state.
#[derive(Error, Debug)]
pub enum BinError {
    /// Missing/conflicting parameter, undefined resolution code, mixed
    /// product-list delimiters, unparseable minimum value. Fatal, exit 1.
    #[error("configuration error: {0}")]
    Config(String),

    /// Product name not present in a granule, quality product missing,
    /// unsupported sensor name. Fatal, exit -1.
    #[error("{granule}: {detail}")]
    Semantic { granule: String, detail: String },

    /// Propagated failure opening/reading/writing a file.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Every row-group produced zero filled bins; no output was written.
    /// Maps to exit code 110.
    #[error("no bins were filled; no output produced")]
    NoOutput,

    /// Per-bin accumulator growth could not be satisfied.
    #[error("allocation failed growing bin {bin}: {detail}")]
    Allocation { bin: i32, detail: String },
}

impl BinError {
    /// Process exit code this error maps to, per the CLI surface (§6/§7).
    pub fn exit_code(&self) -> i32 {
        match self {
            BinError::Config(_) => 1,
            BinError::Semantic { .. } => -1,
            BinError::Io(_) => -1,
            BinError::NoOutput => 110,
            BinError::Allocation { .. } => -1,
        }
    }
}
