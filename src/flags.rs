//! L2 flag mask compilation: turning a list of flag names with include/
//! exclude polarity into the bitmasks the pipeline tests each pixel's
//! `l2_flags` word against.
//!
//! Grounded on `l2bin.c`'s `setupflags()`, which walks a comma-separated
//! flag name list, looks each one up against the sensor's flag name table,
//! and ORs its bit into either a "required" mask or a "forbidden" mask
//! depending on a leading `~`.

use crate::error::BinError;

/// A compiled flag test: a pixel is kept only if every bit in `required` is
/// set and no bit in `forbidden` is set, i.e.
/// `(l2_flags & required) == required && (l2_flags & forbidden) == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagMask {
    pub required: u32,
    pub forbidden: u32,
}

impl FlagMask {
    pub fn test(&self, l2_flags: u32) -> bool {
        (l2_flags & self.required) == self.required && (l2_flags & self.forbidden) == 0
    }
}

/// Resolves flag names to bit positions. A real L2 file advertises its own
/// flag name table (order varies by sensor/processing version); tests
/// supply a fixed table.
pub trait FlagCompiler {
    fn bit_of(&self, flag_name: &str) -> Option<u32>;

    /// Compiles a flaguse expression like `"LAND,HIGLINT,~CLDICE"` into a
    /// `FlagMask`. A bare name is a forbidden flag (the pixel is dropped if
    /// the bit is set); a leading `~` marks a required flag (the pixel is
    /// dropped unless the bit is set).
    fn compile(&self, flaguse: &str) -> Result<FlagMask, BinError> {
        let mut mask = FlagMask::default();
        for token in flaguse.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (require, name) = match token.strip_prefix('~') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let bit = self.bit_of(name).ok_or_else(|| {
                BinError::Config(format!("unknown flag name in flaguse: {name:?}"))
            })?;
            if require {
                mask.required |= 1 << bit;
            } else {
                mask.forbidden |= 1 << bit;
            }
        }
        Ok(mask)
    }
}

/// Flag compiler backed by a fixed, caller-supplied name-to-bit table,
/// analogous to a sensor's on-disk flag name array.
pub struct StaticFlagCompiler {
    names: Vec<String>,
}

impl StaticFlagCompiler {
    /// `names[i]` is the flag occupying bit `i`, in the order the L2 file
    /// lists them (matching `l2_flags` bit layout, e.g. SeaDAS's
    /// `ATMFAIL`, `LAND`, `PRODFAIL`, ... table).
    pub fn new(names: Vec<String>) -> StaticFlagCompiler {
        StaticFlagCompiler { names }
    }
}

impl FlagCompiler for StaticFlagCompiler {
    fn bit_of(&self, flag_name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(flag_name))
            .map(|p| p as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> StaticFlagCompiler {
        StaticFlagCompiler::new(
            ["ATMFAIL", "LAND", "PRODWARN", "HIGLINT", "CLDICE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn compiles_required_and_forbidden_bits() {
        let c = compiler();
        let mask = c.compile("LAND,~CLDICE").unwrap();
        assert_eq!(mask.forbidden, 1 << 1);
        assert_eq!(mask.required, 1 << 4);
    }

    #[test]
    fn test_honours_both_masks() {
        let mask = FlagMask {
            required: 1 << 1,
            forbidden: 1 << 4,
        };
        assert!(mask.test(0b0010));
        assert!(!mask.test(0b0000));
        assert!(!mask.test(0b10010));
    }

    #[test]
    fn unknown_flag_name_is_a_config_error() {
        let c = compiler();
        let err = c.compile("NOPE").unwrap_err();
        assert!(matches!(err, BinError::Config(_)));
    }

    #[test]
    fn empty_flaguse_matches_every_pixel() {
        let c = compiler();
        let mask = c.compile("").unwrap();
        assert!(mask.test(0));
        assert!(mask.test(0xffff_ffff));
    }
}
