//! Product-list parsing: turning the `l3bprod` parameter string into a list
//! of resolved product specifications the accumulator and aggregator work
//! against.
//!
//! Grounded on `l2bin.c`'s product-list parsing block: it detects which of
//! `:`, `,`, or ` ` the caller used as a delimiter (rejecting a mix of
//! them), expands the literal tokens `ALL`/`all` to every product a granule
//! carries, and supports three per-token forms: a bare product name, a
//! `FLAG_<bit>` pseudo-product that extracts a single l2_flags bit as a
//! 0/1 value, and a `numer/denom` ratio form. A trailing `;min` or `=min`
//! suffix on a numerator sets a minimum-value floor below which the pixel
//! is treated as missing for that product.

use crate::error::BinError;

/// One product-list entry, fully resolved against a granule's product
/// name table.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductSpec {
    /// A plain named product, e.g. `chlor_a`.
    Simple { name: String, min_value: Option<f32> },
    /// A pseudo-product extracting bit `bit` of `l2_flags` as 0.0/1.0.
    Flag { bit: u32 },
    /// `numer / denom`, with the ratio undefined (pixel dropped) whenever
    /// `denom <= 0`.
    Ratio {
        numer: String,
        denom: String,
        min_value: Option<f32>,
    },
}

impl ProductSpec {
    /// Human-readable output column name for this product.
    pub fn label(&self) -> String {
        match self {
            ProductSpec::Simple { name, .. } => name.clone(),
            ProductSpec::Flag { bit } => format!("FLAG_{bit}"),
            ProductSpec::Ratio { numer, denom, .. } => format!("{numer}/{denom}"),
        }
    }
}

/// Parses one token, e.g. `"chlor_a"`, `"FLAG_12"`, `"aot_865/aot_443"`,
/// `"chlor_a;0.01"`, `"chlor_a=0.01"`.
fn parse_token(token: &str) -> Result<ProductSpec, BinError> {
    let (body, min_value) = split_min_suffix(token)?;

    if let Some(bit_str) = body.strip_prefix("FLAG_") {
        let bit: u32 = bit_str
            .parse()
            .map_err(|_| BinError::Config(format!("bad FLAG_ product: {token:?}")))?;
        return Ok(ProductSpec::Flag { bit });
    }

    if let Some((numer, denom)) = body.split_once('/') {
        if numer.is_empty() || denom.is_empty() {
            return Err(BinError::Config(format!("malformed ratio product: {token:?}")));
        }
        return Ok(ProductSpec::Ratio {
            numer: numer.to_string(),
            denom: denom.to_string(),
            min_value,
        });
    }

    if body.is_empty() {
        return Err(BinError::Config("empty product name in l3bprod".to_string()));
    }

    Ok(ProductSpec::Simple {
        name: body.to_string(),
        min_value,
    })
}

/// Splits a trailing `;value` or `=value` minimum-value suffix off a token.
fn split_min_suffix(token: &str) -> Result<(&str, Option<f32>), BinError> {
    for sep in [';', '='] {
        if let Some(idx) = token.find(sep) {
            let (body, rest) = token.split_at(idx);
            let value_str = &rest[1..];
            let value: f32 = value_str
                .parse()
                .map_err(|_| BinError::Config(format!("bad minimum value in {token:?}")))?;
            return Ok((body, Some(value)));
        }
    }
    Ok((token, None))
}

/// Detects which delimiter a product-list string uses. `l2bin.c` rejects a
/// string mixing more than one of `:`, `,`, ` `.
fn detect_delimiter(list: &str) -> Result<char, BinError> {
    let candidates = [':', ',', ' '];
    let mut found: Option<char> = None;
    for c in candidates {
        if list.contains(c) {
            match found {
                None => found = Some(c),
                Some(prev) if prev != c => {
                    return Err(BinError::Config(format!(
                        "product list mixes delimiters {prev:?} and {c:?}: {list:?}"
                    )))
                }
                _ => {}
            }
        }
    }
    Ok(found.unwrap_or(','))
}

/// Parses the full `l3bprod` parameter. `ALL`/`all` (as a standalone token)
/// expands to every product name in `available`, preserving on-disk order.
pub fn parse_product_list(list: &str, available: &[String]) -> Result<Vec<ProductSpec>, BinError> {
    let delim = detect_delimiter(list)?;
    let tokens: Vec<&str> = list
        .split(delim)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Err(BinError::Config("empty product list".to_string()));
    }

    if tokens.len() == 1 && (tokens[0] == "ALL" || tokens[0] == "all") {
        return available
            .iter()
            .map(|name| {
                Ok(ProductSpec::Simple {
                    name: name.clone(),
                    min_value: None,
                })
            })
            .collect();
    }

    tokens.iter().map(|t| parse_token(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comma_list() {
        let specs = parse_product_list("chlor_a,Kd_490", &[]).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].label(), "chlor_a");
        assert_eq!(specs[1].label(), "Kd_490");
    }

    #[test]
    fn parses_colon_delimited_list() {
        let specs = parse_product_list("chlor_a:Kd_490", &[]).unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn rejects_mixed_delimiters() {
        let err = parse_product_list("chlor_a,Kd_490:nflh", &[]).unwrap_err();
        assert!(matches!(err, BinError::Config(_)));
    }

    #[test]
    fn expands_all_to_available_products() {
        let available = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let specs = parse_product_list("ALL", &available).unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[2].label(), "c");
    }

    #[test]
    fn parses_flag_pseudo_product() {
        let specs = parse_product_list("FLAG_5", &[]).unwrap();
        assert_eq!(specs[0], ProductSpec::Flag { bit: 5 });
    }

    #[test]
    fn parses_ratio_product() {
        let specs = parse_product_list("aot_865/aot_443", &[]).unwrap();
        match &specs[0] {
            ProductSpec::Ratio { numer, denom, min_value } => {
                assert_eq!(numer, "aot_865");
                assert_eq!(denom, "aot_443");
                assert_eq!(*min_value, None);
            }
            other => panic!("expected ratio, got {other:?}"),
        }
    }

    #[test]
    fn parses_minimum_value_suffix_both_separators() {
        let specs = parse_product_list("chlor_a;0.01,Kd_490=0.02", &[]).unwrap();
        match &specs[0] {
            ProductSpec::Simple { name, min_value } => {
                assert_eq!(name, "chlor_a");
                assert_eq!(*min_value, Some(0.01));
            }
            other => panic!("expected simple, got {other:?}"),
        }
        match &specs[1] {
            ProductSpec::Simple { name, min_value } => {
                assert_eq!(name, "Kd_490");
                assert_eq!(*min_value, Some(0.02));
            }
            other => panic!("expected simple, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_ratio() {
        let err = parse_product_list("/denom_only", &[]).unwrap_err();
        assert!(matches!(err, BinError::Config(_)));
    }
}
