//! Record fetchers for the coordinate-indexed data sources.
//!
//! All three fetchers read rows through a [`RowSource`] and decode them
//! using a typed schema that is built once from the header line.

use std::f64::consts::{LN_10, SQRT_2};

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::{common::noodles::RowSource, err::LookupError, variant::Variant};

pub mod assoc;
pub mod finemapped;
pub mod freq;

/// Type of the data behind an association or fine-mapping record.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    strum::Display,
    strum::EnumString,
)]
pub enum DataType {
    #[serde(rename = "GWAS")]
    #[strum(serialize = "GWAS")]
    Gwas,
    #[serde(rename = "eQTL")]
    #[strum(serialize = "eQTL")]
    Eqtl,
    #[serde(rename = "pQTL")]
    #[strum(serialize = "pQTL")]
    Pqtl,
    #[serde(rename = "sQTL")]
    #[strum(serialize = "sQTL")]
    Sqtl,
    #[serde(rename = "edQTL")]
    #[strum(serialize = "edQTL")]
    Edqtl,
    #[serde(rename = "metaboQTL")]
    #[strum(serialize = "metaboQTL")]
    MetaboQtl,
    #[default]
    #[serde(rename = "NA")]
    #[strum(serialize = "NA")]
    Na,
}

/// Phenocode as shown to clients.
///
/// Raw sQTL phenocodes collide across datasets and are prefixed with the
/// dataset id.
pub fn namespaced_phenocode(data_type: DataType, dataset: &str, phenocode: &str) -> String {
    match data_type {
        DataType::Sqtl => format!("{}:{}", dataset, phenocode),
        _ => phenocode.to_string(),
    }
}

/// Whether a raw TSV value stands for a missing value.
pub fn is_null(value: &str) -> bool {
    value == "NA" || value.is_empty()
}

/// Turn a VEP consequence term into its display form.
pub fn humanize(term: &str) -> String {
    term.replace("_variant", "").replace('_', " ")
}

/// Natural logarithm of the survival function of the standard normal.
fn normal_ln_sf(z: f64) -> f64 {
    let sf = 0.5 * erfc(z / SQRT_2);
    if sf > f64::MIN_POSITIVE {
        sf.ln()
    } else {
        // asymptotic expansion of Mills' ratio
        let z2 = z * z;
        let series = 1.0 - 1.0 / z2 + 3.0 / (z2 * z2) - 15.0 / (z2 * z2 * z2);
        -z2 / 2.0 - z.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln() + series.ln()
    }
}

/// Derive `-log10(p)` from effect size and standard error.
///
/// Uses the one-sided normal tail probability of `|beta| / se`; this is
/// inaccurate for studies analysed with a t-distribution.
pub fn mlog10p_from_beta_se(beta: f64, se: f64) -> Result<f64, LookupError> {
    if se.is_nan() || se <= 0.0 || !beta.is_finite() {
        return Err(LookupError::Data(format!(
            "cannot derive mlog10p from beta={} se={}",
            beta, se
        )));
    }
    Ok(-normal_ln_sf(beta.abs() / se) / LN_10)
}

/// Resolve column `name` in `header`.
pub(crate) fn column(header: &[String], name: &str) -> Result<usize, anyhow::Error> {
    header
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| anyhow::anyhow!("column {:?} missing from header {:?}", name, header))
}

/// Resolve optional column `name` in `header`.
pub(crate) fn optional_column(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h == name)
}

/// Split a raw row, checking that it has as many fields as the header.
pub(crate) fn split_row<'a>(row: &'a str, n_cols: usize) -> Result<Vec<&'a str>, LookupError> {
    let fields: Vec<&str> = row.split('\t').collect();
    if fields.len() < n_cols {
        return Err(LookupError::Data(format!(
            "row has {} fields, expected {}: {:?}",
            fields.len(),
            n_cols,
            row
        )));
    }
    Ok(fields)
}

/// Parse an optional float column value.
pub(crate) fn parse_f64(value: &str, name: &str) -> Result<Option<f64>, LookupError> {
    if is_null(value) {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|e| LookupError::Data(format!("invalid {} value {:?}: {}", name, value, e)))
}

/// Parse a required float column value.
pub(crate) fn require_f64(value: &str, name: &str) -> Result<f64, LookupError> {
    parse_f64(value, name)?
        .ok_or_else(|| LookupError::Data(format!("missing {} value", name)))
}

/// Build the variant described by a row, `None` if it is not a valid
/// canonical variant.
pub(crate) fn row_variant(
    chrom: &str,
    pos: &str,
    reference: &str,
    alternative: &str,
) -> Option<Variant> {
    let pos: u64 = pos.parse().ok()?;
    match Variant::new(chrom, pos, reference, alternative) {
        Ok(variant) => Some(variant),
        Err(e) => {
            tracing::trace!(
                "skipping row variant {}-{}-{}-{}: {}",
                chrom,
                pos,
                reference,
                alternative,
                e
            );
            None
        }
    }
}

/// Fetch the raw rows at the position of `variant`.
pub(crate) fn fetch_at(
    source: &dyn RowSource,
    variant: &Variant,
    label: &str,
) -> Result<Vec<String>, LookupError> {
    source
        .fetch(&variant.chrom, variant.pos, variant.pos)
        .map_err(|e| LookupError::Data(format!("{} fetch for {}: {}", label, variant, e)))
}

/// Fetch the raw rows in a 1-based inclusive range.
pub(crate) fn fetch_range(
    source: &dyn RowSource,
    chrom: &str,
    start: u64,
    end: u64,
    label: &str,
) -> Result<Vec<String>, LookupError> {
    source.fetch(chrom, start, end).map_err(|e| {
        LookupError::Data(format!("{} fetch for {}:{}-{}: {}", label, chrom, start, end, e))
    })
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn mlog10p_beta_two_se_half() -> Result<(), anyhow::Error> {
        let expected = -(3.167124183311998e-05f64).log10();
        assert_approx_eq!(f64, mlog10p_from_beta_se(2.0, 0.5)?, expected, epsilon = 1e-9);
        assert_approx_eq!(f64, mlog10p_from_beta_se(-2.0, 0.5)?, expected, epsilon = 1e-9);

        Ok(())
    }

    #[test]
    fn mlog10p_zero_beta() -> Result<(), anyhow::Error> {
        assert_approx_eq!(f64, mlog10p_from_beta_se(0.0, 1.0)?, 2f64.log10(), epsilon = 1e-12);

        Ok(())
    }

    #[test]
    fn mlog10p_far_tail_is_finite() -> Result<(), anyhow::Error> {
        let value = mlog10p_from_beta_se(50.0, 1.0)?;
        assert!(value.is_finite());
        assert!(value > 540.0 && value < 550.0, "{}", value);

        Ok(())
    }

    #[rstest]
    #[case(1.0, 0.0)]
    #[case(1.0, -1.0)]
    #[case(1.0, f64::NAN)]
    #[case(f64::INFINITY, 1.0)]
    fn mlog10p_invalid_inputs(#[case] beta: f64, #[case] se: f64) {
        assert!(matches!(mlog10p_from_beta_se(beta, se), Err(LookupError::Data(_))));
    }

    #[rstest]
    #[case("missense_variant", "missense")]
    #[case("splice_donor_variant", "splice donor")]
    #[case("5_prime_UTR_variant", "5 prime UTR")]
    #[case("intergenic_variant", "intergenic")]
    fn humanize_terms(#[case] term: &str, #[case] expected: &str) {
        assert_eq!(humanize(term), expected);
    }

    #[rstest]
    #[case("GWAS", DataType::Gwas)]
    #[case("sQTL", DataType::Sqtl)]
    #[case("metaboQTL", DataType::MetaboQtl)]
    #[case("NA", DataType::Na)]
    fn data_type_round_trip(
        #[case] raw: &str,
        #[case] expected: DataType,
    ) -> Result<(), anyhow::Error> {
        let parsed: DataType = raw.parse()?;
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), raw);
        assert_eq!(serde_json::to_string(&parsed)?, format!("\"{}\"", raw));

        Ok(())
    }

    #[test]
    fn sqtl_phenocode_is_namespaced() {
        assert_eq!(namespaced_phenocode(DataType::Sqtl, "QTD1", "ENSG1"), "QTD1:ENSG1");
        assert_eq!(namespaced_phenocode(DataType::Eqtl, "QTD1", "ENSG1"), "ENSG1");
    }
}
