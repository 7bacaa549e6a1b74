//! Canonical variant identity and parsing of free-text variant tokens.

use std::str::FromStr;

use crate::{common::CHROMS, err::LookupError};

/// A canonical `CHR-POS-REF-ALT` variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variant {
    /// One of `1`..`22`, `X`, `Y`, `XY`, `MT`.
    pub chrom: String,
    /// 1-based position.
    pub pos: u64,
    pub reference: String,
    pub alternative: String,
}

impl Variant {
    /// Construct a variant, validating all four fields.
    pub fn new(
        chrom: &str,
        pos: u64,
        reference: &str,
        alternative: &str,
    ) -> Result<Self, LookupError> {
        let chrom = normalize_chrom(chrom)?;
        if pos == 0 {
            return Err(LookupError::Parse("position must be a positive integer".into()));
        }
        let reference = normalize_allele(reference)?;
        let alternative = normalize_allele(alternative)?;
        Ok(Self {
            chrom,
            pos,
            reference,
            alternative,
        })
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.chrom, self.pos, self.reference, self.alternative
        )
    }
}

impl FromStr for Variant {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(['-', '_', ':', '|']).collect();
        let [chrom, pos, reference, alternative] = fields.as_slice() else {
            return Err(LookupError::Parse(
                "variant needs to contain four fields, supported separators are - _ : |".into(),
            ));
        };
        let pos: u64 = pos
            .parse()
            .map_err(|_| LookupError::Parse("position must be an integer".into()))?;
        Variant::new(chrom, pos, reference, alternative)
    }
}

/// Normalize a chromosome name to its canonical form.
///
/// One leading `0` and a `chr` prefix (any case) are removed; numeric
/// codes 23 to 26 map to X, Y, XY and MT.
fn normalize_chrom(raw: &str) -> Result<String, LookupError> {
    let err = || LookupError::Parse("supported chromosomes: 1-26,X,Y,XY,MT".into());
    let upper = raw.strip_prefix('0').unwrap_or(raw).to_ascii_uppercase();
    let name = upper.strip_prefix("CHR").unwrap_or(&upper);
    if name.chars().all(|c| c.is_ascii_digit()) && !name.is_empty() {
        return match name.parse::<usize>().map_err(|_| err())? {
            n @ 1..=26 => Ok(CHROMS[n - 1].to_string()),
            _ => Err(err()),
        };
    }
    CHROMS[22..]
        .iter()
        .find(|chrom| **chrom == name)
        .map(|chrom| chrom.to_string())
        .ok_or_else(err)
}

fn normalize_allele(raw: &str) -> Result<String, LookupError> {
    let allele = raw.to_ascii_uppercase();
    if allele.is_empty() || !allele.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'T')) {
        return Err(LookupError::Parse("only ACGT alleles are supported".into()));
    }
    Ok(allele)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::Variant;
    use crate::err::LookupError;

    #[rstest]
    #[case("1-55039974-G-T", "1-55039974-G-T")]
    #[case("chr1:55039974:G:T", "1-55039974-G-T")]
    #[case("CHR1_55039974_g_t", "1-55039974-G-T")]
    #[case("01|55039974|G|T", "1-55039974-G-T")]
    #[case("x-100-A-AC", "X-100-A-AC")]
    #[case("chrMT-73-A-G", "MT-73-A-G")]
    #[case("XY-5-A-G", "XY-5-A-G")]
    fn parse_valid(#[case] input: &str, #[case] expected: &str) -> Result<(), anyhow::Error> {
        let variant: Variant = input.parse()?;
        assert_eq!(variant.to_string(), expected);

        Ok(())
    }

    #[rstest]
    #[case("23-100-A-G", "X")]
    #[case("24-100-A-G", "Y")]
    #[case("25-100-A-G", "XY")]
    #[case("26-100-A-G", "MT")]
    #[case("chr23-100-A-G", "X")]
    fn parse_numeric_non_autosomes(
        #[case] input: &str,
        #[case] chrom: &str,
    ) -> Result<(), anyhow::Error> {
        assert_eq!(input.parse::<Variant>()?.chrom, chrom);

        Ok(())
    }

    #[rstest]
    #[case("1-100-A")]
    #[case("1-100-A-G-T")]
    #[case("1-100-A-N")]
    #[case("1-100-A-")]
    #[case("1-abc-A-G")]
    #[case("1-0-A-G")]
    #[case("1--5-A-G")]
    #[case("27-100-A-G")]
    #[case("0-100-A-G")]
    #[case("chrZ-100-A-G")]
    #[case("1-100-A-G ")]
    #[case(" 1-100-A-G")]
    #[case("rs123")]
    #[case("")]
    fn parse_invalid(#[case] input: &str) {
        assert!(matches!(input.parse::<Variant>(), Err(LookupError::Parse(_))));
    }

    #[rstest]
    #[case("1-55039974-G-T")]
    #[case("chr22:100:ac:GT")]
    #[case("25_1_A_C")]
    fn round_trip(#[case] input: &str) -> Result<(), anyhow::Error> {
        let variant: Variant = input.parse()?;
        let again: Variant = variant.to_string().parse()?;
        assert_eq!(again, variant);

        Ok(())
    }

    #[test]
    fn identity_from_tuple() -> Result<(), anyhow::Error> {
        let lhs: Variant = "chr1-5-A-G".parse()?;
        let rhs = Variant::new("1", 5, "a", "g")?;
        assert_eq!(lhs, rhs);

        Ok(())
    }
}
