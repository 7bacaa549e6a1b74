//! Static gene symbol to genomic range table.

use std::{collections::HashMap, io::BufRead, path::Path, time::Instant};

use crate::{common::open_read_maybe_gz, err::LookupError};

/// Genomic range of a gene, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRange {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

/// Gene ranges keyed by upper-case gene symbol.
#[derive(Debug, Default)]
pub struct GeneRanges {
    ranges: HashMap<String, GeneRange>,
}

impl GeneRanges {
    /// Load the tab-separated `gene_symbol, chrom, start, end` table at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("Loading gene ranges from {:?}...", path.as_ref());
        let before = Instant::now();
        let reader = open_read_maybe_gz(path.as_ref())?;
        let result = Self::from_lines(reader.lines())?;
        tracing::info!(
            "...done loading {} gene ranges in {:?}",
            result.ranges.len(),
            before.elapsed()
        );
        Ok(result)
    }

    pub(crate) fn from_lines<I>(lines: I) -> Result<Self, anyhow::Error>
    where
        I: Iterator<Item = std::io::Result<String>>,
    {
        let mut ranges = HashMap::new();
        for (no, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let [symbol, chrom, start, end, ..] = fields.as_slice() else {
                anyhow::bail!("line {} of gene table has too few fields: {:?}", no + 1, line);
            };
            let parse = |s: &str| {
                s.parse::<u64>().map_err(|e| {
                    anyhow::anyhow!("invalid coordinate {:?} in line {}: {}", s, no + 1, e)
                })
            };
            ranges.insert(
                symbol.to_uppercase(),
                GeneRange {
                    chrom: chrom.to_string(),
                    start: parse(start)?,
                    end: parse(end)?,
                },
            );
        }
        Ok(Self { ranges })
    }

    /// Range of gene `symbol`, case-insensitively.
    pub fn get(&self, symbol: &str) -> Result<&GeneRange, LookupError> {
        self.ranges
            .get(&symbol.to_uppercase())
            .ok_or_else(|| LookupError::GeneNotFound(symbol.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::{GeneRange, GeneRanges};
    use crate::err::LookupError;

    pub const GENE_TABLE: &str = "PCSK9\t1\t55039548\t55064852\nAPOE\t19\t44905754\t44909393\nEMPTY1\t2\t1000\t2000\n";

    #[test]
    fn load_and_get() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("genes.tsv");
        std::fs::write(&path, GENE_TABLE)?;

        let genes = GeneRanges::load(&path)?;
        assert_eq!(
            genes.get("pcsk9")?,
            &GeneRange {
                chrom: "1".into(),
                start: 55039548,
                end: 55064852
            }
        );
        assert_eq!(
            genes.get("FOO").unwrap_err(),
            LookupError::GeneNotFound("FOO".into())
        );

        Ok(())
    }

    #[test]
    fn invalid_coordinate() {
        let lines = vec![Ok("GENE\t1\tabc\t100".to_string())];
        assert!(GeneRanges::from_lines(lines.into_iter()).is_err());
    }
}
