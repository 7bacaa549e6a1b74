//! Fine-mapping results (credible set members).

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::{
    column, fetch_at, fetch_range, namespaced_phenocode, parse_f64, require_f64, row_variant,
    split_row, DataType,
};
use crate::{common::noodles::RowSource, err::LookupError, variant::Variant};

/// One fine-mapping record.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FinemappedRecord {
    pub resource: String,
    pub dataset: String,
    pub data_type: DataType,
    pub phenocode: String,
    pub mlog10p: Option<f64>,
    pub beta: Option<f64>,
    pub se: Option<f64>,
    /// Posterior inclusion probability.
    pub pip: f64,
    pub cs_size: u64,
    pub cs_min_r2: Option<f64>,
}

/// Fine-mapping records of one variant.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct FinemappedResults {
    pub data: Vec<FinemappedRecord>,
    /// Observed resources, in configuration order.
    pub resources: Vec<String>,
}

#[derive(Debug, Clone)]
struct FinemappedSchema {
    n_cols: usize,
    resource: usize,
    dataset: usize,
    data_type: usize,
    phenocode: usize,
    chr: usize,
    pos: usize,
    reference: usize,
    alternative: usize,
    mlog10p: usize,
    beta: usize,
    se: usize,
    pip: usize,
    cs_size: usize,
    cs_min_r2: usize,
}

impl FinemappedSchema {
    fn new(header: &[String]) -> Result<Self, anyhow::Error> {
        Ok(Self {
            n_cols: header.len(),
            resource: column(header, "resource")?,
            dataset: column(header, "dataset")?,
            data_type: column(header, "data_type")?,
            phenocode: column(header, "trait")?,
            chr: column(header, "chr")?,
            pos: column(header, "pos")?,
            reference: column(header, "ref")?,
            alternative: column(header, "alt")?,
            mlog10p: column(header, "mlog10p")?,
            beta: column(header, "beta")?,
            se: column(header, "se")?,
            pip: column(header, "pip")?,
            cs_size: column(header, "cs_size")?,
            cs_min_r2: column(header, "cs_min_r2")?,
        })
    }

    fn variant(&self, fields: &[&str]) -> Option<Variant> {
        row_variant(
            fields[self.chr],
            fields[self.pos],
            fields[self.reference],
            fields[self.alternative],
        )
    }

    fn decode(&self, fields: &[&str], variant: &Variant) -> Result<FinemappedRecord, LookupError> {
        let dataset = fields[self.dataset];
        let raw_data_type = fields[self.data_type];
        let data_type: DataType = raw_data_type.parse().map_err(|_| {
            LookupError::Data(format!(
                "unknown data type {:?} for {}",
                raw_data_type, variant
            ))
        })?;
        let cs_size = fields[self.cs_size].parse::<u64>().map_err(|e| {
            LookupError::Data(format!(
                "invalid cs_size {:?} for {}: {}",
                fields[self.cs_size], variant, e
            ))
        })?;
        Ok(FinemappedRecord {
            resource: fields[self.resource].to_string(),
            dataset: dataset.to_string(),
            data_type,
            phenocode: namespaced_phenocode(data_type, dataset, fields[self.phenocode]),
            mlog10p: parse_f64(fields[self.mlog10p], "mlog10p")?,
            beta: parse_f64(fields[self.beta], "beta")?,
            se: parse_f64(fields[self.se], "se")?,
            pip: require_f64(fields[self.pip], "pip")?,
            cs_size,
            cs_min_r2: parse_f64(fields[self.cs_min_r2], "cs_min_r2")?,
        })
    }
}

/// Fetcher for fine-mapping records.
pub struct FinemappedFetcher {
    source: Box<dyn RowSource>,
    schema: FinemappedSchema,
    /// Configured resources, in configuration order.
    resources: Vec<String>,
}

impl std::fmt::Debug for FinemappedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinemappedFetcher")
            .field("schema", &self.schema)
            .field("resources", &self.resources)
            .finish()
    }
}

impl FinemappedFetcher {
    pub fn new(source: Box<dyn RowSource>, resources: &[String]) -> Result<Self, anyhow::Error> {
        let schema = FinemappedSchema::new(source.header())?;
        Ok(Self {
            source,
            schema,
            resources: resources.to_vec(),
        })
    }

    fn records<F>(
        &self,
        rows: &[String],
        mut keep: F,
    ) -> Result<Vec<(Variant, FinemappedRecord)>, LookupError>
    where
        F: FnMut(&Variant) -> bool,
    {
        let mut result = Vec::new();
        for row in rows {
            let fields = split_row(row, self.schema.n_cols)?;
            let Some(variant) = self.schema.variant(&fields) else {
                continue;
            };
            let resource = fields[self.schema.resource];
            if !keep(&variant) || !self.resources.iter().any(|r| r == resource) {
                continue;
            }
            let record = self.schema.decode(&fields, &variant)?;
            result.push((variant, record));
        }
        Ok(result)
    }

    fn assemble(&self, mut data: Vec<FinemappedRecord>) -> FinemappedResults {
        data.sort_by(|lhs, rhs| {
            rhs.pip
                .partial_cmp(&lhs.pip)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let observed: HashSet<&str> = data.iter().map(|r| r.resource.as_str()).collect();
        let mut resources: Vec<String> = Vec::new();
        for resource in &self.resources {
            if observed.contains(resource.as_str()) && !resources.contains(resource) {
                resources.push(resource.clone());
            }
        }
        FinemappedResults { data, resources }
    }

    /// Fine-mapping records of `variant`, sorted by descending PIP.
    pub fn fetch(&self, variant: &Variant) -> Result<FinemappedResults, LookupError> {
        let rows = fetch_at(self.source.as_ref(), variant, "finemapped")?;
        let data = self
            .records(&rows, |v| v == variant)?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        Ok(self.assemble(data))
    }

    /// Fine-mapping results of all variants in a 1-based, inclusive range,
    /// keyed by canonical variant id.
    pub fn fetch_range(
        &self,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> Result<IndexMap<String, FinemappedResults>, LookupError> {
        let rows = fetch_range(self.source.as_ref(), chrom, start, end, "finemapped")?;
        let mut by_variant: IndexMap<Variant, Vec<FinemappedRecord>> = IndexMap::new();
        for (variant, record) in self.records(&rows, |_| true)? {
            by_variant.entry(variant).or_default().push(record);
        }
        Ok(by_variant
            .into_iter()
            .map(|(variant, data)| (variant.to_string(), self.assemble(data)))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::FinemappedFetcher;
    use crate::{common::noodles::MemorySource, err::LookupError, variant::Variant};

    pub const HEADER: &str = "#resource\tdataset\tdata_type\ttrait\tchr\tpos\tref\talt\tmlog10p\tbeta\tse\tpip\tcs_size\tcs_min_r2";

    pub const ROWS: &[&str] = &[
        "FinnGen\tFinnGen_R11\tGWAS\tT2D\t1\t55039974\tG\tT\t12.5\t-0.1\t0.01\t0.2\t5\t0.8",
        "UKBB\tUKBB_2023\tGWAS\tLDL\t1\t55039974\tG\tT\tNA\tNA\tNA\t0.9\t1\tNA",
        "eQTL_Catalogue_R6\tQTD000001\tsQTL\tENSG1\t1\t55039974\tG\tT\t3\t0.2\t0.05\t0.5\t10\t0.5",
        "Other\tOther_1\tGWAS\tX\t1\t55039974\tG\tT\t3\t0.2\t0.05\t0.99\t1\t1",
        "FinnGen\tFinnGen_R11\tGWAS\tT2D\t1\t55040100\tA\tG\t12.5\t0.1\t0.01\t0.7\t2\t0.9",
    ];

    pub fn resources() -> Vec<String> {
        vec!["UKBB".into(), "FinnGen".into(), "eQTL_Catalogue_R6".into(), "GTEx".into()]
    }

    pub fn build(rows: &[&str]) -> FinemappedFetcher {
        let mut lines = vec![HEADER];
        lines.extend_from_slice(rows);
        FinemappedFetcher::new(
            Box::new(MemorySource::new(&lines, "chr", "pos")),
            &resources(),
        )
        .expect("invalid header")
    }

    #[fixture]
    pub fn fetcher() -> FinemappedFetcher {
        build(ROWS)
    }

    #[rstest]
    fn fetch_sorted_by_pip(fetcher: FinemappedFetcher) -> Result<(), anyhow::Error> {
        let results = fetcher.fetch(&"1-55039974-G-T".parse::<Variant>()?)?;
        let pips: Vec<f64> = results.data.iter().map(|r| r.pip).collect();
        assert_eq!(pips, vec![0.9, 0.5, 0.2]);
        assert_eq!(results.resources, vec!["UKBB", "FinnGen", "eQTL_Catalogue_R6"]);
        assert_eq!(results.data[0].mlog10p, None);
        assert_eq!(results.data[1].phenocode, "QTD000001:ENSG1");

        Ok(())
    }

    #[rstest]
    fn fetch_without_records(fetcher: FinemappedFetcher) -> Result<(), anyhow::Error> {
        let results = fetcher.fetch(&"1-55039974-G-A".parse::<Variant>()?)?;
        assert!(results.data.is_empty());
        assert!(results.resources.is_empty());

        Ok(())
    }

    #[rstest]
    fn fetch_range(fetcher: FinemappedFetcher) -> Result<(), anyhow::Error> {
        let results = fetcher.fetch_range("1", 1, 100_000_000)?;
        let ids: Vec<&str> = results.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["1-55039974-G-T", "1-55040100-A-G"]);

        Ok(())
    }

    #[test]
    fn missing_pip_is_data_error() -> Result<(), anyhow::Error> {
        let fetcher = build(&["FinnGen\tFinnGen_R11\tGWAS\tT2D\t1\t100\tA\tG\t1\t1\t1\tNA\t1\t1"]);
        assert!(matches!(
            fetcher.fetch(&"1-100-A-G".parse::<Variant>()?),
            Err(LookupError::Data(_))
        ));

        Ok(())
    }
}
