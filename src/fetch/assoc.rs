//! Association statistics from the direct and the LD-based source.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::{
    column, fetch_at, fetch_range, is_null, mlog10p_from_beta_se, namespaced_phenocode,
    optional_column, parse_f64, require_f64, row_variant, split_row, DataType,
};
use crate::{
    common::noodles::RowSource, conf::LdAssocConf, err::LookupError, variant::Variant,
};

/// Resource name of the placeholder that sorts before all others.
pub const NA_RESOURCE: &str = "NA";

/// One association record.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AssocRecord {
    /// Whether the record comes from the LD-based source.
    pub ld: bool,
    pub resource: String,
    pub dataset: String,
    pub data_type: DataType,
    pub phenocode: String,
    pub mlogp: f64,
    pub beta: f64,
    pub sebeta: f64,
    pub overall_r2: Option<f64>,
    /// For LD records, whether the queried variant is the lead itself.
    pub lead: Option<bool>,
    pub lead_chr: Option<String>,
    pub lead_pos: Option<u64>,
    pub lead_ref: Option<String>,
    pub lead_alt: Option<String>,
}

impl AssocRecord {
    /// Placeholder shown for `resource` when there is no real record.
    fn placeholder(resource: &str) -> Self {
        Self {
            ld: false,
            resource: resource.to_string(),
            dataset: "NA".into(),
            data_type: DataType::Na,
            phenocode: "NA".into(),
            mlogp: if resource == NA_RESOURCE { 0.0 } else { -1.0 },
            beta: 0.0,
            sebeta: 0.0,
            overall_r2: None,
            lead: None,
            lead_chr: None,
            lead_pos: None,
            lead_ref: None,
            lead_alt: None,
        }
    }
}

/// Association records of one variant.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct AssocResults {
    pub data: Vec<AssocRecord>,
    /// Resources with real records, sorted.
    pub resources: Vec<String>,
}

/// Column layout of the direct association file.
#[derive(Debug, Clone)]
struct DirectSchema {
    n_cols: usize,
    resource: usize,
    dataset: usize,
    data_type: usize,
    phenocode: usize,
    chr: usize,
    pos: usize,
    reference: usize,
    alternative: usize,
    mlog10p: Option<usize>,
    beta: usize,
    se: usize,
}

impl DirectSchema {
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
            mlog10p: optional_column(header, "mlog10p"),
            beta: column(header, "beta")?,
            se: column(header, "se")?,
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

    fn decode(&self, fields: &[&str], variant: &Variant) -> Result<AssocRecord, LookupError> {
        let dataset = fields[self.dataset];
        let data_type = parse_data_type(fields[self.data_type], variant)?;
        let beta = require_f64(fields[self.beta], "beta")?;
        let sebeta = require_f64(fields[self.se], "se")?;
        let mlogp = match self.mlog10p {
            Some(idx) => parse_f64(fields[idx], "mlog10p")?,
            None => None,
        };
        let mlogp = match mlogp {
            Some(mlogp) if mlogp.is_finite() => mlogp,
            _ => {
                tracing::trace!("deriving mlog10p of {} from beta and se", variant);
                mlog10p_from_beta_se(beta, sebeta).map_err(|e| {
                    LookupError::Data(format!("association of {} ({}): {}", variant, dataset, e))
                })?
            }
        };
        Ok(AssocRecord {
            ld: false,
            resource: fields[self.resource].to_string(),
            dataset: dataset.to_string(),
            data_type,
            phenocode: namespaced_phenocode(data_type, dataset, fields[self.phenocode]),
            mlogp,
            beta,
            sebeta,
            overall_r2: None,
            lead: None,
            lead_chr: None,
            lead_pos: None,
            lead_ref: None,
            lead_alt: None,
        })
    }
}

fn parse_data_type(raw: &str, variant: &Variant) -> Result<DataType, LookupError> {
    raw.parse()
        .map_err(|_| LookupError::Data(format!("unknown data type {:?} for {}", raw, variant)))
}

/// Column layout of the LD-based association file.
#[derive(Debug, Clone)]
struct LdSchema {
    n_cols: usize,
    study_id: usize,
    tag_chrom: usize,
    tag_pos: usize,
    tag_ref: usize,
    tag_alt: usize,
    lead_chrom: usize,
    lead_pos: usize,
    lead_ref: usize,
    lead_alt: usize,
    overall_r2: usize,
    pval: usize,
    beta: usize,
    odds_ratio: usize,
    resource: Option<usize>,
    dataset: Option<usize>,
    data_type: Option<usize>,
}

/// Smallest positive p-value; used when a p-value underflowed to zero.
const MIN_PVAL: f64 = 5e-324;

/// Whether an LD effect column value is missing.
fn is_ld_null(value: &str) -> bool {
    is_null(value) || value == "None"
}

impl LdSchema {
    fn new(header: &[String]) -> Result<Self, anyhow::Error> {
        Ok(Self {
            n_cols: header.len(),
            study_id: column(header, "study_id")?,
            tag_chrom: column(header, "tag_chrom")?,
            tag_pos: column(header, "tag_pos")?,
            tag_ref: column(header, "tag_ref")?,
            tag_alt: column(header, "tag_alt")?,
            lead_chrom: column(header, "lead_chrom")?,
            lead_pos: column(header, "lead_pos")?,
            lead_ref: column(header, "lead_ref")?,
            lead_alt: column(header, "lead_alt")?,
            overall_r2: column(header, "overall_r2")?,
            pval: column(header, "pval")?,
            beta: column(header, "beta")?,
            odds_ratio: column(header, "odds_ratio")?,
            resource: optional_column(header, "resource"),
            dataset: optional_column(header, "dataset"),
            data_type: optional_column(header, "data_type"),
        })
    }

    fn variant(&self, fields: &[&str]) -> Option<Variant> {
        row_variant(
            fields[self.tag_chrom],
            fields[self.tag_pos],
            fields[self.tag_ref],
            fields[self.tag_alt],
        )
    }

    /// Resource of a row; the configured default if the file has no column.
    fn resource<'a>(&self, fields: &[&'a str], conf: &'a LdAssocConf) -> &'a str {
        self.resource
            .map(|idx| fields[idx])
            .filter(|value| !is_null(value))
            .unwrap_or(conf.resource.as_str())
    }

    fn decode(
        &self,
        fields: &[&str],
        variant: &Variant,
        conf: &LdAssocConf,
    ) -> Result<AssocRecord, LookupError> {
        let dataset = self
            .dataset
            .map(|idx| fields[idx])
            .filter(|value| !is_null(value))
            .unwrap_or(conf.dataset.as_str());
        let data_type = match self.data_type.map(|idx| fields[idx]) {
            Some(raw) if !is_null(raw) => parse_data_type(raw, variant)?,
            _ => conf.data_type,
        };

        let beta = effect_size(fields[self.beta], fields[self.odds_ratio]);
        let pval = require_f64(fields[self.pval], "pval")?;
        let mlogp = if pval > 0.0 {
            -pval.log10()
        } else {
            -MIN_PVAL.log10()
        };
        let overall_r2 = parse_f64(fields[self.overall_r2], "overall_r2")?;

        let lead_variant = row_variant(
            fields[self.lead_chrom],
            fields[self.lead_pos],
            fields[self.lead_ref],
            fields[self.lead_alt],
        );
        let is_lead = lead_variant.as_ref() == Some(variant);
        let mut record = AssocRecord {
            ld: true,
            resource: self.resource(fields, conf).to_string(),
            dataset: dataset.to_string(),
            data_type,
            phenocode: fields[self.study_id].to_string(),
            mlogp,
            beta,
            sebeta: -1.0,
            overall_r2,
            lead: Some(is_lead),
            lead_chr: None,
            lead_pos: None,
            lead_ref: None,
            lead_alt: None,
        };
        if !is_lead {
            record.lead_chr = Some(
                lead_variant
                    .as_ref()
                    .map(|lead| lead.chrom.clone())
                    .unwrap_or_else(|| fields[self.lead_chrom].to_string()),
            );
            record.lead_pos = fields[self.lead_pos].parse().ok();
            record.lead_ref = Some(fields[self.lead_ref].to_string());
            record.lead_alt = Some(fields[self.lead_alt].to_string());
        }
        Ok(record)
    }
}

/// Effect size of an LD record: `beta`, else `ln(odds_ratio)`, else 0.
fn effect_size(beta: &str, odds_ratio: &str) -> f64 {
    let parsed = if !is_ld_null(beta) {
        beta.parse::<f64>()
    } else if !is_ld_null(odds_ratio) {
        odds_ratio.parse::<f64>().map(f64::ln)
    } else {
        return 0.0;
    };
    match parsed {
        Ok(beta) => beta,
        Err(_) => {
            tracing::warn!(
                "Could not parse beta or odds ratio: {} {}",
                beta,
                odds_ratio
            );
            0.0
        }
    }
}

/// The LD-based source together with its defaults.
struct LdSource {
    source: Box<dyn RowSource>,
    schema: LdSchema,
    conf: LdAssocConf,
}

/// Fetcher for association records.
pub struct AssocFetcher {
    source: Box<dyn RowSource>,
    schema: DirectSchema,
    ld: Option<LdSource>,
    /// Configured resources, in configuration order.
    resources: Vec<String>,
    /// Resources whose records are kept, including the `NA` placeholder.
    allowed: HashSet<String>,
}

impl std::fmt::Debug for AssocFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssocFetcher")
            .field("schema", &self.schema)
            .field("ld", &self.ld.as_ref().map(|ld| &ld.schema))
            .field("resources", &self.resources)
            .finish()
    }
}

impl AssocFetcher {
    /// Construct from the direct source, the optional LD source and the
    /// configured resource names.
    pub fn new(
        source: Box<dyn RowSource>,
        ld: Option<(Box<dyn RowSource>, LdAssocConf)>,
        resources: &[String],
    ) -> Result<Self, anyhow::Error> {
        let schema = DirectSchema::new(source.header())?;
        let ld = match ld {
            Some((source, conf)) => Some(LdSource {
                schema: LdSchema::new(source.header())?,
                source,
                conf,
            }),
            None => None,
        };
        let mut unique = Vec::new();
        for resource in resources {
            if !unique.contains(resource) {
                unique.push(resource.clone());
            }
        }
        let mut allowed: HashSet<String> = unique.iter().cloned().collect();
        allowed.insert(NA_RESOURCE.to_string());
        Ok(Self {
            source,
            schema,
            ld,
            resources: unique,
            allowed,
        })
    }

    /// Direct records of rows selected by `keep`.
    fn direct_records<F>(
        &self,
        rows: &[String],
        mut keep: F,
    ) -> Result<Vec<(Variant, AssocRecord)>, LookupError>
    where
        F: FnMut(&Variant) -> bool,
    {
        let mut result = Vec::new();
        for row in rows {
            let fields = split_row(row, self.schema.n_cols)?;
            let Some(variant) = self.schema.variant(&fields) else {
                continue;
            };
            if !keep(&variant)
                || !self.allowed.contains(fields[self.schema.resource])
                || is_null(fields[self.schema.beta])
            {
                continue;
            }
            let record = self.schema.decode(&fields, &variant)?;
            result.push((variant, record));
        }
        Ok(result)
    }

    /// LD records of rows selected by `keep`.
    fn ld_records<F>(
        ld: &LdSource,
        allowed: &HashSet<String>,
        rows: &[String],
        mut keep: F,
    ) -> Result<Vec<(Variant, AssocRecord)>, LookupError>
    where
        F: FnMut(&Variant) -> bool,
    {
        let mut result = Vec::new();
        for row in rows {
            let fields = split_row(row, ld.schema.n_cols)?;
            let Some(variant) = ld.schema.variant(&fields) else {
                continue;
            };
            if !keep(&variant) || !allowed.contains(ld.schema.resource(&fields, &ld.conf)) {
                continue;
            }
            let record = ld.schema.decode(&fields, &variant, &ld.conf)?;
            result.push((variant, record));
        }
        Ok(result)
    }

    /// Merge direct and LD records with placeholders into sorted results.
    fn assemble(&self, direct: Vec<AssocRecord>, ld: Vec<AssocRecord>) -> AssocResults {
        let mut resources: Vec<String> = direct
            .iter()
            .chain(ld.iter())
            .map(|record| record.resource.clone())
            .collect();
        resources.sort();
        resources.dedup();

        let mut data = direct;
        data.extend(
            self.resources
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(NA_RESOURCE))
                .map(AssocRecord::placeholder),
        );
        data.extend(ld);
        // stable, so ties keep source order
        data.sort_by(|lhs, rhs| {
            rhs.mlogp
                .partial_cmp(&lhs.mlogp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        AssocResults { data, resources }
    }

    /// Association records of `variant`, including one placeholder per
    /// configured resource and one for `NA`.
    pub fn fetch(&self, variant: &Variant) -> Result<AssocResults, LookupError> {
        let rows = fetch_at(self.source.as_ref(), variant, "assoc")?;
        let direct = self
            .direct_records(&rows, |v| v == variant)?
            .into_iter()
            .map(|(_, record)| record)
            .collect();

        let ld = match &self.ld {
            Some(ld) => {
                let rows = fetch_at(ld.source.as_ref(), variant, "ld_assoc")?;
                Self::ld_records(ld, &self.allowed, &rows, |v| v == variant)?
                    .into_iter()
                    .map(|(_, record)| record)
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(self.assemble(direct, ld))
    }

    /// Association results of all variants with real records in a
    /// 1-based, inclusive range, keyed by canonical variant id.
    pub fn fetch_range(
        &self,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> Result<IndexMap<String, AssocResults>, LookupError> {
        let mut by_variant: IndexMap<Variant, (Vec<AssocRecord>, Vec<AssocRecord>)> =
            IndexMap::new();

        let rows = fetch_range(self.source.as_ref(), chrom, start, end, "assoc")?;
        for (variant, record) in self.direct_records(&rows, |_| true)? {
            by_variant.entry(variant).or_default().0.push(record);
        }
        if let Some(ld) = &self.ld {
            let rows = fetch_range(ld.source.as_ref(), chrom, start, end, "ld_assoc")?;
            for (variant, record) in Self::ld_records(ld, &self.allowed, &rows, |_| true)? {
                by_variant.entry(variant).or_default().1.push(record);
            }
        }

        Ok(by_variant
            .into_iter()
            .map(|(variant, (direct, ld))| (variant.to_string(), self.assemble(direct, ld)))
            .collect())
    }
}
