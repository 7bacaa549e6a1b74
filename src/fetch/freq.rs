//! Population allele frequencies from the gnomAD-derived TSV.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::{
    column, fetch_at, fetch_range, humanize, is_null, optional_column, parse_f64, row_variant,
    split_row,
};
use crate::{common::noodles::RowSource, err::LookupError, variant::Variant};

/// Filter flag for sites without any called alternative allele.
const AC0_FILTER: &str = "AC0";

/// Population and frequency of a popmax/popmin entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PopFrequency {
    pub pop: String,
    pub af: f64,
}

/// One grouped consequence entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Consequence {
    pub gene_symbol: Option<String>,
    pub consequence: String,
}

/// Raw consequence annotation as stored in the `consequences` column.
#[derive(Deserialize, Debug)]
struct RawConsequence {
    #[serde(default)]
    gene_symbol: Option<String>,
    #[serde(default)]
    consequences: Vec<String>,
}

/// Frequency record of one variant in either exomes or genomes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrequencyRecord {
    pub chr: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "alt")]
    pub alternative: String,
    pub rsids: Option<String>,
    pub filters: Option<String>,
    #[serde(rename = "AN")]
    pub an: Option<u64>,
    #[serde(rename = "AF")]
    pub af: Option<f64>,
    /// Population frequencies keyed by column name (`AF_<pop>`).
    #[serde(flatten)]
    pub pop_afs: IndexMap<String, Option<f64>>,
    pub most_severe: Option<String>,
    pub gene_most_severe: Option<String>,
    pub consequences: Vec<Consequence>,
    pub genome_or_exome: String,
    /// Columns not known to the decoder.
    #[serde(flatten)]
    pub extra: IndexMap<String, Option<String>>,
    pub popmax: PopFrequency,
    pub popmin: PopFrequency,
}

impl FrequencyRecord {
    /// Whether the record carries the AC0 filter.
    pub fn is_ac0(&self) -> bool {
        self.filters
            .as_deref()
            .map(|filters| {
                filters
                    .split([',', ';'])
                    .any(|filter| filter.trim() == AC0_FILTER)
            })
            .unwrap_or(false)
    }

    /// Non-null population frequencies as `(pop, af)`, in column order.
    pub fn populations(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.pop_afs.iter().filter_map(|(key, af)| {
            af.map(|af| (key.strip_prefix("AF_").unwrap_or(key.as_str()), af))
        })
    }
}

/// Which sub-record is preferred for display.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Preferred {
    Exomes,
    Genomes,
}

/// Frequency data of one variant.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrequencyData {
    pub exomes: Option<FrequencyRecord>,
    pub genomes: Option<FrequencyRecord>,
    pub preferred: Preferred,
}

impl FrequencyData {
    fn new(exomes: Option<FrequencyRecord>, genomes: Option<FrequencyRecord>) -> Self {
        let preferred = match (&exomes, &genomes) {
            (_, None) => Preferred::Exomes,
            (Some(exomes), Some(genomes))
                if exomes.an.unwrap_or_default() > genomes.an.unwrap_or_default() =>
            {
                Preferred::Exomes
            }
            _ => Preferred::Genomes,
        };
        Self {
            exomes,
            genomes,
            preferred,
        }
    }

    /// Exomes record if present, else genomes.
    pub fn exomes_or_genomes(&self) -> Option<&FrequencyRecord> {
        self.exomes.as_ref().or(self.genomes.as_ref())
    }

    /// Whether every present sub-record carries the AC0 filter.
    fn is_ac0(&self) -> bool {
        self.exomes.as_ref().map_or(true, FrequencyRecord::is_ac0)
            && self.genomes.as_ref().map_or(true, FrequencyRecord::is_ac0)
    }

    fn insert(&mut self, record: FrequencyRecord) {
        match record.genome_or_exome.as_str() {
            "e" => self.exomes = Some(record),
            "g" => self.genomes = Some(record),
            other => tracing::trace!("ignoring genome_or_exome value {:?}", other),
        }
    }
}

/// Outcome of a single-variant frequency lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FreqOutcome {
    Found(FrequencyData),
    NotFound,
    AcZero,
}

/// Column layout of the frequency file.
#[derive(Debug, Clone)]
struct FrequencySchema {
    n_cols: usize,
    chr: usize,
    pos: usize,
    reference: usize,
    alternative: usize,
    genome_or_exome: usize,
    rsids: Option<usize>,
    filters: Option<usize>,
    an: Option<usize>,
    af: Option<usize>,
    most_severe: Option<usize>,
    gene_most_severe: Option<usize>,
    consequences: Option<usize>,
    pop_afs: Vec<(String, usize)>,
    extra: Vec<(String, usize)>,
}

impl FrequencySchema {
    fn new(header: &[String]) -> Result<Self, anyhow::Error> {
        const KNOWN: &[&str] = &[
            "chr",
            "pos",
            "ref",
            "alt",
            "genome_or_exome",
            "rsids",
            "filters",
            "AN",
            "AF",
            "most_severe",
            "gene_most_severe",
            "consequences",
        ];
        let pop_afs = header
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with("AF_"))
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let extra = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.starts_with("AF_") && !KNOWN.contains(&name.as_str()))
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Ok(Self {
            n_cols: header.len(),
            chr: column(header, "chr")?,
            pos: column(header, "pos")?,
            reference: column(header, "ref")?,
            alternative: column(header, "alt")?,
            genome_or_exome: column(header, "genome_or_exome")?,
            rsids: optional_column(header, "rsids"),
            filters: optional_column(header, "filters"),
            an: optional_column(header, "AN"),
            af: optional_column(header, "AF"),
            most_severe: optional_column(header, "most_severe"),
            gene_most_severe: optional_column(header, "gene_most_severe"),
            consequences: optional_column(header, "consequences"),
            pop_afs,
            extra,
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

    fn decode(&self, fields: &[&str], variant: &Variant) -> Result<FrequencyRecord, LookupError> {
        let text = |idx: Option<usize>| {
            idx.map(|idx| fields[idx])
                .filter(|value| !is_null(value))
                .map(|value| value.to_string())
        };

        let an = match text(self.an) {
            Some(value) => Some(value.parse::<u64>().map_err(|e| {
                LookupError::Data(format!("invalid AN value {:?} for {}: {}", value, variant, e))
            })?),
            None => None,
        };
        let af = match self.af {
            Some(idx) => parse_f64(fields[idx], "AF")?,
            None => None,
        };
        let mut pop_afs = IndexMap::new();
        for (name, idx) in &self.pop_afs {
            pop_afs.insert(name.clone(), parse_f64(fields[*idx], name)?);
        }
        let consequences = match text(self.consequences) {
            Some(raw) => group_consequences(&raw).map_err(|e| {
                LookupError::Data(format!("invalid consequences for {}: {}", variant, e))
            })?,
            None => Vec::new(),
        };
        let extra = self
            .extra
            .iter()
            .map(|(name, idx)| (name.clone(), text(Some(*idx))))
            .collect();

        let (popmax, popmin) = pop_extremes(&pop_afs);
        Ok(FrequencyRecord {
            chr: variant.chrom.clone(),
            pos: variant.pos,
            reference: variant.reference.clone(),
            alternative: variant.alternative.clone(),
            rsids: text(self.rsids),
            filters: text(self.filters),
            an,
            af,
            pop_afs,
            most_severe: text(self.most_severe).map(|term| humanize(&term)),
            gene_most_severe: text(self.gene_most_severe),
            consequences,
            genome_or_exome: fields[self.genome_or_exome].to_string(),
            extra,
            popmax,
            popmin,
        })
    }
}

/// Highest and lowest non-null population frequency.
///
/// Start values are `("NA", 0)` and `("NA", 1)`; comparisons are strict.
fn pop_extremes(pop_afs: &IndexMap<String, Option<f64>>) -> (PopFrequency, PopFrequency) {
    let mut popmax = PopFrequency {
        pop: "NA".into(),
        af: 0.0,
    };
    let mut popmin = PopFrequency {
        pop: "NA".into(),
        af: 1.0,
    };
    for (name, af) in pop_afs {
        let Some(af) = *af else { continue };
        let pop = name.strip_prefix("AF_").unwrap_or(name);
        if af > popmax.af {
            popmax = PopFrequency {
                pop: pop.to_string(),
                af,
            };
        }
        if af < popmin.af {
            popmin = PopFrequency {
                pop: pop.to_string(),
                af,
            };
        }
    }
    (popmax, popmin)
}

/// Group raw per-gene consequence annotation into distinct
/// `(gene, term)` entries, in first-seen order.
fn group_consequences(raw: &str) -> Result<Vec<Consequence>, serde_json::Error> {
    let raw: Vec<RawConsequence> = serde_json::from_str(raw)?;
    let mut grouped: IndexMap<Option<String>, IndexSet<String>> = IndexMap::new();
    for entry in raw {
        grouped
            .entry(entry.gene_symbol)
            .or_default()
            .extend(entry.consequences.iter().map(|term| humanize(term)));
    }
    Ok(grouped
        .into_iter()
        .flat_map(|(gene_symbol, terms)| {
            terms.into_iter().map(move |consequence| Consequence {
                gene_symbol: gene_symbol.clone(),
                consequence,
            })
        })
        .collect())
}

/// Fetcher for population frequencies.
pub struct FrequencyFetcher {
    source: Box<dyn RowSource>,
    schema: FrequencySchema,
}

impl std::fmt::Debug for FrequencyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyFetcher")
            .field("schema", &self.schema)
            .finish()
    }
}

impl FrequencyFetcher {
    pub fn new(source: Box<dyn RowSource>) -> Result<Self, anyhow::Error> {
        let schema = FrequencySchema::new(source.header())?;
        Ok(Self { source, schema })
    }

    /// Population names from the `AF_<pop>` columns, in column order.
    pub fn populations(&self) -> Vec<String> {
        self.schema
            .pop_afs
            .iter()
            .map(|(name, _)| name.trim_start_matches("AF_").to_string())
            .collect()
    }

    /// Look up the frequency data of `variant`.
    pub fn fetch(&self, variant: &Variant) -> Result<FreqOutcome, LookupError> {
        let mut data = FrequencyData::new(None, None);
        for row in fetch_at(self.source.as_ref(), variant, "gnomad")? {
            let fields = split_row(&row, self.schema.n_cols)?;
            if self.schema.variant(&fields).as_ref() != Some(variant) {
                continue;
            }
            data.insert(self.schema.decode(&fields, variant)?);
        }

        if data.exomes.is_none() && data.genomes.is_none() {
            tracing::trace!("variant {} not found in gnomad", variant);
            return Ok(FreqOutcome::NotFound);
        }
        if data.is_ac0() {
            tracing::trace!("variant {} is AC0 in gnomad", variant);
            return Ok(FreqOutcome::AcZero);
        }
        Ok(FreqOutcome::Found(FrequencyData::new(data.exomes, data.genomes)))
    }

    /// Frequency data of all variants in a 1-based, inclusive range, keyed
    /// by canonical variant id in file order; AC0 variants are skipped.
    pub fn fetch_range(
        &self,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> Result<IndexMap<String, FrequencyData>, LookupError> {
        let mut by_variant: IndexMap<Variant, FrequencyData> = IndexMap::new();
        for row in fetch_range(self.source.as_ref(), chrom, start, end, "gnomad")? {
            let fields = split_row(&row, self.schema.n_cols)?;
            let Some(variant) = self.schema.variant(&fields) else {
                continue;
            };
            let record = self.schema.decode(&fields, &variant)?;
            by_variant
                .entry(variant)
                .or_insert_with(|| FrequencyData::new(None, None))
                .insert(record);
        }

        Ok(by_variant
            .into_iter()
            .filter(|(_, data)| !(data.exomes.is_none() && data.genomes.is_none()))
            .filter(|(_, data)| !data.is_ac0())
            .map(|(variant, data)| {
                (
                    variant.to_string(),
                    FrequencyData::new(data.exomes, data.genomes),
                )
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use float_cmp::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::{FreqOutcome, FrequencyFetcher, Preferred};
    use crate::{common::noodles::MemorySource, variant::Variant};

    pub const HEADER: &str = "#chr\tpos\tref\talt\trsids\tfilters\tAN\tAF\tAF_afr\tAF_nfe\tAF_fin\tmost_severe\tgene_most_severe\tconsequences\tgenome_or_exome\tnhomalt";

    /// Rows of an in-memory frequency file.
    pub const ROWS: &[&str] = &[
        // exomes and genomes, exomes larger AN
        "1\t55039974\tG\tT\trs11591147\tNA\t1000\t0.01\t0.002\t0.02\t0.01\tmissense_variant\tPCSK9\t[{\"gene_symbol\":\"PCSK9\",\"gene_id\":\"ENSG00000169174\",\"consequences\":[\"missense_variant\",\"splice_region_variant\"]},{\"gene_symbol\":\"PCSK9\",\"gene_id\":\"ENSG00000169174\",\"consequences\":[\"missense_variant\"]}]\te\t3",
        "1\t55039974\tG\tT\trs11591147\tNA\t500\t0.012\tNA\tNA\tNA\tmissense_variant\tPCSK9\tNA\tg\tNA",
        // same position, other allele, genomes only
        "1\t55039974\tG\tA\tNA\t\t800\t0.001\t0.001\t0.001\t0.003\tsynonymous_variant\tPCSK9\t[]\tg\t0",
        // AC0 in exomes only, absent in genomes
        "1\t55040000\tC\tT\tNA\tAC0\t1000\t0\t0\t0\t0\tintron_variant\tPCSK9\t[]\te\t0",
        // AC0 in exomes, passing in genomes
        "1\t55040100\tA\tG\tNA\tAC0;RF\t1000\t0\t0\t0\t0\tstop_gained\tPCSK9\t[{\"gene_symbol\":\"PCSK9\",\"gene_id\":\"ENSG00000169174\",\"consequences\":[\"stop_gained\"]}]\te\t0",
        "1\t55040100\tA\tG\tNA\tNA\t2000\t0.0005\t0.001\t0\tNA\tstop_gained\tPCSK9\t[{\"gene_symbol\":\"PCSK9\",\"gene_id\":\"ENSG00000169174\",\"consequences\":[\"stop_gained\"]}]\tg\t0",
    ];

    pub fn source(rows: &[&str]) -> MemorySource {
        let mut lines = vec![HEADER];
        lines.extend_from_slice(rows);
        MemorySource::new(&lines, "chr", "pos")
    }

    #[fixture]
    pub fn fetcher() -> FrequencyFetcher {
        FrequencyFetcher::new(Box::new(source(ROWS))).expect("invalid header")
    }

    fn found(outcome: FreqOutcome) -> super::FrequencyData {
        match outcome {
            FreqOutcome::Found(data) => data,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[rstest]
    fn fetch_exomes_and_genomes(fetcher: FrequencyFetcher) -> Result<(), anyhow::Error> {
        let data = found(fetcher.fetch(&"1-55039974-G-T".parse::<Variant>()?)?);
        assert_eq!(data.preferred, Preferred::Exomes);

        let exomes = data.exomes.as_ref().expect("no exomes");
        assert_eq!(exomes.an, Some(1000));
        assert_eq!(exomes.most_severe.as_deref(), Some("missense"));
        assert_eq!(exomes.popmax.pop, "nfe");
        assert_approx_eq!(f64, exomes.popmax.af, 0.02);
        assert_eq!(exomes.popmin.pop, "afr");
        let consequences: Vec<(Option<&str>, &str)> = exomes
            .consequences
            .iter()
            .map(|c| (c.gene_symbol.as_deref(), c.consequence.as_str()))
            .collect();
        assert_eq!(
            consequences,
            vec![(Some("PCSK9"), "missense"), (Some("PCSK9"), "splice region")]
        );
        assert_eq!(exomes.extra.get("nhomalt"), Some(&Some("3".to_string())));

        let genomes = data.genomes.as_ref().expect("no genomes");
        assert_eq!(genomes.popmax.pop, "NA");
        assert_approx_eq!(f64, genomes.popmax.af, 0.0);
        assert_eq!(genomes.popmin.pop, "NA");
        assert_approx_eq!(f64, genomes.popmin.af, 1.0);
        assert!(genomes.consequences.is_empty());
        assert_eq!(genomes.extra.get("nhomalt"), Some(&None));

        Ok(())
    }

    #[rstest]
    fn fetch_genomes_only_prefers_genomes(fetcher: FrequencyFetcher) -> Result<(), anyhow::Error> {
        let data = found(fetcher.fetch(&"1-55039974-G-A".parse::<Variant>()?)?);
        assert!(data.exomes.is_none());
        assert_eq!(data.preferred, Preferred::Genomes);
        // empty filters column is null
        assert_eq!(data.genomes.as_ref().and_then(|g| g.filters.clone()), None);

        Ok(())
    }

    #[rstest]
    #[case("1-55040000-C-T", FreqOutcome::AcZero)]
    #[case("1-55039974-G-C", FreqOutcome::NotFound)]
    #[case("1-1-A-G", FreqOutcome::NotFound)]
    #[case("22-100-A-G", FreqOutcome::NotFound)]
    fn fetch_failures(
        fetcher: FrequencyFetcher,
        #[case] variant: &str,
        #[case] expected: FreqOutcome,
    ) -> Result<(), anyhow::Error> {
        assert_eq!(fetcher.fetch(&variant.parse()?)?, expected);

        Ok(())
    }

    #[rstest]
    fn fetch_ac0_in_one_source_only(fetcher: FrequencyFetcher) -> Result<(), anyhow::Error> {
        let data = found(fetcher.fetch(&"1-55040100-A-G".parse::<Variant>()?)?);
        assert!(data.exomes.as_ref().map(|e| e.is_ac0()).unwrap_or(false));
        assert_eq!(data.preferred, Preferred::Genomes);

        Ok(())
    }

    #[rstest]
    fn fetch_range_skips_ac0(fetcher: FrequencyFetcher) -> Result<(), anyhow::Error> {
        let data = fetcher.fetch_range("1", 55039000, 55041000)?;
        let ids: Vec<&str> = data.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["1-55039974-G-T", "1-55039974-G-A", "1-55040100-A-G"]);

        Ok(())
    }

    #[rstest]
    fn populations_from_header(fetcher: FrequencyFetcher) {
        assert_eq!(fetcher.populations(), vec!["afr", "nfe", "fin"]);
    }

    #[test]
    fn missing_required_column() {
        let source = MemorySource::new(&["#chr\tpos\tref\talt"], "chr", "pos");
        assert!(FrequencyFetcher::new(Box::new(source)).is_err());
    }

    #[rstest]
    fn serialized_shape(fetcher: FrequencyFetcher) -> Result<(), anyhow::Error> {
        let data = found(fetcher.fetch(&"1-55039974-G-T".parse::<Variant>()?)?);
        let json = serde_json::to_value(&data)?;
        assert_eq!(json["preferred"], "exomes");
        assert_eq!(json["exomes"]["ref"], "G");
        assert_eq!(json["exomes"]["AF_nfe"], 0.02);
        assert_eq!(json["exomes"]["popmax"]["pop"], "nfe");
        assert_eq!(json["genomes"]["AF_afr"], serde_json::Value::Null);

        Ok(())
    }
}
