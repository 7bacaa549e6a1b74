//! The lookup engine: resolve query input, fetch from all sources and
//! merge the results into one response.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use rayon::prelude::*;

use crate::{
    common::noodles::TabixSource,
    conf::Config,
    err::LookupError,
    fetch::{
        assoc::{AssocFetcher, AssocResults},
        finemapped::{FinemappedFetcher, FinemappedResults},
        freq::{FreqOutcome, FrequencyData, FrequencyFetcher},
    },
    genes::GeneRanges,
    meta::MetadataDb,
    rsid::{Rsid, RsidDb},
    variant::Variant,
};

use self::{
    input::{looks_like_a_gene, parse_query, InputItem, QueryMode},
    schema::{InputVariants, InputWeight, QueryResponse, QueryType, Timings, VariantEntry},
    summary::summarize_frequencies,
};

pub mod cli;
pub mod input;
pub mod schema;
pub mod summary;

/// Humanized consequences counted as coding for gene queries.
const CODING_CONSEQUENCES: &[&str] = &[
    "missense",
    "frameshift",
    "inframe insertion",
    "inframe deletion",
    "transcript ablation",
    "stop gained",
    "stop lost",
    "start lost",
    "splice acceptor",
    "splice donor",
    "incomplete terminal codon",
    "protein altering",
    "coding sequence",
];

/// Outcome of resolving one input token.
#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Variants(Vec<Variant>),
    /// Valid rsID without any variant.
    NotFound,
    Unparsed,
}

/// Fetch results of one variant.
#[derive(Debug)]
enum VariantFetch {
    Found {
        freq: FrequencyData,
        assoc: AssocResults,
        finemapped: FinemappedResults,
    },
    NotFound,
    AcZero,
}

/// Classification of a fetched variant.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FetchStatus {
    Found,
    NotFound,
    AcZero,
}

/// Per-stage durations of a fetch.
#[derive(Debug, Default, Clone, Copy)]
struct StageTimes {
    gnomad: Duration,
    assoc: Duration,
    finemapped: Duration,
}

impl std::ops::AddAssign for StageTimes {
    fn add_assign(&mut self, rhs: Self) {
        self.gnomad += rhs.gnomad;
        self.assoc += rhs.assoc;
        self.finemapped += rhs.finemapped;
    }
}

/// Long-lived lookup engine holding all fetchers and stores.
pub struct Engine {
    config: Config,
    freq: FrequencyFetcher,
    assoc: AssocFetcher,
    finemapped: FinemappedFetcher,
    rsid: RsidDb,
    meta: MetadataDb,
    genes: GeneRanges,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("freq", &self.freq)
            .field("assoc", &self.assoc)
            .field("finemapped", &self.finemapped)
            .finish()
    }
}

impl Engine {
    /// Open all data sources named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, anyhow::Error> {
        tracing::info!("Opening frequency source {:?}...", &config.gnomad.path);
        let freq = FrequencyFetcher::new(Box::new(TabixSource::open(&config.gnomad.path)?))?;

        tracing::info!("Opening association sources...");
        let ld = match &config.ld_assoc {
            Some(ld_conf) => {
                let source: Box<dyn crate::common::noodles::RowSource> =
                    Box::new(TabixSource::open(&ld_conf.path)?);
                Some((source, ld_conf.clone()))
            }
            None => None,
        };
        let assoc = AssocFetcher::new(
            Box::new(TabixSource::open(&config.assoc.path)?),
            ld,
            &config.assoc_resources(),
        )?;

        tracing::info!("Opening fine-mapping source {:?}...", &config.finemapped.path);
        let finemapped = FinemappedFetcher::new(
            Box::new(TabixSource::open(&config.finemapped.path)?),
            &config.finemapped_resources(),
        )?;

        tracing::info!("Opening rsID and metadata stores...");
        let rsid = RsidDb::open(&config.rsid_db.path)?;
        let meta = MetadataDb::open(&config.metadata_db)?;
        let genes = GeneRanges::load(&config.gene_ranges)?;

        Ok(Self {
            config: config.clone(),
            freq,
            assoc,
            finemapped,
            rsid,
            meta,
            genes,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `query` as a gene query if it looks like a gene symbol, as a
    /// variant query otherwise.
    pub fn run_query(&self, query: &str) -> Result<QueryResponse, LookupError> {
        if looks_like_a_gene(query) {
            self.query_gene(query.trim())
        } else {
            self.query_variants(query)
        }
    }

    fn resolve(&self, token: &str) -> Result<Resolution, LookupError> {
        if let Ok(variant) = token.parse::<Variant>() {
            return Ok(Resolution::Variants(vec![variant]));
        }
        let Ok(rsid) = token.parse::<Rsid>() else {
            tracing::trace!("could not parse {:?}", token);
            return Ok(Resolution::Unparsed);
        };
        let variants = self.rsid.lookup(&rsid)?;
        if variants.is_empty() {
            Ok(Resolution::NotFound)
        } else {
            Ok(Resolution::Variants(variants))
        }
    }

    fn fetch_variant(
        &self,
        variant: &Variant,
    ) -> Result<(VariantFetch, StageTimes), LookupError> {
        let mut times = StageTimes::default();

        let before = Instant::now();
        let outcome = self.freq.fetch(variant)?;
        times.gnomad = before.elapsed();
        let freq = match outcome {
            FreqOutcome::Found(freq) => freq,
            FreqOutcome::NotFound => return Ok((VariantFetch::NotFound, times)),
            FreqOutcome::AcZero => return Ok((VariantFetch::AcZero, times)),
        };

        let before = Instant::now();
        let assoc = self.assoc.fetch(variant)?;
        times.assoc = before.elapsed();

        let before = Instant::now();
        let finemapped = self.finemapped.fetch(variant)?;
        times.finemapped = before.elapsed();

        Ok((
            VariantFetch::Found {
                freq,
                assoc,
                finemapped,
            },
            times,
        ))
    }

    fn query_variants(&self, query: &str) -> Result<QueryResponse, LookupError> {
        let before_total = Instant::now();
        let parsed = parse_query(query)?;
        let max = self.config.max_query_variants;
        if parsed.items.len() > max {
            tracing::warn!(
                "rejecting query with {} variants (max {})",
                parsed.items.len(),
                max
            );
            return Err(LookupError::Validation(format!(
                "a maximum of {} variants are accepted",
                max
            )));
        }

        // first input item of each distinct variant
        let mut requested: IndexMap<Variant, &InputItem> = IndexMap::new();
        let mut resolved = Vec::with_capacity(parsed.items.len());
        for item in &parsed.items {
            let resolution = self.resolve(&item.token)?;
            if let Resolution::Variants(variants) = &resolution {
                for variant in variants {
                    requested.entry(variant.clone()).or_insert(item);
                }
            }
            resolved.push((item, resolution));
        }

        let variants: Vec<&Variant> = requested.keys().collect();
        let fetched = variants
            .par_iter()
            .map(|variant| self.fetch_variant(variant))
            .collect::<Result<Vec<_>, LookupError>>()?;

        let mut times = StageTimes::default();
        let mut data = Vec::new();
        let mut statuses: IndexMap<&Variant, FetchStatus> = IndexMap::new();
        for ((variant, item), (fetch, stage_times)) in requested.iter().zip(fetched) {
            times += stage_times;
            let status = match fetch {
                VariantFetch::NotFound => FetchStatus::NotFound,
                VariantFetch::AcZero => FetchStatus::AcZero,
                VariantFetch::Found {
                    freq,
                    assoc,
                    finemapped,
                } => {
                    let input = match parsed.mode {
                        QueryMode::Group => Some(InputWeight {
                            beta: item.beta,
                            value: item.value.clone(),
                        }),
                        QueryMode::Single => None,
                    };
                    data.push(VariantEntry {
                        variant: variant.to_string(),
                        input,
                        gnomad: freq,
                        finemapped,
                        assoc,
                    });
                    FetchStatus::Found
                }
            };
            statuses.insert(variant, status);
        }

        let mut input_variants = InputVariants::default();
        for (item, resolution) in &resolved {
            let token = &item.token;
            let variants = match resolution {
                Resolution::NotFound => {
                    input_variants.not_found.insert(token.clone());
                    continue;
                }
                Resolution::Unparsed => {
                    input_variants.unparsed.insert(token.clone());
                    continue;
                }
                Resolution::Variants(variants) => variants,
            };
            for variant in variants {
                let id = variant.to_string();
                match statuses.get(variant) {
                    Some(FetchStatus::Found) => {
                        input_variants.found.insert(token.clone());
                        let ids = input_variants.rsid_map.entry(token.clone()).or_default();
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    Some(FetchStatus::AcZero) => {
                        input_variants.ac0.insert(id);
                    }
                    Some(FetchStatus::NotFound) | None => {
                        input_variants.not_found.insert(id);
                    }
                }
            }
        }
        tracing::debug!(
            "fetched {} variants: gnomad {:?}, assoc {:?}, finemapped {:?}",
            requested.len(),
            times.gnomad,
            times.assoc,
            times.finemapped
        );

        let mut response = self.assemble(data, QueryType::Variant, times, before_total)?;
        response.has_betas = parsed.mode == QueryMode::Group;
        response.has_custom_values = parsed.has_custom_values();
        response.input_variants = Some(input_variants);
        Ok(response)
    }

    fn query_gene(&self, gene: &str) -> Result<QueryResponse, LookupError> {
        let before_total = Instant::now();
        let range = self.genes.get(gene)?;
        tracing::debug!("gene {} resolved to {:?}", gene, range);
        let mut times = StageTimes::default();

        let before = Instant::now();
        let freqs = self.freq.fetch_range(&range.chrom, range.start, range.end)?;
        times.gnomad = before.elapsed();
        if freqs.is_empty() {
            return Err(LookupError::NoVariantsInRange(gene.to_string()));
        }

        let before = Instant::now();
        let mut assocs = self.assoc.fetch_range(&range.chrom, range.start, range.end)?;
        times.assoc = before.elapsed();

        let before = Instant::now();
        let mut finemappeds = self
            .finemapped
            .fetch_range(&range.chrom, range.start, range.end)?;
        times.finemapped = before.elapsed();

        let mut data = Vec::new();
        for (id, freq) in freqs {
            if !is_coding_for(&freq, gene) {
                continue;
            }
            if !assocs.contains_key(&id) && !finemappeds.contains_key(&id) {
                continue;
            }
            data.push(VariantEntry {
                assoc: assocs.swap_remove(&id).unwrap_or_default(),
                finemapped: finemappeds.swap_remove(&id).unwrap_or_default(),
                variant: id,
                input: None,
                gnomad: freq,
            });
        }
        tracing::debug!("{} coding variants with results for gene {}", data.len(), gene);

        self.assemble(data, QueryType::Gene, times, before_total)
    }

    /// Build the response around `data`, resolving metadata.
    fn assemble(
        &self,
        data: Vec<VariantEntry>,
        query_type: QueryType,
        times: StageTimes,
        before_total: Instant,
    ) -> Result<QueryResponse, LookupError> {
        let mut pheno_keys: IndexSet<(&str, &str)> = IndexSet::new();
        let mut dataset_ids: IndexSet<&str> = IndexSet::new();
        for entry in &data {
            for record in &entry.assoc.data {
                pheno_keys.insert((record.resource.as_str(), record.phenocode.as_str()));
                dataset_ids.insert(record.dataset.as_str());
            }
            for record in &entry.finemapped.data {
                pheno_keys.insert((record.resource.as_str(), record.phenocode.as_str()));
                dataset_ids.insert(record.dataset.as_str());
            }
        }

        let mut phenos = BTreeMap::new();
        for (resource, phenocode) in pheno_keys {
            let pheno = self.meta.phenotype(resource, phenocode).map_err(|e| {
                tracing::error!("metadata of {}:{}: {}", resource, phenocode, e);
                e
            })?;
            phenos.insert(format!("{}:{}", resource, phenocode), pheno);
        }
        let mut datasets = BTreeMap::new();
        for dataset_id in dataset_ids.into_iter().filter(|id| *id != "NA") {
            if let Some(dataset) = self.meta.dataset(dataset_id)? {
                datasets.insert(dataset_id.to_string(), dataset);
            }
        }

        let most_severe: Vec<String> = data
            .iter()
            .flat_map(|entry| entry.gnomad.exomes.iter().chain(entry.gnomad.genomes.iter()))
            .filter_map(|record| record.most_severe.clone())
            .sorted()
            .dedup()
            .collect();

        let freq_summary = summarize_frequencies(
            data.iter().map(|entry| &entry.gnomad),
            &self.freq.populations(),
        );

        Ok(QueryResponse {
            data,
            most_severe,
            phenos,
            datasets,
            freq_summary,
            has_betas: false,
            has_custom_values: false,
            input_variants: None,
            meta: self.config.public(),
            query_type,
            time: Timings {
                gnomad: times.gnomad.as_secs_f64(),
                finemapped: times.finemapped.as_secs_f64(),
                assoc: times.assoc.as_secs_f64(),
                total: before_total.elapsed().as_secs_f64(),
            },
        })
    }
}

/// Whether `freq` has a coding consequence for `gene`.
///
/// Consequences without gene symbol match any gene.
fn is_coding_for(freq: &FrequencyData, gene: &str) -> bool {
    let Some(record) = freq.exomes_or_genomes() else {
        return false;
    };
    record.consequences.iter().any(|c| {
        let gene_matches = match c.gene_symbol.as_deref() {
            None | Some("") => true,
            Some(symbol) => symbol.eq_ignore_ascii_case(gene),
        };
        gene_matches && CODING_CONSEQUENCES.contains(&c.consequence.as_str())
    })
}
