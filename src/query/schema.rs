//! Response payload of a query.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use super::summary::PopulationSummary;
use crate::{
    conf::PublicConfig,
    fetch::{assoc::AssocResults, finemapped::FinemappedResults, freq::FrequencyData},
    meta::{Dataset, Phenotype},
};

/// Kind of query that produced the response.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueryType {
    Variant,
    Gene,
}

/// Weight and label given to a variant in group mode.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InputWeight {
    pub beta: f64,
    pub value: Option<String>,
}

/// Merged results of one variant.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VariantEntry {
    /// Canonical variant id.
    pub variant: String,
    #[serde(flatten)]
    pub input: Option<InputWeight>,
    pub gnomad: FrequencyData,
    pub finemapped: FinemappedResults,
    pub assoc: AssocResults,
}

/// Classification of the input tokens.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct InputVariants {
    pub found: IndexSet<String>,
    pub not_found: IndexSet<String>,
    pub ac0: IndexSet<String>,
    pub unparsed: IndexSet<String>,
    /// Input token to the canonical variant ids it resolved to.
    pub rsid_map: IndexMap<String, Vec<String>>,
}

/// Accumulated stage timings in seconds.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Timings {
    pub gnomad: f64,
    pub finemapped: f64,
    pub assoc: f64,
    pub total: f64,
}

/// The full response of a variant or gene query.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub data: Vec<VariantEntry>,
    /// Sorted, distinct most severe consequences of the result variants.
    pub most_severe: Vec<String>,
    /// Phenotype metadata keyed by `resource:phenocode`.
    pub phenos: BTreeMap<String, Phenotype>,
    pub datasets: BTreeMap<String, Dataset>,
    pub freq_summary: Vec<PopulationSummary>,
    pub has_betas: bool,
    pub has_custom_values: bool,
    pub input_variants: Option<InputVariants>,
    pub meta: PublicConfig,
    pub query_type: QueryType,
    pub time: Timings,
}
