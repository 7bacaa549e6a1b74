//! Configuration file of the lookup engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fetch::DataType;

/// Top-level configuration, loaded from TOML.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximal number of variants accepted per query.
    #[serde(default = "default_max_query_variants")]
    pub max_query_variants: usize,
    /// Path to the SQLite metadata store.
    #[serde(skip_serializing)]
    pub metadata_db: PathBuf,
    /// Path to the gene range TSV.
    #[serde(skip_serializing)]
    pub gene_ranges: PathBuf,
    pub rsid_db: RsidDbConf,
    pub gnomad: GnomadConf,
    pub assoc: AssocConf,
    #[serde(default)]
    pub ld_assoc: Option<LdAssocConf>,
    pub finemapped: FinemappedConf,
}

fn default_max_query_variants() -> usize {
    2000
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RsidDbConf {
    #[serde(skip_serializing)]
    pub path: PathBuf,
}

/// Population frequency source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GnomadConf {
    #[serde(skip_serializing)]
    pub path: PathBuf,
    #[serde(default)]
    pub populations: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Link to a phenotype page; `[PHENOCODE]` is replaced by the frontend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PhenoUrl {
    pub url: String,
    pub label: String,
}

/// A resource whose records may appear in results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Resource {
    pub resource: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub n_traits: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pheno_urls: Vec<PhenoUrl>,
    #[serde(default)]
    pub p_thres: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AssocConf {
    #[serde(skip_serializing)]
    pub path: PathBuf,
    pub resources: Vec<Resource>,
}

/// LD-based association source.
///
/// `resource`, `dataset` and `data_type` apply to rows whose file does
/// not carry these columns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LdAssocConf {
    pub path: PathBuf,
    #[serde(default = "default_ld_resource")]
    pub resource: String,
    #[serde(default = "default_ld_dataset")]
    pub dataset: String,
    #[serde(default = "default_ld_data_type")]
    pub data_type: DataType,
}

fn default_ld_resource() -> String {
    "Open_Targets".into()
}

fn default_ld_dataset() -> String {
    "Open_Targets_22.09".into()
}

fn default_ld_data_type() -> DataType {
    DataType::Gwas
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FinemappedConf {
    #[serde(skip_serializing)]
    pub path: PathBuf,
    pub resources: Vec<Resource>,
}

/// The part of the configuration shown to clients.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PublicConfig {
    pub gnomad: GnomadConf,
    pub assoc: AssocConf,
    pub finemapped: FinemappedConf,
}

impl Config {
    /// Load configuration from the TOML file at `path`.
    ///
    /// Relative paths are resolved against the directory of `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let toml_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("could not read config file {:?}: {}", path, e))?;
        let mut config: Config = toml::from_str(&toml_str)
            .map_err(|e| anyhow::anyhow!("could not parse config file {:?}: {}", path, e))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.metadata_db);
        resolve(&mut self.gene_ranges);
        resolve(&mut self.rsid_db.path);
        resolve(&mut self.gnomad.path);
        resolve(&mut self.assoc.path);
        if let Some(ld_assoc) = self.ld_assoc.as_mut() {
            resolve(&mut ld_assoc.path);
        }
        resolve(&mut self.finemapped.path);
    }

    /// Configured association resources, in configuration order.
    pub fn assoc_resources(&self) -> Vec<String> {
        self.assoc
            .resources
            .iter()
            .map(|r| r.resource.clone())
            .collect()
    }

    /// Configured fine-mapping resources, in configuration order.
    pub fn finemapped_resources(&self) -> Vec<String> {
        self.finemapped
            .resources
            .iter()
            .map(|r| r.resource.clone())
            .collect()
    }

    pub fn public(&self) -> PublicConfig {
        PublicConfig {
            gnomad: self.gnomad.clone(),
            assoc: self.assoc.clone(),
            finemapped: self.finemapped.clone(),
        }
    }
}
