//! Phenotype and dataset metadata from the SQLite metadata store.

use std::path::Path;

use rusqlite::{params, types::Value, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{common::pool::HandlePool, err::LookupError, rsid::open_read_only};

/// Descriptor of a trait (phenotype) of one resource.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Phenotype {
    pub resource: String,
    pub data_type: Option<String>,
    pub trait_type: Option<String>,
    pub phenocode: String,
    pub phenostring: Option<String>,
    pub category: Option<String>,
    pub chromosome: Option<String>,
    pub gene_start: Option<i64>,
    pub gene_end: Option<i64>,
    pub strand: Option<String>,
    pub num_samples: Option<i64>,
    pub num_cases: Option<i64>,
    pub num_controls: Option<i64>,
    pub pub_author: Option<String>,
    pub pub_date: Option<String>,
    /// Whether this is the synthesized placeholder for phenocode `NA`.
    pub is_na: bool,
}

impl Phenotype {
    /// Placeholder returned for phenocode `NA` when the store has no row.
    pub fn placeholder(resource: &str) -> Self {
        let na = || Some("NA".to_string());
        Self {
            resource: resource.to_string(),
            data_type: na(),
            trait_type: na(),
            phenocode: "NA".to_string(),
            phenostring: na(),
            num_samples: Some(0),
            num_cases: Some(0),
            num_controls: Some(0),
            pub_author: na(),
            pub_date: na(),
            is_na: true,
            ..Default::default()
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            resource: text(row.get(0)?).unwrap_or_default(),
            data_type: text(row.get(1)?),
            trait_type: text(row.get(2)?),
            phenocode: text(row.get(3)?).unwrap_or_default(),
            phenostring: text(row.get(4)?),
            category: text(row.get(5)?),
            chromosome: text(row.get(6)?),
            gene_start: int(row.get(7)?),
            gene_end: int(row.get(8)?),
            strand: text(row.get(9)?),
            num_samples: int(row.get(10)?),
            num_cases: int(row.get(11)?),
            num_controls: int(row.get(12)?),
            pub_author: text(row.get(13)?),
            pub_date: text(row.get(14)?),
            is_na: false,
        })
    }
}

/// Descriptor of a dataset, e.g., a tissue-specific QTL study.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub resource: Option<String>,
    pub data_type: Option<String>,
    pub dataset_id: String,
    pub study_id: Option<String>,
    pub study_label: Option<String>,
    pub sample_group: Option<String>,
    pub tissue_id: Option<String>,
    pub tissue_label: Option<String>,
    pub condition_label: Option<String>,
    pub sample_size: Option<i64>,
    pub quant_method: Option<String>,
}

impl Dataset {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            resource: text(row.get(0)?),
            data_type: text(row.get(1)?),
            dataset_id: text(row.get(2)?).unwrap_or_default(),
            study_id: text(row.get(3)?),
            study_label: text(row.get(4)?),
            sample_group: text(row.get(5)?),
            tissue_id: text(row.get(6)?),
            tissue_label: text(row.get(7)?),
            condition_label: text(row.get(8)?),
            sample_size: int(row.get(9)?),
            quant_method: text(row.get(10)?),
        })
    }
}

/// The metadata tables are loosely typed; accept whatever SQLite stored.
fn text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn int(value: Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(i),
        Value::Real(f) => Some(f as i64),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Null | Value::Blob(_) => None,
    }
}

/// Read-only access to the `trait` and `dataset` tables.
#[derive(Debug)]
pub struct MetadataDb {
    conns: HandlePool<Connection>,
}

impl MetadataDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref().to_path_buf();
        let label = format!("metadata db {}", path.display());
        let conns = HandlePool::new(&label, move || open_read_only(&path));
        drop(conns.checkout()?);
        Ok(Self { conns })
    }

    /// Look up the phenotype `phenocode` of `resource`.
    pub fn phenotype(&self, resource: &str, phenocode: &str) -> Result<Phenotype, LookupError> {
        let data_err = |e: rusqlite::Error| {
            LookupError::Data(format!(
                "problem reading trait {resource}:{phenocode} from metadata db: {e}"
            ))
        };
        let conn = self
            .conns
            .checkout()
            .map_err(|e| LookupError::Data(e.to_string()))?;
        let found = conn
            .prepare_cached(
                "SELECT resource, data_type, trait_type, phenocode, phenostring, category,
                        chromosome, gene_start, gene_end, strand,
                        num_samples, num_cases, num_controls,
                        pub_author, pub_date
                 FROM trait
                 WHERE resource = ?1 AND phenocode = ?2",
            )
            .map_err(data_err)?
            .query_row(params![resource, phenocode], Phenotype::from_row)
            .optional()
            .map_err(data_err)?;

        match found {
            Some(pheno) => Ok(pheno),
            None if phenocode == "NA" => Ok(Phenotype::placeholder(resource)),
            None => Err(LookupError::Data(format!(
                "No trait found in metadata db for resource {} phenocode: {}",
                resource, phenocode
            ))),
        }
    }

    /// Look up dataset `dataset_id`; absence is not an error.
    pub fn dataset(&self, dataset_id: &str) -> Result<Option<Dataset>, LookupError> {
        let data_err = |e: rusqlite::Error| {
            LookupError::Data(format!(
                "problem reading dataset {dataset_id} from metadata db: {e}"
            ))
        };
        let conn = self
            .conns
            .checkout()
            .map_err(|e| LookupError::Data(e.to_string()))?;
        let result = conn
            .prepare_cached(
                "SELECT resource, data_type, dataset_id, study_id, study_label,
                        sample_group, tissue_id, tissue_label, condition_label,
                        sample_size, quant_method
                 FROM dataset
                 WHERE dataset_id = ?1",
            )
            .map_err(data_err)?
            .query_row(params![dataset_id], Dataset::from_row)
            .optional()
            .map_err(data_err)?;
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use rusqlite::Connection;

    use super::{MetadataDb, Phenotype};
    use crate::err::LookupError;

    pub fn write_metadata_db(path: &std::path::Path) -> Result<(), anyhow::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE trait (resource TEXT, data_type TEXT, trait_type TEXT, phenocode TEXT,
                phenostring TEXT, category TEXT, chromosome TEXT, gene_start INTEGER,
                gene_end INTEGER, strand TEXT, num_samples INTEGER, num_cases INTEGER,
                num_controls INTEGER, pub_author TEXT, pub_date TEXT);
             CREATE TABLE dataset (resource TEXT, data_type TEXT, dataset_id TEXT, study_id TEXT,
                study_label TEXT, sample_group TEXT, tissue_id TEXT, tissue_label TEXT,
                condition_label TEXT, sample_size INTEGER, quant_method TEXT);
             INSERT INTO trait VALUES ('FinnGen', 'GWAS', 'binary', 'T2D', 'Type 2 diabetes',
                'Endocrine', NULL, NULL, NULL, NULL, 400000, '30000', 370000, 'Kurki', '2023');
             INSERT INTO trait VALUES ('eQTL_Catalogue_R6', 'sQTL', 'continuous',
                'QTD000001:ENSG1', 'ENSG1 splicing', NULL, '1', 100, 200, '+', 500, NULL, NULL,
                'Kerimov', '2021');
             INSERT INTO dataset VALUES ('eQTL_Catalogue_R6', 'sQTL', 'QTD000001', 'QTS1',
                'Alasoo_2018', 'macrophage_naive', 'CL_0000235', 'macrophage', 'naive', 84,
                'leafcutter');",
        )?;
        Ok(())
    }

    pub struct MetaFixture {
        pub tmpdir: temp_testdir::TempDir,
        pub db: MetadataDb,
    }

    #[fixture]
    pub fn meta_db() -> MetaFixture {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("meta.db");
        write_metadata_db(&path).expect("could not write metadata db");
        let db = MetadataDb::open(&path).expect("could not open metadata db");
        MetaFixture { tmpdir, db }
    }

    #[rstest]
    fn phenotype_found(meta_db: MetaFixture) -> Result<(), anyhow::Error> {
        let pheno = meta_db.db.phenotype("FinnGen", "T2D")?;
        assert_eq!(pheno.phenostring.as_deref(), Some("Type 2 diabetes"));
        assert_eq!(pheno.num_cases, Some(30000));
        assert!(!pheno.is_na);

        Ok(())
    }

    #[rstest]
    fn phenotype_na_placeholder(meta_db: MetaFixture) -> Result<(), anyhow::Error> {
        let pheno = meta_db.db.phenotype("FinnGen", "NA")?;
        assert_eq!(pheno, Phenotype::placeholder("FinnGen"));
        assert!(pheno.is_na);
        assert_eq!(pheno.num_samples, Some(0));

        Ok(())
    }

    #[rstest]
    fn phenotype_missing_is_data_error(meta_db: MetaFixture) {
        assert!(matches!(
            meta_db.db.phenotype("FinnGen", "NOPE"),
            Err(LookupError::Data(_))
        ));
    }

    #[rstest]
    fn dataset_lookup(meta_db: MetaFixture) -> Result<(), anyhow::Error> {
        let dataset = meta_db.db.dataset("QTD000001")?;
        assert_eq!(
            dataset.as_ref().and_then(|d| d.tissue_label.as_deref()),
            Some("macrophage")
        );
        assert_eq!(meta_db.db.dataset("NA")?, None);

        Ok(())
    }
}
