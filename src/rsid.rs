//! Resolution of rsIDs to canonical variants via an SQLite lookup table.

use std::{path::Path, str::FromStr};

use regex::Regex;
use rusqlite::{params, Connection, OpenFlags};

use crate::{common::pool::HandlePool, err::LookupError, variant::Variant};

/// A syntactically valid, lower-cased rsID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rsid(String);

impl Rsid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Rsid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

lazy_static::lazy_static! {
    static ref RSID_RE: Regex = Regex::new("^rs[0-9]+$").expect("invalid regex in source code");
}

impl FromStr for Rsid {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if RSID_RE.is_match(&lower) {
            Ok(Rsid(lower))
        } else {
            Err(LookupError::Parse("invalid rsid".into()))
        }
    }
}

/// Open an SQLite database read-only.
pub(crate) fn open_read_only(path: &Path) -> Result<Connection, anyhow::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| anyhow::anyhow!("could not open sqlite database {:?}: {}", path, e))
}

/// Lookup table `rsid(chr, pos, ref, alt, rsid)`.
#[derive(Debug)]
pub struct RsidDb {
    conns: HandlePool<Connection>,
}

impl RsidDb {
    /// Open the database at `path`; the first connection is opened eagerly.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref().to_path_buf();
        let label = format!("rsid db {}", path.display());
        let conns = HandlePool::new(&label, move || open_read_only(&path));
        drop(conns.checkout()?);
        Ok(Self { conns })
    }

    /// Return all variants stored for `rsid`, possibly none.
    pub fn lookup(&self, rsid: &Rsid) -> Result<Vec<Variant>, LookupError> {
        let data_err =
            |e: rusqlite::Error| LookupError::Data(format!("rsid lookup for {rsid}: {e}"));
        let conn = self
            .conns
            .checkout()
            .map_err(|e| LookupError::Data(e.to_string()))?;
        let mut stmt = conn
            .prepare_cached("SELECT chr, pos, ref, alt FROM rsid WHERE rsid = ?1")
            .map_err(data_err)?;
        let rows = stmt
            .query_map(params![rsid.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(data_err)?;

        let mut result = Vec::new();
        for row in rows {
            let (chrom, pos, reference, alternative) = row.map_err(data_err)?;
            match Variant::new(&chrom, pos.max(0) as u64, &reference, &alternative) {
                Ok(variant) => result.push(variant),
                Err(e) => tracing::warn!(
                    "skipping invalid variant {}-{}-{}-{} for {}: {}",
                    chrom,
                    pos,
                    reference,
                    alternative,
                    rsid,
                    e
                ),
            }
        }
        tracing::trace!("{} resolved to {:?}", rsid, &result);
        Ok(result)
    }
}
