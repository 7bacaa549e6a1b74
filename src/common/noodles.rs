//! Row sources backed by bgzip-compressed, tabix-indexed TSV files.

use std::{
    fs::File,
    io::{self, BufRead},
    path::{Path, PathBuf},
};

use noodles_bgzf as bgzf;
use noodles_core::Region;
use noodles_csi as csi;
use noodles_tabix as tabix;

use super::pool::HandlePool;

/// Access to the rows of a coordinate-indexed TSV file.
pub trait RowSource: Send + Sync {
    /// Column names from the header line, leading `#` removed.
    fn header(&self) -> &[String];

    /// Raw rows overlapping the 1-based, inclusive range `start..=end`.
    ///
    /// Unknown chromosomes yield no rows.
    fn fetch(&self, chrom: &str, start: u64, end: u64) -> Result<Vec<String>, anyhow::Error>;
}

type TabixReader = csi::io::IndexedReader<bgzf::Reader<File>, tabix::Index>;

/// Production `RowSource` reading with noodles.
///
/// One reader is checked out per lookup from a pool of lazily opened
/// readers; the index is loaded once and cloned into each new reader.
pub struct TabixSource {
    path: PathBuf,
    header: Vec<String>,
    readers: HandlePool<TabixReader>,
}

impl std::fmt::Debug for TabixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabixSource")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish()
    }
}

impl TabixSource {
    /// Open the file at `path`, reading the index from `{path}.tbi`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref().to_path_buf();
        let path_tbi = PathBuf::from(format!("{}.tbi", path.display()));
        let index = tabix::read(&path_tbi)
            .map_err(|e| anyhow::anyhow!("could not read tabix index {:?}: {}", &path_tbi, e))?;
        let header = read_header(&path)?;
        tracing::debug!("header of {:?}: {:?}", &path, &header);

        let path_reader = path.clone();
        let readers = HandlePool::new(&path.display().to_string(), move || {
            let file = File::open(&path_reader)?;
            Ok(csi::io::IndexedReader::new(file, index.clone()))
        });

        Ok(Self {
            path,
            header,
            readers,
        })
    }
}

/// Read the first line of the bgzip-compressed file at `path` as header.
fn read_header(path: &Path) -> Result<Vec<String>, anyhow::Error> {
    let mut reader = File::open(path)
        .map(bgzf::Reader::new)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path, e))?;
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| anyhow::anyhow!("could not read header of {:?}: {}", path, e))?;
    if !line.starts_with('#') {
        anyhow::bail!("first line of {:?} is not a header line: {:?}", path, line);
    }
    Ok(split_header(&line))
}

/// Split a header line into column names.
pub fn split_header(line: &str) -> Vec<String> {
    line.trim_end_matches(['\r', '\n'])
        .trim_start_matches('#')
        .split('\t')
        .map(|s| s.to_string())
        .collect()
}

impl RowSource for TabixSource {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn fetch(&self, chrom: &str, start: u64, end: u64) -> Result<Vec<String>, anyhow::Error> {
        let region: Region = format!("{}:{}-{}", chrom, start.max(1), end.max(1))
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid region {}:{}-{}: {}", chrom, start, end, e))?;

        let mut reader = self.readers.checkout()?;
        let query = match reader.query(&region) {
            Ok(query) => query,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                tracing::trace!("no contig {} in {:?}: {}", chrom, &self.path, e);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "problem querying {:?} for {}: {}",
                    &self.path,
                    &region,
                    e
                ))
            }
        };

        let mut rows = Vec::new();
        for result in query {
            let record = result
                .map_err(|e| anyhow::anyhow!("problem reading {:?}: {}", &self.path, e))?;
            rows.push(record.as_ref().to_string());
        }
        Ok(rows)
    }
}

/// In-memory `RowSource` for tests.
#[cfg(test)]
pub struct MemorySource {
    header: Vec<String>,
    rows: Vec<String>,
    chrom_col: usize,
    pos_col: usize,
}

#[cfg(test)]
impl MemorySource {
    /// Build from `lines`, the first of which is the header line.
    pub fn new(lines: &[&str], chrom_col: &str, pos_col: &str) -> Self {
        let header = split_header(lines[0]);
        let idx = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .unwrap_or_else(|| panic!("no column {name}"))
        };
        let (chrom_col, pos_col) = (idx(chrom_col), idx(pos_col));
        Self {
            header,
            rows: lines[1..].iter().map(|s| s.to_string()).collect(),
            chrom_col,
            pos_col,
        }
    }
}

#[cfg(test)]
impl RowSource for MemorySource {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn fetch(&self, chrom: &str, start: u64, end: u64) -> Result<Vec<String>, anyhow::Error> {
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                let fields: Vec<&str> = row.split('\t').collect();
                let pos: u64 = fields[self.pos_col].parse().unwrap_or_default();
                fields[self.chrom_col] == chrom && pos >= start && pos <= end
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod test {
    use std::{fs::File, io::Write, path::Path};

    use noodles_bgzf as bgzf;
    use noodles_core::Position;
    use noodles_csi::{self as csi, binning_index::index::reference_sequence::bin::Chunk};
    use noodles_tabix as tabix;
    use pretty_assertions::assert_eq;

    use super::{MemorySource, RowSource};

    #[test]
    fn split_header() {
        assert_eq!(
            super::split_header("#chr\tpos\tref\talt\n"),
            vec!["chr", "pos", "ref", "alt"]
        );
    }

    #[test]
    fn memory_source_fetch() -> Result<(), anyhow::Error> {
        let source = MemorySource::new(
            &["#chr\tpos\tref\talt", "1\t100\tA\tG", "1\t200\tC\tT", "2\t100\tA\tC"],
            "chr",
            "pos",
        );
        assert_eq!(source.fetch("1", 100, 100)?, vec!["1\t100\tA\tG"]);
        assert_eq!(source.fetch("1", 1, 1000)?.len(), 2);
        assert!(source.fetch("22", 1, 1000)?.is_empty());

        Ok(())
    }

    #[test]
    fn tabix_source_missing_file() {
        assert!(super::TabixSource::open("/nonexistent/file.tsv.gz").is_err());
    }

    /// Write `lines` bgzip-compressed to `path` together with a `.tbi` index
    /// on the first two columns.
    fn write_indexed_tsv(path: &Path, lines: &[&str]) -> Result<(), anyhow::Error> {
        let mut writer = bgzf::Writer::new(File::create(path)?);
        let mut indexer = tabix::index::Indexer::default();
        indexer.set_header(
            csi::binning_index::index::header::Builder::gff()
                .set_start_position_index(1)
                .set_end_position_index(Some(1))
                .build(),
        );

        writeln!(writer, "{}", lines[0])?;
        for line in &lines[1..] {
            let start = writer.virtual_position();
            writeln!(writer, "{}", line)?;
            let end = writer.virtual_position();

            let fields: Vec<&str> = line.split('\t').collect();
            let pos = Position::new(fields[1].parse()?)
                .ok_or_else(|| anyhow::anyhow!("invalid position in {:?}", line))?;
            indexer.add_record(fields[0], pos, pos, Chunk::new(start, end))?;
        }
        writer.finish()?;

        tabix::write(format!("{}.tbi", path.display()), &indexer.build())?;
        Ok(())
    }

    #[test]
    fn tabix_source_fetch() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("rows.tsv.gz");
        write_indexed_tsv(
            &path,
            &[
                "#chr\tpos\tval",
                "1\t100\ta",
                "1\t200\tb",
                "2\t100\tc",
            ],
        )?;

        let source = super::TabixSource::open(&path)?;
        assert_eq!(source.header().to_vec(), vec!["chr", "pos", "val"]);
        assert_eq!(source.fetch("1", 100, 100)?, vec!["1\t100\ta"]);
        assert_eq!(source.fetch("1", 1, 1000)?, vec!["1\t100\ta", "1\t200\tb"]);
        assert_eq!(source.fetch("2", 50, 150)?, vec!["2\t100\tc"]);
        assert!(source.fetch("1", 150, 150)?.is_empty());
        assert!(source.fetch("22", 1, 1000)?.is_empty());

        Ok(())
    }
}
