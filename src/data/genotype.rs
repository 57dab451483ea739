//! Per-isolate, per-locus sequence table built from one FASTA file per locus

use crate::data::loader::{FastaReader, FastaRecord};
use crate::data::{locus_name, PanelConfig};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Isolate identifier from a FASTA record id: last `/` segment, cut at `suffix`
pub fn normalize_isolate_id<'a>(record_id: &'a str, suffix: &str) -> &'a str {
    let last = record_id.rsplit('/').next().unwrap_or(record_id);
    if suffix.is_empty() {
        return last;
    }
    last.split(suffix).next().unwrap_or(last)
}

/// Outer join of all loci on isolate identifier.
///
/// Columns always follow the locus order the table was created with.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeTable {
    loci: Vec<String>,
    rows: BTreeMap<String, Vec<Option<String>>>,
}

impl GenotypeTable {
    /// Empty table with the given column order
    pub fn new(loci: Vec<String>) -> Self {
        Self {
            loci,
            rows: BTreeMap::new(),
        }
    }

    /// Locus column names
    pub fn loci(&self) -> &[String] {
        &self.loci
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sequences of one isolate, `None` where a locus is absent
    pub fn get(&self, isolate: &str) -> Option<&[Option<String>]> {
        self.rows.get(isolate).map(Vec::as_slice)
    }

    /// Add the records of one locus column.
    ///
    /// Records of a later locus file never reorder columns; a record id seen
    /// twice within a locus keeps the last sequence.
    pub fn insert_locus(&mut self, locus: &str, records: &[(String, String)]) -> Result<()> {
        let column = self
            .loci
            .iter()
            .position(|l| l == locus)
            .with_context(|| format!("Locus {} is not part of the panel", locus))?;

        let n_loci = self.loci.len();
        for (isolate, seq) in records {
            let row = self
                .rows
                .entry(isolate.clone())
                .or_insert_with(|| vec![None; n_loci]);
            if row[column].is_some() {
                debug!("Duplicate record for isolate {} at locus {}", isolate, locus);
            }
            row[column] = Some(seq.clone());
        }

        Ok(())
    }

    /// Rows with a sequence for every locus, in isolate order
    pub fn complete_rows(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.rows.iter().filter_map(|(isolate, seqs)| {
            seqs.iter()
                .map(|s| s.as_deref())
                .collect::<Option<Vec<&str>>>()
                .map(|seqs| (isolate.as_str(), seqs))
        })
    }

    /// Number of isolates missing at least one locus
    pub fn incomplete_count(&self) -> usize {
        self.rows
            .values()
            .filter(|seqs| seqs.iter().any(Option::is_none))
            .count()
    }
}

/// Builds a [`GenotypeTable`] from a directory of `<locus>.fasta` files
pub struct GenotypeTableBuilder<'a> {
    config: &'a PanelConfig,
}

impl<'a> GenotypeTableBuilder<'a> {
    pub fn new(config: &'a PanelConfig) -> Self {
        Self { config }
    }

    /// FASTA path for a locus file stem, preferring an uncompressed file
    pub fn locus_path(dir: &Path, stem: &str) -> PathBuf {
        let plain = dir.join(format!("{}.fasta", stem));
        let gzipped = dir.join(format!("{}.fasta.gz", stem));
        if !plain.is_file() && gzipped.is_file() {
            gzipped
        } else {
            plain
        }
    }

    /// Read every locus of the panel from `dir`
    pub fn build<P: AsRef<Path>>(&self, dir: P) -> Result<GenotypeTable> {
        let dir = dir.as_ref();
        let mut table = GenotypeTable::new(self.config.locus_names());

        for stem in &self.config.loci {
            let path = Self::locus_path(dir, stem);
            info!("Reading FASTA file {:?}", path);

            let records = FastaReader::open(&path)?
                .read_all()
                .with_context(|| format!("Failed to read FASTA {:?}", path))?;
            info!("Found {} sequences for {}", records.len(), locus_name(stem));

            self.insert_records(&mut table, stem, &records)?;
        }

        info!("Genotype table has {} isolates", table.len());
        let incomplete = table.incomplete_count();
        if incomplete > 0 {
            warn!("{} isolates are missing at least one locus", incomplete);
        }

        Ok(table)
    }

    /// Add one locus worth of FASTA records to `table`
    pub fn insert_records(
        &self,
        table: &mut GenotypeTable,
        stem: &str,
        records: &[FastaRecord],
    ) -> Result<()> {
        let keyed: Vec<(String, String)> = records
            .iter()
            .map(|r| {
                (
                    normalize_isolate_id(&r.id, &self.config.record_suffix).to_string(),
                    r.seq.clone(),
                )
            })
            .collect();
        table.insert_locus(locus_name(stem), &keyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config() -> PanelConfig {
        PanelConfig::new().with_loci(vec![
            "gyrBA_20201206".to_string(),
            "rpoBC_20201206".to_string(),
            "KatG_20201206".to_string(),
        ])
    }

    fn record(id: &str, seq: &str) -> FastaRecord {
        FastaRecord {
            id: id.to_string(),
            seq: seq.to_string(),
        }
    }

    #[test]
    fn test_normalize_isolate_id() {
        assert_eq!(normalize_isolate_id("data/run1/ISO_1.cut.fasta", ".cut"), "ISO_1");
        assert_eq!(normalize_isolate_id("ISO2", ".cut"), "ISO2");
        assert_eq!(normalize_isolate_id("a/b/ISO3.cut", ""), "ISO3.cut");
    }

    #[test]
    fn test_locus_order_independent_of_insertion() {
        let config = test_config();
        let builder = GenotypeTableBuilder::new(&config);

        let mut forward = GenotypeTable::new(config.locus_names());
        let mut reverse = GenotypeTable::new(config.locus_names());

        let per_locus = [
            ("gyrBA_20201206", vec![record("x/I1.cut", "AA"), record("I2", "AC")]),
            ("rpoBC_20201206", vec![record("I1", "CCC"), record("I2", "CCA")]),
            ("KatG_20201206", vec![record("I1", "G"), record("I3", "T")]),
        ];

        for (stem, records) in per_locus.iter() {
            builder.insert_records(&mut forward, stem, records).unwrap();
        }
        for (stem, records) in per_locus.iter().rev() {
            builder.insert_records(&mut reverse, stem, records).unwrap();
        }

        assert_eq!(forward, reverse);
        assert_eq!(forward.loci(), &["gyrBA", "rpoBC", "KatG"]);
        assert_eq!(
            forward.get("I1").unwrap(),
            &[Some("AA".to_string()), Some("CCC".to_string()), Some("G".to_string())]
        );
        assert_eq!(forward.get("I3").unwrap(), &[None, None, Some("T".to_string())]);
        assert_eq!(forward.len(), 3);
        assert_eq!(forward.incomplete_count(), 2);

        let complete: Vec<_> = forward.complete_rows().collect();
        assert_eq!(complete, vec![("I1", vec!["AA", "CCC", "G"])]);
    }

    #[test]
    fn test_unknown_locus() {
        let mut table = GenotypeTable::new(vec!["rpoBC".to_string()]);
        assert!(table.insert_locus("pncA", &[]).is_err());
    }

    #[test]
    fn test_build_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gyrBA_20201206.fasta"), ">I1\nAC\n>I2\nAA\n").unwrap();
        fs::write(dir.path().join("rpoBC_20201206.fasta"), ">p/I1.cut\nAAA\n").unwrap();
        fs::write(dir.path().join("KatG_20201206.fasta"), ">I1\nG\n>I2\nT\n").unwrap();

        let config = test_config();
        let table = GenotypeTableBuilder::new(&config).build(dir.path()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.complete_rows().count(), 1);
        assert_eq!(table.get("I2").unwrap()[1], None);
    }

    #[test]
    fn test_build_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        assert!(GenotypeTableBuilder::new(&config).build(dir.path()).is_err());
    }
}
