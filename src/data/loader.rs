use crate::data::phenotype::{RawPhenotypeRow, RawPhenotypeTable};
use crate::utils::io::open_reader;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Supported delimited file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(anyhow::anyhow!("Cannot determine format of gzipped file {:?}", path))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(anyhow::anyhow!("Unsupported file format: {:?}", path)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }
}

/// A FASTA record: identifier (header up to the first whitespace) and sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FastaRecord {
    pub id: String,
    pub seq: String,
}

/// Sequential FASTA reader over plain or gzipped input
pub struct FastaReader<R: BufRead> {
    reader: R,
    line_buf: String,
    next_id: Option<String>,
}

impl FastaReader<Box<dyn BufRead>> {
    /// Open a FASTA file (`.gz` is decompressed transparently)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_reader(path)
            .with_context(|| format!("Failed to open FASTA {:?}", path))?;
        Self::new(reader)
    }
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut fasta = Self {
            reader,
            line_buf: String::with_capacity(256),
            next_id: None,
        };

        // skip anything before the first header
        loop {
            fasta.line_buf.clear();
            if fasta.reader.read_line(&mut fasta.line_buf)? == 0 {
                break;
            }
            if let Some(header) = fasta.line_buf.strip_prefix('>') {
                fasta.next_id = Some(header_id(header));
                break;
            }
        }

        Ok(fasta)
    }

    /// Read the next record, `Ok(None)` at end of input
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        let id = match self.next_id.take() {
            Some(id) => id,
            None => return Ok(None),
        };

        let mut seq = String::new();
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }
            if let Some(header) = self.line_buf.strip_prefix('>') {
                self.next_id = Some(header_id(header));
                break;
            }
            seq.push_str(self.line_buf.trim_end());
        }

        Ok(Some(FastaRecord { id, seq }))
    }

    /// Read all remaining records
    pub fn read_all(&mut self) -> Result<Vec<FastaRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }
}

fn header_id(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}

/// Loader for the per-isolate phenotype table
pub struct PhenotypeLoader {
    isolate_column: String,
    drugs: Vec<String>,
}

impl PhenotypeLoader {
    pub fn new(isolate_column: impl Into<String>, drugs: &[String]) -> Self {
        Self {
            isolate_column: isolate_column.into(),
            drugs: drugs.to_vec(),
        }
    }

    /// Load raw phenotype labels from a delimited file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<RawPhenotypeTable> {
        let path = path.as_ref();
        info!("Loading phenotypes from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let reader = open_reader(path)
            .with_context(|| format!("Failed to open phenotype file {:?}", path))?;
        let table = self.parse_records(reader, format)?;

        info!("Loaded phenotypes for {} isolates", table.rows.len());
        Ok(table)
    }

    fn parse_records<R: Read>(&self, reader: R, format: FileFormat) -> Result<RawPhenotypeTable> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|s| s.to_string())
            .collect();

        let isolate_idx = headers
            .iter()
            .position(|h| *h == self.isolate_column)
            .with_context(|| format!("Missing required column: {}", self.isolate_column))?;

        let drug_idx: Vec<Option<usize>> = self
            .drugs
            .iter()
            .map(|drug| {
                let idx = headers.iter().position(|h| h == drug);
                if idx.is_none() {
                    warn!("No phenotype column for {}, treating as missing", drug);
                }
                idx
            })
            .collect();

        let metadata_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != isolate_idx && !drug_idx.contains(&Some(i)))
            .collect();

        let mut rows = Vec::new();
        let mut seen = HashSet::new();

        for (line, result) in csv_reader.records().enumerate() {
            let record = result
                .with_context(|| format!("Failed to parse phenotype record at line {}", line + 2))?;

            let isolate = match record.get(isolate_idx).map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    warn!("Skipping record at line {} without isolate identifier", line + 2);
                    continue;
                }
            };

            if !seen.insert(isolate.clone()) {
                warn!("Duplicate isolate {} at line {}, keeping first", isolate, line + 2);
                continue;
            }

            let labels = drug_idx
                .iter()
                .map(|idx| {
                    idx.and_then(|i| record.get(i))
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                })
                .collect();

            let metadata: BTreeMap<String, String> = metadata_idx
                .iter()
                .filter_map(|&i| {
                    record
                        .get(i)
                        .map(|v| (headers[i].clone(), v.trim().to_string()))
                })
                .collect();

            rows.push(RawPhenotypeRow {
                isolate,
                labels,
                metadata,
            });
        }

        Ok(RawPhenotypeTable {
            drugs: self.drugs.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_file_format_detection() {
        assert_eq!(FileFormat::from_path("data.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path("data.tsv").unwrap(), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path("data.csv.gz").unwrap(), FileFormat::GzippedCsv);
        assert_eq!(FileFormat::from_path("data.tsv.gz").unwrap(), FileFormat::GzippedTsv);
        assert!(FileFormat::from_path("data.fasta").is_err());
    }

    #[test]
    fn test_fasta_multiline() {
        let data = "junk\n>a/b/ISO1.cut desc\nACGT\nAC\n>ISO2\n\nTT-A\n";
        let mut reader = FastaReader::new(Cursor::new(data)).unwrap();
        let records = reader.read_all().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a/b/ISO1.cut");
        assert_eq!(records[0].seq, "ACGTAC");
        assert_eq!(records[1].id, "ISO2");
        assert_eq!(records[1].seq, "TT-A");
    }

    #[test]
    fn test_fasta_gzipped() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locus.fasta.gz");
        let mut gz = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        gz.write_all(b">ISO1\nACGT\n").unwrap();
        gz.finish().unwrap();

        let records = FastaReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(records, vec![FastaRecord { id: "ISO1".into(), seq: "ACGT".into() }]);
    }

    #[test]
    fn test_parse_phenotypes() {
        let csv_data = "Isolate,RIFAMPICIN,category\nI1,R,train\nI2,,test\nI1,S,train\n,S,x\n";
        let drugs = vec!["RIFAMPICIN".to_string(), "ISONIAZID".to_string()];
        let loader = PhenotypeLoader::new("Isolate", &drugs);

        let table = loader.parse_records(Cursor::new(csv_data), FileFormat::Csv).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].isolate, "I1");
        assert_eq!(table.rows[0].labels, vec![Some("R".to_string()), None]);
        assert_eq!(table.rows[1].labels, vec![None, None]);
        assert_eq!(table.rows[1].metadata.get("category").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_missing_isolate_column() {
        let loader = PhenotypeLoader::new("Isolate", &["RIFAMPICIN".to_string()]);
        let result = loader.parse_records(Cursor::new("id,RIFAMPICIN\nI1,R\n"), FileFormat::Csv);
        assert!(result.is_err());
    }
}
