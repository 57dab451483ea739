//! Assembly of the padded `(isolates, 5, L_max, loci)` input tensor

use crate::data::feature_engineering::one_hot;
use crate::data::preprocessing::{select_rows, GenoPhenoTable, TrainTestSplit};
use crate::data::sparse::SparseTensor;
use crate::data::NUM_CHANNELS;
use crate::error::{PrepError, PrepResult};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array4};
use tracing::{debug, info};

/// Dense one-hot input tensor with its locus layout
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    /// Shape `(n_isolates, 5, l_max, n_loci)`
    pub data: Array4<u8>,
    /// Locus names along the last axis
    pub loci: Vec<String>,
    /// Encoded length of each locus; positions beyond it are padding
    pub locus_lengths: Vec<usize>,
}

impl InputTensor {
    pub fn n_isolates(&self) -> usize {
        self.data.dim().0
    }

    /// Longest locus length (size of the third axis)
    pub fn max_length(&self) -> usize {
        self.data.dim().2
    }

    pub fn to_sparse(&self) -> PrepResult<SparseTensor> {
        SparseTensor::from_dense(&self.data)
    }

    /// Training and test tensors for a row split
    pub fn split(&self, split: &TrainTestSplit) -> PrepResult<(InputTensor, InputTensor)> {
        let n = self.n_isolates();
        if let Some(&bad) = split.train.iter().chain(&split.test).find(|&&i| i >= n) {
            return Err(PrepError::shape("split index", &[n], &[bad]));
        }

        let part = |rows: &[usize]| InputTensor {
            data: select_rows(&self.data, rows),
            loci: self.loci.clone(),
            locus_lengths: self.locus_lengths.clone(),
        };
        Ok((part(&split.train), part(&split.test)))
    }
}

/// Builds an [`InputTensor`] from a merged genotype/phenotype table
pub struct TensorAssembler {
    allow_ragged: bool,
    show_progress: bool,
}

impl TensorAssembler {
    /// `allow_ragged` pads shorter sequences within a locus instead of failing
    pub fn new(allow_ragged: bool) -> Self {
        Self {
            allow_ragged,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Encoded length of every locus column.
    ///
    /// In strict mode all isolates must agree with the first one; in ragged
    /// mode the longest sequence sets the column length.
    pub fn locus_lengths(&self, table: &GenoPhenoTable) -> PrepResult<Vec<usize>> {
        let first = table
            .records
            .first()
            .ok_or_else(|| PrepError::EmptyInput("merged table has no isolates".to_string()))?;

        let mut lengths = Vec::with_capacity(table.loci.len());
        for (k, locus) in table.loci.iter().enumerate() {
            let expected = first.sequences[k].chars().count();
            let mut longest = expected;

            for record in &table.records {
                let found = record.sequences[k].chars().count();
                if found != expected && !self.allow_ragged {
                    return Err(PrepError::LocusLengthMismatch {
                        locus: locus.clone(),
                        isolate: record.isolate.clone(),
                        expected,
                        found,
                    });
                }
                longest = longest.max(found);
            }

            debug!("Locus {} has length {}", locus, longest);
            lengths.push(longest);
        }

        Ok(lengths)
    }

    /// Allocate the zero tensor and write each isolate's one-hot loci into it
    pub fn assemble(&self, table: &GenoPhenoTable) -> PrepResult<InputTensor> {
        if table.loci.is_empty() {
            return Err(PrepError::EmptyInput("no loci in panel".to_string()));
        }
        for record in &table.records {
            if record.sequences.len() != table.loci.len() {
                return Err(PrepError::shape(
                    format!("loci of isolate {}", record.isolate),
                    &[table.loci.len()],
                    &[record.sequences.len()],
                ));
            }
        }

        let lengths = self.locus_lengths(table)?;
        let l_max = lengths.iter().copied().max().unwrap_or(0);
        let n_isolates = table.len();
        let n_loci = table.loci.len();
        info!(
            "Found {} loci, longest locus {}; allocating ({}, {}, {}, {})",
            n_loci, l_max, n_isolates, NUM_CHANNELS, l_max, n_loci
        );

        let mut data = Array4::<u8>::zeros((n_isolates, NUM_CHANNELS, l_max, n_loci));
        let progress = self.progress_bar(n_isolates as u64);

        for (i, record) in table.records.iter().enumerate() {
            for (k, seq) in record.sequences.iter().enumerate() {
                let encoded = one_hot(seq)?;
                let len = encoded.nrows();
                data.slice_mut(s![i, .., ..len, k]).assign(&encoded.t());
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        Ok(InputTensor {
            data,
            loci: table.loci.clone(),
            locus_lengths: lengths,
        })
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} isolates encoded",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len).with_style(style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessing::IsolateRecord;
    use crate::data::Phenotype;
    use std::collections::BTreeMap;

    fn table(rows: &[(&str, [&str; 3])]) -> GenoPhenoTable {
        GenoPhenoTable {
            loci: vec!["gyrBA".into(), "rpoBC".into(), "pncA".into()],
            drugs: vec!["RIFAMPICIN".into()],
            records: rows
                .iter()
                .map(|(isolate, seqs)| IsolateRecord {
                    isolate: isolate.to_string(),
                    sequences: seqs.iter().map(|s| s.to_string()).collect(),
                    phenotypes: vec![Phenotype::Sensitive],
                    metadata: BTreeMap::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_assemble_shape_and_padding() {
        let table = table(&[
            ("I1", ["AC", "GTA-", "A"]),
            ("I2", ["TT", "AAAA", "-"]),
        ]);
        let tensor = TensorAssembler::new(false).assemble(&table).unwrap();

        assert_eq!(tensor.data.dim(), (2, 5, 4, 3));
        assert_eq!(tensor.locus_lengths, vec![2, 4, 1]);
        assert_eq!(tensor.max_length(), 4);

        // I1 / gyrBA: A at 0, C at 1
        assert_eq!(tensor.data[[0, 0, 0, 0]], 1);
        assert_eq!(tensor.data[[0, 1, 1, 0]], 1);
        // I1 / rpoBC: gap at position 3
        assert_eq!(tensor.data[[0, 4, 3, 1]], 1);
        // I2 / pncA: gap at position 0
        assert_eq!(tensor.data[[1, 4, 0, 2]], 1);

        for i in 0..2 {
            for (k, &len) in tensor.locus_lengths.iter().enumerate() {
                for p in 0..tensor.max_length() {
                    let column_sum: u8 = (0..NUM_CHANNELS).map(|c| tensor.data[[i, c, p, k]]).sum();
                    assert_eq!(column_sum, u8::from(p < len));
                }
            }
        }
    }

    #[test]
    fn test_strict_length_mismatch() {
        let table = table(&[("I1", ["AC", "GTA-", "A"]), ("I2", ["TT", "AAA", "-"])]);
        let err = TensorAssembler::new(false).assemble(&table).unwrap_err();

        assert_eq!(
            err,
            PrepError::LocusLengthMismatch {
                locus: "rpoBC".to_string(),
                isolate: "I2".to_string(),
                expected: 4,
                found: 3,
            }
        );
    }

    #[test]
    fn test_ragged_padding() {
        let table = table(&[("I1", ["AC", "GT", "A"]), ("I2", ["TT", "AAAAA", "-"])]);
        let tensor = TensorAssembler::new(true).assemble(&table).unwrap();

        assert_eq!(tensor.locus_lengths, vec![2, 5, 1]);
        assert_eq!(tensor.data.dim(), (2, 5, 5, 3));
        let padded: u8 = tensor.data.slice(s![0, .., 2.., 1]).sum();
        assert_eq!(padded, 0);
    }

    #[test]
    fn test_empty_table() {
        let table = table(&[]);
        assert!(matches!(
            TensorAssembler::new(false).assemble(&table),
            Err(PrepError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_split_and_sparse() {
        let table = table(&[("I1", ["AC", "G", "A"]), ("I2", ["TT", "C", "-"]), ("I3", ["GG", "T", "C"])]);
        let tensor = TensorAssembler::new(false).assemble(&table).unwrap();

        let split = TrainTestSplit { train: vec![2, 0], test: vec![1] };
        let (train, test) = tensor.split(&split).unwrap();
        assert_eq!(train.n_isolates(), 2);
        assert_eq!(test.n_isolates(), 1);
        assert_eq!(train.data.slice(s![0, .., .., ..]), tensor.data.slice(s![2, .., .., ..]));

        let sparse = tensor.to_sparse().unwrap();
        assert_eq!(sparse.nnz(), 3 * (2 + 1 + 1));
        assert_eq!(sparse.to_dense().unwrap(), tensor.data);
    }
}
