use crate::data::genotype::GenotypeTable;
use crate::data::phenotype::PhenotypeTable;
use crate::data::sparse::SparseTensor;
use crate::data::Phenotype;
use crate::error::{PrepError, PrepResult};
use crate::utils::io::{open_reader, FileWriter};
use anyhow::{anyhow, Result};
use bincode::{Decode, Encode};
use ndarray::{Array, Array2, Axis, RemoveAxis};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// One isolate with a sequence for every locus and a label for every drug
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct IsolateRecord {
    pub isolate: String,
    /// Sequences in locus order
    pub sequences: Vec<String>,
    /// Phenotypes in drug order
    pub phenotypes: Vec<Phenotype>,
    pub metadata: BTreeMap<String, String>,
}

/// Inner join of genotypes and phenotypes, ordered by isolate identifier
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct GenoPhenoTable {
    pub loci: Vec<String>,
    pub drugs: Vec<String>,
    pub records: Vec<IsolateRecord>,
}

impl GenoPhenoTable {
    /// Join on isolate identifier.
    ///
    /// Isolates missing any locus, or without a phenotype row, are dropped.
    pub fn merge(genotypes: &GenotypeTable, phenotypes: &PhenotypeTable) -> Self {
        let by_isolate: HashMap<&str, usize> = phenotypes
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.isolate.as_str(), i))
            .collect();

        let mut records = Vec::new();
        for (isolate, sequences) in genotypes.complete_rows() {
            if let Some(&i) = by_isolate.get(isolate) {
                let row = &phenotypes.rows[i];
                records.push(IsolateRecord {
                    isolate: isolate.to_string(),
                    sequences: sequences.into_iter().map(str::to_string).collect(),
                    phenotypes: row.labels.clone(),
                    metadata: row.metadata.clone(),
                });
            }
        }

        let incomplete = genotypes.incomplete_count();
        let without_genotype = phenotypes.len().saturating_sub(records.len());
        info!(
            "Merged table: {} isolates ({} phenotyped isolates without a complete genotype, {} genotyped isolates missing a locus)",
            records.len(),
            without_genotype,
            incomplete
        );

        Self {
            loci: genotypes.loci().to_vec(),
            drugs: phenotypes.drugs.clone(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Numeric label matrix (isolates x drugs)
    pub fn label_matrix(&self) -> Array2<i8> {
        Array2::from_shape_fn((self.records.len(), self.drugs.len()), |(i, j)| {
            self.records[i].phenotypes[j].code()
        })
    }

    /// Value of a metadata column for every isolate, in row order
    pub fn metadata_column(&self, column: &str) -> Vec<Option<&str>> {
        self.records
            .iter()
            .map(|r| r.metadata.get(column).map(String::as_str))
            .collect()
    }

    /// Write with bincode (gzipped if the path ends in `.gz`)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = FileWriter::create(path)?;
        bincode::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| anyhow!("Failed to encode table {:?}: {}", path, e))?;
        writer.finish()?;
        info!("Saved {} isolates to {:?}", self.len(), path);
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = open_reader(path)?;
        let table: Self = bincode::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| anyhow!("Failed to decode table {:?}: {}", path, e))?;
        info!("Loaded {} isolates from {:?}", table.len(), path);
        Ok(table)
    }
}

/// Row indices of the training and test partitions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Rows whose category equals `train_category` go to train, all others
/// (including rows without a value) to test. Row order is preserved.
pub fn split_by_category(categories: &[Option<&str>], train_category: &str) -> TrainTestSplit {
    let mut split = TrainTestSplit::default();

    for (i, category) in categories.iter().enumerate() {
        if *category == Some(train_category) {
            split.train.push(i);
        } else {
            split.test.push(i);
        }
    }

    info!(
        "Dataset split on {:?}: train={}, test={}",
        train_category,
        split.train.len(),
        split.test.len()
    );
    if split.train.is_empty() {
        warn!("No rows match training category {:?}", train_category);
    }

    split
}

/// Select rows (first axis) of any array
pub fn select_rows<A, D>(array: &Array<A, D>, indices: &[usize]) -> Array<A, D>
where
    A: Clone,
    D: RemoveAxis,
{
    array.select(Axis(0), indices)
}

/// Split a sparse tensor by row, densifying only for the selection
pub fn split_sparse(
    tensor: &SparseTensor,
    split: &TrainTestSplit,
) -> PrepResult<(SparseTensor, SparseTensor)> {
    let n_rows = tensor.shape()[0];
    if let Some(&bad) = split.train.iter().chain(&split.test).find(|&&i| i >= n_rows) {
        return Err(PrepError::shape("split index", &[n_rows], &[bad]));
    }

    let dense = tensor.to_dense()?;
    let train = SparseTensor::from_dense(&select_rows(&dense, &split.train))?;
    let test = SparseTensor::from_dense(&select_rows(&dense, &split.test))?;
    drop(dense);

    debug!("Split tensor: train nnz={}, test nnz={}", train.nnz(), test.nnz());
    Ok((train, test))
}
