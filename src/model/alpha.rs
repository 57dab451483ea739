//! Per-drug class-balance weights ("alpha" values).
//!
//! Each labeled isolate/drug pair carries its class and a weight derived from
//! the fraction of resistant isolates for that drug. Internally the entries
//! are explicit [`WeightedLabel`]s; the signed float form (sensitive > 0,
//! resistant < 0, missing = 0) is only used on disk and at the loss boundary.

use crate::data::{Phenotype, Resistance};
use crate::error::{PrepError, PrepResult};
use crate::utils::file_exists;
use crate::utils::io::{open_reader, FileWriter};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Class and weight of one labeled isolate/drug pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedLabel {
    pub label: Resistance,
    pub weight: f32,
}

impl WeightedLabel {
    /// Signed encoding: `+weight` for sensitive, `-weight` for resistant
    pub fn to_signed(self) -> f32 {
        match self.label {
            Resistance::Sensitive => self.weight,
            Resistance::Resistant => -self.weight,
        }
    }

    /// Inverse of [`WeightedLabel::to_signed`]; zero (and NaN) means unlabeled
    pub fn from_signed(value: f32) -> Option<Self> {
        if value > 0.0 {
            Some(Self {
                label: Resistance::Sensitive,
                weight: value,
            })
        } else if value < 0.0 {
            Some(Self {
                label: Resistance::Resistant,
                weight: -value,
            })
        } else {
            None
        }
    }
}

/// Label counts of one drug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugBalance {
    pub drug: String,
    pub resistant: usize,
    pub sensitive: usize,
    pub resistant_fraction: f32,
}

/// Alpha values for isolates x drugs
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMatrix {
    drugs: Vec<String>,
    entries: Array2<Option<WeightedLabel>>,
}

impl AlphaMatrix {
    /// Compute alpha values from a label matrix (0 = R, 1 = S, anything else unlabeled).
    ///
    /// Sensitive entries get `sensitive_weight * resistant_fraction`, resistant
    /// entries `resistant_fraction`. A drug with no labeled isolate is an error.
    /// An entry whose weight comes out as 0 is stored as unlabeled, which is
    /// what the signed form on disk decodes it to.
    pub fn build(labels: ArrayView2<i8>, drugs: &[String], sensitive_weight: f32) -> PrepResult<Self> {
        if !sensitive_weight.is_finite() || sensitive_weight < 0.0 {
            return Err(PrepError::InvalidWeight(sensitive_weight));
        }
        if sensitive_weight == 0.0 {
            warn!("Sensitive weight is 0; every sensitive entry is treated as unlabeled");
        }
        if labels.ncols() != drugs.len() {
            return Err(PrepError::shape(
                "label matrix columns",
                &[drugs.len()],
                &[labels.ncols()],
            ));
        }

        let mut entries = Array2::from_elem(labels.dim(), None);

        for (j, drug) in drugs.iter().enumerate() {
            let balance = drug_balance(drug, labels.column(j).iter().copied())?;
            debug!(
                "{}: resistant={}, sensitive={}, alpha={:.4}",
                drug, balance.resistant, balance.sensitive, balance.resistant_fraction
            );
            if balance.resistant == 0 {
                warn!("{} has no resistant isolates; its entries are treated as unlabeled", drug);
            }

            for (i, &code) in labels.column(j).iter().enumerate() {
                let Some(label) = Phenotype::from_code(code).and_then(Phenotype::resistance) else {
                    continue;
                };
                let weight = match label {
                    Resistance::Sensitive => sensitive_weight * balance.resistant_fraction,
                    Resistance::Resistant => balance.resistant_fraction,
                };
                if weight > 0.0 {
                    entries[[i, j]] = Some(WeightedLabel { label, weight });
                }
            }
        }

        Ok(Self {
            drugs: drugs.to_vec(),
            entries,
        })
    }

    /// Decode a signed alpha matrix
    pub fn from_signed(signed: ArrayView2<f32>, drugs: &[String]) -> PrepResult<Self> {
        if signed.ncols() != drugs.len() {
            return Err(PrepError::shape(
                "alpha matrix columns",
                &[drugs.len()],
                &[signed.ncols()],
            ));
        }
        Ok(Self {
            drugs: drugs.to_vec(),
            entries: signed.mapv(WeightedLabel::from_signed),
        })
    }

    /// Signed encoding used by the loss functions and the cache file
    pub fn to_signed(&self) -> Array2<f32> {
        self.entries
            .mapv(|entry| entry.map(WeightedLabel::to_signed).unwrap_or(0.0))
    }

    pub fn drugs(&self) -> &[String] {
        &self.drugs
    }

    pub fn entries(&self) -> &Array2<Option<WeightedLabel>> {
        &self.entries
    }

    pub fn dim(&self) -> (usize, usize) {
        self.entries.dim()
    }

    pub fn get(&self, isolate: usize, drug: usize) -> Option<WeightedLabel> {
        self.entries.get((isolate, drug)).copied().flatten()
    }

    /// Number of labeled drugs per isolate
    pub fn labeled_per_isolate(&self) -> Vec<usize> {
        self.entries
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|e| e.is_some()).count())
            .collect()
    }

    /// Load the cached matrix at `path`, or build it and write it there.
    ///
    /// The cache is keyed by path only; a cached matrix whose shape does not
    /// match `labels` is rejected.
    pub fn load_or_build<P: AsRef<Path>>(
        path: P,
        labels: ArrayView2<i8>,
        drugs: &[String],
        sensitive_weight: f32,
    ) -> Result<Self> {
        let path = path.as_ref();

        let matrix = if file_exists(path) {
            info!("Alpha matrix already exists, loading {:?}", path);
            let signed = read_matrix_csv(path)?;
            if signed.dim() != labels.dim() {
                let (rows, cols) = labels.dim();
                let (found_rows, found_cols) = signed.dim();
                return Err(PrepError::shape(
                    format!("cached alpha matrix {:?}", path),
                    &[rows, cols],
                    &[found_rows, found_cols],
                )
                .into());
            }
            Self::from_signed(signed.view(), drugs)?
        } else {
            info!("Creating alpha matrix with sensitive weight {}", sensitive_weight);
            let matrix = Self::build(labels, drugs, sensitive_weight)?;
            write_matrix_csv(path, &matrix.to_signed())?;
            info!("Saved alpha matrix to {:?}", path);
            matrix
        };

        info!("Alpha matrix shape: {:?}", matrix.dim());
        Ok(matrix)
    }
}

/// Count resistant/sensitive labels and the resistant fraction of one drug
pub fn drug_balance(drug: &str, labels: impl Iterator<Item = i8>) -> PrepResult<DrugBalance> {
    let (mut resistant, mut sensitive) = (0usize, 0usize);
    for code in labels {
        match Phenotype::from_code(code) {
            Some(Phenotype::Resistant) => resistant += 1,
            Some(Phenotype::Sensitive) => sensitive += 1,
            _ => {}
        }
    }

    if resistant + sensitive == 0 {
        return Err(PrepError::DegenerateLabels {
            drug: drug.to_string(),
            resistant,
            sensitive,
        });
    }

    Ok(DrugBalance {
        drug: drug.to_string(),
        resistant,
        sensitive,
        resistant_fraction: resistant as f32 / (resistant + sensitive) as f32,
    })
}

/// Write a numeric matrix as comma-delimited text without header
pub fn write_matrix_csv<P: AsRef<Path>>(path: P, matrix: &Array2<f32>) -> Result<()> {
    let path = path.as_ref();
    let writer = FileWriter::create(path)?;
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    for row in matrix.rows() {
        csv_writer
            .write_record(row.iter().map(|v| v.to_string()))
            .with_context(|| format!("Failed to write matrix {:?}", path))?;
    }

    let writer = csv_writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush matrix {:?}: {}", path, e.error()))?;
    writer.finish()
}

/// Read a comma-delimited numeric matrix without header
pub fn read_matrix_csv<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let path = path.as_ref();
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(open_reader(path)?);

    let mut values = Vec::new();
    let mut n_rows = 0;
    let mut n_cols = 0;

    for (line, result) in csv_reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read {:?} line {}", path, line + 1))?;
        n_cols = record.len();
        for field in record.iter() {
            let value: f32 = field.trim().parse().with_context(|| {
                format!("Invalid number {:?} in {:?} line {}", field, path, line + 1)
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    Array2::from_shape_vec((n_rows, n_cols), values)
        .with_context(|| format!("Matrix {:?} is not rectangular", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn drugs() -> Vec<String> {
        vec!["RIFAMPICIN".into(), "ISONIAZID".into()]
    }

    fn labels() -> Array2<i8> {
        // RIF: 1 R, 3 S; INH: 2 R, 1 S, 1 missing
        array![[0, 0], [1, 1], [1, -1], [1, 0]]
    }

    #[test]
    fn test_build_values() {
        let matrix = AlphaMatrix::build(labels().view(), &drugs(), 1.0).unwrap();
        let signed = matrix.to_signed();

        assert_eq!(signed.column(0).to_vec(), vec![-0.25, 0.25, 0.25, 0.25]);
        let f = 2.0 / 3.0;
        assert_eq!(signed.column(1).to_vec(), vec![-f, f, 0.0, -f]);
        assert_eq!(matrix.get(2, 1), None);
        assert_eq!(matrix.labeled_per_isolate(), vec![2, 2, 1, 2]);
    }

    #[test]
    fn test_build_sensitive_weight() {
        let matrix = AlphaMatrix::build(labels().view(), &drugs(), 3.0).unwrap();
        let signed = matrix.to_signed();

        assert_eq!(signed[[1, 0]], 0.75);
        assert_eq!(signed[[0, 0]], -0.25);
        assert_eq!(
            matrix.get(1, 1),
            Some(WeightedLabel { label: Resistance::Sensitive, weight: 3.0 * (2.0 / 3.0) })
        );
    }

    #[test]
    fn test_sign_and_zero_invariants() {
        let labels = labels();
        let signed = AlphaMatrix::build(labels.view(), &drugs(), 1.5).unwrap().to_signed();

        for ((i, j), &value) in signed.indexed_iter() {
            match labels[[i, j]] {
                1 => assert!(value > 0.0),
                0 => assert!(value < 0.0 && value >= -1.0),
                _ => assert_eq!(value, 0.0),
            }
        }
    }

    #[test]
    fn test_degenerate_drug() {
        let labels = array![[0i8, -1], [1, -1]];
        let err = AlphaMatrix::build(labels.view(), &drugs(), 1.0).unwrap_err();
        assert_eq!(
            err,
            PrepError::DegenerateLabels {
                drug: "ISONIAZID".to_string(),
                resistant: 0,
                sensitive: 0,
            }
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let labels = array![[0i8, 1, 1]];
        assert!(AlphaMatrix::build(labels.view(), &drugs(), 1.0).is_err());
    }

    #[test]
    fn test_signed_roundtrip() {
        let matrix = AlphaMatrix::build(labels().view(), &drugs(), 1.0).unwrap();
        let decoded = AlphaMatrix::from_signed(matrix.to_signed().view(), &drugs()).unwrap();
        assert_eq!(decoded, matrix);
    }

    #[test]
    fn test_load_or_build_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha_matrix.csv");

        let built = AlphaMatrix::load_or_build(&path, labels().view(), &drugs(), 1.0).unwrap();
        assert!(path.is_file());

        // weight is ignored once the cache exists
        let cached = AlphaMatrix::load_or_build(&path, labels().view(), &drugs(), 5.0).unwrap();
        assert_eq!(cached.to_signed(), built.to_signed());

        let wrong_shape = array![[0i8, 1]];
        assert!(AlphaMatrix::load_or_build(&path, wrong_shape.view(), &drugs(), 1.0).is_err());
    }

    #[test]
    fn test_cache_hit_matches_build_without_resistant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha_matrix.csv");
        // ISONIAZID has no resistant isolate
        let labels = array![[0i8, 1], [1, 1]];

        let built = AlphaMatrix::load_or_build(&path, labels.view(), &drugs(), 1.0).unwrap();
        let cached = AlphaMatrix::load_or_build(&path, labels.view(), &drugs(), 1.0).unwrap();

        assert_eq!(built, cached);
        assert_eq!(built.get(1, 1), None);
        assert_eq!(built.labeled_per_isolate(), vec![1, 1]);
        assert_eq!(cached.labeled_per_isolate(), vec![1, 1]);
    }

    #[test]
    fn test_invalid_sensitive_weight() {
        let labels = array![[0i8], [1]];
        let drugs = vec!["RIFAMPICIN".to_string()];

        assert_eq!(
            AlphaMatrix::build(labels.view(), &drugs, -1.0).unwrap_err(),
            PrepError::InvalidWeight(-1.0)
        );
        assert!(matches!(
            AlphaMatrix::build(labels.view(), &drugs, f32::NAN),
            Err(PrepError::InvalidWeight(_))
        ));
        assert!(AlphaMatrix::build(labels.view(), &drugs, f32::INFINITY).is_err());

        // weight 0 leaves only the resistant entries labeled
        let matrix = AlphaMatrix::build(labels.view(), &drugs, 0.0).unwrap();
        assert_eq!(matrix.get(1, 0), None);
        assert_eq!(matrix.to_signed().column(0).to_vec(), vec![-0.5, 0.0]);
    }

    #[test]
    fn test_read_matrix_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.csv");
        std::fs::write(&path, "-2.5e-1,0\n0.75,-1\n").unwrap();

        let matrix = read_matrix_csv(&path).unwrap();
        assert_eq!(matrix, array![[-0.25f32, 0.0], [0.75, -1.0]]);
    }
}
