//! Phenotype tables and the R/S -> 0/1/-1 encoding

use crate::data::Phenotype;
use crate::error::{PrepError, PrepResult};
use ndarray::Array2;
use std::collections::BTreeMap;
use tracing::debug;

/// Phenotype labels as read from disk, one optional string per drug
#[derive(Debug, Clone, PartialEq)]
pub struct RawPhenotypeTable {
    pub drugs: Vec<String>,
    pub rows: Vec<RawPhenotypeRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPhenotypeRow {
    pub isolate: String,
    pub labels: Vec<Option<String>>,
    /// Non-drug columns (e.g. the split category)
    pub metadata: BTreeMap<String, String>,
}

/// Encoded phenotype table, row order follows the raw table
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeTable {
    pub drugs: Vec<String>,
    pub rows: Vec<PhenotypeRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeRow {
    pub isolate: String,
    pub labels: Vec<Phenotype>,
    pub metadata: BTreeMap<String, String>,
}

impl PhenotypeTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Numeric label matrix (isolates x drugs) with R = 0, S = 1, missing = -1
    pub fn to_array(&self) -> Array2<i8> {
        Array2::from_shape_fn((self.rows.len(), self.drugs.len()), |(i, j)| {
            self.rows[i].labels[j].code()
        })
    }

    /// Stringified numeric codes, the form the table takes after a round trip through text
    pub fn to_raw(&self) -> RawPhenotypeTable {
        RawPhenotypeTable {
            drugs: self.drugs.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| RawPhenotypeRow {
                    isolate: row.isolate.clone(),
                    labels: row
                        .labels
                        .iter()
                        .map(|p| Some(p.code().to_string()))
                        .collect(),
                    metadata: row.metadata.clone(),
                })
                .collect(),
        }
    }
}

/// Parse one label cell.
///
/// `None`, blank, `-1` and `-1.0` are missing; `R`/`S` and their numeric
/// codes map to resistant/sensitive, so already-encoded tables pass through.
pub fn parse_phenotype(value: Option<&str>) -> Option<Phenotype> {
    match value.map(str::trim) {
        None | Some("") => Some(Phenotype::Missing),
        Some("R") | Some("0") | Some("0.0") => Some(Phenotype::Resistant),
        Some("S") | Some("1") | Some("1.0") => Some(Phenotype::Sensitive),
        Some("-1") | Some("-1.0") | Some("nan") | Some("NaN") => Some(Phenotype::Missing),
        Some(_) => None,
    }
}

/// Encode raw labels into [`Phenotype`] values
pub fn encode_phenotypes(raw: &RawPhenotypeTable) -> PrepResult<PhenotypeTable> {
    let mut rows = Vec::with_capacity(raw.rows.len());

    for row in &raw.rows {
        if row.labels.len() != raw.drugs.len() {
            return Err(PrepError::shape(
                format!("phenotype row {}", row.isolate),
                &[raw.drugs.len()],
                &[row.labels.len()],
            ));
        }

        let labels = row
            .labels
            .iter()
            .zip(&raw.drugs)
            .map(|(value, drug)| {
                parse_phenotype(value.as_deref()).ok_or_else(|| PrepError::UnknownPhenotype {
                    isolate: row.isolate.clone(),
                    drug: drug.clone(),
                    value: value.clone().unwrap_or_default(),
                })
            })
            .collect::<PrepResult<Vec<_>>>()?;

        rows.push(PhenotypeRow {
            isolate: row.isolate.clone(),
            labels,
            metadata: row.metadata.clone(),
        });
    }

    let table = PhenotypeTable {
        drugs: raw.drugs.clone(),
        rows,
    };

    for (j, drug) in table.drugs.iter().enumerate() {
        let count = |p: Phenotype| table.rows.iter().filter(|r| r.labels[j] == p).count();
        debug!(
            "{}: resistant={}, sensitive={}, missing={}",
            drug,
            count(Phenotype::Resistant),
            count(Phenotype::Sensitive),
            count(Phenotype::Missing)
        );
    }

    Ok(table)
}
