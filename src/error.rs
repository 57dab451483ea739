//! Typed errors for the numeric and validation parts of the pipeline.
//!
//! File and CLI glue uses `anyhow`; everything that can be reasoned about
//! without touching the file system reports one of these variants instead.

use thiserror::Error;

/// Errors raised while encoding, assembling, or scoring data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PrepError {
    /// Symbol outside the one-hot alphabet
    #[error("unknown base {base:?} at position {position}")]
    UnknownBase { base: char, position: usize },

    /// Phenotype label that is neither R/S nor an encoded or missing value
    #[error("unknown phenotype {value:?} for isolate {isolate} and drug {drug}")]
    UnknownPhenotype {
        isolate: String,
        drug: String,
        value: String,
    },

    /// A drug whose label distribution cannot be used
    #[error("degenerate label distribution for {drug}: {resistant} resistant, {sensitive} sensitive")]
    DegenerateLabels {
        drug: String,
        resistant: usize,
        sensitive: usize,
    },

    /// Isolates with different sequence lengths within one locus
    #[error("locus {locus}: isolate {isolate} has length {found}, expected {expected}")]
    LocusLengthMismatch {
        locus: String,
        isolate: String,
        expected: usize,
        found: usize,
    },

    /// No labeled drug in a row or batch
    #[error("no labeled drugs in {0}")]
    NoLabels(String),

    /// Arrays whose shapes disagree
    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Class weight that is negative or not a finite number
    #[error("invalid sensitive weight {0}: must be finite and non-negative")]
    InvalidWeight(f32),

    /// Operation requires at least one element
    #[error("empty input: {0}")]
    EmptyInput(String),
}

impl PrepError {
    pub fn shape(what: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        PrepError::ShapeMismatch {
            what: what.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

/// Convenience alias for results carrying a [`PrepError`].
pub type PrepResult<T> = std::result::Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PrepError::UnknownBase { base: 'N', position: 3 };
        assert_eq!(err.to_string(), "unknown base 'N' at position 3");

        let err = PrepError::DegenerateLabels {
            drug: "RIFAMPICIN".to_string(),
            resistant: 0,
            sensitive: 0,
        };
        assert!(err.to_string().contains("RIFAMPICIN"));

        let err = PrepError::shape("alpha", &[2, 3], &[2, 4]);
        assert!(err.to_string().contains("[2, 3]"));

        let err = PrepError::InvalidWeight(-1.0);
        assert!(err.to_string().contains("-1"));
    }
}
