//! # mdcnn: data preparation for a multi-drug resistance CNN
//!
//! Turns per-locus FASTA alignments and a phenotype table of bacterial
//! isolates into the inputs of a multi-drug resistance classifier.
//!
//! ## Features
//!
//! - Genotype/phenotype join keyed on isolate identifiers
//! - One-hot encoding into a padded `(isolates, 5, length, loci)` tensor
//! - Class-balance ("alpha") weights with a CSV cache
//! - Masked, weighted binary cross-entropy and accuracy for missing labels
//! - Category-based train/test split of sparse tensors
//! - Per-drug decision threshold selection
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mdcnn::data::genotype::GenotypeTableBuilder;
//! use mdcnn::data::loader::PhenotypeLoader;
//! use mdcnn::data::phenotype::encode_phenotypes;
//! use mdcnn::data::preprocessing::GenoPhenoTable;
//! use mdcnn::data::tensor::TensorAssembler;
//! use mdcnn::data::PanelConfig;
//! use mdcnn::model::AlphaMatrix;
//!
//! let config = PanelConfig::new();
//!
//! // Load and join
//! let genotypes = GenotypeTableBuilder::new(&config).build("fasta/").unwrap();
//! let raw = PhenotypeLoader::new("Isolate", &config.drugs).load("phenotypes.csv").unwrap();
//! let phenotypes = encode_phenotypes(&raw).unwrap();
//! let table = GenoPhenoTable::merge(&genotypes, &phenotypes);
//!
//! // Encode
//! let tensor = TensorAssembler::new(false).assemble(&table).unwrap();
//!
//! // Class weights
//! let labels = table.label_matrix();
//! let alpha = AlphaMatrix::load_or_build("alpha_matrix_1.csv", labels.view(), &table.drugs, 1.0).unwrap();
//! ```

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod predict;
pub mod utils;

use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Re-export commonly used types
pub use data::preprocessing::{GenoPhenoTable, TrainTestSplit};
pub use data::tensor::{InputTensor, TensorAssembler};
pub use data::{PanelConfig, Phenotype, Resistance};
pub use error::{PrepError, PrepResult};
pub use model::{AlphaMatrix, MaskedWeightedBce};
pub use predict::{select_threshold, EvaluationReport, ThresholdResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - data preparation for multi-drug resistance prediction",
        NAME, VERSION
    )
}
