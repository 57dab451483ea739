pub mod feature_engineering;
pub mod genotype;
pub mod loader;
pub mod phenotype;
pub mod preprocessing;
pub mod sparse;
pub mod tensor;

use bincode::{Decode, Encode};
use burn::config::Config;
use serde::{Deserialize, Serialize};

/// Number of one-hot channels (A, C, T, G, gap)
pub const NUM_CHANNELS: usize = 5;

/// One-hot column order
pub const ALPHABET: [char; NUM_CHANNELS] = ['A', 'C', 'T', 'G', '-'];

/// Locus files, in the column order used for every table and tensor
pub const DEFAULT_LOCI: &[&str] = &[
    "acpM-kasA_20201206",
    "gid_20201206",
    "rpsA_20201206",
    "clpC_20201213",
    "embCAB_20201206",
    "aftB-ubiA_20201206",
    "rrs-rrl_20201206",
    "ethAR_20201206",
    "oxyR-ahpC_20201206",
    "tlyA_20201206",
    "KatG_20201206",
    "rpsL_20201206",
    "rpoBC_20201206",
    "FabG1-inhA_20201206",
    "eis_20201206",
    "gyrBA_20201206",
    "panD_20201213",
    "pncA_20201206",
];

/// Drugs with phenotype columns
pub const DEFAULT_DRUGS: &[&str] = &[
    "RIFAMPICIN", "ISONIAZID", "PYRAZINAMIDE",
    "ETHAMBUTOL", "STREPTOMYCIN", "LEVOFLOXACIN",
    "CAPREOMYCIN", "AMIKACIN", "MOXIFLOXACIN",
    "OFLOXACIN", "KANAMYCIN", "ETHIONAMIDE",
    "CIPROFLOXACIN",
];

fn default_loci() -> Vec<String> {
    DEFAULT_LOCI.iter().map(|s| s.to_string()).collect()
}

fn default_drugs() -> Vec<String> {
    DEFAULT_DRUGS.iter().map(|s| s.to_string()).collect()
}

/// Locus and drug panel plus the column conventions of the input files
#[derive(Config, Debug)]
pub struct PanelConfig {
    /// Locus file stems, in tensor order
    #[config(default = "default_loci()")]
    pub loci: Vec<String>,

    /// Drug columns, in label-matrix order
    #[config(default = "default_drugs()")]
    pub drugs: Vec<String>,

    /// Isolate identifier column of the phenotype file
    #[config(default = "String::from(\"Isolate\")")]
    pub isolate_column: String,

    /// Metadata column used for the train/test split
    #[config(default = "String::from(\"category\")")]
    pub category_column: String,

    /// Suffix stripped from FASTA record identifiers
    #[config(default = "String::from(\".cut\")")]
    pub record_suffix: String,

    /// Multiplier applied to the sensitive class in the alpha matrix
    #[config(default = "1.0")]
    pub sensitive_weight: f32,

    /// Pad shorter sequences within a locus instead of rejecting them
    #[config(default = "false")]
    pub allow_ragged_loci: bool,
}

impl PanelConfig {
    /// Column names derived from the locus file stems
    pub fn locus_names(&self) -> Vec<String> {
        self.loci.iter().map(|l| locus_name(l).to_string()).collect()
    }
}

/// Column name for a locus file stem (`rpoBC_20201206` -> `rpoBC`)
pub fn locus_name(stem: &str) -> &str {
    stem.split('_').next().unwrap_or(stem)
}

/// Binary resistance outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Resistance {
    Resistant,
    Sensitive,
}

impl Resistance {
    /// Numeric label (resistant = 0, sensitive = 1)
    pub fn code(self) -> i8 {
        match self {
            Resistance::Resistant => 0,
            Resistance::Sensitive => 1,
        }
    }
}

/// Per-drug phenotype of one isolate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Phenotype {
    Resistant,
    Sensitive,
    Missing,
}

impl Phenotype {
    /// Numeric encoding: R = 0, S = 1, missing = -1
    pub fn code(self) -> i8 {
        match self {
            Phenotype::Resistant => 0,
            Phenotype::Sensitive => 1,
            Phenotype::Missing => -1,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Phenotype::Resistant),
            1 => Some(Phenotype::Sensitive),
            -1 => Some(Phenotype::Missing),
            _ => None,
        }
    }

    pub fn resistance(self) -> Option<Resistance> {
        match self {
            Phenotype::Resistant => Some(Resistance::Resistant),
            Phenotype::Sensitive => Some(Resistance::Sensitive),
            Phenotype::Missing => None,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, Phenotype::Missing)
    }
}

impl From<Resistance> for Phenotype {
    fn from(r: Resistance) -> Self {
        match r {
            Resistance::Resistant => Phenotype::Resistant,
            Resistance::Sensitive => Phenotype::Sensitive,
        }
    }
}

/// Train/test split configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Metadata column holding the split category
    pub category_column: String,
    /// Category value assigned to the training set
    pub train_category: String,
}

impl SplitConfig {
    /// Split on the panel's category column; the training category has no default
    pub fn new(panel: &PanelConfig, train_category: impl Into<String>) -> Self {
        Self {
            category_column: panel.category_column.clone(),
            train_category: train_category.into(),
        }
    }

    pub fn with_category_column(mut self, column: impl Into<String>) -> Self {
        self.category_column = column.into();
        self
    }
}
