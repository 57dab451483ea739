pub mod alpha;
pub mod batch;
pub mod loss;

pub use alpha::{AlphaMatrix, DrugBalance, WeightedLabel};
pub use batch::{AlphaBatch, AlphaBatcher};
pub use loss::{metrics, MaskedWeightedBce};

/// Alpha cache file name for a sensitive-class weight, e.g. `alpha_matrix_1.csv`
pub fn alpha_cache_name(sensitive_weight: f32) -> String {
    format!("alpha_matrix_{}.csv", sensitive_weight)
}
