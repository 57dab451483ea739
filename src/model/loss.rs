use crate::data::Resistance;
use crate::error::{PrepError, PrepResult};
use crate::model::alpha::WeightedLabel;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{Array1, ArrayView2, Zip};

/// Probability clipping bound
pub const EPSILON: f32 = 1e-7;

/// Masked, class-weighted binary cross-entropy over multiple drugs.
///
/// Targets come from a signed alpha matrix: `> 0` sensitive (y = 1),
/// `< 0` resistant (y = 0), `0` unlabeled. Per isolate the labeled terms
/// `-|a| * y * ln(p) - (1 - |a|) * (1 - y) * ln(1 - p)` are summed and divided
/// by the number of labeled drugs.
#[derive(Clone, Debug)]
pub struct MaskedWeightedBce {
    epsilon: f32,
}

impl Default for MaskedWeightedBce {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskedWeightedBce {
    pub fn new() -> Self {
        Self { epsilon: EPSILON }
    }

    pub fn with_epsilon(epsilon: f32) -> Self {
        Self { epsilon }
    }

    /// Loss term of one labeled entry
    pub fn term(&self, entry: WeightedLabel, p: f32) -> f32 {
        let p = p.clamp(self.epsilon, 1.0 - self.epsilon);
        match entry.label {
            Resistance::Sensitive => -entry.weight * p.ln(),
            Resistance::Resistant => -(1.0 - entry.weight) * (1.0 - p).ln(),
        }
    }

    /// Loss of every isolate in the batch.
    ///
    /// Fails on an isolate without any labeled drug.
    pub fn per_isolate(&self, alpha: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> PrepResult<Array1<f32>> {
        check_shapes(alpha, y_pred)?;

        let mut losses = Array1::zeros(alpha.nrows());
        for (i, (a_row, p_row)) in alpha.rows().into_iter().zip(y_pred.rows()).enumerate() {
            let mut total = 0.0f32;
            let mut labeled = 0usize;

            for (&a, &p) in a_row.iter().zip(p_row.iter()) {
                if let Some(entry) = WeightedLabel::from_signed(a) {
                    total += self.term(entry, p);
                    labeled += 1;
                }
            }

            if labeled == 0 {
                return Err(PrepError::NoLabels(format!("isolate at row {}", i)));
            }
            losses[i] = total / labeled as f32;
        }

        Ok(losses)
    }

    /// Mean of [`MaskedWeightedBce::per_isolate`] over the batch
    pub fn mean(&self, alpha: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> PrepResult<f32> {
        let losses = self.per_isolate(alpha, y_pred)?;
        losses
            .mean()
            .ok_or_else(|| PrepError::EmptyInput("loss batch has no isolates".to_string()))
    }

    /// Tensor version for training on a burn backend.
    ///
    /// An isolate without labeled drugs yields NaN; callers filter such rows.
    pub fn forward<B: Backend>(&self, alpha: Tensor<B, 2>, y_pred: Tensor<B, 2>) -> Tensor<B, 1> {
        let y_true = alpha.clone().greater_elem(0.0).float();
        let mask = alpha.clone().equal_elem(0.0).bool_not().float();
        let weight = alpha.abs();

        let p = y_pred.clamp(self.epsilon, 1.0 - self.epsilon);

        let positive = weight.clone().mul(y_true.clone()).mul(p.clone().log());
        let negative = weight
            .neg()
            .add_scalar(1.0)
            .mul(y_true.neg().add_scalar(1.0))
            .mul(p.neg().add_scalar(1.0).log());

        let loss = positive.add(negative).neg().mul(mask.clone());
        loss.sum_dim(1).div(mask.sum_dim(1)).squeeze::<1>(1)
    }
}

fn check_shapes(alpha: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> PrepResult<()> {
    if alpha.dim() != y_pred.dim() {
        let (ar, ac) = alpha.dim();
        let (pr, pc) = y_pred.dim();
        return Err(PrepError::shape("predictions", &[ar, ac], &[pr, pc]));
    }
    Ok(())
}

/// Metrics for evaluation
pub mod metrics {
    use super::check_shapes;
    use crate::error::{PrepError, PrepResult};
    use crate::model::alpha::WeightedLabel;
    use ndarray::{ArrayView2, Zip};

    /// Fraction of labeled entries whose rounded prediction equals the target.
    ///
    /// Pooled over the whole batch; rounding sends 0.5 to 0.
    pub fn masked_weighted_accuracy(alpha: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> PrepResult<f32> {
        check_shapes(alpha, y_pred)?;

        let mut correct = 0usize;
        let mut labeled = 0usize;
        Zip::from(alpha).and(y_pred).for_each(|&a, &p| {
            if let Some(entry) = WeightedLabel::from_signed(a) {
                let target = f32::from(entry.label.code());
                labeled += 1;
                if p.round_ties_even() == target {
                    correct += 1;
                }
            }
        });

        if labeled == 0 {
            return Err(PrepError::NoLabels("accuracy batch".to_string()));
        }
        Ok(correct as f32 / labeled as f32)
    }
}

/// Count labeled entries of a signed alpha matrix
pub fn labeled_count(alpha: ArrayView2<f32>) -> usize {
    let mut count = 0;
    Zip::from(alpha).for_each(|&a| {
        if a != 0.0 && !a.is_nan() {
            count += 1;
        }
    });
    count
}
