//! Conversion of prepared arrays into burn tensors for training

use crate::data::preprocessing::select_rows;
use crate::data::tensor::InputTensor;
use crate::error::{PrepError, PrepResult};
use crate::model::alpha::AlphaMatrix;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::{Array2, Array4};

/// Input tensor `(batch, 5, l_max, loci)` as floats
pub fn create_input_tensor<B: Backend>(data: &Array4<u8>, device: &B::Device) -> Tensor<B, 4> {
    let values: Vec<f32> = data.iter().map(|&v| f32::from(v)).collect();
    Tensor::from_data(TensorData::new(values, data.shape().to_vec()), device)
}

/// Signed alpha matrix `(batch, drugs)`
pub fn create_alpha_tensor<B: Backend>(alpha: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = alpha.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, alpha.shape().to_vec()), device)
}

/// One mini-batch of inputs with their alpha targets
#[derive(Debug, Clone)]
pub struct AlphaBatch<B: Backend> {
    pub inputs: Tensor<B, 4>,
    pub alpha: Tensor<B, 2>,
}

/// Slices an input tensor and its alpha matrix into aligned mini-batches
pub struct AlphaBatcher<'a> {
    inputs: &'a InputTensor,
    alpha: Array2<f32>,
}

impl<'a> AlphaBatcher<'a> {
    pub fn new(inputs: &'a InputTensor, alpha: &AlphaMatrix) -> PrepResult<Self> {
        let (rows, cols) = alpha.dim();
        if rows != inputs.n_isolates() {
            return Err(PrepError::shape(
                "alpha matrix rows",
                &[inputs.n_isolates(), cols],
                &[rows, cols],
            ));
        }
        Ok(Self {
            inputs,
            alpha: alpha.to_signed(),
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.n_isolates()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch of the given rows, in the given order
    pub fn batch<B: Backend>(&self, rows: &[usize], device: &B::Device) -> PrepResult<AlphaBatch<B>> {
        if let Some(&bad) = rows.iter().find(|&&i| i >= self.len()) {
            return Err(PrepError::shape("batch row", &[self.len()], &[bad]));
        }
        Ok(AlphaBatch {
            inputs: create_input_tensor(&select_rows(&self.inputs.data, rows), device),
            alpha: create_alpha_tensor(&select_rows(&self.alpha, rows), device),
        })
    }

    /// Consecutive row chunks of at most `batch_size`
    pub fn row_chunks(&self, batch_size: usize) -> Vec<Vec<usize>> {
        let indices: Vec<usize> = (0..self.len()).collect();
        indices
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Resistance;
    use crate::model::loss::MaskedWeightedBce;
    use ndarray::array;

    type TestBackend = crate::DefaultBackend;

    fn inputs() -> InputTensor {
        let mut data = Array4::<u8>::zeros((3, 5, 2, 1));
        data[[0, 0, 0, 0]] = 1;
        data[[1, 3, 1, 0]] = 1;
        data[[2, 4, 0, 0]] = 1;
        InputTensor {
            data,
            loci: vec!["gyrBA".into()],
            locus_lengths: vec![2],
        }
    }

    fn alpha() -> AlphaMatrix {
        let labels = array![[0i8, 1], [1, 1], [-1, 0]];
        AlphaMatrix::build(labels.view(), &["RIFAMPICIN".to_string(), "ISONIAZID".to_string()], 1.0).unwrap()
    }

    #[test]
    fn test_create_tensors() {
        let device = <TestBackend as Backend>::Device::default();
        let inputs = inputs();

        let tensor = create_input_tensor::<TestBackend>(&inputs.data, &device);
        assert_eq!(tensor.dims(), [3, 5, 2, 1]);
        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values.iter().sum::<f32>(), 3.0);
        assert_eq!(values[0], 1.0);

        let alpha = create_alpha_tensor::<TestBackend>(&alpha().to_signed(), &device);
        assert_eq!(alpha.dims(), [3, 2]);
    }

    #[test]
    fn test_batches_follow_rows() {
        let device = <TestBackend as Backend>::Device::default();
        let inputs = inputs();
        let alpha = alpha();
        let batcher = AlphaBatcher::new(&inputs, &alpha).unwrap();

        assert_eq!(batcher.row_chunks(2), vec![vec![0, 1], vec![2]]);

        let batch = batcher.batch::<TestBackend>(&[2, 0], &device).unwrap();
        assert_eq!(batch.inputs.dims(), [2, 5, 2, 1]);
        let signed = batch.alpha.clone().into_data().to_vec::<f32>().unwrap();
        // row 2: RIF missing, INH resistant
        assert_eq!(signed[0], 0.0);
        assert!(signed[1] < 0.0);
        assert_eq!(alpha.get(2, 1).map(|e| e.label), Some(Resistance::Resistant));

        let preds = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.5f32, 0.5, 0.5, 0.5], [2, 2]),
            &device,
        );
        let loss = MaskedWeightedBce::new().forward(batch.alpha, preds);
        assert_eq!(loss.dims(), [2]);

        assert!(batcher.batch::<TestBackend>(&[3], &device).is_err());
    }

    #[test]
    fn test_row_mismatch() {
        let inputs = inputs();
        let labels = array![[0i8, 1]];
        let alpha = AlphaMatrix::build(labels.view(), &["A".to_string(), "B".to_string()], 1.0).unwrap();
        assert!(AlphaBatcher::new(&inputs, &alpha).is_err());
    }
}
