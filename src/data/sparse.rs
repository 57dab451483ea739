//! Row-compressed storage for the mostly-zero input tensor

use crate::error::{PrepError, PrepResult};
use crate::utils::format_bytes;
use crate::utils::io::{open_reader, FileWriter};
use anyhow::{anyhow, Result};
use bincode::{Decode, Encode};
use ndarray::Array4;
use std::path::Path;
use tracing::{debug, info};

/// Row-compressed tensor: per isolate, the flat offsets of its non-zero
/// entries within the `(5, length, loci)` block.
///
/// Offsets are `u32` and row pointers mark where each isolate's offsets
/// start. `values` is `None` when every stored entry is 1, which is the case
/// for one-hot input.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SparseTensor {
    shape: [usize; 4],
    row_ptr: Vec<u64>,
    offsets: Vec<u32>,
    values: Option<Vec<u8>>,
}

impl SparseTensor {
    /// Collect the non-zero entries of a dense tensor (row-major order)
    pub fn from_dense(dense: &Array4<u8>) -> PrepResult<Self> {
        let (a, b, c, d) = dense.dim();
        let row_len = b * c * d;
        if u32::try_from(row_len).is_err() {
            return Err(PrepError::shape("sparse row length", &[u32::MAX as usize], &[row_len]));
        }

        let mut row_ptr = Vec::with_capacity(a + 1);
        row_ptr.push(0u64);
        let mut offsets = Vec::new();
        let mut values = Vec::new();
        let mut binary = true;

        for row in dense.outer_iter() {
            for (offset, &v) in row.iter().enumerate() {
                if v != 0 {
                    offsets.push(offset as u32);
                    values.push(v);
                    binary &= v == 1;
                }
            }
            row_ptr.push(offsets.len() as u64);
        }

        Ok(Self {
            shape: [a, b, c, d],
            row_ptr,
            offsets,
            values: (!binary).then_some(values),
        })
    }

    /// Materialize the dense tensor
    pub fn to_dense(&self) -> PrepResult<Array4<u8>> {
        self.validate()?;

        let row_len = self.row_len();
        let mut flat = vec![0u8; self.shape[0] * row_len];
        for (i, bounds) in self.row_ptr.windows(2).enumerate() {
            let base = i * row_len;
            for k in bounds[0] as usize..bounds[1] as usize {
                flat[base + self.offsets[k] as usize] = self.value(k);
            }
        }

        let len = flat.len();
        Array4::from_shape_vec(self.shape, flat).map_err(|_| PrepError::shape("sparse tensor", &self.shape, &[len]))
    }

    /// Check row pointers, offsets and values against the shape
    pub fn validate(&self) -> PrepResult<()> {
        let rows = self.shape[0];
        if self.row_ptr.len() != rows + 1 {
            return Err(PrepError::shape("sparse row pointers", &[rows + 1], &[self.row_ptr.len()]));
        }

        let last = self.row_ptr.last().copied().unwrap_or(0) as usize;
        let monotone = self.row_ptr.first() == Some(&0) && self.row_ptr.windows(2).all(|w| w[0] <= w[1]);
        if !monotone || last != self.offsets.len() {
            return Err(PrepError::shape("sparse row pointers", &[self.offsets.len()], &[last]));
        }

        if let Some(values) = &self.values {
            if values.len() != self.offsets.len() {
                return Err(PrepError::shape("sparse values", &[self.offsets.len()], &[values.len()]));
            }
        }

        let row_len = self.row_len();
        if let Some(&bad) = self.offsets.iter().find(|&&o| o as usize >= row_len) {
            return Err(PrepError::shape("sparse offset", &[row_len], &[bad as usize]));
        }
        Ok(())
    }

    fn row_len(&self) -> usize {
        self.shape[1..].iter().product()
    }

    fn value(&self, k: usize) -> u8 {
        self.values.as_ref().map_or(1, |values| values[k])
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Number of stored (non-zero) entries
    pub fn nnz(&self) -> usize {
        self.offsets.len()
    }

    /// Fraction of entries that are non-zero
    pub fn density(&self) -> f64 {
        let total: usize = self.shape.iter().product();
        if total == 0 {
            0.0
        } else {
            self.nnz() as f64 / total as f64
        }
    }

    /// Approximate in-memory size of the index and value arrays
    pub fn size_bytes(&self) -> usize {
        self.row_ptr.len() * std::mem::size_of::<u64>()
            + self.offsets.len() * std::mem::size_of::<u32>()
            + self.values.as_ref().map_or(0, Vec::len)
    }

    /// Write with bincode (gzipped if the path ends in `.gz`)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = FileWriter::create(path)?;
        bincode::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| anyhow!("Failed to encode sparse tensor {:?}: {}", path, e))?;
        writer.finish()?;

        info!(
            "Saved sparse tensor {:?} to {:?} ({} non-zero, {})",
            self.shape,
            path,
            self.nnz(),
            format_bytes(self.size_bytes())
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = open_reader(path)?;
        let tensor: Self = bincode::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| anyhow!("Failed to decode sparse tensor {:?}: {}", path, e))?;

        tensor
            .validate()
            .map_err(|e| anyhow!("Corrupt sparse tensor {:?}: {}", path, e))?;

        debug!("Loaded sparse tensor {:?} with density {:.4}", tensor.shape, tensor.density());
        Ok(tensor)
    }
}
