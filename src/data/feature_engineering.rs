//! One-hot encoding of aligned nucleotide sequences

use crate::data::{ALPHABET, NUM_CHANNELS};
use crate::error::{PrepError, PrepResult};
use ndarray::Array2;

/// Column of a base in the one-hot matrix (A=0, C=1, T=2, G=3, -=4)
pub fn base_to_column(base: char) -> Option<usize> {
    match base {
        'A' => Some(0),
        'C' => Some(1),
        'T' => Some(2),
        'G' => Some(3),
        '-' => Some(4),
        _ => None,
    }
}

/// Encode a sequence as an `L x 5` matrix with a single 1 per row.
///
/// Symbols outside [`ALPHABET`] are rejected rather than silently mapped.
pub fn one_hot(sequence: &str) -> PrepResult<Array2<u8>> {
    let len = sequence.chars().count();
    let mut encoded = Array2::<u8>::zeros((len, NUM_CHANNELS));

    for (position, base) in sequence.chars().enumerate() {
        let column = base_to_column(base)
            .ok_or(PrepError::UnknownBase { base, position })?;
        encoded[[position, column]] = 1;
    }

    Ok(encoded)
}

/// Decode a one-hot matrix back to its sequence (rows without a set bit become `N`)
pub fn decode_one_hot(encoded: &Array2<u8>) -> String {
    encoded
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .position(|&v| v == 1)
                .map(|i| ALPHABET[i])
                .unwrap_or('N')
        })
        .collect()
}
