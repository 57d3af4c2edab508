//! Activation functions shared by the model and the training loop.

/// ReLU applied in-place: negative values are clamped to zero.
pub fn relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// Softmax applied row-wise over a row-major matrix.
///
/// Converts logits to probabilities per row, using the max-subtraction trick
/// for numerical stability.
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(
        outputs.len(),
        rows * cols,
        "outputs length mismatch in softmax_rows"
    );

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let mut max_value = row[0];
        for &value in row.iter().skip(1) {
            if value > max_value {
                max_value = value;
            }
        }

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_relu_negative() {
        let mut data = vec![-1.0f32];
        relu_inplace(&mut data);
        assert_eq!(data[0], 0.0);
    }

    #[test]
    fn test_relu_mixed() {
        let mut data = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        relu_inplace(&mut data);
        assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_softmax_row_sums_to_one() {
        let mut data = vec![1.0, 2.0, 3.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
    }

    #[test]
    fn test_softmax_uniform_input() {
        let mut data = vec![1.0, 1.0, 1.0];
        softmax_rows(&mut data, 1, 3);
        for &val in &data {
            assert!((val - 1.0 / 3.0).abs() < EPSILON_F32);
        }
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut data = vec![1000.0, 1001.0, 1002.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
        assert!(!data.iter().any(|&x| x.is_nan() || x.is_infinite()));
    }

    #[test]
    fn test_softmax_multiple_rows_independent() {
        let mut data = vec![0.0, 0.0, 5.0, 0.0];
        softmax_rows(&mut data, 2, 2);
        assert!((data[0] - 0.5).abs() < EPSILON_F32);
        assert!((data[1] - 0.5).abs() < EPSILON_F32);
        assert!(data[2] > 0.99);
    }
}
