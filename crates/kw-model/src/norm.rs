use crate::weights::BatchNormWeights;

/// Batch normalization folded into one scale and one shift per coefficient.
///
/// # Example
/// ```
/// use kw_model::norm::BatchNorm;
/// use kw_model::weights::BatchNormWeights;
///
/// let bn = BatchNorm::new(&BatchNormWeights {
///     gamma: vec![2.0],
///     beta: vec![1.0],
///     moving_mean: vec![3.0],
///     moving_variance: vec![4.0],
///     epsilon: 0.0,
/// });
/// let mut x = [5.0];
/// bn.apply(&mut x);
/// assert_eq!(x, [3.0]); // (5 - 3) / 2 * 2 + 1
/// ```
pub struct BatchNorm {
    scale: Vec<f32>,
    shift: Vec<f32>,
}

impl BatchNorm {
    /// Fold the inference statistics into `scale` / `shift`.
    #[must_use]
    pub fn new(weights: &BatchNormWeights) -> Self {
        let scale: Vec<f32> = weights
            .gamma
            .iter()
            .zip(&weights.moving_variance)
            .map(|(g, v)| g / (v + weights.epsilon).sqrt())
            .collect();
        let shift = weights
            .beta
            .iter()
            .zip(&weights.moving_mean)
            .zip(&scale)
            .map(|((b, m), s)| b - m * s)
            .collect();
        Self { scale, shift }
    }

    /// Normalize `x` in place.
    ///
    /// # Panics
    /// Panics if `x` does not have one value per coefficient.
    pub fn apply(&self, x: &mut [f32]) {
        assert_eq!(x.len(), self.scale.len(), "batch norm width mismatch");
        for ((v, s), t) in x.iter_mut().zip(&self.scale).zip(&self.shift) {
            *v = *v * s + t;
        }
    }

    /// Coefficients per frame.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.scale.len()
    }
}
