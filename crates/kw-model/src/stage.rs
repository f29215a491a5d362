use kw_core::config::PoolingMode;

use crate::weights::ConvWeights;

/// Transformation locale d'un étage : combine `steps` entrées en une sortie.
///
/// CONTRAT : ne doit PAS allouer. `inputs` contient `steps` lignes de `in_dim()`
/// valeurs, la plus ancienne en premier ; `out` fait `out_dim()` valeurs.
pub trait StageKernel {
    /// Width of one input element.
    fn in_dim(&self) -> usize;

    /// Width of the produced element.
    fn out_dim(&self) -> usize;

    /// Reduce the buffered elements into `out`.
    fn apply(&mut self, inputs: &[f32], steps: usize, out: &mut [f32]);
}

/// Valid 1-D convolution over time, ReLU, then max or average pooling over positions.
///
/// # Example
/// ```
/// use kw_core::config::PoolingMode;
/// use kw_model::stage::{ConvPool, StageKernel};
///
/// let mut kernel = ConvPool::identity(2, PoolingMode::Max);
/// let mut out = [0.0; 2];
/// kernel.apply(&[1.0, 4.0, 3.0, 2.0], 2, &mut out);
/// assert_eq!(out, [3.0, 4.0]);
/// ```
pub struct ConvPool {
    kernel_size: usize,
    in_dim: usize,
    out_dim: usize,
    /// `kernel_size × in_dim × out_dim`
    kernel: Vec<f32>,
    bias: Vec<f32>,
    pooling: PoolingMode,
    /// Activations at the current position.
    scratch: Vec<f32>,
}

impl ConvPool {
    /// Build from validated weights.
    #[must_use]
    pub fn new(weights: &ConvWeights, pooling: PoolingMode) -> Self {
        Self {
            kernel_size: weights.kernel_size,
            in_dim: weights.in_dim,
            out_dim: weights.out_dim,
            kernel: weights.kernel.clone(),
            bias: weights.bias.clone(),
            pooling,
            scratch: vec![0.0; weights.out_dim],
        }
    }

    /// Width-1 kernel with identity weights: only the pooling reduction remains.
    #[must_use]
    pub fn identity(dim: usize, pooling: PoolingMode) -> Self {
        let mut kernel = vec![0.0; dim * dim];
        for i in 0..dim {
            kernel[i * dim + i] = 1.0;
        }
        Self::new(
            &ConvWeights {
                kernel_size: 1,
                in_dim: dim,
                out_dim: dim,
                kernel,
                bias: vec![0.0; dim],
            },
            pooling,
        )
    }
}

impl StageKernel for ConvPool {
    fn in_dim(&self) -> usize {
        self.in_dim
    }

    fn out_dim(&self) -> usize {
        self.out_dim
    }

    fn apply(&mut self, inputs: &[f32], steps: usize, out: &mut [f32]) {
        debug_assert_eq!(inputs.len(), steps * self.in_dim);
        debug_assert!(self.kernel_size <= steps);

        let positions = steps + 1 - self.kernel_size;
        out.fill(match self.pooling {
            PoolingMode::Max => f32::NEG_INFINITY,
            PoolingMode::Average => 0.0,
        });

        for p in 0..positions {
            self.scratch.copy_from_slice(&self.bias);
            for j in 0..self.kernel_size {
                let x = &inputs[(p + j) * self.in_dim..(p + j + 1) * self.in_dim];
                for (i, &xi) in x.iter().enumerate() {
                    let row = (j * self.in_dim + i) * self.out_dim;
                    let weights = &self.kernel[row..row + self.out_dim];
                    for (acc, &w) in self.scratch.iter_mut().zip(weights) {
                        *acc += xi * w;
                    }
                }
            }
            for (o, &a) in out.iter_mut().zip(&self.scratch) {
                let a = a.max(0.0);
                match self.pooling {
                    PoolingMode::Max => *o = o.max(a),
                    PoolingMode::Average => *o += a,
                }
            }
        }

        if self.pooling == PoolingMode::Average {
            let n = positions as f32;
            for o in out.iter_mut() {
                *o /= n;
            }
        }
    }
}

/// Observable state of a [`PoolingStage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    /// Holding `buffered < pool_size` elements.
    Accumulating {
        /// Elements collected so far.
        buffered: usize,
    },
    /// An output is waiting to be consumed.
    Ready,
}

/// Étage d'accumulation : collecte `pool_size` éléments puis émet une sortie.
///
/// After emitting, the accumulation buffer restarts empty (non-overlapping
/// windows). Storage is sized once at construction.
///
/// # Example
/// ```
/// use kw_core::config::PoolingMode;
/// use kw_model::stage::{ConvPool, PoolingStage};
///
/// let mut stage = PoolingStage::new(ConvPool::identity(1, PoolingMode::Average), 3);
/// stage.insert(&[1.0]);
/// stage.insert(&[2.0]);
/// assert!(!stage.pool_out());
/// stage.insert(&[6.0]);
/// assert!(stage.pool_out());
/// assert_eq!(stage.consume(), [3.0]);
/// assert!(!stage.pool_out());
/// ```
pub struct PoolingStage<K> {
    kernel: K,
    pool_size: usize,
    buffer: Vec<f32>,
    buffered: usize,
    output: Vec<f32>,
    ready: bool,
}

impl<K: StageKernel> PoolingStage<K> {
    /// Create an empty stage emitting once every `pool_size` inserts.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    #[must_use]
    pub fn new(kernel: K, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool size must be >= 1");
        Self {
            buffer: vec![0.0; pool_size * kernel.in_dim()],
            output: vec![0.0; kernel.out_dim()],
            kernel,
            pool_size,
            buffered: 0,
            ready: false,
        }
    }

    /// Append one element; on reaching `pool_size` compute the output and become ready.
    ///
    /// # Panics
    /// Panics if the stage is already ready (its output was never consumed) or
    /// if `x` has the wrong width.
    pub fn insert(&mut self, x: &[f32]) {
        assert!(!self.ready, "insert() on a stage whose output was not consumed");
        let dim = self.kernel.in_dim();
        assert_eq!(x.len(), dim, "stage input width mismatch");

        self.buffer[self.buffered * dim..(self.buffered + 1) * dim].copy_from_slice(x);
        self.buffered += 1;

        if self.buffered == self.pool_size {
            self.kernel.apply(&self.buffer, self.pool_size, &mut self.output);
            self.buffered = 0;
            self.ready = true;
        }
    }

    /// True iff an output is waiting.
    #[inline]
    #[must_use]
    pub fn pool_out(&self) -> bool {
        self.ready
    }

    /// Take the pending output and go back to accumulating.
    ///
    /// # Panics
    /// Panics if the stage is not ready: callers must check [`PoolingStage::pool_out`] first.
    pub fn consume(&mut self) -> &[f32] {
        assert!(self.ready, "consume() on a stage that is not ready");
        self.ready = false;
        &self.output
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StageState {
        if self.ready {
            StageState::Ready
        } else {
            StageState::Accumulating {
                buffered: self.buffered,
            }
        }
    }

    /// Inserts needed per output.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Width of accepted elements.
    #[must_use]
    pub fn in_dim(&self) -> usize {
        self.kernel.in_dim()
    }

    /// Width of produced elements.
    #[must_use]
    pub fn out_dim(&self) -> usize {
        self.kernel.out_dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sums its inputs; records how many times it ran.
    struct Summing {
        dim: usize,
        calls: usize,
    }

    impl StageKernel for Summing {
        fn in_dim(&self) -> usize {
            self.dim
        }
        fn out_dim(&self) -> usize {
            self.dim
        }
        fn apply(&mut self, inputs: &[f32], _steps: usize, out: &mut [f32]) {
            self.calls += 1;
            out.fill(0.0);
            for row in inputs.chunks_exact(self.dim) {
                for (o, v) in out.iter_mut().zip(row) {
                    *o += v;
                }
            }
        }
    }

    #[test]
    fn ready_after_exactly_pool_size_inserts() {
        let mut stage = PoolingStage::new(Summing { dim: 2, calls: 0 }, 4);
        for i in 0..3 {
            stage.insert(&[1.0, 1.0]);
            assert_eq!(stage.state(), StageState::Accumulating { buffered: i + 1 });
        }
        stage.insert(&[1.0, 2.0]);
        assert_eq!(stage.state(), StageState::Ready);
        assert_eq!(stage.consume(), [4.0, 5.0]);
        assert_eq!(stage.state(), StageState::Accumulating { buffered: 0 });
    }

    #[test]
    fn buffer_resets_between_windows() {
        let mut stage = PoolingStage::new(Summing { dim: 1, calls: 0 }, 2);
        stage.insert(&[1.0]);
        stage.insert(&[2.0]);
        assert_eq!(stage.consume(), [3.0]);
        stage.insert(&[10.0]);
        stage.insert(&[20.0]);
        assert_eq!(stage.consume(), [30.0]);
        assert_eq!(stage.kernel.calls, 2);
    }

    #[test]
    #[should_panic(expected = "not ready")]
    fn consume_before_ready_is_fatal() {
        let mut stage = PoolingStage::new(Summing { dim: 1, calls: 0 }, 2);
        stage.insert(&[1.0]);
        let _ = stage.consume();
    }

    #[test]
    #[should_panic(expected = "not consumed")]
    fn insert_over_pending_output_is_fatal() {
        let mut stage = PoolingStage::new(Summing { dim: 1, calls: 0 }, 1);
        stage.insert(&[1.0]);
        stage.insert(&[2.0]);
    }

    #[test]
    fn conv_pool_max_and_average() {
        let inputs = [1.0, -2.0, 3.0, 0.5, 2.0, 4.0];
        let mut max = ConvPool::identity(2, PoolingMode::Max);
        let mut avg = ConvPool::identity(2, PoolingMode::Average);
        let (mut a, mut b) = ([0.0; 2], [0.0; 2]);
        max.apply(&inputs, 3, &mut a);
        avg.apply(&inputs, 3, &mut b);

        // ReLU clips the -2.0 before pooling
        assert_eq!(a, [3.0, 4.0]);
        assert!((b[0] - 2.0).abs() < 1e-6);
        assert!((b[1] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn conv_pool_spans_kernel_width() {
        // kernel_size 2, 1 -> 1: out = relu(x_t + x_{t+1} - 1), 3 steps -> 2 positions
        let weights = ConvWeights {
            kernel_size: 2,
            in_dim: 1,
            out_dim: 1,
            kernel: vec![1.0, 1.0],
            bias: vec![-1.0],
        };
        let mut kernel = ConvPool::new(&weights, PoolingMode::Max);
        let mut out = [0.0];
        kernel.apply(&[1.0, 2.0, 5.0], 3, &mut out);
        assert_eq!(out, [6.0]);

        let mut avg = ConvPool::new(&weights, PoolingMode::Average);
        avg.apply(&[1.0, 2.0, 5.0], 3, &mut out);
        assert!((out[0] - 4.0).abs() < 1e-6);
    }
}
