use kw_core::config::{CASCADE_DEPTH, PipelineConfig};

use crate::stage::{ConvPool, PoolingStage, StageKernel};
use crate::weights::ModelWeights;

/// Pyramide multi-cadence de trois étages de pooling chaînés.
///
/// Stage 1 fires every `K1` frames, stage 2 every `K1×K2`, stage 3 every
/// `K1×K2×K3`. A stage that is not ready is never queried further up the chain.
///
/// # Example
/// ```
/// use kw_core::config::PoolingMode;
/// use kw_model::cascade::Cascade;
/// use kw_model::stage::{ConvPool, PoolingStage};
///
/// let stage = |k| PoolingStage::new(ConvPool::identity(1, PoolingMode::Max), k);
/// let mut cascade = Cascade::new([stage(2), stage(2), stage(2)]);
/// let fired = (0..16).filter(|&i| cascade.push(&[i as f32]).is_some()).count();
/// assert_eq!(fired, 2);
/// ```
pub struct Cascade<K> {
    stages: [PoolingStage<K>; CASCADE_DEPTH],
    pushed: u64,
    fired: u64,
}

impl<K: StageKernel> Cascade<K> {
    /// Chain `stages`, lowest first.
    ///
    /// # Panics
    /// Panics if a stage's output width differs from the next stage's input width.
    #[must_use]
    pub fn new(stages: [PoolingStage<K>; CASCADE_DEPTH]) -> Self {
        for pair in stages.windows(2) {
            assert_eq!(
                pair[0].out_dim(),
                pair[1].in_dim(),
                "cascade stages do not chain"
            );
        }
        Self {
            stages,
            pushed: 0,
            fired: 0,
        }
    }

    /// Feed one frame. Returns the deepest stage's output when it fires.
    pub fn push(&mut self, frame: &[f32]) -> Option<&[f32]> {
        self.pushed += 1;
        self.stages[0].insert(frame);

        for level in 1..CASCADE_DEPTH {
            if !self.stages[level - 1].pool_out() {
                return None;
            }
            let (lower, upper) = self.stages.split_at_mut(level);
            upper[0].insert(lower[level - 1].consume());
        }

        let top = &mut self.stages[CASCADE_DEPTH - 1];
        if top.pool_out() {
            self.fired += 1;
            Some(top.consume())
        } else {
            None
        }
    }

    /// Stage `index`, 0 = finest.
    #[must_use]
    pub fn stage(&self, index: usize) -> &PoolingStage<K> {
        &self.stages[index]
    }

    /// Frames accepted per deepest-stage output.
    #[must_use]
    pub fn period(&self) -> usize {
        self.stages.iter().map(PoolingStage::pool_size).product()
    }

    /// Width of the frames accepted by stage 1.
    #[must_use]
    pub fn in_dim(&self) -> usize {
        self.stages[0].in_dim()
    }

    /// Width of the representation handed to the classifier.
    #[must_use]
    pub fn out_dim(&self) -> usize {
        self.stages[CASCADE_DEPTH - 1].out_dim()
    }

    /// Frames pushed since construction.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Deepest-stage outputs produced since construction.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl Cascade<ConvPool> {
    /// Build the convolution cascade described by validated `weights`.
    #[must_use]
    pub fn from_weights(weights: &ModelWeights, config: &PipelineConfig) -> Self {
        Self::new(std::array::from_fn(|i| {
            PoolingStage::new(
                ConvPool::new(&weights.conv[i], config.pooling),
                config.pool_sizes[i],
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageState;
    use kw_core::config::PoolingMode;

    fn identity_cascade(k: [usize; CASCADE_DEPTH], pooling: PoolingMode) -> Cascade<ConvPool> {
        Cascade::new(k.map(|k| PoolingStage::new(ConvPool::identity(1, pooling), k)))
    }

    #[test]
    fn rate_law_holds_for_any_input_count() {
        for k in [[1, 1, 1], [2, 2, 2], [3, 1, 4], [2, 5, 3]] {
            let period: usize = k.iter().product();
            for n in [0, 1, period - 1, period, 3 * period + 1, 100] {
                let mut cascade = identity_cascade(k, PoolingMode::Max);
                let fired = (0..n).filter(|_| cascade.push(&[0.0]).is_some()).count();
                assert_eq!(fired, n / period, "k={k:?} n={n}");
                assert_eq!(cascade.fired(), (n / period) as u64);
            }
        }
    }

    #[test]
    fn outputs_follow_input_order() {
        // Max pooling of a rising ramp: each output is the last frame of its block.
        let mut cascade = identity_cascade([2, 2, 2], PoolingMode::Max);
        let outputs: Vec<f32> = (1..=40)
            .filter_map(|i| cascade.push(&[i as f32]).map(|o| o[0]))
            .collect();
        assert_eq!(outputs, [8.0, 16.0, 24.0, 32.0, 40.0]);
    }

    #[test]
    fn average_pools_whole_block() {
        let mut cascade = identity_cascade([2, 2, 2], PoolingMode::Average);
        let outputs: Vec<f32> = (1..=16)
            .filter_map(|i| cascade.push(&[i as f32]).map(|o| o[0]))
            .collect();
        assert_eq!(outputs, [4.5, 12.5]);
    }

    #[test]
    fn upper_stages_only_move_when_lower_fires() {
        let mut cascade = identity_cascade([2, 3, 2], PoolingMode::Max);
        cascade.push(&[1.0]);
        assert_eq!(cascade.stage(0).state(), StageState::Accumulating { buffered: 1 });
        assert_eq!(cascade.stage(1).state(), StageState::Accumulating { buffered: 0 });

        cascade.push(&[1.0]);
        assert_eq!(cascade.stage(0).state(), StageState::Accumulating { buffered: 0 });
        assert_eq!(cascade.stage(1).state(), StageState::Accumulating { buffered: 1 });
        assert_eq!(cascade.stage(2).state(), StageState::Accumulating { buffered: 0 });

        for _ in 0..4 {
            cascade.push(&[1.0]);
        }
        assert_eq!(cascade.stage(2).state(), StageState::Accumulating { buffered: 1 });
        assert_eq!(cascade.period(), 12);
    }

    #[test]
    fn built_from_weights() {
        let config = PipelineConfig::default();
        let weights = crate::weights::tests::tiny_weights(&config, 2);
        let mut cascade = Cascade::from_weights(&weights, &config);
        assert_eq!(cascade.in_dim(), config.n_mfcc_bins);
        assert_eq!(cascade.out_dim(), 4);

        let frame = vec![0.5; config.n_mfcc_bins];
        let outputs: Vec<Vec<f32>> = (0..24)
            .filter_map(|_| cascade.push(&frame).map(<[f32]>::to_vec))
            .collect();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().flatten().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(cascade.pushed(), 24);
    }
}
