use kw_audio::features::FeatureFramer;
use kw_audio::overlap::OverlapWindow;
use kw_core::config::PipelineConfig;
use kw_core::display::DisplayBuffer;
use kw_core::error::CoreError;
use kw_core::traits::Classifier;
use kw_model::cascade::Cascade;
use kw_model::lstm::LstmClassifier;
use kw_model::norm::BatchNorm;
use kw_model::stage::ConvPool;
use kw_model::trigger::InferenceTrigger;
use kw_model::weights::ModelWeights;
use kw_render::ui::PipelineCounters;

/// Chaîne de traitement complète, construite une fois depuis la config et les poids.
///
/// chunk → fenêtre → trames MFCC → normalisation → cascade → classifieur → affichage.
/// Single-threaded: every call runs to completion before the next chunk is read.
pub struct Pipeline<C: Classifier> {
    window: OverlapWindow,
    framer: FeatureFramer,
    /// `F × n_mfcc` coefficients of the current window.
    features: Vec<f32>,
    n_mfcc: usize,
    norm: Option<BatchNorm>,
    cascade: Cascade<ConvPool>,
    trigger: InferenceTrigger,
    classifier: C,
    display: DisplayBuffer,
    labels: Vec<String>,
    counters: PipelineCounters,
}

impl Pipeline<LstmClassifier> {
    /// Build the production pipeline from validated `config` and `weights`.
    ///
    /// # Errors
    /// Returns [`CoreError::ClassCount`] if the network disagrees with the label set.
    pub fn from_weights(
        config: &PipelineConfig,
        weights: &ModelWeights,
    ) -> Result<Self, CoreError> {
        Self::new(
            config,
            Some(BatchNorm::new(&weights.batch_norm)),
            Cascade::from_weights(weights, config),
            LstmClassifier::new(weights),
        )
    }
}

impl<C: Classifier> Pipeline<C> {
    /// Assemble a pipeline around an arbitrary classifier.
    ///
    /// # Errors
    /// Returns [`CoreError::ClassCount`] if `classifier` does not output one
    /// probability per label, or [`CoreError::Config`] if the cascade does not
    /// match the feature or classifier widths.
    pub fn new(
        config: &PipelineConfig,
        norm: Option<BatchNorm>,
        cascade: Cascade<ConvPool>,
        classifier: C,
    ) -> Result<Self, CoreError> {
        let labels = config.class_labels();
        if classifier.num_classes() != labels.len() {
            return Err(CoreError::ClassCount {
                labels: labels.len(),
                classes: classifier.num_classes(),
            });
        }
        if cascade.in_dim() != config.n_mfcc_bins {
            return Err(CoreError::Config(format!(
                "la cascade attend {} coefficients, n_mfcc_bins = {}",
                cascade.in_dim(),
                config.n_mfcc_bins
            )));
        }
        if cascade.out_dim() != classifier.input_dim() {
            return Err(CoreError::Config(format!(
                "la cascade produit {} valeurs, le classifieur en attend {}",
                cascade.out_dim(),
                classifier.input_dim()
            )));
        }
        if let Some(norm) = &norm
            && norm.dim() != config.n_mfcc_bins
        {
            return Err(CoreError::Config(format!(
                "batch norm sur {} coefficients, n_mfcc_bins = {}",
                norm.dim(),
                config.n_mfcc_bins
            )));
        }

        let framer = FeatureFramer::new(config);
        let n_mfcc = framer.num_coeffs();
        log::debug!(
            "{} trames × {n_mfcc} coefficients par fenêtre, une inférence toutes les {} trames",
            framer.num_frames(),
            config.trigger_period()
        );
        Ok(Self {
            window: OverlapWindow::new(config.window_len(), config.stream_chunk()),
            features: vec![0.0; framer.output_len()],
            framer,
            n_mfcc,
            norm,
            cascade,
            trigger: InferenceTrigger::new(labels.len()),
            classifier,
            display: DisplayBuffer::new(config.display_capacity, labels.len()),
            labels,
            counters: PipelineCounters::default(),
        })
    }

    /// Process one acquisition chunk end to end.
    ///
    /// Returns the number of classifier calls it caused (0 most of the time).
    ///
    /// # Panics
    /// Panics if `chunk.len()` differs from [`Pipeline::chunk_len`].
    pub fn process_chunk(&mut self, chunk: &[i16]) -> usize {
        self.window.insert(chunk);
        self.framer.frame(self.window.get(), &mut self.features);

        let mut fired = 0;
        for frame in self.features.chunks_exact_mut(self.n_mfcc) {
            if let Some(norm) = &self.norm {
                norm.apply(frame);
            }
            self.counters.frames += 1;
            if let Some(representation) = self.cascade.push(frame) {
                let probs = self
                    .trigger
                    .fire(&mut self.classifier, representation, &mut self.display);
                fired += 1;
                self.counters.triggers += 1;
                if log::log_enabled!(log::Level::Trace) {
                    log::trace!("inférence #{} : {probs:?}", self.counters.triggers);
                }
            }
        }
        self.counters.chunks += 1;
        fired
    }

    /// Fresh samples expected by [`Pipeline::process_chunk`].
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        self.window.chunk_len()
    }

    /// Probability history for the renderer.
    #[must_use]
    pub fn display(&self) -> &DisplayBuffer {
        &self.display
    }

    /// Row labels, in classifier output order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Chunks, frames and classifier calls processed since start-up.
    #[must_use]
    pub fn counters(&self) -> PipelineCounters {
        self.counters
    }

    #[cfg(test)]
    pub(crate) fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Forget the classifier's recurrent memory. Buffered frames are kept.
    pub fn reset_classifier(&mut self) {
        self.classifier.reset();
        log::info!("État du classifieur réinitialisé");
    }
}
