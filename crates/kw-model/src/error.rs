use thiserror::Error;

/// Errors raised while checking model weights against the pipeline.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A weight tensor does not have the size its declared dimensions imply.
    #[error("Tenseur {name} : {got} valeurs, {expected} attendues")]
    Shape {
        /// Path of the tensor inside the weight file.
        name: String,
        /// Size implied by the declared dimensions.
        expected: usize,
        /// Size found in the file.
        got: usize,
    },

    /// Two consecutive layers disagree on the width of the vector between them.
    #[error("Couches incompatibles : {from} produit {produced} valeurs, {to} en attend {expected}")]
    Chain {
        /// Upstream layer.
        from: String,
        /// Downstream layer.
        to: String,
        /// Width produced upstream.
        produced: usize,
        /// Width expected downstream.
        expected: usize,
    },

    /// A convolution is wider than the pooling window that feeds it.
    #[error("Étage {stage} : noyau {kernel_size} plus large que le pooling {pool_size}")]
    KernelTooWide {
        /// Cascade stage index (0-based).
        stage: usize,
        /// Convolution width.
        kernel_size: usize,
        /// Pooling window of the stage.
        pool_size: usize,
    },

    /// The recurrent stack has no layer.
    #[error("Le modèle ne contient aucune couche LSTM")]
    NoRecurrentLayer,
}
