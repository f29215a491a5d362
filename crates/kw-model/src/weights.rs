use std::path::Path;

use anyhow::{Context, Result};
use kw_core::config::{CASCADE_DEPTH, PipelineConfig};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Trained parameters of the whole network, as exported to JSON.
///
/// Matrices are flattened row-major in Keras layout (`[input][output]`).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelWeights {
    /// Normalization applied to each MFCC frame before the cascade.
    pub batch_norm: BatchNormWeights,
    /// One convolution per cascade stage, lowest first.
    pub conv: [ConvWeights; CASCADE_DEPTH],
    /// Stacked recurrent layers.
    pub lstm: Vec<LstmWeights>,
    /// Output projection to class logits.
    pub dense: DenseWeights,
}

/// Inference-time batch normalization.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchNormWeights {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    pub moving_mean: Vec<f32>,
    pub moving_variance: Vec<f32>,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
}

fn default_epsilon() -> f32 {
    1e-3
}

/// 1-D convolution over time, `kernel_size × in_dim × out_dim`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConvWeights {
    pub kernel_size: usize,
    pub in_dim: usize,
    pub out_dim: usize,
    pub kernel: Vec<f32>,
    pub bias: Vec<f32>,
}

/// One LSTM layer, gates ordered input, forget, cell, output.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LstmWeights {
    pub input_dim: usize,
    pub units: usize,
    /// `input_dim × 4·units`
    pub kernel: Vec<f32>,
    /// `units × 4·units`
    pub recurrent_kernel: Vec<f32>,
    /// `4·units`
    pub bias: Vec<f32>,
}

/// Fully-connected output layer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DenseWeights {
    pub in_dim: usize,
    pub out_dim: usize,
    pub kernel: Vec<f32>,
    pub bias: Vec<f32>,
}

fn check_len(name: impl Into<String>, values: &[f32], expected: usize) -> Result<(), ModelError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ModelError::Shape {
            name: name.into(),
            expected,
            got: values.len(),
        })
    }
}

fn check_chain(
    from: String,
    produced: usize,
    to: String,
    expected: usize,
) -> Result<(), ModelError> {
    if produced == expected {
        Ok(())
    } else {
        Err(ModelError::Chain {
            from,
            to,
            produced,
            expected,
        })
    }
}

impl ModelWeights {
    /// Check every tensor size and every layer-to-layer width against `config`.
    ///
    /// # Errors
    /// Returns the first inconsistency found.
    pub fn validate(&self, config: &PipelineConfig) -> Result<(), ModelError> {
        let n_mfcc = config.n_mfcc_bins;
        let bn = &self.batch_norm;
        check_len("batch_norm.gamma", &bn.gamma, n_mfcc)?;
        check_len("batch_norm.beta", &bn.beta, n_mfcc)?;
        check_len("batch_norm.moving_mean", &bn.moving_mean, n_mfcc)?;
        check_len("batch_norm.moving_variance", &bn.moving_variance, n_mfcc)?;

        let mut width = n_mfcc;
        let mut from = String::from("mfcc");
        for (stage, (conv, &pool_size)) in self.conv.iter().zip(&config.pool_sizes).enumerate() {
            let name = format!("conv[{stage}]");
            check_chain(from, width, name.clone(), conv.in_dim)?;
            if conv.kernel_size == 0 || conv.kernel_size > pool_size {
                return Err(ModelError::KernelTooWide {
                    stage,
                    kernel_size: conv.kernel_size,
                    pool_size,
                });
            }
            check_len(
                format!("{name}.kernel"),
                &conv.kernel,
                conv.kernel_size * conv.in_dim * conv.out_dim,
            )?;
            check_len(format!("{name}.bias"), &conv.bias, conv.out_dim)?;
            width = conv.out_dim;
            from = name;
        }

        if self.lstm.is_empty() {
            return Err(ModelError::NoRecurrentLayer);
        }
        for (i, layer) in self.lstm.iter().enumerate() {
            let name = format!("lstm[{i}]");
            check_chain(from, width, name.clone(), layer.input_dim)?;
            let gates = 4 * layer.units;
            check_len(format!("{name}.kernel"), &layer.kernel, layer.input_dim * gates)?;
            check_len(
                format!("{name}.recurrent_kernel"),
                &layer.recurrent_kernel,
                layer.units * gates,
            )?;
            check_len(format!("{name}.bias"), &layer.bias, gates)?;
            width = layer.units;
            from = name;
        }

        let dense = &self.dense;
        check_chain(from, width, "dense".into(), dense.in_dim)?;
        check_len("dense.kernel", &dense.kernel, dense.in_dim * dense.out_dim)?;
        check_len("dense.bias", &dense.bias, dense.out_dim)?;
        check_chain("dense".into(), dense.out_dim, "classes".into(), config.n_classes())?;

        Ok(())
    }
}

/// Charge les poids du modèle depuis un fichier JSON.
///
/// # Errors
/// Returns an error if the file cannot be read or does not match the schema.
///
/// # Example
/// ```no_run
/// use kw_model::weights::load_weights;
/// use std::path::Path;
/// let weights = load_weights(Path::new("model/weights.json")).unwrap();
/// ```
pub fn load_weights(path: &Path) -> Result<ModelWeights> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    let weights: ModelWeights = serde_json::from_str(&content)
        .with_context(|| format!("Poids invalides dans {}", path.display()))?;
    log::info!(
        "Poids chargés : {} couche(s) LSTM, {} classes",
        weights.lstm.len(),
        weights.dense.out_dim
    );
    Ok(weights)
}
