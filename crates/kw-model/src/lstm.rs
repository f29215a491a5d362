use kw_core::traits::Classifier;

use crate::weights::{DenseWeights, LstmWeights, ModelWeights};

#[inline(always)]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable in-place softmax.
fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// One recurrent layer and its running state.
struct LstmLayer {
    input_dim: usize,
    units: usize,
    kernel: Vec<f32>,
    recurrent: Vec<f32>,
    bias: Vec<f32>,
    h: Vec<f32>,
    c: Vec<f32>,
    gates: Vec<f32>,
}

impl LstmLayer {
    fn new(w: &LstmWeights) -> Self {
        Self {
            input_dim: w.input_dim,
            units: w.units,
            kernel: w.kernel.clone(),
            recurrent: w.recurrent_kernel.clone(),
            bias: w.bias.clone(),
            h: vec![0.0; w.units],
            c: vec![0.0; w.units],
            gates: vec![0.0; 4 * w.units],
        }
    }

    /// Advance one timestep; the new hidden state is left in `self.h`.
    fn step(&mut self, x: &[f32]) {
        let width = 4 * self.units;
        self.gates.copy_from_slice(&self.bias);
        for (i, &xi) in x.iter().enumerate() {
            let row = &self.kernel[i * width..(i + 1) * width];
            for (g, &w) in self.gates.iter_mut().zip(row) {
                *g += xi * w;
            }
        }
        for (j, &hj) in self.h.iter().enumerate() {
            let row = &self.recurrent[j * width..(j + 1) * width];
            for (g, &w) in self.gates.iter_mut().zip(row) {
                *g += hj * w;
            }
        }

        // Gate order: input, forget, cell candidate, output
        let u = self.units;
        for k in 0..u {
            let i = sigmoid(self.gates[k]);
            let f = sigmoid(self.gates[u + k]);
            let g = self.gates[2 * u + k].tanh();
            let o = sigmoid(self.gates[3 * u + k]);
            self.c[k] = f * self.c[k] + i * g;
            self.h[k] = o * self.c[k].tanh();
        }
    }

    fn reset(&mut self) {
        self.h.fill(0.0);
        self.c.fill(0.0);
    }
}

/// Stacked LSTM followed by a dense softmax layer.
///
/// Keeps its hidden and cell states across calls: each [`Classifier::infer`] is
/// one timestep of a single-sequence batch, so calls must follow trigger order.
pub struct LstmClassifier {
    layers: Vec<LstmLayer>,
    dense_kernel: Vec<f32>,
    dense_bias: Vec<f32>,
    n_classes: usize,
    /// Input of the layer being stepped.
    carry: Vec<f32>,
}

impl LstmClassifier {
    /// Build from validated weights.
    #[must_use]
    pub fn new(weights: &ModelWeights) -> Self {
        let layers: Vec<LstmLayer> = weights.lstm.iter().map(LstmLayer::new).collect();
        let widest = layers
            .iter()
            .flat_map(|l| [l.input_dim, l.units])
            .max()
            .unwrap_or(0);
        let DenseWeights {
            out_dim,
            kernel,
            bias,
            ..
        } = &weights.dense;

        Self {
            layers,
            dense_kernel: kernel.clone(),
            dense_bias: bias.clone(),
            n_classes: *out_dim,
            carry: vec![0.0; widest],
        }
    }
}

impl Classifier for LstmClassifier {
    fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_dim)
    }

    fn num_classes(&self) -> usize {
        self.n_classes
    }

    fn infer(&mut self, input: &[f32], probs: &mut [f32]) {
        assert_eq!(input.len(), self.input_dim(), "classifier input width mismatch");
        assert_eq!(probs.len(), self.n_classes, "probability vector width mismatch");

        self.carry[..input.len()].copy_from_slice(input);
        let mut width = input.len();
        for layer in &mut self.layers {
            layer.step(&self.carry[..width]);
            width = layer.units;
            self.carry[..width].copy_from_slice(&layer.h);
        }

        probs.copy_from_slice(&self.dense_bias);
        for (j, &hj) in self.carry[..width].iter().enumerate() {
            let row = &self.dense_kernel[j * self.n_classes..(j + 1) * self.n_classes];
            for (p, &w) in probs.iter_mut().zip(row) {
                *p += hj * w;
            }
        }
        softmax(probs);
    }

    fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }
}
