use kw_core::config::PipelineConfig;

use crate::fft::FftPipeline;
use crate::mel::MelFilterbank;

/// Added to every mel energy before the logarithm so silence stays finite.
pub const LOG_OFFSET: f32 = 1e-8;

/// Découpe une fenêtre d'analyse en `F` trames et calcule leurs MFCC.
///
/// Per frame: periodic Hann → FFT magnitude → mel projection → `ln(x + 1e-8)` →
/// DCT-II scaled by `1 / sqrt(2 · n_mel)` → first `n_mfcc` coefficients.
///
/// No state survives between calls other than scratch buffers; all temporal
/// continuity lives in the overlap window upstream.
///
/// # Example
/// ```
/// use kw_audio::features::FeatureFramer;
/// use kw_core::config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// let mut framer = FeatureFramer::new(&config);
/// let mut out = vec![0.0f32; framer.output_len()];
/// framer.frame(&vec![0.0f32; config.window_len()], &mut out);
/// assert!(out.iter().all(|c| c.is_finite()));
/// ```
pub struct FeatureFramer {
    fft: FftPipeline,
    mel: MelFilterbank,
    /// DCT-II basis, `n_mfcc × n_mel`, scaling included.
    dct: Vec<f32>,
    frame_length: usize,
    frame_step: usize,
    n_frames: usize,
    n_mfcc: usize,
    spectrum: Vec<f32>,
    log_mel: Vec<f32>,
}

impl FeatureFramer {
    /// Build the transform stack from the pipeline parameters.
    ///
    /// The config must already be validated.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let fft = FftPipeline::new(config.frame_length, config.fft_length);
        let n_bins = config.spectrum_bins();
        debug_assert_eq!(n_bins, fft.num_bins());
        let mel = MelFilterbank::new(
            config.sample_rate,
            n_bins,
            config.n_mel_bins,
            config.lower_freq,
            config.upper_freq,
        );

        Self {
            fft,
            mel,
            dct: dct_basis(config.n_mfcc_bins, config.n_mel_bins),
            frame_length: config.frame_length,
            frame_step: config.frame_step,
            n_frames: config.frames_per_window,
            n_mfcc: config.n_mfcc_bins,
            spectrum: vec![0.0; n_bins],
            log_mel: vec![0.0; config.n_mel_bins],
        }
    }

    /// Compute the features of every frame of `window`, time-ordered, into `out`.
    ///
    /// `out` is `frames × coeffs`, row-major.
    ///
    /// # Panics
    /// Panics if `window` is not the configured window length or `out` is not
    /// [`FeatureFramer::output_len`] long.
    pub fn frame(&mut self, window: &[f32], out: &mut [f32]) {
        let window_len = self.frame_length + (self.n_frames - 1) * self.frame_step;
        assert_eq!(window.len(), window_len, "analysis window length mismatch");
        assert_eq!(out.len(), self.output_len(), "feature output length mismatch");

        for (i, coeffs) in out.chunks_exact_mut(self.n_mfcc).enumerate() {
            let start = i * self.frame_step;
            self.fft
                .magnitudes(&window[start..start + self.frame_length], &mut self.spectrum);
            self.mel.project(&self.spectrum, &mut self.log_mel);
            for e in &mut self.log_mel {
                *e = (*e + LOG_OFFSET).ln();
            }
            for (c, basis) in coeffs.iter_mut().zip(self.dct.chunks_exact(self.log_mel.len())) {
                *c = basis.iter().zip(&self.log_mel).map(|(b, e)| b * e).sum();
            }
        }
    }

    /// Frames per window (`F`).
    #[must_use]
    pub fn num_frames(&self) -> usize {
        self.n_frames
    }

    /// Coefficients per frame.
    #[must_use]
    pub fn num_coeffs(&self) -> usize {
        self.n_mfcc
    }

    /// Length of the buffer expected by [`FeatureFramer::frame`].
    #[must_use]
    pub fn output_len(&self) -> usize {
        self.n_frames * self.n_mfcc
    }
}

/// DCT-II rows `2·cos(π·k·(2n+1) / 2N)` scaled by `1 / sqrt(2N)`, first `n_coeffs` rows only.
fn dct_basis(n_coeffs: usize, n_mel: usize) -> Vec<f32> {
    let n = n_mel as f32;
    let scale = 1.0 / (2.0 * n).sqrt();
    (0..n_coeffs)
        .flat_map(|k| {
            (0..n_mel).map(move |m| {
                2.0 * scale
                    * (std::f32::consts::PI * k as f32 * (2.0 * m as f32 + 1.0) / (2.0 * n)).cos()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn silent_window_is_finite_and_uniform() {
        let config = config();
        let mut framer = FeatureFramer::new(&config);
        let mut out = vec![f32::NAN; framer.output_len()];
        framer.frame(&vec![0.0; config.window_len()], &mut out);

        assert!(out.iter().all(|c| c.is_finite()));
        // Constant log-mel: all the energy lands in c0, the rest vanish.
        let c0 = LOG_OFFSET.ln() * (2.0 * config.n_mel_bins as f32).sqrt();
        for frame in out.chunks_exact(config.n_mfcc_bins) {
            assert!((frame[0] - c0).abs() < 1e-2 * c0.abs());
            assert!(frame[1..].iter().all(|c| c.abs() < 1e-2));
        }
    }

    #[test]
    fn frames_follow_time_order() {
        let config = config();
        let mut framer = FeatureFramer::new(&config);
        // Silence everywhere except the last frame's exclusive tail.
        let mut window = vec![0.0f32; config.window_len()];
        let loud_from = config.window_len() - config.frame_step;
        for (n, s) in window[loud_from..].iter_mut().enumerate() {
            *s = (n as f32 * 0.3).sin() * 0.5;
        }

        let mut out = vec![0.0; framer.output_len()];
        framer.frame(&window, &mut out);
        let frames: Vec<&[f32]> = out.chunks_exact(framer.num_coeffs()).collect();

        assert_eq!(framer.num_frames(), config.frames_per_window);
        assert_eq!(frames.len(), framer.num_frames());
        assert!(frames.last().is_some_and(|f| f[0] > frames[0][0] + 1.0));
        assert_eq!(frames[0], frames[1]);
    }

    #[test]
    fn dct_row_zero_is_constant() {
        let basis = dct_basis(3, 8);
        assert!(basis[..8].windows(2).all(|w| (w[0] - w[1]).abs() < 1e-6));
    }
}
