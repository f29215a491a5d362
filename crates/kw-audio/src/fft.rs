use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Windowed real FFT of one STFT frame.
///
/// Pre-allocates the FFT plan and scratch buffers for zero-allocation hot path.
/// Frames shorter than the FFT size are zero-padded.
///
/// # Example
/// ```
/// use kw_audio::fft::FftPipeline;
/// let mut fft = FftPipeline::new(400, 512);
/// let mut mags = vec![0.0f32; fft.num_bins()];
/// fft.magnitudes(&vec![0.0f32; 400], &mut mags);
/// assert_eq!(mags.len(), 257); // N/2 + 1
/// ```
pub struct FftPipeline {
    fft_length: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    plan: Arc<dyn RealToComplex<f32>>,
    /// Periodic Hann window over `frame_length` samples.
    window: Vec<f32>,
}

impl FftPipeline {
    /// Create a pipeline for frames of `frame_length` samples padded to `fft_length`.
    ///
    /// # Panics
    /// Panics if `frame_length` is 0 or exceeds `fft_length`.
    #[must_use]
    pub fn new(frame_length: usize, fft_length: usize) -> Self {
        assert!(
            frame_length > 0 && frame_length <= fft_length,
            "frame length {frame_length} must be in 1..={fft_length}"
        );

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_length);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        // Periodic Hann: 0.5 * (1 - cos(2*pi*i/N))
        let window = (0..frame_length)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / frame_length as f32).cos())
            })
            .collect();

        Self {
            fft_length,
            input_buf,
            spectrum_buf,
            scratch,
            plan,
            window,
        }
    }

    /// Window `frame`, transform it and write `|X[k]|` into `out` (N/2+1 bins).
    ///
    /// # Panics
    /// Panics if `frame` is not `frame_length` long or `out` is not `num_bins()` long.
    pub fn magnitudes(&mut self, frame: &[f32], out: &mut [f32]) {
        assert_eq!(frame.len(), self.window.len(), "STFT frame length mismatch");
        assert_eq!(out.len(), self.spectrum_buf.len(), "spectrum length mismatch");

        let (head, tail) = self.input_buf.split_at_mut(frame.len());
        for ((slot, &x), &w) in head.iter_mut().zip(frame).zip(&self.window) {
            *slot = x * w;
        }
        tail.fill(0.0);

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            log::warn!("FFT: buffers de taille inattendue, spectre mis à zéro");
            out.fill(0.0);
            return;
        }

        for (m, c) in out.iter_mut().zip(&self.spectrum_buf) {
            *m = c.norm();
        }
    }

    /// Magnitude bins per frame.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.spectrum_buf.len()
    }

    /// FFT size.
    #[must_use]
    pub fn fft_length(&self) -> usize {
        self.fft_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let (frame_length, fft_length) = (512, 512);
        let bin = 32;
        let frame: Vec<f32> = (0..frame_length)
            .map(|n| (2.0 * std::f32::consts::PI * bin as f32 * n as f32 / fft_length as f32).sin())
            .collect();

        let mut fft = FftPipeline::new(frame_length, fft_length);
        let mut mags = vec![0.0; fft.num_bins()];
        fft.magnitudes(&frame, &mut mags);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(bin));
    }

    #[test]
    fn silence_gives_zero_spectrum() {
        let mut fft = FftPipeline::new(400, 512);
        let mut mags = vec![1.0; fft.num_bins()];
        fft.magnitudes(&[0.0; 400], &mut mags);
        assert!(mags.iter().all(|&m| m == 0.0));
        assert_eq!(fft.fft_length(), 512);
    }
}
