//! Triangular mel filterbank over a linear magnitude spectrum.

/// HTK mel scale.
#[inline]
fn hertz_to_mel(freq: f32) -> f32 {
    1127.0 * (1.0 + freq / 700.0).ln()
}

/// Mel projection matrix, stored band-major (`n_mel_bins × spectrum_bins`).
///
/// Band edges are spaced linearly on the mel scale between `lower_freq` and
/// `upper_freq`; slopes are computed in the mel domain and the DC bin carries no
/// weight.
///
/// # Example
/// ```
/// use kw_audio::mel::MelFilterbank;
/// let bank = MelFilterbank::new(16_000, 257, 40, 20.0, 4_000.0);
/// let mut mel = vec![0.0f32; 40];
/// bank.project(&vec![1.0f32; 257], &mut mel);
/// assert!(mel.iter().all(|&e| e > 0.0));
/// ```
pub struct MelFilterbank {
    weights: Vec<f32>,
    n_bins: usize,
    n_mel: usize,
}

impl MelFilterbank {
    /// Build the matrix for `n_bins` spectrum bins spanning `[0, sample_rate / 2]`.
    ///
    /// # Panics
    /// Panics if `n_bins < 2` or `n_mel == 0`.
    #[must_use]
    pub fn new(
        sample_rate: u32,
        n_bins: usize,
        n_mel: usize,
        lower_freq: f32,
        upper_freq: f32,
    ) -> Self {
        assert!(n_bins >= 2, "need at least two spectrum bins");
        assert!(n_mel > 0, "need at least one mel band");

        let nyquist = sample_rate as f32 / 2.0;
        let bin_hz = nyquist / (n_bins - 1) as f32;

        let mel_lo = hertz_to_mel(lower_freq);
        let mel_hi = hertz_to_mel(upper_freq);
        let edges: Vec<f32> = (0..n_mel + 2)
            .map(|i| mel_lo + (mel_hi - mel_lo) * i as f32 / (n_mel + 1) as f32)
            .collect();

        let mut weights = vec![0.0f32; n_mel * n_bins];
        for (m, band) in weights.chunks_exact_mut(n_bins).enumerate() {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            // bin 0 (DC) stays at zero
            for (k, w) in band.iter_mut().enumerate().skip(1) {
                let mel = hertz_to_mel(k as f32 * bin_hz);
                let rising = (mel - left) / (center - left);
                let falling = (right - mel) / (right - center);
                *w = rising.min(falling).max(0.0);
            }
        }

        Self {
            weights,
            n_bins,
            n_mel,
        }
    }

    /// Project `spectrum` onto the mel bands, writing one energy per band into `out`.
    ///
    /// # Panics
    /// Panics on length mismatch.
    pub fn project(&self, spectrum: &[f32], out: &mut [f32]) {
        assert_eq!(spectrum.len(), self.n_bins, "spectrum length mismatch");
        assert_eq!(out.len(), self.n_mel, "mel output length mismatch");

        for (e, band) in out.iter_mut().zip(self.weights.chunks_exact(self.n_bins)) {
            *e = band.iter().zip(spectrum).map(|(w, m)| w * m).sum();
        }
    }

    /// Weight of spectrum bin `bin` in band `band`.
    #[must_use]
    pub fn weight(&self, bin: usize, band: usize) -> f32 {
        self.weights[band * self.n_bins + bin]
    }

    /// Number of mel bands.
    #[must_use]
    pub fn num_bands(&self) -> usize {
        self.n_mel
    }
}
