use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Number of pooling stages in the cascade.
pub const CASCADE_DEPTH: usize = 3;

/// Label of the class emitted when the classifier hears speech outside the vocabulary.
pub const UNKNOWN_LABEL: &str = "(unknown)";

/// Label of the class emitted when nothing is being said.
pub const NULL_LABEL: &str = "(null)";

/// Longest analysis window (and FFT) accepted, in seconds of audio.
pub const MAX_WINDOW_SECONDS: usize = 10;

/// Reduction applied by a pooling stage over its convolved positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    /// Element-wise maximum.
    #[default]
    Max,
    /// Element-wise arithmetic mean.
    Average,
}

/// Complete pipeline configuration, fixed for the whole run.
///
/// Sérialisable en TOML. Chaque champ a une valeur par défaut saine.
///
/// # Example
/// ```
/// use kw_core::config::PipelineConfig;
/// let config = PipelineConfig::default();
/// assert_eq!(config.window_len(), 1360);
/// assert_eq!(config.stream_chunk(), 1120);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PipelineConfig {
    // === Acquisition ===
    /// Microphone / file sample rate in Hz.
    pub sample_rate: u32,

    // === STFT ===
    /// Samples per analysis frame.
    pub frame_length: usize,
    /// Hop between consecutive frames.
    pub frame_step: usize,
    /// FFT size (frames are zero-padded up to it).
    pub fft_length: usize,
    /// Frames produced per analysis window (`F`).
    pub frames_per_window: usize,

    // === MFCC ===
    /// Lower edge of the mel filterbank in Hz.
    pub lower_freq: f32,
    /// Upper edge of the mel filterbank in Hz.
    pub upper_freq: f32,
    /// Number of mel bands.
    pub n_mel_bins: usize,
    /// Number of retained cepstral coefficients.
    pub n_mfcc_bins: usize,

    // === Cascade ===
    /// Pooling window of each stage, lowest first (`K1..K3`).
    pub pool_sizes: [usize; CASCADE_DEPTH],
    /// Reduction applied by every stage.
    pub pooling: PoolingMode,

    // === Display ===
    /// Number of probability vectors kept on screen (`C`).
    pub display_capacity: usize,
    /// Redraw cadence of the terminal display.
    pub redraw_fps: u32,
    /// Keyword vocabulary, in classifier output order.
    pub keywords: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_length: 400,
            frame_step: 160,
            fft_length: 512,
            frames_per_window: 7,
            lower_freq: 20.0,
            upper_freq: 4_000.0,
            n_mel_bins: 40,
            n_mfcc_bins: 10,
            pool_sizes: [2, 2, 2],
            pooling: PoolingMode::Max,
            display_capacity: 30,
            redraw_fps: 30,
            keywords: ["yes", "no", "up", "down", "left", "right", "on", "off"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PipelineConfig {
    /// Length `W` of the analysis window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.frame_length + self.frames_per_window.saturating_sub(1) * self.frame_step
    }

    /// Samples carried over from one window to the next.
    #[must_use]
    pub fn overlap_len(&self) -> usize {
        self.frame_length.saturating_sub(self.frame_step)
    }

    /// Fresh samples consumed per acquisition call.
    #[must_use]
    pub fn stream_chunk(&self) -> usize {
        self.window_len() - self.overlap_len()
    }

    /// Magnitude bins produced by one FFT.
    #[must_use]
    pub fn spectrum_bins(&self) -> usize {
        self.fft_length / 2 + 1
    }

    /// Frames consumed by the cascade per classifier call (`K1 × K2 × K3`).
    #[must_use]
    pub fn trigger_period(&self) -> usize {
        self.pool_sizes.iter().product()
    }

    /// Width of a probability vector: keywords plus the unknown and null classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.keywords.len() + 2
    }

    /// Labels in classifier output order.
    ///
    /// # Example
    /// ```
    /// use kw_core::config::PipelineConfig;
    /// let config = PipelineConfig { keywords: vec!["go".into()], ..PipelineConfig::default() };
    /// assert_eq!(config.class_labels(), ["(unknown)", "go", "(null)"]);
    /// ```
    #[must_use]
    pub fn class_labels(&self) -> Vec<String> {
        std::iter::once(UNKNOWN_LABEL.to_string())
            .chain(self.keywords.iter().cloned())
            .chain(std::iter::once(NULL_LABEL.to_string()))
            .collect()
    }

    /// Check that every parameter is usable and that they agree with each other.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |msg: String| Err(CoreError::Config(msg));

        if self.sample_rate == 0 {
            return fail("sample_rate doit être > 0".into());
        }
        if self.frame_length == 0 || self.frame_step == 0 {
            return fail("frame_length et frame_step doivent être > 0".into());
        }
        if self.frame_step > self.frame_length {
            return fail(format!(
                "frame_step ({}) ne peut pas dépasser frame_length ({})",
                self.frame_step, self.frame_length
            ));
        }
        if self.fft_length < self.frame_length {
            return fail(format!(
                "fft_length ({}) doit couvrir frame_length ({})",
                self.fft_length, self.frame_length
            ));
        }
        if self.frames_per_window == 0 {
            return fail("frames_per_window doit être >= 1".into());
        }

        // W et l'allocation de la FFT sont bornés avant tout calcul non vérifié.
        let max_window = (self.sample_rate as usize).saturating_mul(MAX_WINDOW_SECONDS);
        let window = (self.frames_per_window - 1)
            .checked_mul(self.frame_step)
            .and_then(|hop| hop.checked_add(self.frame_length));
        match window {
            Some(w) if w <= max_window => {}
            _ => {
                return fail(format!(
                    "fenêtre d'analyse trop longue ({} trames de {} pas {}) : \
                     max {MAX_WINDOW_SECONDS} s à {} Hz",
                    self.frames_per_window, self.frame_length, self.frame_step, self.sample_rate
                ));
            }
        }
        if self.fft_length > max_window {
            return fail(format!(
                "fft_length ({}) dépasse {MAX_WINDOW_SECONDS} s à {} Hz",
                self.fft_length, self.sample_rate
            ));
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.lower_freq >= 0.0 && self.lower_freq < self.upper_freq) {
            return fail(format!(
                "lower_freq ({}) doit être dans [0, upper_freq ({}))",
                self.lower_freq, self.upper_freq
            ));
        }
        if self.upper_freq > nyquist {
            return fail(format!(
                "upper_freq ({}) dépasse la fréquence de Nyquist ({nyquist})",
                self.upper_freq
            ));
        }
        if self.n_mel_bins == 0 {
            return fail("n_mel_bins doit être > 0".into());
        }
        if self.n_mfcc_bins == 0 || self.n_mfcc_bins > self.n_mel_bins {
            return fail(format!(
                "n_mfcc_bins ({}) doit être dans [1, n_mel_bins ({})]",
                self.n_mfcc_bins, self.n_mel_bins
            ));
        }

        if let Some(stage) = self.pool_sizes.iter().position(|&k| k == 0) {
            return fail(format!("pool_sizes[{stage}] doit être >= 1"));
        }
        if self
            .pool_sizes
            .iter()
            .try_fold(1usize, |acc, &k| acc.checked_mul(k))
            .is_none()
        {
            return fail(format!("pool_sizes {:?} : produit hors limites", self.pool_sizes));
        }

        if self.display_capacity == 0 {
            return fail("display_capacity doit être >= 1".into());
        }
        if self.redraw_fps == 0 {
            return fail("redraw_fps doit être > 0".into());
        }
        if self.keywords.is_empty() {
            return fail("keywords ne peut pas être vide".into());
        }

        Ok(())
    }
}

/// Structure TOML intermédiaire pour désérialisation avec valeurs optionnelles.
#[derive(Deserialize)]
struct ConfigFile {
    audio: Option<AudioSection>,
    stft: Option<StftSection>,
    mfcc: Option<MfccSection>,
    cascade: Option<CascadeSection>,
    display: Option<DisplaySection>,
}

#[derive(Deserialize)]
struct AudioSection {
    sample_rate: Option<u32>,
}

#[derive(Deserialize)]
struct StftSection {
    frame_length: Option<usize>,
    frame_step: Option<usize>,
    fft_length: Option<usize>,
    frames_per_window: Option<usize>,
}

#[derive(Deserialize)]
struct MfccSection {
    lower_freq: Option<f32>,
    upper_freq: Option<f32>,
    n_mel_bins: Option<usize>,
    n_mfcc_bins: Option<usize>,
}

#[derive(Deserialize)]
struct CascadeSection {
    pool_sizes: Option<[usize; CASCADE_DEPTH]>,
    pooling: Option<PoolingMode>,
}

#[derive(Deserialize)]
struct DisplaySection {
    capacity: Option<usize>,
    redraw_fps: Option<u32>,
    keywords: Option<Vec<String>>,
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// The result is not validated: callers apply their overrides first, then call
/// [`PipelineConfig::validate`].
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use kw_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Erreur de parsing TOML dans {}", path.display()))
}

/// Parse a TOML document and merge it onto [`PipelineConfig::default`].
///
/// # Errors
/// Returns an error if the document is not valid TOML for this schema.
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let file: ConfigFile = toml::from_str(content)?;
    let mut config = PipelineConfig::default();

    if let Some(a) = file.audio {
        if let Some(v) = a.sample_rate {
            config.sample_rate = v;
        }
    }

    if let Some(s) = file.stft {
        if let Some(v) = s.frame_length {
            config.frame_length = v;
        }
        if let Some(v) = s.frame_step {
            config.frame_step = v;
        }
        if let Some(v) = s.fft_length {
            config.fft_length = v;
        }
        if let Some(v) = s.frames_per_window {
            config.frames_per_window = v;
        }
    }

    if let Some(m) = file.mfcc {
        if let Some(v) = m.lower_freq {
            config.lower_freq = v;
        }
        if let Some(v) = m.upper_freq {
            config.upper_freq = v;
        }
        if let Some(v) = m.n_mel_bins {
            config.n_mel_bins = v;
        }
        if let Some(v) = m.n_mfcc_bins {
            config.n_mfcc_bins = v;
        }
    }

    if let Some(c) = file.cascade {
        if let Some(v) = c.pool_sizes {
            config.pool_sizes = v;
        }
        if let Some(v) = c.pooling {
            config.pooling = v;
        }
    }

    if let Some(d) = file.display {
        if let Some(v) = d.capacity {
            config.display_capacity = v;
        }
        if let Some(v) = d.redraw_fps {
            config.redraw_fps = v;
        }
        if let Some(v) = d.keywords {
            config.keywords = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_geometry_matches_stream_chunk() {
        let config = PipelineConfig::default();
        assert_eq!(config.overlap_len(), 240);
        assert_eq!(config.window_len(), config.stream_chunk() + config.overlap_len());
        assert_eq!(config.stream_chunk(), config.frames_per_window * config.frame_step);
        assert_eq!(config.spectrum_bins(), 257);
        assert_eq!(config.trigger_period(), 8);
        assert_eq!(config.n_classes(), 10);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [stft]
            frames_per_window = 5

            [cascade]
            pooling = "average"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.frames_per_window, 5);
        assert_eq!(config.pooling, PoolingMode::Average);
        assert_eq!(config.frame_length, 400);
        assert_eq!(config.display_capacity, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "[display]\ncapacity = 12\nkeywords = [\"stop\", \"go\"]\n\n[audio]\nsample_rate = 8000"
        )
        .expect("write");

        let config = load_config(file.path()).expect("load");
        assert_eq!(config.display_capacity, 12);
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.class_labels(), ["(unknown)", "stop", "go", "(null)"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/kwspot.toml")).is_err());
    }

    #[test]
    fn unknown_pooling_mode_is_rejected() {
        assert!(parse_config("[cascade]\npooling = \"median\"").is_err());
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let with = |edit: fn(&mut PipelineConfig)| {
            let mut config = PipelineConfig::default();
            edit(&mut config);
            config
        };
        let cases = [
            with(|c| c.frame_step = 500),
            with(|c| c.fft_length = 256),
            with(|c| c.frames_per_window = 0),
            with(|c| c.frames_per_window = usize::MAX / 100),
            with(|c| c.frames_per_window = 1_000),
            with(|c| {
                c.frame_length = 200_000;
                c.fft_length = 262_144;
            }),
            with(|c| c.fft_length = usize::MAX),
            with(|c| c.upper_freq = 9_000.0),
            with(|c| c.lower_freq = 5_000.0),
            with(|c| c.n_mfcc_bins = 41),
            with(|c| c.pool_sizes = [2, 0, 2]),
            with(|c| c.pool_sizes = [usize::MAX, 2, 2]),
            with(|c| c.display_capacity = 0),
            with(|c| c.keywords = Vec::new()),
        ];
        for config in &cases {
            assert!(
                matches!(config.validate(), Err(CoreError::Config(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn oversized_window_from_file_is_a_config_error() {
        let config = parse_config("[stft]\nframes_per_window = 184467440737095516").expect("parse");
        let err = config.validate().expect_err("window too long");
        assert!(err.to_string().contains("trop longue"), "{err}");
    }

    #[test]
    fn window_at_the_cap_is_accepted() {
        // 1 + 999 pas de 160 = 160 000 échantillons = 10 s à 16 kHz.
        let config = PipelineConfig {
            frame_length: 160,
            frames_per_window: 1_000,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.window_len(), 16_000 * MAX_WINDOW_SECONDS);
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let shipped = parse_config(include_str!("../../../config/default.toml")).expect("parse");
        assert!(shipped.validate().is_ok());
        assert_eq!(shipped.window_len(), PipelineConfig::default().window_len());
        assert_eq!(shipped.keywords, PipelineConfig::default().keywords);
    }
}
