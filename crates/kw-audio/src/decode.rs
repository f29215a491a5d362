use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use kw_core::traits::AudioSource;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Decode an audio file into mono i16 samples at its native rate.
///
/// Supports WAV, FLAC, OGG, MP3 via symphonia.
///
/// # Errors
/// Returns an error if the file cannot be opened or decoded.
///
/// # Example
/// ```no_run
/// use kw_audio::decode::decode_file;
/// let (samples, sample_rate) = decode_file("keyword.wav").unwrap();
/// ```
pub fn decode_file(path: impl AsRef<Path>) -> Result<(Vec<i16>, u32)> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Cannot open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(
        Box::new(file),
        symphonia::core::io::MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .context("No default audio track found")?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::DecodeError("sample rate absent du flux".into()))?;
    let channels = track
        .codec_params
        .channels
        .map_or(1, symphonia::core::audio::Channels::count);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let track_id = track.id;
    let mut all_samples: Vec<i16> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut max_sample_frames: usize = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(AudioError::DecodeError(e.to_string()))
                    .with_context(|| format!("Lecture de {}", path.display()));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::warn!("Audio decode frame error: {e}");
                continue;
            }
            Err(e) => return Err(AudioError::DecodeError(e.to_string()).into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.capacity();
        // Reuse SampleBuffer: only reallocate if this packet is bigger than current capacity
        if sample_buf.is_none() || num_frames > max_sample_frames {
            sample_buf = Some(SampleBuffer::<f32>::new(num_frames as u64, spec));
            max_sample_frames = num_frames;
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        // Downmix to mono
        for frame in buf.samples().chunks(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            all_samples.push((mono * 32_768.0).clamp(-32_768.0, 32_767.0) as i16);
        }
    }

    log::info!(
        "Decoded {} samples @ {}Hz from {}",
        all_samples.len(),
        sample_rate,
        path.display()
    );

    Ok((all_samples, sample_rate))
}

/// Rejoue un fichier audio décodé chunk par chunk, comme un micro.
///
/// With pacing enabled, each read sleeps until the chunk's wall-clock slot so the
/// display advances at the speed the audio was recorded. The trailing partial
/// chunk is dropped: it cannot fill a full analysis window.
///
/// # Example
/// ```
/// use kw_audio::decode::FileSource;
/// use kw_core::traits::AudioSource;
///
/// let mut source = FileSource::from_samples(vec![1, 2, 3, 4, 5], 16_000, false);
/// let mut chunk = [0i16; 2];
/// assert!(source.read_chunk(&mut chunk).unwrap());
/// assert_eq!(chunk, [1, 2]);
/// assert!(source.read_chunk(&mut chunk).unwrap());
/// assert!(!source.read_chunk(&mut chunk).unwrap());
/// ```
pub struct FileSource {
    samples: Vec<i16>,
    position: usize,
    sample_rate: u32,
    paced: bool,
    started: Option<Instant>,
    closed: bool,
}

impl FileSource {
    /// Decode `path` and check it runs at `expected_rate`.
    ///
    /// # Errors
    /// Returns an error if decoding fails or the sample rate differs.
    pub fn open(path: &Path, expected_rate: u32, paced: bool) -> Result<Self> {
        let (samples, sample_rate) = decode_file(path)?;
        if sample_rate != expected_rate {
            return Err(AudioError::SampleRateMismatch {
                expected: expected_rate,
                found: sample_rate,
            }
            .into());
        }
        Ok(Self::from_samples(samples, sample_rate, paced))
    }

    /// Replay samples already in memory.
    #[must_use]
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32, paced: bool) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
            paced,
            started: None,
            closed: false,
        }
    }

    /// Samples not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    /// Block until the wall clock catches up with the stream position.
    fn pace(&mut self) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = Duration::from_secs_f64(self.position as f64 / f64::from(self.sample_rate));
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }
}

impl AudioSource for FileSource {
    type Error = AudioError;

    fn read_chunk(&mut self, out: &mut [i16]) -> Result<bool, AudioError> {
        if self.closed || self.remaining() < out.len() {
            return Ok(false);
        }
        if self.paced {
            self.pace();
        }
        out.copy_from_slice(&self.samples[self.position..self.position + out.len()]);
        self.position += out.len();
        Ok(true)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            log::info!(
                "Lecture fichier terminée ({} échantillons non lus)",
                self.remaining()
            );
        }
    }
}
