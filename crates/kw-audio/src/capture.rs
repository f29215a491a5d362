use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use kw_core::traits::AudioSource;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::AudioError;

/// Longest wait for a single chunk before the device is declared stalled.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Sleep between two polls of the capture ring while a chunk is incomplete.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Microphone capture via cpal.
///
/// The device callback downmixes to mono i16 and pushes into a lock-free ring
/// buffer; [`AudioSource::read_chunk`] blocks on the consumer side until a full
/// chunk is available.
///
/// # Example
/// ```no_run
/// use kw_audio::capture::MicSource;
/// let mic = MicSource::open(16_000, 1120).unwrap();
/// ```
pub struct MicSource {
    stream: Option<cpal::Stream>,
    consumer: Consumer<i16>,
    /// Samples the callback could not push (ring full).
    dropped: Arc<AtomicU64>,
    /// Set by the host error callback.
    failed: Arc<AtomicBool>,
}

impl MicSource {
    /// Open the default input device at `sample_rate`, mono, sized for `chunk_size` reads.
    ///
    /// # Errors
    /// Returns an error if no device exists, if it cannot run at `sample_rate`,
    /// or if the stream cannot be started.
    pub fn open(sample_rate: u32, chunk_size: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoInputDevice)?;
        if let Ok(name) = device.name() {
            log::info!("Périphérique d'entrée : {name}");
        }

        let supported = pick_config(&device, sample_rate)?;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = usize::from(config.channels);

        // Ring buffer: 2 secondes d'audio, au moins 4 chunks
        let capacity = (sample_rate as usize * 2).max(chunk_size * 4);
        let (producer, consumer) = RingBuffer::new(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match format {
            SampleFormat::I16 => build_stream(
                &device,
                &config,
                channels,
                producer,
                &dropped,
                &failed,
                |s: i16| f32::from(s) / 32_768.0,
            )?,
            SampleFormat::F32 => build_stream(
                &device,
                &config,
                channels,
                producer,
                &dropped,
                &failed,
                |s: f32| s,
            )?,
            other => return Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        log::info!(
            "Capture micro démarrée @ {sample_rate}Hz ({channels} canal/canaux, {format:?})"
        );

        Ok(Self {
            stream: Some(stream),
            consumer,
            dropped,
            failed,
        })
    }
}

impl AudioSource for MicSource {
    type Error = AudioError;

    fn read_chunk(&mut self, out: &mut [i16]) -> Result<bool, AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::StreamError("stream fermé".into()));
        }

        let deadline = Instant::now() + READ_TIMEOUT;
        let mut filled = 0;

        while filled < out.len() {
            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                return Err(AudioError::Overrun { dropped });
            }
            if self.failed.load(Ordering::Relaxed) {
                return Err(AudioError::StreamError("le périphérique a signalé une erreur".into()));
            }

            let wanted = self.consumer.slots().min(out.len() - filled);
            if wanted == 0 {
                if Instant::now() > deadline {
                    return Err(AudioError::Timeout(READ_TIMEOUT));
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            let chunk = self
                .consumer
                .read_chunk(wanted)
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
            let (first, second) = chunk.as_slices();
            out[filled..filled + first.len()].copy_from_slice(first);
            out[filled + first.len()..filled + wanted].copy_from_slice(second);
            chunk.commit_all();
            filled += wanted;
        }

        Ok(true)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Arrêt du stream audio : {e}");
            }
            drop(stream);
            log::info!("Stream micro fermé");
        }
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Find an input configuration able to run at `sample_rate`, preferring mono i16.
fn pick_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let rate = cpal::SampleRate(sample_rate);
    let ranges = device
        .supported_input_configs()
        .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;

    ranges
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| matches!(r.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .min_by_key(|r| (r.channels(), r.sample_format() != SampleFormat::I16))
        .map(|r| r.with_sample_rate(rate))
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "aucune configuration d'entrée à {sample_rate}Hz"
            ))
        })
}

/// Build an input stream that downmixes `T` frames to mono i16.
fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut producer: Producer<i16>,
    dropped: &Arc<AtomicU64>,
    failed: &Arc<AtomicBool>,
    to_f32: F,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let dropped = Arc::clone(dropped);
    let failed = Arc::clone(failed);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Downmix to mono and push into ring buffer
                for frame in data.chunks(channels) {
                    let mono = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / channels as f32;
                    let sample = (mono * 32_768.0).clamp(-32_768.0, 32_767.0) as i16;
                    if producer.push(sample).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {err}");
                failed.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}
