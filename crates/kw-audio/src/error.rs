use thiserror::Error;

/// Errors originating from the audio module.
///
/// Every variant is fatal for the stream: once a chunk is lost the overlap window
/// can no longer be realigned.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio input device found.
    #[error("Aucun périphérique audio d'entrée trouvé")]
    NoInputDevice,

    /// The device cannot deliver the requested stream format.
    #[error("Format audio non supporté : {0}")]
    UnsupportedFormat(String),

    /// Audio stream error reported by the host.
    #[error("Erreur de stream audio : {0}")]
    StreamError(String),

    /// The capture ring filled up and samples were dropped.
    #[error("Débordement du tampon de capture : {dropped} échantillons perdus")]
    Overrun {
        /// Samples discarded by the device callback.
        dropped: u64,
    },

    /// No sample arrived within the acquisition deadline.
    #[error("Aucun échantillon reçu depuis {0:?}")]
    Timeout(std::time::Duration),

    /// A file's sample rate does not match the pipeline's.
    #[error("Fréquence d'échantillonnage {found} Hz, {expected} Hz attendue")]
    SampleRateMismatch {
        /// Rate the pipeline is configured for.
        expected: u32,
        /// Rate of the decoded file.
        found: u32,
    },

    /// Audio decode error.
    #[error("Erreur de décodage : {0}")]
    DecodeError(String),
}
