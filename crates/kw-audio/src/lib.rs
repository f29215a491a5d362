//! Audio acquisition, overlap windowing, and MFCC extraction for kwspot.

pub mod capture;
pub mod decode;
pub mod error;
pub mod features;
pub mod fft;
pub mod guard;
pub mod mel;
pub mod overlap;

pub use error::AudioError;
