//! Configuration, types, and shared structures for kwspot.
//!
//! This crate contains the shared configuration, error taxonomy, collaborator
//! traits and the display ring buffer used across the kwspot workspace.

pub mod config;
pub mod display;
pub mod error;
pub mod traits;

pub use config::{PipelineConfig, PoolingMode};
pub use display::DisplayBuffer;
pub use error::CoreError;
pub use traits::{AudioSource, Classifier};
