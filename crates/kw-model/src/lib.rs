//! Keyword model for kwspot: input normalization, the pooling cascade, the
//! recurrent classifier, and the trigger that links them to the display.

pub mod cascade;
pub mod error;
pub mod lstm;
pub mod norm;
pub mod stage;
pub mod trigger;
pub mod weights;

pub use cascade::Cascade;
pub use error::ModelError;
pub use lstm::LstmClassifier;
pub use stage::{ConvPool, PoolingStage, StageKernel};
pub use trigger::InferenceTrigger;
pub use weights::{ModelWeights, load_weights};
