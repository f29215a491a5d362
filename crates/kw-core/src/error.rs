use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid or inconsistent pipeline configuration.
    #[error("Configuration invalide : {0}")]
    Config(String),

    /// The classifier and the label set disagree on the number of classes.
    #[error("Nombre de classes incohérent : {labels} libellés, {classes} sorties")]
    ClassCount {
        /// Labels derived from the keyword list.
        labels: usize,
        /// Width of the classifier output.
        classes: usize,
    },
}
