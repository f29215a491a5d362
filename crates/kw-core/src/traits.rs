/// Fournit des blocs d'échantillons audio au pipeline.
///
/// Implémenté par : `MicSource`, `FileSource`.
///
/// # Example
/// ```
/// use kw_core::traits::AudioSource;
///
/// struct Silence;
/// impl AudioSource for Silence {
///     type Error = std::convert::Infallible;
///     fn read_chunk(&mut self, out: &mut [i16]) -> Result<bool, Self::Error> {
///         out.fill(0);
///         Ok(true)
///     }
///     fn close(&mut self) {}
/// }
/// ```
pub trait AudioSource {
    /// Acquisition failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fill `out` with exactly `out.len()` fresh samples.
    ///
    /// Blocks until the samples are available. Returns `Ok(false)` only when a
    /// finite source is exhausted; `out` is then left unspecified.
    ///
    /// # Errors
    /// Any failure is fatal for the stream: a partial read cannot be realigned.
    fn read_chunk(&mut self, out: &mut [i16]) -> Result<bool, Self::Error>;

    /// Stop and release the underlying device or file.
    fn close(&mut self);
}

/// Classifieur stateful : une représentation en entrée, une distribution de probabilités en sortie.
///
/// CONTRAT : appelé au plus une fois par déclenchement de la cascade, dans l'ordre des
/// déclenchements. La mémoire récurrente interne dépend de cet ordre.
///
/// # Example
/// ```
/// use kw_core::traits::Classifier;
///
/// struct Uniform(usize);
/// impl Classifier for Uniform {
///     fn input_dim(&self) -> usize { 4 }
///     fn num_classes(&self) -> usize { self.0 }
///     fn infer(&mut self, _input: &[f32], probs: &mut [f32]) {
///         probs.fill(1.0 / self.0 as f32);
///     }
///     fn reset(&mut self) {}
/// }
/// ```
pub trait Classifier {
    /// Width of the representation expected by [`Classifier::infer`].
    fn input_dim(&self) -> usize;

    /// Width of the probability vector.
    fn num_classes(&self) -> usize;

    /// Advance the recurrent state by one timestep and write the class probabilities.
    ///
    /// CONTRAT : ne doit PAS allouer. `probs.len() == num_classes()`.
    fn infer(&mut self, input: &[f32], probs: &mut [f32]);

    /// Forget all recurrent memory.
    fn reset(&mut self);
}
