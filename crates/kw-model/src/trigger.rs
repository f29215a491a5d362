use kw_core::display::DisplayBuffer;
use kw_core::traits::Classifier;

/// Passe la représentation du dernier étage au classifieur, une fois par déclenchement.
///
/// Holds only the output scratch row: the temporal context lives in the
/// classifier's recurrent state, never here.
///
/// # Example
/// ```
/// use kw_core::display::DisplayBuffer;
/// use kw_core::traits::Classifier;
/// use kw_model::trigger::InferenceTrigger;
///
/// struct Echo;
/// impl Classifier for Echo {
///     fn input_dim(&self) -> usize { 2 }
///     fn num_classes(&self) -> usize { 2 }
///     fn infer(&mut self, input: &[f32], probs: &mut [f32]) { probs.copy_from_slice(input) }
///     fn reset(&mut self) {}
/// }
///
/// let mut display = DisplayBuffer::new(4, 2);
/// let mut trigger = InferenceTrigger::new(2);
/// trigger.fire(&mut Echo, &[0.1, 0.9], &mut display);
/// assert_eq!(display.latest(), [0.1, 0.9]);
/// ```
pub struct InferenceTrigger {
    probs: Vec<f32>,
}

impl InferenceTrigger {
    /// Create a trigger producing `n_classes`-wide rows.
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        Self {
            probs: vec![0.0; n_classes],
        }
    }

    /// Run the classifier once on `representation` and append the result to `display`.
    ///
    /// Returns the probability row just appended.
    pub fn fire<C: Classifier + ?Sized>(
        &mut self,
        classifier: &mut C,
        representation: &[f32],
        display: &mut DisplayBuffer,
    ) -> &[f32] {
        classifier.infer(representation, &mut self.probs);
        display.append(&self.probs);
        &self.probs
    }
}
