/// Fenêtre d'analyse glissante (overlap-save).
///
/// Holds exactly `window_len` samples. Each [`OverlapWindow::insert`] shifts the
/// window left by one chunk and appends the chunk at the tail, so the trailing
/// `window_len - chunk_len` samples of a window become the head of the next one.
/// Storage is allocated once, zeroed, and the window stays contiguous.
///
/// # Example
/// ```
/// use kw_audio::overlap::OverlapWindow;
/// let mut window = OverlapWindow::new(5, 3);
/// window.insert(&[1, 2, 3]);
/// window.insert(&[4, 5, 6]);
/// assert_eq!(window.len(), 5);
/// let expected: Vec<f32> = [2, 3, 4, 5, 6].iter().map(|&s| s as f32 / 32_768.0).collect();
/// assert_eq!(window.get(), expected.as_slice());
/// ```
pub struct OverlapWindow {
    samples: Vec<f32>,
    chunk_len: usize,
}

impl OverlapWindow {
    /// Create a zeroed window of `window_len` samples fed by chunks of `chunk_len`.
    ///
    /// # Panics
    /// Panics if `chunk_len` is 0 or larger than `window_len`.
    #[must_use]
    pub fn new(window_len: usize, chunk_len: usize) -> Self {
        assert!(
            chunk_len > 0 && chunk_len <= window_len,
            "chunk length {chunk_len} must be in 1..={window_len}"
        );
        Self {
            samples: vec![0.0; window_len],
            chunk_len,
        }
    }

    /// Drop the oldest `chunk_len` samples and append `chunk`, normalized to [-1, 1).
    ///
    /// # Panics
    /// Panics if `chunk.len()` differs from the configured chunk length: the
    /// acquisition side is miswired and the window would lose alignment.
    pub fn insert(&mut self, chunk: &[i16]) {
        assert_eq!(
            chunk.len(),
            self.chunk_len,
            "chunk of {} samples fed to a window expecting {}",
            chunk.len(),
            self.chunk_len
        );
        let keep = self.samples.len() - self.chunk_len;
        self.samples.copy_within(self.chunk_len.., 0);
        for (slot, &s) in self.samples[keep..].iter_mut().zip(chunk) {
            *slot = f32::from(s) / 32_768.0;
        }
    }

    /// Current window, oldest sample first.
    #[inline]
    #[must_use]
    pub fn get(&self) -> &[f32] {
        &self.samples
    }

    /// Window length `W`; constant for the lifetime of the buffer.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: a window is never empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fresh samples expected per insert.
    #[inline]
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }
}
