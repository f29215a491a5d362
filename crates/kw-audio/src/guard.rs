use std::ops::{Deref, DerefMut};

use kw_core::traits::AudioSource;

/// Scoped ownership of an [`AudioSource`]: closes it exactly once.
///
/// The source is closed by [`SourceGuard::close`] or, failing that, when the guard
/// is dropped, which covers early returns, `?` propagation and panics unwinding
/// through the drive loop.
///
/// # Example
/// ```
/// use kw_audio::decode::FileSource;
/// use kw_audio::guard::SourceGuard;
/// use kw_core::traits::AudioSource;
///
/// let mut source = SourceGuard::new(FileSource::from_samples(vec![0; 4], 16_000, false));
/// let mut chunk = [0i16; 2];
/// assert!(source.read_chunk(&mut chunk).unwrap());
/// source.close();
/// assert!(source.is_closed());
/// ```
pub struct SourceGuard<S: AudioSource> {
    source: S,
    closed: bool,
}

impl<S: AudioSource> SourceGuard<S> {
    /// Take ownership of an open source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    /// Close the source now. Later calls, and the drop, do nothing.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.source.close();
        }
    }

    /// Whether the source has already been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: AudioSource> Deref for SourceGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: AudioSource> DerefMut for SourceGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: AudioSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.close();
    }
}
