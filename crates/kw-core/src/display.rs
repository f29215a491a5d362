/// Buffer circulaire des derniers vecteurs de probabilités affichés.
///
/// Capacité fixe, pré-allouée à la construction : `append` écrase la ligne la plus
/// ancienne en O(1), sans allocation. Démarre rempli de zéros pour que le rendu ait
/// une image complète dès la première frame.
///
/// # Example
/// ```
/// use kw_core::display::DisplayBuffer;
/// let mut buf = DisplayBuffer::new(3, 2);
/// buf.append(&[0.25, 0.75]);
/// let rows = buf.snapshot();
/// assert_eq!(rows.len(), 3);
/// assert_eq!(rows[0], [0.0, 0.0]);
/// assert_eq!(rows[2], [0.25, 0.75]);
/// ```
#[derive(Clone, Debug)]
pub struct DisplayBuffer {
    /// Rows stored row-major, `capacity * width` values.
    data: Vec<f32>,
    capacity: usize,
    width: usize,
    /// Slot holding the oldest row; the next `append` overwrites it.
    head: usize,
    /// Total rows appended since construction.
    appended: u64,
}

impl DisplayBuffer {
    /// Create a buffer of `capacity` zero rows of `width` values.
    ///
    /// # Panics
    /// Panics if `capacity` or `width` is 0.
    #[must_use]
    pub fn new(capacity: usize, width: usize) -> Self {
        assert!(capacity > 0, "display capacity must be > 0");
        assert!(width > 0, "display width must be > 0");
        Self {
            data: vec![0.0; capacity * width],
            capacity,
            width,
            head: 0,
            appended: 0,
        }
    }

    /// Push `row` as the newest entry, evicting the oldest.
    ///
    /// # Panics
    /// Panics if `row.len()` differs from the configured width.
    pub fn append(&mut self, row: &[f32]) {
        assert_eq!(
            row.len(),
            self.width,
            "display row width mismatch (got {}, expected {})",
            row.len(),
            self.width
        );
        let start = self.head * self.width;
        self.data[start..start + self.width].copy_from_slice(row);
        self.head = (self.head + 1) % self.capacity;
        self.appended += 1;
    }

    /// Rows from oldest to newest, without copying.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        (0..self.capacity).map(move |i| {
            let slot = (self.head + i) % self.capacity;
            &self.data[slot * self.width..(slot + 1) * self.width]
        })
    }

    /// Owned copy of the rows, oldest first. Never mutates the buffer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Vec<f32>> {
        self.iter().map(<[f32]>::to_vec).collect()
    }

    /// Most recently appended row (a zero row before the first append).
    #[must_use]
    pub fn latest(&self) -> &[f32] {
        let slot = (self.head + self.capacity - 1) % self.capacity;
        &self.data[slot * self.width..(slot + 1) * self.width]
    }

    /// Number of rows kept.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values per row.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows appended since construction, evicted ones included.
    #[inline]
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(v: f32) -> [f32; 2] {
        [v, -v]
    }

    #[test]
    fn starts_full_of_zero_rows() {
        let buf = DisplayBuffer::new(4, 2);
        let rows = buf.snapshot();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().flatten().all(|&v| v == 0.0));
        assert_eq!(buf.latest(), [0.0, 0.0]);
    }

    #[test]
    fn partial_fill_keeps_zero_slots_first() {
        let mut buf = DisplayBuffer::new(5, 2);
        buf.append(&row(1.0));
        buf.append(&row(2.0));

        let rows = buf.snapshot();
        assert_eq!(rows.len(), 5);
        for r in &rows[..3] {
            assert_eq!(r.as_slice(), [0.0, 0.0]);
        }
        assert_eq!(rows[3], row(1.0));
        assert_eq!(rows[4], row(2.0));
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let mut buf = DisplayBuffer::new(3, 2);
        for i in 1..=8 {
            buf.append(&row(i as f32));
        }

        let rows = buf.snapshot();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows, vec![row(6.0).to_vec(), row(7.0).to_vec(), row(8.0).to_vec()]);
        assert_eq!(buf.latest(), row(8.0));
        assert_eq!(buf.appended(), 8);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut buf = DisplayBuffer::new(2, 2);
        buf.append(&row(1.0));
        let first = buf.snapshot();
        let second = buf.snapshot();
        assert_eq!(first, second);
        assert_eq!(buf.iter().len(), 2);
    }

    #[test]
    #[should_panic(expected = "width mismatch")]
    fn wrong_width_is_a_programming_error() {
        let mut buf = DisplayBuffer::new(2, 3);
        buf.append(&[1.0]);
    }
}
