//! Fixed-capacity ring buffer of time-weighted error samples.
//!
//! The window keeps running sums of elapsed time and weighted error over its
//! live samples. `insert` and `evict_oldest` are the only operations that touch
//! slot contents or sums, so both sums always match the live range.

/// Default number of slots in a sample window.
pub const WINDOW_CAPACITY: usize = 50;

// ============================================================================
// SAMPLE - One ring-buffer slot
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    /// `elapsed_us * error`
    pub weighted_error: f64,
    /// Microseconds since the previous sample
    pub elapsed_us: u64,
    /// Window mean error as of this sample's insertion
    pub mean_at_insertion: f64,
}

impl Sample {
    pub fn new(error: f64, elapsed_us: u64) -> Self {
        Self {
            weighted_error: elapsed_us as f64 * error,
            elapsed_us,
            mean_at_insertion: 0.0,
        }
    }
}

// ============================================================================
// SAMPLE WINDOW - Circular buffer with running sums
// ============================================================================

#[derive(Debug, Clone)]
pub struct SampleWindow<const N: usize = WINDOW_CAPACITY> {
    slots: [Sample; N],
    head: usize,
    tail: usize,
    len: usize,
    elapsed_sum: u64,
    weighted_sum: f64,
}

impl<const N: usize> SampleWindow<N> {
    const NON_EMPTY: () = assert!(N > 0, "sample window needs at least one slot");

    pub fn new() -> Self {
        let () = Self::NON_EMPTY;

        // Empty state keeps tail one slot past head.
        Self {
            slots: [Sample::default(); N],
            head: N - 1,
            tail: 0,
            len: 0,
            elapsed_sum: 0,
            weighted_sum: 0.0,
        }
    }

    /// Appends `sample` after the newest slot, evicting the oldest first if full.
    /// Returns the sample evicted to make room, if any.
    ///
    /// `N` live samples must fit the u64 elapsed sum; `WindowedPid` rejects
    /// longer samples before they reach the window.
    pub fn insert(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.is_full() {
            self.evict_oldest()
        } else {
            None
        };

        self.head = (self.head + 1) % N;
        self.slots[self.head] = sample;
        self.len += 1;

        self.elapsed_sum += sample.elapsed_us;
        self.weighted_sum += sample.weighted_error;

        evicted
    }

    /// Removes the oldest live sample. No-op returning `None` on an empty window.
    pub fn evict_oldest(&mut self) -> Option<Sample> {
        if self.len == 0 {
            return None;
        }

        let oldest = std::mem::take(&mut self.slots[self.tail]);
        self.elapsed_sum -= oldest.elapsed_us;
        self.weighted_sum -= oldest.weighted_error;

        self.tail = (self.tail + 1) % N;
        self.len -= 1;

        if self.len == 0 {
            // Drop accumulated rounding once nothing is live.
            self.weighted_sum = 0.0;
        }

        Some(oldest)
    }

    /// Writes the mean-at-insertion of the newest sample.
    pub fn set_newest_mean(&mut self, mean: f64) {
        if self.len > 0 {
            self.slots[self.head].mean_at_insertion = mean;
        }
    }

    pub fn clear(&mut self) {
        while self.evict_oldest().is_some() {}
    }

    pub fn newest(&self) -> Option<&Sample> {
        (self.len > 0).then(|| &self.slots[self.head])
    }

    pub fn oldest(&self) -> Option<&Sample> {
        (self.len > 0).then(|| &self.slots[self.tail])
    }

    /// Live samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        (0..self.len).map(move |offset| &self.slots[(self.tail + offset) % N])
    }

    pub fn elapsed_sum(&self) -> u64 {
        self.elapsed_sum
    }

    pub fn weighted_sum(&self) -> f64 {
        self.weighted_sum
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SampleWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_wrap_around_capacity() {
        let mut window: SampleWindow<3> = SampleWindow::new();

        for i in 1..=7u64 {
            window.insert(Sample::new(1.0, i));
        }

        // 7 inserts into 3 slots: head at (7 - 1) % 3, tail two behind it.
        assert_eq!(window.head, 0);
        assert_eq!(window.tail, 1);
        assert_eq!(window.len(), 3);
        let elapsed: Vec<u64> = window.iter().map(|s| s.elapsed_us).collect();
        assert_eq!(elapsed, vec![5, 6, 7]);
    }

    #[test]
    fn empty_window_keeps_tail_after_head() {
        let mut window: SampleWindow<4> = SampleWindow::new();
        assert_eq!((window.head + 1) % 4, window.tail);

        window.insert(Sample::new(2.0, 10));
        window.insert(Sample::new(2.0, 10));
        window.evict_oldest();
        window.evict_oldest();

        assert!(window.is_empty());
        assert_eq!((window.head + 1) % 4, window.tail);
        assert_eq!(window.elapsed_sum(), 0);
        assert_eq!(window.weighted_sum(), 0.0);
    }

    #[test]
    fn evicted_slot_is_zeroed() {
        let mut window: SampleWindow<2> = SampleWindow::new();
        window.insert(Sample::new(3.0, 100));
        window.set_newest_mean(3.0);
        let slot = window.tail;

        let evicted = window.evict_oldest().unwrap();
        assert_eq!(evicted.mean_at_insertion, 3.0);
        assert_eq!(window.slots[slot], Sample::default());
    }

    #[test]
    fn single_slot_window_replaces_on_every_insert() {
        let mut window: SampleWindow<1> = SampleWindow::new();
        assert!(window.insert(Sample::new(1.0, 5)).is_none());
        let evicted = window.insert(Sample::new(2.0, 7)).unwrap();

        assert_eq!(evicted.elapsed_us, 5);
        assert_eq!(window.len(), 1);
        assert_eq!(window.elapsed_sum(), 7);
        assert_eq!(window.weighted_sum(), 14.0);
        assert_eq!(window.newest(), window.oldest());
    }
}
