use crate::error::{SweepError, SweepResult};

/// Fixed-capacity FIFO of the most recent frames.
///
/// Backed by a slot arena with a head index, so pushing onto a full window
/// evicts the oldest entry in O(1) without shifting the rest.
#[derive(Debug, Clone)]
pub struct FrameWindow<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> FrameWindow<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame window capacity must be > 0");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Appends `item` as the newest entry, returning the evicted oldest one
    /// when the window was already full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.is_full() {
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % self.capacity();
            evicted
        } else {
            let tail = self.slot_index(self.len);
            self.slots[tail] = Some(item);
            self.len += 1;
            None
        }
    }

    /// Entry at `position`, counted from the oldest
    pub fn get(&self, position: usize) -> Option<&T> {
        if position >= self.len {
            return None;
        }
        self.slots[self.slot_index(position)].as_ref()
    }

    pub fn latest(&self) -> SweepResult<&T> {
        self.require(1)?;
        self.get(self.len - 1).ok_or(self.empty_error(1))
    }

    pub fn latest_mut(&mut self) -> SweepResult<&mut T> {
        self.require(1)?;
        let idx = self.slot_index(self.len - 1);
        let err = self.empty_error(1);
        self.slots[idx].as_mut().ok_or(err)
    }

    /// Second-to-last entry
    pub fn previous(&self) -> SweepResult<&T> {
        self.require(2)?;
        self.get(self.len - 2).ok_or(self.empty_error(2))
    }

    /// Borrows the previous entry immutably and the latest one mutably
    pub fn pair_mut(&mut self) -> SweepResult<(&T, &mut T)> {
        self.require(2)?;
        let err = self.empty_error(2);
        let prev = self.slot_index(self.len - 2);
        let last = self.slot_index(self.len - 1);

        let (prev, last) = if prev < last {
            let (lo, hi) = self.slots.split_at_mut(last);
            (lo[prev].as_ref(), hi[0].as_mut())
        } else {
            let (lo, hi) = self.slots.split_at_mut(prev);
            (hi[0].as_ref(), lo[last].as_mut())
        };

        match (prev, last) {
            (Some(prev), Some(last)) => Ok((prev, last)),
            _ => Err(err),
        }
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[self.slot_index(i)].as_ref())
    }

    /// Drops every entry, keeping the capacity
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }

    fn slot_index(&self, position: usize) -> usize {
        (self.head + position) % self.capacity()
    }

    fn require(&self, required: usize) -> SweepResult<()> {
        if self.len < required {
            return Err(self.empty_error(required));
        }
        Ok(())
    }

    fn empty_error(&self, required: usize) -> SweepError {
        SweepError::EmptyWindow {
            required,
            present: self.len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_window_queries_fail() {
        let window: FrameWindow<u32> = FrameWindow::new(2);
        assert_eq!(
            window.latest(),
            Err(SweepError::EmptyWindow { required: 1, present: 0 })
        );
        assert_eq!(
            window.previous(),
            Err(SweepError::EmptyWindow { required: 2, present: 0 })
        );
    }

    #[test]
    fn test_previous_needs_two_frames() {
        let mut window = FrameWindow::new(2);
        window.push(10);
        assert_eq!(window.latest(), Ok(&10));
        assert!(matches!(
            window.previous(),
            Err(SweepError::EmptyWindow { required: 2, present: 1 })
        ));
        window.push(11);
        assert_eq!(window.previous(), Ok(&10));
        assert_eq!(window.latest(), Ok(&11));
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut window = FrameWindow::new(2);
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), Some(1));
        assert_eq!(window.push(4), Some(2));
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_pair_mut_across_wraparound() {
        let mut window = FrameWindow::new(3);
        for i in 0..4 {
            window.push(i);
        }
        // slots now wrap: newest entry sits before the previous one in memory
        let (prev, last) = window.pair_mut().unwrap();
        assert_eq!(*prev, 2);
        *last += 100;
        assert_eq!(window.latest(), Ok(&103));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut window = FrameWindow::new(2);
        window.push("a");
        window.push("b");
        window.push("c");
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 2);
        window.push("d");
        assert_eq!(window.latest(), Ok(&"d"));
    }

    proptest! {
        #[test]
        fn prop_window_keeps_most_recent(capacity in 1usize..8, count in 0usize..40) {
            let mut window = FrameWindow::new(capacity);
            for i in 0..count {
                window.push(i);
                prop_assert!(window.len() <= capacity);
            }
            let expected: Vec<usize> = (count.saturating_sub(capacity)..count).collect();
            prop_assert_eq!(window.iter().copied().collect::<Vec<_>>(), expected);
        }

        #[test]
        fn prop_pair_mut_agrees_with_previous_latest(capacity in 2usize..6, count in 2usize..30) {
            let mut window = FrameWindow::new(capacity);
            for i in 0..count {
                window.push(i);
            }
            let prev = *window.previous().unwrap();
            let last = *window.latest().unwrap();
            let (p, l) = window.pair_mut().unwrap();
            prop_assert_eq!((*p, *l), (prev, last));
            prop_assert_eq!((prev, last), (count - 2, count - 1));
        }
    }
}
