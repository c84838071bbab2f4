//! A fixed-capacity ring buffer that drops the oldest element when full.

use std::collections::VecDeque;

/// Fixed-capacity FIFO window. Pushing onto a full buffer evicts the
/// oldest element, so `len() <= capacity()` holds after every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer holding at most `capacity` elements.
    ///
    /// A zero capacity is raised to one; callers validate capacities
    /// before they get here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Push a value, returning the evicted oldest value if the buffer was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.data.len() >= self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(value);
        evicted
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) {
        for v in values {
            self.push(v);
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> + DoubleEndedIterator {
        self.data.iter()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn front(&self) -> Option<&T> {
        self.data.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.data.back()
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut rb = RingBuffer::new(3);
        assert!(rb.push(1).is_none());
        assert!(rb.push(2).is_none());
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_fifo_law_after_overflow() {
        let capacity = 5;
        let k = 3;
        let mut rb = RingBuffer::new(capacity);
        for i in 0..capacity + k {
            rb.push(i);
            assert!(rb.len() <= capacity);
        }
        // k newest plus the capacity-k most recent of the previous values.
        assert_eq!(rb.to_vec(), (k..capacity + k).collect::<Vec<_>>());
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut rb = RingBuffer::new(2);
        rb.push("a");
        rb.push("b");
        assert_eq!(rb.push("c"), Some("a"));
        assert_eq!(rb.front(), Some(&"b"));
        assert_eq!(rb.back(), Some(&"c"));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut rb = RingBuffer::new(0);
        rb.push(1);
        rb.push(2);
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.to_vec(), vec![2]);
    }

    #[test]
    fn test_clear() {
        let mut rb = RingBuffer::new(4);
        rb.extend([1, 2, 3]);
        rb.clear();
        assert!(rb.is_empty());
    }
}
