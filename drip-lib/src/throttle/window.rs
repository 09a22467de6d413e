use std::collections::VecDeque;

/// A rolling window that keeps at most `capacity` elements, evicting the
/// oldest one when a new element is pushed into a full window.
///
/// Storage grows with the elements actually pushed, not with `capacity`.
#[derive(Debug, Clone)]
pub(crate) struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// Create a new window with the given capacity (at least one slot)
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::new(),
            capacity,
        }
    }

    /// Push an element to the window, evicting the oldest element if the
    /// window is full
    pub(crate) fn push(&mut self, item: T) {
        if self.is_full() {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Oldest element
    pub(crate) fn first(&self) -> Option<&T> {
        self.data.front()
    }

    /// Most recent element
    pub(crate) fn last(&self) -> Option<&T> {
        self.data.back()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_capacity() {
        let mut window = Window::new(3);

        window.push(1);
        window.push(2);
        assert!(!window.is_full());
        window.push(3);
        assert!(window.is_full());

        // Add one more, should remove the oldest
        window.push(4);
        assert_eq!(window.len(), 3);

        let values: Vec<_> = window.iter().copied().collect();
        assert_eq!(values, vec![2, 3, 4]);
        assert_eq!(window.first(), Some(&2));
        assert_eq!(window.last(), Some(&4));
    }

    #[test]
    fn test_window_has_at_least_one_slot() {
        let mut window = Window::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(window.first().is_none());

        window.push('a');
        window.push('b');
        assert_eq!(window.len(), 1);
        assert_eq!(window.first(), Some(&'b'));
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let mut window = Window::new(usize::MAX);
        assert_eq!(window.capacity(), usize::MAX);
        assert!(window.data.capacity() < 1024);

        window.push(1u64);
        assert_eq!(window.len(), 1);
        assert!(!window.is_full());
    }
}
