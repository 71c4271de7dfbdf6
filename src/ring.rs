use std::collections::VecDeque;

/// Fixed-capacity ring buffer. When full, a push overwrites the oldest element.
///
/// Iteration yields elements in insertion order, oldest first.
#[derive(Debug, Clone)]
pub struct OverwriteRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> OverwriteRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Append `item`. Returns the element it displaced when the ring was full.
    /// A zero capacity ring stores nothing and hands `item` straight back.
    pub fn push_overwrite_oldest(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let displaced = if self.is_full() {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        displaced
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

impl<T> IntoIterator for OverwriteRing<T> {
    type Item = T;
    type IntoIter = std::collections::vec_deque::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::OverwriteRing;

    #[test]
    fn fills_then_overwrites_oldest() {
        let mut r = OverwriteRing::new(3);
        assert_eq!(r.push_overwrite_oldest(1), None);
        assert_eq!(r.push_overwrite_oldest(2), None);
        assert_eq!(r.push_overwrite_oldest(3), None);
        assert!(r.is_full());

        assert_eq!(r.push_overwrite_oldest(4), Some(1));
        assert_eq!(r.push_overwrite_oldest(5), Some(2));
        assert_eq!(r.len(), 3);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn overwrite_keeps_rotating() {
        let mut r = OverwriteRing::new(2);
        for i in 0..7 {
            r.push_overwrite_oldest(i);
        }
        assert_eq!(r.into_iter().collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn in_place_update_keeps_position() {
        let mut r = OverwriteRing::new(3);
        r.push_overwrite_oldest((1, "a"));
        r.push_overwrite_oldest((2, "b"));
        if let Some(e) = r.iter_mut().find(|e| e.0 == 1) {
            e.1 = "c";
        }
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), vec![(1, "c"), (2, "b")]);
    }

    #[test]
    fn zero_capacity() {
        let mut r = OverwriteRing::new(0);
        assert_eq!(r.push_overwrite_oldest(9), Some(9));
        assert!(r.is_empty());
    }
}
