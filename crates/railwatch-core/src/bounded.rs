use std::collections::VecDeque;

/// Fixed-capacity FIFO that keeps insertion order (oldest first).
///
/// Eviction is explicit: callers check [`BoundedQueue::is_full`] and call
/// [`BoundedQueue::evict_oldest`] themselves so they can log what was dropped.
/// [`BoundedQueue::push`] still refuses to grow past capacity.
#[derive(Clone, Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
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

    /// Remove and return the oldest entry.
    pub fn evict_oldest(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Append `item`. If the queue is already full the oldest entry is evicted
    /// first and returned.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.is_full() {
            self.evict_oldest()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove the first entry matching `pred`, returning it.
    pub fn remove_first(&mut self, pred: impl FnMut(&T) -> bool) -> Option<T> {
        let idx = self.items.iter().position(pred)?;
        self.items.remove(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
