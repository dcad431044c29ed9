//! Fixed-capacity FIFO of observations for a single key.

use std::collections::VecDeque;

use crate::observation::Observation;

/// Per-key circular history. Newest tick at the tail, oldest evicted first.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    items: VecDeque<Observation>,
    capacity: usize,
}

impl BoundedHistory {
    /// A zero capacity is bumped to one so the latest tick is always retained.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the tail, returning the evicted head when over capacity.
    pub fn append(&mut self, obs: Observation) -> Option<Observation> {
        self.items.push_back(obs);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Copy of up to `count` most recent ticks, oldest first.
    pub fn tail_slice(&self, count: usize) -> Vec<Observation> {
        if count == 0 || self.is_empty() {
            return Vec::new();
        }
        let start = self.items.len().saturating_sub(count);
        self.items.range(start..).cloned().collect()
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(obs: &[Observation]) -> Vec<f64> {
        obs.iter().map(|o| o.value).collect()
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut h = BoundedHistory::new(5);
        for i in 0..50 {
            h.append(Observation::new("X", i as f64, 1.0));
            assert!(h.len() <= 5);
        }
        assert_eq!(h.len(), 5);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut h = BoundedHistory::new(2);
        assert!(h.append(Observation::new("X", 10.0, 0.0)).is_none());
        assert!(h.append(Observation::new("X", 11.0, 1.0)).is_none());
        let evicted = h.append(Observation::new("X", 12.0, 1.0));
        assert_eq!(evicted.map(|o| o.value), Some(10.0));
        assert_eq!(values(&h.tail_slice(5)), vec![11.0, 12.0]);
    }

    #[test]
    fn test_tail_slice_returns_most_recent_oldest_first() {
        let mut h = BoundedHistory::new(10);
        for i in 1..=6 {
            h.append(Observation::new("X", i as f64, 1.0));
        }
        assert_eq!(values(&h.tail_slice(3)), vec![4.0, 5.0, 6.0]);
        assert!(h.tail_slice(0).is_empty());
    }

    #[test]
    fn test_tail_slice_is_a_copy() {
        let mut h = BoundedHistory::new(3);
        h.append(Observation::new("X", 1.0, 0.0));
        let snap = h.tail_slice(3);
        h.append(Observation::new("X", 2.0, 1.0));
        assert_eq!(values(&snap), vec![1.0]);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut h = BoundedHistory::new(0);
        h.append(Observation::new("X", 1.0, 0.0));
        h.append(Observation::new("X", 2.0, 1.0));
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.latest().map(|o| o.value), Some(2.0));
    }

    #[test]
    fn test_empty_history_has_no_tail() {
        let mut h = BoundedHistory::new(3);
        assert!(h.is_empty());
        assert!(h.tail_slice(3).is_empty());
        h.append(Observation::new("X", 1.0, 0.0));
        assert!(!h.is_empty());
        assert_eq!(h.tail_slice(3).len(), 1);
    }
}
