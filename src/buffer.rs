use crate::cost::{CostAssigner, StringLengthCost};
use crate::error::ConfigError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe FIFO queue bounded by the total cost of its items.
///
/// Producers call [`add`](Self::add) from any thread; the flushing task
/// removes items with [`drain_up_to`](Self::drain_up_to). When an incoming
/// item would push the total cost over `capacity`, the oldest items are
/// evicted until it fits. The incoming item itself is never rejected: an
/// item costing more than `capacity` on its own empties the queue and is
/// then stored alone.
///
/// Item order and the cost counter live under a single mutex, so every
/// observable state corresponds to some serialization of the `add` and
/// `drain_up_to` calls.
pub struct EvictingBuffer<T, C = StringLengthCost> {
    capacity: usize,
    cost: C,
    inner: Mutex<Inner<T>>,
    evicted: AtomicU64,
}

struct Inner<T> {
    items: VecDeque<T>,
    current_cost: usize,
}

impl<T, C> EvictingBuffer<T, C>
where
    C: CostAssigner<T>,
{
    /// Create an empty buffer.
    ///
    /// **Parameters**
    /// - `capacity`: maximum total cost; must be greater than zero.
    /// - `cost`: strategy used to weigh every item.
    ///
    /// **Returns**
    /// - `Err(ConfigError::NotPositive)` if `capacity` is zero.
    pub fn new(capacity: usize, cost: C) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::NotPositive("max_buffer_cost"));
        }
        Ok(Self {
            capacity,
            cost,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                current_cost: 0,
            }),
            evicted: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // a poisoned queue is still in FIFO order
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item` at the tail, evicting from the head as needed.
    ///
    /// Returns how many older items were evicted to make room. Evicted
    /// items are gone for good; the running total is available through
    /// [`evicted_count`](Self::evicted_count).
    pub fn add(&self, item: T) -> usize {
        let item_cost = self.cost.cost(&item);
        let mut evicted = 0usize;

        let mut inner = self.lock();
        while inner.current_cost.saturating_add(item_cost) > self.capacity {
            match inner.items.pop_front() {
                Some(oldest) => {
                    let oldest_cost = self.cost.cost(&oldest);
                    inner.current_cost = inner.current_cost.saturating_sub(oldest_cost);
                    evicted += 1;
                }
                None => break,
            }
        }
        inner.current_cost = inner.current_cost.saturating_add(item_cost);
        inner.items.push_back(item);
        drop(inner);

        if evicted > 0 {
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Atomically remove up to `max` items from the head, oldest first.
    ///
    /// Draining an empty buffer, or passing `max == 0`, returns an empty
    /// vector.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut inner = self.lock();
        let take = max.min(inner.items.len());
        if take == 0 {
            return Vec::new();
        }

        let drained: Vec<T> = inner.items.drain(..take).collect();
        let drained_cost: usize = drained.iter().map(|item| self.cost.cost(item)).sum();
        inner.current_cost = inner.current_cost.saturating_sub(drained_cost);
        drained
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Sum of the costs of all queued items.
    pub fn current_cost(&self) -> usize {
        self.lock().current_cost
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of items evicted since creation.
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::UnitCost;
    use std::sync::Arc;
    use std::thread;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = EvictingBuffer::<String, _>::new(0, StringLengthCost);
        assert!(matches!(result, Err(ConfigError::NotPositive("max_buffer_cost"))));
    }

    #[test]
    fn drain_returns_items_in_arrival_order() {
        let buffer = EvictingBuffer::new(1000, StringLengthCost).unwrap();
        for msg in ["msg1", "msg2", "msg3"] {
            assert_eq!(buffer.add(msg.to_string()), 0);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.current_cost(), 12);

        assert_eq!(buffer.drain_up_to(usize::MAX), strings(&["msg1", "msg2", "msg3"]));
        assert!(buffer.is_empty());
        assert_eq!(buffer.current_cost(), 0);
    }

    #[test]
    fn drain_respects_max_and_keeps_the_rest() {
        let buffer = EvictingBuffer::new(1000, StringLengthCost).unwrap();
        for msg in ["a", "bb", "ccc", "dddd"] {
            buffer.add(msg.to_string());
        }

        assert_eq!(buffer.drain_up_to(2), strings(&["a", "bb"]));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.current_cost(), 7);
        assert_eq!(buffer.drain_up_to(0), Vec::<String>::new());
        assert_eq!(buffer.drain_up_to(10), strings(&["ccc", "dddd"]));
    }

    #[test]
    fn draining_empty_buffer_is_idempotent() {
        let buffer = EvictingBuffer::<String, _>::new(10, StringLengthCost).unwrap();
        for _ in 0..3 {
            assert!(buffer.drain_up_to(5).is_empty());
        }
        assert_eq!(buffer.current_cost(), 0);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let buffer = EvictingBuffer::new(12, StringLengthCost).unwrap();
        buffer.add("msg1".to_string());
        buffer.add("msg2".to_string());
        buffer.add("msg3".to_string());
        assert_eq!(buffer.add("msg4".to_string()), 1);

        assert_eq!(buffer.current_cost(), 12);
        assert_eq!(buffer.evicted_count(), 1);
        assert_eq!(buffer.drain_up_to(10), strings(&["msg2", "msg3", "msg4"]));
    }

    #[test]
    fn retained_cost_never_exceeds_capacity() {
        let buffer = EvictingBuffer::new(20, StringLengthCost).unwrap();
        let lines = ["x", "yyyyy", "zzz", "wwwwwwwww", "vv", "uuuuuuuuuuu", "t"];
        for line in lines.iter().cycle().take(49) {
            buffer.add(line.to_string());
            assert!(buffer.current_cost() <= buffer.capacity());
        }

        // the most recent item always survives
        let retained = buffer.drain_up_to(usize::MAX);
        assert_eq!(retained.last().map(String::as_str), Some("t"));
    }

    #[test]
    fn oversized_item_is_still_enqueued() {
        let buffer = EvictingBuffer::new(5, StringLengthCost).unwrap();
        buffer.add("ab".to_string());
        buffer.add("cd".to_string());

        assert_eq!(buffer.add("0123456789".to_string()), 2);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.current_cost(), 10);

        // the next regular item pushes the oversized one out
        assert_eq!(buffer.add("ef".to_string()), 1);
        assert_eq!(buffer.drain_up_to(5), strings(&["ef"]));
    }

    #[test]
    fn unit_cost_bounds_by_count() {
        let buffer = EvictingBuffer::new(3, UnitCost).unwrap();
        for i in 0..5u32 {
            buffer.add(i);
        }
        assert_eq!(buffer.drain_up_to(10), vec![2, 3, 4]);
        assert_eq!(buffer.evicted_count(), 2);
    }

    #[test]
    fn concurrent_producers_lose_nothing_within_capacity() {
        let buffer = Arc::new(EvictingBuffer::new(100_000, UnitCost).unwrap());
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        buffer.add(p * 10_000 + i);
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for _ in 0..50 {
            drained.extend(buffer.drain_up_to(100));
        }
        for handle in producers {
            handle.join().unwrap();
        }
        drained.extend(buffer.drain_up_to(usize::MAX));

        assert_eq!(drained.len(), 4000);
        // per-producer order survives interleaving
        for p in 0..4u64 {
            let own: Vec<u64> = drained.iter().copied().filter(|v| v / 10_000 == p).collect();
            let expected: Vec<u64> = (0..1000).map(|i| p * 10_000 + i).collect();
            assert_eq!(own, expected);
        }
    }
}
