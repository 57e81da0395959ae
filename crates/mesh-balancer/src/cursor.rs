//! Failover cursor shared by every in-flight routing pass.
//!
//! The cursor is a single tick counter. Each attempt of each pass takes one
//! tick, successful or not, which spreads first attempts across the cache.
//! A pass carries its own `tried` mask; when the ticked slot was already
//! tried by that pass the cursor walks forward to the next untried one.
//! Ticks taken by other passes in between only change the order, never the
//! set of workers a pass reaches.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct FailoverCursor {
    ticks: AtomicUsize,
}

impl FailoverCursor {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicUsize::new(0),
        }
    }

    /// Claim the next slot of `tried` that this pass has not visited.
    ///
    /// Marks the slot before returning it. `None` once every slot is marked,
    /// including for an empty cache; the tick counter is untouched then.
    pub fn next_untried(&self, tried: &mut [bool]) -> Option<usize> {
        let len = tried.len();
        if tried.iter().all(|t| *t) {
            return None;
        }
        let start = self.ticks.fetch_add(1, Ordering::Relaxed) % len;
        let idx = (0..len)
            .map(|step| (start + step) % len)
            .find(|&i| !tried[i])?;
        tried[idx] = true;
        Some(idx)
    }

    /// Ticks taken so far across all passes.
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn full_pass(cursor: &FailoverCursor, len: usize) -> Vec<usize> {
        let mut tried = vec![false; len];
        std::iter::from_fn(|| cursor.next_untried(&mut tried)).collect()
    }

    #[test]
    fn failing_pass_visits_each_slot_once() {
        let cursor = FailoverCursor::new();
        assert_eq!(full_pass(&cursor, 3), vec![0, 1, 2]);
        assert_eq!(cursor.ticks(), 3);
    }

    #[test]
    fn empty_or_exhausted_mask_takes_no_tick() {
        let cursor = FailoverCursor::new();
        assert_eq!(cursor.next_untried(&mut []), None);

        let mut tried = vec![true; 2];
        assert_eq!(cursor.next_untried(&mut tried), None);
        assert_eq!(cursor.ticks(), 0);
    }

    #[test]
    fn successive_passes_start_on_different_slots() {
        let cursor = FailoverCursor::new();
        let mut first = Vec::new();
        for _ in 0..4 {
            let mut tried = vec![false; 4];
            first.push(cursor.next_untried(&mut tried).unwrap());
        }
        assert_eq!(first, vec![0, 1, 2, 3]);
    }

    #[test]
    fn interleaved_pass_walks_past_tried_slots() {
        let cursor = FailoverCursor::new();
        let mut mine = vec![false; 3];
        assert_eq!(cursor.next_untried(&mut mine), Some(0));

        // Two other requests land in between and push the cursor to 0 again.
        let mut other = vec![false; 3];
        cursor.next_untried(&mut other);
        cursor.next_untried(&mut other);

        // Tick 3 maps to slot 0, already tried here: walk on to 1, then 2.
        assert_eq!(cursor.next_untried(&mut mine), Some(1));
        assert_eq!(cursor.next_untried(&mut mine), Some(2));
        assert_eq!(cursor.next_untried(&mut mine), None);
    }

    #[test]
    fn concurrent_passes_each_reach_every_slot_once() {
        let cursor = Arc::new(FailoverCursor::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cursor = cursor.clone();
                thread::spawn(move || (0..50).map(|_| full_pass(&cursor, 5)).collect::<Vec<_>>())
            })
            .collect();

        for h in handles {
            for mut pass in h.join().unwrap() {
                pass.sort_unstable();
                assert_eq!(pass, vec![0, 1, 2, 3, 4]);
            }
        }
        assert_eq!(cursor.ticks(), 4 * 50 * 5);
    }
}
