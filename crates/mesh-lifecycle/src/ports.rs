//! Routing port allocation.
//!
//! A counter walks the configured range upwards and wraps at the end. A
//! port is handed out only if no live record uses it and no launch in
//! flight has reserved it. Reservations are released once the launch
//! either registered the worker or failed.

use std::collections::HashSet;

/// Monotonic port counter with an in-use check.
#[derive(Debug)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    next: u16,
    reserved: HashSet<u16>,
}

impl PortAllocator {
    /// Allocate from `start..=end`.
    pub fn new(start: u16, end: u16) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            start,
            end,
            next: start,
            reserved: HashSet::new(),
        }
    }

    pub fn range(&self) -> (u16, u16) {
        (self.start, self.end)
    }

    /// Reserve the next port not in `live` and not already reserved.
    ///
    /// Returns `None` once a full lap of the range found nothing free.
    pub fn allocate(&mut self, live: &HashSet<u16>) -> Option<u16> {
        let span = u32::from(self.end) - u32::from(self.start) + 1;
        for _ in 0..span {
            let candidate = self.next;
            self.next = if candidate >= self.end {
                self.start
            } else {
                candidate + 1
            };
            if !live.contains(&candidate) && !self.reserved.contains(&candidate) {
                self.reserved.insert(candidate);
                return Some(candidate);
            }
        }
        None
    }

    /// Drop the reservation of an in-flight launch.
    pub fn release(&mut self, port: u16) {
        self.reserved.remove(&port);
    }

    pub fn reserved(&self) -> usize {
        self.reserved.len()
    }
}
