//! Order id allocation.
//!
//! One [`IdAllocator`] per run, passed to whatever needs to mint ids. Real
//! ids ascend from 0; synthetic placeholder ids descend from -1, so the two
//! ranges never collide.

use crate::order::OrderId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdAllocator {
    next_real: OrderId,
    next_synthetic: OrderId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            next_real: 0,
            next_synthetic: -1,
        }
    }

    /// Next real order id: 0, 1, 2, ...
    #[inline]
    pub fn next_id(&mut self) -> OrderId {
        let id = self.next_real;
        self.next_real += 1;
        id
    }

    /// Next placeholder id: -1, -2, -3, ...
    #[inline]
    pub fn next_synthetic_id(&mut self) -> OrderId {
        let id = self.next_synthetic;
        self.next_synthetic -= 1;
        id
    }

    /// Number of synthetic ids handed out so far.
    pub fn synthetic_issued(&self) -> u64 {
        (-1 - self.next_synthetic) as u64
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_ids_ascend() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn test_synthetic_ids_descend() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_synthetic_id(), -1);
        assert_eq!(ids.next_synthetic_id(), -2);
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.synthetic_issued(), 2);
    }

    #[test]
    fn test_reset() {
        let mut ids = IdAllocator::new();
        ids.next_id();
        ids.next_synthetic_id();
        ids.reset();
        assert_eq!(ids, IdAllocator::new());
    }

    #[test]
    fn test_independent_allocators() {
        let mut a = IdAllocator::new();
        let mut b = IdAllocator::new();
        a.next_id();
        assert_eq!(b.next_id(), 0);
    }
}
