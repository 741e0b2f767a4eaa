//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list using arena indices for O(1)
//! insertion at either end, removal from head, and removal from an
//! arbitrary position by handle.

use std::fmt;

use tracing::trace;

use crate::arena::{Arena, ArenaIndex, OrderHandle, OrderNode, NULL_INDEX};
use crate::order::{OrderId, Price, Size};
use crate::order_book::OrderIndex;

/// A queue of orders at a specific price level.
///
/// Orders are processed in FIFO order (price-time priority).
/// `total_size` always equals the sum of the queued orders' sizes and
/// `order_count` their number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Price,
    /// Index of the oldest order (highest priority, first to match)
    pub head: ArenaIndex,
    /// Index of the newest order (last to match)
    pub tail: ArenaIndex,
    /// Total size across all orders at this level
    pub total_size: Size,
    /// Number of orders at this level
    pub order_count: u32,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new(price: Price) -> Self {
        Self {
            price,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_size: 0,
            order_count: 0,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.order_count == 0
    }

    /// Store an order in the arena and append it to the tail of the queue.
    ///
    /// # Returns
    /// The stable handle the order index keeps for this order.
    pub fn add(&mut self, arena: &mut Arena, node: OrderNode) -> OrderHandle {
        debug_assert_eq!(node.price, self.price, "order added to the wrong level");
        let handle = arena.alloc(node);
        self.push_back(arena, handle.index);
        handle
    }

    /// Store an order ahead of every queued order (highest time priority).
    pub fn add_front(&mut self, arena: &mut Arena, node: OrderNode) -> OrderHandle {
        debug_assert_eq!(node.price, self.price, "order added to the wrong level");
        let handle = arena.alloc(node);
        self.push_front(arena, handle.index);
        handle
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let size = arena.node(index).size;

        if self.tail == NULL_INDEX {
            // Empty list: new node becomes both head and tail
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
        } else {
            // Append to existing tail
            arena.node_mut(self.tail).next = index;
            arena.node_mut(index).prev = self.tail;
            self.tail = index;
        }

        self.order_count += 1;
        self.total_size += size;
    }

    #[inline]
    fn push_front(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let size = arena.node(index).size;

        if self.head == NULL_INDEX {
            self.head = index;
            self.tail = index;
        } else {
            arena.node_mut(self.head).prev = index;
            arena.node_mut(index).next = self.head;
            self.head = index;
        }

        self.order_count += 1;
        self.total_size += size;
    }

    /// Unlink a node from anywhere in the queue and release its slot.
    ///
    /// Handles all edge cases: only node, head, tail, middle.
    fn unlink(&mut self, arena: &mut Arena, index: ArenaIndex) -> Option<OrderNode> {
        let node = arena.node(index);
        let prev_idx = node.prev;
        let next_idx = node.next;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            arena.node_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            arena.node_mut(next_idx).prev = prev_idx;
        }

        let handle = arena.handle_of(index);
        let node = arena.free(handle)?;
        self.order_count -= 1;
        self.total_size -= node.size;
        Some(node)
    }

    /// Remove and return the head order (oldest/highest priority).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<OrderNode> {
        if self.head == NULL_INDEX {
            return None;
        }
        self.unlink(arena, self.head)
    }

    /// Remove an order from anywhere in the queue (for cancel).
    ///
    /// Returns the removed order, or `None` if the handle is stale.
    ///
    /// # Complexity
    /// O(1)
    pub fn remove(&mut self, arena: &mut Arena, handle: OrderHandle) -> Option<OrderNode> {
        arena.get(handle)?;
        self.unlink(arena, handle.index)
    }

    /// Consume resting orders from the head against an incoming size.
    ///
    /// Fully consumed orders are removed from the queue and from `index`;
    /// the first order that is larger than what remains is reduced in place.
    /// `incoming` is decremented by what was consumed.
    ///
    /// The caller must not use this to consume the entire level; a level
    /// that is fully consumed is evicted as a whole one level up.
    ///
    /// # Returns
    /// Total size consumed from this level
    pub fn match_against(
        &mut self,
        arena: &mut Arena,
        index: &mut OrderIndex,
        incoming: &mut Size,
    ) -> Size {
        debug_assert!(*incoming < self.total_size, "level would be fully consumed");
        let mut consumed = 0;

        while *incoming > 0 && self.head != NULL_INDEX {
            let head = arena.node_mut(self.head);
            if head.size <= *incoming {
                // Head fully filled - remove from level and index
                let filled = head.size;
                let order_id = head.order_id;
                *incoming -= filled;
                consumed += filled;
                self.pop_front(arena);
                index.remove(&order_id);
                trace!(order_id, filled, "resting order filled");
            } else {
                // Head partially filled
                head.size -= *incoming;
                let filled = *incoming;
                trace!(order_id = head.order_id, filled, left = head.size, "resting order reduced");
                self.total_size -= filled;
                consumed += filled;
                *incoming = 0;
            }
        }

        consumed
    }

    /// Shrink an order in place, keeping its queue position.
    ///
    /// # Returns
    /// The amount actually removed (never more than the order's size).
    pub fn reduce(&mut self, arena: &mut Arena, handle: OrderHandle, by: Size) -> Size {
        let Some(node) = arena.get_mut(handle) else {
            return 0;
        };
        let removed = by.min(node.size);
        node.size -= removed;
        self.total_size -= removed;
        removed
    }

    /// Iterate orders from oldest to newest.
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelIter<'a> {
        LevelIter {
            arena,
            cursor: self.head,
        }
    }

    /// Ids of the queued orders, oldest first.
    pub fn order_ids(&self, arena: &Arena) -> Vec<OrderId> {
        self.iter(arena).map(|node| node.order_id).collect()
    }

    /// Release every order of the level back to the arena.
    ///
    /// # Returns
    /// Ids of the released orders, oldest first
    pub fn release_all(&mut self, arena: &mut Arena) -> Vec<OrderId> {
        let mut ids = Vec::with_capacity(self.order_count as usize);
        while let Some(node) = self.pop_front(arena) {
            ids.push(node.order_id);
        }
        ids
    }

    /// Handle of the newest order, if any.
    #[inline]
    pub fn newest(&self, arena: &Arena) -> Option<OrderHandle> {
        (self.tail != NULL_INDEX).then(|| arena.handle_of(self.tail))
    }

    /// Render the level with its queue.
    pub fn display<'a>(&'a self, arena: &'a Arena) -> LevelDisplay<'a> {
        LevelDisplay { level: self, arena }
    }
}

/// FIFO iterator over the orders of one level.
pub struct LevelIter<'a> {
    arena: &'a Arena,
    cursor: ArenaIndex,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = &'a OrderNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let node = self.arena.node(self.cursor);
        self.cursor = node.next;
        Some(node)
    }
}

pub struct LevelDisplay<'a> {
    level: &'a PriceLevel,
    arena: &'a Arena,
}

impl fmt::Display for LevelDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10} | {:>8} | {:>3} |",
            self.level.price, self.level.total_size, self.level.order_count
        )?;
        for node in self.level.iter(self.arena) {
            write!(f, " {}:{}", node.order_id, node.size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;
    use crate::order_book::OrderInfo;

    fn price() -> Price {
        Price::new(13, 1)
    }

    fn setup_level(arena: &mut Arena, index: &mut OrderIndex, sizes: &[Size]) -> (PriceLevel, Vec<OrderHandle>) {
        let mut level = PriceLevel::new(price());
        let handles = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let handle = level.add(arena, OrderNode::new(i as OrderId, Side::Buy, price(), size));
                index.insert(i as OrderId, OrderInfo { handle, side: Side::Buy, price: price() });
                handle
            })
            .collect();
        (level, handles)
    }

    #[test]
    fn test_empty_level() {
        let level = PriceLevel::new(price());
        assert!(level.is_empty());
        assert_eq!(level.order_count, 0);
        assert_eq!(level.total_size, 0);
        assert_eq!(level.head, NULL_INDEX);
        assert_eq!(level.tail, NULL_INDEX);
    }

    #[test]
    fn test_add_multiple_fifo() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (level, handles) = setup_level(&mut arena, &mut index, &[100, 100, 100]);

        assert_eq!(level.order_count, 3);
        assert_eq!(level.total_size, 300);
        assert_eq!(level.head, handles[0].index);
        assert_eq!(level.tail, handles[2].index);
        assert_eq!(level.order_ids(&arena), vec![0, 1, 2]);
    }

    #[test]
    fn test_add_front_jumps_queue() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, _) = setup_level(&mut arena, &mut index, &[100, 100]);

        level.add_front(&mut arena, OrderNode::new(-1, Side::Buy, price(), 40));
        assert_eq!(level.order_ids(&arena), vec![-1, 0, 1]);
        assert_eq!(level.total_size, 240);
    }

    #[test]
    fn test_pop_front() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, _) = setup_level(&mut arena, &mut index, &[100, 200, 300]);

        assert_eq!(level.pop_front(&mut arena).map(|n| n.order_id), Some(0));
        assert_eq!(level.order_count, 2);
        assert_eq!(level.total_size, 500);
        assert_eq!(level.pop_front(&mut arena).map(|n| n.order_id), Some(1));
        assert_eq!(level.pop_front(&mut arena).map(|n| n.order_id), Some(2));
        assert!(level.is_empty());
        assert!(level.pop_front(&mut arena).is_none());
    }

    #[test]
    fn test_remove_middle_head_tail() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, handles) = setup_level(&mut arena, &mut index, &[10, 20, 30, 40]);

        assert_eq!(level.remove(&mut arena, handles[1]).map(|n| n.size), Some(20));
        assert_eq!(level.order_ids(&arena), vec![0, 2, 3]);

        level.remove(&mut arena, handles[0]);
        assert_eq!(level.order_ids(&arena), vec![2, 3]);

        level.remove(&mut arena, handles[3]);
        assert_eq!(level.order_ids(&arena), vec![2]);
        assert_eq!(level.total_size, 30);

        level.remove(&mut arena, handles[2]);
        assert!(level.is_empty());
        assert_eq!(level.head, NULL_INDEX);
        assert_eq!(level.tail, NULL_INDEX);
    }

    #[test]
    fn test_remove_stale_handle_is_noop() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, handles) = setup_level(&mut arena, &mut index, &[10, 20]);

        level.remove(&mut arena, handles[0]);
        assert!(level.remove(&mut arena, handles[0]).is_none());
        assert_eq!(level.order_count, 1);
        assert_eq!(level.total_size, 20);
    }

    #[test]
    fn test_match_against_fifo() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, _) = setup_level(&mut arena, &mut index, &[100, 100]);

        let mut incoming = 150;
        let consumed = level.match_against(&mut arena, &mut index, &mut incoming);

        assert_eq!(consumed, 150);
        assert_eq!(incoming, 0);
        assert_eq!(level.order_ids(&arena), vec![1]);
        assert_eq!(level.iter(&arena).next().map(|n| n.size), Some(50));
        assert_eq!(level.total_size, 50);
        assert!(!index.contains_key(&0));
        assert!(index.contains_key(&1));
    }

    #[test]
    fn test_match_against_partial_head() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, _) = setup_level(&mut arena, &mut index, &[100, 200]);

        let mut incoming = 30;
        assert_eq!(level.match_against(&mut arena, &mut index, &mut incoming), 30);
        assert_eq!(level.total_size, 270);
        assert_eq!(level.order_count, 2);
    }

    #[test]
    fn test_reduce_and_release_all() {
        let mut arena = Arena::new();
        let mut index = OrderIndex::default();
        let (mut level, handles) = setup_level(&mut arena, &mut index, &[100, 50]);

        assert_eq!(level.reduce(&mut arena, handles[1], 80), 50);
        assert_eq!(level.total_size, 100);

        let ids = level.release_all(&mut arena);
        assert_eq!(ids, vec![0, 1]);
        assert!(level.is_empty());
        assert!(arena.is_empty());
    }
}
