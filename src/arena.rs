//! Arena Allocator - growable slab of order nodes with stable handles.
//!
//! Every resting order lives in one slot of the arena. Slots are addressed
//! by an [`OrderHandle`] (slot index + generation) instead of a pointer or
//! a container iterator, so handles survive the arena growing and survive a
//! whole-book clone unchanged: the clone has the same nodes at the same
//! indices. Freeing a slot bumps its generation, which turns every handle
//! still pointing at it into a detectable stale handle.

use std::fmt;

use crate::order::{OrderId, Price, Side, Size};

/// Sentinel value representing a null/invalid slot index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Raw slot index - our "compressed pointer" into the arena.
pub type ArenaIndex = u32;

/// A generation-tagged reference to an arena slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    pub index: ArenaIndex,
    pub generation: u32,
}

/// A single resting order plus its FIFO linkage within a price level.
#[derive(Clone, Copy)]
pub struct OrderNode {
    /// Order ID (negative for synthetic placeholders)
    pub order_id: OrderId,
    /// Side of the book the order rests on
    pub side: Side,
    /// Limit price
    pub price: Price,
    /// Remaining size
    pub size: Size,

    /// Index of next order at same price level
    pub next: ArenaIndex,
    /// Index of previous order (enables O(1) cancel)
    pub prev: ArenaIndex,
}

impl OrderNode {
    /// Create a new unlinked order node
    #[inline]
    pub fn new(order_id: OrderId, side: Side, price: Price, size: Size) -> Self {
        Self {
            order_id,
            side,
            price,
            size,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("order_id", &self.order_id)
            .field("side", &self.side)
            .field("price", &self.price)
            .field("size", &self.size)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    node: Option<OrderNode>,
    /// Free-list link, only meaningful while `node` is `None`
    next_free: ArenaIndex,
}

/// Growable memory pool with O(1) allocation and deallocation.
///
/// Uses a free list threaded through vacant slots. When the free list is
/// exhausted the backing `Vec` grows; indices of live slots never move.
#[derive(Clone, Default)]
pub struct Arena {
    slots: Vec<Slot>,
    free_head: Option<ArenaIndex>,
    allocated_count: u32,
}

impl Arena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arena with room for `capacity` nodes before it has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            allocated_count: 0,
        }
    }

    /// Store a node and return its handle.
    ///
    /// # Complexity
    /// O(1) amortized - pops the free list or pushes a new slot
    pub fn alloc(&mut self, node: OrderNode) -> OrderHandle {
        self.allocated_count += 1;

        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            self.free_head = (slot.next_free != NULL_INDEX).then_some(slot.next_free);
            slot.node = Some(node);
            slot.next_free = NULL_INDEX;
            return OrderHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as ArenaIndex;
        debug_assert!(index < NULL_INDEX, "arena exhausted the index space");
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
            next_free: NULL_INDEX,
        });
        OrderHandle {
            index,
            generation: 0,
        }
    }

    /// Free a slot, returning the node it held.
    ///
    /// Returns `None` for a stale or vacant handle (no double free).
    pub fn free(&mut self, handle: OrderHandle) -> Option<OrderNode> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let node = slot.node.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        slot.next_free = self.free_head.unwrap_or(NULL_INDEX);
        self.free_head = Some(handle.index);
        self.allocated_count -= 1;
        Some(node)
    }

    /// Get a node by handle, `None` if the handle is stale.
    #[inline]
    pub fn get(&self, handle: OrderHandle) -> Option<&OrderNode> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Mutable access by handle, `None` if the handle is stale.
    #[inline]
    pub fn get_mut(&mut self, handle: OrderHandle) -> Option<&mut OrderNode> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Access a live node by raw index (used while walking FIFO links).
    ///
    /// # Panics
    /// Panics if the slot is vacant: a linked index always refers to a live node.
    #[inline]
    pub fn node(&self, index: ArenaIndex) -> &OrderNode {
        match self.slots[index as usize].node.as_ref() {
            Some(node) => node,
            None => panic!("linked arena index {index} refers to a vacant slot"),
        }
    }

    /// Mutable access to a live node by raw index.
    #[inline]
    pub fn node_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        match self.slots[index as usize].node.as_mut() {
            Some(node) => node,
            None => panic!("linked arena index {index} refers to a vacant slot"),
        }
    }

    /// Current handle of a live slot.
    #[inline]
    pub fn handle_of(&self, index: ArenaIndex) -> OrderHandle {
        OrderHandle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Returns the number of currently allocated nodes.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Number of slots ever created (live + vacant).
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the arena is empty (no allocated nodes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Drop every node and reset all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.allocated_count = 0;
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("slots", &self.slots.len())
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}
