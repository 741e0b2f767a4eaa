//! Matching Engine - the L3 book.
//!
//! A [`Book`] owns both sides of the market, the arena the resting orders
//! live in, and the order index. It implements price-time priority:
//!
//! 1. Walk the opposite side best price first
//! 2. A level the order can fully consume is evicted as a whole
//! 3. The first level it cannot fully consume is matched order by order,
//!    oldest first, and the walk stops
//! 4. Any remainder rests on the order's own side
//!
//! Listeners see every accepted event before the book mutates.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::arena::{Arena, OrderHandle, OrderNode};
use crate::error::{LobError, Result};
use crate::inference::TradeInferenceState;
use crate::listener::{with_listener, BookListener, SharedListener, WeakListener};
use crate::order::{Order, OrderId, OrderKind, Price, Side, Size};
use crate::order_book::{OneSideBook, OrderIndex, OrderInfo};
use crate::price_level::PriceLevel;
use crate::snapshot::Snapshot;

/// Best bid and best ask, each `None` when the side is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BestMarket {
    pub bid: Option<(Price, Size)>,
    pub ask: Option<(Price, Size)>,
}

impl BestMarket {
    /// `ask - bid`, when both sides are present.
    pub fn spread(&self) -> Option<Price> {
        match (self.bid, self.ask) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }
}

/// Two-sided limit order book with per-order detail.
pub struct Book {
    arena: Arena,
    bids: OneSideBook,
    asks: OneSideBook,
    index: OrderIndex,
    /// Trade inference accumulators owned by this replica
    pub(crate) inference: TradeInferenceState,
    listeners: Vec<WeakListener>,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy of the book state. Listeners are not carried over: the copy
/// starts unobserved.
impl Clone for Book {
    fn clone(&self) -> Self {
        Self {
            arena: self.arena.clone(),
            bids: self.bids.clone(),
            asks: self.asks.clone(),
            index: self.index.clone(),
            inference: self.inference.clone(),
            listeners: Vec::new(),
        }
    }
}

impl Book {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a book whose arena has room for `capacity` resting orders.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Arena::with_capacity(capacity),
            bids: OneSideBook::new(Side::Buy),
            asks: OneSideBook::new(Side::Sell),
            index: OrderIndex::default(),
            inference: TradeInferenceState::default(),
            listeners: Vec::new(),
        }
    }

    /// Replay a historical event list into a fresh book.
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Result<Self> {
        let mut book = Self::new();
        for order in orders {
            book.apply_dispatch(order)?;
        }
        Ok(book)
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Attach an observer. It is notified before every accepted mutation
    /// for as long as the caller keeps `listener` alive.
    pub fn subscribe(&mut self, listener: SharedListener) {
        self.listeners.retain(|l| l.strong_count() > 0);
        self.listeners.push(Arc::downgrade(&listener));
    }

    /// Number of attached listeners that are still alive.
    pub fn listener_count(&self) -> usize {
        self.listeners.iter().filter(|l| l.strong_count() > 0).count()
    }

    pub(crate) fn notify(&self, mut f: impl FnMut(&mut dyn BookListener, &Book)) {
        for listener in self.listeners.iter().filter_map(|l| l.upgrade()) {
            with_listener(&listener, |l| f(l, self));
        }
    }

    /// Overwrite this book's state with a deep copy of `other`, keeping this
    /// book's own listeners.
    pub fn resync_from(&mut self, other: &Book) {
        self.arena.clone_from(&other.arena);
        self.bids.clone_from(&other.bids);
        self.asks.clone_from(&other.asks);
        self.index.clone_from(&other.index);
        self.inference.clone_from(&other.inference);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn side(&self, side: Side) -> &OneSideBook {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Split borrow of one side together with the arena and the index.
    #[inline]
    pub(crate) fn parts_mut(&mut self, side: Side) -> (&mut OneSideBook, &mut Arena, &mut OrderIndex) {
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        (book_side, &mut self.arena, &mut self.index)
    }

    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Best level of a side as `(price, aggregate size)`.
    pub fn best(&self, side: Side) -> Option<(Price, Size)> {
        self.side(side)
            .best_level()
            .map(|level| (level.price, level.total_size))
    }

    pub fn best_bid(&self) -> Option<(Price, Size)> {
        self.best(Side::Buy)
    }

    pub fn best_ask(&self) -> Option<(Price, Size)> {
        self.best(Side::Sell)
    }

    pub fn best_market(&self) -> BestMarket {
        BestMarket {
            bid: self.best_bid(),
            ask: self.best_ask(),
        }
    }

    /// Best level of a side with its queue.
    pub fn best_level(&self, side: Side) -> Option<&PriceLevel> {
        self.side(side).best_level()
    }

    pub fn bid_side_size(&self) -> Size {
        self.bids.total_size()
    }

    pub fn ask_side_size(&self) -> Size {
        self.asks.total_size()
    }

    pub fn bid_side_depth(&self) -> usize {
        self.bids.depth()
    }

    pub fn ask_side_depth(&self) -> usize {
        self.asks.depth()
    }

    /// Number of resting orders.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    #[inline]
    pub fn contains_order(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Look up a resting order.
    pub fn query_order_id(&self, order_id: OrderId) -> Option<&OrderNode> {
        let info = self.index.get(&order_id)?;
        self.arena.get(info.handle)
    }

    /// Whether `order` would take liquidity if applied now.
    ///
    /// Cancels never do; a reprice is judged at its new price.
    pub fn is_aggressive(&self, order: &Order) -> bool {
        if order.is_cancel() {
            return false;
        }
        self.side(order.side.opposite())
            .best_price()
            .is_some_and(|best| order.side.crosses(order.price, best))
    }

    /// Aggregate the L3 state into an L2 snapshot.
    pub fn agg(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for side in [Side::Buy, Side::Sell] {
            for level in self.side(side).iter() {
                snapshot.set_level(side, level.price, level.total_size);
            }
        }
        snapshot
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Apply a Normal order.
    ///
    /// # Returns
    /// `Ok(true)` if the order was aggressive (matched on arrival).
    ///
    /// # Errors
    /// `InvalidOrder` for a cancel/reprice or a zero size, `DuplicateOrderId`
    /// if the id is already resting. Nothing is notified or mutated on error.
    pub fn apply(&mut self, order: &Order) -> Result<bool> {
        if order.kind != OrderKind::Normal {
            return Err(LobError::invalid_order(
                order.order_id,
                "cancel and reprice must go through apply_dispatch",
            ));
        }
        self.validate_new(order)?;

        self.notify(|l, book| l.on_order(book, order));
        Ok(self.match_order(order))
    }

    /// Cancel the resting order a Cancel event targets.
    ///
    /// # Returns
    /// `Ok(false)` if the target is not resting (it may already have traded);
    /// nothing is notified in that case.
    pub fn cancel(&mut self, order: &Order) -> Result<bool> {
        let OrderKind::Cancel { ref_id } = order.kind else {
            return Err(LobError::invalid_order(order.order_id, "not a cancel"));
        };
        if !self.contains_order(ref_id) {
            debug!(ref_id, "cancel of unknown order ignored");
            return Ok(false);
        }

        self.notify(|l, book| l.on_order(book, order));
        Ok(self.remove_order(ref_id).is_some())
    }

    /// Replace a resting order with the reprice's price and size.
    ///
    /// The replacement loses time priority and may match on arrival.
    ///
    /// # Returns
    /// `Ok(false)` if the target is not resting; the reprice is refused.
    pub fn reprice(&mut self, order: &Order) -> Result<bool> {
        let OrderKind::Reprice { ref_id, .. } = order.kind else {
            return Err(LobError::invalid_order(order.order_id, "not a reprice"));
        };
        if !self.contains_order(ref_id) {
            debug!(ref_id, "reprice of unknown order refused");
            return Ok(false);
        }
        let replacement = order.as_normal();
        if order.size == 0 {
            return Err(LobError::invalid_order(order.order_id, "size must be positive"));
        }
        if order.order_id < 0 {
            return Err(LobError::invalid_order(order.order_id, "negative ids are reserved for placeholders"));
        }
        if replacement.order_id != ref_id && self.contains_order(replacement.order_id) {
            return Err(LobError::DuplicateOrderId(replacement.order_id));
        }
        let freed = self.query_order_id(ref_id).filter(|n| n.side == order.side).map_or(0, |n| n.size);
        if order.size > self.headroom(order.side).saturating_add(freed) {
            return Err(LobError::invalid_order(order.order_id, "size overflows the side total"));
        }

        self.notify(|l, book| l.on_order(book, order));
        self.remove_order(ref_id);
        self.match_order(&replacement);
        Ok(true)
    }

    /// Route an order event by kind.
    ///
    /// # Returns
    /// The kind together with "aggressive" for a Normal order and "success"
    /// for a cancel or reprice.
    pub fn apply_dispatch(&mut self, order: &Order) -> Result<(OrderKind, bool)> {
        let outcome = match order.kind {
            OrderKind::Normal => self.apply(order)?,
            OrderKind::Cancel { .. } => self.cancel(order)?,
            OrderKind::Reprice { .. } => self.reprice(order)?,
        };
        Ok((order.kind, outcome))
    }

    fn validate_new(&self, order: &Order) -> Result<()> {
        if order.size == 0 {
            return Err(LobError::invalid_order(order.order_id, "size must be positive"));
        }
        if order.order_id < 0 {
            return Err(LobError::invalid_order(order.order_id, "negative ids are reserved for placeholders"));
        }
        if self.contains_order(order.order_id) {
            return Err(LobError::DuplicateOrderId(order.order_id));
        }
        if order.size > self.headroom(order.side) {
            return Err(LobError::invalid_order(order.order_id, "size overflows the side total"));
        }
        Ok(())
    }

    /// Size that can still be added to `side` before its total overflows.
    #[inline]
    pub(crate) fn headroom(&self, side: Side) -> Size {
        Size::MAX - self.side(side).total_size()
    }

    // ========================================================================
    // Core mutation (silent)
    // ========================================================================

    /// Match a Normal order and rest whatever is left.
    fn match_order(&mut self, order: &Order) -> bool {
        if !self.is_aggressive(order) {
            self.insert_resting(order.order_id, order.side, order.price, order.size);
            return false;
        }

        let consumed = self.sweep(order.side.opposite(), order.price, order.size);
        let remaining = order.size - consumed;
        if remaining > 0 {
            self.insert_resting(order.order_id, order.side, order.price, remaining);
        }
        true
    }

    /// Take up to `size` from `maker_side`, best price first, at prices no
    /// worse than `limit` for the taker. Nothing rests.
    ///
    /// # Returns
    /// The size actually consumed
    pub(crate) fn sweep(&mut self, maker_side: Side, limit: Price, size: Size) -> Size {
        let taker_side = maker_side.opposite();
        let mut remaining = size;
        let (book_side, arena, index) = self.parts_mut(maker_side);

        while remaining > 0 {
            let Some(level) = book_side.best_level() else {
                break;
            };
            let price = level.price;
            if !taker_side.crosses(limit, price) {
                break;
            }

            if level.total_size <= remaining {
                // Whole level consumed
                let Some(mut level) = book_side.remove_level(price) else {
                    break;
                };
                remaining -= level.total_size;
                for order_id in level.release_all(arena) {
                    index.remove(&order_id);
                }
                trace!(%price, remaining, "level evicted");
            } else {
                let Some(level) = book_side.level_mut(price) else {
                    break;
                };
                let consumed = level.match_against(arena, index, &mut remaining);
                book_side.sub_size(consumed);
                trace!(%price, consumed, "level partially consumed");
                break;
            }
        }

        size - remaining
    }

    /// Rest an order at the tail of its level without matching.
    pub(crate) fn insert_resting(&mut self, order_id: OrderId, side: Side, price: Price, size: Size) -> OrderHandle {
        debug_assert!(size > 0, "resting order must have positive size");
        debug_assert!(!self.index.contains_key(&order_id), "order {order_id} is already resting");
        let (book_side, arena, index) = self.parts_mut(side);
        let handle = book_side
            .level_or_create(price)
            .add(arena, OrderNode::new(order_id, side, price, size));
        book_side.add_size(size);
        index.insert(order_id, OrderInfo { handle, side, price });
        handle
    }

    /// Remove a resting order without notifying anyone.
    pub fn remove_order(&mut self, order_id: OrderId) -> Option<OrderNode> {
        let info = self.index.remove(&order_id)?;
        let (book_side, arena, _) = self.parts_mut(info.side);
        let node = book_side.level_mut(info.price)?.remove(arena, info.handle)?;
        book_side.sub_size(node.size);
        book_side.remove_if_empty(info.price);
        Some(node)
    }

    /// Drop a whole level without notifying anyone.
    ///
    /// # Returns
    /// The size that was resting at the level
    pub(crate) fn remove_level(&mut self, side: Side, price: Price) -> Size {
        let (book_side, arena, index) = self.parts_mut(side);
        let Some(mut level) = book_side.remove_level(price) else {
            return 0;
        };
        let size = level.total_size;
        for order_id in level.release_all(arena) {
            index.remove(&order_id);
        }
        size
    }

    /// Check every structural invariant, describing the first violation.
    ///
    /// Intended for tests and debugging; walks the whole book.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut resting = 0usize;
        for side in [Side::Buy, Side::Sell] {
            let book_side = self.side(side);
            let mut side_total = 0;
            for level in book_side.iter() {
                if level.is_empty() {
                    return Err(format!("empty level {} left on {side:?}", level.price));
                }
                let mut level_total = 0;
                let mut count = 0;
                for node in level.iter(&self.arena) {
                    if node.size == 0 {
                        return Err(format!("order {} rests with zero size", node.order_id));
                    }
                    if node.side != side || node.price != level.price {
                        return Err(format!("order {} is in the wrong level", node.order_id));
                    }
                    let Some(info) = self.index.get(&node.order_id) else {
                        return Err(format!("order {} missing from the index", node.order_id));
                    };
                    if self.arena.get(info.handle).map(|n| n.order_id) != Some(node.order_id) {
                        return Err(format!("index handle of order {} is stale", node.order_id));
                    }
                    level_total += node.size;
                    count += 1;
                }
                if level_total != level.total_size || count != level.order_count {
                    return Err(format!(
                        "level {} aggregates {}/{} disagree with queue {}/{}",
                        level.price, level.total_size, level.order_count, level_total, count
                    ));
                }
                side_total += level_total;
                resting += count as usize;
            }
            if side_total != book_side.total_size() {
                return Err(format!(
                    "{side:?} side size {} disagrees with levels {}",
                    book_side.total_size(),
                    side_total
                ));
            }
        }
        if resting != self.index.len() || resting != self.arena.allocated() as usize {
            return Err(format!(
                "{resting} resting orders but index has {} and arena {}",
                self.index.len(),
                self.arena.allocated()
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("best_market", &self.best_market())
            .field("orders", &self.index.len())
            .field("bid_side_size", &self.bids.total_size())
            .field("ask_side_size", &self.asks.total_size())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Asks from worst to best, a separator, then bids from best to worst.
impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let asks: Vec<_> = self.asks.iter().collect();
        for level in asks.iter().rev() {
            writeln!(f, "{}", level.display(&self.arena))?;
        }
        writeln!(f, "---------- asks ^ / bids v ----------")?;
        for level in self.bids.iter() {
            writeln!(f, "{}", level.display(&self.arena))?;
        }
        Ok(())
    }
}
