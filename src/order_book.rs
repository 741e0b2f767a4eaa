//! One side of the order book and the order index.
//!
//! A [`OneSideBook`] keeps its levels in a `BTreeMap` keyed by price and
//! answers every query best-first for its side (bids: highest first,
//! asks: lowest first). Iteration order is the matching priority order.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::OrderHandle;
use crate::order::{OrderId, Price, Side, Size};
use crate::price_level::PriceLevel;

/// Location of a resting order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    /// Handle into the book's arena
    pub handle: OrderHandle,
    /// Order side (needed for cancel to find correct book side)
    pub side: Side,
    /// Price level (needed for cancel to find the PriceLevel)
    pub price: Price,
}

/// Mapping from OrderId to its location for O(1) cancel lookup.
///
/// An entry exists iff the order is resting in some level.
pub type OrderIndex = FxHashMap<OrderId, OrderInfo>;

/// Ordered price levels for one side of the book.
#[derive(Clone, Debug)]
pub struct OneSideBook {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
    /// Sum of `total_size` over all levels
    total_size: Size,
}

impl OneSideBook {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            total_size: 0,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Total resting size on this side.
    #[inline]
    pub fn total_size(&self) -> Size {
        self.total_size
    }

    /// Number of price levels.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Best price on this side.
    #[inline]
    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(|level| level.price)
    }

    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    /// Get a price level (immutable)
    #[inline]
    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Get a price level (mutable)
    ///
    /// Callers that change the level's size must report it through
    /// [`OneSideBook::add_size`] / [`OneSideBook::sub_size`].
    #[inline]
    pub fn level_mut(&mut self, price: Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    /// Get or create a price level
    #[inline]
    pub fn level_or_create(&mut self, price: Price) -> &mut PriceLevel {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
    }

    /// Drop a level from the side, returning it.
    pub fn remove_level(&mut self, price: Price) -> Option<PriceLevel> {
        let level = self.levels.remove(&price)?;
        self.total_size -= level.total_size;
        Some(level)
    }

    /// Drop a level if its queue is empty.
    pub fn remove_if_empty(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
        }
    }

    #[inline]
    pub fn add_size(&mut self, size: Size) {
        self.total_size += size;
    }

    #[inline]
    pub fn sub_size(&mut self, size: Size) {
        debug_assert!(self.total_size >= size, "side size would go negative");
        self.total_size -= size;
    }

    /// Levels in priority order (best price first).
    pub fn iter(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// Prices in priority order.
    pub fn prices(&self) -> Vec<Price> {
        self.iter().map(|level| level.price).collect()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
        self.total_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, OrderNode};

    fn px(s: &str) -> Price {
        s.parse().unwrap()
    }

    fn add(book: &mut OneSideBook, arena: &mut Arena, id: OrderId, price: &str, size: Size) {
        let price = px(price);
        let side = book.side();
        book.level_or_create(price)
            .add(arena, OrderNode::new(id, side, price, size));
        book.add_size(size);
    }

    #[test]
    fn test_bids_best_first() {
        let mut arena = Arena::new();
        let mut bids = OneSideBook::new(Side::Buy);
        add(&mut bids, &mut arena, 1, "1.3", 50);
        add(&mut bids, &mut arena, 2, "1.2", 100);
        add(&mut bids, &mut arena, 3, "1.35", 10);

        assert_eq!(bids.best_price(), Some(px("1.35")));
        assert_eq!(bids.prices(), vec![px("1.35"), px("1.3"), px("1.2")]);
        assert_eq!(bids.total_size(), 160);
        assert_eq!(bids.depth(), 3);
    }

    #[test]
    fn test_asks_best_first() {
        let mut arena = Arena::new();
        let mut asks = OneSideBook::new(Side::Sell);
        add(&mut asks, &mut arena, 1, "1.5", 100);
        add(&mut asks, &mut arena, 2, "1.4", 100);
        add(&mut asks, &mut arena, 3, "1.4", 200);

        assert_eq!(asks.best_price(), Some(px("1.4")));
        assert_eq!(asks.best_level().map(|l| l.total_size), Some(300));
        assert_eq!(asks.prices(), vec![px("1.4"), px("1.5")]);
    }

    #[test]
    fn test_remove_level_updates_total() {
        let mut arena = Arena::new();
        let mut asks = OneSideBook::new(Side::Sell);
        add(&mut asks, &mut arena, 1, "1.5", 100);
        add(&mut asks, &mut arena, 2, "1.4", 300);

        let removed = asks.remove_level(px("1.4")).unwrap();
        assert_eq!(removed.total_size, 300);
        assert_eq!(asks.total_size(), 100);
        assert_eq!(asks.best_price(), Some(px("1.5")));
        assert!(asks.remove_level(px("1.4")).is_none());
    }

    #[test]
    fn test_empty_side() {
        let bids = OneSideBook::new(Side::Buy);
        assert!(bids.is_empty());
        assert_eq!(bids.best_price(), None);
        assert!(bids.best_level().is_none());
    }
}
