//! Snapshot - aggregated (L2) view of a book.
//!
//! A [`Snapshot`] maps price to total resting size per side, without any
//! order-level detail. It is both the value the snapshot feed delivers and
//! the result of aggregating an L3 book ([`crate::Book::agg`]).
//!
//! It also carries its own, independent matching path ([`Snapshot::apply`])
//! that works on aggregate sizes only. The L3 book must always agree with it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{LobError, Result};
use crate::order::{Fields, Order, OrderKind, Price, Side, Size};

/// One aggregated price level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct L2Level {
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

/// A level on which two snapshots disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelDiff {
    pub side: Side,
    pub price: Price,
    pub left: Size,
    pub right: Size,
}

/// Price -> aggregate size for both sides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    bids: BTreeMap<Price, Size>,
    asks: BTreeMap<Price, Size>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an L2 book by matching a sequence of Normal orders.
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Result<Self> {
        let mut snapshot = Self::new();
        for order in orders {
            snapshot.apply(order)?;
        }
        Ok(snapshot)
    }

    fn side(&self, side: Side) -> &BTreeMap<Price, Size> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, Size> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Set the aggregate size at a level; a size of zero removes the level.
    pub fn set_level(&mut self, side: Side, price: Price, size: Size) {
        if size == 0 {
            self.side_mut(side).remove(&price);
        } else {
            self.side_mut(side).insert(price, size);
        }
    }

    /// Aggregate size resting at `price`, 0 if the level is absent.
    pub fn size_at(&self, side: Side, price: Price) -> Size {
        self.side(side).get(&price).copied().unwrap_or(0)
    }

    /// Best level of a side.
    pub fn best(&self, side: Side) -> Option<(Price, Size)> {
        let levels = self.side(side);
        let best = match side {
            Side::Buy => levels.last_key_value(),
            Side::Sell => levels.first_key_value(),
        };
        best.map(|(p, s)| (*p, *s))
    }

    pub fn best_bid(&self) -> Option<(Price, Size)> {
        self.best(Side::Buy)
    }

    pub fn best_ask(&self) -> Option<(Price, Size)> {
        self.best(Side::Sell)
    }

    /// Levels of a side, best price first.
    pub fn levels(&self, side: Side) -> Vec<(Price, Size)> {
        let levels = self.side(side).iter().map(|(p, s)| (*p, *s));
        match side {
            Side::Buy => levels.rev().collect(),
            Side::Sell => levels.collect(),
        }
    }

    /// Every level as a flat row list (bids best first, then asks best first).
    pub fn rows(&self) -> Vec<L2Level> {
        [Side::Buy, Side::Sell]
            .into_iter()
            .flat_map(|side| {
                self.levels(side)
                    .into_iter()
                    .map(move |(price, size)| L2Level { side, price, size })
            })
            .collect()
    }

    pub fn depth(&self, side: Side) -> usize {
        self.side(side).len()
    }

    /// Total resting size of a side.
    pub fn side_size(&self, side: Side) -> Size {
        self.side(side).values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Levels whose size differs between `self` and `other`, bids then asks,
    /// each in ascending price order.
    pub fn diff(&self, other: &Snapshot) -> Vec<LevelDiff> {
        let mut diffs = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            let ours = self.side(side);
            let theirs = other.side(side);
            let prices: BTreeSet<Price> = ours.keys().chain(theirs.keys()).copied().collect();
            for price in prices {
                let left = ours.get(&price).copied().unwrap_or(0);
                let right = theirs.get(&price).copied().unwrap_or(0);
                if left != right {
                    diffs.push(LevelDiff {
                        side,
                        price,
                        left,
                        right,
                    });
                }
            }
        }
        diffs
    }

    /// Match a Normal order against aggregate sizes.
    ///
    /// Returns `true` if the order was aggressive (took liquidity).
    pub fn apply(&mut self, order: &Order) -> Result<bool> {
        if order.kind != OrderKind::Normal {
            return Err(LobError::invalid_order(
                order.order_id,
                "only Normal orders can be matched",
            ));
        }
        if order.size == 0 {
            return Err(LobError::invalid_order(order.order_id, "size must be positive"));
        }

        let opposite = order.side.opposite();
        let mut remaining = order.size;
        let mut aggressive = false;

        while remaining > 0 {
            let Some((best_price, best_size)) = self.best(opposite) else {
                break;
            };
            if !order.side.crosses(order.price, best_price) {
                break;
            }
            aggressive = true;
            let traded = best_size.min(remaining);
            remaining -= traded;
            self.set_level(opposite, best_price, best_size - traded);
        }

        if remaining > 0 {
            *self.side_mut(order.side).entry(order.price).or_insert(0) += remaining;
        }
        Ok(aggressive)
    }

    /// Wire format: `S <bid_depth> <ask_depth>` then bid pairs then ask
    /// pairs, each side in ascending price order.
    pub fn to_simple_string(&self) -> String {
        let mut out = format!("S {} {}", self.bids.len(), self.asks.len());
        for (price, size) in self.bids.iter().chain(self.asks.iter()) {
            out.push_str(&format!(" {price} {size}"));
        }
        out
    }

    /// Parse the `S ...` wire format.
    pub fn parse(line: &str) -> Result<Self> {
        line.parse()
    }
}

impl FromStr for Snapshot {
    type Err = LobError;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = Fields::new(line);
        if fields.next_str("tag")? != "S" {
            return Err(LobError::malformed(line, "snapshot must start with `S`"));
        }
        let bid_depth: usize = fields.parse("bid_depth")?;
        let ask_depth: usize = fields.parse("ask_depth")?;

        let mut snapshot = Snapshot::new();
        for (side, depth) in [(Side::Buy, bid_depth), (Side::Sell, ask_depth)] {
            let mut total: Size = 0;
            for _ in 0..depth {
                let price: Price = fields.parse("price")?;
                let size: Size = fields.parse("size")?;
                total = total
                    .checked_add(size)
                    .ok_or_else(|| LobError::malformed(line, "side size overflows"))?;
                if size > 0 {
                    *snapshot.side_mut(side).entry(price).or_insert(0) += size;
                }
            }
        }
        if !fields.is_exhausted() {
            return Err(LobError::malformed(line, "trailing fields after the declared depth"));
        }
        Ok(snapshot)
    }
}

/// Asks from worst to best, a separator, then bids from best to worst.
impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asks.is_empty() {
            writeln!(f, "{:>10} | -", "<empty>")?;
        }
        for (price, size) in self.asks.iter().rev() {
            writeln!(f, "{price:>10} | {size}")?;
        }
        writeln!(f, "---------- asks ^ / bids v ----------")?;
        if self.bids.is_empty() {
            writeln!(f, "{:>10} | -", "<empty>")?;
        }
        for (price, size) in self.bids.iter().rev() {
            writeln!(f, "{price:>10} | {size}")?;
        }
        Ok(())
    }
}
