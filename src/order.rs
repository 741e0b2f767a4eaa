//! Order value types.
//!
//! An [`Order`] describes one order-feed event: a new limit order, a
//! cancel of a resting order, or a reprice (cancel + replace) of one.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{LobError, Result};

/// Order identifier. Real ids are `>= 0`, synthetic placeholders `<= -1`.
pub type OrderId = i64;

/// Exact decimal price.
pub type Price = Decimal;

/// Order / level quantity.
pub type Size = u64;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// True if `price` is strictly better than `reference` for a resting
    /// order on this side (higher for bids, lower for asks).
    #[inline]
    pub fn is_better(self, price: Price, reference: Price) -> bool {
        match self {
            Side::Buy => price > reference,
            Side::Sell => price < reference,
        }
    }

    /// True if an incoming order on this side at `price` crosses a resting
    /// opposite price.
    #[inline]
    pub fn crosses(self, price: Price, opposite_best: Price) -> bool {
        match self {
            // Buyer willing to pay >= lowest ask
            Side::Buy => price >= opposite_best,
            // Seller willing to accept <= highest bid
            Side::Sell => price <= opposite_best,
        }
    }

    /// Wire flag: 0 = buy, 1 = sell.
    #[inline]
    pub const fn as_flag(self) -> u8 {
        self as u8
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "0" => Some(Side::Buy),
            "1" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl Serialize for Side {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Side::Buy => "bid",
            Side::Sell => "ask",
        })
    }
}

/// What an order event does to the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderKind {
    /// A new limit order
    Normal,
    /// Cancel the resting order `ref_id`
    Cancel { ref_id: OrderId },
    /// Replace resting order `ref_id` with this order's price/size
    Reprice {
        ref_id: OrderId,
        old_price: Price,
        old_size: Size,
    },
}

/// One order-feed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub size: Size,
    pub price: Price,
    pub kind: OrderKind,
}

impl Order {
    /// A new limit order.
    pub fn normal(order_id: OrderId, side: Side, size: Size, price: Price) -> Self {
        Self {
            order_id,
            side,
            size,
            price,
            kind: OrderKind::Normal,
        }
    }

    /// A cancel of resting order `ref_id`.
    pub fn cancel(order_id: OrderId, ref_id: OrderId) -> Self {
        Self {
            order_id,
            side: Side::Buy,
            size: 0,
            price: Price::ZERO,
            kind: OrderKind::Cancel { ref_id },
        }
    }

    /// A reprice of resting order `ref_id` to `price`/`size`.
    pub fn reprice(
        order_id: OrderId,
        side: Side,
        size: Size,
        price: Price,
        ref_id: OrderId,
        old_price: Price,
        old_size: Size,
    ) -> Self {
        Self {
            order_id,
            side,
            size,
            price,
            kind: OrderKind::Reprice {
                ref_id,
                old_price,
                old_size,
            },
        }
    }

    #[inline]
    pub fn is_cancel(&self) -> bool {
        matches!(self.kind, OrderKind::Cancel { .. })
    }

    #[inline]
    pub fn is_reprice(&self) -> bool {
        matches!(self.kind, OrderKind::Reprice { .. })
    }

    /// The resting order a cancel/reprice targets.
    #[inline]
    pub fn ref_id(&self) -> Option<OrderId> {
        match self.kind {
            OrderKind::Normal => None,
            OrderKind::Cancel { ref_id } | OrderKind::Reprice { ref_id, .. } => Some(ref_id),
        }
    }

    /// The Normal order a reprice turns into.
    pub fn as_normal(&self) -> Self {
        Self {
            kind: OrderKind::Normal,
            ..*self
        }
    }
}

/// Wire format:
/// `N <id> <side> <size> <price>`,
/// `C <id> <_> <_> <_> <ref_id> <_> <_>`,
/// `R <id> <side> <size> <price> <ref_id> <old_price> <old_size>`.
impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OrderKind::Normal => write!(
                f,
                "N {} {} {} {}",
                self.order_id,
                self.side.as_flag(),
                self.size,
                self.price
            ),
            OrderKind::Cancel { ref_id } => write!(
                f,
                "C {} {} {} {} {} 0 0",
                self.order_id,
                self.side.as_flag(),
                self.size,
                self.price,
                ref_id
            ),
            OrderKind::Reprice {
                ref_id,
                old_price,
                old_size,
            } => write!(
                f,
                "R {} {} {} {} {} {} {}",
                self.order_id,
                self.side.as_flag(),
                self.size,
                self.price,
                ref_id,
                old_price,
                old_size
            ),
        }
    }
}

impl FromStr for Order {
    type Err = LobError;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = Fields::new(line);
        let tag = fields.next_str("tag")?;
        let order = match tag {
            "N" => Order::normal(
                fields.order_id("order_id")?,
                fields.side()?,
                fields.parse("size")?,
                fields.parse("price")?,
            ),
            "C" => {
                let order_id = fields.order_id("order_id")?;
                // side, size and price carry no meaning on a cancel
                for name in ["side", "size", "price"] {
                    fields.next_str(name)?;
                }
                Order::cancel(order_id, fields.order_id("ref_id")?)
            }
            "R" => Order::reprice(
                fields.order_id("order_id")?,
                fields.side()?,
                fields.parse("size")?,
                fields.parse("price")?,
                fields.order_id("ref_id")?,
                fields.parse("old_price")?,
                fields.parse("old_size")?,
            ),
            other => {
                return Err(LobError::malformed(
                    line,
                    format!("unknown order tag `{other}`"),
                ))
            }
        };
        if order.kind == OrderKind::Normal && order.size == 0 {
            return Err(LobError::malformed(line, "order size must be positive"));
        }
        Ok(order)
    }
}

/// Whitespace tokenizer that reports which field was missing or bad.
pub(crate) struct Fields<'a> {
    line: &'a str,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        Self {
            line,
            tokens: line.split_whitespace(),
        }
    }

    pub(crate) fn next_str(&mut self, name: &str) -> Result<&'a str> {
        self.tokens
            .next()
            .ok_or_else(|| LobError::malformed(self.line, format!("missing field `{name}`")))
    }

    pub(crate) fn parse<T: FromStr>(&mut self, name: &str) -> Result<T> {
        let raw = self.next_str(name)?;
        raw.parse().map_err(|_| {
            LobError::malformed(self.line, format!("field `{name}` has bad value `{raw}`"))
        })
    }

    /// Feed ids are never negative; that range belongs to placeholders.
    pub(crate) fn order_id(&mut self, name: &str) -> Result<OrderId> {
        let id: OrderId = self.parse(name)?;
        if id < 0 {
            return Err(LobError::malformed(
                self.line,
                format!("field `{name}` must not be negative, got `{id}`"),
            ));
        }
        Ok(id)
    }

    pub(crate) fn side(&mut self) -> Result<Side> {
        let raw = self.next_str("side")?;
        Side::from_flag(raw)
            .ok_or_else(|| LobError::malformed(self.line, format!("side must be 0 or 1, got `{raw}`")))
    }

    /// True once every token has been consumed.
    pub(crate) fn is_exhausted(&mut self) -> bool {
        self.tokens.clone().next().is_none()
    }
}
