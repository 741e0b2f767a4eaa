//! Trade prints from the trade feed.

use std::fmt;
use std::str::FromStr;

use crate::error::{LobError, Result};
use crate::order::{Fields, Price, Side, Size};

/// One trade print, possibly spanning several price levels (trade-through).
///
/// Prices are sorted ascending and `volumes[i]` traded at `price_levels[i]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trade {
    pub price_levels: Vec<Price>,
    pub volumes: Vec<Size>,
    /// Side of the liquidity taker
    pub taker_side: Side,
}

impl Trade {
    /// Build a trade from `(price, volume)` pairs in any order.
    pub fn new(taker_side: Side, mut levels: Vec<(Price, Size)>) -> Result<Self> {
        if levels.is_empty() {
            return Err(LobError::malformed("T", "a trade needs at least one level"));
        }
        if levels.iter().any(|(_, volume)| *volume == 0) {
            return Err(LobError::malformed("T", "traded volume must be positive"));
        }
        if levels
            .iter()
            .try_fold(0 as Size, |total, (_, volume)| total.checked_add(*volume))
            .is_none()
        {
            return Err(LobError::malformed("T", "total traded volume overflows"));
        }
        levels.sort_by(|a, b| a.0.cmp(&b.0));
        let (price_levels, volumes) = levels.into_iter().unzip();
        Ok(Self {
            price_levels,
            volumes,
            taker_side,
        })
    }

    /// Side whose resting liquidity this trade consumed.
    #[inline]
    pub fn maker_side(&self) -> Side {
        self.taker_side.opposite()
    }

    pub fn level_count(&self) -> usize {
        self.price_levels.len()
    }

    /// Saturates for a hand-built trade; [`Trade::new`] rejects overflow.
    pub fn total_volume(&self) -> Size {
        self.volumes
            .iter()
            .fold(0, |total: Size, volume| total.saturating_add(*volume))
    }

    /// Volume-weighted average traded price, `None` if the notional does
    /// not fit in a `Price`.
    pub fn avg_price(&self) -> Option<Price> {
        let total = self.total_volume();
        if total == 0 {
            return Some(Price::ZERO);
        }
        let notional = self
            .price_levels
            .iter()
            .zip(&self.volumes)
            .try_fold(Price::ZERO, |acc, (p, v)| acc.checked_add(p.checked_mul(Price::from(*v))?))?;
        notional.checked_div(Price::from(total))
    }

    /// The level the taker hit first: the best price from the maker's side.
    pub fn first_price(&self) -> Price {
        match self.maker_side() {
            Side::Buy => self.price_levels[self.price_levels.len() - 1],
            Side::Sell => self.price_levels[0],
        }
    }

    /// The level the taker hit last.
    pub fn last_price(&self) -> Price {
        match self.maker_side() {
            Side::Buy => self.price_levels[0],
            Side::Sell => self.price_levels[self.price_levels.len() - 1],
        }
    }
}

/// Wire format: `T <taker_side> <price_1> <vol_1> [<price_2> <vol_2> ...]`
impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T {}", self.taker_side.as_flag())?;
        for (price, volume) in self.price_levels.iter().zip(&self.volumes) {
            write!(f, " {price} {volume}")?;
        }
        Ok(())
    }
}

impl FromStr for Trade {
    type Err = LobError;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = Fields::new(line);
        if fields.next_str("tag")? != "T" {
            return Err(LobError::malformed(line, "trade must start with `T`"));
        }
        let taker_side = fields.side()?;

        let mut levels = Vec::new();
        while !fields.is_exhausted() {
            let price: Price = fields.parse("price")?;
            let volume: Size = fields.parse("volume")?;
            levels.push((price, volume));
        }
        Trade::new(taker_side, levels).map_err(|err| match err {
            LobError::MalformedMessage { reason, .. } => LobError::malformed(line, reason),
            other => other,
        })
    }
}
