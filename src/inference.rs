//! Inference of unseen liquidity.
//!
//! When the trade feed or the snapshot feed runs ahead of the order feed,
//! the replica following that feed has to guess at orders it has not been
//! told about. Guessed orders are placeholders with synthetic (negative)
//! ids. The sizes are heuristic; see [`InferenceConfig`].

use arrayvec::ArrayVec;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::error::LobError;
use crate::ids::IdAllocator;
use crate::matching::Book;
use crate::order::{OrderId, Price, Side, Size};
use crate::snapshot::Snapshot;
use crate::trade::Trade;

/// A placeholder order inserted by inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placeholder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

/// What [`Book::apply_unseen_trade`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InferenceOutcome {
    /// Traded through the best price (or into an empty side): an unseen
    /// order must be resting there.
    BetterPrice {
        placeholder: Placeholder,
        /// Volume seen at this price since it was first inferred
        accumulated: Size,
    },
    /// Traded at the best price.
    AtBest {
        consumed: Size,
        placeholder: Option<Placeholder>,
    },
    /// Multi-level trade.
    Sweep {
        consumed: Size,
        placeholders: ArrayVec<Placeholder, 2>,
    },
    /// First traded price is worse than the best; the book was left alone.
    Anomaly { price: Price, best: Price },
    /// The placeholder sizes the trade implies do not fit in a `Size`; the
    /// book was left alone.
    Oversized { volume: Size },
}

impl InferenceOutcome {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, InferenceOutcome::Anomaly { .. })
    }

    pub fn as_error(&self) -> Option<LobError> {
        match *self {
            InferenceOutcome::Anomaly { price, best } => {
                Some(LobError::FeedOrderingAnomaly { price, best })
            }
            _ => None,
        }
    }

    /// Placeholders inserted by this step.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        match self {
            InferenceOutcome::BetterPrice { placeholder, .. } => vec![*placeholder],
            InferenceOutcome::AtBest { placeholder, .. } => placeholder.iter().copied().collect(),
            InferenceOutcome::Sweep { placeholders, .. } => placeholders.to_vec(),
            InferenceOutcome::Anomaly { .. } | InferenceOutcome::Oversized { .. } => Vec::new(),
        }
    }
}

/// What [`Book::apply_snapshot`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    /// Size removed with levels the snapshot no longer shows
    pub removed: Size,
    /// Size trimmed from levels larger than the snapshot's
    pub trimmed: Size,
    /// Placeholders added to levels smaller than the snapshot's
    pub added: Vec<Placeholder>,
}

impl SnapshotOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.removed == 0 && self.trimmed == 0 && self.added.is_empty()
    }
}

/// Accumulator for repeated trades at an inferred better price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Tracked {
    side: Side,
    price: Price,
    accumulated: Size,
    placeholder: OrderId,
}

/// Per-replica inference state. Reset whenever the traded price moves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TradeInferenceState {
    tracked: Option<Tracked>,
}

impl TradeInferenceState {
    pub fn clear(&mut self) {
        self.tracked = None;
    }

    /// Price currently being accumulated, if any.
    pub fn tracked_price(&self) -> Option<Price> {
        self.tracked.map(|t| t.price)
    }

    pub fn accumulated(&self) -> Size {
        self.tracked.map_or(0, |t| t.accumulated)
    }
}

impl Book {
    /// Fold a trade print the order feed has not explained yet into the book.
    ///
    /// Listeners see the trade before anything changes. A print whose first
    /// level is behind the maker side's best price is an ordering anomaly
    /// and leaves the book untouched, whether it spans one level or several.
    pub fn apply_unseen_trade(
        &mut self,
        trade: &Trade,
        ids: &mut IdAllocator,
        cfg: &InferenceConfig,
    ) -> InferenceOutcome {
        self.notify(|l, book| l.on_trade(book, trade));

        let maker = trade.maker_side();
        let first = trade.first_price();
        if let Some((best, _)) = self.best(maker) {
            if first != best && !maker.is_better(first, best) {
                warn!(price = %first, %best, side = ?maker, "trade priced behind the best level, ignored");
                return InferenceOutcome::Anomaly { price: first, best };
            }
        }

        if trade.level_count() > 1 {
            self.inference.clear();
            return self.infer_sweep(trade, ids, cfg);
        }

        let volume = trade.volumes[0];
        if let Some(outcome) = self.continue_tracked(maker, first, volume, cfg) {
            return outcome;
        }

        self.inference.clear();
        match self.best(maker) {
            Some((best, _)) if best == first => self.infer_at_best(maker, first, volume, ids, cfg),
            _ => self.infer_better_price(maker, first, volume, ids, cfg),
        }
    }

    /// Next synthetic id that is not already resting in this book.
    fn next_placeholder_id(&self, ids: &mut IdAllocator) -> OrderId {
        loop {
            let order_id = ids.next_synthetic_id();
            if !self.contains_order(order_id) {
                return order_id;
            }
        }
    }

    /// `multiplier * volume`, if that still fits on `side` with `extra`
    /// more size added alongside it.
    fn placeholder_size(&self, side: Side, multiplier: Size, volume: Size, extra: Size) -> Option<Size> {
        let size = multiplier.checked_mul(volume)?;
        (size.checked_add(extra)? <= self.headroom(side)).then_some(size)
    }

    fn oversized(volume: Size) -> InferenceOutcome {
        warn!(volume, "trade volume too large to infer from, ignored");
        InferenceOutcome::Oversized { volume }
    }

    fn infer_better_price(
        &mut self,
        maker: Side,
        price: Price,
        volume: Size,
        ids: &mut IdAllocator,
        cfg: &InferenceConfig,
    ) -> InferenceOutcome {
        let Some(size) = self.placeholder_size(maker, cfg.better_price_multiplier, volume, 0) else {
            return Self::oversized(volume);
        };
        let order_id = self.next_placeholder_id(ids);
        self.insert_resting(order_id, maker, price, size);
        self.inference.tracked = Some(Tracked {
            side: maker,
            price,
            accumulated: volume,
            placeholder: order_id,
        });
        debug!(%price, order_id, size, "inferred order at a better price");
        InferenceOutcome::BetterPrice {
            placeholder: Placeholder {
                order_id,
                side: maker,
                price,
                size,
            },
            accumulated: volume,
        }
    }

    /// Another trade at the price we are already accumulating: grow the
    /// estimate instead of treating the placeholder as confirmed liquidity.
    fn continue_tracked(
        &mut self,
        maker: Side,
        price: Price,
        volume: Size,
        cfg: &InferenceConfig,
    ) -> Option<InferenceOutcome> {
        let tracked = self.inference.tracked?;
        if tracked.side != maker || tracked.price != price {
            self.inference.clear();
            return None;
        }
        if self.best(maker).map(|(best, _)| best) != Some(price) {
            self.inference.clear();
            return None;
        }
        let Some(current) = self.query_order_id(tracked.placeholder).map(|n| n.size) else {
            self.inference.clear();
            return None;
        };

        let Some(accumulated) = tracked.accumulated.checked_add(volume) else {
            return Some(Self::oversized(volume));
        };
        let Some(size) = cfg
            .better_price_multiplier
            .checked_mul(accumulated)
            .filter(|size| *size <= self.headroom(maker).saturating_add(current))
        else {
            return Some(Self::oversized(volume));
        };

        self.remove_order(tracked.placeholder);
        self.insert_resting(tracked.placeholder, maker, price, size);
        self.inference.tracked = Some(Tracked { accumulated, ..tracked });
        debug!(%price, accumulated, size, "placeholder estimate grown");

        Some(InferenceOutcome::BetterPrice {
            placeholder: Placeholder {
                order_id: tracked.placeholder,
                side: maker,
                price,
                size,
            },
            accumulated,
        })
    }

    fn infer_at_best(
        &mut self,
        maker: Side,
        price: Price,
        volume: Size,
        ids: &mut IdAllocator,
        cfg: &InferenceConfig,
    ) -> InferenceOutcome {
        let resting = self.side(maker).level(price).map_or(0, |level| level.total_size);
        let mut placeholder = None;
        if volume >= resting {
            let Some(size) = self.placeholder_size(maker, cfg.shortfall_multiplier, volume, 0) else {
                return Self::oversized(volume);
            };
            let order_id = self.next_placeholder_id(ids);
            self.insert_resting(order_id, maker, price, size);
            debug!(%price, order_id, size, resting, "trade exceeded resting size");
            placeholder = Some(Placeholder {
                order_id,
                side: maker,
                price,
                size,
            });
        }
        let consumed = self.sweep(maker, price, volume);
        InferenceOutcome::AtBest {
            consumed,
            placeholder,
        }
    }

    fn infer_sweep(&mut self, trade: &Trade, ids: &mut IdAllocator, cfg: &InferenceConfig) -> InferenceOutcome {
        let maker = trade.maker_side();
        let total = trade.total_volume();
        let first = trade.first_price();
        let last = trade.last_price();

        // Both placeholders must fit before either goes in
        let Some(behind_size) = self.placeholder_size(maker, cfg.sweep_multiplier, total, total) else {
            return Self::oversized(total);
        };
        let mut placeholders = ArrayVec::new();

        let order_id = self.next_placeholder_id(ids);
        self.insert_resting(order_id, maker, first, total);
        placeholders.push(Placeholder {
            order_id,
            side: maker,
            price: first,
            size: total,
        });

        let consumed = self.sweep(maker, last, total);

        let behind = self.best(maker).map_or(last, |(best, _)| best);
        let order_id = self.next_placeholder_id(ids);
        self.insert_resting(order_id, maker, behind, behind_size);
        placeholders.push(Placeholder {
            order_id,
            side: maker,
            price: behind,
            size: behind_size,
        });
        debug!(%first, %last, total, consumed, "multi-level trade inferred");

        InferenceOutcome::Sweep {
            consumed,
            placeholders,
        }
    }

    /// Reconcile per-level aggregates with a snapshot.
    ///
    /// Levels the snapshot does not show are removed, surplus size is trimmed
    /// from the newest orders first, and a shortfall is covered by a
    /// placeholder at the back of the level. Afterwards `agg()` equals the
    /// snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot, ids: &mut IdAllocator) -> SnapshotOutcome {
        self.notify(|l, book| l.on_snapshot(book, snapshot));

        let mut outcome = SnapshotOutcome::default();
        for side in [Side::Buy, Side::Sell] {
            for price in self.side(side).prices() {
                if snapshot.size_at(side, price) == 0 {
                    let removed = self.remove_level(side, price);
                    outcome.removed = outcome.removed.saturating_add(removed);
                }
            }

            // Shrink before growing so the side total never exceeds the
            // snapshot's, which fits in a size
            let mut shortfalls = Vec::new();
            for (price, target) in snapshot.levels(side) {
                let current = self.side(side).level(price).map_or(0, |level| level.total_size);
                if current > target {
                    let trimmed = self.trim_newest(side, price, current - target);
                    outcome.trimmed = outcome.trimmed.saturating_add(trimmed);
                } else if current < target {
                    shortfalls.push((price, target - current));
                }
            }
            for (price, size) in shortfalls {
                let order_id = self.next_placeholder_id(ids);
                self.insert_resting(order_id, side, price, size);
                outcome.added.push(Placeholder {
                    order_id,
                    side,
                    price,
                    size,
                });
            }
        }

        if !outcome.is_unchanged() {
            debug!(
                removed = outcome.removed,
                trimmed = outcome.trimmed,
                added = outcome.added.len(),
                "book reconciled with snapshot"
            );
        }
        outcome
    }

    /// Remove `surplus` from a level, newest orders first.
    fn trim_newest(&mut self, side: Side, price: Price, mut surplus: Size) -> Size {
        let wanted = surplus;
        while surplus > 0 {
            let (book_side, arena, _) = self.parts_mut(side);
            let Some(level) = book_side.level_mut(price) else {
                break;
            };
            let Some(handle) = level.newest(arena) else {
                break;
            };
            let Some(node) = arena.get(handle) else {
                break;
            };
            let (order_id, size) = (node.order_id, node.size);

            if size <= surplus {
                surplus -= size;
                self.remove_order(order_id);
            } else {
                let removed = level.reduce(arena, handle, surplus);
                book_side.sub_size(removed);
                surplus -= removed;
            }
        }
        wanted - surplus
    }

    /// Number of resting placeholder orders.
    pub fn placeholder_count(&self) -> usize {
        [Side::Buy, Side::Sell]
            .into_iter()
            .flat_map(|side| self.side(side).iter())
            .flat_map(|level| level.iter(self.arena()))
            .filter(|node| node.order_id < 0)
            .count()
    }
}
