//! Feed synchronizer - which feed is ahead.
//!
//! The order feed implies how many trades and snapshots should have been
//! seen: every aggressive order implies one trade print, and every order
//! event implies one snapshot change. Comparing those implied counts with
//! what the trade and snapshot feeds actually delivered tells which feed
//! is running ahead of the others.

use std::fmt;

use tracing::debug;

use crate::listener::BookListener;
use crate::matching::Book;
use crate::order::Order;
use crate::snapshot::Snapshot;
use crate::trade::Trade;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// All feeds agree
    #[default]
    Synchronous,
    OrderFeedLeads,
    TradeFeedLeads,
    SnapshotFeedLeads,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Synchronous => "synchronous",
            SyncMode::OrderFeedLeads => "order feed leads",
            SyncMode::TradeFeedLeads => "trade feed leads",
            SyncMode::SnapshotFeedLeads => "snapshot feed leads",
        })
    }
}

/// Event counters of a [`Synchronizer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncCounters {
    pub actual_order_count: u64,
    /// Trades implied by aggressive orders
    pub actual_trade_count: u64,
    /// Snapshot changes implied by order events
    pub actual_snapshot_count: u64,
    pub received_trade_count: u64,
    pub received_snapshot_count: u64,
}

/// Lead/lag state machine. Attach it to books as a [`BookListener`].
#[derive(Clone, Debug, Default)]
pub struct Synchronizer {
    counters: SyncCounters,
    state: SyncMode,
    previous: SyncMode,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> SyncMode {
        self.state
    }

    /// State before the most recent event.
    #[inline]
    pub fn previous_state(&self) -> SyncMode {
        self.previous
    }

    #[inline]
    pub fn counters(&self) -> SyncCounters {
        self.counters
    }

    fn transition(&mut self, next: SyncMode) {
        if next != self.state {
            debug!(from = %self.state, to = %next, "sync mode changed");
        }
        self.previous = self.state;
        self.state = next;
    }

    pub fn on_order_event(&mut self, is_aggressive: bool) {
        let c = &mut self.counters;
        c.actual_order_count += 1;
        c.actual_snapshot_count += 1;
        if is_aggressive {
            c.actual_trade_count += 1;
        }

        let next = if c.actual_order_count > c.received_snapshot_count + 1
            && c.actual_order_count > c.actual_trade_count + 1
        {
            SyncMode::OrderFeedLeads
        } else {
            SyncMode::Synchronous
        };
        self.transition(next);
    }

    pub fn on_trade_event(&mut self) {
        let c = &mut self.counters;
        c.received_trade_count += 1;
        let next = if c.actual_trade_count < c.received_trade_count {
            SyncMode::TradeFeedLeads
        } else {
            SyncMode::Synchronous
        };
        self.transition(next);
    }

    pub fn on_snapshot_event(&mut self) {
        let c = &mut self.counters;
        c.received_snapshot_count += 1;
        let next = if c.actual_snapshot_count < c.received_snapshot_count {
            SyncMode::SnapshotFeedLeads
        } else {
            SyncMode::Synchronous
        };
        self.transition(next);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl BookListener for Synchronizer {
    fn on_order(&mut self, book: &Book, order: &Order) {
        self.on_order_event(book.is_aggressive(order));
    }

    fn on_trade(&mut self, _book: &Book, _trade: &Trade) {
        self.on_trade_event();
    }

    fn on_snapshot(&mut self, _book: &Book, _snapshot: &Snapshot) {
        self.on_snapshot_event();
    }
}
