//! Book observers.
//!
//! A [`BookListener`] is notified of every accepted event a [`Book`]
//! receives, before the book mutates. The caller owns each listener as a
//! [`SharedListener`]; books keep only a [`WeakListener`] to it, so dropping
//! the owner detaches the listener from every book it observed.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::info;

use crate::matching::Book;
use crate::order::{Order, OrderKind};
use crate::snapshot::Snapshot;
use crate::trade::Trade;

/// Observer of order, trade and snapshot events. Every method defaults to
/// ignoring the event.
pub trait BookListener: Send {
    fn on_order(&mut self, _book: &Book, _order: &Order) {}

    fn on_trade(&mut self, _book: &Book, _trade: &Trade) {}

    fn on_snapshot(&mut self, _book: &Book, _snapshot: &Snapshot) {}
}

/// Owning listener reference held by whoever attached the listener.
pub type SharedListener = Arc<Mutex<dyn BookListener>>;

/// Non-owning listener reference held by a book.
pub type WeakListener = Weak<Mutex<dyn BookListener>>;

/// Wrap a listener so it can be attached to books while the caller keeps
/// typed access to it.
pub fn shared<L: BookListener + 'static>(listener: L) -> Arc<Mutex<L>> {
    Arc::new(Mutex::new(listener))
}

/// Run `f` against a listener, tolerating a poisoned lock.
pub(crate) fn with_listener(listener: &SharedListener, f: impl FnOnce(&mut dyn BookListener)) {
    let mut guard = listener.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut *guard);
}

/// The three market data feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feed {
    Order,
    Trade,
    Snapshot,
}

/// Forwards only one feed's events to the wrapped listener.
///
/// Used when a listener observes several books that all receive order
/// events but should count each feed from exactly one book.
pub struct FeedFilter {
    feed: Feed,
    inner: SharedListener,
}

impl FeedFilter {
    pub fn new(feed: Feed, inner: SharedListener) -> Self {
        Self { feed, inner }
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }
}

impl BookListener for FeedFilter {
    fn on_order(&mut self, book: &Book, order: &Order) {
        if self.feed == Feed::Order {
            with_listener(&self.inner, |l| l.on_order(book, order));
        }
    }

    fn on_trade(&mut self, book: &Book, trade: &Trade) {
        if self.feed == Feed::Trade {
            with_listener(&self.inner, |l| l.on_trade(book, trade));
        }
    }

    fn on_snapshot(&mut self, book: &Book, snapshot: &Snapshot) {
        if self.feed == Feed::Snapshot {
            with_listener(&self.inner, |l| l.on_snapshot(book, snapshot));
        }
    }
}

/// Logs every event it observes at `info` level.
#[derive(Debug, Default)]
pub struct LoggingListener {
    pub events_seen: u64,
}

impl BookListener for LoggingListener {
    fn on_order(&mut self, _book: &Book, order: &Order) {
        self.events_seen += 1;
        match order.kind {
            OrderKind::Normal => info!(%order, "order added"),
            OrderKind::Cancel { ref_id } => info!(%order, ref_id, "order cancelled"),
            OrderKind::Reprice { ref_id, .. } => info!(%order, ref_id, "order repriced"),
        }
    }

    fn on_trade(&mut self, _book: &Book, trade: &Trade) {
        self.events_seen += 1;
        info!(%trade, "trade received");
    }

    fn on_snapshot(&mut self, _book: &Book, snapshot: &Snapshot) {
        self.events_seen += 1;
        info!(snapshot = %snapshot.to_simple_string(), "snapshot received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        orders: u32,
        trades: u32,
        snapshots: u32,
    }

    impl BookListener for Counter {
        fn on_order(&mut self, _book: &Book, _order: &Order) {
            self.orders += 1;
        }
        fn on_trade(&mut self, _book: &Book, _trade: &Trade) {
            self.trades += 1;
        }
        fn on_snapshot(&mut self, _book: &Book, _snapshot: &Snapshot) {
            self.snapshots += 1;
        }
    }

    #[test]
    fn test_feed_filter_forwards_one_feed() {
        let counter = shared(Counter::default());
        let mut filter = FeedFilter::new(Feed::Trade, counter.clone());
        let book = Book::new();

        filter.on_order(&book, &"N 0 0 10 1.0".parse().unwrap());
        filter.on_trade(&book, &"T 0 1.0 10".parse().unwrap());
        filter.on_snapshot(&book, &Snapshot::new());

        let counter = counter.lock().unwrap();
        assert_eq!(counter.orders, 0);
        assert_eq!(counter.trades, 1);
        assert_eq!(counter.snapshots, 0);
    }

    #[test]
    fn test_logging_listener_counts() {
        let mut logger = LoggingListener::default();
        let book = Book::new();
        logger.on_order(&book, &"N 0 0 10 1.0".parse().unwrap());
        logger.on_order(&book, &"C 1 0 0 0 0 0 0".parse().unwrap());
        assert_eq!(logger.events_seen, 2);
    }
}
