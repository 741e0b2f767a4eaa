//! Smart Order Book - reconciles the order, trade and snapshot feeds.
//!
//! Three [`Book`] replicas are kept, one per feed:
//!
//! - `ground_truth` only ever sees order events
//! - `from_trades` also folds in trade prints the order feed has not
//!   explained yet
//! - `from_snapshots` also reconciles itself with every snapshot
//!
//! Every order event goes to all three replicas. After each message the
//! [`Synchronizer`] state decides which replica is the leader. While the
//! order feed is not behind, the other two replicas are snapped back to
//! `ground_truth` so guesses never outlive the facts that replace them.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::config::SmartBookConfig;
use crate::error::Result;
use crate::ids::IdAllocator;
use crate::inference::InferenceOutcome;
use crate::listener::{shared, Feed, FeedFilter, SharedListener};
use crate::matching::Book;
use crate::message::Message;
use crate::publish::{LeaderPublisher, LeaderReader};
use crate::snapshot::{LevelDiff, Snapshot};
use crate::synchronizer::{SyncCounters, SyncMode, Synchronizer};

/// Which replica is currently the leader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Replica {
    #[default]
    GroundTruth,
    FromTrades,
    FromSnapshots,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmartBookStats {
    pub orders: u64,
    pub trades: u64,
    pub snapshots: u64,
    /// Messages that failed to decode or apply
    pub rejected: u64,
    /// Trades inconsistent with the trade replica's best price, or too
    /// large to apply
    pub anomalies: u64,
    /// Times the order feed stopped leading
    pub resyncs: u64,
}

pub struct SmartOrderBook {
    ground_truth: Book,
    from_trades: Book,
    from_snapshots: Book,
    synchronizer: Arc<Mutex<Synchronizer>>,
    /// Per-replica feed filters; the replicas only hold weak references
    filters: Vec<SharedListener>,
    ids: IdAllocator,
    config: SmartBookConfig,
    leader: Replica,
    last_snapshot: Option<Snapshot>,
    stats: SmartBookStats,
    publisher: Option<LeaderPublisher>,
}

impl Default for SmartOrderBook {
    fn default() -> Self {
        Self::new(SmartBookConfig::default())
    }
}

impl SmartOrderBook {
    pub fn new(config: SmartBookConfig) -> Self {
        let synchronizer = shared(Synchronizer::new());
        let sync_listener: SharedListener = synchronizer.clone();

        let publisher = config.publish_leader.then(LeaderPublisher::new);

        let mut book = Self {
            ground_truth: Book::new(),
            from_trades: Book::new(),
            from_snapshots: Book::new(),
            synchronizer,
            filters: Vec::with_capacity(3),
            ids: IdAllocator::new(),
            config,
            leader: Replica::GroundTruth,
            last_snapshot: None,
            stats: SmartBookStats::default(),
            publisher,
        };
        book.subscribe(sync_listener);
        book
    }

    /// Run a whole message sequence through a fresh reconciler.
    ///
    /// Lines that fail to decode or apply are logged and skipped.
    pub fn from_messages<I, S>(config: SmartBookConfig, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut book = Self::new(config);
        for line in lines {
            if let Err(err) = book.apply_message(line.as_ref()) {
                warn!(%err, "message skipped");
            }
        }
        book
    }

    /// Attach an observer that sees each order, trade and snapshot once.
    ///
    /// The reconciler keeps the listener alive for its own lifetime.
    pub fn subscribe(&mut self, listener: SharedListener) {
        let replicas = [
            (Feed::Order, &mut self.ground_truth),
            (Feed::Trade, &mut self.from_trades),
            (Feed::Snapshot, &mut self.from_snapshots),
        ];
        for (feed, replica) in replicas {
            let filter: SharedListener = shared(FeedFilter::new(feed, listener.clone()));
            replica.subscribe(filter.clone());
            self.filters.push(filter);
        }
    }

    /// Decode one feed line and apply it.
    ///
    /// # Returns
    /// The sync mode after the message
    ///
    /// # Errors
    /// `MalformedMessage` if the line does not decode, or the order error
    /// `ground_truth` rejected it with. Nothing is applied in either case.
    pub fn apply_message(&mut self, line: &str) -> Result<SyncMode> {
        match Message::parse(line) {
            Ok(message) => self.apply(&message),
            Err(err) => {
                self.stats.rejected += 1;
                Err(err)
            }
        }
    }

    /// Apply an already decoded message.
    pub fn apply(&mut self, message: &Message) -> Result<SyncMode> {
        match message {
            Message::Order(order) => {
                if let Err(err) = self.ground_truth.apply_dispatch(order) {
                    self.stats.rejected += 1;
                    return Err(err);
                }
                self.stats.orders += 1;
                for replica in [&mut self.from_trades, &mut self.from_snapshots] {
                    if let Err(err) = replica.apply_dispatch(order) {
                        debug!(%err, %order, "replica rejected an order ground truth accepted");
                    }
                }
            }
            Message::Trade(trade) => {
                self.stats.trades += 1;
                let outcome = self
                    .from_trades
                    .apply_unseen_trade(trade, &mut self.ids, &self.config.inference);
                if matches!(
                    outcome,
                    InferenceOutcome::Anomaly { .. } | InferenceOutcome::Oversized { .. }
                ) {
                    self.stats.anomalies += 1;
                }
            }
            Message::Snapshot(snapshot) => {
                self.stats.snapshots += 1;
                self.from_snapshots.apply_snapshot(snapshot, &mut self.ids);
                self.last_snapshot = Some(snapshot.clone());
            }
        }

        let state = self.reconcile();
        if let Some(publisher) = &self.publisher {
            publisher.publish_copy(self.leader_book());
        }
        Ok(state)
    }

    /// Pick the leader for the current sync mode and resync the replicas.
    fn reconcile(&mut self) -> SyncMode {
        let (state, previous) = self.sync_state();

        self.leader = match state {
            SyncMode::Synchronous | SyncMode::OrderFeedLeads => {
                self.from_trades.resync_from(&self.ground_truth);
                self.from_snapshots.resync_from(&self.ground_truth);
                Replica::GroundTruth
            }
            SyncMode::TradeFeedLeads => Replica::FromTrades,
            SyncMode::SnapshotFeedLeads => Replica::FromSnapshots,
        };

        if previous == SyncMode::OrderFeedLeads && state != SyncMode::OrderFeedLeads {
            self.stats.resyncs += 1;
            debug!(to = %state, "order feed no longer leads");
        }
        state
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The replica currently trusted most; `ground_truth` when
    /// reconciliation is disabled.
    pub fn leader_book(&self) -> &Book {
        if !self.config.reconcile {
            return &self.ground_truth;
        }
        self.replica(self.leader)
    }

    pub fn leader(&self) -> Replica {
        if self.config.reconcile {
            self.leader
        } else {
            Replica::GroundTruth
        }
    }

    pub fn replica(&self, replica: Replica) -> &Book {
        match replica {
            Replica::GroundTruth => &self.ground_truth,
            Replica::FromTrades => &self.from_trades,
            Replica::FromSnapshots => &self.from_snapshots,
        }
    }

    pub fn ground_truth(&self) -> &Book {
        &self.ground_truth
    }

    pub fn from_trades(&self) -> &Book {
        &self.from_trades
    }

    pub fn from_snapshots(&self) -> &Book {
        &self.from_snapshots
    }

    /// `(current, previous)` synchronizer state.
    pub fn sync_state(&self) -> (SyncMode, SyncMode) {
        let sync = self.synchronizer.lock().unwrap_or_else(PoisonError::into_inner);
        (sync.state(), sync.previous_state())
    }

    pub fn sync_counters(&self) -> SyncCounters {
        self.synchronizer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counters()
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    /// Levels where `ground_truth` disagrees with the last snapshot
    /// (`left` is the book, `right` the snapshot).
    pub fn divergence(&self) -> Option<Vec<LevelDiff>> {
        let snapshot = self.last_snapshot.as_ref()?;
        Some(self.ground_truth.agg().diff(snapshot))
    }

    pub fn stats(&self) -> SmartBookStats {
        self.stats
    }

    pub fn config(&self) -> &SmartBookConfig {
        &self.config
    }

    /// Reader of the published leader, when publishing is enabled.
    pub fn leader_reader(&self) -> Option<LeaderReader> {
        self.publisher.as_ref().map(LeaderPublisher::reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Price;

    const SEED: [&str; 6] = [
        "N 0 1 100 1.5",
        "N 1 1 100 1.4",
        "N 2 1 200 1.4",
        "N 3 0 50 1.3",
        "N 4 0 100 1.3",
        "N 5 0 100 1.2",
    ];

    fn px(s: &str) -> Price {
        s.parse().unwrap()
    }

    #[test]
    fn test_orders_only_reach_every_replica() {
        let book = SmartOrderBook::from_messages(SmartBookConfig::default(), SEED);
        for replica in [Replica::GroundTruth, Replica::FromTrades, Replica::FromSnapshots] {
            assert_eq!(book.replica(replica).best_ask(), Some((px("1.4"), 300)));
        }
        assert_eq!(book.stats().orders, 6);
        assert_eq!(book.sync_counters().actual_order_count, 6);
    }

    #[test]
    fn test_order_feed_leads_without_snapshots() {
        let mut book = SmartOrderBook::default();
        book.apply_message(SEED[0]).unwrap();
        let state = book.apply_message(SEED[1]).unwrap();
        assert_eq!(state, SyncMode::OrderFeedLeads);
        assert_eq!(book.leader(), Replica::GroundTruth);
    }

    #[test]
    fn test_trade_feed_leads_on_unexplained_trade() {
        let mut book = SmartOrderBook::default();
        for line in SEED {
            book.apply_message(line).unwrap();
            book.apply_message(&book.ground_truth().agg().to_simple_string()).unwrap();
        }
        assert_eq!(book.sync_state().0, SyncMode::Synchronous);

        let state = book.apply_message("T 0 1.4 50").unwrap();
        assert_eq!(state, SyncMode::TradeFeedLeads);
        assert_eq!(book.leader(), Replica::FromTrades);
        assert_eq!(book.leader_book().best_ask(), Some((px("1.4"), 250)));
        assert_eq!(book.ground_truth().best_ask(), Some((px("1.4"), 300)));

        // The order feed catches up with the aggressive order behind the print
        let state = book.apply_message("N 6 0 50 1.4").unwrap();
        assert_eq!(state, SyncMode::Synchronous);
        assert_eq!(book.leader(), Replica::GroundTruth);
        assert_eq!(book.from_trades().agg(), book.ground_truth().agg());
        assert_eq!(book.leader_book().best_ask(), Some((px("1.4"), 250)));
    }

    #[test]
    fn test_snapshot_feed_leads() {
        let mut book = SmartOrderBook::default();
        for line in SEED {
            book.apply_message(line).unwrap();
            book.apply_message(&book.ground_truth().agg().to_simple_string()).unwrap();
        }
        let state = book.apply_message("S 2 2 1.2 100 1.3 150 1.4 250 1.5 100").unwrap();
        assert_eq!(state, SyncMode::SnapshotFeedLeads);
        assert_eq!(book.leader_book().best_ask(), Some((px("1.4"), 250)));

        let diffs = book.divergence().unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!((diffs[0].left, diffs[0].right), (300, 250));
    }

    #[test]
    fn test_reconcile_disabled() {
        let config = SmartBookConfig {
            reconcile: false,
            ..SmartBookConfig::default()
        };
        let mut book = SmartOrderBook::from_messages(config, SEED);
        book.apply_message("T 0 1.4 50").unwrap();
        assert_eq!(book.leader(), Replica::GroundTruth);
        assert_eq!(book.leader_book().best_ask(), Some((px("1.4"), 300)));
    }

    #[test]
    fn test_rejected_messages() {
        let mut book = SmartOrderBook::from_messages(SmartBookConfig::default(), SEED);
        assert!(book.apply_message("X 1").is_err());
        assert!(book.apply_message("N 1 0 5 1.0").is_err());
        assert_eq!(book.stats().rejected, 2);
        assert_eq!(book.stats().orders, 6);
    }

    #[test]
    fn test_publish_leader() {
        let config = SmartBookConfig {
            publish_leader: true,
            ..SmartBookConfig::default()
        };
        let mut book = SmartOrderBook::new(config);
        let reader = book.leader_reader().unwrap();
        for line in SEED {
            book.apply_message(line).unwrap();
        }
        assert_eq!(reader.load().best_ask(), Some((px("1.4"), 300)));
        assert_eq!(reader.generation(), 6);
    }
}
