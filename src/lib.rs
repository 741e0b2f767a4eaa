//! # Smart-LOB
//!
//! A limit order book engine plus a reconciler for three market data feeds
//! that describe the same market at different paces.
//!
//! ## Design Principles
//!
//! - **Price-Time Priority**: best price first, oldest order first within a price
//! - **Stable Handles**: resting orders live in a generational arena, so the
//!   order index survives arena growth and whole-book copies
//! - **Explicit State**: id allocation and inference accumulators are owned
//!   values, never globals
//! - **Observed Mutations**: listeners see every accepted event before the
//!   book changes
//!
//! ## Architecture
//!
//! ```text
//!                  +--> [ground_truth]   ---orders----+
//! [feed lines] --> |--> [from_trades]    ---trades----+--> [Synchronizer]
//!   (N/C/R/T/S)    +--> [from_snapshots] ---snapshots-+         |
//!                                                         [leader selection]
//! ```

pub mod arena;
pub mod config;
pub mod error;
pub mod ids;
pub mod inference;
pub mod listener;
pub mod matching;
pub mod message;
pub mod order;
pub mod order_book;
pub mod price_level;
pub mod publish;
pub mod smart_book;
pub mod snapshot;
pub mod synchronizer;
pub mod trade;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderHandle, OrderNode, NULL_INDEX};
pub use config::{InferenceConfig, SmartBookConfig};
pub use error::{LobError, Result};
pub use ids::IdAllocator;
pub use inference::{InferenceOutcome, Placeholder, SnapshotOutcome, TradeInferenceState};
pub use listener::{
    shared, BookListener, Feed, FeedFilter, LoggingListener, SharedListener, WeakListener,
};
pub use matching::{BestMarket, Book};
pub use message::Message;
pub use order::{Order, OrderId, OrderKind, Price, Side, Size};
pub use order_book::{OneSideBook, OrderIndex, OrderInfo};
pub use price_level::PriceLevel;
pub use publish::{LeaderPublisher, LeaderReader, PublishTicket};
pub use smart_book::{Replica, SmartBookStats, SmartOrderBook};
pub use snapshot::{L2Level, LevelDiff, Snapshot};
pub use synchronizer::{SyncCounters, SyncMode, Synchronizer};
pub use trade::Trade;
