//! Leader publication.
//!
//! Readers on other threads get the leader book as an immutable
//! `Arc<Book>` that is swapped in whole, so a partially updated replica is
//! never visible. Every publish attempt first takes a generation ticket;
//! installing a copy built under an older ticket than the newest one issued
//! is refused, which abandons a resync that a newer one has superseded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::matching::Book;

/// Generation ticket from [`LeaderPublisher::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PublishTicket(u64);

impl PublishTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

struct Shared {
    issued: AtomicU64,
    installed: AtomicU64,
    current: RwLock<Arc<Book>>,
}

/// Write side. Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct LeaderPublisher {
    shared: Arc<Shared>,
}

/// Read side.
#[derive(Clone)]
pub struct LeaderReader {
    shared: Arc<Shared>,
}

impl Default for LeaderPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderPublisher {
    /// Start with an empty book published at generation 0.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                issued: AtomicU64::new(0),
                installed: AtomicU64::new(0),
                current: RwLock::new(Arc::new(Book::new())),
            }),
        }
    }

    pub fn reader(&self) -> LeaderReader {
        LeaderReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take a ticket for a publish about to be prepared.
    pub fn begin(&self) -> PublishTicket {
        PublishTicket(self.shared.issued.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Install `book` if no newer ticket has been issued since `ticket`.
    ///
    /// # Returns
    /// `false` if the publish was superseded and dropped
    pub fn publish(&self, ticket: PublishTicket, book: Book) -> bool {
        if ticket.0 != self.shared.issued.load(Ordering::Acquire) {
            trace!(generation = ticket.0, "stale leader publish dropped");
            return false;
        }
        let book = Arc::new(book);
        let mut current = self.shared.current.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the lock: a newer ticket may have installed meanwhile
        if ticket.0 < self.shared.installed.load(Ordering::Acquire) {
            return false;
        }
        *current = book;
        self.shared.installed.store(ticket.0, Ordering::Release);
        true
    }

    /// Take a ticket and publish a copy of `book` under it.
    pub fn publish_copy(&self, book: &Book) -> bool {
        let ticket = self.begin();
        self.publish(ticket, book.clone())
    }
}

impl LeaderReader {
    /// The most recently installed leader.
    pub fn load(&self) -> Arc<Book> {
        Arc::clone(&self.shared.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Generation of the installed leader (0 before the first publish).
    pub fn generation(&self) -> u64 {
        self.shared.installed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Order;

    fn book_with(line: &str) -> Book {
        let order: Order = line.parse().unwrap();
        Book::from_orders([&order]).unwrap()
    }

    #[test]
    fn test_initial_leader_is_empty() {
        let publisher = LeaderPublisher::new();
        let reader = publisher.reader();
        assert!(reader.load().is_empty());
        assert_eq!(reader.generation(), 0);
    }

    #[test]
    fn test_publish_installs() {
        let publisher = LeaderPublisher::new();
        let reader = publisher.reader();
        assert!(publisher.publish_copy(&book_with("N 0 0 10 1.0")));
        assert_eq!(reader.load().order_count(), 1);
        assert_eq!(reader.generation(), 1);
    }

    #[test]
    fn test_superseded_publish_is_dropped() {
        let publisher = LeaderPublisher::new();
        let reader = publisher.reader();

        let old = publisher.begin();
        let new = publisher.begin();
        assert!(publisher.publish(new, book_with("N 1 0 10 1.0")));
        assert!(!publisher.publish(old, book_with("N 0 0 10 1.0")));

        let leader = reader.load();
        assert!(leader.contains_order(1));
        assert!(!leader.contains_order(0));
    }

    #[test]
    fn test_reader_keeps_old_copy_alive() {
        let publisher = LeaderPublisher::new();
        let reader = publisher.reader();
        publisher.publish_copy(&book_with("N 0 0 10 1.0"));

        let held = reader.load();
        publisher.publish_copy(&Book::new());
        assert_eq!(held.order_count(), 1);
        assert!(reader.load().is_empty());
    }

    #[test]
    fn test_publish_from_worker_thread() {
        let publisher = LeaderPublisher::new();
        let reader = publisher.reader();
        let worker = publisher.clone();
        let ticket = publisher.begin();

        let handle = std::thread::spawn(move || worker.publish(ticket, book_with("N 5 1 10 2.0")));
        assert!(handle.join().unwrap());
        assert!(reader.load().contains_order(5));
    }
}
