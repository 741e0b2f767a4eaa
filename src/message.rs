//! Decoding of tagged feed lines.

use std::fmt;
use std::str::FromStr;

use crate::error::{LobError, Result};
use crate::order::Order;
use crate::snapshot::Snapshot;
use crate::trade::Trade;

/// One decoded message from any of the three feeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// `N`, `C` or `R` line from the order feed
    Order(Order),
    /// `T` line from the trade feed
    Trade(Trade),
    /// `S` line from the snapshot feed
    Snapshot(Snapshot),
}

impl Message {
    pub fn parse(line: &str) -> Result<Self> {
        line.parse()
    }
}

impl FromStr for Message {
    type Err = LobError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        match line.split_whitespace().next() {
            Some("N" | "C" | "R") => line.parse().map(Message::Order),
            Some("T") => line.parse().map(Message::Trade),
            Some("S") => line.parse().map(Message::Snapshot),
            Some(tag) => Err(LobError::malformed(line, format!("unknown message tag `{tag}`"))),
            None => Err(LobError::malformed(line, "empty message")),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Order(order) => write!(f, "{order}"),
            Message::Trade(trade) => write!(f, "{trade}"),
            Message::Snapshot(snapshot) => f.write_str(&snapshot.to_simple_string()),
        }
    }
}
