//! Replay - feed a message file through the smart order book.
//!
//! Reads one message per line (`N`, `C`, `R`, `T` or `S`), applies them in
//! order and prints the resulting leader book. Optionally writes the
//! leader's L2 levels to CSV. With `--plain` only order messages are
//! replayed, through a single book with no reconciliation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::Parser;
use smart_lob::{Book, LoggingListener, Message, SmartBookConfig, SmartOrderBook};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay order, trade and snapshot messages through the smart order book")]
struct Cli {
    /// Message file, one message per line
    #[arg(long)]
    sim_file: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the leader's L2 levels to this CSV file
    #[arg(long)]
    csv_out: Option<PathBuf>,

    /// Always report the order-feed replica
    #[arg(long)]
    no_reconcile: bool,

    /// Log every event as it is applied
    #[arg(long)]
    log_events: bool,

    /// Replay only the order feed through a plain book
    #[arg(long)]
    plain: bool,
}

/// Order messages only; trades and snapshots are counted and skipped.
fn replay_plain(cli: &Cli) -> Result<Book, Box<dyn std::error::Error>> {
    let mut book = Book::new();
    let listener = smart_lob::shared(LoggingListener::default());
    if cli.log_events {
        book.subscribe(listener.clone());
    }

    let (mut applied, mut skipped) = (0u64, 0u64);
    let reader = BufReader::new(File::open(&cli.sim_file)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match Message::parse(&line) {
            Ok(Message::Order(order)) => match book.apply_dispatch(&order) {
                Ok(_) => applied += 1,
                Err(err) => warn!(line = line_no + 1, %err, "order skipped"),
            },
            Ok(_) => skipped += 1,
            Err(err) => warn!(line = line_no + 1, %err, "message skipped"),
        }
    }
    info!(applied, skipped, "plain replay finished");
    Ok(book)
}

fn write_csv(book: &Book, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in book.agg().rows() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), "L2 levels written");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.plain {
        info!(sim_file = %cli.sim_file.display(), "starting plain replay");
        let book = replay_plain(&cli)?;
        println!("{book}");
        if let Some(path) = &cli.csv_out {
            write_csv(&book, path)?;
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => SmartBookConfig::from_json_file(path)?,
        None => SmartBookConfig::default(),
    };
    if cli.no_reconcile {
        config.reconcile = false;
    }
    info!(sim_file = %cli.sim_file.display(), ?config, "starting replay");

    let mut book = SmartOrderBook::new(config);
    if cli.log_events {
        book.subscribe(smart_lob::shared(LoggingListener::default()));
    }

    let reader = BufReader::new(File::open(&cli.sim_file)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = book.apply_message(&line) {
            warn!(line = line_no + 1, %err, "message skipped");
        }
    }

    let stats = book.stats();
    let (state, _) = book.sync_state();
    info!(
        orders = stats.orders,
        trades = stats.trades,
        snapshots = stats.snapshots,
        rejected = stats.rejected,
        anomalies = stats.anomalies,
        resyncs = stats.resyncs,
        %state,
        leader = ?book.leader(),
        "replay finished"
    );
    if let Some(diffs) = book.divergence() {
        if !diffs.is_empty() {
            warn!(levels = diffs.len(), "order feed disagrees with the last snapshot");
        }
    }

    let leader = book.leader_book();
    println!("{leader}");

    if let Some(path) = &cli.csv_out {
        write_csv(leader, path)?;
    }

    Ok(())
}
