use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use smart_lob::{Book, Order, Price, Side, SmartBookConfig, SmartOrderBook};

/// Build a mixed feed: orders cycling around a mid price, the snapshot
/// after most orders, and a trade print every so often.
fn generate_feed(count: usize) -> Vec<String> {
    let mut shadow = Book::new();
    let mut lines = Vec::with_capacity(count + count / 2);
    let mut order_id: i64 = 0;

    while lines.len() < count {
        let side = if order_id % 2 == 0 { Side::Sell } else { Side::Buy };
        let ticks = (order_id * 7) % 41 - 20;
        let price = Price::new(10_000 + ticks, 2);
        let size = 10 + (order_id % 50) as u64;
        let order = Order::normal(order_id, side, size, price);
        order_id += 1;

        if shadow.apply(&order).is_ok() {
            lines.push(order.to_string());
            if order_id % 3 != 0 {
                lines.push(shadow.agg().to_simple_string());
            }
        }
        if order_id % 20 == 0 {
            if let Some((price, _)) = shadow.best_ask() {
                lines.push(format!("T 0 {price} 1"));
            }
        }
    }
    lines
}

fn main() {
    println!("Preparing Latency Benchmark...");

    const MESSAGES: usize = 200_000;
    let feed = generate_feed(MESSAGES);
    let mut book = SmartOrderBook::new(SmartBookConfig::default());

    let mut histogram = match Histogram::<u64>::new_with_bounds(1, 10_000_000, 3) {
        Ok(h) => h,
        Err(err) => {
            eprintln!("cannot create histogram: {err}");
            return;
        }
    };

    println!("Running {} messages...", feed.len());

    let mut total_duration = Duration::ZERO;
    let mut errors = 0u64;
    for line in &feed {
        // Critical measurement section
        let start = Instant::now();
        let result = std::hint::black_box(book.apply_message(line));
        let elapsed = start.elapsed();

        if result.is_err() {
            errors += 1;
        }
        // Outliers beyond the histogram bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
    }

    let stats = book.stats();
    println!("\n=== Latency Report (ns) ===");
    println!("Total Msgs: {}", feed.len());
    println!("Orders:     {}", stats.orders);
    println!("Trades:     {}", stats.trades);
    println!("Snapshots:  {}", stats.snapshots);
    println!("Resyncs:    {}", stats.resyncs);
    println!("Errors:     {}", errors);
    println!("Throughput: {:.2} msgs/sec", feed.len() as f64 / total_duration.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:8} ns", histogram.min());
    println!("P50:    {:8} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:8} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:8} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:8} ns", histogram.value_at_quantile(0.999));
    println!("Max:    {:8} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(1_000, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
}
