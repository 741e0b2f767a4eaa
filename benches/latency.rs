//! Benchmark harness using Criterion for latency measurement.
//!
//! Measures:
//! - Place order (no match)
//! - Place order (full match)
//! - Cancel order
//! - Trade inference on the trade replica
//! - Mixed message feed through the smart book

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use smart_lob::{
    Book, IdAllocator, InferenceConfig, Order, OrderId, Price, Side, SmartBookConfig,
    SmartOrderBook, Trade,
};

fn px(cents: i64) -> Price {
    Price::new(cents, 2)
}

/// Generate a random Normal order around 100.00
fn random_order(rng: &mut ChaCha8Rng, order_id: OrderId) -> Order {
    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
    Order::normal(order_id, side, rng.gen_range(1..1000), px(rng.gen_range(9_900..10_100)))
}

/// Benchmark: Place order that rests (no matching)
fn bench_place_no_match(c: &mut Criterion) {
    let mut book = Book::with_capacity(100_000);
    let mut order_id: OrderId = 0;

    c.bench_function("place_no_match", |b| {
        b.iter(|| {
            order_id += 1;
            // Below any asks, spread over a few hundred levels
            let order = Order::normal(order_id, Side::Buy, 100, px(9_000 - order_id % 500));
            black_box(book.apply(&order))
        })
    });
}

/// Benchmark: Place order that fully matches
fn bench_place_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_full_match");

    for depth in [1i64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut book = Book::with_capacity(100_000);
            for id in 0..depth {
                book.apply(&Order::normal(id, Side::Sell, 100, px(10_000))).unwrap_or(false);
            }

            let mut order_id: OrderId = 1_000;
            b.iter(|| {
                order_id += 2;
                let result = book.apply(&Order::normal(order_id, Side::Buy, 100, px(10_000)));
                // Replenish the matched order
                book.apply(&Order::normal(order_id + 1, Side::Sell, 100, px(10_000)))
                    .unwrap_or(false);
                black_box(result)
            })
        });
    }

    group.finish();
}

/// Benchmark: Cancel order
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100i64, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(book_size), book_size, |b, &book_size| {
            let mut book = Book::with_capacity(100_000);
            let place = |book: &mut Book, id: OrderId| {
                let (side, price) = if id % 2 == 0 {
                    (Side::Buy, px(9_000 + id % 100))
                } else {
                    (Side::Sell, px(11_000 + id % 100))
                };
                book.apply(&Order::normal(id, side, 100, price)).unwrap_or(false)
            };
            for id in 0..book_size {
                place(&mut book, id);
            }

            let mut cancel_id: OrderId = 0;
            let mut next_order_id = book_size;
            b.iter(|| {
                let result = book.cancel(&Order::cancel(-1, cancel_id));
                // Replenish
                place(&mut book, next_order_id);
                cancel_id += 1;
                next_order_id += 1;
                black_box(result)
            })
        });
    }

    group.finish();
}

/// Benchmark: Unseen trade at the best ask of a seeded replica
fn bench_trade_inference(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(0xCAFEBABE);
    let mut seeded = Book::with_capacity(10_000);
    for id in 0..5_000 {
        seeded.apply(&random_order(&mut rng, id)).unwrap_or(false);
    }
    let config = InferenceConfig::default();

    c.bench_function("trade_inference_at_best", |b| {
        let mut book = seeded.clone();
        let mut ids = IdAllocator::new();
        b.iter(|| {
            let Some((price, _)) = book.best_ask() else {
                book.resync_from(&seeded);
                return;
            };
            let Ok(trade) = Trade::new(Side::Buy, vec![(price, 1)]) else {
                return;
            };
            black_box(book.apply_unseen_trade(&trade, &mut ids, &config));
        })
    });
}

/// Benchmark: Mixed message feed (orders, snapshots and trade prints)
fn bench_smart_book_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("smart_book_feed");
    group.throughput(criterion::Throughput::Elements(1_000));

    let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
    let mut shadow = Book::new();
    let mut feed = Vec::with_capacity(3_000);
    for id in 0..1_000 {
        let order = random_order(&mut rng, id);
        if rng.gen_bool(0.1) {
            if let Some((price, size)) = shadow.best(order.side.opposite()) {
                if shadow.is_aggressive(&order) {
                    feed.push(format!("T {} {price} {}", order.side.as_flag(), size.min(order.size)));
                }
            }
        }
        shadow.apply(&order).unwrap_or(false);
        feed.push(order.to_string());
        if rng.gen_bool(0.5) {
            feed.push(shadow.agg().to_simple_string());
        }
    }

    group.bench_function("1000_orders", |b| {
        b.iter(|| {
            let mut smart = SmartOrderBook::new(SmartBookConfig::default());
            for line in &feed {
                black_box(smart.apply_message(line)).unwrap_or_default();
            }
            black_box(smart.stats().resyncs)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_place_no_match,
    bench_place_full_match,
    bench_cancel,
    bench_trade_inference,
    bench_smart_book_feed,
);
criterion_main!(benches);
