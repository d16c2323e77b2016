//! Exchange performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use item_lob::market_data_gen::{Generator, GeneratorConfig};
use item_lob::{
    replay_into_exchange, AccountId, EngineConfig, Exchange, ItemId, LimitOrderRequest, OrderId,
    OrderLocator, PriceTree, Side,
};

fn exchange() -> Exchange {
    let exchange = Exchange::new(EngineConfig::default()).unwrap();
    exchange.set_token_policy(AccountId(0), ItemId(1), 1, 1).unwrap();
    exchange
}

fn bench_place_throughput(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("exchange");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("replay_1000", |b| {
        b.iter_batched(
            || {
                let config = GeneratorConfig { seed: 42, num_orders: N, ..Default::default() };
                (exchange(), Generator::new(config).all_orders())
            },
            |(exchange, orders)| {
                replay_into_exchange(&exchange, orders).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    const RESTING: usize = 500;
    const CANCELS_PER_ITER: usize = 100;
    let mut group = c.benchmark_group("exchange");
    group.throughput(Throughput::Elements(CANCELS_PER_ITER as u64));
    group.bench_function("cancel_100_after_500_resting", |b| {
        b.iter_batched(
            || {
                let exchange = exchange();
                let mut resting: Vec<(OrderId, OrderLocator)> = Vec::with_capacity(RESTING);
                for i in 0..RESTING as u64 {
                    let request = LimitOrderRequest {
                        side: Side::Buy,
                        item_id: ItemId(1),
                        price: 100 + i % 10,
                        quantity: 1,
                    };
                    let outcome = exchange.place_limit_orders(AccountId(1), &[request]).unwrap().remove(0);
                    if let (Some(id), Some(price)) = (outcome.order_id(), outcome.rest_price()) {
                        resting.push((id, OrderLocator { side: Side::Buy, item_id: ItemId(1), price }));
                    }
                }
                // cancel from the back of each level: the shifting path
                resting.reverse();
                resting.truncate(CANCELS_PER_ITER);
                (exchange, resting)
            },
            |(exchange, resting)| {
                for (id, locator) in resting {
                    exchange.cancel_orders(AccountId(1), &[id], &[locator]).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_sweep_deep_level(c: &mut Criterion) {
    const DEPTH: u32 = 100;
    let mut group = c.benchmark_group("exchange");
    group.throughput(Throughput::Elements(u64::from(DEPTH)));
    group.bench_function("sweep_100_orders_one_level", |b| {
        b.iter_batched(
            || {
                let exchange = exchange();
                let sells: Vec<_> = (0..DEPTH)
                    .map(|_| LimitOrderRequest { side: Side::Sell, item_id: ItemId(1), price: 100, quantity: 1 })
                    .collect();
                exchange.place_limit_orders(AccountId(1), &sells).unwrap();
                exchange
            },
            |exchange| {
                let buy = LimitOrderRequest { side: Side::Buy, item_id: ItemId(1), price: 100, quantity: DEPTH };
                exchange.place_limit_orders(AccountId(2), &[buy]).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_batch_on_deep_book(c: &mut Criterion) {
    const PRICES: u64 = 2_000;
    const PER_PRICE: u32 = 50;
    let exchange = exchange();
    for price in 1..=PRICES {
        let bids: Vec<_> = (0..PER_PRICE)
            .map(|_| LimitOrderRequest { side: Side::Buy, item_id: ItemId(1), price, quantity: 1 })
            .collect();
        exchange.place_limit_orders(AccountId(1), &bids).unwrap();
    }

    let mut group = c.benchmark_group("exchange");
    group.throughput(Throughput::Elements(2));
    group.bench_function("batch_of_2_on_100k_resting", |b| {
        let ask = |price| LimitOrderRequest { side: Side::Sell, item_id: ItemId(1), price, quantity: 1 };
        let locator = |price| OrderLocator { side: Side::Sell, item_id: ItemId(1), price };
        b.iter(|| {
            let outcomes = exchange
                .place_limit_orders(AccountId(2), &[ask(PRICES + 10), ask(PRICES + 20)])
                .unwrap();
            let ids: Vec<OrderId> = outcomes.iter().filter_map(|o| o.order_id()).collect();
            exchange
                .cancel_orders(AccountId(2), &ids, &[locator(PRICES + 10), locator(PRICES + 20)])
                .unwrap();
        })
    });
    group.finish();
}

fn bench_price_tree(c: &mut Criterion) {
    const PRICES: u64 = 10_000;
    let mut group = c.benchmark_group("price_tree");
    group.throughput(Throughput::Elements(PRICES));
    group.bench_function("insert_remove_10000", |b| {
        b.iter(|| {
            let mut tree = PriceTree::new();
            for p in 0..PRICES {
                tree.insert(p.wrapping_mul(7919) % 100_003);
            }
            for p in 0..PRICES {
                tree.remove(p.wrapping_mul(7919) % 100_003);
            }
            tree.allocated()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_place_throughput,
    bench_cancel,
    bench_sweep_deep_level,
    bench_batch_on_deep_book,
    bench_price_tree
);
criterion_main!(benches);
