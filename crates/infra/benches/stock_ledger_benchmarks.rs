use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use stockledger_core::{ProductId, TenantId};
use stockledger_infra::{InMemoryStockStore, StockLedger};
use stockledger_inventory::{MovementFilter, MovementKind, MovementMeta, StockKey};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

fn seeded_ledger(
    rt: &Runtime,
    products: usize,
    quantity: i64,
) -> (StockLedger<InMemoryStockStore>, Vec<StockKey>) {
    let ledger = StockLedger::new(InMemoryStockStore::new());
    let tenant_id = TenantId::new();
    let keys: Vec<_> = (0..products)
        .map(|_| StockKey::new(tenant_id, ProductId::new()))
        .collect();

    rt.block_on(async {
        for key in &keys {
            ledger
                .receive(*key, quantity, MovementMeta::new(), None)
                .await
                .expect("seed stock");
        }
    });
    (ledger, keys)
}

fn bench_operation_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("operation_latency");

    let (ledger, keys) = seeded_ledger(&rt, 1, i64::MAX / 2);
    let key = keys[0];

    group.bench_function("reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.reserve(black_box(key), 1).await.expect("reserve");
                ledger.release(black_box(key), 1).await.expect("release");
            })
        })
    });

    group.bench_function("reserve_confirm", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.reserve(black_box(key), 1).await.expect("reserve");
                ledger
                    .confirm(black_box(key), 1, MovementMeta::new(), None)
                    .await
                    .expect("confirm")
            })
        })
    });

    group.bench_function("update_stock_in", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .update_stock(black_box(key), 1, MovementKind::In, MovementMeta::new(), None)
                    .await
                    .expect("update")
            })
        })
    });

    group.finish();
}

fn bench_movement_queries(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("movement_queries");

    for history in [100usize, 1_000, 10_000].iter() {
        let (ledger, keys) = seeded_ledger(&rt, 1, 0);
        let key = keys[0];
        rt.block_on(async {
            for _ in 1..*history {
                ledger
                    .receive(key, 1, MovementMeta::new(), None)
                    .await
                    .expect("receive");
            }
        });

        group.throughput(Throughput::Elements(*history as u64));
        group.bench_with_input(BenchmarkId::new("summary", history), history, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let filter = MovementFilter::for_product(key.product_id);
                    ledger
                        .movement_summary(key.tenant_id, &filter)
                        .await
                        .expect("summary")
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_operation_latency, bench_movement_queries);
criterion_main!(benches);
