use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use std::sync::Arc;

use cashdrawer_core::{Money, SessionId, TenantId, UserId};
use cashdrawer_infra::{CashDrawer, CashDrawerConfig, EventPublisher, InMemoryLedgerStore, InMemoryOrderBook};
use cashdrawer_ledger::calculation::{aggregate, compute_totals, expected_balance};
use cashdrawer_ledger::{
    DenominationCount, DenominationTable, NewTransaction, PaymentMethod, SessionTotals, Transaction,
    TransactionType,
};

const KINDS: [TransactionType; 7] = [
    TransactionType::Sale,
    TransactionType::Sale,
    TransactionType::Tip,
    TransactionType::Refund,
    TransactionType::Expense,
    TransactionType::ManualAdd,
    TransactionType::Cancellation,
];

/// A plausible shift: mostly sales, a few tips and outflows.
fn shift(len: usize) -> Vec<Transaction> {
    let tenant = TenantId::new();
    let session = SessionId::new();
    let user = UserId::new();
    let now = Utc::now();

    (0..len)
        .map(|i| {
            let kind = KINDS[i % KINDS.len()];
            let method = PaymentMethod::ALL[i % PaymentMethod::ALL.len()];
            Transaction::record(
                tenant,
                NewTransaction {
                    session_id: session,
                    kind,
                    amount: Money::from_minor(100 + (i as i64 * 37) % 5_000),
                    description: String::new(),
                    order_id: None,
                    payment_method: Some(method),
                    created_by: user,
                },
                now,
            )
            .unwrap()
        })
        .collect()
}

fn bench_session_totals(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_totals");

    for size in [10usize, 100, 1_000, 10_000] {
        let rows = shift(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("compute_totals", size), &rows, |b, rows| {
            b.iter(|| compute_totals(black_box(rows)))
        });
        group.bench_with_input(BenchmarkId::new("expected_balance", size), &rows, |b, rows| {
            b.iter(|| expected_balance(black_box(Money::from_major(100)), black_box(rows)))
        });
    }

    group.finish();
}

fn bench_weekly_rollup(c: &mut Criterion) {
    let mut group = c.benchmark_group("weekly_rollup");

    for sessions in [7usize, 21, 90] {
        let per_session: Vec<SessionTotals> = (0..sessions).map(|_| compute_totals(&shift(200)).unwrap()).collect();
        group.throughput(Throughput::Elements(sessions as u64));
        group.bench_with_input(BenchmarkId::new("aggregate", sessions), &per_session, |b, totals| {
            b.iter(|| aggregate(black_box(totals)))
        });
    }

    group.finish();
}

fn bench_denomination_count(c: &mut Criterion) {
    let table = DenominationTable::mxn();
    let counts: Vec<DenominationCount> = table
        .denominations()
        .iter()
        .enumerate()
        .map(|(i, d)| DenominationCount::new(d.label.clone(), i as u32 + 1))
        .collect();

    c.bench_function("denomination_count_mxn", |b| {
        b.iter(|| table.count(black_box(&counts)).unwrap())
    });
}

/// Open, record, close against the in-memory store.
fn bench_full_shift(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("full_shift");
    group.sample_size(50);

    for size in [10usize, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("open_record_close", size), &size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let drawer = CashDrawer::new(
                        Arc::new(InMemoryLedgerStore::new()),
                        Arc::new(InMemoryOrderBook::new()),
                        &CashDrawerConfig::default(),
                        EventPublisher::disabled(),
                    )
                    .unwrap();
                    let tenant = TenantId::new();
                    let user = UserId::new();
                    let session = drawer
                        .sessions
                        .open(tenant, user, None, Money::from_major(100))
                        .await
                        .unwrap();
                    for i in 0..size {
                        drawer
                            .transactions
                            .create(
                                tenant,
                                NewTransaction {
                                    session_id: session.id,
                                    kind: TransactionType::Sale,
                                    amount: Money::from_minor(100 + i as i64),
                                    description: String::new(),
                                    order_id: None,
                                    payment_method: Some(PaymentMethod::Cash),
                                    created_by: user,
                                },
                            )
                            .await
                            .unwrap();
                    }
                    drawer
                        .sessions
                        .close(tenant, session.id, Money::from_major(100), None)
                        .await
                        .unwrap()
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_session_totals,
    bench_weekly_rollup,
    bench_denomination_count,
    bench_full_shift
);
criterion_main!(benches);
