use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use stockmove_core::{Actor, AggregateId, UserId};
use stockmove_events::{EventEnvelope, InMemoryEventBus};
use stockmove_infra::{
    EngineSettings, InMemoryMasterData, InMemoryTransferStore, InventoryStockProjection, NewLine,
    NewTransaction, ReceiptSubmission, StoredEvent, TransferEngine,
};
use stockmove_inventory::{EquipmentId, ItemTypeId, StockLocation, WarehouseId};
use stockmove_transfers::{InitiatingParty, Party, Transaction};

type Engine = TransferEngine<
    Arc<InMemoryTransferStore>,
    Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
    Arc<InMemoryMasterData>,
>;

struct Setup {
    engine: Engine,
    warehouse: WarehouseId,
    equipment: EquipmentId,
    item_types: Vec<ItemTypeId>,
}

fn setup(item_types: usize) -> Setup {
    let master = Arc::new(InMemoryMasterData::new());
    let warehouse = WarehouseId::new(AggregateId::new());
    let equipment = EquipmentId::new(AggregateId::new());
    master.add_warehouse(warehouse);
    master.add_equipment(equipment);
    let item_types: Vec<_> = (0..item_types)
        .map(|_| {
            let id = ItemTypeId::new(AggregateId::new());
            master.add_item_type(id);
            id
        })
        .collect();

    let engine = TransferEngine::new(
        Arc::new(InMemoryTransferStore::new()),
        Arc::new(InMemoryEventBus::new()),
        master,
        EngineSettings::default(),
    );
    Setup {
        engine,
        warehouse,
        equipment,
        item_types,
    }
}

fn actor() -> Actor {
    Actor::new(UserId::new(), "Bench Operator")
}

fn create(s: &Setup, quantity: i64) -> Transaction {
    s.engine
        .create_transaction(NewTransaction {
            sender: Party::Warehouse(s.warehouse),
            receiver: Party::Equipment(s.equipment),
            items: s
                .item_types
                .iter()
                .map(|&item_type| NewLine { item_type, quantity })
                .collect(),
            transfer_date: Utc::now(),
            actor: actor(),
            batch_number: None,
            initiated_by: InitiatingParty::Sender,
            purpose_hint: None,
        })
        .unwrap()
}

/// Every other line comes up one short.
fn receipt(tx: &Transaction) -> ReceiptSubmission {
    let received: BTreeMap<_, _> = tx
        .lines()
        .iter()
        .enumerate()
        .map(|(i, line)| (line.id_typed(), line.quantity() - (i as i64 % 2)))
        .collect();
    ReceiptSubmission {
        transaction_id: tx.id_typed(),
        received,
        not_received: BTreeMap::new(),
        actor: actor(),
        comment: String::new(),
        purpose: None,
    }
}

fn bench_acceptance_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("acceptance_latency");

    for lines in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::new("create_and_accept", lines), &lines, |b, &lines| {
            let s = setup(lines);
            b.iter(|| {
                let tx = create(&s, black_box(20));
                black_box(s.engine.accept_transaction(receipt(&tx)).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for transactions in [10usize, 100, 500] {
        let s = setup(5);
        for _ in 0..transactions {
            let tx = create(&s, 20);
            s.engine.accept_transaction(receipt(&tx)).unwrap();
        }
        let log = s.engine.events_after(0).unwrap();
        group.throughput(Throughput::Elements(log.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("replay_log", transactions),
            &log,
            |b, log| {
                b.iter(|| {
                    let projection = InventoryStockProjection::new();
                    projection
                        .rebuild_from_scratch(log.iter().map(StoredEvent::to_envelope))
                        .unwrap();
                    black_box(projection);
                });
            },
        );
    }

    group.finish();
}

fn bench_stock_accuracy_check(c: &mut Criterion) {
    let s = setup(5);
    for _ in 0..100 {
        let tx = create(&s, 20);
        s.engine.accept_transaction(receipt(&tx)).unwrap();
    }
    let location = StockLocation::Equipment(s.equipment);
    let item_type = s.item_types[1];

    c.bench_function("validate_stock_accuracy", |b| {
        b.iter(|| {
            assert!(
                s.engine
                    .validate_stock_accuracy(black_box(location), item_type)
                    .unwrap()
            );
        });
    });
}

criterion_group!(
    benches,
    bench_acceptance_latency,
    bench_projection_rebuild_speed,
    bench_stock_accuracy_check
);
criterion_main!(benches);
