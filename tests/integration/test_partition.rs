// Copyright © 2024 Pathway

use std::collections::HashMap;

use assert_matches::assert_matches;

use inventory_sync_engine::connectors::data_format::{OrderKey, StatusClass};
use inventory_sync_engine::engine::partition::reduce_partitioned;
use inventory_sync_engine::engine::reduce::{FinalizedOrders, OrderReducer, Reducer};
use inventory_sync_engine::engine::{Error, Phase, Result, Shard};

use crate::helpers::order_row;

#[test]
fn test_worker_index_is_stable() {
    let key = OrderKey::new("o1", "p1");
    for n_workers in 1..16 {
        let index = key.worker_index(n_workers);
        assert!(index < n_workers);
        assert_eq!(index, OrderKey::new("o1", "p1").worker_index(n_workers));
    }
    assert_eq!(key.worker_index(1), 0);
}

#[test]
fn test_worker_index_spreads_keys() {
    let mut counts = [0_usize; 4];
    for i in 0..1000 {
        counts[OrderKey::new(format!("o{i}"), "p1").worker_index(4)] += 1;
    }
    assert!(counts.iter().all(|count| *count > 150), "{counts:?}");
}

#[test]
fn test_keys_stay_on_one_worker() -> eyre::Result<()> {
    let rows: Vec<_> = (0..500)
        .map(|i| {
            order_row(
                &format!("o{}", i % 50),
                "p1",
                StatusClass::Pending,
                10,
                1,
                false,
            )
        })
        .collect();

    let (routed, outputs) = reduce_partitioned(
        4,
        8,
        |worker| OrderReducer::new(worker, None),
        |partitioner| {
            let mut routed = HashMap::new();
            for row in rows {
                let key = row.key.clone();
                let worker = partitioner.route(row).expect("workers are alive");
                assert_eq!(*routed.entry(key).or_insert(worker), worker);
            }
            Ok(routed)
        },
    )?;

    assert_eq!(outputs.len(), 4);
    let mut total = 0;
    for (worker, output) in outputs.iter().enumerate() {
        for (key, order) in &output.orders {
            assert_eq!(routed[key], worker);
            assert_eq!(order.pending_quantity, 0);
        }
        total += output.orders.len();
    }
    assert_eq!(total, 50);
    Ok(())
}

#[test]
fn test_empty_input_hands_over_empty_state() -> eyre::Result<()> {
    let ((), outputs) = reduce_partitioned(
        3,
        1,
        |worker| OrderReducer::new(worker, None),
        |_| Ok(()),
    )?;
    assert_eq!(outputs.len(), 3);
    assert!(outputs.iter().all(|output| output.orders.is_empty()));
    Ok(())
}

#[test]
fn test_worker_error_wins_over_producer() {
    let result = reduce_partitioned(
        2,
        1,
        |worker| OrderReducer::new(worker, Some(1)),
        |partitioner| {
            for i in 0..100 {
                let row = order_row(&format!("o{i}"), "p1", StatusClass::Pending, 1, 0, false);
                if partitioner.route(row).is_err() {
                    break;
                }
            }
            Ok(())
        },
    );
    assert_matches!(result, Err(Error::AggregateCapacityExceeded { limit: 1, .. }));
}

#[test]
fn test_producer_error_is_returned() {
    let result = reduce_partitioned(
        2,
        4,
        |worker| OrderReducer::new(worker, None),
        |_| -> Result<()> {
            Err(Error::HandoffLost {
                expected: 0,
                missing: 0,
            })
        },
    );
    assert_matches!(result, Err(Error::HandoffLost { .. }));
}

struct PanickingReducer;

impl Reducer for PanickingReducer {
    type Input = OrderKey;
    type Output = FinalizedOrders;

    fn merge(&mut self, _input: OrderKey) -> Result<()> {
        panic!("cannot merge");
    }

    fn finish(self) -> FinalizedOrders {
        FinalizedOrders::default()
    }
}

#[test]
fn test_worker_panic_is_reported() {
    let result = reduce_partitioned(
        1,
        1,
        |_| PanickingReducer,
        |partitioner| {
            partitioner.route(OrderKey::new("o1", "p1")).ok();
            Ok(())
        },
    );
    let error = result.expect_err("the worker panicked");
    assert_eq!(error.phase(), Phase::Reduce);
    assert_matches!(error, Error::Panic { message, .. } if message == "cannot merge");
}
