// Copyright © 2024 Pathway

use assert_matches::assert_matches;

use inventory_sync_engine::connectors::data_format::{OrderKey, StatusClass};
use inventory_sync_engine::engine::reduce::{
    FinalizedOrder, OrderAggregate, OrderReducer, Reducer, ReducerState,
};
use inventory_sync_engine::engine::Error;

use crate::helpers::order_row;

#[test]
fn test_partial_shipments_accumulate() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    assert_eq!(reducer.state(), ReducerState::Empty);

    reducer.merge(order_row("o1", "p1", StatusClass::Pending, 10, 0, false))?;
    reducer.merge(order_row("o1", "p1", StatusClass::Pending, 10, 4, false))?;
    assert_eq!(reducer.state(), ReducerState::Accumulating);

    let aggregate = reducer.get(&OrderKey::new("o1", "p1")).expect("key was merged");
    assert_eq!(aggregate.shipped_total, 4);
    assert!(aggregate.is_pending());

    let finalized = reducer.finish();
    assert_eq!(
        finalized.orders[&OrderKey::new("o1", "p1")],
        FinalizedOrder {
            pending: true,
            pending_quantity: 6,
            over_shipped: false,
        }
    );
    Ok(())
}

#[test]
fn test_open_marker_does_not_complete_an_order() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    reducer.merge(order_row("o2", "p1", StatusClass::Pending, 5, 0, false))?;
    reducer.merge(order_row("o2", "p1", StatusClass::Pending, 5, 2, true))?;

    let finalized = reducer.finish();
    let order = finalized.orders[&OrderKey::new("o2", "p1")];
    assert!(order.pending);
    assert_eq!(order.pending_quantity, 3);
    Ok(())
}

#[test]
fn test_completed_row_closes_the_order() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    reducer.merge(order_row("o3", "p1", StatusClass::Pending, 8, 3, false))?;
    reducer.merge(order_row("o3", "p1", StatusClass::Terminal, 8, 5, true))?;

    let order = reducer.finish().orders[&OrderKey::new("o3", "p1")];
    assert!(!order.pending);
    assert_eq!(order.pending_quantity, 0);
    Ok(())
}

#[test]
fn test_aborted_rows_are_ignored() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    reducer.merge(order_row("o4", "p1", StatusClass::Terminal, 100, 100, false))?;
    assert_eq!(reducer.state(), ReducerState::Empty);

    reducer.merge(order_row("o5", "p1", StatusClass::Pending, 2, 0, false))?;
    reducer.merge(order_row("o5", "p1", StatusClass::Terminal, 99, 99, false))?;

    let finalized = reducer.finish();
    assert_eq!(finalized.stats.ignored, 2);
    assert_eq!(finalized.stats.merged, 1);
    assert!(!finalized.orders.contains_key(&OrderKey::new("o4", "p1")));
    let order = finalized.orders[&OrderKey::new("o5", "p1")];
    assert!(order.pending);
    assert_eq!(order.pending_quantity, 2);
    Ok(())
}

#[test]
fn test_latest_ordered_quantity_wins() {
    let mut aggregate = OrderAggregate::default();
    aggregate.merge(&order_row("o6", "p1", StatusClass::Pending, 10, 1, false));
    aggregate.merge(&order_row("o6", "p1", StatusClass::Pending, 7, 1, false));
    assert_eq!(aggregate.ordered_quantity, 7);
    assert_eq!(aggregate.shipped_total, 2);
    assert_eq!(aggregate.rows, 2);
    assert_eq!(aggregate.finish().pending_quantity, 5);
}

#[test]
fn test_over_shipped_order_is_clamped() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    reducer.merge(order_row("o7", "p1", StatusClass::Pending, 3, 2, false))?;
    reducer.merge(order_row("o7", "p1", StatusClass::Pending, 3, 2, false))?;

    let finalized = reducer.finish();
    let order = finalized.orders[&OrderKey::new("o7", "p1")];
    assert_eq!(order.pending_quantity, 0);
    assert!(order.over_shipped);
    assert_eq!(finalized.stats.over_shipped, 1);
    Ok(())
}

#[test]
fn test_same_order_different_products_are_separate() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    reducer.merge(order_row("o8", "p1", StatusClass::Pending, 1, 0, false))?;
    reducer.merge(order_row("o8", "p2", StatusClass::Terminal, 1, 1, true))?;
    assert_eq!(reducer.len(), 2);

    let finalized = reducer.finish();
    assert!(finalized.orders[&OrderKey::new("o8", "p1")].pending);
    assert!(!finalized.orders[&OrderKey::new("o8", "p2")].pending);
    assert_eq!(finalized.stats.orders, 2);
    Ok(())
}

#[test]
fn test_key_limit_is_enforced() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(3, Some(2));
    reducer.merge(order_row("a", "p1", StatusClass::Pending, 1, 0, false))?;
    reducer.merge(order_row("b", "p1", StatusClass::Pending, 1, 0, false))?;
    // merging into an existing key never hits the limit
    reducer.merge(order_row("a", "p1", StatusClass::Pending, 1, 0, false))?;

    let result = reducer.merge(order_row("c", "p1", StatusClass::Pending, 1, 0, false));
    assert_matches!(
        result,
        Err(Error::AggregateCapacityExceeded {
            worker: 3,
            limit: 2
        })
    );
    Ok(())
}

#[test]
fn test_partially_shipped_open_order() -> eyre::Result<()> {
    let mut reducer = OrderReducer::new(0, None);
    reducer.merge(order_row("order-2", "p1", StatusClass::Pending, 4000, 1200, true))?;
    reducer.merge(order_row("order-2", "p1", StatusClass::Pending, 4000, 2000, false))?;

    let order = reducer.finish().orders[&OrderKey::new("order-2", "p1")];
    assert_eq!(
        order,
        FinalizedOrder {
            pending: true,
            pending_quantity: 800,
            over_shipped: false,
        }
    );
    Ok(())
}
