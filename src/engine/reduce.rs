use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::{debug, warn};
use serde::Serialize;

use super::shard::Shard;
use super::{Error, Result};
use crate::connectors::data_format::{OrderKey, OrderRow, StatusClass};

/// Per-worker keyed reduction. A reducer only ever sees the records routed to
/// its worker and is consumed by `finish`.
pub trait Reducer: Send {
    type Input: Shard + Send;
    type Output: Send;

    fn merge(&mut self, input: Self::Input) -> Result<()>;

    fn finish(self) -> Self::Output;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerState {
    Empty,
    Accumulating,
}

/// Running state of one order line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderAggregate {
    /// Taken from the most recently merged row.
    pub ordered_quantity: i64,
    pub shipped_total: i64,
    pub has_pending_row: bool,
    pub has_completed_row: bool,
    pub rows: u64,
}

impl OrderAggregate {
    pub fn merge(&mut self, row: &OrderRow) {
        self.ordered_quantity = row.ordered_quantity;
        self.shipped_total = self.shipped_total.saturating_add(row.shipped_quantity);
        match row.status {
            StatusClass::Pending => self.has_pending_row = true,
            StatusClass::Terminal => self.has_completed_row |= row.has_marker,
        }
        self.rows += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.has_pending_row && !self.has_completed_row
    }

    pub fn finish(&self) -> FinalizedOrder {
        let remaining = self.ordered_quantity.saturating_sub(self.shipped_total);
        FinalizedOrder {
            pending: self.is_pending(),
            pending_quantity: u64::try_from(remaining).unwrap_or(0),
            over_shipped: remaining < 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalizedOrder {
    pub pending: bool,
    /// Ordered minus shipped, never below zero.
    pub pending_quantity: u64,
    pub over_shipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReduceStats {
    pub merged: u64,
    /// Terminal rows without a completion marker.
    pub ignored: u64,
    pub orders: u64,
    pub over_shipped: u64,
}

impl ReduceStats {
    pub fn absorb(&mut self, other: &Self) {
        self.merged += other.merged;
        self.ignored += other.ignored;
        self.orders += other.orders;
        self.over_shipped += other.over_shipped;
    }
}

/// What a worker hands over once its input is exhausted.
#[derive(Debug, Default)]
pub struct FinalizedOrders {
    pub orders: HashMap<OrderKey, FinalizedOrder>,
    pub stats: ReduceStats,
}

pub struct OrderReducer {
    worker: usize,
    max_keys: Option<usize>,
    aggregates: HashMap<OrderKey, OrderAggregate>,
    stats: ReduceStats,
}

impl OrderReducer {
    pub fn new(worker: usize, max_keys: Option<usize>) -> Self {
        Self {
            worker,
            max_keys,
            aggregates: HashMap::new(),
            stats: ReduceStats::default(),
        }
    }

    pub fn state(&self) -> ReducerState {
        if self.aggregates.is_empty() {
            ReducerState::Empty
        } else {
            ReducerState::Accumulating
        }
    }

    pub fn get(&self, key: &OrderKey) -> Option<&OrderAggregate> {
        self.aggregates.get(key)
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

impl Reducer for OrderReducer {
    type Input = OrderRow;
    type Output = FinalizedOrders;

    fn merge(&mut self, row: OrderRow) -> Result<()> {
        if row.is_aborted() {
            self.stats.ignored += 1;
            return Ok(());
        }
        let n_keys = self.aggregates.len();
        let aggregate = match self.aggregates.entry(row.key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if let Some(limit) = self.max_keys {
                    if n_keys >= limit {
                        return Err(Error::AggregateCapacityExceeded {
                            worker: self.worker,
                            limit,
                        });
                    }
                }
                entry.insert(OrderAggregate::default())
            }
        };
        aggregate.merge(&row);
        self.stats.merged += 1;
        Ok(())
    }

    fn finish(self) -> FinalizedOrders {
        let mut stats = self.stats;
        let orders: HashMap<_, _> = self
            .aggregates
            .into_iter()
            .map(|(key, aggregate)| {
                let order = aggregate.finish();
                if order.over_shipped {
                    stats.over_shipped += 1;
                    debug!(
                        "Order {} shipped {} of {} units of product {}",
                        key.order_id,
                        aggregate.shipped_total,
                        aggregate.ordered_quantity,
                        key.product_id
                    );
                }
                (key, order)
            })
            .collect();
        stats.orders = orders.len() as u64;
        if stats.over_shipped > 0 {
            warn!(
                "Worker {}: {} orders shipped more than was ordered, counting them as fully shipped",
                self.worker, stats.over_shipped
            );
        }
        FinalizedOrders { orders, stats }
    }
}
