use std::collections::HashMap;

use log::info;
use serde::Serialize;

use super::reduce::FinalizedOrders;

/// Order statistics of one product.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductStats {
    /// At least one order references the product.
    pub present: bool,
    /// At least one of those orders is still pending.
    pub pending: bool,
    /// Unshipped quantity summed over all of those orders.
    pub pending_quantity: u64,
}

impl ProductStats {
    fn add_order(&mut self, pending: bool, pending_quantity: u64) {
        self.present = true;
        self.pending |= pending;
        self.pending_quantity = self.pending_quantity.saturating_add(pending_quantity);
    }
}

/// Regroups finalized orders by product. Fed sequentially with the output of
/// each worker, so it needs no locking.
#[derive(Debug, Default)]
pub struct ProductAggregator {
    stats: HashMap<String, ProductStats>,
    n_orders: u64,
    n_handoffs: usize,
}

impl ProductAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, finalized: FinalizedOrders) {
        for (key, order) in finalized.orders {
            self.stats
                .entry(key.product_id)
                .or_default()
                .add_order(order.pending, order.pending_quantity);
            self.n_orders += 1;
        }
        self.n_handoffs += 1;
    }

    pub fn finish(self) -> AggregateStore {
        info!(
            "Aggregated {} orders from {} workers into {} products",
            self.n_orders,
            self.n_handoffs,
            self.stats.len()
        );
        AggregateStore { stats: self.stats }
    }
}

/// Read-only product statistics, looked up by the join.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregateStore {
    stats: HashMap<String, ProductStats>,
}

impl AggregateStore {
    pub fn get(&self, product_id: &str) -> Option<&ProductStats> {
        self.stats.get(product_id)
    }

    /// Products nobody ordered get zeroed statistics.
    pub fn lookup(&self, product_id: &str) -> ProductStats {
        self.get(product_id).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

impl FromIterator<(String, ProductStats)> for AggregateStore {
    fn from_iter<I: IntoIterator<Item = (String, ProductStats)>>(iter: I) -> Self {
        Self {
            stats: iter.into_iter().collect(),
        }
    }
}
