use super::aggregate::{AggregateStore, ProductStats};
use super::value::{Type, Value};
use crate::connectors::data_format::{ProductRow, ProductSchema};
use crate::connectors::data_storage::{Collection, Row, StoreError, ValueField};

pub const EXTERNAL_ID_FIELD: &str = "external_id";
pub const HAS_ORDERS_FIELD: &str = "has_orders";
pub const HAS_PENDING_ORDERS_FIELD: &str = "has_pending_orders";
pub const PENDING_QUANTITY_FIELD: &str = "pending_quantity";

/// A product enriched with the statistics of its orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntity {
    pub external_id: String,
    pub attributes: Vec<String>,
    pub stats: ProductStats,
}

impl MergedEntity {
    /// Column order follows `target_collection`.
    pub fn into_row(self) -> Row {
        let pending_quantity = i64::try_from(self.stats.pending_quantity).unwrap_or(i64::MAX);
        let values = self
            .attributes
            .into_iter()
            .map(Value::String)
            .chain([
                Value::Bool(self.stats.present),
                Value::Bool(self.stats.pending),
                Value::Int(pending_quantity),
            ])
            .collect();
        Row::new(self.external_id, values)
    }
}

pub fn join(aggregates: &AggregateStore, product: ProductRow) -> MergedEntity {
    let stats = aggregates.lookup(&product.join_key);
    MergedEntity {
        external_id: product.external_id,
        attributes: product.attributes,
        stats,
    }
}

/// The collection merged entities of `schema` are written to.
pub fn target_collection(name: &str, schema: &ProductSchema) -> Result<Collection, StoreError> {
    let value_fields = schema
        .attributes
        .iter()
        .map(|attribute| ValueField::new(attribute.as_str(), Type::String))
        .chain([
            ValueField::new(HAS_ORDERS_FIELD, Type::Bool),
            ValueField::new(HAS_PENDING_ORDERS_FIELD, Type::Bool),
            ValueField::new(PENDING_QUANTITY_FIELD, Type::Int),
        ])
        .collect();
    Collection::new(name, EXTERNAL_ID_FIELD, value_fields)
}
