// Copyright © 2024 Pathway

use std::borrow::Cow;

use crate::connectors::data_storage::RawRecord;
use crate::engine::value::HashInto;
use xxhash_rust::xxh3::Xxh3 as Hasher;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("field {0:?} is absent in the record")]
    FieldNotFound(String),

    #[error("field {0:?} is empty")]
    EmptyField(String),

    #[error("cannot parse {value:?} in field {field:?} as a quantity")]
    NotAQuantity { field: String, value: String },

    #[error("quantity {value} in field {field:?} is negative")]
    NegativeQuantity { field: String, value: i64 },

    #[error("unknown status {0:?}")]
    UnknownStatus(String),

    #[error("external identifier field {0:?} is empty")]
    MissingExternalId(String),
}

/// `Ok(None)` means the record was discarded on purpose by the feed's filter.
pub type ParseResult<T> = Result<Option<T>, ParseError>;

/// Validates a raw record and projects it to the fields the next stages need.
/// Parsers are shared between threads, so they keep no per-record state.
pub trait Parser: Send + Sync {
    type Output;

    fn parse(&self, record: &RawRecord) -> ParseResult<Self::Output>;

    fn short_description(&self) -> Cow<'static, str> {
        std::any::type_name::<Self>().into()
    }
}

fn required_field<'a>(record: &'a RawRecord, field: &str) -> Result<&'a str, ParseError> {
    record
        .get(field)
        .ok_or_else(|| ParseError::FieldNotFound(field.to_owned()))
}

fn non_empty_field<'a>(record: &'a RawRecord, field: &str) -> Result<&'a str, ParseError> {
    let value = required_field(record, field)?;
    if value.is_empty() {
        Err(ParseError::EmptyField(field.to_owned()))
    } else {
        Ok(value)
    }
}

/// An empty cell counts as zero, a negative amount is rejected.
fn quantity_field(record: &RawRecord, field: &str) -> Result<i64, ParseError> {
    let raw_value = required_field(record, field)?;
    if raw_value.is_empty() {
        return Ok(0);
    }
    let value: i64 = raw_value
        .parse()
        .map_err(|_| ParseError::NotAQuantity {
            field: field.to_owned(),
            value: raw_value.to_owned(),
        })?;
    if value < 0 {
        return Err(ParseError::NegativeQuantity {
            field: field.to_owned(),
            value,
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Pending,
    Terminal,
}

/// Grouping key of the order feed: one line of one order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderKey {
    pub order_id: String,
    pub product_id: String,
}

impl OrderKey {
    pub fn new(order_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            product_id: product_id.into(),
        }
    }
}

impl HashInto for OrderKey {
    fn hash_into(&self, hasher: &mut Hasher) {
        self.order_id.hash_into(hasher);
        self.product_id.hash_into(hasher);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRow {
    pub key: OrderKey,
    pub status: StatusClass,
    pub ordered_quantity: i64,
    pub shipped_quantity: i64,
    pub has_marker: bool,
}

impl OrderRow {
    /// A terminal row without a completion marker stands for a shipment that
    /// never happened.
    pub fn is_aborted(&self) -> bool {
        self.status == StatusClass::Terminal && !self.has_marker
    }

    pub fn is_completed(&self) -> bool {
        self.status == StatusClass::Terminal && self.has_marker
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSchema {
    pub order_id_field: String,
    pub product_id_field: String,
    pub status_field: String,
    pub ordered_quantity_field: String,
    pub shipped_quantity_field: String,
    pub marker_field: String,
    pub pending_statuses: Vec<String>,
    pub terminal_statuses: Vec<String>,
    /// Rows in these statuses are dropped before projection.
    pub skipped_statuses: Vec<String>,
}

impl Default for OrderSchema {
    fn default() -> Self {
        Self {
            order_id_field: "order_id".to_owned(),
            product_id_field: "product_id".to_owned(),
            status_field: "status".to_owned(),
            ordered_quantity_field: "ordered_quantity".to_owned(),
            shipped_quantity_field: "shipped_quantity".to_owned(),
            marker_field: "shipment_number".to_owned(),
            pending_statuses: vec!["open".to_owned()],
            terminal_statuses: vec!["closed".to_owned(), "cancelled".to_owned()],
            skipped_statuses: Vec::new(),
        }
    }
}

fn contains_ignore_case(statuses: &[String], status: &str) -> bool {
    statuses.iter().any(|s| s.eq_ignore_ascii_case(status))
}

pub struct OrderParser {
    schema: OrderSchema,
}

impl OrderParser {
    pub fn new(schema: OrderSchema) -> Self {
        Self { schema }
    }

    fn classify_status(&self, status: &str) -> Result<Option<StatusClass>, ParseError> {
        if contains_ignore_case(&self.schema.skipped_statuses, status) {
            Ok(None)
        } else if contains_ignore_case(&self.schema.pending_statuses, status) {
            Ok(Some(StatusClass::Pending))
        } else if contains_ignore_case(&self.schema.terminal_statuses, status) {
            Ok(Some(StatusClass::Terminal))
        } else {
            Err(ParseError::UnknownStatus(status.to_owned()))
        }
    }
}

impl Default for OrderParser {
    fn default() -> Self {
        Self::new(OrderSchema::default())
    }
}

impl Parser for OrderParser {
    type Output = OrderRow;

    fn parse(&self, record: &RawRecord) -> ParseResult<OrderRow> {
        let schema = &self.schema;
        let Some(status) = self.classify_status(required_field(record, &schema.status_field)?)?
        else {
            return Ok(None);
        };
        let key = OrderKey::new(
            non_empty_field(record, &schema.order_id_field)?,
            non_empty_field(record, &schema.product_id_field)?,
        );
        Ok(Some(OrderRow {
            key,
            status,
            ordered_quantity: quantity_field(record, &schema.ordered_quantity_field)?,
            shipped_quantity: quantity_field(record, &schema.shipped_quantity_field)?,
            has_marker: !required_field(record, &schema.marker_field)?.is_empty(),
        }))
    }

    fn short_description(&self) -> Cow<'static, str> {
        "Orders".into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub external_id: String,
    pub join_key: String,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSchema {
    pub external_id_field: String,
    /// Field matched against the product id of the order feed.
    pub join_field: String,
    /// Fields copied verbatim to the target collection.
    pub attributes: Vec<String>,
}

impl Default for ProductSchema {
    fn default() -> Self {
        Self {
            external_id_field: "product_id".to_owned(),
            join_field: "product_id".to_owned(),
            attributes: vec!["name".to_owned()],
        }
    }
}

pub struct ProductParser {
    schema: ProductSchema,
}

impl ProductParser {
    pub fn new(schema: ProductSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ProductSchema {
        &self.schema
    }
}

impl Default for ProductParser {
    fn default() -> Self {
        Self::new(ProductSchema::default())
    }
}

impl Parser for ProductParser {
    type Output = ProductRow;

    fn parse(&self, record: &RawRecord) -> ParseResult<ProductRow> {
        let schema = &self.schema;
        let external_id = required_field(record, &schema.external_id_field)?;
        if external_id.is_empty() {
            return Err(ParseError::MissingExternalId(
                schema.external_id_field.clone(),
            ));
        }
        let attributes = schema
            .attributes
            .iter()
            .map(|field| required_field(record, field).map(str::to_owned))
            .collect::<Result<_, _>>()?;
        Ok(Some(ProductRow {
            external_id: external_id.to_owned(),
            join_key: required_field(record, &schema.join_field)?.to_owned(),
            attributes,
        }))
    }

    fn short_description(&self) -> Cow<'static, str> {
        "Products".into()
    }
}
