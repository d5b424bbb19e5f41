// Copyright © 2024 Pathway

use std::collections::HashSet;

use mockall::mock;

use inventory_sync_engine::connectors::data_format::{
    OrderKey, OrderRow, ProductSchema, StatusClass,
};
use inventory_sync_engine::connectors::data_storage::{
    Collection, CsvReaderBuilder, RawRecord, ReadError, ReadResult, Reader, ReaderBuilder, Row,
    Store, StoreError,
};
use inventory_sync_engine::engine::join::target_collection;

pub const ORDERS_HEADER: &str =
    "order_id,product_id,status,ordered_quantity,shipped_quantity,shipment_number";
pub const PRODUCTS_HEADER: &str = "product_id,name";

pub fn orders_csv(lines: &[&str]) -> CsvReaderBuilder {
    csv_feed(ORDERS_HEADER, lines)
}

pub fn products_csv(lines: &[&str]) -> CsvReaderBuilder {
    csv_feed(PRODUCTS_HEADER, lines)
}

pub fn csv_feed(header: &str, lines: &[&str]) -> CsvReaderBuilder {
    let mut contents = String::from(header);
    for line in lines {
        contents.push('\n');
        contents.push_str(line);
    }
    contents.push('\n');
    CsvReaderBuilder::new(contents.as_str())
}

pub fn products_collection() -> Collection {
    target_collection("products", &ProductSchema::default())
        .expect("default schema should give a valid collection")
}

pub fn read_all(reader: &mut dyn Reader) -> Result<Vec<RawRecord>, ReadError> {
    let mut records = Vec::new();
    loop {
        match reader.read()? {
            ReadResult::Data(record) => records.push(record),
            ReadResult::Finished => return Ok(records),
        }
    }
}

pub fn order_row(
    order_id: &str,
    product_id: &str,
    status: StatusClass,
    ordered_quantity: i64,
    shipped_quantity: i64,
    has_marker: bool,
) -> OrderRow {
    OrderRow {
        key: OrderKey::new(order_id, product_id),
        status,
        ordered_quantity,
        shipped_quantity,
        has_marker,
    }
}

pub fn ids(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| (*id).to_owned()).collect()
}

/// A feed whose reader fails once it has produced `records`.
pub struct FailingFeed {
    pub records: Vec<RawRecord>,
}

struct FailingReader {
    records: std::vec::IntoIter<RawRecord>,
}

impl Reader for FailingReader {
    fn read(&mut self) -> Result<ReadResult, ReadError> {
        match self.records.next() {
            Some(record) => Ok(ReadResult::Data(record)),
            None => Err(ReadError::Io(std::io::Error::other("connection reset"))),
        }
    }
}

impl ReaderBuilder for FailingFeed {
    fn build(&self) -> Result<Box<dyn Reader>, ReadError> {
        Ok(Box::new(FailingReader {
            records: self.records.clone().into_iter(),
        }))
    }
}

mock! {
    pub Database {}
    impl Store for Database {
        fn initialize(&mut self, collection: &Collection) -> Result<(), StoreError>;
        fn upsert(&mut self, collection: &Collection, rows: &[Row]) -> Result<Vec<String>, StoreError>;
        fn select_all_ids(&mut self, collection: &Collection) -> Result<HashSet<String>, StoreError>;
        fn delete_where_id_in(&mut self, collection: &Collection, ids: &[String]) -> Result<usize, StoreError>;
        fn name(&self) -> String;
    }
}
