// Copyright © 2024 Pathway

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::connectors::data_storage::{Collection, Row, Store, StoreError};
use crate::engine::Value;

// In-process store. Rows are kept ordered by key so snapshots compare easily.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct MemoryStore {
    tables: HashMap<String, BTreeMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Creates a store where `collection` already holds `rows`.
    pub fn with_rows(collection: &Collection, rows: impl IntoIterator<Item = Row>) -> Self {
        let mut store = Self::new();
        let table = store.tables.entry(collection.name().to_owned()).or_default();
        for row in rows {
            table.insert(row.key, row.values);
        }
        store
    }

    pub fn rows(&self, collection: &Collection) -> Option<&BTreeMap<String, Vec<Value>>> {
        self.tables.get(collection.name())
    }

    pub fn get(&self, collection: &Collection, key: &str) -> Option<&[Value]> {
        self.rows(collection)?.get(key).map(Vec::as_slice)
    }

    fn table_mut(
        &mut self,
        collection: &Collection,
    ) -> Result<&mut BTreeMap<String, Vec<Value>>, StoreError> {
        self.tables
            .get_mut(collection.name())
            .ok_or_else(|| StoreError::CollectionDoesNotExist(collection.name().to_owned()))
    }
}

impl Store for MemoryStore {
    fn initialize(&mut self, collection: &Collection) -> Result<(), StoreError> {
        self.tables
            .entry(collection.name().to_owned())
            .or_default();
        Ok(())
    }

    fn upsert(&mut self, collection: &Collection, rows: &[Row]) -> Result<Vec<String>, StoreError> {
        // validate everything first: a batch is applied completely or not at all
        for row in rows {
            collection.check_row(row)?;
        }
        let table = self.table_mut(collection)?;
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            table.insert(row.key.clone(), row.values.clone());
            written.push(row.key.clone());
        }
        Ok(written)
    }

    fn select_all_ids(&mut self, collection: &Collection) -> Result<HashSet<String>, StoreError> {
        Ok(self.table_mut(collection)?.keys().cloned().collect())
    }

    fn delete_where_id_in(
        &mut self,
        collection: &Collection,
        ids: &[String],
    ) -> Result<usize, StoreError> {
        let table = self.table_mut(collection)?;
        Ok(ids.iter().filter(|id| table.remove(*id).is_some()).count())
    }

    fn name(&self) -> String {
        "Memory".to_string()
    }
}
