// Copyright © 2024 Pathway

use std::collections::HashSet;
use std::iter::once;
use std::path::Path;

use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection as SqliteConnection, ToSql};

use crate::connectors::data_storage::{
    Collection, Row, SqlDialect, SqlQueryTemplate, Store, StoreError, TableInitMode,
};
use crate::engine::Value;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Bool(b) => ToSqlOutput::from(*b),
            Self::Int(i) => ToSqlOutput::from(*i),
            Self::String(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

pub struct SqliteStore {
    connection: SqliteConnection,
    init_mode: TableInitMode,
}

impl SqliteStore {
    pub fn new(connection: SqliteConnection, init_mode: TableInitMode) -> Self {
        Self {
            connection,
            init_mode,
        }
    }

    pub fn open(path: impl AsRef<Path>, init_mode: TableInitMode) -> Result<Self, StoreError> {
        Ok(Self::new(SqliteConnection::open(path)?, init_mode))
    }

    pub fn connection(&self) -> &SqliteConnection {
        &self.connection
    }
}

impl Store for SqliteStore {
    fn initialize(&mut self, collection: &Collection) -> Result<(), StoreError> {
        let connection = &self.connection;
        self.init_mode
            .initialize(collection, SqlDialect::Sqlite, |query| {
                connection.execute(query, [])?;
                Ok(())
            })
    }

    fn upsert(&mut self, collection: &Collection, rows: &[Row]) -> Result<Vec<String>, StoreError> {
        for row in rows {
            collection.check_row(row)?;
        }
        let template = SqlQueryTemplate::new(collection, SqlDialect::Sqlite);

        let transaction = self.connection.transaction()?;
        {
            let mut statement = transaction.prepare_cached(template.upsert())?;
            for row in rows {
                let params: Vec<&dyn ToSql> = once(&row.key as &dyn ToSql)
                    .chain(row.values.iter().map(|value| value as &dyn ToSql))
                    .collect();
                statement.execute(params.as_slice())?;
            }
        }
        transaction.commit()?;

        Ok(rows.iter().map(|row| row.key.clone()).collect())
    }

    fn select_all_ids(&mut self, collection: &Collection) -> Result<HashSet<String>, StoreError> {
        let template = SqlQueryTemplate::new(collection, SqlDialect::Sqlite);
        let mut statement = self.connection.prepare(template.select_ids())?;
        let ids = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<String>, rusqlite::Error>>()?;
        Ok(ids)
    }

    fn delete_where_id_in(
        &mut self,
        collection: &Collection,
        ids: &[String],
    ) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let template = SqlQueryTemplate::new(collection, SqlDialect::Sqlite);
        let transaction = self.connection.transaction()?;
        let deleted = transaction.execute(&template.delete(ids.len()), params_from_iter(ids))?;
        transaction.commit()?;
        Ok(deleted)
    }

    fn name(&self) -> String {
        "SQLite".to_string()
    }
}
