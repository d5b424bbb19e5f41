// Copyright © 2024 Pathway

use std::collections::HashSet;
use std::iter::once;

use postgres::types::ToSql;
use postgres::Client as PsqlClient;

use crate::connectors::data_storage::{
    Collection, Row, SqlDialect, SqlQueryTemplate, Store, StoreError, TableInitMode,
};

pub struct PsqlStore {
    client: PsqlClient,
    init_mode: TableInitMode,
}

impl PsqlStore {
    pub fn new(client: PsqlClient, init_mode: TableInitMode) -> Self {
        Self { client, init_mode }
    }

    pub fn connect(params: &str, init_mode: TableInitMode) -> Result<Self, StoreError> {
        let client = PsqlClient::connect(params, postgres::NoTls)?;
        Ok(Self::new(client, init_mode))
    }
}

impl Store for PsqlStore {
    fn initialize(&mut self, collection: &Collection) -> Result<(), StoreError> {
        let mut transaction = self.client.transaction()?;
        self.init_mode
            .initialize(collection, SqlDialect::Postgres, |query| {
                transaction.execute(query, &[])?;
                Ok(())
            })?;
        transaction.commit()?;
        Ok(())
    }

    fn upsert(&mut self, collection: &Collection, rows: &[Row]) -> Result<Vec<String>, StoreError> {
        for row in rows {
            collection.check_row(row)?;
        }
        let template = SqlQueryTemplate::new(collection, SqlDialect::Postgres);
        let query = template.upsert();

        let mut transaction = self.client.transaction()?;
        let statement = transaction.prepare(query)?;
        for row in rows {
            let params: Vec<&(dyn ToSql + Sync)> = once(&row.key as &(dyn ToSql + Sync))
                .chain(row.values.iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();
            transaction
                .execute(&statement, params.as_slice())
                .map_err(|error| StoreError::PsqlQueryFailed {
                    query: query.to_owned(),
                    error,
                })?;
        }
        transaction.commit()?;

        Ok(rows.iter().map(|row| row.key.clone()).collect())
    }

    fn select_all_ids(&mut self, collection: &Collection) -> Result<HashSet<String>, StoreError> {
        let template = SqlQueryTemplate::new(collection, SqlDialect::Postgres);
        let rows = self.client.query(template.select_ids(), &[])?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(StoreError::from))
            .collect()
    }

    fn delete_where_id_in(
        &mut self,
        collection: &Collection,
        ids: &[String],
    ) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let template = SqlQueryTemplate::new(collection, SqlDialect::Postgres);
        let query = template.delete(ids.len());
        let params: Vec<&(dyn ToSql + Sync)> =
            ids.iter().map(|id| id as &(dyn ToSql + Sync)).collect();
        let deleted = self
            .client
            .execute(&query, params.as_slice())
            .map_err(|error| StoreError::PsqlQueryFailed {
                query: query.clone(),
                error,
            })?;
        Ok(usize::try_from(deleted).unwrap_or(usize::MAX))
    }

    fn name(&self) -> String {
        "Postgres".to_string()
    }
}

mod to_sql {
    use std::error::Error;

    use bytes::BytesMut;
    use postgres::types::{to_sql_checked, IsNull, ToSql, Type};

    use crate::engine::Value;

    #[derive(Debug, Clone, thiserror::Error)]
    #[error("cannot convert value of type {value_type} to Postgres type {postgres_type}")]
    struct WrongValueType {
        value_type: &'static str,
        postgres_type: Type,
    }

    impl ToSql for Value {
        fn to_sql(
            &self,
            ty: &Type,
            out: &mut BytesMut,
        ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
            macro_rules! try_forward {
                ($type:ty, $expr:expr) => {
                    if <$type as ToSql>::accepts(ty) {
                        let value: $type = $expr.try_into()?;
                        return value.to_sql(ty, out);
                    }
                };
            }
            match self {
                Self::Bool(b) => {
                    try_forward!(bool, *b);
                }
                Self::Int(i) => {
                    try_forward!(i64, *i);
                    try_forward!(i32, *i);
                    try_forward!(i16, *i);
                }
                Self::String(s) => {
                    try_forward!(&str, s.as_str());
                }
            }
            Err(Box::new(WrongValueType {
                value_type: self.type_name(),
                postgres_type: ty.clone(),
            }))
        }

        fn accepts(_ty: &Type) -> bool {
            true // we double-check anyway
        }

        to_sql_checked!();
    }
}
