// Copyright © 2024 Pathway

use std::any::type_name;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexSet;
use itertools::Itertools;

use crate::connectors::data_tokenize::{CsvTokenizer, Tokenize};
use crate::engine::{Type, Value};

/// Field names of a feed, in the order of the header row.
pub type Header = Arc<IndexSet<String>>;

/// One decoded line of a feed: an ordered mapping of field name to value.
///
/// The header is shared by all records of the same feed, so a record only
/// owns its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    header: Header,
    values: Vec<String>,
    line: u64,
}

impl RawRecord {
    pub fn new(header: Header, values: Vec<String>, line: u64) -> Self {
        Self {
            header,
            values,
            line,
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>, line: u64) -> Self {
        let (names, values): (IndexSet<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .unzip();
        Self::new(Arc::new(names), values, line)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        let index = self.header.get_index_of(field)?;
        self.values.get(index).map(String::as_str)
    }

    /// Position of the record in the feed, starting from 1 for the header row.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadResult {
    Data(RawRecord),
    Finished,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(csv::Error),

    #[error("failed to decode line {line}: {source}")]
    MalformedLine {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("the feed has no header row")]
    MissingHeader,

    #[error("the header row has a duplicate field {0:?}")]
    DuplicateHeaderField(String),

    #[error("the reader is used before a source has been assigned")]
    NoSource,
}

impl ReadError {
    /// Only stream-level failures are fatal, a single undecodable line is skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedLine { .. })
    }
}

impl From<csv::Error> for ReadError {
    fn from(error: csv::Error) -> Self {
        if error.is_io_error() {
            return Self::Csv(error);
        }
        match error.position().map(csv::Position::line) {
            Some(line) => Self::MalformedLine {
                line,
                source: error,
            },
            None => Self::Csv(error),
        }
    }
}

pub trait Reader: Send {
    fn read(&mut self) -> Result<ReadResult, ReadError>;

    fn short_description(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }
}

/// Creates readers over the same feed. Every call of `build` starts the feed
/// from the beginning, which is what makes a source restartable.
pub trait ReaderBuilder: Send + Sync {
    fn build(&self) -> Result<Box<dyn Reader>, ReadError>;

    fn short_description(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }

    fn name(&self) -> String {
        let desc = self.short_description();
        desc.rsplit("::")
            .next()
            .unwrap_or_default()
            .replace("Builder", "")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl FeedSource {
    fn open(&self) -> Result<Box<dyn Read + Send + 'static>, ReadError> {
        match self {
            Self::Path(path) => Ok(Box::new(File::open(path)?)),
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

impl From<PathBuf> for FeedSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for FeedSource {
    fn from(contents: &str) -> Self {
        Self::Bytes(contents.as_bytes().into())
    }
}

impl From<Vec<u8>> for FeedSource {
    fn from(contents: Vec<u8>) -> Self {
        Self::Bytes(contents.into())
    }
}

pub struct CsvReader {
    tokenizer: Box<dyn Tokenize>,
    source: FeedSource,
    is_finished: bool,
}

impl CsvReader {
    pub fn new(mut tokenizer: Box<dyn Tokenize>, source: FeedSource) -> Result<Self, ReadError> {
        tokenizer.set_new_reader(source.open()?)?;
        Ok(Self {
            tokenizer,
            source,
            is_finished: false,
        })
    }
}

impl Reader for CsvReader {
    fn read(&mut self) -> Result<ReadResult, ReadError> {
        if self.is_finished {
            return Ok(ReadResult::Finished);
        }
        match self.tokenizer.next_entry()? {
            Some(record) => Ok(ReadResult::Data(record)),
            None => {
                self.is_finished = true;
                Ok(ReadResult::Finished)
            }
        }
    }

    fn short_description(&self) -> Cow<'static, str> {
        format!("Csv({})", self.source).into()
    }
}

#[derive(Clone, Debug)]
pub struct CsvReaderBuilder {
    source: FeedSource,
    delimiter: u8,
    quote: u8,
}

impl CsvReaderBuilder {
    pub fn new(source: impl Into<FeedSource>) -> Self {
        Self {
            source: source.into(),
            delimiter: b',',
            quote: b'"',
        }
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }
}

impl ReaderBuilder for CsvReaderBuilder {
    fn build(&self) -> Result<Box<dyn Reader>, ReadError> {
        let mut parser_builder = csv::ReaderBuilder::new();
        parser_builder.delimiter(self.delimiter).quote(self.quote);
        let tokenizer = CsvTokenizer::new(parser_builder);
        Ok(Box::new(CsvReader::new(
            Box::new(tokenizer),
            self.source.clone(),
        )?))
    }

    fn short_description(&self) -> Cow<'static, str> {
        format!("Csv({})", self.source).into()
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to perform Sqlite request: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to perform Postgres request: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("query {query:?} failed: {error}")]
    PsqlQueryFailed {
        query: String,
        error: postgres::Error,
    },

    #[error("{0:?} can't be used as an identifier")]
    InvalidIdentifier(String),

    #[error("collection {0} doesn't exist in the destination storage")]
    CollectionDoesNotExist(String),

    #[error("row {key:?} has {actual} values while collection {collection} has {expected} value fields")]
    RowLengthMismatch {
        collection: String,
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("field {field:?} of row {key:?} expects {expected:?}, got {value}")]
    TypeMismatch {
        key: String,
        field: String,
        expected: Type,
        value: Value,
    },

    #[error("the store is unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueField {
    pub name: String,
    pub type_: Type,
}

impl ValueField {
    pub fn new(name: impl Into<String>, type_: Type) -> Self {
        Self {
            name: name.into(),
            type_,
        }
    }
}

/// The target table of a run: its name, the external identifier column and
/// the value columns, in the order values appear in a `Row`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collection {
    name: String,
    key_field: String,
    value_fields: Vec<ValueField>,
}

fn check_identifier(identifier: &str) -> Result<(), StoreError> {
    let mut chars = identifier.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if starts_well && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(identifier.to_owned()))
    }
}

impl Collection {
    pub fn new(
        name: impl Into<String>,
        key_field: impl Into<String>,
        value_fields: Vec<ValueField>,
    ) -> Result<Self, StoreError> {
        let name = name.into();
        let key_field = key_field.into();
        check_identifier(&name)?;
        check_identifier(&key_field)?;
        for field in &value_fields {
            check_identifier(&field.name)?;
        }
        Ok(Self {
            name,
            key_field,
            value_fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn value_fields(&self) -> &[ValueField] {
        &self.value_fields
    }

    pub fn check_row(&self, row: &Row) -> Result<(), StoreError> {
        if row.values.len() != self.value_fields.len() {
            return Err(StoreError::RowLengthMismatch {
                collection: self.name.clone(),
                key: row.key.clone(),
                expected: self.value_fields.len(),
                actual: row.values.len(),
            });
        }
        for (field, value) in self.value_fields.iter().zip(&row.values) {
            if !field.type_.matches(value) {
                return Err(StoreError::TypeMismatch {
                    key: row.key.clone(),
                    field: field.name.clone(),
                    expected: field.type_,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub key: String,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }
}

/// The persistent store a run reconciles against. Each call is expected to be
/// atomic on its own; nothing spans several calls.
pub trait Store {
    fn initialize(&mut self, _collection: &Collection) -> Result<(), StoreError> {
        Ok(())
    }

    /// Inserts the rows, replacing every field of the rows that already exist
    /// under the same key. Returns the keys written.
    fn upsert(&mut self, collection: &Collection, rows: &[Row]) -> Result<Vec<String>, StoreError>;

    fn select_all_ids(&mut self, collection: &Collection) -> Result<HashSet<String>, StoreError>;

    fn delete_where_id_in(
        &mut self,
        collection: &Collection,
        ids: &[String],
    ) -> Result<usize, StoreError>;

    fn name(&self) -> String {
        type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("Store")
            .to_string()
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TableInitMode {
    Default,
    CreateIfNotExists,
    Replace,
}

impl TableInitMode {
    pub fn initialize(
        self,
        collection: &Collection,
        dialect: SqlDialect,
        mut execute_query: impl FnMut(&str) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        match self {
            TableInitMode::Default => return Ok(()),
            TableInitMode::Replace | TableInitMode::CreateIfNotExists => {
                if self == TableInitMode::Replace {
                    execute_query(&format!("DROP TABLE IF EXISTS {}", collection.name()))?;
                }
                execute_query(&Self::create_table_if_not_exists(collection, dialect))?;
            }
        }

        Ok(())
    }

    fn create_table_if_not_exists(collection: &Collection, dialect: SqlDialect) -> String {
        let value_columns = collection
            .value_fields()
            .iter()
            .map(|field| format!(", {} {} NOT NULL", field.name, dialect.data_type(field.type_)))
            .join("");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({key} {} NOT NULL{value_columns}, PRIMARY KEY ({key}))",
            collection.name(),
            dialect.data_type(Type::String),
            key = collection.key_field(),
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
}

impl SqlDialect {
    fn wildcard_by_index(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{}", index + 1),
            Self::Postgres => format!("${}", index + 1),
        }
    }

    fn data_type(self, type_: Type) -> &'static str {
        match (self, type_) {
            (_, Type::Bool) => "BOOLEAN",
            (Self::Sqlite, Type::Int) => "INTEGER",
            (Self::Postgres, Type::Int) => "BIGINT",
            (_, Type::String) => "TEXT",
        }
    }
}

/// Statements for one collection in one SQL dialect.
#[derive(Debug, Clone)]
pub struct SqlQueryTemplate {
    dialect: SqlDialect,
    upsert: String,
    select_ids: String,
    delete_prefix: String,
}

impl SqlQueryTemplate {
    pub fn new(collection: &Collection, dialect: SqlDialect) -> Self {
        let table_name = collection.name();
        let key_field = collection.key_field();
        let value_fields = collection.value_fields();

        let field_list = std::iter::once(key_field)
            .chain(value_fields.iter().map(|f| f.name.as_str()))
            .join(",");
        let placeholders = (0..=value_fields.len())
            .map(|index| dialect.wildcard_by_index(index))
            .join(",");
        let upsert = format!(
            "INSERT INTO {table_name} ({field_list}) VALUES ({placeholders}) {}",
            Self::on_insert_conflict_condition(key_field, value_fields)
        );

        Self {
            dialect,
            upsert,
            select_ids: format!("SELECT {key_field} FROM {table_name}"),
            delete_prefix: format!("DELETE FROM {table_name} WHERE {key_field} IN"),
        }
    }

    // Every value field is overwritten, so a replayed batch converges to the same row
    fn on_insert_conflict_condition(key_field: &str, value_fields: &[ValueField]) -> String {
        if value_fields.is_empty() {
            return format!("ON CONFLICT ({key_field}) DO NOTHING");
        }
        let update_pairs = value_fields
            .iter()
            .map(|field| format!("{name}=excluded.{name}", name = field.name))
            .join(",");
        format!("ON CONFLICT ({key_field}) DO UPDATE SET {update_pairs}")
    }

    pub fn upsert(&self) -> &str {
        &self.upsert
    }

    pub fn select_ids(&self) -> &str {
        &self.select_ids
    }

    pub fn delete(&self, n_ids: usize) -> String {
        let placeholders = (0..n_ids)
            .map(|index| self.dialect.wildcard_by_index(index))
            .join(",");
        format!("{} ({placeholders})", self.delete_prefix)
    }
}
