// Copyright © 2024 Pathway

use std::io::Read;
use std::sync::Arc;

use csv::Reader as CsvReader;
use csv::ReaderBuilder as CsvReaderBuilder;
use csv::StringRecord;
use indexmap::IndexSet;

use crate::connectors::data_storage::{Header, RawRecord, ReadError};

pub trait Tokenize: Send + 'static {
    fn set_new_reader(&mut self, source: Box<dyn Read + Send + 'static>) -> Result<(), ReadError>;

    /// `Ok(None)` marks the end of the current source.
    fn next_entry(&mut self) -> Result<Option<RawRecord>, ReadError>;
}

pub struct CsvTokenizer {
    parser_builder: CsvReaderBuilder,
    csv_reader: Option<CsvReader<Box<dyn Read + Send + 'static>>>,
    header: Option<Header>,
    current_record: StringRecord,
}

impl CsvTokenizer {
    pub fn new(parser_builder: CsvReaderBuilder) -> Self {
        Self {
            parser_builder,
            csv_reader: None,
            header: None,
            current_record: StringRecord::new(),
        }
    }

    fn read_header(
        csv_reader: &mut CsvReader<Box<dyn Read + Send + 'static>>,
    ) -> Result<Header, ReadError> {
        let header_record = csv_reader.headers()?;
        if header_record.is_empty() {
            return Err(ReadError::MissingHeader);
        }
        let mut header = IndexSet::with_capacity(header_record.len());
        for field in header_record {
            let field = field.trim().to_owned();
            if header.contains(&field) {
                return Err(ReadError::DuplicateHeaderField(field));
            }
            header.insert(field);
        }
        Ok(Arc::new(header))
    }
}

impl Tokenize for CsvTokenizer {
    fn set_new_reader(&mut self, source: Box<dyn Read + Send + 'static>) -> Result<(), ReadError> {
        // A line with a wrong number of fields is reported, not padded
        let mut csv_reader = self
            .parser_builder
            .has_headers(true)
            .flexible(false)
            .from_reader(source);
        self.header = Some(Self::read_header(&mut csv_reader)?);
        self.csv_reader = Some(csv_reader);
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawRecord>, ReadError> {
        let (Some(csv_reader), Some(header)) = (self.csv_reader.as_mut(), self.header.as_ref())
        else {
            return Err(ReadError::NoSource);
        };

        if !csv_reader.read_record(&mut self.current_record)? {
            return Ok(None);
        }
        let line = self
            .current_record
            .position()
            .map_or(0, csv::Position::line);
        let values = self
            .current_record
            .iter()
            .map(|value| value.trim().to_owned())
            .collect();
        Ok(Some(RawRecord::new(header.clone(), values, line)))
    }
}
