use log::{info, warn};
use std::io;
use std::ops::ControlFlow;
use std::thread::{self, Scope, ScopedJoinHandle};

use crossbeam_channel::{bounded, Receiver};
use scopeguard::guard;
use serde::Serialize;

pub mod data_format;
pub mod data_storage;
pub mod data_tokenize;
pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod upsert_session;

use data_format::Parser;

pub use data_storage::{
    Collection, CsvReaderBuilder, FeedSource, RawRecord, ReadError, ReadResult, Reader,
    ReaderBuilder, Row, Store, StoreError, ValueField,
};

/// Row-level errors past this count are only counted, not logged one by one.
const MAX_LOGGED_ROW_ERRORS: u64 = 100;

/// Counters of one feed for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    /// Lines decoded from the feed.
    pub read: u64,
    /// Records that passed validation and were projected.
    pub accepted: u64,
    /// Records discarded on purpose by the feed's filter.
    pub filtered: u64,
    /// Lines that couldn't be decoded.
    pub malformed: u64,
    /// Decoded records that failed validation.
    pub invalid: u64,
}

impl FeedStats {
    pub fn skipped(&self) -> u64 {
        self.malformed + self.invalid
    }

    fn row_errors(&self) -> u64 {
        self.skipped()
    }
}

/// Pulls the whole feed through `parser`, handing every projected record to
/// `on_row`. Row-level problems are logged and counted in `stats`; only a
/// stream-level failure is returned. `on_row` may stop the feed early by
/// returning `ControlFlow::Break`.
pub fn read_feed<P: Parser + ?Sized>(
    reader: &mut dyn Reader,
    parser: &P,
    stats: &mut FeedStats,
    mut on_row: impl FnMut(P::Output) -> ControlFlow<()>,
) -> Result<ControlFlow<()>, ReadError> {
    let feed_name = parser.short_description();
    loop {
        let record = match reader.read() {
            Ok(ReadResult::Data(record)) => record,
            Ok(ReadResult::Finished) => break,
            Err(error) if !error.is_fatal() => {
                stats.malformed += 1;
                if stats.row_errors() <= MAX_LOGGED_ROW_ERRORS {
                    warn!("{feed_name}: skipping a line: {error}");
                }
                continue;
            }
            Err(error) => return Err(error),
        };
        stats.read += 1;

        match parser.parse(&record) {
            Ok(Some(row)) => {
                stats.accepted += 1;
                if on_row(row).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(None) => stats.filtered += 1,
            Err(error) => {
                stats.invalid += 1;
                if stats.row_errors() <= MAX_LOGGED_ROW_ERRORS {
                    warn!("{feed_name}: skipping line {}: {error}", record.line());
                }
            }
        }
    }

    if stats.row_errors() > MAX_LOGGED_ROW_ERRORS {
        warn!(
            "{feed_name}: {} lines skipped in total, only the first {MAX_LOGGED_ROW_ERRORS} were logged",
            stats.row_errors()
        );
    }
    Ok(ControlFlow::Continue(()))
}

/// Reads a feed on a dedicated thread and streams the projected records
/// through a channel holding at most `demand_window` of them. The thread
/// stops early once the receiver is dropped.
pub fn spawn_feed_reader<'scope, 'env, P>(
    scope: &'scope Scope<'scope, '_>,
    reader_builder: &'env dyn ReaderBuilder,
    parser: &'env P,
    demand_window: usize,
) -> io::Result<(
    Receiver<P::Output>,
    ScopedJoinHandle<'scope, Result<FeedStats, ReadError>>,
)>
where
    P: Parser,
    P::Output: Send + 'scope,
    'env: 'scope,
{
    let (sender, receiver) = bounded(demand_window);
    let thread_name = format!(
        "inventory-sync:reader-{}",
        parser.short_description().to_lowercase()
    );

    let handle = thread::Builder::new()
        .name(thread_name)
        .spawn_scoped(scope, move || {
            let feed_name = reader_builder.name();
            let sender = guard(sender, |sender| {
                // the consumer sees the end of the feed once the sender is gone
                drop(sender);
                info!("Reader of {feed_name} has finished");
            });

            let mut reader = reader_builder.build()?;
            let mut stats = FeedStats::default();
            read_feed(&mut *reader, parser, &mut stats, |row| {
                if sender.send(row).is_ok() {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            })?;
            Ok(stats)
        })?;

    Ok((receiver, handle))
}
