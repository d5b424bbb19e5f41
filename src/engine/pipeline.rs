// Copyright © 2024 Pathway

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::info;
use scopeguard::{guard, ScopeGuard};
use serde::Serialize;

use super::aggregate::{AggregateStore, ProductAggregator};
use super::batcher::Batcher;
use super::config::Config;
use super::error::{Error, Feed, Phase, Result};
use super::join::{join, target_collection};
use super::partition::reduce_partitioned;
use super::reconcile::{ChunkFailure, Reconciler};
use super::reduce::{OrderReducer, ReduceStats};
use crate::connectors::data_format::{OrderParser, OrderSchema, ProductParser, ProductSchema};
use crate::connectors::data_storage::{Collection, ReadError, ReaderBuilder, Row, Store};
use crate::connectors::upsert_session::UpsertSink;
use crate::connectors::{read_feed, spawn_feed_reader, FeedStats};

/// Counters collected while a run progresses. Every stage gets the part it
/// updates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub orders: FeedStats,
    pub products: FeedStats,
    pub reduce: ReduceStats,
    pub products_with_orders: u64,
    pub upserted_rows: u64,
}

/// Outcome of a run that reached the end of reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Distinct ids upserted.
    pub written: usize,
    /// Rows sent to the store, repeated ids included.
    pub upserted_rows: u64,
    pub deleted: usize,
    pub delete_failures: Vec<ChunkFailure>,
    /// Rows of both feeds that were skipped as malformed or invalid.
    pub skipped: u64,
    pub orders: FeedStats,
    pub products: FeedStats,
    pub reduce: ReduceStats,
    pub products_with_orders: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl Summary {
    pub fn is_complete(&self) -> bool {
        self.delete_failures.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn log_phase_duration(phase: Phase) -> ScopeGuard<Instant, impl FnOnce(Instant)> {
    info!("Starting the {phase} phase");
    guard(Instant::now(), move |started_at| {
        info!("The {phase} phase took {:?}", started_at.elapsed());
    })
}

/// One reconciliation run: orders are reduced into per-product statistics,
/// products are joined with them and upserted, and finally every persisted
/// record the run did not write is deleted.
pub struct Pipeline<'a, S: Store + ?Sized> {
    config: Config,
    order_parser: OrderParser,
    product_parser: ProductParser,
    store: &'a mut S,
}

impl<'a, S: Store + ?Sized> Pipeline<'a, S> {
    pub fn new(config: Config, store: &'a mut S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            order_parser: OrderParser::default(),
            product_parser: ProductParser::default(),
            store,
        })
    }

    #[must_use]
    pub fn with_order_schema(mut self, schema: OrderSchema) -> Self {
        self.order_parser = OrderParser::new(schema);
        self
    }

    #[must_use]
    pub fn with_product_schema(mut self, schema: ProductSchema) -> Self {
        self.product_parser = ProductParser::new(schema);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The collection matching the rows this pipeline produces.
    pub fn target_collection(&self, name: &str) -> Result<Collection> {
        target_collection(name, self.product_parser.schema()).map_err(|source| {
            Error::Initialize {
                collection: name.to_owned(),
                source,
            }
        })
    }

    pub fn run(
        &mut self,
        order_feed: &dyn ReaderBuilder,
        product_feed: &dyn ReaderBuilder,
        collection: &Collection,
    ) -> Result<Summary> {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!(
            "Reconciling {} in {} with {} workers, orders from {}, products from {}",
            collection.name(),
            self.store.name(),
            self.config.workers(),
            order_feed.short_description(),
            product_feed.short_description()
        );

        self.store
            .initialize(collection)
            .map_err(|source| Error::Initialize {
                collection: collection.name().to_owned(),
                source,
            })?;

        let mut stats = RunStats::default();
        let aggregates = self.build_aggregates(order_feed, &mut stats)?;
        let written_ids = self.upsert_products(product_feed, &aggregates, collection, &mut stats)?;
        drop(aggregates);
        let written = written_ids.len();

        let report = {
            let _timer = log_phase_duration(Phase::Reconcile);
            Reconciler::from_config(&self.config).reconcile(
                &mut *self.store,
                collection,
                written_ids,
            )?
        };

        let summary = Summary {
            written,
            upserted_rows: stats.upserted_rows,
            deleted: report.deleted,
            delete_failures: report.failures,
            skipped: stats.orders.skipped() + stats.products.skipped(),
            orders: stats.orders,
            products: stats.products,
            reduce: stats.reduce,
            products_with_orders: stats.products_with_orders,
            started_at,
            duration: timer.elapsed(),
        };
        info!(
            "Run finished in {:?}: {} written, {} deleted, {} rows skipped, {} deletion chunks failed",
            summary.duration,
            summary.written,
            summary.deleted,
            summary.skipped,
            summary.delete_failures.len()
        );
        Ok(summary)
    }

    /// Reads the whole order feed through the worker pool and regroups the
    /// finalized orders by product.
    pub fn build_aggregates(
        &self,
        order_feed: &dyn ReaderBuilder,
        stats: &mut RunStats,
    ) -> Result<AggregateStore> {
        let _timer = log_phase_duration(Phase::Reduce);
        let max_keys = self.config.max_keys_per_worker();
        let read_error = |source: ReadError| Error::Read {
            feed: Feed::Orders,
            source,
        };

        let mut reader = order_feed.build().map_err(read_error)?;
        let order_stats = &mut stats.orders;
        let (_, handoffs) = reduce_partitioned(
            self.config.workers(),
            self.config.demand_window(),
            |worker| OrderReducer::new(worker, max_keys),
            |partitioner| {
                read_feed(&mut *reader, &self.order_parser, order_stats, |row| {
                    match partitioner.route(row) {
                        Ok(_) => ControlFlow::Continue(()),
                        Err(_) => ControlFlow::Break(()),
                    }
                })
                .map_err(read_error)
            },
        )?;

        let mut aggregator = ProductAggregator::new();
        for finalized in handoffs {
            stats.reduce.absorb(&finalized.stats);
            aggregator.fold(finalized);
        }
        Ok(aggregator.finish())
    }

    /// Streams the product feed through the join into the store. Returns the
    /// ids written.
    pub fn upsert_products(
        &mut self,
        product_feed: &dyn ReaderBuilder,
        aggregates: &AggregateStore,
        collection: &Collection,
        stats: &mut RunStats,
    ) -> Result<HashSet<String>> {
        let _timer = log_phase_duration(Phase::Upsert);
        let product_parser = &self.product_parser;
        let store = &mut *self.store;
        let demand_window = self.config.demand_window();
        let batch_size = self.config.batch_size();

        thread::scope(|scope| {
            let (receiver, reader) =
                spawn_feed_reader(scope, product_feed, product_parser, demand_window).map_err(
                    |source| Error::ThreadSpawn {
                        phase: Phase::Join,
                        source,
                    },
                )?;

            let mut sink = UpsertSink::new(store, collection);
            let mut write_batch = |batch: Vec<Row>| {
                sink.write_batch(&batch)
                    .map_err(|source| Error::Upsert {
                        collection: collection.name().to_owned(),
                        batch_size: batch.len(),
                        source,
                    })
            };

            let mut batcher = Batcher::new(batch_size);
            let mut streamed = Ok(());
            for product in &receiver {
                let entity = join(aggregates, product);
                if entity.stats.present {
                    stats.products_with_orders += 1;
                }
                if let Some(batch) = batcher.push(entity.into_row()) {
                    if let Err(error) = write_batch(batch) {
                        streamed = Err(error);
                        break;
                    }
                }
            }
            // unblocks the reader if the sink gave up early
            drop(receiver);

            let feed_result = match reader.join() {
                Ok(result) => result.map_err(|source| Error::Read {
                    feed: Feed::Products,
                    source,
                }),
                Err(payload) => Err(Error::from_panic_payload(Phase::Join, payload)),
            };
            streamed?;
            // a feed that failed half way must not look complete downstream
            stats.products = feed_result?;
            if let Some(batch) = batcher.finish() {
                write_batch(batch)?;
            }

            stats.upserted_rows = sink.rows_written() as u64;
            Ok(sink.into_written_ids())
        })
    }
}
