// Copyright © 2024 Pathway

//! Keyed fan-out of one record stream over a fixed pool of worker threads.
//!
//! Every record is routed by the hash of its key, so all records sharing a key
//! are merged by the same worker in arrival order. Once the input is closed,
//! each worker finalizes its state and hands it over through a single channel.
//! The caller only gets the results back after every worker has done so.

use std::thread;

use crossbeam_channel::{bounded, Receiver, SendError, Sender};
use log::{debug, info};
use scopeguard::guard;

use super::error::{Error, Phase, Result};
use super::reduce::Reducer;
use super::shard::Shard;

/// The sending half of the fan-out. Dropping it closes every worker's input.
pub struct KeyedPartitioner<T> {
    senders: Vec<Sender<T>>,
}

impl<T: Shard> KeyedPartitioner<T> {
    pub fn n_workers(&self) -> usize {
        self.senders.len()
    }

    pub fn worker_for(&self, record: &T) -> usize {
        record.worker_index(self.senders.len())
    }

    /// Blocks while the target worker's queue is full. Fails only if that
    /// worker has already stopped.
    pub fn route(&self, record: T) -> Result<usize, SendError<T>> {
        let worker = self.worker_for(&record);
        self.senders[worker].send(record)?;
        Ok(worker)
    }
}

/// A worker's finalized state.
#[derive(Debug)]
pub struct Handoff<O> {
    pub worker: usize,
    pub output: O,
}

fn run_worker<R: Reducer>(
    worker: usize,
    mut reducer: R,
    input: Receiver<R::Input>,
    handoff: Sender<Handoff<R::Output>>,
) -> Result<()> {
    for record in input {
        reducer.merge(record)?;
    }
    debug!("Worker {worker} finished its input");
    // the handoff channel holds one slot per worker, so this never blocks
    handoff
        .send(Handoff {
            worker,
            output: reducer.finish(),
        })
        .ok();
    Ok(())
}

/// Runs `produce` on the calling thread while `n_workers` threads reduce what
/// it routes. Each worker queue holds at most `demand_window` records.
///
/// Returns the value of `produce` and the outputs of all workers, ordered by
/// worker index. A failing or panicking worker fails the whole call; its error
/// takes precedence over the error of `produce`, which usually only observed
/// the worker going away.
pub fn reduce_partitioned<R, T>(
    n_workers: usize,
    demand_window: usize,
    make_reducer: impl Fn(usize) -> R,
    produce: impl FnOnce(&KeyedPartitioner<R::Input>) -> Result<T>,
) -> Result<(T, Vec<R::Output>)>
where
    R: Reducer,
{
    assert!(n_workers > 0, "no workers to reduce on");
    thread::scope(|scope| {
        let (handoff_sender, handoff_receiver) = bounded(n_workers);
        let mut senders = Vec::with_capacity(n_workers);
        let mut handles = Vec::with_capacity(n_workers);

        for worker in 0..n_workers {
            let (sender, receiver) = bounded(demand_window);
            senders.push(sender);
            let reducer = make_reducer(worker);
            let handoff_sender = handoff_sender.clone();
            let handle = thread::Builder::new()
                .name(format!("inventory-sync:worker-{worker}"))
                .spawn_scoped(scope, move || {
                    run_worker(worker, reducer, receiver, handoff_sender)
                })
                .map_err(|source| Error::ThreadSpawn {
                    phase: Phase::Reduce,
                    source,
                })?;
            handles.push(handle);
        }
        drop(handoff_sender);

        let produced = {
            let partitioner = guard(KeyedPartitioner { senders }, |partitioner| {
                drop(partitioner);
                debug!("Closed the input of all {n_workers} workers");
            });
            produce(&*partitioner)
        };

        let mut worker_error = None;
        for handle in handles {
            let result = handle
                .join()
                .unwrap_or_else(|payload| Err(Error::from_panic_payload(Phase::Reduce, payload)));
            if let Err(error) = result {
                worker_error.get_or_insert(error);
            }
        }
        if let Some(error) = worker_error {
            return Err(error);
        }
        let produced = produced?;

        let mut outputs: Vec<_> = handoff_receiver.try_iter().collect();
        if outputs.len() != n_workers {
            return Err(Error::HandoffLost {
                expected: n_workers,
                missing: n_workers - outputs.len(),
            });
        }
        outputs.sort_unstable_by_key(|handoff| handoff.worker);
        info!("All {n_workers} workers handed their aggregates over");

        Ok((
            produced,
            outputs.into_iter().map(|handoff| handoff.output).collect(),
        ))
    })
}
