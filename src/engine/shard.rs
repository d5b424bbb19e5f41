use crate::connectors::data_format::{OrderKey, OrderRow};
use crate::engine::value::hash_of;

/// Deterministic routing of a record to a worker. The hash is seedless, so
/// the same key lands on the same worker in every run with the same number
/// of workers.
pub trait Shard {
    fn shard(&self) -> u64;

    #[allow(clippy::cast_possible_truncation)]
    fn worker_index(&self, n_workers: usize) -> usize {
        assert!(n_workers > 0, "no workers to route to");
        (self.shard() % n_workers as u64) as usize
    }
}

impl Shard for str {
    fn shard(&self) -> u64 {
        hash_of(&self)
    }
}

impl Shard for String {
    fn shard(&self) -> u64 {
        self.as_str().shard()
    }
}

impl Shard for OrderKey {
    fn shard(&self) -> u64 {
        hash_of(self)
    }
}

impl Shard for OrderRow {
    fn shard(&self) -> u64 {
        self.key.shard()
    }
}

impl<T: Shard + ?Sized> Shard for &T {
    fn shard(&self) -> u64 {
        (**self).shard()
    }
}
