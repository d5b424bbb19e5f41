use std::mem::replace;

/// Groups items into batches of a fixed size. Only the final batch may be
/// shorter, and no batch is ever empty.
#[derive(Debug)]
pub struct Batcher<T> {
    batch_size: usize,
    buffer: Vec<T>,
}

impl<T> Batcher<T> {
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    /// Returns a full batch once `item` completes one.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.buffer.push(item);
        if self.buffer.len() == self.batch_size {
            Some(replace(
                &mut self.buffer,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// The trailing partial batch, if any items are left.
    pub fn finish(self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

pub struct Batches<I: Iterator> {
    inner: I,
    batcher: Option<Batcher<I::Item>>,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batcher = self.batcher.as_mut()?;
        for item in self.inner.by_ref() {
            if let Some(batch) = batcher.push(item) {
                return Some(batch);
            }
        }
        self.batcher.take().and_then(Batcher::finish)
    }
}

pub trait BatchesExt: Iterator + Sized {
    fn batches(self, batch_size: usize) -> Batches<Self> {
        Batches {
            inner: self,
            batcher: Some(Batcher::new(batch_size)),
        }
    }
}

impl<I: Iterator> BatchesExt for I {}
