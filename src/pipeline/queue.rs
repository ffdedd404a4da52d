//! Bounded FIFO queue (C1): blocking put/get, non-blocking try-variants.
//!
//! Built directly on `crossbeam::channel`'s bounded channel, which already
//! gives strict FIFO ordering, a fixed capacity, and blocking/non-blocking
//! send and receive. `BoundedQueue` adds the explicit close semantics §4.1
//! calls for: once closed, a `get`/`try_get` against an empty queue reports
//! `Closed` instead of blocking forever.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};

/// Outcome of a non-blocking `try_put`.
#[derive(Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Accepted,
    Full,
}

/// Outcome of a non-blocking `try_get`.
#[derive(Debug, PartialEq, Eq)]
pub enum GetOutcome<T> {
    Item(T),
    Empty,
    Closed,
}

/// Outcome of a blocking `get`.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockingGet<T> {
    Item(T),
    Closed,
}

pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        BoundedQueue {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        BoundedQueue { tx, rx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    /// Blocks until there is room, then enqueues. Returns an error only if
    /// every receiver handle has already been dropped.
    pub fn put(&self, item: T) -> Result<(), T> {
        self.tx.send(item).map_err(|e| e.into_inner())
    }

    /// Enqueues without blocking; reports `Full` instead of blocking.
    pub fn try_put(&self, item: T) -> (PutOutcome, Option<T>) {
        match self.tx.try_send(item) {
            Ok(()) => (PutOutcome::Accepted, None),
            Err(TrySendError::Full(item)) => (PutOutcome::Full, Some(item)),
            Err(TrySendError::Disconnected(item)) => (PutOutcome::Full, Some(item)),
        }
    }

    /// Blocks until an item is available or the queue is closed and drained.
    pub fn get(&self) -> BlockingGet<T> {
        match self.rx.recv() {
            Ok(item) => BlockingGet::Item(item),
            Err(_) => BlockingGet::Closed,
        }
    }

    /// Dequeues without blocking.
    pub fn try_get(&self) -> GetOutcome<T> {
        match self.rx.try_recv() {
            Ok(item) => GetOutcome::Item(item),
            Err(TryRecvError::Empty) => GetOutcome::Empty,
            Err(TryRecvError::Disconnected) => GetOutcome::Closed,
        }
    }

    /// Closes the producer side: once drained, consumers see `Closed` rather
    /// than blocking. Idempotent — dropping an already-dropped sender clone
    /// is a no-op courtesy of the underlying channel's reference counting.
    pub fn close(self) {
        drop(self.tx);
    }
}
