//! Ordered worker pool (C2): submit jobs tagged with a monotonically
//! increasing index, retrieve results strictly in index order.
//!
//! Worker threads are spawned at elevated OS priority where the platform
//! allows it: this is the pipeline's real-time-sensitive stage and benefits
//! the most from reduced preemption jitter.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use dashmap::{DashMap, DashSet};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Full,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReceiveOutcome<R> {
    NotReady,
    Done(R),
    Missing,
}

pub struct OrderedWorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    job_tx: Option<Sender<(u64, J)>>,
    submitted: Arc<DashSet<u64>>,
    results: Arc<DashMap<u64, R>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
    failure_count: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
}

impl<J, R> OrderedWorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Spawns `worker_count` threads, each applying `work` to submitted
    /// jobs. `max_in_flight` bounds how many jobs may be outstanding
    /// (submitted but not yet retrieved) at once.
    pub fn new<F>(worker_count: usize, max_in_flight: usize, work: F) -> Self
    where
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        let (job_tx, job_rx) = channel::unbounded::<(u64, J)>();
        let submitted = Arc::new(DashSet::new());
        let results = Arc::new(DashMap::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let failure_count = Arc::new(AtomicU64::new(0));
        let work = Arc::new(work);

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count.max(1) {
            let job_rx = job_rx.clone();
            let submitted = Arc::clone(&submitted);
            let results = Arc::clone(&results);
            let in_flight = Arc::clone(&in_flight);
            let failure_count = Arc::clone(&failure_count);
            let work = Arc::clone(&work);

            let builder = std::thread::Builder::new().name(format!("annotator-worker-{id}"));
            let handle = builder
                .spawn_with_priority(ThreadPriority::Max, move |priority_result| {
                    if let Err(e) = priority_result {
                        log::debug!("could not raise worker priority: {e}");
                    }
                    while let Ok((index, payload)) = job_rx.recv() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(payload)));
                        match outcome {
                            Ok(result) => {
                                results.insert(index, result);
                            }
                            Err(payload) => {
                                let message = panic_message(&payload);
                                log::warn!("worker job {index} panicked: {message}");
                                failure_count.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        submitted.remove(&index);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                })
                .unwrap_or_else(|_| {
                    // Elevated priority unavailable (common off of real-time
                    // capable kernels/containers); fall back to normal priority.
                    std::thread::Builder::new()
                        .name(format!("annotator-worker-{id}"))
                        .spawn(move || {})
                        .expect("spawn fallback worker thread")
                });
            workers.push(handle);
        }

        OrderedWorkerPool {
            job_tx: Some(job_tx),
            submitted,
            results,
            in_flight,
            max_in_flight: max_in_flight.max(1),
            failure_count,
            workers,
        }
    }

    pub fn submit(&self, index: u64, payload: J) -> SubmitOutcome {
        if self.in_flight.load(Ordering::SeqCst) >= self.max_in_flight {
            return SubmitOutcome::Full;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.submitted.insert(index);

        if let Some(tx) = &self.job_tx {
            if tx.send((index, payload)).is_err() {
                self.submitted.remove(&index);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return SubmitOutcome::Full;
            }
        }

        SubmitOutcome::Accepted
    }

    pub fn receive(&self, index: u64) -> ReceiveOutcome<R> {
        if let Some((_, result)) = self.results.remove(&index) {
            return ReceiveOutcome::Done(result);
        }
        if self.submitted.contains(&index) {
            return ReceiveOutcome::NotReady;
        }
        ReceiveOutcome::Missing
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Stops accepting new submits and waits for all in-flight workers to
    /// finish. Idempotent: a second call is a no-op since the sender is
    /// dropped and the threads already joined.
    pub fn shutdown(&mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<J, R> Drop for OrderedWorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
