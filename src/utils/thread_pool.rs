//! # Thread Pool
//!
//! Fixed set of OS worker threads for blocking background work that must stay
//! off the async reactor, such as writing log lines.
//!
//! Jobs run in submission order per worker; with a single worker the pool is a
//! strictly ordered background executor. A panicking job is caught and logged
//! and its [`TaskHandle`] reports [`ProtocolError::TaskFailed`]; the worker
//! keeps running. Shutting down (explicitly or on drop) stops intake, lets the
//! workers finish every job already queued, then joins them.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{constants, ProtocolError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_name("pool", threads)
    }

    /// Spawn one worker per available CPU.
    pub fn with_default_size() -> Result<Self> {
        let threads = thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(threads)
    }

    /// Spawn `threads` workers named `{name}-{index}`.
    pub fn with_name(name: &str, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(ProtocolError::ConfigError(constants::ERR_ZERO_WORKERS.to_string()));
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(receiver))?;
            workers.push(handle);
        }

        debug!(threads, name, "Thread pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job and get a handle to its result.
    pub fn submit<F, R>(&self, job: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ProtocolError::TaskFailed(constants::ERR_POOL_SHUT_DOWN.to_string()))?;

        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            // The handle may already be gone; the job still counts as done.
            let _ = result_tx.send(job());
        });

        sender
            .send(job)
            .map_err(|_| ProtocolError::TaskFailed(constants::ERR_POOL_SHUT_DOWN.to_string()))?;
        Ok(TaskHandle { result: result_rx })
    }

    /// Stop accepting jobs, run the ones already queued, and join the workers.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().map(str::to_owned);
            if worker.join().is_err() {
                error!(worker = ?name, "Worker thread exited abnormally");
            }
        }
        debug!("Thread pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(jobs: Receiver<Job>) {
    // Ends once every sender is gone and the channel is empty.
    for job in jobs.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(
                worker = thread::current().name().unwrap_or("unnamed"),
                "Pool task panicked"
            );
        }
    }
}

/// Result of a job submitted to a [`ThreadPool`].
pub struct TaskHandle<T> {
    result: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the job finishes.
    pub fn wait(self) -> Result<T> {
        self.result
            .recv()
            .map_err(|_| ProtocolError::TaskFailed(constants::ERR_TASK_ABANDONED.to_string()))
    }

    /// Block for at most `timeout`; `Ok(None)` if the job is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.result.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ProtocolError::TaskFailed(
                constants::ERR_TASK_ABANDONED.to_string(),
            )),
        }
    }

    /// The result if the job already finished.
    pub fn try_get(&self) -> Option<T> {
        self.result.try_recv().ok()
    }
}
