//! Bounded worker pool.
//!
//! A fixed set of named threads pulls jobs from one bounded queue. When the
//! queue is full, [`WorkerPool::execute`] blocks the submitter, which is the
//! only backpressure the server applies.

use crate::error::{CacheError, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads fed by a bounded queue.
pub struct WorkerPool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing a queue of `queue_capacity` jobs.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidConfig` if `size` or `queue_capacity` is zero
    /// - `CacheError::IoError` if a worker thread cannot be spawned
    pub fn new(size: usize, queue_capacity: usize) -> Result<Self> {
        if size == 0 {
            return Err(CacheError::InvalidConfig("worker count must be > 0".into()));
        }
        if queue_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "queue capacity must be > 0".into(),
            ));
        }

        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("tscache-worker-{index}"))
                .spawn(move || worker_loop(index, &receiver))?;
            workers.push(handle);
        }

        debug!(
            "Started {} workers with queue capacity {}",
            size, queue_capacity
        );
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Returns the number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::IoError` if every worker has exited.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(queue_closed)?;
        sender.send(Box::new(job)).map_err(|_| queue_closed())
    }
}

fn queue_closed() -> CacheError {
    CacheError::IoError(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "worker queue closed",
    ))
}

fn worker_loop(index: usize, receiver: &Mutex<Receiver<Job>>) {
    loop {
        let job = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    error!("Worker {} found the job queue poisoned; exiting", index);
                    break;
                }
            };
            match guard.recv() {
                Ok(job) => job,
                Err(_) => break,
            }
        };
        // A panicking job ends its own connection, not the worker.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!("Worker {} job panicked: {}", index, panic_message(&payload));
        }
    }
    debug!("Worker {} stopped", index);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue ends every worker loop once it drains.
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(matches!(
            WorkerPool::new(0, 4),
            Err(CacheError::InvalidConfig(_))
        ));
        assert!(matches!(
            WorkerPool::new(4, 0),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_runs_every_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(3, 2).unwrap();
            assert_eq!(pool.size(), 3);
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        // Drop joined the workers after the queue drained.
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1, 4).unwrap();
        pool.execute(|| panic!("job failure")).unwrap();

        let (tx, rx) = channel();
        pool.execute(move || tx.send(42).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[test]
    fn test_panic_message_from_payload() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let (tx, rx) = channel();
        pool.execute(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("tscache-worker-0"));
    }
}
