//! Bounded flush worker pool and flush completion handles.

use crate::error::{QuadCacheError, Result};
use crossbeam::channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads fed by a bounded queue.
///
/// A full queue is reported back to the submitter instead of blocking, so
/// the caller can run the job itself.
pub(crate) struct FlushPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FlushPool {
    pub(crate) fn new(threads: usize, queue_capacity: usize) -> Result<Self> {
        let (sender, receiver) = bounded::<Job>(queue_capacity);
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("quadcache-flush-{}", id))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .map_err(QuadCacheError::WorkerSpawn)?;
            workers.push(worker);
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Queue `job`, or hand it back when the queue is full or shut down.
    pub(crate) fn try_submit(&self, job: Job) -> std::result::Result<(), Job> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Stop accepting work, let queued jobs drain and join the workers.
    pub(crate) fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                log::error!("Flush worker panicked");
            }
        }
    }
}

impl Drop for FlushPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Default)]
struct Completion {
    outcome: Mutex<Option<std::result::Result<(), String>>>,
    done: Condvar,
}

/// Completion handle for one flushed batch.
///
/// Sync-mode flushes hand back a handle that is already finished.
#[derive(Debug, Clone)]
pub struct FlushHandle {
    completion: Arc<Completion>,
    entries: usize,
}

impl FlushHandle {
    pub(crate) fn pending(entries: usize) -> Self {
        Self {
            completion: Arc::new(Completion::default()),
            entries,
        }
    }

    pub(crate) fn finished(entries: usize) -> Self {
        let handle = Self::pending(entries);
        handle.complete(Ok(()));
        handle
    }

    pub(crate) fn complete(&self, outcome: std::result::Result<(), String>) {
        let mut slot = self.completion.outcome.lock();
        *slot = Some(outcome);
        self.completion.done.notify_all();
    }

    /// Number of entries in the batch.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn is_finished(&self) -> bool {
        self.completion.outcome.lock().is_some()
    }

    /// Block until the batch has been written (or has failed).
    pub fn wait(&self) -> Result<()> {
        let mut slot = self.completion.outcome.lock();
        while slot.is_none() {
            self.completion.done.wait(&mut slot);
        }
        Self::outcome(slot.as_ref())
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.completion.outcome.lock();
        while slot.is_none() {
            if self
                .completion
                .done
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                break;
            }
        }
        if slot.is_some() {
            Some(Self::outcome(slot.as_ref()))
        } else {
            None
        }
    }

    fn outcome(slot: Option<&std::result::Result<(), String>>) -> Result<()> {
        match slot {
            Some(Err(message)) => Err(QuadCacheError::FlushFailed(message.clone())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_jobs_run_on_workers() {
        let pool = FlushPool::new(2, 8).unwrap();
        let (tx, rx) = unbounded();

        for i in 0..5 {
            let tx = tx.clone();
            let job: Job = Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send((i, name)).unwrap();
            });
            assert!(pool.try_submit(job).is_ok());
        }
        pool.shutdown();

        let results: Vec<_> = rx.try_iter().collect();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, name)| {
            name.as_deref()
                .is_some_and(|n| n.starts_with("quadcache-flush-"))
        }));
    }

    #[test]
    fn test_full_queue_hands_job_back() {
        let pool = FlushPool::new(1, 1).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        // Occupy the only worker until released.
        let blocker: Job = Box::new(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        assert!(pool.try_submit(blocker).is_ok());
        started_rx.recv().unwrap();

        // Fills the single queue slot.
        assert!(pool.try_submit(Box::new(|| {})).is_ok());
        // No room left.
        assert!(pool.try_submit(Box::new(|| {})).is_err());

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert!(pool.try_submit(Box::new(|| {})).is_err());
    }

    #[test]
    fn test_handle_wait_and_failure() {
        let handle = FlushHandle::pending(3);
        assert!(!handle.is_finished());
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        let waiter = handle.clone();
        let join = thread::spawn(move || waiter.wait());
        handle.complete(Err("sink offline".to_string()));

        assert!(matches!(
            join.join().unwrap(),
            Err(QuadCacheError::FlushFailed(_))
        ));
        assert!(handle.is_finished());
        assert_eq!(handle.entries(), 3);
        assert!(FlushHandle::finished(1).wait().is_ok());
    }
}
