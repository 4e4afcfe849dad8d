//! Periodic flush trigger.

use crate::error::{QuadCacheError, Result};
use crossbeam::channel::{RecvTimeoutError, Sender, bounded};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread that calls `tick` every `interval` until stopped.
pub(crate) struct FlushTimer {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    /// `tick` returns `false` when there is nothing left to flush for, which
    /// ends the thread.
    pub(crate) fn spawn<F>(interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (shutdown, stop) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("quadcache-flush-timer".to_string())
            .spawn(move || {
                loop {
                    match stop.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !tick() {
                                break;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(QuadCacheError::WorkerSpawn)?;

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for an in-progress tick to finish.
    pub(crate) fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Flush timer thread panicked");
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
