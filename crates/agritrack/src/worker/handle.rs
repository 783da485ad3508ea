use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, info};

use crate::error::WorkerError;

use super::runner::Worker;

/// Owns the background worker thread.
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    wake: Sender<()>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn spawn(mut worker: Worker) -> Result<Self, WorkerError> {
        let shutdown = worker.shutdown_flag();
        let wake = worker.waker();

        let thread = thread::Builder::new()
            .name("agritrack-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            shutdown,
            wake,
            thread,
        })
    }

    /// Wakes the worker if it is idle. While a job is running one wake-up
    /// is buffered, so the next idle wait returns at once and rechecks the
    /// queue. Further calls are dropped until that wake-up is consumed.
    pub fn notify(&self) {
        let _ = self.wake.try_send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Requests shutdown without waiting. A job in flight stops at the next
    /// frame and is marked FAILED.
    pub fn request_shutdown(&self) {
        info!("Shutting down worker...");
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify();
    }

    pub fn shutdown(self) -> Result<(), WorkerError> {
        self.request_shutdown();
        self.join()
    }

    pub fn join(self) -> Result<(), WorkerError> {
        match self.thread.join() {
            Ok(()) => {
                debug!("Worker thread finished");
                Ok(())
            }
            Err(_) => Err(WorkerError::Panicked(
                "worker thread terminated by panic".to_string(),
            )),
        }
    }
}
