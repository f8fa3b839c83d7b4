//! Admission gate in front of the runner.
//!
//! At most `workers` tool processes run at once, each on a blocking thread,
//! and at most `queue_depth` more requests wait for a slot. Anything past
//! that is turned away with [`ToolError::Busy`] instead of spawning yet
//! another external process.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::error::ToolError;

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    /// Running plus waiting requests.
    admitted: Arc<Semaphore>,
    /// Running requests.
    running: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionGate {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        info!(workers, queue_depth, "admission gate ready");
        AdmissionGate {
            admitted: Arc::new(Semaphore::new(workers + queue_depth)),
            running: Arc::new(Semaphore::new(workers)),
            limit: workers + queue_depth,
        }
    }

    /// Most requests that can be running or waiting at once.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Take a place in line, or fail fast with `Busy` when there is none.
    pub fn reserve(&self) -> Result<Reservation, ToolError> {
        match Arc::clone(&self.admitted).try_acquire_owned() {
            Ok(place) => Ok(Reservation {
                place,
                running: Arc::clone(&self.running),
                limit: self.limit,
            }),
            Err(_) => {
                warn!(limit = self.limit, "admission gate full; rejecting request");
                Err(ToolError::Busy { limit: self.limit })
            }
        }
    }

    /// Reserve a place and wait for a worker slot.
    pub async fn admit(&self) -> Result<Permit, ToolError> {
        self.reserve()?.start().await
    }

    /// Admit, then run `job` on a blocking thread.
    pub async fn run<F, T>(&self, job: F) -> Result<T, ToolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.admit().await?.run(job).await
    }
}

/// An admitted request still waiting for a worker slot.
#[derive(Debug)]
pub struct Reservation {
    place: OwnedSemaphorePermit,
    running: Arc<Semaphore>,
    limit: usize,
}

impl Reservation {
    pub async fn start(self) -> Result<Permit, ToolError> {
        let slot = self
            .running
            .acquire_owned()
            .await
            .map_err(|_| ToolError::Busy { limit: self.limit })?;
        Ok(Permit {
            _place: self.place,
            _slot: slot,
        })
    }
}

/// A running request. Both permits are released when it is dropped.
#[derive(Debug)]
pub struct Permit {
    _place: OwnedSemaphorePermit,
    _slot: OwnedSemaphorePermit,
}

impl Permit {
    /// Run `job` on a blocking thread. The permit moves with the job, so the
    /// slot stays taken until the process is gone even if the caller stops
    /// waiting.
    pub async fn run<F, T>(self, job: F) -> Result<T, ToolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let _permit = self;
            job()
        })
        .await
        .map_err(|e| {
            warn!(err = %e, "tool task failed");
            ToolError::SpawnError {
                message: format!("tool task failed: {e}"),
                hint: None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_job_and_returns_result() {
        let gate = AdmissionGate::new(2, 4);
        assert_eq!(gate.run(|| 40 + 2).await.unwrap(), 42);
        assert_eq!(gate.run(|| "done".to_owned()).await.unwrap(), "done");
    }

    #[tokio::test]
    async fn rejects_once_running_and_waiting_are_full() {
        let gate = AdmissionGate::new(1, 1);
        assert_eq!(gate.limit(), 2);

        let running = gate.admit().await.unwrap();
        let waiting = gate.reserve().unwrap();
        assert_eq!(gate.reserve().unwrap_err(), ToolError::Busy { limit: 2 });

        drop(running);
        let started = waiting.start().await.unwrap();
        assert_eq!(started.run(|| "second").await.unwrap(), "second");
        assert!(gate.reserve().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slot_is_held_until_blocking_job_ends() {
        let gate = AdmissionGate::new(1, 0);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let permit = gate.admit().await.unwrap();
        let task = tokio::spawn(permit.run(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            "first"
        }));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(gate.reserve().unwrap_err(), ToolError::Busy { limit: 1 });

        release_tx.send(()).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "first");
        assert!(gate.reserve().is_ok());
    }

    #[tokio::test]
    async fn panicking_job_is_spawn_error_and_frees_slot() {
        let gate = AdmissionGate::new(1, 0);
        let err = gate.run(|| -> u8 { panic!("boom") }).await.unwrap_err();
        assert_eq!(err.kind(), "spawn_error");
        assert_eq!(gate.run(|| 7).await.unwrap(), 7);
    }
}
