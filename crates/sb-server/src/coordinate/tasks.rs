//! Per-connection task lifecycle
//!
//! At most one running job per connection. Cancellation is cooperative
//! and bounded: trigger the token, wait up to the timeout for the job to
//! wind down, and report honestly when it does not.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sb_core::error::{CancelError, CoordinationError};
use sb_core::ConnectionId;

struct TaskEntry {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    started_at: Instant,
}

/// Tracks the one job each connection may have in flight
#[derive(Default)]
pub struct TaskLifecycle {
    tasks: DashMap<ConnectionId, TaskEntry>,
}

impl TaskLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a job for `conn`. The job receives a cancellation token it must
    /// observe at its suspension points.
    ///
    /// Fails with `TaskAlreadyRunning` if an unfinished job exists for this
    /// connection; entries left behind by finished jobs are reaped here.
    pub fn start<F, Fut>(&self, conn: &ConnectionId, job: F) -> Result<(), CoordinationError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(entry) = self.tasks.get(conn) {
            if !entry.handle.is_finished() {
                return Err(CoordinationError::TaskAlreadyRunning {
                    connection: conn.clone(),
                });
            }
        }
        self.tasks.remove(conn);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(job(cancel.clone()));
        self.tasks.insert(
            conn.clone(),
            TaskEntry {
                handle,
                cancel,
                started_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn is_running(&self, conn: &ConnectionId) -> bool {
        self.tasks
            .get(conn)
            .map(|entry| !entry.handle.is_finished())
            .unwrap_or(false)
    }

    /// Cancel the connection's job and wait up to `timeout` for it to finish.
    ///
    /// Returns `Ok(false)` when there was nothing to cancel. On timeout the
    /// handle goes back into the table so the stuck job stays visible.
    pub async fn cancel(
        &self,
        conn: &ConnectionId,
        timeout: Duration,
    ) -> Result<bool, CancelError> {
        let (_, mut entry) = match self.tasks.remove(conn) {
            Some(removed) => removed,
            None => return Ok(false),
        };

        entry.cancel.cancel();
        let elapsed = entry.started_at.elapsed();

        match tokio::time::timeout(timeout, &mut entry.handle).await {
            Ok(Ok(())) => {
                tracing::info!(connection = %conn, ran_for = ?elapsed, "task cancelled");
                Ok(true)
            }
            Ok(Err(join_err)) => Err(CancelError::Failed(join_err.to_string())),
            Err(_) => {
                self.tasks.insert(conn.clone(), entry);
                Err(CancelError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Disconnect path: cancel without surfacing errors to anyone
    pub async fn abort_on_disconnect(&self, conn: &ConnectionId, timeout: Duration) {
        match self.cancel(conn, timeout).await {
            Ok(true) => {}
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(connection = %conn, error = %e, "task cleanup on disconnect failed");
            }
        }
    }
}
