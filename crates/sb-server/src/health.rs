//! Background target health monitoring
//!
//! Probes every configured target on a fixed interval and tracks health
//! with asymmetric hysteresis: one success brings a target back, two
//! consecutive failures take it down. Only real transitions are announced,
//! through an mpsc channel the server main drains into the broadcast hub.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sb_core::config::TargetConfig;
use sb_protocol::HealthSnapshot;

use crate::shell::channel::check_reachable;

/// Consecutive failures before a healthy target is marked unhealthy
const FAILURE_THRESHOLD: u32 = 2;

/// Consecutive successes before an unhealthy target recovers
const SUCCESS_THRESHOLD: u32 = 1;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("health monitor is already running")]
    AlreadyRunning,
}

/// Reachability probe, injected so the monitor loop is testable offline
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn check(&self, host: &str, port: u16) -> bool;
}

/// Default probe: TCP connect-and-close with a per-attempt timeout
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, host: &str, port: u16) -> bool {
        check_reachable(host, port, self.timeout).await
    }
}

/// Emitted when a target actually changes health state
#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub target_name: String,
    pub is_healthy: bool,
    pub snapshot: HealthSnapshot,
}

/// Per-target hysteresis state
struct TargetState {
    host: String,
    port: u16,
    is_healthy: bool,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_checked: Option<String>,
}

impl TargetState {
    fn new(host: String, port: u16) -> Self {
        // Targets start out unhealthy until the first probe proves otherwise
        Self {
            host,
            port,
            is_healthy: false,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_checked: None,
        }
    }

    /// Fold one probe result in. Returns the new health state only when it
    /// changed.
    fn observe(&mut self, reachable: bool, checked_at: String) -> Option<bool> {
        self.last_checked = Some(checked_at);
        if reachable {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
            if !self.is_healthy && self.consecutive_successes >= SUCCESS_THRESHOLD {
                self.is_healthy = true;
                return Some(true);
            }
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            if self.is_healthy && self.consecutive_failures >= FAILURE_THRESHOLD {
                self.is_healthy = false;
                return Some(false);
            }
        }
        None
    }

    fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            host: self.host.clone(),
            port: self.port,
            is_healthy: self.is_healthy,
            last_checked: self.last_checked.clone(),
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
        }
    }
}

/// Periodic health monitor over all configured targets
pub struct HealthMonitor {
    states: Arc<DashMap<String, TargetState>>,
    probe: Arc<dyn Probe>,
    interval: Duration,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new<'a>(
        targets: impl IntoIterator<Item = (&'a String, &'a TargetConfig)>,
        probe: Arc<dyn Probe>,
        interval: Duration,
    ) -> Self {
        let states = Arc::new(DashMap::new());
        for (name, target) in targets {
            states.insert(
                name.clone(),
                TargetState::new(target.host.clone(), target.port),
            );
        }
        Self {
            states,
            probe,
            interval,
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Launch the monitor loop. Transitions go out through `events`.
    pub async fn start(&self, events: mpsc::Sender<HealthEvent>) -> Result<(), MonitorError> {
        let mut cancel_slot = self.cancel.lock().await;
        if cancel_slot.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        *cancel_slot = Some(cancel.clone());

        let states = Arc::clone(&self.states);
        let probe = Arc::clone(&self.probe);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            tracing::info!(targets = states.len(), interval = ?interval, "health monitor started");
            loop {
                run_cycle(&states, probe.as_ref(), &events).await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::info!("health monitor stopped");
        });
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the loop and wait for it to exit. Safe to call when not running.
    pub async fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "health monitor loop ended abnormally");
            }
        }
    }

    /// Current health of every target, for the welcome payload and `/health`
    pub fn snapshot(&self) -> HashMap<String, HealthSnapshot> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

/// Probe every target concurrently and emit events for real transitions
async fn run_cycle(
    states: &DashMap<String, TargetState>,
    probe: &dyn Probe,
    events: &mpsc::Sender<HealthEvent>,
) {
    let targets: Vec<(String, String, u16)> = states
        .iter()
        .map(|entry| {
            (
                entry.key().clone(),
                entry.value().host.clone(),
                entry.value().port,
            )
        })
        .collect();

    let checks = targets.into_iter().map(|(name, host, port)| async move {
        let reachable = probe.check(&host, port).await;
        (name, reachable)
    });

    for (name, reachable) in join_all(checks).await {
        let transition = states.get_mut(&name).and_then(|mut entry| {
            entry
                .observe(reachable, chrono::Utc::now().to_rfc3339())
                .map(|is_healthy| (is_healthy, entry.snapshot()))
        });

        if let Some((is_healthy, snapshot)) = transition {
            if is_healthy {
                tracing::info!(target_name = %name, "target recovered");
            } else {
                tracing::warn!(target_name = %name, "target became unhealthy");
            }
            // try_send so a slow consumer cannot stall the poll loop
            if let Err(e) = events.try_send(HealthEvent {
                target_name: name,
                is_healthy,
                snapshot,
            }) {
                tracing::warn!(error = %e, "health event dropped");
            }
        }
    }
}
