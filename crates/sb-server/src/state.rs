//! Shared server state
//!
//! One instance per daemon, shared behind an `Arc` by the WebSocket
//! handlers, the orchestrator, and the health monitor loop.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use sb_core::config::{ServerConfig, TargetRegistry};
use sb_core::ConnectionId;

use crate::coordinate::{ResourceLock, SessionCoordinator, TaskLifecycle};
use crate::health::{HealthMonitor, Probe, TcpProbe};
use crate::history::{ExecutionRecorder, JsonlRecorder};
use crate::hub::BroadcastHub;

pub struct ServerState {
    pub config: ServerConfig,
    pub registry: TargetRegistry,
    pub hub: BroadcastHub,
    pub sessions: SessionCoordinator,
    pub lock: ResourceLock,
    pub tasks: TaskLifecycle,
    pub monitor: HealthMonitor,
    pub recorder: Arc<dyn ExecutionRecorder>,
    /// Input senders for connections with an open interactive shell
    pub shell_inputs: DashMap<ConnectionId, mpsc::Sender<String>>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let probe = Arc::new(TcpProbe::new(config.health_probe_timeout));
        Self::with_parts(
            config.clone(),
            probe,
            Arc::new(JsonlRecorder::new(config.history_path)),
        )
    }

    /// Test seam: inject the probe and recorder
    pub fn with_parts(
        config: ServerConfig,
        probe: Arc<dyn Probe>,
        recorder: Arc<dyn ExecutionRecorder>,
    ) -> Self {
        let monitor = HealthMonitor::new(config.targets.iter(), probe, config.health_check_interval);
        let registry = TargetRegistry::new(config.targets.clone());
        Self {
            config,
            registry,
            hub: BroadcastHub::new(),
            sessions: SessionCoordinator::new(),
            lock: ResourceLock::new(),
            tasks: TaskLifecycle::new(),
            monitor,
            recorder,
            shell_inputs: DashMap::new(),
        }
    }

    pub fn cancel_timeout(&self) -> Duration {
        self.config.cancel_timeout
    }
}
