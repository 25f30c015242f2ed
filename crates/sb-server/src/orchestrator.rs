//! Per-connection message dispatch
//!
//! The orchestrator ties the coordination layer, the shell engine, the
//! broadcast hub, and the recorder together. Domain errors stop here: each
//! becomes one outbound `error` message with its stable numeric code, and
//! the connection stays up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sb_core::config::TargetConfig;
use sb_core::{ConnectionId, CoordinationError};
use sb_protocol::{ClientMessage, ServerMessage, FINAL_PIPELINE_STEP, FIRST_PIPELINE_STEP};

use crate::history::ExecutionRecord;
use crate::hub::DeliveryPolicy;
use crate::shell::{JobOutcome, RemoteShellChannel};
use crate::state::ServerState;

/// Phrase the standard unload scripts print on success, used when the
/// console does not supply one
pub const DEFAULT_COMPLETION_PHRASE: &str = "[SUCC] unload process complete";

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
const INPUT_CHANNEL_CAPACITY: usize = 32;
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

pub struct RemoteTaskOrchestrator {
    state: Arc<ServerState>,
}

impl RemoteTaskOrchestrator {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Register the connection and send the welcome payload: its id plus
    /// the current lock, session, and target-health state.
    pub async fn on_connect(&self, conn: &ConnectionId, sender: mpsc::Sender<String>) {
        self.state.hub.register(conn.clone(), sender);

        let welcome = ServerMessage::Welcome {
            connection_id: conn.0.clone(),
            lock_status: self.state.lock.status().await,
            session_status: self.state.sessions.status().await,
            server_health: self.state.monitor.snapshot(),
        };
        self.state.hub.send_one(conn, &welcome).await;
        tracing::info!(connection = %conn, consoles = self.state.hub.len(), "console connected");
    }

    /// Tear down everything the connection owned and tell the remaining
    /// consoles about freed state.
    pub async fn on_disconnect(&self, conn: &ConnectionId) {
        self.state.hub.unregister(conn);
        self.state
            .tasks
            .abort_on_disconnect(conn, self.state.cancel_timeout())
            .await;
        self.state.shell_inputs.remove(conn);

        if self.state.sessions.force_release(conn).await {
            self.broadcast_session_status().await;
        }
        if self.state.lock.force_release(conn).await {
            self.broadcast_lock_status().await;
        }
        tracing::info!(connection = %conn, consoles = self.state.hub.len(), "console disconnected");
    }

    pub async fn handle(&self, conn: &ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::StartSession => self.handle_start_session(conn).await,
            ClientMessage::EndSession => self.handle_end_session(conn).await,
            ClientMessage::RunCommand {
                target,
                command,
                step,
                completion_phrase,
                flush_interval_ms,
            } => {
                self.handle_run_command(
                    conn,
                    target,
                    command,
                    step,
                    completion_phrase,
                    flush_interval_ms,
                )
                .await
            }
            ClientMessage::ShellInput { input } => self.handle_shell_input(conn, input).await,
            ClientMessage::CancelTask => self.handle_cancel_task(conn).await,
            ClientMessage::GetLockStatus => {
                let status = self.state.lock.status().await;
                self.state
                    .hub
                    .send_one(
                        conn,
                        &ServerMessage::LockStatus {
                            locked: status.locked,
                            owner: status.owner,
                        },
                    )
                    .await;
            }
        }
    }

    async fn handle_start_session(&self, conn: &ConnectionId) {
        match self.state.sessions.acquire(conn).await {
            Ok(()) => {
                tracing::info!(connection = %conn, "session started");
                self.broadcast_session_status().await;
            }
            Err(e) => {
                self.state
                    .hub
                    .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                    .await;
            }
        }
    }

    async fn handle_end_session(&self, conn: &ConnectionId) {
        match self.state.sessions.release(conn).await {
            Ok(()) => {
                tracing::info!(connection = %conn, "session ended");
                self.broadcast_session_status().await;
            }
            Err(e) => {
                self.state
                    .hub
                    .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                    .await;
            }
        }
    }

    async fn handle_shell_input(&self, conn: &ConnectionId, input: String) {
        let sender = self
            .state
            .shell_inputs
            .get(conn)
            .map(|entry| entry.value().clone());
        let delivered = match sender {
            Some(tx) => tx.send(input).await.is_ok(),
            None => false,
        };
        if !delivered {
            self.state
                .hub
                .send_one(
                    conn,
                    &ServerMessage::error(
                        sb_protocol::ErrorCode::ChannelUnavailable,
                        "No interactive shell is open",
                        None,
                    ),
                )
                .await;
        }
    }

    async fn handle_cancel_task(&self, conn: &ConnectionId) {
        match self.state.tasks.cancel(conn, self.state.cancel_timeout()).await {
            Ok(false) => {
                self.state
                    .hub
                    .send_one(
                        conn,
                        &ServerMessage::Status {
                            message: "No running task to cancel".to_string(),
                        },
                    )
                    .await;
            }
            Ok(true) => {
                self.state
                    .hub
                    .send_one(
                        conn,
                        &ServerMessage::Status {
                            message: "Task cancelled".to_string(),
                        },
                    )
                    .await;
                if self.state.sessions.force_release(conn).await {
                    self.broadcast_session_status().await;
                }
                if self.state.lock.force_release(conn).await {
                    self.broadcast_lock_status().await;
                }
            }
            Err(e) => {
                // The job is still out there; leave its holdings visible
                tracing::error!(connection = %conn, error = %e, "cancellation did not complete");
                self.state
                    .hub
                    .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                    .await;
            }
        }
    }

    async fn handle_run_command(
        &self,
        conn: &ConnectionId,
        target: String,
        command: String,
        step: Option<u8>,
        completion_phrase: Option<String>,
        flush_interval_ms: Option<u64>,
    ) {
        let state = &self.state;

        let target_config = match state.registry.resolve(&target) {
            Ok(config) => config.clone(),
            Err(e) => {
                state
                    .hub
                    .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                    .await;
                return;
            }
        };

        // Session permission: an active session admits only its owner
        match state.sessions.owner().await {
            Some(owner) if owner != *conn => {
                let e = CoordinationError::SessionAlreadyActive { owner };
                state
                    .hub
                    .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                    .await;
                return;
            }
            _ => {}
        }

        if state.tasks.is_running(conn) {
            state
                .hub
                .send_one(
                    conn,
                    &ServerMessage::error(
                        sb_protocol::ErrorCode::TaskAlreadyRunning,
                        "A task is already running for this connection",
                        None,
                    ),
                )
                .await;
            return;
        }

        // Outside a session, pipeline step 1 claims session ownership for
        // the whole pipeline; a standalone run takes the resource lock for
        // just this run.
        let in_session = state.sessions.owner().await.is_some();
        let mut holds_lock = false;
        let mut acquired_session = false;
        if !in_session {
            if step == Some(FIRST_PIPELINE_STEP) {
                if let Err(e) = state.sessions.acquire(conn).await {
                    state
                        .hub
                        .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                        .await;
                    return;
                }
                acquired_session = true;
                self.broadcast_session_status().await;
            } else {
                if let Err(e) = state.lock.acquire(conn).await {
                    state
                        .hub
                        .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                        .await;
                    return;
                }
                holds_lock = true;
                self.broadcast_lock_status().await;
            }
        }

        let job_state = Arc::clone(state);
        let job_conn = conn.clone();
        let phrase =
            completion_phrase.unwrap_or_else(|| DEFAULT_COMPLETION_PHRASE.to_string());
        let flush_interval = flush_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL);

        let started = state.tasks.start(conn, move |cancel| {
            run_job(
                job_state,
                job_conn,
                target,
                target_config,
                command,
                phrase,
                flush_interval,
                step,
                holds_lock,
                cancel,
            )
        });

        if let Err(e) = started {
            // Lost the start race; give back what this request took
            if acquired_session && state.sessions.force_release(conn).await {
                self.broadcast_session_status().await;
            }
            if holds_lock && state.lock.force_release(conn).await {
                self.broadcast_lock_status().await;
            }
            state
                .hub
                .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                .await;
        }
    }

    async fn broadcast_session_status(&self) {
        let status = self.state.sessions.status().await;
        let _ = self
            .state
            .hub
            .broadcast(
                &ServerMessage::SessionStatus {
                    active: status.active,
                    owner: status.owner,
                },
                None,
                DeliveryPolicy::BestEffort,
            )
            .await;
    }

    async fn broadcast_lock_status(&self) {
        let status = self.state.lock.status().await;
        let _ = self
            .state
            .hub
            .broadcast(
                &ServerMessage::LockStatus {
                    locked: status.locked,
                    owner: status.owner,
                },
                None,
                DeliveryPolicy::BestEffort,
            )
            .await;
    }
}

/// One scheduled remote run: connect, stream, clean up, record.
#[allow(clippy::too_many_arguments)]
async fn run_job(
    state: Arc<ServerState>,
    conn: ConnectionId,
    target_name: String,
    target: TargetConfig,
    command: String,
    phrase: String,
    flush_interval: Duration,
    step: Option<u8>,
    holds_lock: bool,
    cancel: CancellationToken,
) {
    let outcome = execute(
        &state,
        &conn,
        &target_name,
        target,
        &command,
        &phrase,
        flush_interval,
        step,
        &cancel,
    )
    .await;

    state.shell_inputs.remove(&conn);
    if holds_lock && state.lock.force_release(&conn).await {
        let status = state.lock.status().await;
        let _ = state
            .hub
            .broadcast(
                &ServerMessage::LockStatus {
                    locked: status.locked,
                    owner: status.owner,
                },
                None,
                DeliveryPolicy::BestEffort,
            )
            .await;
    }

    state
        .recorder
        .record_execution(ExecutionRecord::new(
            conn.as_str(),
            &target_name,
            &command,
            outcome,
        ))
        .await;
}

#[allow(clippy::too_many_arguments)]
async fn execute(
    state: &Arc<ServerState>,
    conn: &ConnectionId,
    target_name: &str,
    target: TargetConfig,
    command: &str,
    phrase: &str,
    flush_interval: Duration,
    step: Option<u8>,
    cancel: &CancellationToken,
) -> &'static str {
    let mut channel = RemoteShellChannel::new(
        target_name,
        target,
        state.config.connect_timeout,
        state.config.connect_attempts,
    );

    state
        .hub
        .send_one(
            conn,
            &ServerMessage::Status {
                message: format!("Connecting to {target_name}..."),
            },
        )
        .await;

    // Cancellation must interrupt the connect phase too; dropping the
    // connect future abandons the in-flight attempt and its retry sleeps.
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = channel.connect() => Some(result),
    };
    let Some(connect_result) = connected else {
        tracing::info!(connection = %conn, target_name, "cancelled while connecting");
        state
            .hub
            .send_one(
                conn,
                &ServerMessage::Status {
                    message: "Command cancelled".to_string(),
                },
            )
            .await;
        channel.disconnect().await;
        return "cancelled";
    };
    if let Err(e) = connect_result {
        tracing::warn!(connection = %conn, target_name, error = %e, "connect failed");
        state
            .hub
            .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
            .await;
        return "connect_failed";
    }

    if let Err(e) = channel.open_shell().await {
        state
            .hub
            .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
            .await;
        channel.disconnect().await;
        return "shell_failed";
    }

    state
        .hub
        .send_one(
            conn,
            &ServerMessage::Status {
                message: "Connected, starting interactive shell".to_string(),
            },
        )
        .await;

    let (input_tx, mut input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    state.shell_inputs.insert(conn.clone(), input_tx);

    // A small forwarding task keeps the shell loop free of hub latency
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTPUT_CHANNEL_CAPACITY);
    let forward_state = Arc::clone(state);
    let forward_conn = conn.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(chunk) = out_rx.recv().await {
            forward_state
                .hub
                .send_one(&forward_conn, &ServerMessage::Output { data: chunk })
                .await;
        }
    });

    let result = channel
        .run(command, phrase, flush_interval, cancel, &mut input_rx, &out_tx)
        .await;
    drop(out_tx);
    let _ = forwarder.await;
    channel.disconnect().await;

    match result {
        Ok(JobOutcome::Completed) => {
            if step == Some(FINAL_PIPELINE_STEP) && state.sessions.force_release(conn).await {
                let status = state.sessions.status().await;
                let _ = state
                    .hub
                    .broadcast(
                        &ServerMessage::SessionStatus {
                            active: status.active,
                            owner: status.owner,
                        },
                        None,
                        DeliveryPolicy::BestEffort,
                    )
                    .await;
            }
            state
                .hub
                .send_one(
                    conn,
                    &ServerMessage::Complete {
                        message: "Command execution completed".to_string(),
                    },
                )
                .await;
            "completed"
        }
        Ok(JobOutcome::Cancelled) => {
            state
                .hub
                .send_one(
                    conn,
                    &ServerMessage::Status {
                        message: "Command cancelled".to_string(),
                    },
                )
                .await;
            "cancelled"
        }
        Ok(JobOutcome::EndedAbnormally) => {
            state
                .hub
                .send_one(
                    conn,
                    &ServerMessage::Complete {
                        message: "Shell ended before the completion phrase".to_string(),
                    },
                )
                .await;
            "ended_abnormally"
        }
        Err(e) => {
            tracing::error!(connection = %conn, target_name, error = %e, "command run failed");
            state
                .hub
                .send_one(conn, &ServerMessage::error(e.error_code(), e.to_string(), None))
                .await;
            "failed"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Probe;
    use crate::history::NullRecorder;
    use async_trait::async_trait;
    use sb_core::config::ServerConfig;
    use sb_protocol::ErrorCode;

    struct UpProbe;

    #[async_trait]
    impl Probe for UpProbe {
        async fn check(&self, _host: &str, _port: u16) -> bool {
            true
        }
    }

    fn test_state() -> Arc<ServerState> {
        let mut config = ServerConfig::default();
        config.targets.insert(
            "mdwap1p".to_string(),
            TargetConfig {
                host: "127.0.0.1".to_string(),
                port: 1, // nothing listens here
                username: "batch".to_string(),
                password: "pw".to_string(),
                description: None,
            },
        );
        config.connect_attempts = 1;
        config.connect_timeout = Duration::from_millis(200);
        Arc::new(ServerState::with_parts(
            config,
            Arc::new(UpProbe),
            Arc::new(NullRecorder),
        ))
    }

    fn conn(s: &str) -> ConnectionId {
        ConnectionId(s.to_string())
    }

    async fn connect_console(
        orch: &RemoteTaskOrchestrator,
        id: &str,
    ) -> (ConnectionId, mpsc::Receiver<String>) {
        let c = conn(id);
        let (tx, rx) = mpsc::channel(64);
        orch.on_connect(&c, tx).await;
        (c, rx)
    }

    async fn next_json(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_welcome_carries_current_shared_state() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (_a, mut rx) = connect_console(&orch, "a").await;

        let welcome = next_json(&mut rx).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["connection_id"], "a");
        assert_eq!(welcome["session_status"]["active"], false);
        assert_eq!(welcome["lock_status"]["locked"], false);
        // No probe cycle has run yet, so the target reports unhealthy
        assert_eq!(welcome["server_health"]["mdwap1p"]["is_healthy"], false);
    }

    #[tokio::test]
    async fn test_second_console_cannot_start_session() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx_a) = connect_console(&orch, "a").await;
        let (b, mut rx_b) = connect_console(&orch, "b").await;
        let _ = next_json(&mut rx_a).await; // welcome
        let _ = next_json(&mut rx_b).await;

        orch.handle(&a, ClientMessage::StartSession).await;
        let broadcast = next_json(&mut rx_b).await;
        assert_eq!(broadcast["type"], "session_status");
        assert_eq!(broadcast["owner"], "a");

        orch.handle(&b, ClientMessage::StartSession).await;
        let rejection = next_json(&mut rx_b).await;
        assert_eq!(rejection["type"], "error");
        assert_eq!(
            rejection["error_code"],
            ErrorCode::SessionAlreadyActive.as_u16()
        );
    }

    #[tokio::test]
    async fn test_run_command_while_another_console_owns_the_session() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx_a) = connect_console(&orch, "a").await;
        let (b, mut rx_b) = connect_console(&orch, "b").await;
        let _ = next_json(&mut rx_a).await;
        let _ = next_json(&mut rx_b).await;

        orch.handle(&a, ClientMessage::StartSession).await;
        let _ = next_json(&mut rx_b).await; // active broadcast

        orch.handle(
            &b,
            ClientMessage::RunCommand {
                target: "mdwap1p".to_string(),
                command: "ls".to_string(),
                step: None,
                completion_phrase: None,
                flush_interval_ms: None,
            },
        )
        .await;

        let rejection = next_json(&mut rx_b).await;
        assert_eq!(rejection["type"], "error");
        assert_eq!(
            rejection["error_code"],
            ErrorCode::SessionAlreadyActive.as_u16()
        );
    }

    #[tokio::test]
    async fn test_cancel_during_connect_completes_within_budget() {
        // A listener that accepts but never speaks SSH keeps the connect
        // attempt pending until its timeout.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = ServerConfig::default();
        config.targets.insert(
            "quiet".to_string(),
            TargetConfig {
                host: "127.0.0.1".to_string(),
                port,
                username: "batch".to_string(),
                password: "pw".to_string(),
                description: None,
            },
        );
        config.connect_timeout = Duration::from_secs(30);
        config.connect_attempts = 3;
        config.cancel_timeout = Duration::from_secs(1);
        let state = Arc::new(ServerState::with_parts(
            config,
            Arc::new(UpProbe),
            Arc::new(NullRecorder),
        ));

        let orch = RemoteTaskOrchestrator::new(Arc::clone(&state));
        let (a, mut rx) = connect_console(&orch, "a").await;
        let _ = next_json(&mut rx).await;

        orch.handle(
            &a,
            ClientMessage::RunCommand {
                target: "quiet".to_string(),
                command: "ls".to_string(),
                step: None,
                completion_phrase: None,
                flush_interval_ms: None,
            },
        )
        .await;

        let locked = next_json(&mut rx).await;
        assert_eq!(locked["type"], "lock_status");

        tokio::time::sleep(Duration::from_millis(200)).await;
        orch.handle(&a, ClientMessage::CancelTask).await;

        // The job must stop inside the cancellation budget, never with a
        // cancel-timeout error
        let mut saw_cancelled = false;
        for _ in 0..6 {
            let msg = next_json(&mut rx).await;
            assert_ne!(msg["type"], "error");
            if msg["type"] == "status" && msg["message"] == "Task cancelled" {
                saw_cancelled = true;
                break;
            }
        }
        assert!(saw_cancelled);
        assert!(state.lock.owner().await.is_none());
        drop(listener);
    }

    #[tokio::test]
    async fn test_owner_disconnect_frees_session_for_remaining_consoles() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx_a) = connect_console(&orch, "a").await;
        let (_b, mut rx_b) = connect_console(&orch, "b").await;
        let _ = next_json(&mut rx_a).await;
        let _ = next_json(&mut rx_b).await;

        orch.handle(&a, ClientMessage::StartSession).await;
        let _ = next_json(&mut rx_b).await; // active broadcast

        orch.on_disconnect(&a).await;
        let freed = next_json(&mut rx_b).await;
        assert_eq!(freed["type"], "session_status");
        assert_eq!(freed["active"], false);
        assert!(freed["owner"].is_null());
    }

    #[tokio::test]
    async fn test_run_command_against_unknown_target_is_rejected() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx) = connect_console(&orch, "a").await;
        let _ = next_json(&mut rx).await;

        orch.handle(
            &a,
            ClientMessage::RunCommand {
                target: "nosuch".to_string(),
                command: "ls".to_string(),
                step: None,
                completion_phrase: None,
                flush_interval_ms: None,
            },
        )
        .await;

        let error = next_json(&mut rx).await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["error_code"], ErrorCode::TargetNotFound.as_u16());
    }

    #[tokio::test]
    async fn test_standalone_run_takes_and_releases_the_lock() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(Arc::clone(&state));
        let (a, mut rx) = connect_console(&orch, "a").await;
        let _ = next_json(&mut rx).await;

        // Port 1 refuses the connection; the job still locks first and
        // unlocks on its way out.
        orch.handle(
            &a,
            ClientMessage::RunCommand {
                target: "mdwap1p".to_string(),
                command: "ls".to_string(),
                step: None,
                completion_phrase: None,
                flush_interval_ms: None,
            },
        )
        .await;

        let locked = next_json(&mut rx).await;
        assert_eq!(locked["type"], "lock_status");
        assert_eq!(locked["locked"], true);

        // connecting status, connect error, unlock broadcast follow
        let mut saw_unlock = false;
        for _ in 0..4 {
            let msg = next_json(&mut rx).await;
            if msg["type"] == "lock_status" && msg["locked"] == false {
                saw_unlock = true;
                break;
            }
        }
        assert!(saw_unlock);
        assert!(state.lock.owner().await.is_none());
    }

    #[tokio::test]
    async fn test_shell_input_without_open_shell_is_an_error() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx) = connect_console(&orch, "a").await;
        let _ = next_json(&mut rx).await;

        orch.handle(
            &a,
            ClientMessage::ShellInput {
                input: "y".to_string(),
            },
        )
        .await;

        let error = next_json(&mut rx).await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["error_code"], ErrorCode::ChannelUnavailable.as_u16());
    }

    #[tokio::test]
    async fn test_cancel_with_no_task_reports_status() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx) = connect_console(&orch, "a").await;
        let _ = next_json(&mut rx).await;

        orch.handle(&a, ClientMessage::CancelTask).await;
        let status = next_json(&mut rx).await;
        assert_eq!(status["type"], "status");
    }

    #[tokio::test]
    async fn test_get_lock_status_is_unicast() {
        let state = test_state();
        let orch = RemoteTaskOrchestrator::new(state);
        let (a, mut rx_a) = connect_console(&orch, "a").await;
        let (_b, mut rx_b) = connect_console(&orch, "b").await;
        let _ = next_json(&mut rx_a).await;
        let _ = next_json(&mut rx_b).await;

        orch.handle(&a, ClientMessage::GetLockStatus).await;
        let status = next_json(&mut rx_a).await;
        assert_eq!(status["type"], "lock_status");
        assert!(rx_b.try_recv().is_err());
    }
}
