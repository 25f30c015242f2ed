//! SSH transport and interactive shell channel
//!
//! Connects to a target over SSH, opens a PTY-backed shell, and runs one
//! command at a time until its completion phrase appears, the job is
//! cancelled, or the remote side goes away.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sb_core::config::TargetConfig;
use sb_core::error::{CommandError, ConnectionError};

use super::assembler::{AssemblerEvent, OutputAssembler};

/// How long to wait for channel data before checking for idle flushes
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settle time after opening the shell, so login banners and prompts
/// don't bleed into the first command's output
const BANNER_SETTLE: Duration = Duration::from_millis(300);

/// Grace period after sending `exit`, letting trailing output arrive
/// before the channel is torn down
const EXIT_DRAIN: Duration = Duration::from_millis(100);

/// Pause between connection attempts
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// How a command execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The completion phrase appeared on a completed output line
    Completed,
    /// The job was cancelled and the channel torn down
    Cancelled,
    /// The remote side closed the stream before the phrase appeared
    EndedAbnormally,
}

/// An SSH connection to one target, with at most one open shell channel
pub struct RemoteShellChannel {
    target_name: String,
    target: TargetConfig,
    connect_timeout: Duration,
    connect_attempts: u32,
    session: Option<Handle<ShellHandler>>,
    channel: Option<Channel<Msg>>,
}

/// Owned result of one select iteration, so channel borrows end before
/// any writes back to the channel
enum PollStep {
    Cancelled,
    Input(Option<String>),
    Data(Vec<u8>),
    Idle,
    StreamClosed,
}

impl RemoteShellChannel {
    pub fn new(
        target_name: impl Into<String>,
        target: TargetConfig,
        connect_timeout: Duration,
        connect_attempts: u32,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            target,
            connect_timeout,
            connect_attempts: connect_attempts.max(1),
            session: None,
            channel: None,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Establish the SSH session, retrying transient failures.
    ///
    /// Authentication is two-phase: `none` first (some appliances accept it),
    /// then password. An authentication rejection is terminal and never
    /// retried.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let mut last_err = None;
        for attempt in 1..=self.connect_attempts {
            match self.try_connect().await {
                Ok(session) => {
                    tracing::info!(
                        target_name = %self.target_name,
                        host = %self.target.host,
                        attempt,
                        "connected to target"
                    );
                    self.session = Some(session);
                    return Ok(());
                }
                Err(e @ ConnectionError::AuthFailed { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        target_name = %self.target_name,
                        attempt,
                        error = %e,
                        "connection attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.connect_attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(ConnectionError::Failed {
            host: self.target.host.clone(),
            reason: "no connection attempts made".to_string(),
        }))
    }

    async fn try_connect(&self) -> Result<Handle<ShellHandler>, ConnectionError> {
        let ssh_config = Arc::new(Config::default());
        let address = (self.target.host.as_str(), self.target.port);

        let mut session = tokio::time::timeout(
            self.connect_timeout,
            client::connect(ssh_config, address, ShellHandler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            host: self.target.host.clone(),
            timeout_secs: self.connect_timeout.as_secs(),
        })?
        .map_err(|e| ConnectionError::Failed {
            host: self.target.host.clone(),
            reason: e.to_string(),
        })?;

        let authenticated = session
            .authenticate_none(&self.target.username)
            .await
            .unwrap_or(false);

        let authenticated = if authenticated {
            true
        } else {
            session
                .authenticate_password(&self.target.username, &self.target.password)
                .await
                .map_err(|e| ConnectionError::Failed {
                    host: self.target.host.clone(),
                    reason: format!("authentication error: {e}"),
                })?
        };

        if !authenticated {
            return Err(ConnectionError::AuthFailed {
                host: self.target.host.clone(),
            });
        }

        Ok(session)
    }

    /// Open a PTY-backed interactive shell and let the banner settle
    pub async fn open_shell(&mut self) -> Result<(), CommandError> {
        let session = self
            .session
            .as_ref()
            .ok_or(CommandError::ChannelUnavailable)?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(|_| CommandError::ChannelUnavailable)?;

        channel
            .request_pty(false, "xterm", 80, 24, 0, 0, &[])
            .await
            .map_err(|_| CommandError::ChannelUnavailable)?;
        channel
            .request_shell(false)
            .await
            .map_err(|_| CommandError::ChannelUnavailable)?;

        self.channel = Some(channel);

        // Discard whatever the login shell prints on its own
        let deadline = Instant::now() + BANNER_SETTLE;
        while Instant::now() < deadline {
            let channel = match self.channel.as_mut() {
                Some(c) => c,
                None => break,
            };
            match tokio::time::timeout(Duration::from_millis(50), channel.wait()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {}
            }
        }

        Ok(())
    }

    /// Run one command to completion, streaming throttled output chunks.
    ///
    /// The stream ends when the completion phrase appears on a completed
    /// line, the cancellation token fires, or the remote closes the channel.
    /// In every case the shell channel is closed before returning; the
    /// session survives for later commands.
    pub async fn run(
        &mut self,
        command: &str,
        completion_phrase: &str,
        flush_interval: Duration,
        cancel: &CancellationToken,
        input_rx: &mut mpsc::Receiver<String>,
        output_tx: &mpsc::Sender<String>,
    ) -> Result<JobOutcome, CommandError> {
        self.send_line(command).await?;

        let mut asm = OutputAssembler::new(completion_phrase, flush_interval, Instant::now());
        let mut input_open = true;

        let outcome = loop {
            let step = {
                let channel = self
                    .channel
                    .as_mut()
                    .ok_or(CommandError::ChannelUnavailable)?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => PollStep::Cancelled,
                    input = input_rx.recv(), if input_open => PollStep::Input(input),
                    polled = tokio::time::timeout(POLL_INTERVAL, channel.wait()) => {
                        match polled {
                            Err(_) => PollStep::Idle,
                            Ok(None) => PollStep::StreamClosed,
                            Ok(Some(ChannelMsg::Data { data })) => PollStep::Data(data.to_vec()),
                            Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                                PollStep::Data(data.to_vec())
                            }
                            Ok(Some(ChannelMsg::Eof)) | Ok(Some(ChannelMsg::Close)) => {
                                PollStep::StreamClosed
                            }
                            Ok(Some(_)) => PollStep::Idle,
                        }
                    }
                }
            };

            match step {
                PollStep::Cancelled => {
                    tracing::info!(target_name = %self.target_name, "job cancelled, closing channel");
                    self.close_channel().await;
                    break JobOutcome::Cancelled;
                }
                PollStep::Input(Some(line)) => {
                    self.send_line(&line).await?;
                }
                PollStep::Input(None) => {
                    // Input side dropped; keep streaming output
                    input_open = false;
                }
                PollStep::Idle => {
                    if let Some(chunk) = asm.idle(Instant::now()) {
                        forward(output_tx, chunk).await;
                    }
                }
                PollStep::StreamClosed => {
                    if let Some(chunk) = asm.flush_remaining() {
                        forward(output_tx, chunk).await;
                    }
                    forward(
                        output_tx,
                        "[WARN] remote shell closed before completion phrase\n".to_string(),
                    )
                    .await;
                    self.close_channel().await;
                    break JobOutcome::EndedAbnormally;
                }
                PollStep::Data(data) => {
                    let events = asm.push(&data, Instant::now());
                    if forward_events(events, completion_phrase, output_tx).await {
                        tracing::info!(
                            target_name = %self.target_name,
                            "completion phrase detected"
                        );
                        self.finish_command(&mut asm, output_tx).await;
                        break JobOutcome::Completed;
                    }
                }
            }
        };

        Ok(outcome)
    }

    /// Exit the remote shell cleanly, draining trailing output first
    async fn finish_command(&mut self, asm: &mut OutputAssembler, output_tx: &mpsc::Sender<String>) {
        if let Some(channel) = self.channel.as_ref() {
            let _ = channel.data(&b"exit\n"[..]).await;
        }
        tokio::time::sleep(EXIT_DRAIN).await;

        if let Some(channel) = self.channel.as_mut() {
            // Collect whatever arrived during the grace period
            while let Ok(Some(msg)) =
                tokio::time::timeout(Duration::from_millis(20), channel.wait()).await
            {
                if let ChannelMsg::Data { data } = msg {
                    for event in asm.push(&data, Instant::now()) {
                        if let AssemblerEvent::Flush(chunk) = event {
                            forward(output_tx, chunk).await;
                        }
                    }
                }
            }
        }
        if let Some(chunk) = asm.flush_remaining() {
            forward(output_tx, chunk).await;
        }
        self.close_channel().await;
    }

    async fn send_line(&self, line: &str) -> Result<(), CommandError> {
        let channel = self
            .channel
            .as_ref()
            .ok_or(CommandError::ChannelUnavailable)?;
        let payload = format!("{line}\n");
        channel
            .data(payload.as_bytes())
            .await
            .map_err(|_| CommandError::ChannelUnavailable)
    }

    /// Close the shell channel. Idempotent; a second call is a no-op.
    pub async fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = channel.eof().await;
            let _ = channel.close().await;
        }
    }

    /// Tear down the whole connection. Idempotent.
    pub async fn disconnect(&mut self) {
        self.close_channel().await;
        if let Some(session) = self.session.take() {
            let _ = session
                .disconnect(Disconnect::ByApplication, "closing", "en")
                .await;
        }
    }
}

async fn forward(output_tx: &mpsc::Sender<String>, chunk: String) {
    if output_tx.send(chunk).await.is_err() {
        tracing::debug!("output receiver dropped, discarding chunk");
    }
}

/// Final stream chunk announcing that the completion phrase was seen
fn completion_marker(phrase: &str) -> String {
    format!("\n[INFO] completion phrase detected -> {phrase}\n")
}

/// Forward assembled output downstream. Returns true once the completion
/// phrase has been detected, after emitting the marker chunk for it.
async fn forward_events(
    events: Vec<AssemblerEvent>,
    completion_phrase: &str,
    output_tx: &mpsc::Sender<String>,
) -> bool {
    let mut completed = false;
    for event in events {
        match event {
            AssemblerEvent::Flush(chunk) => forward(output_tx, chunk).await,
            AssemblerEvent::CompletionDetected { line } => {
                tracing::debug!(line = %line, "completion phrase matched");
                forward(output_tx, completion_marker(completion_phrase)).await;
                completed = true;
            }
        }
    }
    completed
}

/// Reachability check used by the health monitor: TCP connect and close
/// within the timeout. Deliberately cheaper than a full SSH handshake.
pub async fn check_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Minimal client handler; targets live on trusted networks, so any host
/// key is accepted.
struct ShellHandler;


#[async_trait]
impl client::Handler for ShellHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("server host key: {}", server_public_key.fingerprint());
        Ok(true)
    }
}
