//! Message types for the shellbridge console protocol
//!
//! Inbound messages are discriminated by `action`, outbound messages by
//! `type`. Every inbound variant declares its required fields up front:
//! a request missing a field fails deserialization instead of being
//! silently tolerated downstream.
//!
//! # Message Flow
//!
//! Typical sequence for one reconciliation run:
//!
//! 1. Console connects; server sends `welcome` with the current lock,
//!    session, and target-health snapshot
//! 2. Console sends `start_session` (or goes straight to `run_command`,
//!    which takes the shared resource lock instead)
//! 3. Server streams `status`, `output` chunks, then `complete` or `error`
//! 4. `session_status` / `lock_status` / `server_health` broadcasts arrive
//!    on all consoles whenever shared state changes

use serde::{Deserialize, Serialize};

/// Pipeline step that must acquire session ownership before running
pub const FIRST_PIPELINE_STEP: u8 = 1;

/// Pipeline step that releases session ownership when it completes
pub const FINAL_PIPELINE_STEP: u8 = 3;

/// Messages sent by operator consoles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim exclusive ownership of the remote-execution subsystem
    StartSession,

    /// Release session ownership (owner only)
    EndSession,

    /// Run a remote command on a named target, streaming output back
    RunCommand {
        /// Configured target name
        target: String,
        /// Command line to execute in the interactive shell
        command: String,
        /// Position in the reconciliation pipeline, if part of one.
        /// Step 1 acquires session ownership; the final step releases it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<u8>,
        /// Phrase that marks successful completion in the output.
        /// The server default covers the standard unload scripts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completion_phrase: Option<String>,
        /// Output flush throttle in milliseconds (default 100)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flush_interval_ms: Option<u64>,
    },

    /// Forward input to this connection's open interactive shell
    ShellInput {
        /// Raw text to write to the channel
        input: String,
    },

    /// Cancel this connection's running task
    CancelTask,

    /// Query the current resource-lock state
    GetLockStatus,
}

/// Session ownership snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Whether a session is active
    pub active: bool,
    /// Owning connection id, if any
    pub owner: Option<String>,
}

/// Resource-lock snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockStatus {
    /// Whether the shared shell resource is held
    pub locked: bool,
    /// Holding connection id, if any
    pub owner: Option<String>,
}

/// Health snapshot for one configured target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Remote host
    pub host: String,
    /// Remote port
    pub port: u16,
    /// Current hysteresis verdict
    pub is_healthy: bool,
    /// Last probe time, RFC 3339 (None before the first probe)
    pub last_checked: Option<String>,
    /// Consecutive failed probes
    pub consecutive_failures: u32,
    /// Consecutive successful probes
    pub consecutive_successes: u32,
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message after connect: current shared state
    Welcome {
        connection_id: String,
        lock_status: LockStatus,
        session_status: SessionStatus,
        server_health: std::collections::HashMap<String, HealthSnapshot>,
    },

    /// Session ownership changed (broadcast to all consoles)
    SessionStatus {
        active: bool,
        owner: Option<String>,
    },

    /// Resource lock changed (broadcast to all consoles)
    LockStatus {
        locked: bool,
        owner: Option<String>,
    },

    /// A chunk of remote shell output
    Output {
        data: String,
    },

    /// Progress note for the requesting console
    Status {
        message: String,
    },

    /// The requested command ran to completion
    Complete {
        message: String,
    },

    /// A request was rejected or a run failed
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<u16>,
    },

    /// A target's health verdict flipped (broadcast to all consoles)
    ServerHealth {
        server_name: String,
        is_healthy: bool,
        status: HealthSnapshot,
    },
}

impl ServerMessage {
    /// Build an `error` message with a stable code
    pub fn error(code: crate::ErrorCode, message: impl Into<String>, detail: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            detail,
            error_code: Some(code.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_action_tags() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"run_command","target":"mdwap1p","command":"unload.sh 42","step":1}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::RunCommand {
                target: "mdwap1p".into(),
                command: "unload.sh 42".into(),
                step: Some(1),
                completion_phrase: None,
                flush_interval_ms: None,
            }
        );
    }

    #[test]
    fn test_run_command_requires_target_and_command() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"action":"run_command","target":"mdwap1p"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_type_tags() {
        let json = serde_json::to_value(ServerMessage::SessionStatus {
            active: false,
            owner: None,
        })
        .unwrap();
        assert_eq!(json["type"], "session_status");
        assert_eq!(json["active"], false);
        assert!(json["owner"].is_null());
    }

    #[test]
    fn test_error_message_carries_numeric_code() {
        let json = serde_json::to_value(ServerMessage::error(
            crate::ErrorCode::ResourceLocked,
            "Resource is locked",
            Some("held by conn-1".into()),
        ))
        .unwrap();
        assert_eq!(json["error_code"], 13003);
        assert_eq!(json["detail"], "held by conn-1");
    }
}
