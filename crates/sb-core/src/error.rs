//! Core error types for shellbridge
//!
//! One enum per concern, mirroring how each failure is handled: connection
//! errors are retried only at connect time, coordination errors are
//! rejected-request outcomes surfaced to the requester, cancellation errors
//! are always surfaced, broadcast errors are advisory.

use crate::types::ConnectionId;
use sb_protocol::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors establishing or using the remote transport.
///
/// Transport-level failures are retried at connect time only;
/// authentication rejection is never retried.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// All authentication methods were rejected
    #[error("Authentication failed for {host}")]
    AuthFailed { host: String },

    /// Transport could not be established
    #[error("Connection to {host} failed: {reason}")]
    Failed { host: String, reason: String },

    /// Transport establishment timed out
    #[error("Connection to {host} timed out after {timeout_secs}s")]
    Timeout { host: String, timeout_secs: u64 },
}

impl ConnectionError {
    /// Stable numeric code for outbound `error` messages
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ConnectionError::AuthFailed { .. } => ErrorCode::AuthFailed,
            ConnectionError::Failed { .. } => ErrorCode::ConnectionFailed,
            ConnectionError::Timeout { .. } => ErrorCode::ConnectionTimeout,
        }
    }
}

/// Errors running a command over an interactive channel
#[derive(Error, Debug)]
pub enum CommandError {
    /// No interactive channel is open
    #[error("No interactive channel is open")]
    ChannelUnavailable,
}

impl CommandError {
    /// Stable numeric code for outbound `error` messages
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::ChannelUnavailable => ErrorCode::ChannelUnavailable,
        }
    }
}

/// Rejected-request outcomes from the coordination layer.
///
/// Never retried; surfaced only to the requesting connection.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoordinationError {
    /// Another connection owns the active session
    #[error("Session already active, owned by {owner}")]
    SessionAlreadyActive { owner: ConnectionId },

    /// No session is active
    #[error("No active session")]
    SessionNotActive,

    /// Requester does not own the session or lock it is releasing
    #[error("Permission denied: owned by {owner:?}")]
    PermissionDenied { owner: Option<ConnectionId> },

    /// The shared shell resource is held by another connection
    #[error("Resource locked by {owner}")]
    ResourceLocked { owner: ConnectionId },

    /// A non-finished task already exists for this connection
    #[error("Task already running for {connection}")]
    TaskAlreadyRunning { connection: ConnectionId },
}

impl CoordinationError {
    /// Stable numeric code for outbound `error` messages
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CoordinationError::SessionAlreadyActive { .. } => ErrorCode::SessionAlreadyActive,
            CoordinationError::SessionNotActive => ErrorCode::SessionNotActive,
            CoordinationError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            CoordinationError::ResourceLocked { .. } => ErrorCode::ResourceLocked,
            CoordinationError::TaskAlreadyRunning { .. } => ErrorCode::TaskAlreadyRunning,
        }
    }
}

/// Cancellation outcomes that must always be surfaced.
///
/// An orphaned remote process is a hazard, so neither variant is ever
/// silently dropped.
#[derive(Error, Debug)]
pub enum CancelError {
    /// The job did not finish within the cancellation budget
    #[error("Cancellation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The job surfaced a non-cancellation failure while stopping
    #[error("Cancellation failed: {0}")]
    Failed(String),
}

impl CancelError {
    /// Stable numeric code for outbound `error` messages
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CancelError::Timeout { .. } => ErrorCode::CancelTimeout,
            CancelError::Failed(_) => ErrorCode::CancelFailed,
        }
    }
}

/// Fan-out delivery failures.
///
/// Advisory only: the state change that triggered the broadcast has already
/// committed and is not rolled back.
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// Some recipients could not be reached
    #[error("Broadcast partially failed: {}/{total} recipients unreachable", failed.len())]
    Partial {
        total: usize,
        failed: Vec<ConnectionId>,
    },

    /// No recipient could be reached
    #[error("Broadcast totally failed: all {total} recipients unreachable")]
    Total {
        total: usize,
        failed: Vec<ConnectionId>,
    },
}

impl BroadcastError {
    /// Stable numeric code for outbound `error` messages
    pub fn error_code(&self) -> ErrorCode {
        match self {
            BroadcastError::Partial { .. } => ErrorCode::BroadcastPartial,
            BroadcastError::Total { .. } => ErrorCode::BroadcastTotal,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Target name is not configured
    #[error("Target not found: {name}")]
    TargetNotFound { name: String },
}

impl ConfigError {
    /// Stable numeric code for outbound `error` messages
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ConfigError::TargetNotFound { .. } => ErrorCode::TargetNotFound,
            _ => ErrorCode::Internal,
        }
    }
}
