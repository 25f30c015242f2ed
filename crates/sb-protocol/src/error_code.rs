//! Stable numeric error codes
//!
//! Outbound `error` messages carry one of these codes so consoles can react
//! to specific failures without parsing message text. Codes are grouped by
//! concern: 1xxxx general/coordination, 2xxxx remote shell, 3xxxx delivery.
//! Existing values must never be reused for a different meaning.

/// Error code carried on outbound `error` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unclassified internal error
    Internal = 10000,
    /// Request payload failed validation
    InvalidRequest = 12000,
    /// A session is already active under another connection
    SessionAlreadyActive = 13000,
    /// No session is active to release
    SessionNotActive = 13001,
    /// Requester does not own the active session
    PermissionDenied = 13002,
    /// The shared shell resource is locked by another connection
    ResourceLocked = 13003,
    /// A task is already running for this connection
    TaskAlreadyRunning = 13004,

    /// Remote connection could not be established
    ConnectionFailed = 20000,
    /// Remote connection timed out
    ConnectionTimeout = 20001,
    /// Authentication was rejected by the remote host
    AuthFailed = 21000,
    /// Command ended without reaching its completion phrase
    CommandIncomplete = 22000,
    /// No interactive channel is open for input
    ChannelUnavailable = 22001,
    /// Target name is not configured
    TargetNotFound = 23000,

    /// Cancellation did not complete within its budget
    CancelTimeout = 24000,
    /// The cancelled job surfaced a non-cancellation failure
    CancelFailed = 24001,

    /// Broadcast reached only part of its audience
    BroadcastPartial = 33001,
    /// Broadcast reached nobody
    BroadcastTotal = 33000,
}

impl ErrorCode {
    /// Numeric value for the wire
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorCode::SessionAlreadyActive.as_u16(), 13000);
        assert_eq!(ErrorCode::ResourceLocked.as_u16(), 13003);
        assert_eq!(ErrorCode::AuthFailed.as_u16(), 21000);
        assert_eq!(ErrorCode::CancelTimeout.as_u16(), 24000);
        assert_eq!(ErrorCode::BroadcastPartial.as_u16(), 33001);
    }
}
