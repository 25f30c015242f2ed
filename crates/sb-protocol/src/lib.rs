//! sb-protocol: Wire messages for the shellbridge operator console
//!
//! This crate defines the JSON messages exchanged between operator consoles
//! and the shellbridge server over WebSocket, plus the stable numeric error
//! codes carried on outbound `error` messages.

pub mod error_code;
pub mod message;

pub use error_code::ErrorCode;
pub use message::{
    ClientMessage, HealthSnapshot, LockStatus, ServerMessage, SessionStatus, FINAL_PIPELINE_STEP,
    FIRST_PIPELINE_STEP,
};
