//! sb-core: Core types, errors, and configuration for shellbridge

pub mod config;
pub mod error;
pub mod types;

pub use error::{
    BroadcastError, CancelError, CommandError, ConfigError, ConnectionError, CoordinationError,
};
pub use types::ConnectionId;
