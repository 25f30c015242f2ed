//! sb-server: The shellbridge daemon
//!
//! Coordinates long-running remote shell jobs for operator consoles:
//! WebSocket front end, single-owner session/lock coordination, a
//! streaming SSH shell engine, parallel message fan-out, and background
//! target health monitoring.

pub mod coordinate;
pub mod health;
pub mod history;
pub mod hub;
pub mod orchestrator;
pub mod server;
pub mod shell;
pub mod state;

pub use orchestrator::RemoteTaskOrchestrator;
pub use state::ServerState;
