//! Session, lock, and task coordination
//!
//! Serializes access to the shared remote resource: at most one session
//! owner, at most one lock holder, at most one running job per connection.

pub mod session;
pub mod tasks;

pub use session::{ResourceLock, SessionCoordinator};
pub use tasks::TaskLifecycle;
