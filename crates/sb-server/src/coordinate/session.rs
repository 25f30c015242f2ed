//! Session ownership and the shared resource lock
//!
//! Both guard a single `Option<ConnectionId>` behind a mutex, so
//! "active" and "has an owner" are the same fact and cannot drift apart.
//! The critical sections contain no I/O; callers broadcast state changes
//! after the mutex is released.

use tokio::sync::Mutex;

use sb_core::error::CoordinationError;
use sb_core::ConnectionId;
use sb_protocol::{LockStatus, SessionStatus};

/// Why a release attempt on an owner cell failed
enum ReleaseFailure {
    NotHeld,
    HeldByOther(ConnectionId),
}

/// An owner slot shared by the session and lock coordinators
#[derive(Default)]
struct OwnerCell {
    owner: Mutex<Option<ConnectionId>>,
}

impl OwnerCell {
    /// Attempt to take ownership. Fails immediately with the current owner
    /// if the slot is held, including by the caller itself.
    async fn try_acquire(&self, conn: &ConnectionId) -> Result<(), ConnectionId> {
        let mut owner = self.owner.lock().await;
        match owner.as_ref() {
            Some(current) => Err(current.clone()),
            None => {
                *owner = Some(conn.clone());
                Ok(())
            }
        }
    }

    async fn release(&self, conn: &ConnectionId) -> Result<(), ReleaseFailure> {
        let mut owner = self.owner.lock().await;
        match owner.as_ref() {
            None => Err(ReleaseFailure::NotHeld),
            Some(current) if current != conn => {
                Err(ReleaseFailure::HeldByOther(current.clone()))
            }
            Some(_) => {
                *owner = None;
                Ok(())
            }
        }
    }

    /// Clear the slot if `conn` holds it. Returns whether state changed.
    async fn force_release(&self, conn: &ConnectionId) -> bool {
        let mut owner = self.owner.lock().await;
        if owner.as_ref() == Some(conn) {
            *owner = None;
            true
        } else {
            false
        }
    }

    async fn owner(&self) -> Option<ConnectionId> {
        self.owner.lock().await.clone()
    }
}

/// Tracks which connection, if any, owns the active session
#[derive(Default)]
pub struct SessionCoordinator {
    cell: OwnerCell,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session owned by `conn`
    pub async fn acquire(&self, conn: &ConnectionId) -> Result<(), CoordinationError> {
        self.cell
            .try_acquire(conn)
            .await
            .map_err(|owner| CoordinationError::SessionAlreadyActive { owner })
    }

    /// End the session. Only the owner may release it.
    pub async fn release(&self, conn: &ConnectionId) -> Result<(), CoordinationError> {
        self.cell.release(conn).await.map_err(|failure| match failure {
            ReleaseFailure::NotHeld => CoordinationError::SessionNotActive,
            ReleaseFailure::HeldByOther(owner) => CoordinationError::PermissionDenied {
                owner: Some(owner),
            },
        })
    }

    /// Disconnect path: clear the session if `conn` owns it.
    /// Returns whether a broadcastable transition happened.
    pub async fn force_release(&self, conn: &ConnectionId) -> bool {
        self.cell.force_release(conn).await
    }

    pub async fn owner(&self) -> Option<ConnectionId> {
        self.cell.owner().await
    }

    pub async fn status(&self) -> SessionStatus {
        let owner = self.cell.owner().await;
        SessionStatus {
            active: owner.is_some(),
            owner: owner.map(|id| id.0),
        }
    }
}

/// Guards the shared SSH resource for runs outside an active session
#[derive(Default)]
pub struct ResourceLock {
    cell: OwnerCell,
}

impl ResourceLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, conn: &ConnectionId) -> Result<(), CoordinationError> {
        self.cell
            .try_acquire(conn)
            .await
            .map_err(|owner| CoordinationError::ResourceLocked { owner })
    }

    pub async fn release(&self, conn: &ConnectionId) -> Result<(), CoordinationError> {
        self.cell.release(conn).await.map_err(|failure| match failure {
            ReleaseFailure::NotHeld => CoordinationError::PermissionDenied { owner: None },
            ReleaseFailure::HeldByOther(owner) => CoordinationError::PermissionDenied {
                owner: Some(owner),
            },
        })
    }

    pub async fn force_release(&self, conn: &ConnectionId) -> bool {
        self.cell.force_release(conn).await
    }

    pub async fn owner(&self) -> Option<ConnectionId> {
        self.cell.owner().await
    }

    pub async fn status(&self) -> LockStatus {
        let owner = self.cell.owner().await;
        LockStatus {
            locked: owner.is_some(),
            owner: owner.map(|id| id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(s: &str) -> ConnectionId {
        ConnectionId(s.to_string())
    }

    #[tokio::test]
    async fn test_session_acquire_is_exclusive() {
        let sessions = SessionCoordinator::new();
        let a = conn("a");
        let b = conn("b");

        sessions.acquire(&a).await.unwrap();
        let err = sessions.acquire(&b).await.unwrap_err();
        assert_eq!(
            err,
            CoordinationError::SessionAlreadyActive { owner: a.clone() }
        );

        // Re-acquiring by the owner is also rejected
        let err = sessions.acquire(&a).await.unwrap_err();
        assert_eq!(err, CoordinationError::SessionAlreadyActive { owner: a });
    }

    #[tokio::test]
    async fn test_session_release_requires_ownership() {
        let sessions = SessionCoordinator::new();
        let a = conn("a");
        let b = conn("b");

        assert_eq!(
            sessions.release(&a).await.unwrap_err(),
            CoordinationError::SessionNotActive
        );

        sessions.acquire(&a).await.unwrap();
        assert_eq!(
            sessions.release(&b).await.unwrap_err(),
            CoordinationError::PermissionDenied {
                owner: Some(a.clone())
            }
        );

        sessions.release(&a).await.unwrap();
        assert!(sessions.owner().await.is_none());
    }

    #[tokio::test]
    async fn test_active_iff_owner_present() {
        let sessions = SessionCoordinator::new();
        let a = conn("a");

        let status = sessions.status().await;
        assert!(!status.active);
        assert!(status.owner.is_none());

        sessions.acquire(&a).await.unwrap();
        let status = sessions.status().await;
        assert!(status.active);
        assert_eq!(status.owner.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_force_release_only_clears_own_state() {
        let sessions = SessionCoordinator::new();
        let a = conn("a");
        let b = conn("b");

        sessions.acquire(&a).await.unwrap();
        assert!(!sessions.force_release(&b).await);
        assert_eq!(sessions.owner().await, Some(a.clone()));

        assert!(sessions.force_release(&a).await);
        assert!(sessions.owner().await.is_none());

        // Second force-release reports no transition
        assert!(!sessions.force_release(&a).await);
    }

    #[tokio::test]
    async fn test_lock_conflict_names_holder() {
        let lock = ResourceLock::new();
        let a = conn("a");
        let b = conn("b");

        lock.acquire(&a).await.unwrap();
        assert_eq!(
            lock.acquire(&b).await.unwrap_err(),
            CoordinationError::ResourceLocked { owner: a.clone() }
        );

        assert_eq!(
            lock.release(&b).await.unwrap_err(),
            CoordinationError::PermissionDenied { owner: Some(a) }
        );
    }
}
