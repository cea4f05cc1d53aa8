use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
    /// A refresh call is outstanding.
    Refreshing,
    /// Credentials are held but the last refresh could not reach the server.
    Expired,
}

/// Transitions the UI layer can react to (e.g. route to a login view on `SignedOut`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    Refreshed,
    RefreshStalled { reason: String },
    SignedOut { reason: String },
}

/// Shared by the session and the refresh coordinator. The epoch increments on every
/// login/logout so an outstanding refresh can tell its session has been replaced.
pub struct StateTracker {
    state: RwLock<AuthState>,
    epoch: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl StateTracker {
    pub fn new(initial: AuthState) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { state: RwLock::new(initial), epoch: AtomicU64::new(0), events }
    }

    pub fn get(&self) -> AuthState { *self.state.read() }

    pub fn set(&self, next: AuthState) {
        let mut guard = self.state.write();
        if *guard != next {
            debug!(target: "sessionguard::session", "state {:?} -> {:?}", *guard, next);
            *guard = next;
        }
    }

    pub fn epoch(&self) -> u64 { self.epoch.load(Ordering::SeqCst) }
    pub fn bump_epoch(&self) -> u64 { self.epoch.fetch_add(1, Ordering::SeqCst) + 1 }

    pub fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }
}
