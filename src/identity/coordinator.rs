//! Single-flight token refresh.
//!
//! The first caller that finds no refresh in flight records a `PendingRefresh` and spawns the
//! remote call on its own task; everyone arriving while it is outstanding registers a waiter
//! on that record instead of calling the server again. When the call settles, credentials and
//! state are updated under the slot lock and every waiter gets the same outcome, in
//! registration order. Running the call on a detached task means a caller that gives up
//! waiting cannot strand the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec;
use super::provider::{AuthProvider, TokenPair};
use super::state::{AuthState, SessionEvent, StateTracker};
use super::store::CredentialStore;
use crate::error::{AuthError, AuthResult};

type Waiter = oneshot::Sender<AuthResult<String>>;

const ABORTED: &str = "refresh task aborted";

/// What the caller knows about the token it wants replaced.
#[derive(Clone, Copy)]
enum Stale<'a> {
    Unknown,
    /// Found expired (or the session was Expired/Refreshing) when read.
    Expired(&'a str),
    /// Sent and answered with 401.
    Rejected(&'a str),
}

struct PendingRefresh {
    id: Uuid,
    /// Session epoch when the refresh started; a mismatch on completion discards the result.
    epoch: u64,
    waiters: Vec<Waiter>,
}

pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn AuthProvider>,
    state: Arc<StateTracker>,
    skew: Duration,
    pending: Mutex<Option<PendingRefresh>>,
    remote_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn AuthProvider>, state: Arc<StateTracker>, skew: Duration) -> Arc<Self> {
        Arc::new(Self { store, provider, state, skew, pending: Mutex::new(None), remote_calls: AtomicU64::new(0) })
    }

    pub fn is_refreshing(&self) -> bool { self.pending.lock().is_some() }

    /// Number of refresh calls sent to the auth endpoint so far.
    pub fn remote_calls(&self) -> u64 { self.remote_calls.load(Ordering::SeqCst) }

    /// Run `f` with the pending slot locked, serialising it against a refresh settling.
    /// `f` must not call back into the coordinator.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _slot = self.pending.lock();
        f()
    }

    /// Obtain a new access token, joining the in-flight refresh if there is one.
    pub async fn refresh(self: &Arc<Self>) -> AuthResult<String> {
        self.refresh_replacing(Stale::Unknown).await
    }

    /// Replace `stale`, an access token the caller found expired. If another caller already
    /// rotated it and the stored token is still good, that token is returned without a call.
    pub async fn replace_stale(self: &Arc<Self>, stale: &str) -> AuthResult<String> {
        self.refresh_replacing(Stale::Expired(stale)).await
    }

    /// Called after the server answered 401 to a request carrying `rejected`.
    pub async fn refresh_after_rejection(self: &Arc<Self>, rejected: &str) -> AuthResult<String> {
        self.refresh_replacing(Stale::Rejected(rejected)).await
    }

    async fn refresh_replacing(self: &Arc<Self>, stale: Stale<'_>) -> AuthResult<String> {
        let rx = {
            let mut slot = self.pending.lock();
            let (tx, rx) = oneshot::channel();
            match slot.as_mut() {
                Some(pending) => {
                    pending.waiters.push(tx);
                    debug!(target: "sessionguard::refresh", "refresh {} in flight, queued waiter #{}", pending.id, pending.waiters.len());
                }
                None => {
                    // settle writes under this lock, so store and state are current here
                    let creds = self.store.load();
                    if let Some(current) = creds.access_token.as_deref() {
                        if self.still_usable(current, stale) {
                            debug!(target: "sessionguard::refresh", "token already rotated, skipping refresh");
                            return Ok(current.to_string());
                        }
                    }
                    let Some(refresh_token) = creds.refresh_token else {
                        self.abandon_session("no refresh token");
                        return Err(AuthError::NoRefreshToken);
                    };
                    let id = Uuid::new_v4();
                    *slot = Some(PendingRefresh { id, epoch: self.state.epoch(), waiters: vec![tx] });
                    self.state.set(AuthState::Refreshing);
                    self.remote_calls.fetch_add(1, Ordering::SeqCst);
                    info!(target: "sessionguard::refresh", "starting refresh {}", id);
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.run(id, refresh_token).await });
                }
            }
            rx
        };
        match rx.await {
            Ok(result) => result,
            // the refresh task died without settling; SettleGuard already reset the slot
            Err(_) => Err(AuthError::refresh_failed(ABORTED)),
        }
    }

    fn still_usable(&self, current: &str, stale: Stale<'_>) -> bool {
        if codec::is_expired(current, self.skew) { return false; }
        match stale {
            Stale::Unknown => false,
            Stale::Rejected(t) => t != current,
            // a caller can read the rotated token before settle marks it Authenticated
            Stale::Expired(t) => t != current || self.state.get() == AuthState::Authenticated,
        }
    }

    async fn run(self: Arc<Self>, id: Uuid, refresh_token: String) {
        let mut guard = SettleGuard { coord: &*self, id, armed: true };
        let outcome = self.provider.refresh(&refresh_token).await;

        let (result, waiters) = {
            let mut slot = self.pending.lock();
            let Some(pending) = slot.take_if(|p| p.id == id) else {
                warn!(target: "sessionguard::refresh", "refresh {} settled but is no longer pending", id);
                guard.armed = false;
                return;
            };
            guard.armed = false;
            // state and credentials change before the slot is released, so a caller arriving
            // right after sees the settled session rather than a stale one
            (self.settle(pending.epoch, outcome), pending.waiters)
        };

        let n = waiters.len();
        for w in waiters {
            // a waiter that stopped listening is fine
            let _ = w.send(result.clone());
        }
        match &result {
            Ok(_) => info!(target: "sessionguard::refresh", "refresh {} succeeded, resolved {} waiter(s)", id, n),
            Err(e) => warn!(target: "sessionguard::refresh", "refresh {} failed ({}), rejected {} waiter(s)", id, e.code_str(), n),
        }
    }

    fn settle(&self, epoch: u64, outcome: AuthResult<TokenPair>) -> AuthResult<String> {
        if self.state.epoch() != epoch {
            return Err(AuthError::SessionEnded);
        }
        match outcome {
            Ok(pair) => {
                let next = self.store.load().with_tokens(pair.token.clone(), pair.refresh_token);
                if let Err(e) = self.store.save(&next) {
                    self.abandon_session("could not persist refreshed tokens");
                    return Err(e);
                }
                self.state.set(AuthState::Authenticated);
                self.state.emit(SessionEvent::Refreshed);
                Ok(pair.token)
            }
            Err(e @ AuthError::Network { .. }) => {
                // the refresh token may still be good; keep it so the caller can retry
                self.state.set(AuthState::Expired);
                self.state.emit(SessionEvent::RefreshStalled { reason: e.to_string() });
                Err(e)
            }
            Err(e) => {
                self.abandon_session(&e.to_string());
                Err(e)
            }
        }
    }

    /// Wipe all credentials and fall back to Anonymous.
    fn abandon_session(&self, reason: &str) {
        if let Err(e) = self.store.clear() {
            warn!(target: "sessionguard::refresh", "failed to clear credentials: {}", e);
        }
        let was = self.state.get();
        self.state.set(AuthState::Anonymous);
        if was != AuthState::Anonymous {
            self.state.emit(SessionEvent::SignedOut { reason: reason.to_string() });
        }
    }
}

/// Resets the pending slot if the refresh task is dropped or panics before settling;
/// dropping the slot drops every waiter's sender, which rejects them with `RefreshFailed`.
/// Credentials are kept: the server never answered, so the refresh token may still be good.
struct SettleGuard<'a> {
    coord: &'a RefreshCoordinator,
    id: Uuid,
    armed: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed { return; }
        let abandoned = self.coord.pending.lock().take_if(|p| p.id == self.id);
        if abandoned.is_some() {
            warn!(target: "sessionguard::refresh", "refresh {} aborted before settling", self.id);
            self.coord.state.set(AuthState::Expired);
        }
    }
}
