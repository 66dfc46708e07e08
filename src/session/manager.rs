//! Session manager: the single source of truth for "who is signed in" and
//! "are they an administrator".
//!
//! State is published through a watch channel; every other component is a
//! read-only observer. The privilege flag is fail-closed: it is false while
//! unknown, false while a check is in flight, and a check result is applied
//! only if the user it was issued for is still the signed-in user.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AdminDirectory, AuthEvent, AuthService, AuthSession, AuthUser, SignOutScope};
use crate::error::AppResult;

/// Snapshot of the process-wide authentication state.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub session: Option<AuthSession>,
    pub is_admin: bool,
    /// True until the initial restore (and, if a session exists, its first
    /// privilege check) has resolved.
    pub loading: bool,
}

impl AuthState {
    fn initial() -> Self {
        Self { session: None, is_admin: false, loading: true }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.session.as_ref().map(|s| &s.user)
    }

    fn reset_signed_out(&mut self) {
        self.session = None;
        self.is_admin = false;
    }
}

pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    admins: Arc<dyn AdminDirectory>,
    state: watch::Sender<AuthState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthService>, admins: Arc<dyn AdminDirectory>) -> Arc<Self> {
        let (state, _) = watch::channel(AuthState::initial());
        Arc::new(Self { auth, admins, state, tasks: Mutex::new(Vec::new()) })
    }

    /// Wire the session-change subscription, then perform the one-shot
    /// restore. The subscription is established first so an event firing in
    /// between cannot be lost. `loading` flips to false only once the restore
    /// and, when a session was restored, its first privilege check resolve.
    pub async fn initialize(self: &Arc<Self>) {
        let rx = self.auth.subscribe();
        let listener = tokio::spawn(listen(Arc::clone(self), rx));
        self.tasks.lock().push(listener);

        match self.auth.current_session().await {
            Ok(Some(session)) => {
                let user_id = session.user.id.clone();
                let mut applied = false;
                self.state.send_modify(|s| {
                    // A sign-in event may already have landed; never clobber it
                    if s.session.is_none() {
                        s.session = Some(session);
                        s.is_admin = false;
                        applied = true;
                    }
                });
                if applied {
                    info!("restored session for user {user_id}");
                    self.check_admin(&user_id).await;
                }
            }
            Ok(None) => debug!("no persisted session to restore"),
            Err(e) => {
                warn!("session restore failed, starting signed out: {e}");
                self.state.send_modify(|s| s.reset_signed_out());
            }
        }
        self.state.send_modify(|s| s.loading = false);
    }

    /// Password sign-in. Local auth artifacts are invalidated and any stale
    /// remote session is best-effort revoked before the attempt. On failure
    /// the global state has been reset to signed-out before the error is
    /// returned, so callers can keep their own form state without risk.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        self.auth.clear_local_state();
        if let Err(e) = self.auth.sign_out(SignOutScope::Global).await {
            debug!("pre-sign-in global sign-out failed (ignored): {e}");
        }
        match self.auth.sign_in_with_password(email, password).await {
            Ok(session) => {
                let user_id = session.user.id.clone();
                self.state.send_modify(|s| {
                    s.session = Some(session.clone());
                    s.is_admin = false;
                });
                self.check_admin(&user_id).await;
                info!("user {} signed in", session.user.email);
                Ok(session)
            }
            Err(e) => {
                self.state.send_modify(|s| s.reset_signed_out());
                warn!("sign-in failed: {e}");
                Err(e)
            }
        }
    }

    /// Sign out everywhere. The local state is reset even when the remote
    /// call fails; the failure is still surfaced to the caller.
    pub async fn sign_out(&self) -> AppResult<()> {
        self.auth.clear_local_state();
        let result = self.auth.sign_out(SignOutScope::Global).await;
        self.state.send_modify(|s| s.reset_signed_out());
        match result {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(e) => {
                warn!("remote sign-out failed, local state reset anyway: {e}");
                Err(e)
            }
        }
    }

    /// Resolve the privilege flag for `user_id`. Fail-closed: any error
    /// counts as non-admin. The result is applied only if `user_id` is still
    /// the signed-in user when the check resolves; stale results are dropped
    /// silently, so concurrent calls cannot corrupt state.
    pub async fn check_admin(&self, user_id: &str) {
        let verdict = match self.admins.is_admin_user(user_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!("privilege check failed for {user_id}, treating as non-admin: {e}");
                false
            }
        };
        self.state.send_modify(|s| match s.session.as_ref() {
            Some(session) if session.user.id == user_id => s.is_admin = verdict,
            _ => debug!("discarding privilege result for superseded user {user_id}"),
        });
    }

    /// Current snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Reactive view; consumers re-evaluate on every change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Stop reacting to session-change events and cancel in-flight checks.
    /// No state writes happen after this returns.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn spawn_admin_check(self: &Arc<Self>, user_id: String) {
        let mgr = Arc::clone(self);
        let handle = tokio::spawn(async move { mgr.check_admin(&user_id).await });
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

async fn listen(mgr: Arc<SessionManager>, mut rx: broadcast::Receiver<AuthEvent>) {
    loop {
        match rx.recv().await {
            Ok(AuthEvent::SignedIn(session)) => {
                let user_id = session.user.id.clone();
                mgr.state.send_modify(|s| {
                    s.session = Some(session);
                    // Fail-closed until the fresh check resolves
                    s.is_admin = false;
                });
                mgr.spawn_admin_check(user_id);
            }
            Ok(AuthEvent::SignedOut) => {
                mgr.state.send_modify(|s| s.reset_signed_out());
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("session-change stream lagged, skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
