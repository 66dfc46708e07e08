//! Scripted collaborator doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use cicentre::backend::{AdminDirectory, AuthEvent, AuthService, AuthSession, AuthUser, SignOutScope};
use cicentre::error::{AppError, AppResult};

pub fn session_for(id: &str, email: &str) -> AuthSession {
    AuthSession {
        access_token: format!("token-{id}"),
        refresh_token: None,
        expires_at: None,
        user: AuthUser { id: id.to_string(), email: email.to_string() },
    }
}

/// Auth collaborator double. Behaves like the real client: successful calls
/// emit session-change events on the broadcast stream.
pub struct ScriptedAuth {
    pub events: broadcast::Sender<AuthEvent>,
    pub restored: Mutex<Option<AuthSession>>,
    pub restore_delay: Mutex<Option<Duration>>,
    pub restore_fails: AtomicBool,
    /// email -> (password, session issued on success)
    pub accounts: Mutex<HashMap<String, (String, AuthSession)>>,
    pub sign_out_fails: AtomicBool,
    pub sign_out_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
}

impl ScriptedAuth {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            events,
            restored: Mutex::new(None),
            restore_delay: Mutex::new(None),
            restore_fails: AtomicBool::new(false),
            accounts: Mutex::new(HashMap::new()),
            sign_out_fails: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_account(&self, email: &str, password: &str, session: AuthSession) {
        self.accounts.lock().insert(email.to_string(), (password.to_string(), session));
    }

    pub fn set_restored(&self, session: Option<AuthSession>) {
        *self.restored.lock() = session;
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthService for ScriptedAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let account = self.accounts.lock().get(email).cloned();
        match account {
            Some((expected, session)) if expected == password => {
                self.emit(AuthEvent::SignedIn(session.clone()));
                Ok(session)
            }
            _ => Err(AppError::unauthorized("invalid_credentials", "invalid email or password")),
        }
    }

    async fn sign_out(&self, _scope: SignOutScope) -> AppResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.sign_out_fails.load(Ordering::SeqCst) {
            Err(AppError::network("backend_unreachable", "sign-out timed out"))
        } else {
            Ok(())
        };
        self.emit(AuthEvent::SignedOut);
        result
    }

    async fn current_session(&self) -> AppResult<Option<AuthSession>> {
        let delay = *self.restore_delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.restore_fails.load(Ordering::SeqCst) {
            return Err(AppError::network("backend_unreachable", "restore timed out"));
        }
        Ok(self.restored.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn clear_local_state(&self) {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Administrators-set double with a tunable resolution delay, so tests can
/// interleave a sign-out with an in-flight privilege check.
pub struct ScriptedAdmins {
    pub admins: Mutex<HashSet<String>>,
    pub delay: Mutex<Option<Duration>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl ScriptedAdmins {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            admins: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn grant(&self, user_id: &str) {
        self.admins.lock().insert(user_id.to_string());
    }
}

#[async_trait]
impl AdminDirectory for ScriptedAdmins {
    async fn is_admin_user(&self, user_id: &str) -> AppResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::network("backend_unreachable", "admin check timed out"));
        }
        Ok(self.admins.lock().contains(user_id))
    }
}
