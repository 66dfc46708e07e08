//! Auth collaborator client.
//!
//! Speaks the hosted identity service's REST surface: password sign-in,
//! scoped sign-out, and restored-session retrieval. Session-change events are
//! re-broadcast on a process-local channel so the session manager can
//! subscribe before issuing its one-shot restore and miss nothing in between.
//! The persisted session lives in a small cache file; that file is the
//! "locally persisted auth artifact" that sign-in/sign-out invalidate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    Global,
    Local,
}

impl SignOutScope {
    fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Global => "global",
            SignOutScope::Local => "local",
        }
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession>;
    async fn sign_out(&self, scope: SignOutScope) -> AppResult<()>;
    /// One-shot restore of a previously persisted session, if any.
    async fn current_session(&self) -> AppResult<Option<AuthSession>>;
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
    /// Best-effort removal of locally persisted auth artifacts.
    fn clear_local_state(&self);
}

/// Wire shape of the identity service's token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl WireUser {
    fn into_user(self) -> AuthUser {
        AuthUser { id: self.id, email: self.email.unwrap_or_default() }
    }
}

pub struct HttpAuthClient {
    base: String,
    api_key: String,
    cache_path: PathBuf,
    http: reqwest::Client,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpAuthClient {
    pub fn new(base: &str, api_key: &str, cache_path: &Path) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AppError::from)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cache_path: cache_path.to_path_buf(),
            http,
            events,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base, path)
    }

    fn read_cache(&self) -> Option<AuthSession> {
        let raw = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(sess) => Some(sess),
            Err(e) => {
                // A corrupt cache is treated as no session rather than an error
                warn!("discarding unreadable session cache: {e}");
                let _ = std::fs::remove_file(&self.cache_path);
                None
            }
        }
    }

    fn write_cache(&self, session: &AuthSession) {
        match serde_json::to_string(session) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.cache_path, raw) {
                    warn!("failed to persist session cache: {e}");
                }
            }
            Err(e) => warn!("failed to serialize session cache: {e}"),
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers yet is fine; send only fails when nobody listens
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthService for HttpAuthClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let url = format!("{}?grant_type=password", self.auth_url("token"));
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
            // The identity service reports bad credentials as a client error
            return Err(AppError::unauthorized("invalid_credentials", "invalid email or password"));
        }
        if !status.is_success() {
            return Err(AppError::from_status(status, "password sign-in"));
        }
        let token: TokenResponse = resp.json().await?;
        let session = AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
            user: token.user.into_user(),
        };
        self.write_cache(&session);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, scope: SignOutScope) -> AppResult<()> {
        let token = self.read_cache().map(|s| s.access_token);
        self.clear_local_state();
        let result = async {
            let Some(token) = token else { return Ok(()) };
            let url = format!("{}?scope={}", self.auth_url("logout"), scope.as_str());
            let resp = self
                .http
                .post(&url)
                .header("apikey", &self.api_key)
                .bearer_auth(&token)
                .send()
                .await?;
            let status = resp.status();
            // An already-expired token means there is nothing left to revoke
            if status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED {
                Ok(())
            } else {
                Err(AppError::from_status(status, "sign-out"))
            }
        }
        .await;
        self.emit(AuthEvent::SignedOut);
        result
    }

    async fn current_session(&self) -> AppResult<Option<AuthSession>> {
        let Some(cached) = self.read_cache() else {
            return Ok(None);
        };
        let resp = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(&cached.access_token)
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            debug!("persisted session no longer valid, dropping cache");
            self.clear_local_state();
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::from_status(status, "session restore"));
        }
        let user: WireUser = resp.json().await?;
        Ok(Some(AuthSession { user: user.into_user(), ..cached }))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn clear_local_state(&self) {
        if self.cache_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.cache_path) {
                warn!("failed to clear session cache: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(dir: &Path) -> HttpAuthClient {
        HttpAuthClient::new("https://backend.example/", "anon-key", &dir.join("session.json")).unwrap()
    }

    #[test]
    fn auth_url_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let c = client(tmp.path());
        assert_eq!(c.auth_url("token"), "https://backend.example/auth/v1/token");
        assert_eq!(c.auth_url("logout"), "https://backend.example/auth/v1/logout");
    }

    #[test]
    fn cache_roundtrip_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let c = client(tmp.path());
        assert!(c.read_cache().is_none());

        let session = AuthSession {
            access_token: "tok".into(),
            refresh_token: Some("ref".into()),
            expires_at: Some(1_900_000_000),
            user: AuthUser { id: "u1".into(), email: "admin@example.com".into() },
        };
        c.write_cache(&session);
        assert_eq!(c.read_cache().unwrap(), session);

        c.clear_local_state();
        assert!(c.read_cache().is_none());
    }

    #[test]
    fn corrupt_cache_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let c = client(tmp.path());
        std::fs::write(tmp.path().join("session.json"), "not json").unwrap();
        assert!(c.read_cache().is_none());
        assert!(!tmp.path().join("session.json").exists());
    }
}
