//! Route guard for the admin area.
//!
//! Wraps every admin route and decides, from the current session snapshot,
//! whether to admit the request, hold it behind a neutral waiting body, or
//! redirect to the sign-in screen with an access-denied notice. Decisions are
//! taken fresh on every request, so a sign-out revokes access immediately.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::manager::{AuthState, SessionManager};

pub const NOTICE_SIGN_IN_REQUIRED: &str = "Access denied: please sign in to continue.";
pub const NOTICE_ADMIN_REQUIRED: &str = "Access denied: administrator access is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Initial resolution still in flight.
    Unknown,
    Unauthenticated,
    AuthenticatedNonAdmin,
    AuthenticatedAdmin,
}

/// Classify a snapshot. Protected content is never reachable from `Unknown`,
/// regardless of what the snapshot's other fields will eventually resolve to.
pub fn evaluate(state: &AuthState) -> GuardState {
    if state.loading {
        return GuardState::Unknown;
    }
    match (state.user(), state.is_admin) {
        (None, _) => GuardState::Unauthenticated,
        (Some(_), false) => GuardState::AuthenticatedNonAdmin,
        (Some(_), true) => GuardState::AuthenticatedAdmin,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Admit,
    /// Still resolving: show a neutral waiting body, no redirect yet.
    Wait,
    RedirectSignIn { notice: &'static str },
}

pub fn outcome(state: &AuthState) -> GuardOutcome {
    match evaluate(state) {
        GuardState::Unknown => GuardOutcome::Wait,
        GuardState::Unauthenticated => {
            GuardOutcome::RedirectSignIn { notice: NOTICE_SIGN_IN_REQUIRED }
        }
        GuardState::AuthenticatedNonAdmin => {
            GuardOutcome::RedirectSignIn { notice: NOTICE_ADMIN_REQUIRED }
        }
        GuardState::AuthenticatedAdmin => GuardOutcome::Admit,
    }
}

/// Axum middleware wrapping the admin routes.
pub async fn require_admin(
    State(sessions): State<Arc<SessionManager>>,
    req: Request,
    next: Next,
) -> Response {
    match outcome(&sessions.state()) {
        GuardOutcome::Admit => next.run(req).await,
        GuardOutcome::Wait => {
            (StatusCode::OK, Json(json!({"status": "loading"}))).into_response()
        }
        GuardOutcome::RedirectSignIn { notice } => {
            let location = format!("/auth?notice={}", urlencoding::encode(notice));
            (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, location)],
                Json(json!({"status": "denied", "message": notice})),
            )
                .into_response()
        }
    }
}
