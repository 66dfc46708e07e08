//! Route guard integration tests: the admit/redirect matrix against live
//! session-manager state, and reactive revocation when the state changes
//! underneath an open admin screen.

mod support;

use std::time::Duration;

use cicentre::session::{
    evaluate, GuardState, SessionManager, NOTICE_ADMIN_REQUIRED, NOTICE_SIGN_IN_REQUIRED,
};
use support::{session_for, ScriptedAdmins, ScriptedAuth};

#[tokio::test]
async fn guard_waits_while_restore_is_pending() {
    // The restored session would resolve to an admin, but the guard must not
    // expose protected content before the resolution lands.
    let auth = ScriptedAuth::new();
    auth.set_restored(Some(session_for("u-admin", "admin@example.com")));
    *auth.restore_delay.lock() = Some(Duration::from_millis(80));
    let admins = ScriptedAdmins::new();
    admins.grant("u-admin");
    let mgr = SessionManager::new(auth, admins);

    let init = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.initialize().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(evaluate(&mgr.state()), GuardState::Unknown);

    init.await.unwrap();
    assert_eq!(evaluate(&mgr.state()), GuardState::AuthenticatedAdmin);
}

#[tokio::test]
async fn guard_redirects_unauthenticated_and_non_admin_visitors() {
    let auth = ScriptedAuth::new();
    auth.add_account("user@example.com", "secret1", session_for("u-plain", "user@example.com"));
    let mgr = SessionManager::new(auth, ScriptedAdmins::new());
    mgr.initialize().await;

    assert_eq!(evaluate(&mgr.state()), GuardState::Unauthenticated);

    mgr.sign_in("user@example.com", "secret1").await.unwrap();
    assert_eq!(evaluate(&mgr.state()), GuardState::AuthenticatedNonAdmin);
}

#[tokio::test]
async fn guard_reacts_to_sign_out_while_admin_screen_is_open() {
    let auth = ScriptedAuth::new();
    auth.add_account("admin@example.com", "secret1", session_for("u-admin", "admin@example.com"));
    let admins = ScriptedAdmins::new();
    admins.grant("u-admin");
    let mgr = SessionManager::new(auth, admins);
    mgr.initialize().await;
    mgr.sign_in("admin@example.com", "secret1").await.unwrap();

    // An open admin screen observes the state reactively
    let mut rx = mgr.subscribe();
    assert_eq!(evaluate(&rx.borrow()), GuardState::AuthenticatedAdmin);

    mgr.sign_out().await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(evaluate(&rx.borrow()), GuardState::Unauthenticated);
}

#[tokio::test]
async fn guard_notices_name_the_missing_requirement() {
    assert!(NOTICE_SIGN_IN_REQUIRED.contains("sign in"));
    assert!(NOTICE_ADMIN_REQUIRED.contains("administrator"));
}
