//! Central session and authorization state for the whole service.
//! Keep the public surface thin and split implementation across sub-modules.

mod guard;
mod manager;

pub use guard::{
    evaluate, require_admin, GuardOutcome, GuardState, NOTICE_ADMIN_REQUIRED, NOTICE_SIGN_IN_REQUIRED,
};
pub use manager::{AuthState, SessionManager};
