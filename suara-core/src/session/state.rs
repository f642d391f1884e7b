//! Dictation session transition table.
//!
//! - Idle/Stopped -> RequestingPermission (start)
//! - RequestingPermission -> Listening (permission granted)
//! - RequestingPermission -> Stopped (denied, no device, user stop)
//! - Listening -> Restarting (recognizer ended while recording)
//! - Restarting -> Listening (delayed restart succeeded)
//! - Listening/Restarting -> Stopped (user stop, fatal error, failed restart)
//! - Idle -> Stopped (clear before any session ran)

use std::fmt;

use crate::ipc::events::SessionState;

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::RequestingPermission => write!(f, "RequestingPermission"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Restarting => write!(f, "Restarting"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, RequestingPermission)
                | (Stopped, RequestingPermission)
                | (RequestingPermission, Listening)
                | (RequestingPermission, Stopped)
                | (Listening, Restarting)
                | (Restarting, Listening)
                | (Listening, Stopped)
                | (Restarting, Stopped)
                // clear_session on a session that never ran
                | (Idle, Stopped)
        )
    }

    /// Whether the user currently intends to be recording in this state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::RequestingPermission | SessionState::Listening | SessionState::Restarting
        )
    }
}
