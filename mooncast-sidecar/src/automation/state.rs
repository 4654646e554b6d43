use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Step of a connection attempt
///
/// States are ordered; a session only moves forward, re-enters the same state
/// on retry, or jumps to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    LaunchApp,
    FindAddButton,
    EnterAddress,
    FindHostButton,
    SelectDesktop,
    Completed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::LaunchApp => "launch_app",
            ConnectionState::FindAddButton => "find_add_button",
            ConnectionState::EnterAddress => "enter_address",
            ConnectionState::FindHostButton => "find_host_button",
            ConnectionState::SelectDesktop => "select_desktop",
            ConnectionState::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// State of the one active automation attempt
///
/// Owned by the engine loop and only mutated there.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub target_address: String,
    pub target_host_name: Option<String>,
    pub current_state: ConnectionState,
    pub step_retry_count: u32,
    /// Set while the post-desktop session dialog is being resolved
    pub dialog_check_in_flight: bool,
    /// Set between typing the address and activating the confirm control
    pub confirm_pending: bool,
    /// Successful transitions so far, including the final one to `Completed`
    pub transitions: u32,
    /// Retries scheduled over the whole session
    pub retries_recorded: u32,
    pub started_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(address: impl Into<String>, host_name: Option<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target_address: address.into(),
            target_host_name: host_name.filter(|h| !h.trim().is_empty()),
            current_state: ConnectionState::LaunchApp,
            step_retry_count: 0,
            dialog_check_in_flight: false,
            confirm_pending: false,
            transitions: 0,
            retries_recorded: 0,
            started_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Move to `to`, resetting the per-step retry counter.
    ///
    /// Returns the previous state.
    pub fn advance_to(&mut self, to: ConnectionState) -> Result<ConnectionState, IllegalTransition> {
        let from = self.current_state;
        if from.is_terminal() || to <= from {
            return Err(IllegalTransition { from, to });
        }

        self.current_state = to;
        self.step_retry_count = 0;
        self.confirm_pending = false;
        self.transitions += 1;
        if to.is_terminal() {
            self.dialog_check_in_flight = false;
        }
        Ok(from)
    }

    /// Force the terminal state. Returns the previous state, `None` if already terminal.
    pub fn complete(&mut self) -> Option<ConnectionState> {
        if self.is_completed() {
            return None;
        }
        let from = self.current_state;
        self.current_state = ConnectionState::Completed;
        self.step_retry_count = 0;
        self.dialog_check_in_flight = false;
        self.confirm_pending = false;
        self.transitions += 1;
        Some(from)
    }

    /// Count a retry of the current state. Returns the new per-step count.
    pub fn record_retry(&mut self) -> u32 {
        self.step_retry_count += 1;
        self.retries_recorded += 1;
        self.step_retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        let visited = [
            ConnectionState::LaunchApp,
            ConnectionState::FindAddButton,
            ConnectionState::EnterAddress,
            ConnectionState::FindHostButton,
            ConnectionState::SelectDesktop,
            ConnectionState::Completed,
        ];
        assert!(visited.windows(2).all(|w| w[0] < w[1]));
        assert!(visited[..5].iter().all(|s| !s.is_terminal()));
        assert!(visited[5].is_terminal());
    }

    #[test]
    fn test_advance_resets_retries() {
        let mut ctx = SessionContext::new("10.0.0.5", Some("DESKTOP-1".into()));
        ctx.record_retry();
        ctx.record_retry();
        assert_eq!(ctx.step_retry_count, 2);

        let from = ctx.advance_to(ConnectionState::FindAddButton).unwrap();
        assert_eq!(from, ConnectionState::LaunchApp);
        assert_eq!(ctx.step_retry_count, 0);
        assert_eq!(ctx.retries_recorded, 2);
        assert_eq!(ctx.transitions, 1);
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut ctx = SessionContext::new("10.0.0.5", None);
        ctx.advance_to(ConnectionState::EnterAddress).unwrap();
        let err = ctx.advance_to(ConnectionState::FindAddButton).unwrap_err();
        assert_eq!(err.from, ConnectionState::EnterAddress);
        assert!(ctx.advance_to(ConnectionState::EnterAddress).is_err());
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut ctx = SessionContext::new("10.0.0.5", None);
        ctx.dialog_check_in_flight = true;
        assert_eq!(ctx.complete(), Some(ConnectionState::LaunchApp));
        assert!(!ctx.dialog_check_in_flight);
        assert_eq!(ctx.complete(), None);
        assert!(ctx.advance_to(ConnectionState::SelectDesktop).is_err());
        assert_eq!(ctx.transitions, 1);
    }

    #[test]
    fn test_blank_host_name_ignored() {
        let ctx = SessionContext::new("10.0.0.5", Some("  ".into()));
        assert!(ctx.target_host_name.is_none());
    }
}
