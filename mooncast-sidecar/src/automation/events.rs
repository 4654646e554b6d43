use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use super::executor::{AttemptOutcome, ClickStrategy};
use super::state::{ConnectionState, SessionContext};

/// Diagnostic events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionStarted {
        session_id: Uuid,
        address: String,
        host_name: Option<String>,
    },
    StateChanged {
        session_id: Uuid,
        from: ConnectionState,
        to: ConnectionState,
    },
    RetryScheduled {
        session_id: Uuid,
        state: ConnectionState,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    ActivationAttempt {
        session_id: Uuid,
        strategy: ClickStrategy,
        outcome: AttemptOutcome,
    },
    GaveUp {
        session_id: Uuid,
        state: ConnectionState,
        reason: String,
    },
    Stopped {
        session_id: Uuid,
    },
}

impl EngineEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            EngineEvent::SessionStarted { session_id, .. }
            | EngineEvent::StateChanged { session_id, .. }
            | EngineEvent::RetryScheduled { session_id, .. }
            | EngineEvent::ActivationAttempt { session_id, .. }
            | EngineEvent::GaveUp { session_id, .. }
            | EngineEvent::Stopped { session_id } => *session_id,
        }
    }
}

/// Snapshot of the engine for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub session_id: Option<Uuid>,
    pub state: ConnectionState,
    pub target_address: Option<String>,
    pub target_host_name: Option<String>,
    pub step_retry_count: u32,
    pub transitions: u32,
    pub retries_recorded: u32,
    pub dialog_check_in_flight: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl EngineStatus {
    /// Status before any session was started
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: ConnectionState::Completed,
            target_address: None,
            target_host_name: None,
            step_retry_count: 0,
            transitions: 0,
            retries_recorded: 0,
            dialog_check_in_flight: false,
            started_at: None,
        }
    }

    pub fn from_context(ctx: &SessionContext) -> Self {
        Self {
            session_id: Some(ctx.session_id),
            state: ctx.current_state,
            target_address: Some(ctx.target_address.clone()),
            target_host_name: ctx.target_host_name.clone(),
            step_retry_count: ctx.step_retry_count,
            transitions: ctx.transitions,
            retries_recorded: ctx.retries_recorded,
            dialog_check_in_flight: ctx.dialog_check_in_flight,
            started_at: Some(ctx.started_at),
        }
    }
}

/// Fan-out of engine events and the latest status
pub struct EventSink {
    events: broadcast::Sender<EngineEvent>,
    status: watch::Sender<EngineStatus>,
}

impl EventSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        let (status, _) = watch::channel(EngineStatus::idle());
        Self { events, status }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn publish_status(&self, ctx: &SessionContext) {
        self.status.send_replace(EngineStatus::from_context(ctx));
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let id = Uuid::new_v4();
        let event = EngineEvent::StateChanged {
            session_id: id,
            from: ConnectionState::LaunchApp,
            to: ConnectionState::FindAddButton,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["from"], "launch_app");
        assert_eq!(json["to"], "find_add_button");
        assert_eq!(event.session_id(), id);
    }

    #[tokio::test]
    async fn test_sink_broadcasts_and_tracks_status() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let status = sink.watch_status();
        assert_eq!(status.borrow().state, ConnectionState::Completed);

        let ctx = SessionContext::new("10.0.0.5", None);
        sink.publish_status(&ctx);
        sink.emit(EngineEvent::Stopped {
            session_id: ctx.session_id,
        });

        assert_eq!(status.borrow().state, ConnectionState::LaunchApp);
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Stopped {
                session_id: ctx.session_id
            }
        );
    }
}
