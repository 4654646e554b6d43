//! Retry bounds and delayed re-evaluation
//!
//! Timers are tokio tasks that sleep and then post a `Timer` command back onto
//! the engine loop, so every handler still runs on the loop. Each timer carries
//! the session id it was scheduled for.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::engine::EngineCommand;
use super::state::ConnectionState;
use super::tuning::{ms, AutomationTuning};

/// What a timer re-enters when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerKind {
    /// Run the current state's handler again
    Reevaluate,
    /// Set the address again after select-all
    RetrySetText,
    /// Activate the confirm control of the add-host dialog
    ConfirmAddress,
    /// Look for the session dialog
    DialogCheck { attempt: u32 },
    /// Confirm the session dialog went away
    DialogVerify { attempt: u32 },
}

/// Retry rule for a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// No counter and no timer; wait for the next UI event
    AwaitEvent,
    /// At most `max_retries` delayed retries
    Bounded { max_retries: u32, delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    WaitForEvent,
    Retry { attempt: u32, delay: Duration },
    GiveUp { retries: u32 },
}

impl RetryPolicy {
    pub fn for_state(state: ConnectionState, tuning: &AutomationTuning) -> Self {
        match state {
            ConnectionState::FindAddButton | ConnectionState::Completed => RetryPolicy::AwaitEvent,
            ConnectionState::LaunchApp => RetryPolicy::Bounded {
                max_retries: 0,
                delay: Duration::ZERO,
            },
            ConnectionState::EnterAddress | ConnectionState::SelectDesktop => {
                RetryPolicy::Bounded {
                    max_retries: tuning.max_step_retries,
                    delay: ms(tuning.retry_delay_ms),
                }
            }
            ConnectionState::FindHostButton => RetryPolicy::Bounded {
                max_retries: tuning.max_screen_waits,
                delay: ms(tuning.recheck_short_ms),
            },
        }
    }

    /// Decide what follows a failure when `retries_so_far` retries were already spent
    pub fn decide(&self, retries_so_far: u32) -> RetryDecision {
        match self {
            RetryPolicy::AwaitEvent => RetryDecision::WaitForEvent,
            RetryPolicy::Bounded { max_retries, delay } => {
                if retries_so_far >= *max_retries {
                    RetryDecision::GiveUp {
                        retries: retries_so_far,
                    }
                } else {
                    RetryDecision::Retry {
                        attempt: retries_so_far + 1,
                        delay: *delay,
                    }
                }
            }
        }
    }
}

struct PendingTimer {
    session_id: Uuid,
    kind: TimerKind,
    handle: JoinHandle<()>,
}

/// Issues cancellable delayed commands against the engine loop
pub struct Scheduler {
    tx: mpsc::WeakSender<EngineCommand>,
    pending: Vec<PendingTimer>,
}

impl Scheduler {
    pub fn new(tx: &mpsc::Sender<EngineCommand>) -> Self {
        Self {
            tx: tx.downgrade(),
            pending: Vec::new(),
        }
    }

    pub fn schedule(&mut self, session_id: Uuid, kind: TimerKind, delay: Duration) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(EngineCommand::Timer { session_id, kind }).await;
            }
        });

        tracing::trace!("Scheduled {:?} in {:?}", kind, delay);
        self.pending.retain(|t| !t.handle.is_finished());
        self.pending.push(PendingTimer {
            session_id,
            kind,
            handle,
        });
    }

    /// Forget a timer whose command has reached the loop
    pub fn fired(&mut self, session_id: Uuid, kind: TimerKind) {
        if let Some(index) = self
            .pending
            .iter()
            .position(|t| t.session_id == session_id && t.kind == kind)
        {
            self.pending.remove(index);
        }
        self.pending.retain(|t| !t.handle.is_finished());
    }

    /// Whether a timer for this session has not fired yet
    pub fn has_pending(&mut self, session_id: Uuid) -> bool {
        self.pending.retain(|t| !t.handle.is_finished());
        self.pending.iter().any(|t| t.session_id == session_id)
    }

    /// Abort every timer that has not fired yet
    pub fn cancel_all(&mut self) {
        for timer in self.pending.drain(..) {
            timer.handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
