use thiserror::Error;

use super::state::ConnectionState;

/// Failure raised by a state handler.
///
/// None of these leave the engine loop; each maps to a retry, a fallback or
/// the terminal state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    /// Element not found yet or screen not settled
    #[error("UI not ready: {0}")]
    TransientUi(String),

    /// No click strategy could activate the element
    #[error("Could not activate {target}")]
    ActivationFailure { target: String },

    /// Retry budget of a state used up
    #[error("Gave up in {state} after {retries} retries")]
    StepExhaustion { state: ConnectionState, retries: u32 },

    /// Target app missing or launcher unavailable
    #[error("Environment error: {0}")]
    Environment(String),
}

impl AutomationError {
    pub fn transient(reason: impl Into<String>) -> Self {
        AutomationError::TransientUi(reason.into())
    }

    pub fn activation(target: impl Into<String>) -> Self {
        AutomationError::ActivationFailure {
            target: target.into(),
        }
    }

    /// Whether the state may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::TransientUi(_) | AutomationError::ActivationFailure { .. }
        )
    }
}
