//! UI automation engine
//!
//! Drives the streaming client from its launcher screen to a running desktop
//! session by reading accessibility snapshots and synthesizing clicks.
//!
//! ## Architecture
//!
//! - `AutomationEngine` / `EngineHandle` - single-task state machine and its front end
//! - `locator` - heuristics mapping a step's target to a snapshot node
//! - `validator` - checks the foreground screen before a step acts on it
//! - `executor` - the click chain used to activate a located node
//! - `scheduler` - retry bounds and delayed re-evaluation
//!
//! ## Example
//!
//! ```rust,ignore
//! use mooncast_sidecar::automation::{AutomationEngine, EngineConfig};
//!
//! let (engine, _task) = AutomationEngine::spawn(EngineConfig::default(), provider, launcher, registry);
//! engine.start("10.0.0.5", Some("DESKTOP-1")).await?;
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod locator;
pub mod scheduler;
pub mod state;
pub mod tuning;
pub mod validator;

pub use engine::{AutomationEngine, EngineCommand, EngineConfig, EngineHandle, StepOutcome};
pub use error::AutomationError;
pub use events::{EngineEvent, EngineStatus};
pub use executor::{ActivationReport, ClickExecutor, ClickStrategy};
pub use scheduler::{RetryPolicy, TimerKind};
pub use state::{ConnectionState, SessionContext};
pub use tuning::AutomationTuning;
