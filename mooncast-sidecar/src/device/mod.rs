//! Device access
//!
//! Snapshot types for the foreground UI tree plus the collaborators that read
//! it and act on it:
//! - `AccessibilityProvider` / `AppLauncher` - platform abstraction
//! - `ShellDevice` - implementation over `uiautomator` and `input` (locally or via adb)
//! - `ScriptedDevice` - in-memory screens for tests and dry runs
//! - `ForegroundWatcher` - turns snapshot changes into engine notifications

pub mod platform;
pub mod scripted;
pub mod serializer;
pub mod types;
pub mod watcher;

pub use platform::{create_device, AccessibilityProvider, AppLauncher, Device};
pub use scripted::ScriptedDevice;
pub use types::{ForegroundEvent, ForegroundEventKind, NodeAction, NodeId, UiNode, UiSnapshot};
pub use watcher::ForegroundWatcher;
