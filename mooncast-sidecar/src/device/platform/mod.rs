use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::types::{NodeAction, NodeId, UiSnapshot};
use crate::config::{Config, DeviceTransport};

pub mod shell;
pub mod uiautomator;

/// Read access to the foreground UI tree plus node-level actions
///
/// Every action is addressed by a node of a specific snapshot. Implementations
/// resolve the node against that snapshot only; callers fetch a new snapshot
/// after any UI-mutating action.
#[async_trait]
pub trait AccessibilityProvider: Send + Sync {
    /// Current foreground UI tree, `None` when no window is active
    async fn current_foreground_tree(&self) -> Result<Option<UiSnapshot>>;

    /// Perform an action on a node. `Ok(false)` means the platform refused it.
    async fn perform_action(
        &self,
        snapshot: &UiSnapshot,
        node: NodeId,
        action: NodeAction,
    ) -> Result<bool>;
}

/// Launches applications by identity
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Returns `Ok(false)` when the application is not installed
    async fn launch(&self, app_id: &str) -> Result<bool>;
}

/// Both collaborators backed by a single device connection
pub struct Device {
    pub provider: Arc<dyn AccessibilityProvider>,
    pub launcher: Arc<dyn AppLauncher>,
}

/// Create the device collaborators for the configured transport
pub fn create_device(config: &Config) -> Result<Device> {
    let transport = match config.device_transport {
        DeviceTransport::Local => shell::Transport::Local,
        DeviceTransport::Adb => shell::Transport::Adb {
            adb_path: config.adb_path.clone(),
            serial: config.adb_serial.clone(),
        },
    };

    let device = Arc::new(shell::ShellDevice::new(transport));
    tracing::info!("Using {} device transport", device.transport_name());

    Ok(Device {
        provider: device.clone(),
        launcher: device,
    })
}
