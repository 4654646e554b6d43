use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::{uiautomator, AccessibilityProvider, AppLauncher};
use crate::device::types::{NodeAction, NodeId, UiSnapshot};

const DUMP_PATH: &str = "/sdcard/mooncast_window_dump.xml";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Where shell commands run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Directly on the device (the sidecar runs on the device itself)
    Local,
    /// Through `adb shell`, optionally pinned to one device serial
    Adb {
        adb_path: String,
        serial: Option<String>,
    },
}

#[derive(Debug)]
struct ShellOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Accessibility provider and launcher backed by `uiautomator`, `input`, `pm`
/// and `monkey` shell tools
pub struct ShellDevice {
    transport: Transport,
    dump_path: String,
    /// Serialises window dumps; they share one file on the device
    dump_lock: Mutex<()>,
}

impl ShellDevice {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            dump_path: DUMP_PATH.to_string(),
            dump_lock: Mutex::new(()),
        }
    }

    pub fn with_dump_path(mut self, path: impl Into<String>) -> Self {
        self.dump_path = path.into();
        self
    }

    pub fn transport_name(&self) -> &'static str {
        match self.transport {
            Transport::Local => "local",
            Transport::Adb { .. } => "adb",
        }
    }

    async fn run(&self, script: &str) -> Result<ShellOutput> {
        let (program, args) = command_line(&self.transport, script);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::trace!("shell: {}", script);

        let output = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| anyhow!("Command timed out after {:?}: {}", COMMAND_TIMEOUT, script))?
            .with_context(|| format!("Failed to execute {}", program))?;

        Ok(ShellOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn tap(&self, x: i32, y: i32) -> Result<bool> {
        let output = self.run(&format!("input tap {} {}", x, y)).await?;
        if !output.success {
            tracing::warn!("input tap failed: {}", output.stderr.trim());
        }
        Ok(output.success)
    }

    async fn clear_field(&self, existing_len: usize) -> Result<bool> {
        let output = self.run(&clear_script(existing_len)).await?;
        Ok(output.success)
    }
}

#[async_trait]
impl AccessibilityProvider for ShellDevice {
    async fn current_foreground_tree(&self) -> Result<Option<UiSnapshot>> {
        let script = format!(
            "rm -f {p}; uiautomator dump {p} >/dev/null 2>&1; cat {p} 2>/dev/null",
            p = self.dump_path
        );
        let output = {
            let _guard = self.dump_lock.lock().await;
            self.run(&script).await?
        };
        uiautomator::parse_dump(&output.stdout)
    }

    async fn perform_action(
        &self,
        snapshot: &UiSnapshot,
        node: NodeId,
        action: NodeAction,
    ) -> Result<bool> {
        let node = snapshot
            .get(node)
            .ok_or_else(|| anyhow!("Node {} is not part of this snapshot", node.0))?;

        if node.bounds.is_empty() || !node.flags.visible {
            return Ok(false);
        }
        let (x, y) = node.bounds.center();

        match action {
            NodeAction::Click => {
                if !node.flags.clickable || !node.flags.enabled {
                    return Ok(false);
                }
                self.tap(x, y).await
            }
            // Tapping to focus would double as a click, so focus only reports capability
            NodeAction::Focus => Ok(node.flags.focusable || node.flags.editable),
            NodeAction::SetText(value) => {
                if !node.flags.enabled || !self.tap(x, y).await? {
                    return Ok(false);
                }
                let existing = node.text.as_deref().map(|t| t.chars().count()).unwrap_or(0);
                if !self.clear_field(existing).await? {
                    return Ok(false);
                }
                let output = self
                    .run(&format!("input text {}", escape_input_text(&value)))
                    .await?;
                Ok(output.success)
            }
            NodeAction::SelectAll => {
                let existing = node.text.as_deref().map(|t| t.chars().count()).unwrap_or(0);
                self.clear_field(existing).await
            }
        }
    }
}

#[async_trait]
impl AppLauncher for ShellDevice {
    async fn launch(&self, app_id: &str) -> Result<bool> {
        if !is_valid_package(app_id) {
            return Err(anyhow!("Invalid package name: {}", app_id));
        }

        let installed = self.run(&format!("pm path {}", app_id)).await?;
        if !installed.success || !installed.stdout.contains("package:") {
            tracing::warn!("Package {} is not installed", app_id);
            return Ok(false);
        }

        let output = self
            .run(&format!(
                "monkey -p {} -c android.intent.category.LAUNCHER 1",
                app_id
            ))
            .await?;

        if output.stdout.contains("No activities found") {
            tracing::warn!("Package {} has no launcher activity", app_id);
            return Ok(false);
        }
        Ok(output.success)
    }
}

fn command_line(transport: &Transport, script: &str) -> (String, Vec<String>) {
    match transport {
        Transport::Local => (
            "sh".to_string(),
            vec!["-c".to_string(), script.to_string()],
        ),
        Transport::Adb { adb_path, serial } => {
            let mut args = Vec::new();
            if let Some(serial) = serial {
                args.push("-s".to_string());
                args.push(serial.clone());
            }
            args.push("shell".to_string());
            args.push(script.to_string());
            (adb_path.clone(), args)
        }
    }
}

/// Delete sweep long enough to clear the existing value
fn clear_script(existing_len: usize) -> String {
    let count = (existing_len + 4).max(16);
    let deletes = vec!["KEYCODE_DEL"; count].join(" ");
    format!(
        "input keyevent KEYCODE_MOVE_END && input keyevent {}",
        deletes
    )
}

/// Encode text for `input text`: spaces become `%s`, then single-quote for sh
fn escape_input_text(text: &str) -> String {
    let encoded = text.replace(' ', "%s").replace('\'', r"'\''");
    format!("'{}'", encoded)
}

fn is_valid_package(app_id: &str) -> bool {
    !app_id.is_empty()
        && app_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}
