//! In-memory device for tests and dry runs
//!
//! Serves a scripted sequence of screens. Each screen may name a trigger that
//! advances the script to the next screen, so a whole connection flow can be
//! replayed without a phone attached. Every action is recorded.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::platform::{AccessibilityProvider, AppLauncher};
use super::types::{NodeAction, NodeId, NodeRef, UiSnapshot};

/// Event that moves the script to the next screen
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// The app was launched
    Launch,
    /// Any accepted click
    AnyClick,
    /// An accepted click on a node whose text, description or resource id
    /// matches (case-insensitive substring of the subtree text)
    ClickOn(String),
    /// An accepted set-text on any field
    SetText,
}

/// One scripted screen
#[derive(Debug, Clone)]
pub struct Screen {
    snapshot: Option<UiSnapshot>,
    advance_on: Option<Trigger>,
}

impl Screen {
    pub fn new(snapshot: UiSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            advance_on: None,
        }
    }

    /// A screen with no active window
    pub fn no_window() -> Self {
        Self {
            snapshot: None,
            advance_on: None,
        }
    }

    pub fn advance_on(mut self, trigger: Trigger) -> Self {
        self.advance_on = Some(trigger);
        self
    }
}

/// Outcome of `AppLauncher::launch`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchBehavior {
    Installed,
    Missing,
    Error,
}

/// Action as observed by the scripted device
#[derive(Debug, Clone)]
pub struct RecordedAction {
    /// Screen index the action was performed on
    pub screen: usize,
    pub class_name: String,
    /// Subtree text of the target node
    pub label: String,
    pub action: NodeAction,
    pub accepted: bool,
}

struct ScriptState {
    screens: Vec<Screen>,
    current: usize,
    actions: Vec<RecordedAction>,
    launches: Vec<String>,
    launch_behavior: LaunchBehavior,
    refused_labels: Vec<String>,
    set_text_failures: usize,
    snapshot_requests: usize,
}

pub struct ScriptedDevice {
    state: Mutex<ScriptState>,
}

impl ScriptedDevice {
    pub fn new(screens: Vec<Screen>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                screens,
                current: 0,
                actions: Vec::new(),
                launches: Vec::new(),
                launch_behavior: LaunchBehavior::Installed,
                refused_labels: Vec::new(),
                set_text_failures: 0,
                snapshot_requests: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_launch_behavior(&self, behavior: LaunchBehavior) {
        self.lock().launch_behavior = behavior;
    }

    /// Refuse clicks on nodes whose subtree text contains `label`
    pub fn refuse_clicks_on(&self, label: impl Into<String>) {
        self.lock().refused_labels.push(label.into().to_lowercase());
    }

    /// Make the next `times` set-text actions fail
    pub fn fail_set_text(&self, times: usize) {
        self.lock().set_text_failures = times;
    }

    /// Jump to a screen regardless of triggers
    pub fn set_screen(&self, index: usize) {
        let mut state = self.lock();
        state.current = index.min(state.screens.len().saturating_sub(1));
    }

    pub fn current_screen(&self) -> usize {
        self.lock().current
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.lock().actions.clone()
    }

    /// Labels of accepted clicks, in order
    pub fn clicks(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter(|a| a.accepted && a.action == NodeAction::Click)
            .map(|a| a.label.clone())
            .collect()
    }

    pub fn launches(&self) -> Vec<String> {
        self.lock().launches.clone()
    }

    pub fn snapshot_requests(&self) -> usize {
        self.lock().snapshot_requests
    }
}

impl ScriptState {
    fn fire(&mut self, event: &Trigger, node: Option<NodeRef<'_>>) {
        let Some(trigger) = self
            .screens
            .get(self.current)
            .and_then(|s| s.advance_on.as_ref())
        else {
            return;
        };

        let matched = match (trigger, event) {
            (Trigger::Launch, Trigger::Launch) => true,
            (Trigger::SetText, Trigger::SetText) => true,
            (Trigger::AnyClick, Trigger::AnyClick) => true,
            (Trigger::ClickOn(needle), Trigger::AnyClick) => {
                node.map(|n| node_matches(n, needle)).unwrap_or(false)
            }
            _ => false,
        };

        if matched && self.current + 1 < self.screens.len() {
            self.current += 1;
            tracing::debug!("Scripted device advanced to screen {}", self.current);
        }
    }
}

fn node_matches(node: NodeRef<'_>, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    node.subtree_text().to_lowercase().contains(&needle)
        || node
            .resource_id
            .as_deref()
            .map(|id| id.to_lowercase() == needle)
            .unwrap_or(false)
}

#[async_trait]
impl AccessibilityProvider for ScriptedDevice {
    async fn current_foreground_tree(&self) -> Result<Option<UiSnapshot>> {
        let mut state = self.lock();
        state.snapshot_requests += 1;
        Ok(state
            .screens
            .get(state.current)
            .and_then(|s| s.snapshot.clone()))
    }

    async fn perform_action(
        &self,
        snapshot: &UiSnapshot,
        node: NodeId,
        action: NodeAction,
    ) -> Result<bool> {
        let target = snapshot
            .get(node)
            .ok_or_else(|| anyhow!("Node {} is not part of this snapshot", node.0))?;
        let label = target.subtree_text();
        let lowered = label.to_lowercase();

        let mut state = self.lock();
        let accepted = match &action {
            NodeAction::Click => {
                target.flags.clickable
                    && target.flags.enabled
                    && !state
                        .refused_labels
                        .iter()
                        .any(|r| !lowered.is_empty() && lowered.contains(r.as_str()))
            }
            NodeAction::Focus => target.flags.focusable || target.flags.editable,
            NodeAction::SetText(_) => {
                if state.set_text_failures > 0 {
                    state.set_text_failures -= 1;
                    false
                } else {
                    target.flags.editable
                }
            }
            NodeAction::SelectAll => target.flags.editable,
        };

        let screen = state.current;
        state.actions.push(RecordedAction {
            screen,
            class_name: target.class_name.clone(),
            label,
            action: action.clone(),
            accepted,
        });

        if accepted {
            match action {
                NodeAction::Click => state.fire(&Trigger::AnyClick, Some(target)),
                NodeAction::SetText(_) => state.fire(&Trigger::SetText, Some(target)),
                _ => {}
            }
        }

        Ok(accepted)
    }
}

#[async_trait]
impl AppLauncher for ScriptedDevice {
    async fn launch(&self, app_id: &str) -> Result<bool> {
        let mut state = self.lock();
        state.launches.push(app_id.to_string());
        match state.launch_behavior {
            LaunchBehavior::Installed => {
                state.fire(&Trigger::Launch, None);
                Ok(true)
            }
            LaunchBehavior::Missing => Ok(false),
            LaunchBehavior::Error => Err(anyhow!("Launcher unavailable")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::NodeSpec;

    fn screen_with_button(label: &str) -> UiSnapshot {
        UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.FrameLayout").child(
                NodeSpec::new("android.widget.Button")
                    .text(label)
                    .bounds(0, 0, 200, 100)
                    .clickable(),
            ),
        )
    }

    #[tokio::test]
    async fn test_click_trigger_advances() {
        let device = ScriptedDevice::new(vec![
            Screen::new(screen_with_button("Next")).advance_on(Trigger::ClickOn("next".into())),
            Screen::new(screen_with_button("Done")),
        ]);

        let snapshot = device.current_foreground_tree().await.unwrap().unwrap();
        let button = snapshot.clickable_nodes()[0].id();
        assert!(device
            .perform_action(&snapshot, button, NodeAction::Click)
            .await
            .unwrap());
        assert_eq!(device.current_screen(), 1);
        assert_eq!(device.clicks(), vec!["Next".to_string()]);
    }

    #[tokio::test]
    async fn test_refused_click_is_recorded() {
        let device = ScriptedDevice::new(vec![Screen::new(screen_with_button("Next"))
            .advance_on(Trigger::AnyClick)]);
        device.refuse_clicks_on("next");

        let snapshot = device.current_foreground_tree().await.unwrap().unwrap();
        let button = snapshot.clickable_nodes()[0].id();
        let accepted = device
            .perform_action(&snapshot, button, NodeAction::Click)
            .await
            .unwrap();

        assert!(!accepted);
        assert_eq!(device.current_screen(), 0);
        assert_eq!(device.actions().len(), 1);
        assert!(device.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_launch_behaviors() {
        let device = ScriptedDevice::new(vec![
            Screen::no_window().advance_on(Trigger::Launch),
            Screen::new(screen_with_button("Add")),
        ]);
        assert!(device.current_foreground_tree().await.unwrap().is_none());
        assert!(device.launch("com.limelight").await.unwrap());
        assert_eq!(device.current_screen(), 1);

        device.set_launch_behavior(LaunchBehavior::Missing);
        assert!(!device.launch("com.limelight").await.unwrap());
        device.set_launch_behavior(LaunchBehavior::Error);
        assert!(device.launch("com.limelight").await.is_err());
        assert_eq!(device.launches().len(), 3);
    }

    #[tokio::test]
    async fn test_set_text_failures() {
        let snapshot = UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.EditText")
                .bounds(0, 0, 400, 80)
                .editable(),
        );
        let device = ScriptedDevice::new(vec![Screen::new(snapshot.clone())]);
        device.fail_set_text(1);

        let field = snapshot.root().unwrap().id();
        let text = NodeAction::SetText("10.0.0.5".into());
        assert!(!device
            .perform_action(&snapshot, field, text.clone())
            .await
            .unwrap());
        assert!(device.perform_action(&snapshot, field, text).await.unwrap());
    }
}
