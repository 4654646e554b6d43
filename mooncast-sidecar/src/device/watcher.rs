use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::platform::AccessibilityProvider;
use super::serializer::format_tree;
use super::types::{ForegroundEvent, ForegroundEventKind};
use crate::automation::EngineHandle;

/// Polls the foreground tree and reports changes to the engine.
///
/// Shell transports have no push notifications, so a change in the snapshot
/// fingerprint stands in for the platform's "window content changed" event.
pub struct ForegroundWatcher {
    provider: Arc<dyn AccessibilityProvider>,
    interval: Duration,
    last: Option<(Option<String>, u64)>,
}

impl ForegroundWatcher {
    pub fn new(provider: Arc<dyn AccessibilityProvider>, interval: Duration) -> Self {
        Self {
            provider,
            interval,
            last: None,
        }
    }

    pub fn spawn(mut self, engine: EngineHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Foreground watcher polling every {:?}", self.interval);

            loop {
                ticker.tick().await;
                if let Some(event) = self.poll().await {
                    engine.on_foreground_changed(event);
                }
            }
        })
    }

    /// Take one snapshot and report whether it differs from the previous one
    pub async fn poll(&mut self) -> Option<ForegroundEvent> {
        let snapshot = match self.provider.current_foreground_tree().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.last = None;
                return None;
            }
            Err(e) => {
                tracing::debug!("Foreground poll failed: {}", e);
                return None;
            }
        };

        let package = snapshot.package().map(str::to_string);
        let fingerprint = snapshot.fingerprint();
        let kind = match &self.last {
            Some((last_package, _)) if *last_package != package => ForegroundEventKind::WindowChanged,
            Some((_, last_fingerprint)) if *last_fingerprint == fingerprint => return None,
            Some(_) => ForegroundEventKind::ContentChanged,
            None => ForegroundEventKind::WindowChanged,
        };

        if kind == ForegroundEventKind::WindowChanged {
            tracing::trace!("Foreground window:\n{}", format_tree(&snapshot));
        }
        self.last = Some((package.clone(), fingerprint));
        package.map(|p| ForegroundEvent::new(p, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::scripted::{Screen, ScriptedDevice};
    use crate::device::types::{NodeSpec, UiSnapshot};

    fn screen(package: &str, label: &str) -> Screen {
        Screen::new(UiSnapshot::from_spec(
            package,
            NodeSpec::new("android.widget.FrameLayout").child(
                NodeSpec::new("android.widget.Button")
                    .text(label)
                    .bounds(0, 0, 100, 50)
                    .clickable(),
            ),
        ))
    }

    #[tokio::test]
    async fn test_reports_only_changes() {
        let device = Arc::new(ScriptedDevice::new(vec![
            screen("com.limelight", "Add"),
            screen("com.limelight", "OK"),
            screen("com.android.launcher", "Apps"),
            Screen::no_window(),
        ]));
        let mut watcher = ForegroundWatcher::new(device.clone(), Duration::from_millis(100));

        let first = watcher.poll().await.unwrap();
        assert_eq!(first.package, "com.limelight");
        assert_eq!(first.kind, ForegroundEventKind::WindowChanged);
        assert!(watcher.poll().await.is_none());

        device.set_screen(1);
        assert_eq!(
            watcher.poll().await.unwrap().kind,
            ForegroundEventKind::ContentChanged
        );

        device.set_screen(2);
        let switched = watcher.poll().await.unwrap();
        assert_eq!(switched.package, "com.android.launcher");
        assert_eq!(switched.kind, ForegroundEventKind::WindowChanged);

        device.set_screen(3);
        assert!(watcher.poll().await.is_none());
    }
}
