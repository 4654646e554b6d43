use std::time::Duration;

use super::locator::{contains_class, match_node, TextQuery};
use super::tuning::{ms, AutomationTuning};
use crate::device::types::UiSnapshot;

/// Result of checking the foreground screen before acting on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenCheck {
    /// Expected screen is showing
    Ready { host_visible: bool },
    /// Another app owns the foreground
    ForeignApp { package: Option<String> },
    /// Too few clickable elements; the screen is still rendering
    Loading { clickables: usize },
    /// A settings-style control without the expected markers: the previous
    /// screen has not been dismissed yet
    PreviousScreen,
    /// In the target app but none of the expected markers are present
    MarkersMissing,
}

impl ScreenCheck {
    pub fn is_ready(&self) -> bool {
        matches!(self, ScreenCheck::Ready { .. })
    }

    /// Delay before checking again, `None` when ready
    pub fn recheck_delay(&self, tuning: &AutomationTuning) -> Option<Duration> {
        match self {
            ScreenCheck::Ready { .. } => None,
            ScreenCheck::PreviousScreen => Some(ms(tuning.recheck_long_ms)),
            _ => Some(ms(tuning.recheck_short_ms)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ScreenCheck::Ready { host_visible } => format!("ready (host visible: {})", host_visible),
            ScreenCheck::ForeignApp { package } => format!(
                "foreground is {}",
                package.as_deref().unwrap_or("<no window>")
            ),
            ScreenCheck::Loading { clickables } => {
                format!("still loading ({} clickable elements)", clickables)
            }
            ScreenCheck::PreviousScreen => "previous screen still showing".to_string(),
            ScreenCheck::MarkersMissing => "expected screen markers missing".to_string(),
        }
    }
}

fn check_foreground(
    snapshot: Option<&UiSnapshot>,
    target_package: &str,
    tuning: &AutomationTuning,
) -> Result<(), ScreenCheck> {
    let Some(snapshot) = snapshot else {
        return Err(ScreenCheck::ForeignApp { package: None });
    };
    if snapshot.package() != Some(target_package) {
        return Err(ScreenCheck::ForeignApp {
            package: snapshot.package().map(str::to_string),
        });
    }

    let clickables = snapshot.clickable_nodes().len();
    if clickables < tuning.min_clickable_nodes {
        return Err(ScreenCheck::Loading { clickables });
    }
    Ok(())
}

/// Check that the target app's own window is showing and settled
pub fn validate_in_target(
    snapshot: Option<&UiSnapshot>,
    target_package: &str,
    tuning: &AutomationTuning,
) -> ScreenCheck {
    match check_foreground(snapshot, target_package, tuning) {
        Ok(()) => ScreenCheck::Ready {
            host_visible: false,
        },
        Err(check) => check,
    }
}

/// Check that the host list is showing
pub fn validate_host_list(
    snapshot: Option<&UiSnapshot>,
    target_package: &str,
    host_name: Option<&str>,
    tuning: &AutomationTuning,
) -> ScreenCheck {
    if let Err(check) = check_foreground(snapshot, target_package, tuning) {
        return check;
    }
    let Some(snapshot) = snapshot else {
        return ScreenCheck::ForeignApp { package: None };
    };

    let grid = contains_class(snapshot, "GridView");
    let host_visible = host_name
        .map(|host| {
            let query = TextQuery::new(host).include_unrelated();
            snapshot.iter().any(|n| match_node(n, &query).is_some())
        })
        .unwrap_or(false);

    if grid || host_visible {
        return ScreenCheck::Ready { host_visible };
    }

    let settings_present = snapshot.iter().any(|n| {
        let label = n.node().label().unwrap_or_default().to_lowercase();
        let resource = n.resource_id.as_deref().unwrap_or_default().to_lowercase();
        label.contains("setting") || resource.contains("setting")
    });
    if settings_present {
        ScreenCheck::PreviousScreen
    } else {
        ScreenCheck::MarkersMissing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::NodeSpec;

    fn tuning() -> AutomationTuning {
        AutomationTuning::default()
    }

    fn button(label: &str) -> NodeSpec {
        NodeSpec::new("android.widget.Button")
            .text(label)
            .bounds(0, 0, 200, 80)
            .clickable()
    }

    #[test]
    fn test_foreign_app() {
        let snapshot = UiSnapshot::from_spec(
            "com.android.launcher",
            NodeSpec::new("android.widget.FrameLayout").children([button("A"), button("B")]),
        );
        let check = validate_host_list(Some(&snapshot), "com.limelight", None, &tuning());
        assert_eq!(
            check,
            ScreenCheck::ForeignApp {
                package: Some("com.android.launcher".into())
            }
        );
        assert_eq!(check.recheck_delay(&tuning()), Some(Duration::from_millis(1000)));

        let none = validate_in_target(None, "com.limelight", &tuning());
        assert_eq!(none, ScreenCheck::ForeignApp { package: None });
    }

    #[test]
    fn test_loading_screen() {
        let snapshot = UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.FrameLayout").child(button("A")),
        );
        let check = validate_host_list(Some(&snapshot), "com.limelight", None, &tuning());
        assert_eq!(check, ScreenCheck::Loading { clickables: 1 });
    }

    #[test]
    fn test_ready_on_grid_or_host() {
        let grid = UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.FrameLayout").children([
                NodeSpec::new("android.widget.GridView").child(button("OTHER")),
                button("B"),
            ]),
        );
        assert_eq!(
            validate_host_list(Some(&grid), "com.limelight", Some("DESKTOP-1"), &tuning()),
            ScreenCheck::Ready {
                host_visible: false
            }
        );

        let host = UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.FrameLayout")
                .children([button("DESKTOP-1"), button("B")]),
        );
        assert_eq!(
            validate_host_list(Some(&host), "com.limelight", Some("desktop-1"), &tuning()),
            ScreenCheck::Ready { host_visible: true }
        );
    }

    #[test]
    fn test_previous_screen_gets_long_recheck() {
        let snapshot = UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.FrameLayout").children([
                NodeSpec::new("android.widget.ImageButton")
                    .description("Settings")
                    .clickable(),
                button("Cancel"),
            ]),
        );
        let check = validate_host_list(Some(&snapshot), "com.limelight", Some("PC"), &tuning());
        assert_eq!(check, ScreenCheck::PreviousScreen);
        assert_eq!(check.recheck_delay(&tuning()), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_markers_missing() {
        let snapshot = UiSnapshot::from_spec(
            "com.limelight",
            NodeSpec::new("android.widget.FrameLayout").children([button("A"), button("B")]),
        );
        assert_eq!(
            validate_host_list(Some(&snapshot), "com.limelight", None, &tuning()),
            ScreenCheck::MarkersMissing
        );
    }
}
