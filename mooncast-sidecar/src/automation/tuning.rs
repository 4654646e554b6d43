use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Heuristic constants and delays used by the engine.
///
/// The defaults were measured against one layout of the streaming client and
/// are not general; each can be overridden with `MOONCAST_<FIELD_NAME>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationTuning {
    /// Retry bound for EnterAddress and SelectDesktop
    pub max_step_retries: u32,
    /// Retry bound while the host list is not ready
    pub max_screen_waits: u32,
    /// 1-based position of the icon-only add control among clickables
    pub add_button_position: usize,
    /// Fewer clickables than this means the screen is still loading
    pub min_clickable_nodes: usize,
    pub icon_min_px: i32,
    pub icon_max_px: i32,
    pub icon_aspect_min: f64,
    pub icon_aspect_max: f64,
    pub launch_settle_ms: u64,
    pub step_delay_ms: u64,
    pub host_list_delay_ms: u64,
    pub confirm_delay_ms: u64,
    pub set_text_retry_ms: u64,
    pub focus_settle_ms: u64,
    pub recheck_short_ms: u64,
    pub recheck_long_ms: u64,
    pub retry_delay_ms: u64,
    pub dialog_attempts: u32,
    pub dialog_initial_ms: u64,
    pub dialog_step_ms: u64,
    pub dialog_verify_ms: u64,
    pub blind_click_count: usize,
    pub ancestor_search_depth: usize,
}

impl Default for AutomationTuning {
    fn default() -> Self {
        Self {
            max_step_retries: 3,
            max_screen_waits: 5,
            add_button_position: 3,
            min_clickable_nodes: 2,
            icon_min_px: 48,
            icon_max_px: 320,
            icon_aspect_min: 0.8,
            icon_aspect_max: 1.25,
            launch_settle_ms: 2000,
            step_delay_ms: 1500,
            host_list_delay_ms: 2000,
            confirm_delay_ms: 1000,
            set_text_retry_ms: 500,
            focus_settle_ms: 500,
            recheck_short_ms: 1000,
            recheck_long_ms: 3000,
            retry_delay_ms: 2000,
            dialog_attempts: 3,
            dialog_initial_ms: 1500,
            dialog_step_ms: 1000,
            dialog_verify_ms: 1000,
            blind_click_count: 3,
            ancestor_search_depth: 5,
        }
    }
}

fn env_or<T: FromStr>(field: &str, default: T) -> T {
    let key = format!("MOONCAST_{}", field.to_uppercase());
    match env::var(&key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl AutomationTuning {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_step_retries: env_or("max_step_retries", d.max_step_retries),
            max_screen_waits: env_or("max_screen_waits", d.max_screen_waits),
            add_button_position: env_or("add_button_position", d.add_button_position).max(1),
            min_clickable_nodes: env_or("min_clickable_nodes", d.min_clickable_nodes),
            icon_min_px: env_or("icon_min_px", d.icon_min_px),
            icon_max_px: env_or("icon_max_px", d.icon_max_px),
            icon_aspect_min: env_or("icon_aspect_min", d.icon_aspect_min),
            icon_aspect_max: env_or("icon_aspect_max", d.icon_aspect_max),
            launch_settle_ms: env_or("launch_settle_ms", d.launch_settle_ms),
            step_delay_ms: env_or("step_delay_ms", d.step_delay_ms),
            host_list_delay_ms: env_or("host_list_delay_ms", d.host_list_delay_ms),
            confirm_delay_ms: env_or("confirm_delay_ms", d.confirm_delay_ms),
            set_text_retry_ms: env_or("set_text_retry_ms", d.set_text_retry_ms),
            focus_settle_ms: env_or("focus_settle_ms", d.focus_settle_ms),
            recheck_short_ms: env_or("recheck_short_ms", d.recheck_short_ms),
            recheck_long_ms: env_or("recheck_long_ms", d.recheck_long_ms),
            retry_delay_ms: env_or("retry_delay_ms", d.retry_delay_ms),
            dialog_attempts: env_or("dialog_attempts", d.dialog_attempts).max(1),
            dialog_initial_ms: env_or("dialog_initial_ms", d.dialog_initial_ms),
            dialog_step_ms: env_or("dialog_step_ms", d.dialog_step_ms),
            dialog_verify_ms: env_or("dialog_verify_ms", d.dialog_verify_ms),
            blind_click_count: env_or("blind_click_count", d.blind_click_count),
            ancestor_search_depth: env_or("ancestor_search_depth", d.ancestor_search_depth),
        }
    }

    /// Delay before dialog attempt `attempt` (0-based)
    pub fn dialog_delay(&self, attempt: u32) -> Duration {
        ms(self
            .dialog_initial_ms
            .saturating_add(u64::from(attempt).saturating_mul(self.dialog_step_ms)))
    }

    /// Whether a bounding box falls in the square icon band
    pub fn is_icon_sized(&self, width: i32, height: i32) -> bool {
        if height == 0 {
            return false;
        }
        let in_band = |v: i32| v >= self.icon_min_px && v <= self.icon_max_px;
        let aspect = width as f64 / height as f64;
        in_band(width)
            && in_band(height)
            && aspect >= self.icon_aspect_min
            && aspect <= self.icon_aspect_max
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_delay_increases() {
        let tuning = AutomationTuning::default();
        assert_eq!(tuning.dialog_delay(0), Duration::from_millis(1500));
        assert_eq!(tuning.dialog_delay(1), Duration::from_millis(2500));
        assert_eq!(tuning.dialog_delay(2), Duration::from_millis(3500));
    }

    #[test]
    fn test_dialog_delay_saturates() {
        let tuning = AutomationTuning {
            dialog_initial_ms: u64::MAX - 10,
            dialog_step_ms: u64::MAX / 2,
            ..AutomationTuning::default()
        };
        assert_eq!(tuning.dialog_delay(3), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_icon_band() {
        let tuning = AutomationTuning::default();
        assert!(tuning.is_icon_sized(140, 140));
        assert!(tuning.is_icon_sized(120, 140));
        assert!(!tuning.is_icon_sized(40, 40));
        assert!(!tuning.is_icon_sized(480, 480));
        assert!(!tuning.is_icon_sized(300, 120));
        assert!(!tuning.is_icon_sized(100, 0));
    }

    #[test]
    fn test_env_override() {
        env::set_var("MOONCAST_BLIND_CLICK_COUNT", "5");
        env::set_var("MOONCAST_ICON_ASPECT_MAX", "not-a-number");
        let tuning = AutomationTuning::from_env();
        env::remove_var("MOONCAST_BLIND_CLICK_COUNT");
        env::remove_var("MOONCAST_ICON_ASPECT_MAX");

        assert_eq!(tuning.blind_click_count, 5);
        assert_eq!(tuning.icon_aspect_max, 1.25);
        assert_eq!(tuning.max_step_retries, 3);
    }
}
