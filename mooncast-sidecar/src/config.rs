use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::automation::{AutomationTuning, EngineConfig};
use crate::hosts::repository::default_db_path;

/// How shell commands reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTransport {
    /// Run on the device itself
    Local,
    /// Run through `adb shell`
    Adb,
}

impl FromStr for DeviceTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(DeviceTransport::Local),
            "adb" => Ok(DeviceTransport::Adb),
            other => Err(format!("Unknown device transport: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub target_package: String,
    pub controller_package: Option<String>,
    pub device_transport: DeviceTransport,
    pub adb_path: String,
    pub adb_serial: Option<String>,
    /// `None` selects the default location under the user data directory
    pub hosts_db_path: Option<PathBuf>,
    pub watch_interval_ms: u64,
    pub tuning: AutomationTuning,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let device_transport = match non_empty("DEVICE_TRANSPORT").map(|v| v.parse()) {
            Some(Ok(transport)) => transport,
            Some(Err(e)) => {
                tracing::warn!("{}, using {:?}", e, defaults.device_transport);
                defaults.device_transport
            }
            None => defaults.device_transport,
        };

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            target_package: non_empty("TARGET_PACKAGE").unwrap_or(defaults.target_package),
            controller_package: non_empty("CONTROLLER_PACKAGE"),
            device_transport,
            adb_path: non_empty("ADB_PATH").unwrap_or(defaults.adb_path),
            adb_serial: non_empty("ADB_SERIAL"),
            hosts_db_path: non_empty("HOSTS_DB_PATH").map(PathBuf::from),
            watch_interval_ms: env::var("WATCH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.watch_interval_ms),
            tuning: AutomationTuning::from_env(),
        }
    }

    /// Host registry location, explicit or default
    pub fn hosts_db_path(&self) -> anyhow::Result<PathBuf> {
        match &self.hosts_db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            target_package: self.target_package.clone(),
            controller_package: self.controller_package.clone(),
            tuning: self.tuning.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            target_package: "com.limelight".to_string(),
            controller_package: None,
            device_transport: DeviceTransport::Local,
            adb_path: "adb".to_string(),
            adb_serial: None,
            hosts_db_path: None,
            watch_interval_ms: 1500,
            tuning: AutomationTuning::default(),
        }
    }
}
