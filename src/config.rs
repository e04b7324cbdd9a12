//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ShutdownError;

/// Shutdown coordinator options, captured once at install time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownOptions {
    /// Grace period before forced termination, in milliseconds
    pub timeout_ms: u64,

    /// Tear down listeners from a previous install before binding new ones
    pub reset_handlers_on_init: bool,

    /// Install even if the monitored signals already have listeners
    pub ignore_existing_handlers: bool,

    /// Exit with code 0 on success instead of re-raising the signal
    pub use_exit0: bool,
}

impl ShutdownOptions {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    /// Grace period as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Defaults overlaid with `SHUTDOWN_*` environment variables
    pub fn from_env() -> Result<Self, ShutdownError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup`.
    ///
    /// Recognised keys: `SHUTDOWN_TIMEOUT_MS`, `SHUTDOWN_RESET_HANDLERS_ON_INIT`,
    /// `SHUTDOWN_IGNORE_EXISTING_HANDLERS`, `SHUTDOWN_USE_EXIT0`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ShutdownError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SHUTDOWN_TIMEOUT_MS") {
            self.timeout_ms = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ShutdownError::InvalidConfig {
                    key: "SHUTDOWN_TIMEOUT_MS".to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        let flags: [(&str, &mut bool); 3] = [
            ("SHUTDOWN_RESET_HANDLERS_ON_INIT", &mut self.reset_handlers_on_init),
            ("SHUTDOWN_IGNORE_EXISTING_HANDLERS", &mut self.ignore_existing_handlers),
            ("SHUTDOWN_USE_EXIT0", &mut self.use_exit0),
        ];
        for (key, slot) in flags {
            if let Some(value) = lookup(key) {
                *slot = parse_flag(key, &value)?;
            }
        }

        Ok(self)
    }
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            reset_handlers_on_init: false,
            ignore_existing_handlers: false,
            use_exit0: false,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ShutdownError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ShutdownError::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Shutdown coordinator options
    pub shutdown: ShutdownOptions,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("shutdown-daemon");

        let socket_path = data_dir.join("daemon.sock");

        Ok(Self {
            socket_path,
            data_dir,
            shutdown: ShutdownOptions::from_env()?,
        })
    }

    /// Path of the pid file written while the daemon runs
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = ShutdownOptions::default();
        assert_eq!(options.timeout(), Duration::from_secs(10));
        assert!(!options.reset_handlers_on_init);
        assert!(!options.ignore_existing_handlers);
        assert!(!options.use_exit0);
    }

    #[test]
    fn test_overrides() {
        let options = ShutdownOptions::default()
            .with_overrides(lookup(&[
                ("SHUTDOWN_TIMEOUT_MS", "250"),
                ("SHUTDOWN_USE_EXIT0", "true"),
                ("SHUTDOWN_RESET_HANDLERS_ON_INIT", "1"),
            ]))
            .unwrap();
        assert_eq!(options.timeout_ms, 250);
        assert!(options.use_exit0);
        assert!(options.reset_handlers_on_init);
        assert!(!options.ignore_existing_handlers);
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let err = ShutdownOptions::default()
            .with_overrides(lookup(&[("SHUTDOWN_TIMEOUT_MS", "-5")]))
            .unwrap_err();
        assert!(matches!(err, ShutdownError::InvalidConfig { ref key, .. } if key == "SHUTDOWN_TIMEOUT_MS"));
    }

    #[test]
    fn test_bad_flag_rejected() {
        let err = ShutdownOptions::default()
            .with_overrides(lookup(&[("SHUTDOWN_USE_EXIT0", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("SHUTDOWN_USE_EXIT0"));
    }

    #[test]
    fn test_deserialize_partial() {
        let options: ShutdownOptions = serde_json::from_str(r#"{"timeout_ms": 500}"#).unwrap();
        assert_eq!(options.timeout_ms, 500);
        assert!(!options.use_exit0);
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("shutdown-daemon"));
        assert!(config.pid_path().starts_with(&config.data_dir));
    }
}
