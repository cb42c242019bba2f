//! Runtime configuration.
//!
//! All knobs have defaults; a TOML file only needs the keys it changes:
//!
//! ```toml
//! queue_capacity = 256
//! overflow = "block"
//! poll_interval_ms = 4
//!
//! [linux]
//! input_dir = "/dev/input"
//! search = ["by-id"]
//! ```

use crate::error::{InputError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a capture task does when its device queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued event to make room. Input is latency-sensitive,
    /// so stale events are given up first.
    #[default]
    DropOldest,
    /// Stall the capture task until a reader makes room.
    Block,
}

/// Linux device-node discovery settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxConfig {
    /// Root of the evdev nodes.
    pub input_dir: PathBuf,
    /// Root of the sysfs input class (device names, special devices).
    pub sysfs_dir: PathBuf,
    /// Sub-directories of `input_dir` scanned for `*-event-*` links, in order.
    pub search: Vec<String>,
}

impl Default for LinuxConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/dev/input"),
            sysfs_dir: PathBuf::from("/sys/class/input"),
            search: vec!["by-id".to_string(), "by-path".to_string()],
        }
    }
}

/// Settings shared by the manager and every capture task it spawns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Bound of each device's event queue.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Interval between XInput state polls (Windows gamepads).
    pub poll_interval_ms: u64,
    /// Longest a capture task waits on the OS before re-checking its stop signal.
    pub wait_timeout_ms: u64,
    /// Raw records requested per read on record-stream backends.
    pub read_batch: usize,
    pub linux: LinuxConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            overflow: OverflowPolicy::DropOldest,
            poll_interval_ms: 8,
            wait_timeout_ms: 100,
            read_batch: 64,
            linux: LinuxConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(InputError::Config("queue_capacity must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(InputError::Config("poll_interval_ms must be at least 1".into()));
        }
        if self.wait_timeout_ms == 0 {
            return Err(InputError::Config("wait_timeout_ms must be at least 1".into()));
        }
        if self.read_batch == 0 {
            return Err(InputError::Config("read_batch must be at least 1".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(8));
    }

    #[test]
    fn partial_toml_overrides() {
        let config = ManagerConfig::from_toml_str(
            r#"
            queue_capacity = 16
            overflow = "block"

            [linux]
            search = ["by-id"]
            "#,
        )
        .unwrap();
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.overflow, OverflowPolicy::Block);
        assert_eq!(config.linux.search, vec!["by-id".to_string()]);
        assert_eq!(config.linux.input_dir, PathBuf::from("/dev/input"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = ManagerConfig::from_toml_str("queue_capacity = 0").unwrap_err();
        assert!(matches!(err, InputError::Config(_)));
    }

    #[test]
    fn rejects_bad_toml() {
        let err = ManagerConfig::from_toml_str("overflow = \"sideways\"").unwrap_err();
        assert!(matches!(err, InputError::Toml(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.toml");
        std::fs::write(&path, "poll_interval_ms = 16\n").unwrap();
        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(16));
    }
}
