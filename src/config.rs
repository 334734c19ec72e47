//! Listener configuration
//!
//! All tunables for a session live here so demos and services can load them
//! from a JSON file instead of hard-coding device paths and priorities.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IrqResult;
use crate::ring::OverflowPolicy;

/// Default device node created by the producing side.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/rp1_gpio_irq";

/// Default bounded wait, long enough to keep the idle loop cheap and short
/// enough that `stop()` is observed promptly.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;

/// Configuration for a listener session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Path of the producer's device handle.
    pub device_path: String,
    /// Upper bound on each blocking wait, in milliseconds. The shutdown flag
    /// is re-checked at least this often.
    pub poll_timeout_ms: u64,
    /// `SCHED_FIFO` priority to request for the listener thread, best-effort.
    /// `None` keeps default scheduling.
    pub rt_priority: Option<i32>,
    /// CPU core to pin the listener thread to, best-effort. `None` leaves
    /// placement to the scheduler.
    pub pin_cpu: Option<usize>,
    /// Overflow policy applied by in-process (loopback) producers.
    pub overflow_policy: OverflowPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            rt_priority: Some(80),
            pin_cpu: None,
            overflow_policy: OverflowPolicy::DropNew,
        }
    }
}

impl ListenerConfig {
    /// Configuration for the given device path with all other fields at
    /// their defaults.
    pub fn for_device(path: impl Into<String>) -> Self {
        Self {
            device_path: path.into(),
            ..Self::default()
        }
    }

    /// The bounded wait as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Load a configuration from a JSON file. Missing fields fall back to
    /// their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> IrqResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
