//! Application settings.
//!
//! Settings are deserialized from an optional TOML file layered over the
//! defaults below, so a bare invocation works without any file present.
//! Durations are written human-readably (`"250ms"`, `"2m"`, `"12h"`) via
//! `humantime-serde`.
//!
//! ```toml
//! [positioner]
//! baud_rate = 115200
//! tolerance_mm = 0.05
//! poll_interval = "250ms"
//! move_timeout = "2m"
//! axis_map = ["-z", "-y", "x"]
//!
//! [probe]
//! baud_rate = 115200
//! read_timeout = "10s"
//!
//! [scan]
//! settle = "500ms"
//! remeasure_interval = 10
//!
//! [monitor]
//! duration = "12h"
//! interval = "1s"
//! ```

use crate::error::AppResult;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Motion stage settings.
    pub positioner: PositionerSettings,
    /// Field probe settings.
    pub probe: ProbeSettings,
    /// Spatial scan settings.
    pub scan: ScanSettings,
    /// Time-series monitor settings.
    pub monitor: MonitorSettings,
}

/// Settings for the G-code motion stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PositionerSettings {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Per-read serial deadline.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Per-axis convergence tolerance in millimeters.
    pub tolerance_mm: f64,
    /// Interval between position polls while waiting for a move.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Give up on a move with `MotionTimeout` after this long.
    #[serde(with = "humantime_serde")]
    pub move_timeout: Duration,
    /// Signed permutation mapping logical axes onto machine axes, one entry
    /// per machine axis (e.g. `["-z", "-y", "x"]`).
    pub axis_map: [String; 3],
}

impl Default for PositionerSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(5),
            tolerance_mm: 0.05,
            poll_interval: Duration::from_millis(250),
            move_timeout: Duration::from_secs(120),
            // Default mounting: machine X = -logical Z, machine Y = -logical Y,
            // machine Z = +logical X.
            axis_map: ["-z".to_string(), "-y".to_string(), "x".to_string()],
        }
    }
}

/// Settings for the teslameter probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Per-read serial deadline.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Settings for the spatial scan executor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Dwell after a confirmed arrival before the field is read.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Re-measure the region center every N points to track drift
    /// (0 disables).
    pub remeasure_interval: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            remeasure_interval: 10,
        }
    }
}

/// Settings for the time-series monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Total monitoring duration.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Interval between samples.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(12 * 60 * 60),
            interval: Duration::from_secs(1),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file layered over the defaults.
    pub fn new(path: Option<&Path>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
