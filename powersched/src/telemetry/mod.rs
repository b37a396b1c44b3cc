/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! System telemetry: one [`SystemSnapshot`] per decision cycle.
//!
//! The scheduler core never talks to sensors directly.  It asks a
//! [`TelemetrySource`] for a snapshot and, through [`snapshot_or_default`],
//! replaces any failure with the documented defaults:
//!
//! | Field | Default |
//! |---|---|
//! | `battery_percent` | `100` |
//! | `is_charging` | `false` |
//! | `cpu_percent` | `0` |
//! | `temperature_celsius` | `0` |
//!
//! Two sources are provided: [`StaticTelemetry`] (a fixed snapshot from the
//! CLI or workload file) and [`SysfsTelemetry`] (Linux `/sys` + `/proc`).

pub mod history;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use history::BatteryHistory;

// ── SystemSnapshot ────────────────────────────────────────────────────────────

/// Battery, load and temperature as read at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    /// `0..=100`.
    pub battery_percent: f64,
    pub is_charging: bool,
    /// `0..=100`.
    pub cpu_percent: f64,
    pub temperature_celsius: f64,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self {
            battery_percent: 100.0,
            is_charging: false,
            cpu_percent: 0.0,
            temperature_celsius: 0.0,
        }
    }
}

impl SystemSnapshot {
    /// Build a snapshot, clamping percentages into `0..=100`.
    pub fn new(battery_percent: f64, is_charging: bool, cpu_percent: f64, temperature_celsius: f64) -> Self {
        Self {
            battery_percent,
            is_charging,
            cpu_percent,
            temperature_celsius,
        }
        .clamped()
    }

    /// Copy with percentages clamped into `0..=100`; NaN becomes the default.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64, default: f64| {
            if v.is_nan() {
                default
            } else {
                v.clamp(0.0, 100.0)
            }
        };
        Self {
            battery_percent: clamp(self.battery_percent, 100.0),
            cpu_percent: clamp(self.cpu_percent, 0.0),
            temperature_celsius: if self.temperature_celsius.is_nan() {
                0.0
            } else {
                self.temperature_celsius
            },
            ..self
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a telemetry read failed.  Never surfaced past
/// [`snapshot_or_default`].
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("no battery found under {0}")]
    BatteryUnavailable(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse '{value}' from {path}")]
    Parse { path: PathBuf, value: String },
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// Supplies a [`SystemSnapshot`] on demand.
pub trait TelemetrySource: Send + Sync {
    fn read(&self) -> Result<SystemSnapshot, TelemetryError>;
}

/// Always returns the same snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTelemetry(pub SystemSnapshot);

impl TelemetrySource for StaticTelemetry {
    fn read(&self) -> Result<SystemSnapshot, TelemetryError> {
        Ok(self.0)
    }
}

/// Reads telemetry from the Linux `sysfs` / `procfs` trees.
///
/// * battery: first `power_supply/*` entry whose `type` is `Battery`
///   (`capacity`, `status`); `Charging` and `Full` count as plugged in.
/// * temperature: `thermal/thermal_zone0/temp` in milli-°C, `0` if absent.
/// * CPU: 1-minute load average over online CPUs, as a percentage.
#[derive(Debug, Clone)]
pub struct SysfsTelemetry {
    root: PathBuf,
    cpu_count: usize,
}

impl SysfsTelemetry {
    pub fn new() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_root("/", cpu_count)
    }

    /// Read from a different filesystem root (used by tests).
    pub fn with_root(root: impl Into<PathBuf>, cpu_count: usize) -> Self {
        Self {
            root: root.into(),
            cpu_count: cpu_count.max(1),
        }
    }

    fn read_battery(&self) -> Result<(f64, bool), TelemetryError> {
        let supplies = self.root.join("sys/class/power_supply");
        let entries = fs::read_dir(&supplies)
            .map_err(|_| TelemetryError::BatteryUnavailable(supplies.clone()))?;

        let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        dirs.sort();

        for dir in dirs {
            let is_battery = read_trimmed(&dir.join("type"))
                .map(|t| t.eq_ignore_ascii_case("battery"))
                .unwrap_or(false);
            if !is_battery {
                continue;
            }
            let capacity = parse_f64(&dir.join("capacity"))?;
            let status = read_trimmed(&dir.join("status")).unwrap_or_default();
            let charging = matches!(status.to_ascii_lowercase().as_str(), "charging" | "full");
            debug!(supply = %dir.display(), capacity, status = %status, "battery found");
            return Ok((capacity, charging));
        }

        Err(TelemetryError::BatteryUnavailable(supplies))
    }

    fn read_temperature(&self) -> f64 {
        let path = self.root.join("sys/class/thermal/thermal_zone0/temp");
        parse_f64(&path).map(|milli| milli / 1000.0).unwrap_or(0.0)
    }

    fn read_cpu(&self) -> Result<f64, TelemetryError> {
        let path = self.root.join("proc/loadavg");
        let content = read_trimmed(&path)?;
        let first = content.split_whitespace().next().unwrap_or_default();
        let load: f64 = first.parse().map_err(|_| TelemetryError::Parse {
            path: path.clone(),
            value: first.to_string(),
        })?;
        Ok(load / self.cpu_count as f64 * 100.0)
    }
}

impl Default for SysfsTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for SysfsTelemetry {
    fn read(&self) -> Result<SystemSnapshot, TelemetryError> {
        let (battery, charging) = self.read_battery()?;
        let cpu = self.read_cpu()?;
        let temperature = self.read_temperature();
        Ok(SystemSnapshot::new(battery, charging, cpu, temperature))
    }
}

fn read_trimmed(path: &Path) -> Result<String, TelemetryError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| TelemetryError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_f64(path: &Path) -> Result<f64, TelemetryError> {
    let value = read_trimmed(path)?;
    value.parse().map_err(|_| TelemetryError::Parse {
        path: path.to_path_buf(),
        value,
    })
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Read `source`, substituting the documented defaults on failure.
pub fn snapshot_or_default(source: &dyn TelemetrySource) -> SystemSnapshot {
    match source.read() {
        Ok(snapshot) => snapshot.clamped(),
        Err(e) => {
            warn!(error = %e, "telemetry unavailable, using default snapshot");
            SystemSnapshot::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
