/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Bounded battery-percent history used for discharge forecasting.
//!
//! The history is owned by whoever polls telemetry and handed to the
//! estimator explicitly; there is no process-wide state.

use std::collections::VecDeque;

/// Samples kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 10;

/// Ring buffer of the most recent battery readings, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Default for BatteryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BatteryHistory {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a reading, evicting the oldest one when full.
    pub fn push(&mut self, battery_percent: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(battery_percent);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Mean of the retained samples.
    pub fn smoothed(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Percent per sample, `(newest − oldest) / len`.  Needs two samples.
    ///
    /// Negative while discharging.
    pub fn discharge_rate(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let first = self.samples.front()?;
        let last = self.samples.back()?;
        Some((last - first) / self.samples.len() as f64)
    }

    /// Estimated minutes until empty, rounded to one decimal.
    ///
    /// `None` unless the battery is discharging.
    pub fn minutes_left(&self) -> Option<f64> {
        let rate = self.discharge_rate()?;
        if rate >= 0.0 {
            return None;
        }
        let smoothed = self.smoothed()?;
        Some(round1(smoothed / rate.abs()))
    }

    /// Human-readable forecast: `"<m> mins left"` while discharging,
    /// otherwise the smoothed percentage (`"<pct>%"`).
    pub fn forecast(&self) -> String {
        match self.minutes_left() {
            Some(minutes) if minutes > 0.0 => format!("{minutes} mins left"),
            _ => format!("{}%", round1(self.smoothed().unwrap_or(100.0))),
        }
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(samples: &[f64]) -> BatteryHistory {
        let mut h = BatteryHistory::default();
        for s in samples {
            h.push(*s);
        }
        h
    }

    #[test]
    fn keeps_only_the_newest_samples() {
        let mut h = BatteryHistory::new(3);
        for s in [90.0, 80.0, 70.0, 60.0] {
            h.push(s);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.smoothed(), Some(70.0));
        assert_eq!(h.latest(), Some(60.0));
    }

    #[test]
    fn zero_capacity_holds_one_sample() {
        let mut h = BatteryHistory::new(0);
        h.push(50.0);
        h.push(40.0);
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.len(), 1);
        assert_eq!(h.latest(), Some(40.0));
    }

    #[test]
    fn rate_needs_two_samples() {
        assert_eq!(history(&[]).discharge_rate(), None);
        assert_eq!(history(&[80.0]).discharge_rate(), None);
        assert_eq!(history(&[80.0, 78.0]).discharge_rate(), Some(-1.0));
    }

    #[test]
    fn discharging_battery_forecasts_minutes() {
        // mean 79, rate (78 - 80) / 2 = -1
        let h = history(&[80.0, 78.0]);
        assert_eq!(h.minutes_left(), Some(79.0));
        assert_eq!(h.forecast(), "79 mins left");
    }

    #[test]
    fn charging_battery_forecasts_percentage() {
        let h = history(&[60.0, 61.0, 62.0]);
        assert_eq!(h.minutes_left(), None);
        assert_eq!(h.forecast(), "61%");
    }

    #[test]
    fn empty_history_forecasts_full_battery() {
        assert_eq!(BatteryHistory::default().forecast(), "100%");
    }
}
