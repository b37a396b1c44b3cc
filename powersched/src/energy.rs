/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Closed-form battery-impact estimates.
//!
//! Consumption is `Σ energy × algorithm_factor(discipline)`.  The factor
//! models how much extra work a discipline does on top of the raw task
//! energy:
//!
//! | Discipline | Factor |
//! |---|---|
//! | FCFS | 1.0 |
//! | SJF | 1.05 |
//! | SRTF | 1.1 |
//! | Round Robin | 1.0 |
//! | Priority | 1.2 |
//!
//! No simulation and no randomness: the same inputs always give the same
//! estimate.  All results are rounded to one decimal.

use crate::engine::Discipline;
use crate::telemetry::history::round1;
use crate::telemetry::BatteryHistory;

/// Upper bound on the `used` figure reported by [`compare_battery_impact`].
pub const MAX_REPORTED_USAGE: f64 = 100.0;

pub fn algorithm_factor(discipline: Discipline) -> f64 {
    match discipline {
        Discipline::Fcfs => 1.0,
        Discipline::Sjf => 1.05,
        Discipline::Srtf => 1.1,
        Discipline::RoundRobin { .. } => 1.0,
        Discipline::Priority => 1.2,
    }
}

/// Estimated battery state after running a workload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryImpact {
    pub discipline: Discipline,
    /// Percent left, never negative.
    pub remaining: f64,
    /// Percent consumed.
    pub used: f64,
}

/// Estimate the battery left and consumed when `energies` run under
/// `discipline`, starting from `current_battery` percent.
///
/// An empty workload consumes nothing.  `used` never exceeds the charge
/// that was available.
pub fn calculate_battery_impact(
    energies: impl IntoIterator<Item = f64>,
    discipline: Discipline,
    current_battery: f64,
) -> BatteryImpact {
    let total: f64 = energies.into_iter().map(|e| e.max(0.0)).sum();
    let consumed = total * algorithm_factor(discipline);
    let remaining = (current_battery - consumed).max(0.0);

    BatteryImpact {
        discipline,
        remaining: round1(remaining),
        used: round1(current_battery - remaining),
    }
}

/// [`calculate_battery_impact`] starting from the smoothed history reading,
/// or a full battery when the history is empty.
pub fn estimate_with_history(
    energies: impl IntoIterator<Item = f64>,
    discipline: Discipline,
    history: &BatteryHistory,
) -> BatteryImpact {
    calculate_battery_impact(energies, discipline, history.smoothed().unwrap_or(100.0))
}

/// Battery impact of the same workload under every discipline, in
/// [`Discipline::ALL`] order.
///
/// `used` is the raw estimate capped at [`MAX_REPORTED_USAGE`] (it is not
/// limited by the current charge), so disciplines stay comparable on a
/// nearly empty battery.
pub fn compare_battery_impact(energies: &[f64], current_battery: f64) -> Vec<BatteryImpact> {
    let total: f64 = energies.iter().map(|e| e.max(0.0)).sum();
    Discipline::ALL
        .iter()
        .map(|&discipline| {
            let raw = total * algorithm_factor(discipline);
            BatteryImpact {
                discipline,
                remaining: round1((current_battery - raw).max(0.0)),
                used: round1(raw.min(MAX_REPORTED_USAGE)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_workload_consumes_nothing() {
        for d in Discipline::ALL {
            let impact = calculate_battery_impact(Vec::new(), d, 80.0);
            assert_eq!((impact.remaining, impact.used), (80.0, 0.0), "{d}");
        }
    }

    #[test]
    fn factor_scales_consumption() {
        let impact = calculate_battery_impact([10.0, 5.0], Discipline::Priority, 80.0);
        assert_eq!(impact.used, 18.0);
        assert_eq!(impact.remaining, 62.0);

        let impact = calculate_battery_impact([10.0], Discipline::Sjf, 50.0);
        assert_eq!(impact.used, 10.5);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let impact = calculate_battery_impact([500.0], Discipline::Srtf, 30.0);
        assert_eq!(impact.remaining, 0.0);
        assert_eq!(impact.used, 30.0);
    }

    #[test]
    fn more_energy_never_uses_less_battery() {
        let mut last = 0.0;
        for total in [0.0, 1.0, 5.0, 20.0, 60.0, 200.0] {
            let impact = calculate_battery_impact([total], Discipline::Fcfs, 70.0);
            assert!(impact.used >= last);
            last = impact.used;
        }
    }

    #[test]
    fn history_estimate_starts_from_smoothed_level() {
        let mut history = BatteryHistory::default();
        history.push(60.0);
        history.push(40.0);
        let impact = estimate_with_history([10.0], Discipline::Fcfs, &history);
        assert_eq!(impact.remaining, 40.0);
        assert_eq!(
            estimate_with_history([10.0], Discipline::Fcfs, &BatteryHistory::default()).remaining,
            90.0
        );
    }

    #[test]
    fn comparison_covers_every_discipline_and_caps_usage() {
        let rows = compare_battery_impact(&[60.0, 40.0], 50.0);
        let names: Vec<_> = rows.iter().map(|r| r.discipline.name()).collect();
        assert_eq!(names, vec!["FCFS", "SJF", "SRTF", "Priority", "Round Robin"]);

        let priority = rows[3];
        assert_eq!(priority.used, 100.0, "120 is capped");
        assert_eq!(priority.remaining, 0.0);

        let fcfs = rows[0];
        assert_eq!(fcfs.used, 100.0);
        assert_eq!(rows[1].used, 100.0);
    }

    #[test]
    fn comparison_is_deterministic() {
        let a = compare_battery_impact(&[3.0, 4.5, 1.25], 66.0);
        let b = compare_battery_impact(&[3.0, 4.5, 1.25], 66.0);
        assert_eq!(a, b);
    }
}
