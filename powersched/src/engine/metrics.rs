/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Post-run metrics for a simulation.
//!
//! Every value here is measured from an actual step sequence, so two runs
//! over the same input always produce identical metrics.
//!
//! | Metric | Definition |
//! |---|---|
//! | turnaround | `completed_at + 1 − arrival_time` |
//! | waiting | `turnaround − burst_time` (includes switch and I/O ticks) |
//! | response | `first_run − arrival_time` |
//! | CPU utilisation | `run ticks / total ticks × 100` |
//! | throughput | `completed processes / total ticks` |

use tracing::info;

use super::{Discipline, Engine, EngineError, ExecutionStep, StepKind};
use crate::process::{Process, ProcessId, Ticks};

// ── Per-process metrics ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessMetrics {
    pub id: ProcessId,
    pub arrival_time: Ticks,
    pub burst_time: Ticks,
    pub first_run: Option<Ticks>,
    pub completed_at: Option<Ticks>,
    /// `None` until the process completes.
    pub turnaround: Option<Ticks>,
    pub waiting: Option<Ticks>,
    pub response: Option<Ticks>,
}

impl ProcessMetrics {
    pub fn from_process(p: &Process) -> Self {
        let turnaround = p
            .completed_at()
            .map(|done| done + 1 - p.arrival_time());
        Self {
            id: p.id(),
            arrival_time: p.arrival_time(),
            burst_time: p.burst_time(),
            first_run: p.first_run(),
            completed_at: p.completed_at(),
            turnaround,
            waiting: turnaround.map(|t| t.saturating_sub(p.burst_time())),
            response: p.first_run().map(|start| start - p.arrival_time()),
        }
    }
}

// ── Run metrics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub discipline: Discipline,
    pub total_ticks: Ticks,
    pub busy_ticks: Ticks,
    pub idle_ticks: Ticks,
    pub context_switches: Ticks,
    pub io_wait_ticks: Ticks,
    pub completed: usize,
    pub avg_turnaround: f64,
    pub avg_waiting: f64,
    pub avg_response: f64,
    /// Percent of ticks spent charging a process.
    pub cpu_utilization: f64,
    /// Completed processes per tick.
    pub throughput: f64,
    /// Sorted by process id.
    pub processes: Vec<ProcessMetrics>,
}

/// Tallies steps as they are observed and turns them into [`RunMetrics`].
///
/// Observing is separate from finishing so a caller that forwards steps to a
/// sink can collect metrics on the way through.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    total: Ticks,
    busy: Ticks,
    idle: Ticks,
    switches: Ticks,
    io_wait: Ticks,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, step: &ExecutionStep) {
        self.total += 1;
        match step.kind {
            StepKind::Run => self.busy += 1,
            StepKind::Idle => self.idle += 1,
            StepKind::ContextSwitch => self.switches += 1,
            StepKind::IoWait => self.io_wait += 1,
        }
    }

    pub fn finish<'a>(
        self,
        discipline: Discipline,
        processes: impl IntoIterator<Item = &'a Process>,
    ) -> RunMetrics {
        let mut per_process: Vec<ProcessMetrics> = processes
            .into_iter()
            .map(ProcessMetrics::from_process)
            .collect();
        per_process.sort_by_key(|m| m.id);

        let done: Vec<&ProcessMetrics> = per_process
            .iter()
            .filter(|m| m.completed_at.is_some())
            .collect();

        let avg = |f: fn(&ProcessMetrics) -> Option<Ticks>| -> f64 {
            let values: Vec<Ticks> = done.iter().filter_map(|m| f(m)).collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<Ticks>() as f64 / values.len() as f64
            }
        };

        let ratio = |num: f64| {
            if self.total == 0 {
                0.0
            } else {
                num / self.total as f64
            }
        };

        RunMetrics {
            discipline,
            total_ticks: self.total,
            busy_ticks: self.busy,
            idle_ticks: self.idle,
            context_switches: self.switches,
            io_wait_ticks: self.io_wait,
            completed: done.len(),
            avg_turnaround: avg(|m| m.turnaround),
            avg_waiting: avg(|m| m.waiting),
            avg_response: avg(|m| m.response),
            cpu_utilization: ratio(self.busy as f64) * 100.0,
            throughput: ratio(done.len() as f64),
            processes: per_process,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Drive `processes` to completion under `discipline` and measure the run.
pub fn simulate(discipline: Discipline, processes: Vec<Process>) -> Result<RunMetrics, EngineError> {
    let mut engine = Engine::new(discipline, processes)?;
    let mut collector = MetricsCollector::new();
    while let Some(step) = engine.next_step() {
        collector.observe(&step);
    }
    let metrics = collector.finish(discipline, engine.processes());

    info!(
        discipline = %discipline,
        total_ticks = metrics.total_ticks,
        context_switches = metrics.context_switches,
        avg_turnaround = metrics.avg_turnaround,
        avg_waiting = metrics.avg_waiting,
        "simulation complete"
    );
    Ok(metrics)
}

/// Relative improvement of `candidate` over `baseline`, in percent, rounded
/// to one decimal.
///
/// `higher_is_better` selects the direction (throughput vs. waiting time).
/// Returns `0.0` when the baseline is zero.
pub fn improvement(baseline: f64, candidate: f64, higher_is_better: bool) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    let delta = if higher_is_better {
        candidate - baseline
    } else {
        baseline - candidate
    };
    (delta / baseline * 1000.0).round() / 10.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessSpec;

    fn proc(id: ProcessId, arrival: i64, burst: i64, io_ticks: Vec<i64>) -> Process {
        Process::new(&ProcessSpec {
            id,
            burst_time: burst,
            arrival_time: arrival,
            io_ticks,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn fcfs_two_process_metrics() {
        // switch, p1, p1, p1, switch, p2, p2
        let m = simulate(
            Discipline::Fcfs,
            vec![proc(1, 0, 3, vec![]), proc(2, 0, 2, vec![])],
        )
        .unwrap();

        assert_eq!(m.total_ticks, 7);
        assert_eq!(m.busy_ticks, 5);
        assert_eq!(m.context_switches, 2);
        assert_eq!(m.completed, 2);

        let p1 = &m.processes[0];
        assert_eq!(p1.first_run, Some(1));
        assert_eq!(p1.completed_at, Some(3));
        assert_eq!(p1.turnaround, Some(4));
        assert_eq!(p1.waiting, Some(1));
        assert_eq!(p1.response, Some(1));

        let p2 = &m.processes[1];
        assert_eq!(p2.turnaround, Some(7));
        assert_eq!(p2.waiting, Some(5));
        assert_eq!(p2.response, Some(5));

        assert!((m.avg_turnaround - 5.5).abs() < 1e-9);
        assert!((m.cpu_utilization - 500.0 / 7.0).abs() < 1e-9);
        assert!((m.throughput - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn io_wait_ticks_are_counted() {
        let m = simulate(Discipline::Fcfs, vec![proc(1, 0, 5, vec![2])]).unwrap();
        assert_eq!(m.io_wait_ticks, 2);
        assert_eq!(m.busy_ticks, 5);
    }

    #[test]
    fn sjf_beats_fcfs_on_average_waiting_for_convoy() {
        let workload = || {
            vec![
                proc(1, 0, 8, vec![]),
                proc(2, 0, 1, vec![]),
                proc(3, 0, 1, vec![]),
            ]
        };
        let fcfs = simulate(Discipline::Fcfs, workload()).unwrap();
        let sjf = simulate(Discipline::Sjf, workload()).unwrap();
        assert!(sjf.avg_waiting < fcfs.avg_waiting);
    }

    #[test]
    fn empty_run_has_zeroed_metrics() {
        let m = simulate(Discipline::Srtf, vec![]).unwrap();
        assert_eq!(m.total_ticks, 0);
        assert_eq!(m.cpu_utilization, 0.0);
        assert_eq!(m.throughput, 0.0);
        assert!(m.processes.is_empty());
    }

    #[test]
    fn simulation_is_deterministic() {
        let workload = || {
            vec![
                proc(1, 0, 6, vec![2]),
                proc(2, 1, 3, vec![]),
                proc(3, 2, 4, vec![1, 3]),
            ]
        };
        for d in Discipline::ALL {
            let reference = simulate(d, workload()).unwrap();
            for _ in 0..10 {
                assert_eq!(simulate(d, workload()).unwrap(), reference, "{d}");
            }
        }
    }

    // ── improvement ───────────────────────────────────────────────────────────

    #[test]
    fn improvement_respects_direction() {
        assert_eq!(improvement(10.0, 12.0, true), 20.0);
        assert_eq!(improvement(10.0, 8.0, false), 20.0);
        assert_eq!(improvement(10.0, 12.0, false), -20.0);
    }

    #[test]
    fn improvement_with_zero_baseline_is_zero() {
        assert_eq!(improvement(0.0, 5.0, true), 0.0);
    }
}
