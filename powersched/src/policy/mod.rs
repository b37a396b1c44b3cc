//! Adaptive, battery-aware scheduling policy.
//!
//! One decision cycle:
//!
//! ```text
//!  specs ──validate──► processes ──triage──► Run │ Pause │ Batch │ Defer │ Throttle
//!                                               │
//!  snapshot ──select_discipline──► discipline ──┴──► engine ──► Report::Step …
//! ```
//!
//! [`AdaptiveScheduler::plan`] does everything up to choosing the
//! discipline; [`Plan::run`] drives the engine and reports to a
//! [`ReportSink`].  Only the Run bucket is ever handed to the engine.  The
//! other four buckets travel with every step report as name lists.
//!
//! # Discipline selection
//!
//! | Condition | Discipline |
//! |---|---|
//! | charging, cpu < 40 | SRTF |
//! | charging, 40 ≤ cpu < 70 | Round Robin (q=2) |
//! | charging, cpu ≥ 70 | Priority |
//! | battery > 50, cpu < 50 | SRTF |
//! | 20 < battery ≤ 50, cpu > 70 | Priority |
//! | 20 < battery ≤ 50 | Round Robin (q=3) |
//! | otherwise | Priority |

pub mod triage;

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::energy::{calculate_battery_impact, BatteryImpact};
use crate::engine::metrics::{MetricsCollector, RunMetrics};
use crate::engine::{Discipline, Engine, EngineError, ExecutionStep, StepKind};
use crate::process::{InvalidProcessSpec, Process, ProcessId, ProcessSpec, Ticks};
use crate::telemetry::history::round1;
use crate::telemetry::{BatteryHistory, SystemSnapshot};

use self::triage::{triage, Advisor, Triage, TriageDecision};

/// Algorithm label reported when nothing is runnable.
pub const IDLE_LABEL: &str = "Idle (No runnable tasks)";

// ── Selector ──────────────────────────────────────────────────────────────────

/// Pick a discipline for `snapshot`.  Pure; first matching row wins.
pub fn select_discipline(snapshot: &SystemSnapshot) -> Discipline {
    let battery = snapshot.battery_percent;
    let cpu = snapshot.cpu_percent;

    if snapshot.is_charging {
        if cpu < 40.0 {
            Discipline::Srtf
        } else if cpu < 70.0 {
            Discipline::RoundRobin { quantum: 2 }
        } else {
            Discipline::Priority
        }
    } else if battery > 50.0 && cpu < 50.0 {
        Discipline::Srtf
    } else if battery > 20.0 && battery <= 50.0 {
        if cpu > 70.0 {
            Discipline::Priority
        } else {
            Discipline::RoundRobin { quantum: 3 }
        }
    } else {
        Discipline::Priority
    }
}

/// Select a discipline for `snapshot` and build its engine over `processes`.
pub fn select_engine(
    snapshot: &SystemSnapshot,
    processes: Vec<Process>,
) -> Result<(Discipline, Engine), EngineError> {
    let discipline = select_discipline(snapshot);
    Ok((discipline, discipline.engine(processes)?))
}

// ── Partition ─────────────────────────────────────────────────────────────────

/// Names of the processes held back from the engine this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldLists {
    pub paused: Vec<String>,
    pub batched: Vec<String>,
    pub deferred: Vec<String>,
    pub throttled: Vec<String>,
}

impl HeldLists {
    pub fn len(&self) -> usize {
        self.paused.len() + self.batched.len() + self.deferred.len() + self.throttled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Processes split by triage decision.
#[derive(Debug, Default)]
pub struct Partition {
    /// Handed to the engine.
    pub run: Vec<Process>,
    pub held: HeldLists,
}

impl Partition {
    fn place(&mut self, process: Process, decision: TriageDecision) {
        let name = process.name().to_string();
        match decision {
            TriageDecision::Run => self.run.push(process),
            TriageDecision::Pause => self.held.paused.push(name),
            TriageDecision::Batch => self.held.batched.push(name),
            TriageDecision::Defer => self.held.deferred.push(name),
            TriageDecision::Throttle => self.held.throttled.push(name),
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// One tick as seen by a report consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: ExecutionStep,
    pub held: Arc<HeldLists>,
    pub cpu_percent: f64,
    pub battery_percent: f64,
    pub forecast: Arc<str>,
}

/// Everything a run tells its sink, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// A spec failed validation and was left out of the cycle.
    Rejected {
        id: ProcessId,
        error: InvalidProcessSpec,
    },
    /// Triage outcome for one process.
    Triage {
        id: ProcessId,
        name: String,
        triage: Triage,
    },
    /// Nothing was runnable; terminal.
    Idle(StepReport),
    /// The discipline about to run.
    Algorithm(Discipline),
    Step(StepReport),
    /// Terminal report of a completed run.
    Finished {
        metrics: RunMetrics,
        impact: BatteryImpact,
    },
}

/// Receives reports.  Returning [`ControlFlow::Break`] stops the run after
/// the current report.
pub trait ReportSink {
    fn report(&mut self, report: Report) -> ControlFlow<()>;
}

impl ReportSink for Vec<Report> {
    fn report(&mut self, report: Report) -> ControlFlow<()> {
        self.push(report);
        ControlFlow::Continue(())
    }
}

/// Forwards reports over a channel; a closed receiver stops the run.
impl ReportSink for mpsc::UnboundedSender<Report> {
    fn report(&mut self, report: Report) -> ControlFlow<()> {
        match self.send(report) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

/// Adapts a closure into a [`ReportSink`].
pub struct FnSink<F>(pub F);

impl<F> ReportSink for FnSink<F>
where
    F: FnMut(Report) -> ControlFlow<()>,
{
    fn report(&mut self, report: Report) -> ControlFlow<()> {
        (self.0)(report)
    }
}

// ── Orchestration ─────────────────────────────────────────────────────────────

/// How a [`Plan::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The Run bucket was empty; no engine was built.
    Idle,
    Completed(RunMetrics),
    /// The sink stopped the run after the step at tick `at`.
    Cancelled { at: Ticks },
}

/// Triage and discipline selection for one decision cycle.
///
/// Stateless apart from the optional advisor; one instance may serve any
/// number of concurrent callers.
#[derive(Clone, Default)]
pub struct AdaptiveScheduler {
    advisor: Option<Arc<dyn Advisor>>,
}

impl AdaptiveScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_advisor(advisor: Arc<dyn Advisor>) -> Self {
        Self {
            advisor: Some(advisor),
        }
    }

    pub fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    /// Validate, triage and partition `specs`, then choose a discipline for
    /// `snapshot`.  `now` is compared against process deadlines.
    ///
    /// Invalid specs are rejected individually and never abort the cycle.
    pub fn plan(&self, specs: &[ProcessSpec], snapshot: SystemSnapshot, now: u64) -> Plan {
        let mut rejected = Vec::new();
        let mut triaged = Vec::with_capacity(specs.len());
        let mut partition = Partition::default();

        for spec in specs {
            let process = match Process::new(spec) {
                Ok(p) => p,
                Err(error) => {
                    warn!(id = spec.id, name = %spec.name, error = %error, "rejecting process spec");
                    rejected.push((spec.id, error));
                    continue;
                }
            };

            let outcome = triage(&process, &snapshot, self.advisor.as_deref(), now);
            debug!(
                id = process.id(),
                name = %process.name(),
                decision = %outcome.decision,
                reason = ?outcome.reason,
                "triaged"
            );
            triaged.push((process.id(), process.name().to_string(), outcome));
            partition.place(process, outcome.decision);
        }

        let discipline = select_discipline(&snapshot);
        info!(
            discipline = %discipline,
            runnable = partition.run.len(),
            held = partition.held.len(),
            rejected = rejected.len(),
            battery = snapshot.battery_percent,
            cpu = snapshot.cpu_percent,
            charging = snapshot.is_charging,
            "cycle planned"
        );

        Plan {
            snapshot,
            discipline,
            forecast: format!("{}%", round1(snapshot.battery_percent)),
            rejected,
            triaged,
            partition,
        }
    }
}

impl std::fmt::Debug for AdaptiveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveScheduler")
            .field("advisor", &self.advisor.is_some())
            .finish()
    }
}

/// The outcome of planning, ready to run.
#[derive(Debug)]
pub struct Plan {
    snapshot: SystemSnapshot,
    discipline: Discipline,
    forecast: String,
    rejected: Vec<(ProcessId, InvalidProcessSpec)>,
    triaged: Vec<(ProcessId, String, Triage)>,
    partition: Partition,
}

impl Plan {
    /// Replace the adaptive choice with an explicitly named discipline.
    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Use the battery forecast from `history` in step reports.
    pub fn with_forecast(mut self, history: &BatteryHistory) -> Self {
        if !history.is_empty() {
            self.forecast = history.forecast();
        }
        self
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub fn snapshot(&self) -> &SystemSnapshot {
        &self.snapshot
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn rejected(&self) -> &[(ProcessId, InvalidProcessSpec)] {
        &self.rejected
    }

    /// Triage outcome of every accepted process, in input order.
    pub fn triaged(&self) -> &[(ProcessId, String, Triage)] {
        &self.triaged
    }

    pub fn is_idle(&self) -> bool {
        self.partition.run.is_empty()
    }

    /// Drive the Run bucket to completion, reporting to `sink`.
    ///
    /// # Errors
    /// [`EngineError`] if the engine cannot be built (a zero quantum set via
    /// [`with_discipline`](Self::with_discipline)).
    pub fn run(self, sink: &mut dyn ReportSink) -> Result<RunOutcome, EngineError> {
        let Plan {
            snapshot,
            discipline,
            forecast,
            rejected,
            triaged,
            partition,
        } = self;

        for (id, error) in rejected {
            if sink.report(Report::Rejected { id, error }).is_break() {
                return Ok(RunOutcome::Cancelled { at: 0 });
            }
        }
        for (id, name, triage) in triaged {
            if sink.report(Report::Triage { id, name, triage }).is_break() {
                return Ok(RunOutcome::Cancelled { at: 0 });
            }
        }

        let held = Arc::new(partition.held);
        let forecast: Arc<str> = forecast.into();
        let report_for = |step: ExecutionStep| StepReport {
            step,
            held: Arc::clone(&held),
            cpu_percent: snapshot.cpu_percent,
            battery_percent: snapshot.battery_percent,
            forecast: Arc::clone(&forecast),
        };

        if partition.run.is_empty() {
            info!(label = IDLE_LABEL, "no runnable processes");
            let _ = sink.report(Report::Idle(report_for(ExecutionStep {
                time: 0,
                kind: StepKind::Idle,
                running: None,
                ready_queue: Vec::new(),
            })));
            return Ok(RunOutcome::Idle);
        }

        let energies: Vec<f64> = partition.run.iter().map(Process::energy).collect();
        let mut engine = discipline.engine(partition.run)?;

        info!(discipline = %discipline, name = discipline.display_name(), "running");
        if sink.report(Report::Algorithm(discipline)).is_break() {
            return Ok(RunOutcome::Cancelled { at: 0 });
        }

        let mut collector = MetricsCollector::new();
        while let Some(step) = engine.next_step() {
            collector.observe(&step);
            let at = step.time;
            if sink.report(Report::Step(report_for(step))).is_break() {
                info!(discipline = %discipline, at, "run cancelled by sink");
                return Ok(RunOutcome::Cancelled { at });
            }
        }

        let metrics = collector.finish(discipline, engine.processes());
        let impact = calculate_battery_impact(energies, discipline, snapshot.battery_percent);
        info!(
            discipline = %discipline,
            total_ticks = metrics.total_ticks,
            completed = metrics.completed,
            battery_used = impact.used,
            "run finished"
        );

        let _ = sink.report(Report::Finished {
            metrics: metrics.clone(),
            impact,
        });
        Ok(RunOutcome::Completed(metrics))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::triage::{AdvisoryError, AdvisoryFeatures, TriageReason};
    use crate::process::PriorityClass;

    const NOW: u64 = 1_700_000_000;

    fn snap(battery: f64, charging: bool, cpu: f64) -> SystemSnapshot {
        SystemSnapshot::new(battery, charging, cpu, 40.0)
    }

    fn spec(id: ProcessId, name: &str, priority: PriorityClass, burst: i64) -> ProcessSpec {
        ProcessSpec {
            id,
            name: name.into(),
            priority,
            burst_time: burst,
            energy: 5.0,
            ..Default::default()
        }
    }

    fn workload() -> Vec<ProcessSpec> {
        vec![
            spec(1, "render", PriorityClass::High, 3),
            spec(2, "sync", PriorityClass::Medium, 2),
            spec(3, "backup", PriorityClass::Low, 4),
        ]
    }

    // ── Selector ──────────────────────────────────────────────────────────────

    #[test]
    fn charging_rows() {
        assert_eq!(select_discipline(&snap(10.0, true, 39.9)), Discipline::Srtf);
        assert_eq!(
            select_discipline(&snap(10.0, true, 40.0)),
            Discipline::RoundRobin { quantum: 2 }
        );
        assert_eq!(
            select_discipline(&snap(10.0, true, 69.9)),
            Discipline::RoundRobin { quantum: 2 }
        );
        assert_eq!(select_discipline(&snap(10.0, true, 70.0)), Discipline::Priority);
    }

    #[test]
    fn battery_rows() {
        assert_eq!(select_discipline(&snap(80.0, false, 49.0)), Discipline::Srtf);
        assert_eq!(select_discipline(&snap(40.0, false, 71.0)), Discipline::Priority);
        assert_eq!(
            select_discipline(&snap(40.0, false, 70.0)),
            Discipline::RoundRobin { quantum: 3 }
        );
        assert_eq!(
            select_discipline(&snap(50.0, false, 10.0)),
            Discipline::RoundRobin { quantum: 3 }
        );
        assert_eq!(select_discipline(&snap(20.0, false, 10.0)), Discipline::Priority);
        assert_eq!(select_discipline(&snap(5.0, false, 90.0)), Discipline::Priority);
    }

    #[test]
    fn high_battery_busy_cpu_falls_through_to_priority() {
        assert_eq!(select_discipline(&snap(80.0, false, 50.0)), Discipline::Priority);
    }

    #[test]
    fn selector_is_deterministic() {
        let s = snap(33.0, false, 55.0);
        let first = select_discipline(&s);
        for _ in 0..100 {
            assert_eq!(select_discipline(&s), first);
        }
    }

    #[test]
    fn select_engine_builds_matching_engine() {
        let (d, engine) = select_engine(&snap(90.0, false, 10.0), vec![]).unwrap();
        assert_eq!(d, Discipline::Srtf);
        assert_eq!(engine.discipline(), Discipline::Srtf);
    }

    // ── Planning ──────────────────────────────────────────────────────────────

    #[test]
    fn plan_partitions_by_triage() {
        let plan = AdaptiveScheduler::new().plan(&workload(), snap(35.0, false, 30.0), NOW);
        let ids: Vec<_> = plan.partition().run.iter().map(Process::id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(plan.partition().held.batched, vec!["sync"]);
        assert_eq!(plan.partition().held.deferred, vec!["backup"]);
        assert_eq!(plan.discipline(), Discipline::RoundRobin { quantum: 3 });
        assert_eq!(plan.triaged().len(), 3);
    }

    #[test]
    fn invalid_spec_is_rejected_alone() {
        let mut specs = workload();
        specs.push(spec(4, "broken", PriorityClass::High, 0));
        let plan = AdaptiveScheduler::new().plan(&specs, snap(90.0, false, 10.0), NOW);
        assert_eq!(plan.rejected().len(), 1);
        assert_eq!(plan.rejected()[0].0, 4);
        assert_eq!(plan.partition().run.len(), 3);
    }

    // ── Running ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_run_bucket_reports_single_idle() {
        let specs = vec![spec(1, "backup", PriorityClass::Low, 3)];
        let plan = AdaptiveScheduler::new().plan(&specs, snap(10.0, false, 30.0), NOW);
        assert!(plan.is_idle());

        let mut reports: Vec<Report> = Vec::new();
        let outcome = plan.run(&mut reports).unwrap();
        assert_eq!(outcome, RunOutcome::Idle);

        assert!(matches!(reports[0], Report::Triage { id: 1, .. }));
        match &reports[1] {
            Report::Idle(idle) => {
                assert_eq!(idle.step.running, None);
                assert!(idle.step.ready_queue.is_empty());
                assert_eq!(idle.held.paused, vec!["backup"]);
                assert_eq!(&*idle.forecast, "10%");
            }
            other => panic!("expected idle report, got {other:?}"),
        }
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn empty_workload_is_idle() {
        let mut reports: Vec<Report> = Vec::new();
        let outcome = AdaptiveScheduler::new()
            .plan(&[], SystemSnapshot::default(), NOW)
            .run(&mut reports)
            .unwrap();
        assert_eq!(outcome, RunOutcome::Idle);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn full_run_reports_in_order() {
        let plan = AdaptiveScheduler::new().plan(&workload(), snap(35.0, false, 30.0), NOW);
        let mut reports: Vec<Report> = Vec::new();
        let outcome = plan.run(&mut reports).unwrap();

        let RunOutcome::Completed(metrics) = outcome else {
            panic!("expected a completed run");
        };
        // switch + 3 run ticks for the single runnable process
        assert_eq!(metrics.total_ticks, 4);

        assert!(matches!(reports[3], Report::Algorithm(Discipline::RoundRobin { quantum: 3 })));
        let steps: Vec<&StepReport> = reports
            .iter()
            .filter_map(|r| match r {
                Report::Step(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(steps.len(), 4);
        for s in &steps {
            assert_eq!(s.held.batched, vec!["sync"]);
            assert_eq!(s.held.deferred, vec!["backup"]);
            assert_eq!(s.battery_percent, 35.0);
        }

        match reports.last() {
            Some(Report::Finished { impact, .. }) => {
                assert_eq!(impact.used, 5.0);
                assert_eq!(impact.remaining, 30.0);
            }
            other => panic!("expected finished report, got {other:?}"),
        }
    }

    #[test]
    fn sink_can_cancel_between_ticks() {
        let plan = AdaptiveScheduler::new().plan(&workload(), snap(90.0, false, 10.0), NOW);
        let mut steps_seen = 0;
        let mut sink = FnSink(|report: Report| {
            if let Report::Step(_) = report {
                steps_seen += 1;
                if steps_seen == 2 {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });
        let outcome = plan.run(&mut sink).unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled { at: 1 });
        assert_eq!(steps_seen, 2);
    }

    #[test]
    fn explicit_discipline_overrides_selection() {
        let plan = AdaptiveScheduler::new()
            .plan(&workload(), snap(90.0, false, 10.0), NOW)
            .with_discipline(Discipline::Fcfs);
        let mut reports: Vec<Report> = Vec::new();
        plan.run(&mut reports).unwrap();
        assert!(reports.contains(&Report::Algorithm(Discipline::Fcfs)));
    }

    #[test]
    fn zero_quantum_override_is_an_engine_error() {
        let plan = AdaptiveScheduler::new()
            .plan(&workload(), snap(90.0, false, 10.0), NOW)
            .with_discipline(Discipline::RoundRobin { quantum: 0 });
        let err = plan.run(&mut Vec::<Report>::new()).unwrap_err();
        assert_eq!(err, EngineError::ZeroQuantum);
    }

    #[test]
    fn forecast_comes_from_history() {
        let mut history = BatteryHistory::default();
        history.push(80.0);
        history.push(78.0);
        let plan = AdaptiveScheduler::new()
            .plan(&workload(), snap(90.0, false, 10.0), NOW)
            .with_forecast(&history);
        let mut reports: Vec<Report> = Vec::new();
        plan.run(&mut reports).unwrap();
        let forecast = reports.iter().find_map(|r| match r {
            Report::Step(s) => Some(s.forecast.to_string()),
            _ => None,
        });
        assert_eq!(forecast.as_deref(), Some("79 mins left"));
    }

    #[test]
    fn single_sample_history_forecasts_its_level() {
        let mut history = BatteryHistory::default();
        history.push(64.0);
        let plan = AdaptiveScheduler::new()
            .plan(&workload(), snap(90.0, false, 10.0), NOW)
            .with_forecast(&history);
        let mut reports: Vec<Report> = Vec::new();
        plan.run(&mut reports).unwrap();
        assert!(reports.iter().any(|r| matches!(r, Report::Step(_))));
        assert!(reports.iter().all(|r| match r {
            Report::Step(s) => s.forecast.to_string() == "64%",
            _ => true,
        }));
    }

    #[tokio::test]
    async fn channel_sink_forwards_reports() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<Report>();
        let plan = AdaptiveScheduler::new().plan(&workload(), snap(90.0, true, 10.0), NOW);
        plan.run(&mut tx).unwrap();
        drop(tx);

        let mut count = 0;
        while let Some(_report) = rx.recv().await {
            count += 1;
        }
        // 3 triage + algorithm + steps + finished
        assert!(count > 5);
    }

    #[test]
    fn closed_channel_cancels_run() {
        let (mut tx, rx) = mpsc::unbounded_channel::<Report>();
        drop(rx);
        let plan = AdaptiveScheduler::new().plan(&workload(), snap(90.0, true, 10.0), NOW);
        assert_eq!(plan.run(&mut tx).unwrap(), RunOutcome::Cancelled { at: 0 });
    }

    // ── Advisor ───────────────────────────────────────────────────────────────

    struct Broken;

    impl Advisor for Broken {
        fn favors_running(&self, _: &AdvisoryFeatures) -> Result<bool, AdvisoryError> {
            Err(AdvisoryError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn advisor_is_optional() {
        assert!(!AdaptiveScheduler::new().has_advisor());
        assert!(AdaptiveScheduler::with_advisor(Arc::new(Broken)).has_advisor());
    }

    #[test]
    fn broken_advisor_does_not_change_the_plan() {
        let with = AdaptiveScheduler::with_advisor(Arc::new(Broken));
        let plan = with.plan(&workload(), snap(10.0, false, 30.0), NOW);
        let reasons: Vec<_> = plan.triaged().iter().map(|(_, _, t)| t.reason).collect();
        assert!(reasons
            .iter()
            .all(|r| matches!(r, TriageReason::Battery(_))));
        assert_eq!(plan.partition().held.throttled, vec!["sync"]);
        assert_eq!(plan.partition().held.paused, vec!["backup"]);
    }
}
