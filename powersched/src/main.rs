/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use powersched::config::WorkloadConfigManager;
use powersched::engine::{Discipline, StepKind};
use powersched::policy::{AdaptiveScheduler, Report, RunOutcome};
use powersched::process::{Process, ProcessSpec};
use powersched::runner::compare_disciplines;
use powersched::telemetry::{snapshot_or_default, BatteryHistory, SysfsTelemetry, SystemSnapshot};

/// Spacing between battery samples.  The forecast reads one sample as one
/// minute.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

// ── CLI argument definition ───────────────────────────────────────────────────

/// Battery-aware process scheduling simulator.
///
/// Example:
///   powersched --workload demos/workload.yaml --battery 35 --cpu 20
#[derive(Debug, Parser)]
#[command(
    name = "powersched",
    about = "Battery-aware process scheduling simulator",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML workload file.
    #[arg(short = 'w', long = "workload")]
    workload: Option<PathBuf>,

    /// Discipline to run: adaptive, fcfs, sjf, srtf, priority or rr.
    #[arg(short = 'a', long = "algorithm", default_value = "adaptive")]
    algorithm: String,

    /// Battery level override, in percent.
    #[arg(long = "battery")]
    battery: Option<f64>,

    /// Treat the device as plugged in.
    #[arg(long = "charging", default_value_t = false)]
    charging: bool,

    /// CPU load override, in percent.
    #[arg(long = "cpu")]
    cpu: Option<f64>,

    /// Temperature override, in °C.
    #[arg(long = "temperature")]
    temperature: Option<f64>,

    /// Read telemetry from /sys and /proc.
    #[arg(long = "sysfs", default_value_t = false)]
    sysfs: bool,

    /// Run every discipline concurrently and report metrics side by side.
    #[arg(long = "compare", default_value_t = false)]
    compare: bool,

    /// Round Robin quantum when `--algorithm rr` is given.
    #[arg(short = 'q', long = "quantum")]
    quantum: Option<u64>,

    /// Battery readings to take, one minute apart, before planning.
    /// Two or more give a minutes-left forecast.
    #[arg(long = "samples", default_value_t = 1)]
    samples: usize,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        workload  = ?cli.workload,
        algorithm = %cli.algorithm,
        sysfs     = cli.sysfs,
        compare   = cli.compare,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load workload ─────────────────────────────────────────────────────────
    let mut workload = WorkloadConfigManager::new();
    match &cli.workload {
        Some(path) => workload
            .load_from_file(path)
            .context("Failed to load workload configuration")?,
        None => warn!("No workload file provided, nothing will be scheduled"),
    }

    let (snapshot, history) = sample(&cli, &workload).await;
    info!(
        battery     = snapshot.battery_percent,
        charging    = snapshot.is_charging,
        cpu         = snapshot.cpu_percent,
        temperature = snapshot.temperature_celsius,
        samples     = history.len(),
        forecast    = %history.forecast(),
        "System snapshot"
    );

    let specs = workload.specs();

    if cli.compare {
        return compare(&specs, snapshot.battery_percent).await;
    }

    // ── Plan ──────────────────────────────────────────────────────────────────
    let scheduler = match workload.advisor() {
        Some(advisor) => AdaptiveScheduler::with_advisor(Arc::new(advisor)),
        None => AdaptiveScheduler::new(),
    };
    info!(advisor = scheduler.has_advisor(), "Planning");
    let mut plan = scheduler
        .plan(&specs, snapshot, epoch_seconds())
        .with_forecast(&history);

    if !cli.algorithm.eq_ignore_ascii_case("adaptive") {
        let mut discipline: Discipline = cli.algorithm.parse()?;
        if let (Discipline::RoundRobin { .. }, Some(q)) = (discipline, cli.quantum) {
            discipline = Discipline::round_robin(q)?;
        }
        plan = plan.with_discipline(discipline);
    }

    // ── Run ───────────────────────────────────────────────────────────────────
    let (mut tx, mut rx) = mpsc::unbounded_channel::<Report>();
    let worker = tokio::task::spawn_blocking(move || plan.run(&mut tx));

    while let Some(report) = rx.recv().await {
        log_report(&report);
    }

    match worker.await.context("Scheduler worker panicked")?? {
        RunOutcome::Idle => info!("Cycle idle"),
        RunOutcome::Completed(metrics) => info!(
            total_ticks = metrics.total_ticks,
            completed = metrics.completed,
            "Cycle complete"
        ),
        RunOutcome::Cancelled { at } => warn!(at, "Cycle cancelled"),
    }
    Ok(())
}

/// Take `--samples` snapshots, recording each battery level, and return
/// the last one together with the history.
async fn sample(cli: &Cli, workload: &WorkloadConfigManager) -> (SystemSnapshot, BatteryHistory) {
    let mut history = BatteryHistory::default();
    let mut snapshot = resolve_snapshot(cli, workload);
    history.push(snapshot.battery_percent);

    for _ in 1..cli.samples {
        tokio::time::sleep(SAMPLE_INTERVAL).await;
        snapshot = resolve_snapshot(cli, workload);
        history.push(snapshot.battery_percent);
    }
    (snapshot, history)
}

/// Snapshot source precedence: sysfs, then the workload file, then defaults.
/// CLI flags override individual fields.
fn resolve_snapshot(cli: &Cli, workload: &WorkloadConfigManager) -> SystemSnapshot {
    let base = if cli.sysfs {
        snapshot_or_default(&SysfsTelemetry::new())
    } else {
        workload.snapshot().unwrap_or_default()
    };

    SystemSnapshot::new(
        cli.battery.unwrap_or(base.battery_percent),
        cli.charging || base.is_charging,
        cli.cpu.unwrap_or(base.cpu_percent),
        cli.temperature.unwrap_or(base.temperature_celsius),
    )
}

async fn compare(specs: &[ProcessSpec], battery: f64) -> Result<()> {
    let processes: Vec<Process> = specs
        .iter()
        .filter_map(|spec| match Process::new(spec) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(id = spec.id, error = %e, "Skipping invalid task");
                None
            }
        })
        .collect();

    let results = compare_disciplines(&processes, battery).await?;
    for row in results {
        let m = &row.metrics;
        info!(
            "  [{name:<18}]  ticks={ticks:<4} switches={sw:<3} avg_wait={wait:<6.2} \
             avg_turnaround={tat:<6.2} cpu={cpu:>5.1}%  battery_used={used:>5.1}%",
            name = row.discipline.to_string(),
            ticks = m.total_ticks,
            sw = m.context_switches,
            wait = m.avg_waiting,
            tat = m.avg_turnaround,
            cpu = m.cpu_utilization,
            used = row.impact.used,
        );
    }
    Ok(())
}

fn log_report(report: &Report) {
    match report {
        Report::Rejected { id, error } => warn!(id, error = %error, "Task rejected"),
        Report::Triage { id, name, triage } => info!(
            id,
            name = %name,
            decision = %triage.decision,
            status = triage.decision.status_label(),
            "Triage"
        ),
        Report::Idle(idle) => info!(
            paused = ?idle.held.paused,
            batched = ?idle.held.batched,
            deferred = ?idle.held.deferred,
            throttled = ?idle.held.throttled,
            forecast = %idle.forecast,
            "{}",
            powersched::policy::IDLE_LABEL
        ),
        Report::Algorithm(d) => info!(algorithm = d.display_name(), discipline = %d, "Algorithm selected"),
        Report::Step(s) => {
            let running = match s.step.kind {
                StepKind::Run => s.step.running.map(|id| id.to_string()),
                StepKind::ContextSwitch => Some("<switch>".to_string()),
                StepKind::IoWait => Some("<io>".to_string()),
                StepKind::Idle => None,
            };
            info!(
                t = s.step.time,
                running = running.as_deref().unwrap_or("-"),
                queue = ?s.step.ready_queue,
                held = s.held.len(),
                "Step"
            );
        }
        Report::Finished { metrics, impact } => info!(
            discipline = %metrics.discipline,
            avg_waiting = metrics.avg_waiting,
            avg_turnaround = metrics.avg_turnaround,
            cpu_utilization = metrics.cpu_utilization,
            battery_remaining = impact.remaining,
            battery_used = impact.used,
            "Finished"
        ),
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
