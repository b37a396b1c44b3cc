/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Running engines on tokio worker threads.
//!
//! Engines are synchronous state machines.  This module puts them on the
//! blocking pool so async callers can
//!
//! * compare every discipline on the same workload concurrently
//!   ([`compare_disciplines`]), each run on its own copy of the processes;
//! * consume a single run as a channel of steps ([`stream`]), where dropping
//!   the receiver stops the run at the next tick and the worker reports how
//!   far it got.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::energy::{compare_battery_impact, BatteryImpact};
use crate::engine::metrics::{simulate, RunMetrics};
use crate::engine::{Discipline, Engine, ExecutionStep};
use crate::process::{Process, Ticks};

/// Result of one discipline in a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub discipline: Discipline,
    pub metrics: RunMetrics,
    pub impact: BatteryImpact,
}

/// Run `processes` under every discipline in [`Discipline::ALL`]
/// concurrently and return the results in that order.
///
/// Each run receives its own clone of `processes`.  Battery impact comes
/// from [`compare_battery_impact`], so `used` is not limited by a nearly
/// empty battery and the rows stay comparable.
pub async fn compare_disciplines(
    processes: &[Process],
    current_battery: f64,
) -> Result<Vec<Comparison>> {
    let energies: Vec<f64> = processes.iter().map(Process::energy).collect();
    let impacts = compare_battery_impact(&energies, current_battery);

    let handles: Vec<(Discipline, JoinHandle<_>)> = Discipline::ALL
        .iter()
        .map(|&discipline| {
            let copy = processes.to_vec();
            let handle = tokio::task::spawn_blocking(move || simulate(discipline, copy));
            (discipline, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for ((discipline, handle), impact) in handles.into_iter().zip(impacts) {
        debug_assert_eq!(discipline, impact.discipline);
        let metrics = handle
            .await
            .with_context(|| format!("{discipline} worker panicked"))?
            .with_context(|| format!("{discipline} could not be simulated"))?;
        results.push(Comparison {
            discipline,
            metrics,
            impact,
        });
    }

    info!(disciplines = results.len(), "comparison complete");
    Ok(results)
}

/// Drive `engine` on a blocking worker, sending each step to the returned
/// receiver.
///
/// The channel holds at most `capacity` (minimum 1) unconsumed steps; the
/// worker waits for the consumer beyond that.  Dropping the receiver ends
/// the run at the next tick.  The handle resolves to the number of steps
/// the engine produced before it stopped.
pub fn stream(
    mut engine: Engine,
    capacity: usize,
) -> (mpsc::Receiver<ExecutionStep>, JoinHandle<Ticks>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let discipline = engine.discipline();

    let worker = tokio::task::spawn_blocking(move || {
        while let Some(step) = engine.next_step() {
            let at = step.time;
            if tx.blocking_send(step).is_err() {
                debug!(discipline = %discipline, at, "receiver dropped, stopping run");
                return engine.now();
            }
        }
        debug!(discipline = %discipline, ticks = engine.now(), "stream finished");
        engine.now()
    });

    (rx, worker)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
