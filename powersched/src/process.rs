/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process data structures for the scheduling simulator.
//!
//! Two distinct types model the two sides of a simulation run:
//!
//! ```text
//! caller / store ──(ProcessSpec)──► Process::new() ──► Process ──(Engine)──► ExecutionStep
//!                    ↑ raw input       validation        ↑ owned working copy
//! ```
//!
//! # Ownership model
//! A [`Process`] is **owned** by exactly one [`Engine`](crate::engine::Engine)
//! for the duration of one simulation run.  The caller moves `Vec<Process>`
//! into the engine; runs that need the same workload build (or clone) their
//! own copies, so no two engines can ever mutate the same run state.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Stable identifier of a process, unique within one run.
pub type ProcessId = u32;

/// Simulated time, in engine ticks.
pub type Ticks = u64;

// ── Priority class ────────────────────────────────────────────────────────────

/// Coarse priority of a process.
///
/// The numeric rank follows the scheduler convention: **lower value means
/// more urgent** (`High = 0`, `Medium = 1`, `Low = 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PriorityClass {
    High,
    #[default]
    Medium,
    Low,
}

impl PriorityClass {
    /// Ordinal used by the Priority discipline and the advisory features.
    pub fn rank(self) -> u8 {
        match self {
            PriorityClass::High => 0,
            PriorityClass::Medium => 1,
            PriorityClass::Low => 2,
        }
    }

    /// Parse the textual label stored alongside a task.
    ///
    /// Unknown labels map to `Medium`, the same default used when a task has
    /// no priority at all.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => PriorityClass::High,
            "low" => PriorityClass::Low,
            _ => PriorityClass::Medium,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PriorityClass::High => "High",
            PriorityClass::Medium => "Medium",
            PriorityClass::Low => "Low",
        };
        f.write_str(label)
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Lifecycle of a process inside one run.
///
/// `Admitted → Ready → Running → (Blocked → Ready)* → Completed`.
/// `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    #[default]
    Admitted,
    Ready,
    Running,
    Blocked,
    Completed,
}

// ── Validation errors ─────────────────────────────────────────────────────────

/// Why a [`ProcessSpec`] was refused by [`Process::new`].
///
/// Fatal to the offending process only: callers reject that single task and
/// carry on with the rest of the workload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidProcessSpec {
    #[error("process {id}: burst_time must be at least 1, got {burst_time}")]
    NonPositiveBurst { id: ProcessId, burst_time: i64 },

    #[error("process {id}: arrival_time must not be negative, got {arrival_time}")]
    NegativeArrival { id: ProcessId, arrival_time: i64 },

    #[error("process {id}: I/O tick {tick} lies outside [1, {burst_time})")]
    IoTickOutOfRange {
        id: ProcessId,
        tick: i64,
        burst_time: i64,
    },
}

// ── ProcessSpec (input) ───────────────────────────────────────────────────────

/// Caller-materialised description of one process.
///
/// Timing fields are signed on purpose: they carry whatever the caller's
/// store holds, and [`Process::new`] is the single place that decides
/// whether the values are acceptable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSpec {
    pub id: ProcessId,

    /// Display name used in reports (paused / batched lists, logs).
    pub name: String,

    pub priority: PriorityClass,

    /// Total CPU ticks required.
    pub burst_time: i64,

    /// Tick at which the process becomes eligible.
    pub arrival_time: i64,

    /// Executed-tick offsets at which the process blocks for I/O.
    pub io_ticks: Vec<i64>,

    /// Energy cost used by the battery-impact estimator.
    pub energy: f64,

    /// Optional deadline, in the caller's wall-clock units (epoch seconds).
    pub deadline: Option<u64>,
}

// ── Process (working copy) ────────────────────────────────────────────────────

/// A validated process together with its mutable run state.
///
/// Invariant: `remaining_time + executed_time == burst_time` at all times.
/// Only the engine mutates run state, through the crate-private operations
/// `tick`, `begin_io_wait` and `end_io_wait`.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    // ── Specification (immutable) ─────────────────────────────────────────────
    id: ProcessId,
    name: String,
    priority: PriorityClass,
    burst_time: Ticks,
    arrival_time: Ticks,
    io_ticks: BTreeSet<Ticks>,
    energy: f64,
    deadline: Option<u64>,

    // ── Run state ─────────────────────────────────────────────────────────────
    remaining_time: Ticks,
    executed_time: Ticks,
    waiting_for_io: bool,
    state: ProcessState,
    /// I/O offsets not yet served.  Each one fires at most once.
    pending_io: BTreeSet<Ticks>,
    first_run: Option<Ticks>,
    completed_at: Option<Ticks>,
}

impl Process {
    /// Validate `spec` and build a fresh process in the `Admitted` state.
    ///
    /// # Errors
    /// * [`InvalidProcessSpec::NonPositiveBurst`] – `burst_time < 1`.
    /// * [`InvalidProcessSpec::NegativeArrival`] – `arrival_time < 0`.
    /// * [`InvalidProcessSpec::IoTickOutOfRange`] – an I/O tick outside
    ///   `[1, burst_time)`.
    pub fn new(spec: &ProcessSpec) -> Result<Self, InvalidProcessSpec> {
        let id = spec.id;
        if spec.burst_time < 1 {
            return Err(InvalidProcessSpec::NonPositiveBurst {
                id,
                burst_time: spec.burst_time,
            });
        }
        if spec.arrival_time < 0 {
            return Err(InvalidProcessSpec::NegativeArrival {
                id,
                arrival_time: spec.arrival_time,
            });
        }
        if let Some(&tick) = spec
            .io_ticks
            .iter()
            .find(|&&t| t < 1 || t >= spec.burst_time)
        {
            return Err(InvalidProcessSpec::IoTickOutOfRange {
                id,
                tick,
                burst_time: spec.burst_time,
            });
        }

        let burst_time = spec.burst_time as Ticks;
        let io_ticks: BTreeSet<Ticks> = spec.io_ticks.iter().map(|&t| t as Ticks).collect();

        Ok(Self {
            id,
            name: spec.name.clone(),
            priority: spec.priority,
            burst_time,
            arrival_time: spec.arrival_time as Ticks,
            pending_io: io_ticks.clone(),
            io_ticks,
            energy: spec.energy,
            deadline: spec.deadline,
            remaining_time: burst_time,
            executed_time: 0,
            waiting_for_io: false,
            state: ProcessState::Admitted,
            first_run: None,
            completed_at: None,
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> PriorityClass {
        self.priority
    }

    pub fn burst_time(&self) -> Ticks {
        self.burst_time
    }

    pub fn arrival_time(&self) -> Ticks {
        self.arrival_time
    }

    pub fn io_ticks(&self) -> &BTreeSet<Ticks> {
        &self.io_ticks
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn remaining_time(&self) -> Ticks {
        self.remaining_time
    }

    pub fn executed_time(&self) -> Ticks {
        self.executed_time
    }

    pub fn is_waiting_for_io(&self) -> bool {
        self.waiting_for_io
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Tick of the first charged CPU tick, once the process has run.
    pub fn first_run(&self) -> Option<Ticks> {
        self.first_run
    }

    /// Tick of the final charged CPU tick, once the process has completed.
    pub fn completed_at(&self) -> Option<Ticks> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_time == 0
    }

    // ── Engine-internal transitions ───────────────────────────────────────────

    pub(crate) fn mark_ready(&mut self) {
        debug_assert_ne!(
            self.state,
            ProcessState::Completed,
            "completed process {} cannot become ready",
            self.id
        );
        self.state = ProcessState::Ready;
    }

    pub(crate) fn mark_running(&mut self) {
        debug_assert_eq!(
            self.state,
            ProcessState::Ready,
            "process {} must be ready before it is dispatched",
            self.id
        );
        self.state = ProcessState::Running;
    }

    /// `true` when the next tick would hit an unserved I/O offset.
    pub(crate) fn io_due(&self) -> bool {
        self.pending_io.contains(&self.executed_time)
    }

    /// Charge one CPU tick at time `now`.  A no-op while blocked on I/O.
    ///
    /// # Panics
    /// Panics if the process has no remaining time; the engine must never
    /// charge a completed process.
    pub(crate) fn tick(&mut self, now: Ticks) {
        if self.waiting_for_io {
            return;
        }
        assert!(
            self.remaining_time > 0,
            "process {} charged a tick with no remaining time",
            self.id
        );

        self.remaining_time -= 1;
        self.executed_time += 1;
        self.first_run.get_or_insert(now);

        if self.remaining_time == 0 {
            self.state = ProcessState::Completed;
            self.completed_at = Some(now);
        }

        debug_assert_eq!(
            self.remaining_time + self.executed_time,
            self.burst_time,
            "conservation broken for process {}",
            self.id
        );
    }

    /// Block on the I/O offset at the current executed time.  The offset is
    /// consumed, so it can never trigger a second time.
    pub(crate) fn begin_io_wait(&mut self) {
        let served = self.pending_io.remove(&self.executed_time);
        debug_assert!(served, "process {} blocked without a due I/O tick", self.id);
        self.waiting_for_io = true;
        self.state = ProcessState::Blocked;
    }

    pub(crate) fn end_io_wait(&mut self) {
        self.waiting_for_io = false;
        self.state = ProcessState::Ready;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
