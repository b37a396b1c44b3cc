//! Discipline engines for the scheduling simulator.
//!
//! An [`Engine`] drives one set of [`Process`]es under one [`Discipline`],
//! one tick at a time.  Every call to [`Engine::next_step`] advances the
//! simulated clock by exactly one tick and returns the [`ExecutionStep`] that
//! occupied it; the engine is also an [`Iterator`] over those steps.
//!
//! # Tick model
//!
//! ```text
//!            admit arrivals (arrival_time ≤ now, by arrival then id)
//!                               │
//!   CPU empty ──select──► Switching (CONTEXT_SWITCH ticks, every dispatch)
//!       ▲                       │
//!       │                       ▼
//!       ├──── completed ◄── Running ──io due──► Blocked (IO_WAIT ticks)
//!       │                       │                      │
//!       └── back of ready ◄─────┴ quantum / preempt    └──► back of ready
//! ```
//!
//! | Discipline | Selection on dispatch | Preemptive |
//! |---|---|---|
//! | FCFS | front of the ready queue | no |
//! | SJF | minimum `burst_time` | no |
//! | SRTF | minimum `remaining_time`, re-checked every tick | yes, on a strictly shorter ready process |
//! | Priority | minimum priority rank | no |
//! | Round Robin | front of the ready queue | at quantum boundary |
//!
//! Ties are always broken by ready-queue order, which itself is arrival order
//! (ids break arrival ties) followed by re-queue order.
//!
//! # Suspension and cancellation
//! All run state lives inside the engine.  A consumer may stop pulling steps
//! at any point and simply drop the engine; nothing needs releasing.
//!
//! # Example
//! ```rust
//! use powersched::engine::{Discipline, StepKind};
//! use powersched::process::{Process, ProcessSpec};
//!
//! let spec = ProcessSpec { id: 1, burst_time: 2, ..Default::default() };
//! let engine = Discipline::Fcfs.engine(vec![Process::new(&spec).unwrap()]).unwrap();
//! let kinds: Vec<StepKind> = engine.map(|s| s.kind).collect();
//! assert_eq!(kinds, vec![StepKind::ContextSwitch, StepKind::Run, StepKind::Run]);
//! ```

pub mod error;
pub mod metrics;

pub use error::EngineError;

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use tracing::debug;

use crate::process::{Process, ProcessId, Ticks};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Dispatch overhead, in ticks, paid every time a process is put on an empty
/// CPU.  A process that keeps the CPU across ticks pays nothing.
pub const CONTEXT_SWITCH: Ticks = 1;

/// Length, in ticks, of one I/O block.
pub const IO_WAIT: Ticks = 2;

/// Round Robin quantum used when none is configured.
pub const DEFAULT_QUANTUM: Ticks = 2;

// ── Discipline ────────────────────────────────────────────────────────────────

/// The closed set of scheduling disciplines.
///
/// Replaces lookup-by-name with an enum; [`FromStr`] is the single validated
/// mapping from a textual name to a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Discipline {
    Fcfs,
    Sjf,
    Srtf,
    Priority,
    RoundRobin { quantum: Ticks },
}

impl Discipline {
    /// Every discipline, in the fixed order used for comparisons.
    pub const ALL: [Discipline; 5] = [
        Discipline::Fcfs,
        Discipline::Sjf,
        Discipline::Srtf,
        Discipline::Priority,
        Discipline::RoundRobin {
            quantum: DEFAULT_QUANTUM,
        },
    ];

    /// Round Robin with an explicit quantum.
    ///
    /// # Errors
    /// [`EngineError::ZeroQuantum`] when `quantum == 0`.
    pub fn round_robin(quantum: Ticks) -> Result<Self, EngineError> {
        if quantum == 0 {
            return Err(EngineError::ZeroQuantum);
        }
        Ok(Discipline::RoundRobin { quantum })
    }

    /// Short name, e.g. `"SRTF"`.
    pub fn name(self) -> &'static str {
        match self {
            Discipline::Fcfs => "FCFS",
            Discipline::Sjf => "SJF",
            Discipline::Srtf => "SRTF",
            Discipline::Priority => "Priority",
            Discipline::RoundRobin { .. } => "Round Robin",
        }
    }

    /// Long, human-readable name reported when a discipline is selected.
    pub fn display_name(self) -> &'static str {
        match self {
            Discipline::Fcfs => "First Come First Serve (FCFS)",
            Discipline::Sjf => "Shortest Job First (SJF)",
            Discipline::Srtf => "Shortest Remaining Time First (SRTF)",
            Discipline::Priority => "Priority Scheduling",
            Discipline::RoundRobin { .. } => "Round Robin",
        }
    }

    pub fn is_preemptive(self) -> bool {
        matches!(self, Discipline::Srtf | Discipline::RoundRobin { .. })
    }

    /// Build an engine that will drive `processes` under this discipline.
    pub fn engine(self, processes: Vec<Process>) -> Result<Engine, EngineError> {
        Engine::new(self, processes)
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::RoundRobin { quantum } => write!(f, "Round Robin (q={quantum})"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Discipline {
    type Err = EngineError;

    /// Accepts short names (`fcfs`, `sjf`, `srtf`, `priority`, `rr`,
    /// `round_robin`) and the long display names, case-insensitively.  Round
    /// Robin parses with [`DEFAULT_QUANTUM`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        let discipline = match key.as_str() {
            "fcfs" | "first come first serve" | "first come first serve (fcfs)" => {
                Discipline::Fcfs
            }
            "sjf" | "shortest job first" | "shortest job first (sjf)" => Discipline::Sjf,
            "srtf"
            | "shortest remaining time first"
            | "shortest remaining time first (srtf)" => Discipline::Srtf,
            "priority" | "priority scheduling" => Discipline::Priority,
            "rr" | "round robin" => Discipline::RoundRobin {
                quantum: DEFAULT_QUANTUM,
            },
            _ => return Err(EngineError::UnknownDiscipline(s.to_string())),
        };
        Ok(discipline)
    }
}

// ── ExecutionStep ─────────────────────────────────────────────────────────────

/// What occupied the CPU during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Nothing ready to run.
    Idle,
    /// Dispatch overhead before a dispatched process starts.
    ContextSwitch,
    /// The running process was charged one tick.
    Run,
    /// The dispatched process is blocked on I/O.
    IoWait,
}

/// One simulated tick, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStep {
    /// Tick this step occupies.
    pub time: Ticks,
    pub kind: StepKind,
    /// Process charged during this tick; `None` for idle, switch and I/O ticks.
    pub running: Option<ProcessId>,
    /// Ready queue, front first, as it stood during this tick.
    pub ready_queue: Vec<ProcessId>,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Occupancy of the single simulated CPU.
#[derive(Debug)]
enum Cpu {
    Empty,
    Switching { process: Process, left: Ticks },
    Running { process: Process, slice_used: Ticks },
    Blocked { process: Process, left: Ticks },
}

/// Step generator for one simulation run.
///
/// Finite and non-restartable: once every process has completed,
/// [`next_step`](Self::next_step) keeps returning `None`.
#[derive(Debug)]
pub struct Engine {
    discipline: Discipline,
    now: Ticks,
    /// Not yet arrived, sorted by `(arrival_time, id)`.
    waiting: VecDeque<Process>,
    ready: VecDeque<Process>,
    cpu: Cpu,
    completed: Vec<Process>,
}

impl Engine {
    /// Create an engine for `processes`, which need not be arrival-sorted.
    ///
    /// # Errors
    /// * [`EngineError::DuplicateProcessId`] – two processes share an id.
    /// * [`EngineError::ZeroQuantum`] – a Round Robin quantum of zero.
    pub fn new(discipline: Discipline, mut processes: Vec<Process>) -> Result<Self, EngineError> {
        if let Discipline::RoundRobin { quantum: 0 } = discipline {
            return Err(EngineError::ZeroQuantum);
        }

        let mut seen = BTreeSet::new();
        for p in &processes {
            if !seen.insert(p.id()) {
                return Err(EngineError::DuplicateProcessId(p.id()));
            }
        }

        processes.sort_by_key(|p| (p.arrival_time(), p.id()));

        debug!(
            discipline = %discipline,
            process_count = processes.len(),
            "engine created"
        );

        Ok(Self {
            discipline,
            now: 0,
            waiting: processes.into(),
            ready: VecDeque::new(),
            cpu: Cpu::Empty,
            completed: Vec::new(),
        })
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// The tick the next step will occupy.
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// `true` once every process has completed.
    pub fn is_finished(&self) -> bool {
        self.waiting.is_empty() && self.ready.is_empty() && matches!(self.cpu, Cpu::Empty)
    }

    /// Every process owned by this engine, wherever it currently sits.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        let on_cpu = match &self.cpu {
            Cpu::Empty => None,
            Cpu::Switching { process, .. }
            | Cpu::Running { process, .. }
            | Cpu::Blocked { process, .. } => Some(process),
        };
        self.completed
            .iter()
            .chain(on_cpu)
            .chain(self.ready.iter())
            .chain(self.waiting.iter())
    }

    /// Processes that have finished, in completion order.
    pub fn completed(&self) -> &[Process] {
        &self.completed
    }

    /// Advance the simulation by one tick.
    ///
    /// Returns `None` once every process has completed.
    pub fn next_step(&mut self) -> Option<ExecutionStep> {
        if self.is_finished() {
            return None;
        }
        self.admit();

        // Every branch either emits (consuming one tick) or makes a
        // zero-time transition and loops.
        loop {
            match std::mem::replace(&mut self.cpu, Cpu::Empty) {
                Cpu::Empty => match self.select() {
                    Some(mut process) => {
                        process.mark_running();
                        debug!(time = self.now, process = process.id(), "dispatch");
                        self.cpu = if CONTEXT_SWITCH > 0 {
                            Cpu::Switching {
                                process,
                                left: CONTEXT_SWITCH,
                            }
                        } else {
                            Cpu::Running {
                                process,
                                slice_used: 0,
                            }
                        };
                    }
                    None => return Some(self.emit(StepKind::Idle, None)),
                },

                Cpu::Switching { process, left } => {
                    let step = self.emit(StepKind::ContextSwitch, None);
                    self.cpu = if left > 1 {
                        Cpu::Switching {
                            process,
                            left: left - 1,
                        }
                    } else {
                        Cpu::Running {
                            process,
                            slice_used: 0,
                        }
                    };
                    return Some(step);
                }

                Cpu::Blocked { mut process, left } => {
                    let step = self.emit(StepKind::IoWait, None);
                    if left > 1 {
                        self.cpu = Cpu::Blocked {
                            process,
                            left: left - 1,
                        };
                    } else {
                        process.end_io_wait();
                        debug!(time = step.time, process = process.id(), "I/O complete, re-queued");
                        self.ready.push_back(process);
                    }
                    return Some(step);
                }

                Cpu::Running {
                    mut process,
                    slice_used,
                } => {
                    if self.discipline == Discipline::Srtf && self.has_shorter_ready(&process) {
                        debug!(
                            time = self.now,
                            process = process.id(),
                            remaining = process.remaining_time(),
                            "preempted by shorter remaining time"
                        );
                        process.mark_ready();
                        self.ready.push_back(process);
                        continue;
                    }

                    if process.io_due() {
                        debug!(
                            time = self.now,
                            process = process.id(),
                            executed = process.executed_time(),
                            "blocked on I/O"
                        );
                        process.begin_io_wait();
                        self.cpu = Cpu::Blocked {
                            process,
                            left: IO_WAIT,
                        };
                        continue;
                    }

                    process.tick(self.now);
                    let step = self.emit(StepKind::Run, Some(process.id()));
                    let slice_used = slice_used + 1;

                    if process.is_complete() {
                        debug!(time = step.time, process = process.id(), "completed");
                        self.completed.push(process);
                    } else if matches!(self.discipline, Discipline::RoundRobin { quantum } if slice_used >= quantum)
                    {
                        process.mark_ready();
                        self.ready.push_back(process);
                    } else {
                        self.cpu = Cpu::Running {
                            process,
                            slice_used,
                        };
                    }
                    return Some(step);
                }
            }
        }
    }

    /// Move every arrived process into the ready queue, in arrival order.
    fn admit(&mut self) {
        while self
            .waiting
            .front()
            .is_some_and(|p| p.arrival_time() <= self.now)
        {
            if let Some(mut process) = self.waiting.pop_front() {
                process.mark_ready();
                debug!(time = self.now, process = process.id(), "admitted");
                self.ready.push_back(process);
            }
        }
    }

    /// Remove and return the next process to dispatch, per discipline.
    fn select(&mut self) -> Option<Process> {
        let index = match self.discipline {
            Discipline::Fcfs | Discipline::RoundRobin { .. } => {
                if self.ready.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            Discipline::Sjf => self.position_of_min(Process::burst_time),
            Discipline::Srtf => self.position_of_min(Process::remaining_time),
            Discipline::Priority => self.position_of_min(|p| p.priority().rank()),
        }?;
        self.ready.remove(index)
    }

    /// Index of the first ready process minimising `key`.
    fn position_of_min<K: Ord>(&self, key: impl Fn(&Process) -> K) -> Option<usize> {
        self.ready
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| (key(p), *i))
            .map(|(i, _)| i)
    }

    fn has_shorter_ready(&self, running: &Process) -> bool {
        self.ready
            .iter()
            .any(|p| p.remaining_time() < running.remaining_time())
    }

    /// Record the current tick and advance the clock.
    fn emit(&mut self, kind: StepKind, running: Option<ProcessId>) -> ExecutionStep {
        let step = ExecutionStep {
            time: self.now,
            kind,
            running,
            ready_queue: self.ready.iter().map(Process::id).collect(),
        };
        self.now += 1;
        step
    }
}

impl Iterator for Engine {
    type Item = ExecutionStep;

    fn next(&mut self) -> Option<ExecutionStep> {
        self.next_step()
    }
}

impl FusedIterator for Engine {}

// ── Tests ─────────────────────────────────────────────────────────────────────
