/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Triage classifier: decides, per process and per decision cycle, whether
//! the process is offered to a discipline engine at all.
//!
//! Rules are applied in a fixed precedence; later rules override earlier
//! ones:
//!
//! 1. **Advisory** – an optional [`Advisor`] votes Run or Pause.
//! 2. **Power** – charging forces Run.  On battery, the [`BatteryBand`] and
//!    the process priority decide:
//!
//!    | Band | High | Medium | Low |
//!    |---|---|---|---|
//!    | `> 50 %` | Run | Run | Run |
//!    | `20 ..= 50 %` | Run | Batch | Defer |
//!    | `< 20 %` | Run | Throttle | Pause |
//!
//! 3. **Deadline** – a deadline earlier than `now + DEADLINE_WINDOW` forces
//!    Run.  Already-missed deadlines count as urgent.
//!
//! Because step 2 always assigns a decision, the advisory vote never
//! survives on its own; it is kept on the [`Triage`] result for logging.
//!
//! [`classify`] is pure.  [`triage`] adds the advisor call and falls back to
//! threshold-only rules (with a `warn!`) when the advisor fails.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::process::{PriorityClass, Process};
use crate::telemetry::SystemSnapshot;

/// A deadline closer than this many seconds forces Run.
pub const DEADLINE_WINDOW: u64 = 10;

/// Version of the [`AdvisoryFeatures`] layout.
pub const SCHEMA_VERSION: u32 = 1;

// ── Decisions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriageDecision {
    Run,
    Pause,
    Batch,
    Defer,
    Throttle,
}

impl TriageDecision {
    pub const ALL: [TriageDecision; 5] = [
        TriageDecision::Run,
        TriageDecision::Pause,
        TriageDecision::Batch,
        TriageDecision::Defer,
        TriageDecision::Throttle,
    ];

    /// Status written back to the task store for this decision.
    pub fn status_label(self) -> &'static str {
        match self {
            TriageDecision::Run => "Ready",
            TriageDecision::Pause => "Paused",
            TriageDecision::Batch => "Batched",
            TriageDecision::Defer => "Deferred",
            TriageDecision::Throttle => "Throttled",
        }
    }
}

impl fmt::Display for TriageDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriageDecision::Run => "Run",
            TriageDecision::Pause => "Pause",
            TriageDecision::Batch => "Batch",
            TriageDecision::Defer => "Defer",
            TriageDecision::Throttle => "Throttle",
        };
        f.write_str(s)
    }
}

/// Battery level bucket used while running on battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryBand {
    /// Above 50 %.
    High,
    /// 20 % to 50 % inclusive.
    Medium,
    /// Below 20 %.
    Low,
}

impl BatteryBand {
    pub fn from_percent(battery_percent: f64) -> Self {
        if battery_percent > 50.0 {
            BatteryBand::High
        } else if battery_percent >= 20.0 {
            BatteryBand::Medium
        } else {
            BatteryBand::Low
        }
    }

    fn decide(self, priority: PriorityClass) -> TriageDecision {
        match (self, priority) {
            (BatteryBand::High, _) | (_, PriorityClass::High) => TriageDecision::Run,
            (BatteryBand::Medium, PriorityClass::Medium) => TriageDecision::Batch,
            (BatteryBand::Medium, PriorityClass::Low) => TriageDecision::Defer,
            (BatteryBand::Low, PriorityClass::Medium) => TriageDecision::Throttle,
            (BatteryBand::Low, PriorityClass::Low) => TriageDecision::Pause,
        }
    }
}

/// The rule that produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageReason {
    Charging,
    Battery(BatteryBand),
    Deadline,
}

/// Outcome of triaging one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triage {
    pub decision: TriageDecision,
    pub reason: TriageReason,
    /// Advisory vote, if an advisor answered.
    pub advisory: Option<bool>,
}

// ── Advisory collaborator ─────────────────────────────────────────────────────

/// Named, versioned advisory input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvisoryFeatures {
    pub schema_version: u32,
    pub battery: f64,
    pub cpu: f64,
    pub temperature: f64,
    /// Priority rank: 0 High, 1 Medium, 2 Low.
    pub priority: f64,
}

impl AdvisoryFeatures {
    pub fn new(snapshot: &SystemSnapshot, priority: PriorityClass) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            battery: snapshot.battery_percent,
            cpu: snapshot.cpu_percent,
            temperature: snapshot.temperature_celsius,
            priority: f64::from(priority.rank()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisoryError {
    #[error("advisory schema version {found} does not match supported version {expected}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("advisory score is not a finite number")]
    NonFiniteScore,

    #[error("advisor unavailable: {0}")]
    Unavailable(String),
}

/// External classifier giving a binary "favour running" signal.
pub trait Advisor: Send + Sync {
    fn favors_running(&self, features: &AdvisoryFeatures) -> Result<bool, AdvisoryError>;
}

/// Per-feature weights of a [`LinearAdvisor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdvisoryWeights {
    pub battery: f64,
    pub cpu: f64,
    pub temperature: f64,
    pub priority: f64,
}

/// `advisor:` section of a workload file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AdvisorConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub weights: AdvisoryWeights,
}

/// `bias + Σ weight × feature`; a positive score favours running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearAdvisor {
    bias: f64,
    weights: AdvisoryWeights,
}

impl LinearAdvisor {
    pub fn new(bias: f64, weights: AdvisoryWeights) -> Self {
        Self { bias, weights }
    }

    /// # Errors
    /// [`AdvisoryError::SchemaMismatch`] if the config was written for a
    /// different feature layout.
    pub fn from_config(config: &AdvisorConfig) -> Result<Self, AdvisoryError> {
        if config.schema_version != SCHEMA_VERSION {
            return Err(AdvisoryError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: config.schema_version,
            });
        }
        Ok(Self::new(config.bias, config.weights))
    }

    pub fn score(&self, f: &AdvisoryFeatures) -> f64 {
        let w = &self.weights;
        self.bias
            + w.battery * f.battery
            + w.cpu * f.cpu
            + w.temperature * f.temperature
            + w.priority * f.priority
    }
}

impl Advisor for LinearAdvisor {
    fn favors_running(&self, features: &AdvisoryFeatures) -> Result<bool, AdvisoryError> {
        if features.schema_version != SCHEMA_VERSION {
            return Err(AdvisoryError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: features.schema_version,
            });
        }
        let score = self.score(features);
        if !score.is_finite() {
            return Err(AdvisoryError::NonFiniteScore);
        }
        Ok(score > 0.0)
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Apply the triage rules.  Pure; `now` and `deadline` share a time base.
pub fn classify(
    priority: PriorityClass,
    snapshot: &SystemSnapshot,
    advisory: Option<bool>,
    deadline: Option<u64>,
    now: u64,
) -> Triage {
    // The advisory vote seeds the decision; the power rules always replace it.
    let (decision, reason) = if snapshot.is_charging {
        (TriageDecision::Run, TriageReason::Charging)
    } else {
        let band = BatteryBand::from_percent(snapshot.battery_percent);
        (band.decide(priority), TriageReason::Battery(band))
    };

    let urgent = deadline.is_some_and(|d| d < now.saturating_add(DEADLINE_WINDOW));
    if urgent {
        return Triage {
            decision: TriageDecision::Run,
            reason: TriageReason::Deadline,
            advisory,
        };
    }

    Triage {
        decision,
        reason,
        advisory,
    }
}

/// Triage `process`, consulting `advisor` when present.
///
/// Advisor failures degrade to threshold-only triage.
pub fn triage(
    process: &Process,
    snapshot: &SystemSnapshot,
    advisor: Option<&dyn Advisor>,
    now: u64,
) -> Triage {
    let advisory = advisor.and_then(|advisor| {
        let features = AdvisoryFeatures::new(snapshot, process.priority());
        match advisor.favors_running(&features) {
            Ok(vote) => Some(vote),
            Err(e) => {
                warn!(
                    process = process.id(),
                    error = %e,
                    "advisory classifier failed, using threshold rules only"
                );
                None
            }
        }
    });

    classify(
        process.priority(),
        snapshot,
        advisory,
        process.deadline(),
        now,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
