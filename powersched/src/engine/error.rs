/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the discipline engines.
//!
//! Bad *process* input is reported by
//! [`InvalidProcessSpec`](crate::process::InvalidProcessSpec) before a
//! process ever reaches an engine.  [`EngineError`] covers the remaining
//! caller mistakes: naming a discipline that does not exist, configuring an
//! unusable quantum, or handing one engine two processes with the same id.
//!
//! Broken internal invariants (a negative remaining time, a completed process
//! being charged) are programming errors and panic instead.

use thiserror::Error;

use crate::process::ProcessId;

/// Error returned when building a [`Discipline`](super::Discipline) or an
/// [`Engine`](super::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The discipline name is not recognised.
    #[error("unknown scheduling discipline: '{0}' (valid: fcfs, sjf, srtf, priority, round_robin)")]
    UnknownDiscipline(String),

    /// Round Robin needs at least one tick per quantum to make progress.
    #[error("round robin quantum must be at least 1 tick")]
    ZeroQuantum,

    /// Two processes handed to the same engine share an id.
    #[error("duplicate process id {0}: ids must be unique within a run")]
    DuplicateProcessId(ProcessId),
}
