/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! powersched – battery-aware process scheduling simulator
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── process/        – process specs, validation, run state
//! ├── engine/         – FCFS / SJF / SRTF / Priority / Round Robin step engines
//! │   ├── error       – engine construction errors
//! │   └── metrics     – post-run metrics
//! ├── telemetry/      – system snapshots (static, sysfs) with defaults
//! │   └── history     – battery ring buffer and discharge forecast
//! ├── policy/         – adaptive discipline selection and run orchestration
//! │   └── triage      – Run / Pause / Batch / Defer / Throttle classifier
//! ├── energy          – battery-impact estimates
//! ├── runner          – concurrent comparison and step streaming (tokio)
//! └── config/         – YAML workload loading
//! ```

pub mod config;
pub mod energy;
pub mod engine;
pub mod policy;
pub mod process;
pub mod runner;
pub mod telemetry;
