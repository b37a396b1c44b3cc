//! Workload configuration loading and management.
//!
//! A workload file describes the tasks of one decision cycle and, optionally,
//! a fixed telemetry snapshot and a linear advisory model.
//!
//! The expected YAML structure is:
//! ```yaml
//! snapshot:
//!   battery_percent: 42
//!   is_charging: false
//!   cpu_percent: 35
//!   temperature_celsius: 48
//! advisor:
//!   schema_version: 1
//!   bias: -0.5
//!   weights: { battery: 0.02, cpu: -0.01, temperature: -0.005, priority: -0.3 }
//! tasks:
//!   render:
//!     id: 1
//!     priority: High
//!     burst_time: 5
//!     arrival_time: 0
//!     io_ticks: [2]
//!     energy: 12.0
//!     deadline: 1700000000
//! ```
//!
//! Only `tasks.<name>.id` and `tasks.<name>.burst_time` are required.  Range
//! checks on the timing fields are left to [`Process::new`](crate::process::Process::new)
//! so a single bad task is rejected at planning time without failing the load.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::policy::triage::{AdvisorConfig, LinearAdvisor};
use crate::process::{PriorityClass, ProcessId, ProcessSpec};
use crate::telemetry::SystemSnapshot;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
struct WorkloadFile {
    #[serde(default)]
    snapshot: Option<SystemSnapshot>,
    #[serde(default)]
    advisor: Option<AdvisorConfig>,
    #[serde(default)]
    tasks: HashMap<String, TaskEntry>,
}

/// Per-task fields as they appear in the YAML file.
#[derive(Debug, Deserialize)]
struct TaskEntry {
    id: ProcessId,
    /// `High`, `Medium` or `Low`; anything else reads as `Medium`.
    #[serde(default)]
    priority: Option<String>,
    burst_time: i64,
    #[serde(default)]
    arrival_time: i64,
    #[serde(default)]
    io_ticks: Vec<i64>,
    #[serde(default)]
    energy: f64,
    /// Epoch seconds.
    #[serde(default)]
    deadline: Option<u64>,
}

// ── WorkloadConfigManager ─────────────────────────────────────────────────────

/// Loads and holds one workload file.
#[derive(Debug, Default)]
pub struct WorkloadConfigManager {
    /// Task name → spec.
    tasks: HashMap<String, ProcessSpec>,
    snapshot: Option<SystemSnapshot>,
    advisor: Option<LinearAdvisor>,
    loaded: bool,
}

impl WorkloadConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces everything previously loaded.
    ///
    /// An advisor section written for a different feature schema is dropped
    /// with a warning; triage then runs on threshold rules alone.
    ///
    /// # Errors
    /// The file cannot be read, the YAML is structurally invalid, or two
    /// tasks share an id.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "loading workload configuration");

        self.tasks.clear();
        self.snapshot = None;
        self.advisor = None;
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open workload file: {}", path.display()))?;

        let file: WorkloadFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let mut ids = BTreeSet::new();
        let mut tasks = HashMap::with_capacity(file.tasks.len());
        for (name, entry) in file.tasks {
            if !ids.insert(entry.id) {
                bail!(
                    "Duplicate task id {} (task '{}') in {}",
                    entry.id,
                    name,
                    path.display()
                );
            }

            let spec = ProcessSpec {
                id: entry.id,
                name: name.clone(),
                priority: entry
                    .priority
                    .as_deref()
                    .map(PriorityClass::from_label)
                    .unwrap_or_default(),
                burst_time: entry.burst_time,
                arrival_time: entry.arrival_time,
                io_ticks: entry.io_ticks,
                energy: entry.energy,
                deadline: entry.deadline,
            };

            debug!(
                task = %spec.name,
                id = spec.id,
                priority = %spec.priority,
                burst_time = spec.burst_time,
                arrival_time = spec.arrival_time,
                io_ticks = ?spec.io_ticks,
                "task loaded"
            );
            tasks.insert(name, spec);
        }

        if tasks.is_empty() {
            warn!("No tasks found in workload file, the cycle will be idle");
        }

        let advisor = match file.advisor.as_ref().map(LinearAdvisor::from_config) {
            Some(Ok(advisor)) => Some(advisor),
            Some(Err(e)) => {
                warn!(error = %e, "ignoring advisor section");
                None
            }
            None => None,
        };

        self.tasks = tasks;
        self.snapshot = file.snapshot.map(SystemSnapshot::clamped);
        self.advisor = advisor;
        self.loaded = true;

        info!(
            tasks = self.tasks.len(),
            snapshot = self.snapshot.is_some(),
            advisor = self.advisor.is_some(),
            "workload configuration loaded"
        );
        Ok(())
    }

    /// The spec named `name`, if loaded.
    pub fn get_task(&self, name: &str) -> Option<&ProcessSpec> {
        self.tasks.get(name)
    }

    /// Every loaded spec, sorted by id for deterministic iteration.
    pub fn get_all_tasks(&self) -> Vec<&ProcessSpec> {
        let mut all: Vec<_> = self.tasks.values().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Owned copies of [`get_all_tasks`](Self::get_all_tasks).
    pub fn specs(&self) -> Vec<ProcessSpec> {
        self.get_all_tasks().into_iter().cloned().collect()
    }

    /// Snapshot from the `snapshot:` section, if present.
    pub fn snapshot(&self) -> Option<SystemSnapshot> {
        self.snapshot
    }

    /// Advisor from the `advisor:` section, if present and usable.
    pub fn advisor(&self) -> Option<LinearAdvisor> {
        self.advisor
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::triage::{Advisor, AdvisoryFeatures};
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn load(yaml: &str) -> WorkloadConfigManager {
        let f = yaml_tempfile(yaml);
        let mut mgr = WorkloadConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();
        mgr
    }

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_full_workload() {
        let mgr = load(
            r#"
snapshot:
  battery_percent: 42
  is_charging: false
  cpu_percent: 35
  temperature_celsius: 48
advisor:
  schema_version: 1
  bias: -0.5
  weights: { battery: 0.02, cpu: -0.01, temperature: -0.005, priority: -0.3 }
tasks:
  render:
    id: 1
    priority: High
    burst_time: 5
    io_ticks: [2]
    energy: 12.0
    deadline: 1700000000
  backup:
    id: 2
    priority: Low
    burst_time: 8
    arrival_time: 3
"#,
        );

        assert!(mgr.is_loaded());
        assert_eq!(mgr.get_all_tasks().len(), 2);

        let render = mgr.get_task("render").unwrap();
        assert_eq!(render.id, 1);
        assert_eq!(render.priority, PriorityClass::High);
        assert_eq!(render.io_ticks, vec![2]);
        assert_eq!(render.energy, 12.0);
        assert_eq!(render.deadline, Some(1_700_000_000));

        let backup = mgr.get_task("backup").unwrap();
        assert_eq!(backup.arrival_time, 3);
        assert!(backup.io_ticks.is_empty());
        assert_eq!(backup.deadline, None);

        let snapshot = mgr.snapshot().unwrap();
        assert_eq!(snapshot.battery_percent, 42.0);
        assert_eq!(snapshot.cpu_percent, 35.0);

        let advisor = mgr.advisor().unwrap();
        let features = AdvisoryFeatures::new(&snapshot, PriorityClass::High);
        assert!(advisor.favors_running(&features).is_ok());
    }

    #[test]
    fn tasks_iterate_in_id_order() {
        let mgr = load(
            "tasks:\n  c: { id: 3, burst_time: 1 }\n  a: { id: 1, burst_time: 1 }\n  b: { id: 2, burst_time: 1 }\n",
        );
        let names: Vec<_> = mgr.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_priority_reads_as_medium() {
        let mgr = load("tasks:\n  t: { id: 1, priority: urgent, burst_time: 2 }\n");
        assert_eq!(mgr.get_task("t").unwrap().priority, PriorityClass::Medium);
    }

    #[test]
    fn invalid_timing_is_left_for_process_validation() {
        let mgr = load("tasks:\n  t: { id: 1, burst_time: 0 }\n");
        assert_eq!(mgr.get_task("t").unwrap().burst_time, 0);
    }

    #[test]
    fn empty_tasks_section_is_accepted() {
        let mgr = load("tasks: {}\n");
        assert!(mgr.is_loaded());
        assert!(mgr.get_all_tasks().is_empty());
        assert!(mgr.snapshot().is_none());
        assert!(mgr.advisor().is_none());
    }

    #[test]
    fn snapshot_values_are_clamped() {
        let mgr = load("snapshot:\n  battery_percent: 180\n  cpu_percent: -3\n");
        let s = mgr.snapshot().unwrap();
        assert_eq!(s.battery_percent, 100.0);
        assert_eq!(s.cpu_percent, 0.0);
        assert!(!s.is_charging);
    }

    #[test]
    fn advisor_with_other_schema_is_dropped() {
        let mgr = load("advisor:\n  schema_version: 7\n  bias: 1.0\ntasks: {}\n");
        assert!(mgr.is_loaded());
        assert!(mgr.advisor().is_none());
    }

    #[test]
    fn duplicate_ids_fail_the_load() {
        let f = yaml_tempfile("tasks:\n  a: { id: 1, burst_time: 1 }\n  b: { id: 1, burst_time: 2 }\n");
        let mut mgr = WorkloadConfigManager::new();
        let err = mgr.load_from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate task id 1"));
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn missing_file_returns_error() {
        let mut mgr = WorkloadConfigManager::new();
        let result = mgr.load_from_file(Path::new("/nonexistent/path/workload.yaml"));
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        let mut mgr = WorkloadConfigManager::new();
        assert!(mgr.load_from_file(f.path()).is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn reload_replaces_previous_tasks() {
        let f1 = yaml_tempfile("tasks:\n  t1: { id: 1, burst_time: 1 }\n");
        let f2 = yaml_tempfile("tasks:\n  t2: { id: 2, burst_time: 1 }\n");

        let mut mgr = WorkloadConfigManager::new();
        mgr.load_from_file(f1.path()).unwrap();
        assert!(mgr.get_task("t1").is_some());

        mgr.load_from_file(f2.path()).unwrap();
        assert!(mgr.get_task("t1").is_none(), "old task must be gone");
        assert!(mgr.get_task("t2").is_some());
    }
}
