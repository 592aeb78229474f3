//! Per-run bookkeeping under `<workspace_root>/.stager/<run-id>/`.
//!
//! The state directory sits next to, not inside, the workspace run so the
//! flow never sees it and it never counts as a generated entry.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::diff::DiffRule;
use crate::core::run_id::validate_run_id;
use crate::core::snapshot::Snapshot;

pub const STATE_DIR_NAME: &str = ".stager";

/// Filesystem locations belonging to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub run_id: String,
    /// `<workspace_root>/<run-id>/`, the flow's working directory.
    pub workspace_dir: PathBuf,
    /// `<workspace_root>/.stager/<run-id>/`.
    pub state_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub meta_path: PathBuf,
    pub flow_log_path: PathBuf,
}

impl RunPaths {
    pub fn new(workspace_root: &Path, run_id: &str) -> Self {
        let state_dir = workspace_root.join(STATE_DIR_NAME).join(run_id);
        Self {
            run_id: run_id.to_string(),
            workspace_dir: workspace_root.join(run_id),
            manifest_path: state_dir.join("manifest.json"),
            meta_path: state_dir.join("meta.json"),
            flow_log_path: state_dir.join("flow.log"),
            state_dir,
        }
    }
}

/// Input snapshot recorded at prepare time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub run_id: String,
    pub input_dir: Option<String>,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStatus {
    Pending,
    Done,
    /// No output root configured, or the flow did not succeed.
    Skipped,
    Failed,
}

/// Flow execution record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowRecord {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
}

/// Run metadata, persisted to `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    pub run_id: String,
    pub input_dir: Option<String>,
    pub workspace: String,
    pub output: Option<String>,
    pub diff_rule: DiffRule,
    pub query: Option<String>,
    pub prepared_at: String,
    pub flow: Option<FlowRecord>,
    pub finalize: FinalizeStatus,
    /// Relative paths copied to the output run.
    pub generated: Vec<String>,
    /// Non-fatal errors encountered during the run.
    pub errors: Vec<String>,
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    debug!(path = %path.display(), entries = manifest.snapshot.len(), "writing manifest");
    write_json_atomic(path, manifest)
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    load_json(path, "manifest")
}

pub fn write_meta(path: &Path, meta: &RunMeta) -> Result<()> {
    debug!(path = %path.display(), run_id = %meta.run_id, finalize = ?meta.finalize, "writing meta");
    write_json_atomic(path, meta)
}

pub fn load_meta(path: &Path) -> Result<RunMeta> {
    load_json(path, "meta")
}

/// Read-modify-write `meta.json`.
pub fn update_meta(path: &Path, apply: impl FnOnce(&mut RunMeta)) -> Result<RunMeta> {
    let mut meta = load_meta(path)?;
    apply(&mut meta);
    write_meta(path, &meta)?;
    Ok(meta)
}

/// Run ids with a state directory under `workspace_root`, sorted (oldest first).
pub fn list_run_ids(workspace_root: &Path) -> Result<Vec<String>> {
    let state_root = workspace_root.join(STATE_DIR_NAME);
    if !state_root.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in
        fs::read_dir(&state_root).with_context(|| format!("read {}", state_root.display()))?
    {
        let entry = entry.context("read entry")?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if validate_run_id(&name).is_ok() {
            ids.push(name.into_owned());
        }
    }
    ids.sort();
    Ok(ids)
}

fn load_json<T: DeserializeOwned>(path: &Path, label: &str) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {label} {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {label} {}", path.display()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
