//! `prepare` and `finalize`: staging a run's input into a workspace and
//! collecting what the flow generated.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::core::diff::{DiffRule, generated_entries};
use crate::core::run_id::{generate_run_id, validate_run_id};
use crate::core::snapshot::{EntryKind, Snapshot};
use crate::io::config::AppConfig;
use crate::io::state::{Manifest, RunPaths, load_manifest, write_manifest};
use crate::io::tree::{copy_entry, copy_snapshot, scan};

/// Directory roles for staging runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stager {
    input_dir: Option<PathBuf>,
    workspace_root: PathBuf,
    output_root: Option<PathBuf>,
    diff_rule: DiffRule,
}

/// A workspace run seeded from the input, plus the snapshot it was seeded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRun {
    pub paths: RunPaths,
    pub snapshot: Snapshot,
}

impl PreparedRun {
    pub fn run_id(&self) -> &str {
        &self.paths.run_id
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.paths.workspace_dir
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    /// `<output_root>/<run-id>/`, or `None` when no output root is configured.
    pub output_dir: Option<PathBuf>,
    /// Copied relative paths in sorted order.
    pub generated: Vec<String>,
    pub files: usize,
    pub dirs: usize,
}

impl FinalizeReport {
    pub fn skipped(&self) -> bool {
        self.output_dir.is_none()
    }
}

impl Stager {
    pub fn new(
        input_dir: Option<PathBuf>,
        workspace_root: PathBuf,
        output_root: Option<PathBuf>,
        diff_rule: DiffRule,
    ) -> Self {
        Self {
            input_dir,
            workspace_root,
            output_root,
            diff_rule,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.io.input_dir.clone(),
            cfg.io.workspace_root.clone(),
            cfg.io.output_dir.clone(),
            cfg.io.diff_rule,
        )
    }

    pub fn input_dir(&self) -> Option<&Path> {
        self.input_dir.as_deref()
    }

    pub fn diff_rule(&self) -> DiffRule {
        self.diff_rule
    }

    /// Create a new workspace run under a freshly generated run id.
    pub fn prepare(&self) -> Result<PreparedRun> {
        self.prepare_with_id(&generate_run_id())
    }

    /// Create `<workspace_root>/<run_id>/` and seed it with a full copy of the input.
    ///
    /// Refuses to reuse an existing workspace run.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub fn prepare_with_id(&self, run_id: &str) -> Result<PreparedRun> {
        validate_run_id(run_id)?;
        let paths = RunPaths::new(&self.workspace_root, run_id);

        fs::create_dir_all(&self.workspace_root).with_context(|| {
            format!("create workspace root {}", self.workspace_root.display())
        })?;
        if paths.workspace_dir.exists() {
            bail!(
                "workspace run {} already exists",
                paths.workspace_dir.display()
            );
        }
        fs::create_dir(&paths.workspace_dir).with_context(|| {
            format!("create workspace run {}", paths.workspace_dir.display())
        })?;

        let snapshot = match &self.input_dir {
            Some(input) => {
                let snapshot =
                    scan(input, true).with_context(|| format!("snapshot {}", input.display()))?;
                copy_snapshot(input, &paths.workspace_dir, &snapshot).with_context(|| {
                    format!(
                        "seed {} from {}",
                        paths.workspace_dir.display(),
                        input.display()
                    )
                })?;
                info!(
                    input = %input.display(),
                    files = snapshot.file_count(),
                    entries = snapshot.len(),
                    "input copied into workspace run"
                );
                snapshot
            }
            None => {
                debug!("no input_dir configured, workspace run starts empty");
                Snapshot::default()
            }
        };

        let manifest = Manifest {
            run_id: run_id.to_string(),
            input_dir: self.input_dir.as_ref().map(|p| p.display().to_string()),
            snapshot,
        };
        write_manifest(&paths.manifest_path, &manifest)?;

        info!(workspace = %paths.workspace_dir.display(), "workspace run prepared");
        Ok(PreparedRun {
            paths,
            snapshot: manifest.snapshot,
        })
    }

    /// Reload a run prepared earlier, possibly by another process.
    pub fn load_run(&self, run_id: &str) -> Result<PreparedRun> {
        validate_run_id(run_id)?;
        let paths = RunPaths::new(&self.workspace_root, run_id);
        if !paths.workspace_dir.is_dir() {
            bail!("workspace run {} not found", paths.workspace_dir.display());
        }
        let manifest = load_manifest(&paths.manifest_path)?;
        if manifest.run_id != run_id {
            bail!(
                "manifest {} belongs to run {}",
                paths.manifest_path.display(),
                manifest.run_id
            );
        }
        Ok(PreparedRun {
            paths,
            snapshot: manifest.snapshot,
        })
    }

    /// Copy every generated entry of the workspace run into `<output_root>/<run-id>/`.
    ///
    /// Generated means selected by the diff rule against the prepare-time
    /// snapshot. Without an output root this is a no-op.
    #[instrument(skip_all, fields(run_id = %run.run_id(), diff_rule = ?self.diff_rule))]
    pub fn finalize(&self, run: &PreparedRun) -> Result<FinalizeReport> {
        let workspace_dir = run.workspace_dir();
        if !workspace_dir.is_dir() {
            bail!("workspace run {} is missing", workspace_dir.display());
        }
        let Some(output_root) = &self.output_root else {
            info!("no output_dir configured, skipping output copy");
            return Ok(FinalizeReport {
                output_dir: None,
                generated: Vec::new(),
                files: 0,
                dirs: 0,
            });
        };

        let output_dir = output_root.join(run.run_id());
        if output_dir == workspace_dir {
            bail!(
                "output run {} is the workspace run itself",
                output_dir.display()
            );
        }
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("create output run {}", output_dir.display()))?;

        let current = scan(workspace_dir, self.diff_rule.needs_hashes())
            .with_context(|| format!("scan {}", workspace_dir.display()))?;
        let selected = generated_entries(&run.snapshot, &current, self.diff_rule);

        let mut report = FinalizeReport {
            output_dir: Some(output_dir.clone()),
            generated: Vec::with_capacity(selected.len()),
            files: 0,
            dirs: 0,
        };
        for (rel, entry) in selected {
            copy_entry(workspace_dir, &output_dir, rel, entry)?;
            match entry.kind {
                EntryKind::File => {
                    report.files += 1;
                    info!(path = rel, "copied generated file");
                }
                EntryKind::Dir => report.dirs += 1,
            }
            report.generated.push(rel.to_string());
        }

        if report.generated.is_empty() {
            info!("no new files were generated during the run");
        } else {
            info!(
                files = report.files,
                dirs = report.dirs,
                output = %output_dir.display(),
                "generated entries copied"
            );
        }
        Ok(report)
    }
}
