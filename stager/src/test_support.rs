//! Test-only fixtures: temp directory layouts and a scripted flow.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::core::diff::DiffRule;
use crate::flow::{FlowOutcome, FlowRequest, FlowRunner};
use crate::io::config::{AppConfig, FlowConfig, IoConfig, RunflowConfig};
use crate::stager::Stager;

/// Input, workspace, and output roots inside one temp dir.
pub struct TestLayout {
    _temp: TempDir,
    pub root: PathBuf,
    pub input: PathBuf,
    pub workspace_root: PathBuf,
    pub output_root: PathBuf,
}

impl TestLayout {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path().to_path_buf();
        let input = root.join("input");
        fs::create_dir_all(&input).context("create input")?;
        Ok(Self {
            _temp: temp,
            workspace_root: root.join("workspace"),
            output_root: root.join("output"),
            input,
            root,
        })
    }

    pub fn write_input(&self, rel: &str, contents: &str) -> Result<()> {
        write_file(&self.input, rel, contents)
    }

    pub fn stager(&self, rule: DiffRule) -> Stager {
        Stager::new(
            Some(self.input.clone()),
            self.workspace_root.clone(),
            Some(self.output_root.clone()),
            rule,
        )
    }

    /// Config for this layout with a placeholder flow command.
    pub fn config(&self, rule: DiffRule) -> AppConfig {
        AppConfig {
            io: IoConfig {
                workspace_root: self.workspace_root.clone(),
                input_dir: Some(self.input.clone()),
                output_dir: Some(self.output_root.clone()),
                diff_rule: rule,
            },
            runflow: RunflowConfig::default(),
            flow: FlowConfig {
                command: vec!["true".to_string()],
                ..FlowConfig::default()
            },
        }
    }
}

pub fn write_file(root: &Path, rel: &str, contents: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

/// Every entry below `root`: files map to their bytes, directories to empty
/// contents under a key ending in `/`.
pub fn read_tree(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut tree = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .context("strip prefix")?
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type().is_dir() {
            tree.insert(format!("{rel}/"), Vec::new());
        } else {
            let bytes = fs::read(entry.path())
                .with_context(|| format!("read {}", entry.path().display()))?;
            tree.insert(rel, bytes);
        }
    }
    Ok(tree)
}

type Script = Box<dyn Fn(&Path) -> Result<()>>;

/// Flow stand-in that mutates the workspace run through a closure and
/// reports a fixed outcome.
pub struct ScriptedFlow {
    script: Script,
    exit_code: Option<i32>,
    timed_out: bool,
    requests: RefCell<Vec<FlowRequest>>,
}

impl ScriptedFlow {
    pub fn succeeding(script: impl Fn(&Path) -> Result<()> + 'static) -> Self {
        Self::exiting(Some(0), script)
    }

    pub fn exiting(exit_code: Option<i32>, script: impl Fn(&Path) -> Result<()> + 'static) -> Self {
        Self {
            script: Box::new(script),
            exit_code,
            timed_out: false,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn timing_out(script: impl Fn(&Path) -> Result<()> + 'static) -> Self {
        Self {
            timed_out: true,
            ..Self::exiting(None, script)
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<FlowRequest> {
        self.requests.borrow().clone()
    }
}

impl FlowRunner for ScriptedFlow {
    fn run(&self, request: &FlowRequest) -> Result<FlowOutcome> {
        self.requests.borrow_mut().push(request.clone());
        (self.script)(&request.workdir)?;
        Ok(FlowOutcome {
            exit_code: self.exit_code,
            timed_out: self.timed_out,
            duration: Duration::from_millis(1),
        })
    }
}
