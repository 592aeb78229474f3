//! Application configuration loaded from a single TOML file.
//!
//! The file is read once at process start. Tables other than `[io]`,
//! `[runflow]`, and `[flow]` are ignored so a larger application's config
//! file can be shared.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::diff::DiffRule;

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV: &str = "STAGER_CONFIG";

const DEFAULT_CONFIG: &str = "config/config.toml";
const EXAMPLE_CONFIG: &str = "config/config.example.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub runflow: RunflowConfig,
    #[serde(default)]
    pub flow: FlowConfig,
}

/// Directory roles for a run.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IoConfig {
    /// Root under which each run gets `<run-id>/`. Required.
    pub workspace_root: PathBuf,
    /// Directory copied into every new workspace run.
    pub input_dir: Option<PathBuf>,
    /// Root under which generated entries land as `<run-id>/`.
    pub output_dir: Option<PathBuf>,
    pub diff_rule: DiffRule,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunflowConfig {
    /// Predefined query; when unset the user is prompted (if interactive).
    pub query: Option<String>,
    /// Step budget handed to the flow as `STAGER_MAX_STEPS`.
    pub max_steps: u32,
    /// Prompt on stdin when no query is configured.
    pub interactive: bool,
}

impl Default for RunflowConfig {
    fn default() -> Self {
        Self {
            query: None,
            max_steps: 5,
            interactive: true,
        }
    }
}

/// External flow command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlowConfig {
    /// Program and arguments, e.g. `["python", "run_flow.py"]`.
    pub command: Vec<String>,
    /// Wall-clock budget for the whole flow.
    pub timeout_secs: u64,
    /// Bytes of stdout/stderr kept in memory; `flow.log` always gets everything.
    pub output_limit_bytes: usize,
    pub env: BTreeMap<String, String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            env: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load, resolve, and validate a config file, creating configured
    /// directories that do not exist yet.
    pub fn load(path: &Path, cwd: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::parse_str(&contents, cwd)
            .with_context(|| format!("load config {}", path.display()))?;
        cfg.ensure_directories()?;
        debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    /// Parse and validate without touching the filesystem.
    pub fn parse_str(contents: &str, cwd: &Path) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(contents).context("parse config toml")?;
        cfg.resolve_paths(cwd);
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_paths(&mut self, cwd: &Path) {
        if !self.io.workspace_root.as_os_str().is_empty() {
            self.io.workspace_root = resolve_path(&self.io.workspace_root, cwd);
        }
        self.io.input_dir = self.io.input_dir.as_deref().map(|p| resolve_path(p, cwd));
        self.io.output_dir = self.io.output_dir.as_deref().map(|p| resolve_path(p, cwd));
    }

    pub fn validate(&self) -> Result<()> {
        if self.io.workspace_root.as_os_str().is_empty() {
            bail!(
                "io.workspace_root must be set, e.g.\n[io]\nworkspace_root = \"path/to/workspace\""
            );
        }
        if let Some(input) = &self.io.input_dir
            && self.io.workspace_root.starts_with(input)
        {
            bail!("io.workspace_root must not be inside io.input_dir");
        }
        if let Some(output) = &self.io.output_dir {
            if output.starts_with(&self.io.workspace_root) {
                bail!("io.output_dir must not be io.workspace_root or inside it");
            }
            if let Some(input) = &self.io.input_dir
                && output.starts_with(input)
            {
                bail!("io.output_dir must not be inside io.input_dir");
            }
        }
        if self.runflow.max_steps == 0 {
            bail!("runflow.max_steps must be > 0");
        }
        if self.flow.command.is_empty() || self.flow.command[0].trim().is_empty() {
            bail!("flow.command must be a non-empty array");
        }
        if self.flow.timeout_secs == 0 {
            bail!("flow.timeout_secs must be > 0");
        }
        if self.flow.output_limit_bytes == 0 {
            bail!("flow.output_limit_bytes must be > 0");
        }
        for key in self.flow.env.keys() {
            if key.trim().is_empty() {
                bail!("flow.env key must be non-empty");
            }
        }
        Ok(())
    }

    fn ensure_directories(&self) -> Result<()> {
        let root = &self.io.workspace_root;
        fs::create_dir_all(root)
            .with_context(|| format!("create workspace root {}", root.display()))?;

        if let Some(input) = &self.io.input_dir {
            if !input.exists() {
                warn!(input_dir = %input.display(), "input_dir did not exist, creating it empty");
                fs::create_dir_all(input)
                    .with_context(|| format!("create input dir {}", input.display()))?;
            } else if !input.is_dir() {
                bail!("io.input_dir {} is not a directory", input.display());
            }
        }

        if let Some(output) = &self.io.output_dir {
            fs::create_dir_all(output)
                .with_context(|| format!("create output dir {}", output.display()))?;
        }
        Ok(())
    }
}

/// Pick the config file: explicit path, then `$STAGER_CONFIG`, then
/// `config/config.toml`, then `config/config.example.toml`.
pub fn locate_config(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    cwd: &Path,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(resolve_path(path, cwd));
    }
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return Ok(resolve_path(Path::new(&value), cwd));
    }
    for candidate in [DEFAULT_CONFIG, EXAMPLE_CONFIG] {
        let path = cwd.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    bail!(
        "no configuration file found (tried {} and {} under {})",
        DEFAULT_CONFIG,
        EXAMPLE_CONFIG,
        cwd.display()
    )
}

/// Expand a leading `~` and make the path absolute against `cwd`.
fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    normalize(&absolute)
}

/// Drop `.` and fold `..` lexically so prefix checks between roots hold.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
