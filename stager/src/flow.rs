//! External flow invocation.
//!
//! The flow is an opaque command run with the workspace run as its working
//! directory. Its contract with the stager is the working directory, a few
//! `STAGER_*` environment variables, and its exit status.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{info, instrument, warn};

use crate::io::config::FlowConfig;
use crate::io::process::run_logged;

pub const ENV_RUN_ID: &str = "STAGER_RUN_ID";
pub const ENV_WORKSPACE: &str = "STAGER_WORKSPACE";
pub const ENV_QUERY: &str = "STAGER_QUERY";
pub const ENV_MAX_STEPS: &str = "STAGER_MAX_STEPS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub run_id: String,
    /// Workspace run directory; becomes the flow's cwd.
    pub workdir: PathBuf,
    pub query: Option<String>,
    pub max_steps: u32,
    /// Combined stdout/stderr destination.
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl FlowOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

pub trait FlowRunner {
    /// Run the flow to completion. `Err` means it could not be run at all.
    fn run(&self, request: &FlowRequest) -> Result<FlowOutcome>;
}

/// Runs the configured `[flow] command`.
#[derive(Debug, Clone)]
pub struct CommandFlowRunner {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandFlowRunner {
    pub fn from_config(cfg: &FlowConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            env: cfg.env.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn build_command(&self, request: &FlowRequest) -> Result<Command> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("flow.command must be a non-empty array");
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.env(ENV_RUN_ID, &request.run_id)
            .env(ENV_WORKSPACE, &request.workdir)
            .env(ENV_MAX_STEPS, request.max_steps.to_string());
        match &request.query {
            Some(query) => cmd.env(ENV_QUERY, query),
            None => cmd.env_remove(ENV_QUERY),
        };
        Ok(cmd)
    }
}

impl FlowRunner for CommandFlowRunner {
    #[instrument(skip_all, fields(run_id = %request.run_id, program = ?self.command.first()))]
    fn run(&self, request: &FlowRequest) -> Result<FlowOutcome> {
        let cmd = self.build_command(request)?;
        info!(workdir = %request.workdir.display(), "processing request");
        let started = Instant::now();
        let output = run_logged(cmd, self.timeout, self.output_limit_bytes, &request.log_path)?;
        let duration = started.elapsed();

        let outcome = FlowOutcome {
            exit_code: output.status.code(),
            timed_out: output.timed_out,
            duration,
        };
        if outcome.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "flow timed out");
        } else if !outcome.succeeded() {
            warn!(
                exit_code = ?outcome.exit_code,
                stderr = output.stderr_tail().as_deref().unwrap_or(""),
                "flow failed"
            );
        } else {
            info!(duration_secs = duration.as_secs_f64(), "flow finished");
        }
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn runner(script: &str, timeout_secs: u64) -> CommandFlowRunner {
        let mut env = BTreeMap::new();
        env.insert("FLOW_GREETING".to_string(), "hej".to_string());
        CommandFlowRunner::from_config(&FlowConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs,
            output_limit_bytes: 4096,
            env,
        })
    }

    fn request(root: &std::path::Path, query: Option<&str>) -> FlowRequest {
        let workdir = root.join("ws");
        fs::create_dir_all(&workdir).expect("workdir");
        FlowRequest {
            run_id: "run-1".to_string(),
            workdir,
            query: query.map(str::to_string),
            max_steps: 7,
            log_path: root.join("state/flow.log"),
        }
    }

    #[test]
    fn runs_in_workdir_with_stager_env() {
        let temp = tempdir().expect("tempdir");
        let request = request(temp.path(), Some("analyse"));
        let script = "printf '%s|%s|%s|%s' \"$STAGER_RUN_ID\" \"$STAGER_QUERY\" \"$STAGER_MAX_STEPS\" \"$FLOW_GREETING\" > env.txt; pwd";
        let outcome = runner(script, 10).run(&request).expect("run");

        assert!(outcome.succeeded());
        let env = fs::read_to_string(request.workdir.join("env.txt")).expect("env.txt");
        assert_eq!(env, "run-1|analyse|7|hej");
        assert!(request.log_path.exists());
    }

    #[test]
    fn non_zero_exit_is_not_success() {
        let temp = tempdir().expect("tempdir");
        let outcome = runner("exit 4", 10)
            .run(&request(temp.path(), None))
            .expect("run");
        assert_eq!(outcome.exit_code, Some(4));
        assert!(!outcome.succeeded());
    }

    #[test]
    fn times_out() {
        let temp = tempdir().expect("tempdir");
        let outcome = runner("exec sleep 5", 1)
            .run(&request(temp.path(), None))
            .expect("run");
        assert!(outcome.timed_out);
        assert!(!outcome.succeeded());
    }
}
