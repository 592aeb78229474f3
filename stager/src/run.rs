//! Run orchestration: prepare, flow, finalize, with `meta.json` bookkeeping.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::exit_codes;
use crate::flow::{FlowOutcome, FlowRequest, FlowRunner};
use crate::io::state::{FinalizeStatus, FlowRecord, RunMeta, update_meta, write_meta};
use crate::stager::Stager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    FlowFailed,
    TimedOut,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Completed => exit_codes::OK,
            RunStatus::FlowFailed => exit_codes::FLOW_FAILED,
            RunStatus::TimedOut => exit_codes::TIMED_OUT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::FlowFailed => "flow_failed",
            RunStatus::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub workspace_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub finalize: FinalizeStatus,
    pub generated: usize,
}

/// Inputs for one pipeline run besides the stager itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub query: Option<String>,
    pub max_steps: u32,
}

/// Prepare a workspace run, run the flow in it, and finalize if the flow succeeded.
///
/// A flow that fails or times out leaves the workspace run in place without
/// finalizing so it can be inspected (or finalized later by id). Finalize
/// failures are recorded in `meta.json` and do not mask the flow result.
#[instrument(skip_all)]
pub fn run_pipeline(
    stager: &Stager,
    flow: &dyn FlowRunner,
    options: &RunOptions,
) -> Result<RunReport> {
    let run = stager.prepare().context("prepare workspace run")?;
    let paths = run.paths.clone();
    info!(run_id = %paths.run_id, workspace = %paths.workspace_dir.display(), "run started");

    let meta = RunMeta {
        run_id: paths.run_id.clone(),
        input_dir: stager.input_dir().map(|p| p.display().to_string()),
        workspace: paths.workspace_dir.display().to_string(),
        output: None,
        diff_rule: stager.diff_rule(),
        query: options.query.clone(),
        prepared_at: Utc::now().to_rfc3339(),
        flow: None,
        finalize: FinalizeStatus::Pending,
        generated: Vec::new(),
        errors: Vec::new(),
    };
    write_meta(&paths.meta_path, &meta)?;

    let request = FlowRequest {
        run_id: paths.run_id.clone(),
        workdir: paths.workspace_dir.clone(),
        query: options.query.clone(),
        max_steps: options.max_steps,
        log_path: paths.flow_log_path.clone(),
    };
    let started_at = Utc::now();
    let flow_result = flow.run(&request);
    let finished_at = Utc::now();

    let (status, flow_record, flow_error) = match flow_result {
        Ok(outcome) => {
            let status = classify(&outcome);
            info!(
                duration_secs = outcome.duration.as_secs_f64(),
                exit_code = ?outcome.exit_code,
                "request processed"
            );
            let record = FlowRecord {
                exit_code: outcome.exit_code,
                timed_out: outcome.timed_out,
                start_time: started_at.to_rfc3339(),
                end_time: finished_at.to_rfc3339(),
                duration_secs: outcome.duration.as_secs_f64(),
            };
            (status, Some(record), None)
        }
        Err(err) => {
            error!(err = %format!("{err:#}"), "flow could not be run");
            (RunStatus::FlowFailed, None, Some(format!("flow: {err:#}")))
        }
    };
    update_meta(&paths.meta_path, |meta| {
        meta.flow = flow_record;
        meta.errors.extend(flow_error);
    })?;

    let mut output_dir = None;
    let mut generated = 0;
    let finalize = if status == RunStatus::Completed {
        match stager.finalize(&run) {
            Ok(report) => {
                let finalize = if report.skipped() {
                    FinalizeStatus::Skipped
                } else {
                    FinalizeStatus::Done
                };
                generated = report.generated.len();
                output_dir = report.output_dir.clone();
                update_meta(&paths.meta_path, |meta| {
                    meta.finalize = finalize;
                    meta.output = report.output_dir.as_ref().map(|p| p.display().to_string());
                    meta.generated = report.generated;
                })?;
                finalize
            }
            Err(err) => {
                error!(err = %format!("{err:#}"), "failed to copy outputs");
                update_meta(&paths.meta_path, |meta| {
                    meta.finalize = FinalizeStatus::Failed;
                    meta.errors.push(format!("finalize: {err:#}"));
                })?;
                FinalizeStatus::Failed
            }
        }
    } else {
        warn!(status = status.as_str(), "flow did not succeed, keeping workspace run without output copy");
        update_meta(&paths.meta_path, |meta| meta.finalize = FinalizeStatus::Skipped)?;
        FinalizeStatus::Skipped
    };

    info!(run_id = %paths.run_id, status = status.as_str(), ?finalize, generated, "run complete");
    Ok(RunReport {
        run_id: paths.run_id,
        status,
        workspace_dir: paths.workspace_dir,
        output_dir,
        finalize,
        generated,
    })
}

fn classify(outcome: &FlowOutcome) -> RunStatus {
    if outcome.timed_out {
        RunStatus::TimedOut
    } else if outcome.succeeded() {
        RunStatus::Completed
    } else {
        RunStatus::FlowFailed
    }
}
