//! CLI command implementations.

use std::fs;
use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::core::run_id::validate_run_id;
use crate::exit_codes;
use crate::flow::FlowRunner;
use crate::io::config::AppConfig;
use crate::io::prompt::{Query, resolve_query};
use crate::io::state::{FinalizeStatus, RunPaths, list_run_ids, load_meta, update_meta};
use crate::run::{RunOptions, run_pipeline};
use crate::stager::Stager;

/// Full pipeline. Returns the process exit code.
pub fn run_command<R: BufRead, W: Write>(
    cfg: &AppConfig,
    flow: &dyn FlowRunner,
    cli_query: Option<String>,
    stdin: &mut R,
    prompt_out: &mut W,
) -> Result<i32> {
    let query = resolve_query(cli_query, &cfg.runflow, stdin, prompt_out)?;
    if query == Query::Empty {
        warn!("empty prompt provided");
        println!("run: skipped (empty prompt)");
        return Ok(exit_codes::OK);
    }
    debug!(max_steps = cfg.runflow.max_steps, "max steps configured");

    let stager = Stager::from_config(cfg);
    let options = RunOptions {
        query: query.as_deref().map(str::to_string),
        max_steps: cfg.runflow.max_steps,
    };
    let report = run_pipeline(&stager, flow, &options)?;
    println!(
        "run: run_id={} status={} workspace={} output={} generated={}",
        report.run_id,
        report.status.as_str(),
        report.workspace_dir.display(),
        report
            .output_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        report.generated
    );
    if report.finalize == FinalizeStatus::Failed {
        return Ok(exit_codes::INVALID);
    }
    Ok(report.status.exit_code())
}

/// Prepare a workspace run without running the flow.
pub fn prepare_command(cfg: &AppConfig) -> Result<()> {
    let run = Stager::from_config(cfg).prepare()?;
    println!(
        "prepare: run_id={} workspace={} entries={}",
        run.run_id(),
        run.workspace_dir().display(),
        run.snapshot.len()
    );
    Ok(())
}

/// Finalize a previously prepared run by id.
pub fn finalize_command(cfg: &AppConfig, run_id: &str) -> Result<()> {
    let stager = Stager::from_config(cfg);
    let run = stager.load_run(run_id).context("load run")?;
    let report = stager.finalize(&run)?;

    if run.paths.meta_path.exists() {
        let status = if report.skipped() {
            FinalizeStatus::Skipped
        } else {
            FinalizeStatus::Done
        };
        update_meta(&run.paths.meta_path, |meta| {
            meta.finalize = status;
            meta.output = report.output_dir.as_ref().map(|p| p.display().to_string());
            meta.generated = report.generated.clone();
        })?;
    }

    match &report.output_dir {
        Some(output_dir) => {
            for rel in &report.generated {
                println!("finalize: copied {rel}");
            }
            println!(
                "finalize: run_id={} output={} files={} dirs={}",
                run_id,
                output_dir.display(),
                report.files,
                report.dirs
            );
        }
        None => println!("finalize: run_id={run_id} skipped (no output_dir configured)"),
    }
    Ok(())
}

/// List runs under the workspace root.
pub fn list_command(cfg: &AppConfig) -> Result<()> {
    let root = &cfg.io.workspace_root;
    for run_id in list_run_ids(root)? {
        let paths = RunPaths::new(root, &run_id);
        match load_meta(&paths.meta_path) {
            Ok(meta) => {
                let exit_code = meta
                    .flow
                    .as_ref()
                    .and_then(|flow| flow.exit_code)
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let timed_out = meta.flow.as_ref().is_some_and(|flow| flow.timed_out);
                println!(
                    "{} exit_code={} timed_out={} finalize={} generated={}",
                    run_id,
                    exit_code,
                    timed_out,
                    finalize_label(meta.finalize),
                    meta.generated.len()
                );
            }
            Err(_) => println!("{run_id} prepared"),
        }
    }
    Ok(())
}

/// Remove a workspace run and its state directory. The output run is kept.
pub fn clean_command(cfg: &AppConfig, run_id: &str) -> Result<()> {
    validate_run_id(run_id)?;
    let paths = RunPaths::new(&cfg.io.workspace_root, run_id);
    if !paths.workspace_dir.exists() && !paths.state_dir.exists() {
        bail!("run {run_id} not found under {}", cfg.io.workspace_root.display());
    }
    for dir in [&paths.workspace_dir, &paths.state_dir] {
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
        }
    }
    println!(
        "clean: run_id={} workspace={} state={}",
        run_id,
        paths.workspace_dir.display(),
        paths.state_dir.display()
    );
    Ok(())
}

fn finalize_label(status: FinalizeStatus) -> &'static str {
    match status {
        FinalizeStatus::Pending => "pending",
        FinalizeStatus::Done => "done",
        FinalizeStatus::Skipped => "skipped",
        FinalizeStatus::Failed => "failed",
    }
}
