//! End-to-end pipeline tests: prepare, a scripted flow mutating the
//! workspace run, and finalize, checked against the files left on disk.

use std::fs;

use stager::core::diff::DiffRule;
use stager::io::state::{FinalizeStatus, load_manifest, load_meta};
use stager::run::{RunOptions, RunStatus, run_pipeline};
use stager::test_support::{ScriptedFlow, TestLayout, read_tree, write_file};

fn options() -> RunOptions {
    RunOptions {
        query: Some("Analyse the data room".to_string()),
        max_steps: 5,
    }
}

/// I = {a.txt}; the flow adds b.txt and edits a.txt.
fn edit_and_add() -> ScriptedFlow {
    ScriptedFlow::succeeding(|workdir| {
        fs::write(workdir.join("a.txt"), "edited")?;
        fs::write(workdir.join("b.txt"), "generated")?;
        Ok(())
    })
}

#[test]
fn path_rule_outputs_only_new_files() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("a.txt", "original").expect("input");
    let flow = edit_and_add();

    let report = run_pipeline(&layout.stager(DiffRule::Path), &flow, &options()).expect("run");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.finalize, FinalizeStatus::Done);
    assert_eq!(report.generated, 1);
    let output = read_tree(&report.output_dir.expect("output")).expect("output tree");
    assert_eq!(output.keys().collect::<Vec<_>>(), vec!["b.txt"]);
    assert_eq!(output["b.txt"], b"generated");
}

#[test]
fn content_rule_outputs_new_and_edited_files() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("a.txt", "original").expect("input");
    let flow = edit_and_add();

    let report =
        run_pipeline(&layout.stager(DiffRule::Content), &flow, &options()).expect("run");

    let output = read_tree(&report.output_dir.expect("output")).expect("output tree");
    assert_eq!(output.keys().collect::<Vec<_>>(), vec!["a.txt", "b.txt"]);
    assert_eq!(output["a.txt"], b"edited");
}

#[test]
fn input_is_never_modified() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("a.txt", "original").expect("a");
    write_file(&layout.input, "docs/lease.pdf", "pdf").expect("lease");
    let before = read_tree(&layout.input).expect("before");

    let flow = ScriptedFlow::succeeding(|workdir| {
        fs::remove_file(workdir.join("docs/lease.pdf"))?;
        fs::write(workdir.join("a.txt"), "edited")?;
        Ok(())
    });
    run_pipeline(&layout.stager(DiffRule::Content), &flow, &options()).expect("run");

    assert_eq!(read_tree(&layout.input).expect("after"), before);
}

#[test]
fn flow_sees_seeded_workspace_and_request() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("docs/a.txt", "original").expect("input");
    let flow = ScriptedFlow::succeeding(|workdir| {
        anyhow::ensure!(workdir.join("docs/a.txt").is_file(), "input not seeded");
        Ok(())
    });

    let report = run_pipeline(&layout.stager(DiffRule::Path), &flow, &options()).expect("run");

    let requests = flow.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].run_id, report.run_id);
    assert_eq!(requests[0].workdir, report.workspace_dir);
    assert_eq!(requests[0].query.as_deref(), Some("Analyse the data room"));
    assert_eq!(requests[0].max_steps, 5);
    assert!(requests[0].workdir.starts_with(&layout.workspace_root));
}

#[test]
fn failed_flow_keeps_workspace_and_skips_output() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("a.txt", "original").expect("input");
    let flow = ScriptedFlow::exiting(Some(2), |workdir| {
        fs::write(workdir.join("partial.md"), "draft")?;
        Ok(())
    });
    let stager = layout.stager(DiffRule::Path);

    let report = run_pipeline(&stager, &flow, &options()).expect("run");

    assert_eq!(report.status, RunStatus::FlowFailed);
    assert_eq!(report.finalize, FinalizeStatus::Skipped);
    assert!(report.output_dir.is_none());
    assert!(report.workspace_dir.join("partial.md").exists());
    assert!(!layout.output_root.join(&report.run_id).exists());

    let run = stager.load_run(&report.run_id).expect("load");
    let finalized = stager.finalize(&run).expect("finalize later");
    assert_eq!(finalized.generated, vec!["partial.md"]);
}

#[test]
fn timed_out_flow_is_reported() {
    let layout = TestLayout::new().expect("layout");
    let flow = ScriptedFlow::timing_out(|_| Ok(()));

    let report = run_pipeline(&layout.stager(DiffRule::Path), &flow, &options()).expect("run");

    assert_eq!(report.status, RunStatus::TimedOut);
    let run = layout.stager(DiffRule::Path).load_run(&report.run_id).expect("load");
    let meta = load_meta(&run.paths.meta_path).expect("meta");
    let flow_record = meta.flow.expect("flow record");
    assert!(flow_record.timed_out);
    assert_eq!(meta.finalize, FinalizeStatus::Skipped);
}

#[test]
fn flow_error_is_recorded_in_meta() {
    let layout = TestLayout::new().expect("layout");
    let flow = ScriptedFlow::succeeding(|_| anyhow::bail!("spawn failed"));
    let stager = layout.stager(DiffRule::Path);

    let report = run_pipeline(&stager, &flow, &options()).expect("run");

    assert_eq!(report.status, RunStatus::FlowFailed);
    let meta = load_meta(&stager.load_run(&report.run_id).expect("load").paths.meta_path)
        .expect("meta");
    assert!(meta.flow.is_none());
    assert!(meta.errors.iter().any(|err| err.contains("spawn failed")));
}

#[test]
fn meta_and_manifest_describe_completed_run() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("a.txt", "original").expect("input");
    let flow = edit_and_add();
    let stager = layout.stager(DiffRule::Path);

    let report = run_pipeline(&stager, &flow, &options()).expect("run");
    let run = stager.load_run(&report.run_id).expect("load");

    let manifest = load_manifest(&run.paths.manifest_path).expect("manifest");
    assert_eq!(manifest.snapshot.file_count(), 1);
    assert!(manifest.snapshot.get("a.txt").expect("a").sha256.is_some());

    let meta = load_meta(&run.paths.meta_path).expect("meta");
    assert_eq!(meta.run_id, report.run_id);
    assert_eq!(meta.finalize, FinalizeStatus::Done);
    assert_eq!(meta.generated, vec!["b.txt"]);
    let flow_record = meta.flow.expect("flow");
    assert_eq!(flow_record.exit_code, Some(0));
    // Duration comes from the flow runner's own measurement.
    assert_eq!(flow_record.duration_secs, 0.001);
    assert!(meta.errors.is_empty());
}

#[test]
fn consecutive_runs_never_share_directories() {
    let layout = TestLayout::new().expect("layout");
    layout.write_input("a.txt", "original").expect("input");
    let stager = layout.stager(DiffRule::Path);

    let first = run_pipeline(&stager, &edit_and_add(), &options()).expect("first");
    let second = run_pipeline(&stager, &edit_and_add(), &options()).expect("second");

    assert_ne!(first.run_id, second.run_id);
    assert_ne!(first.workspace_dir, second.workspace_dir);
    assert_ne!(first.output_dir, second.output_dir);
    assert!(first.output_dir.expect("first out").join("b.txt").exists());
    assert!(second.output_dir.expect("second out").join("b.txt").exists());
}
