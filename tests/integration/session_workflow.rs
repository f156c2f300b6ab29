use super::fixtures::{toolchain, Failures, Workspace, BUNDLE, BUNDLE_PATH, TIMESTAMP};
use codex_asar_patcher::checksum::sha256_file;
use codex_asar_patcher::rules::builtin;
use codex_asar_patcher::swap::backup_path;
use codex_asar_patcher::{
    check_rules, run_session, Outcome, RuleFailure, RuleStatus, RunMode, SessionError,
};
use std::fs;
use std::path::PathBuf;

#[test]
fn test_apply_then_rerun_is_no_change() {
    let ws = Workspace::new(BUNDLE);
    let rules = builtin().unwrap();
    let original_bytes = fs::read(&ws.archive).unwrap();

    // First run patches every rule.
    let (tools, calls) = toolchain(Failures::default());
    let report = run_session(&ws.archive, &rules, &tools, &ws.options(RunMode::Apply)).unwrap();

    assert_eq!(report.outcome, Outcome::Applied);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == RuleStatus::Applied));
    assert_eq!(report.bundle, PathBuf::from(BUNDLE_PATH));
    assert_eq!(
        *calls.borrow(),
        vec!["extract", "validate", "beautify", "pack"]
    );

    let persisted = report.persisted.expect("real run persists");
    assert_eq!(persisted.backup, backup_path(&ws.archive, TIMESTAMP));
    assert_eq!(fs::read(&persisted.backup).unwrap(), original_bytes);
    assert_eq!(
        persisted.new_sha256,
        Some(sha256_file(&ws.archive).unwrap())
    );
    assert_eq!(
        persisted.backup_sha256,
        Some(sha256_file(&persisted.backup).unwrap())
    );
    // The fake archive has no asar header.
    assert_eq!(persisted.header_sha256, None);

    let patched = ws.bundle_text();
    assert_ne!(patched, BUNDLE);
    let recheck = check_rules(&patched, &rules).unwrap();
    assert!(recheck.statuses().all(|(_, s)| s == RuleStatus::Already));

    // Second run: nothing to do, nothing written.
    let after_first = fs::read(&ws.archive).unwrap();
    let (tools, calls) = toolchain(Failures::default());
    let mut options = ws.options(RunMode::Apply);
    options.timestamp = "20260101T000001Z".to_string();
    let report = run_session(&ws.archive, &rules, &tools, &options).unwrap();

    assert_eq!(report.outcome, Outcome::NoChanges);
    assert!(report.persisted.is_none());
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == RuleStatus::Already));
    assert_eq!(*calls.borrow(), vec!["extract"]);
    assert_eq!(fs::read(&ws.archive).unwrap(), after_first);
    assert!(!backup_path(&ws.archive, "20260101T000001Z").exists());
}

#[test]
fn test_beautified_copy_is_packed() {
    let ws = Workspace::new(BUNDLE);
    let (tools, _) = toolchain(Failures::default());

    let report = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap();

    let beautified = report.persisted.unwrap().beautified.unwrap();
    assert_eq!(
        beautified,
        PathBuf::from("webview/assets/index-Ab12Cd.beautified.js")
    );
    let contents = super::fixtures::read_archive(&ws.archive);
    assert!(contents.contains_key("webview/assets/index-Ab12Cd.beautified.js"));
}

#[test]
fn test_dry_run_is_pure() {
    let ws = Workspace::new(BUNDLE);
    let before = fs::read(&ws.archive).unwrap();
    let (tools, calls) = toolchain(Failures::default());
    let mut options = ws.options(RunMode::DryRun);
    options.diff = true;

    let report = run_session(&ws.archive, &builtin().unwrap(), &tools, &options).unwrap();

    assert_eq!(report.outcome, Outcome::WouldApply);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == RuleStatus::WouldApply && o.substitutions.len() == 1));
    assert!(report.persisted.is_none());
    assert_eq!(*calls.borrow(), vec!["extract"]);
    assert_eq!(fs::read(&ws.archive).unwrap(), before);
    assert_eq!(ws.archive_dir_entries(), vec!["app.asar"]);
}

#[test]
fn test_dry_run_without_diff_has_no_substitutions() {
    let ws = Workspace::new(BUNDLE);
    let (tools, _) = toolchain(Failures::default());

    let report = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::DryRun),
    )
    .unwrap();

    assert!(report.outcomes.iter().all(|o| o.substitutions.is_empty()));
}

#[test]
fn test_repack_failure_leaves_archive_and_no_backup() {
    let ws = Workspace::new(BUNDLE);
    let before = fs::read(&ws.archive).unwrap();
    let (tools, calls) = toolchain(Failures {
        pack: true,
        ..Failures::default()
    });

    let err = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap_err()
    .error;

    assert!(matches!(err, SessionError::Pack(_)), "got {err}");
    assert_eq!(calls.borrow().last(), Some(&"pack"));
    assert_eq!(fs::read(&ws.archive).unwrap(), before);
    assert_eq!(ws.archive_dir_entries(), vec!["app.asar"]);
}

#[test]
fn test_syntax_failure_stops_before_pack() {
    let ws = Workspace::new(BUNDLE);
    let before = fs::read(&ws.archive).unwrap();
    let (tools, calls) = toolchain(Failures {
        validate: true,
        ..Failures::default()
    });

    let err = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap_err()
    .error;

    assert!(matches!(err, SessionError::Syntax(_)), "got {err}");
    assert_eq!(*calls.borrow(), vec!["extract", "validate"]);
    assert_eq!(fs::read(&ws.archive).unwrap(), before);
}

#[test]
fn test_syntax_failure_keeps_extracted_tree() {
    let ws = Workspace::new(BUNDLE);
    let before = fs::read(&ws.archive).unwrap();
    let (tools, _) = toolchain(Failures {
        validate: true,
        ..Failures::default()
    });
    let mut options = ws.options(RunMode::Apply);
    options.keep_extracted = true;

    let failure = run_session(&ws.archive, &builtin().unwrap(), &tools, &options).unwrap_err();

    assert!(matches!(failure.error, SessionError::Syntax(_)), "got {failure}");
    let kept = failure.kept_extracted.expect("tree kept");
    assert_eq!(
        kept,
        ws.scratch
            .path()
            .join(format!("codex_app_asar_extract_keep.{TIMESTAMP}"))
    );
    // The rejected bundle is left in place for inspection.
    let rejected = fs::read_to_string(kept.join(BUNDLE_PATH)).unwrap();
    assert_ne!(rejected, BUNDLE);
    assert_eq!(fs::read(&ws.archive).unwrap(), before);
}

#[test]
fn test_rule_failure_without_keep_reports_no_tree() {
    let bundle = BUNDLE.replace("if(!w){g(!1);return}", "if(!w)return;");
    let ws = Workspace::new(&bundle);
    let (tools, _) = toolchain(Failures::default());

    let failure = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap_err();

    assert_eq!(failure.kept_extracted, None);
    assert!(ws.scratch_entries().is_empty());
}

#[test]
fn test_beautify_failure_is_not_fatal() {
    let ws = Workspace::new(BUNDLE);
    let (tools, _) = toolchain(Failures {
        beautify: true,
        ..Failures::default()
    });

    let report = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::Applied);
    assert_eq!(report.persisted.unwrap().beautified, None);
}

#[test]
fn test_rule_failure_aborts_without_writing() {
    // Drop the snippet the fourth rule needs.
    let bundle = BUNDLE.replace("if(!w){g(!1);return}", "if(!w)return;");
    let ws = Workspace::new(&bundle);
    let before = fs::read(&ws.archive).unwrap();
    let (tools, calls) = toolchain(Failures::default());

    let err = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap_err()
    .error;

    let SessionError::Rules(failure) = err else {
        panic!("expected a rule failure, got {err}");
    };
    assert_eq!(failure.rule, "reasoning_no_autocollapse_on_finish");
    assert_eq!(failure.completed.len(), 3);
    assert!(matches!(failure.source, RuleFailure::Classification(_)));
    assert!(matches!(failure.outcome(), Outcome::Failed { .. }));
    assert_eq!(*calls.borrow(), vec!["extract"]);
    assert_eq!(fs::read(&ws.archive).unwrap(), before);
}

#[test]
fn test_dry_run_reports_the_same_failure() {
    let bundle = BUNDLE.replace("if(!w){g(!1);return}", "if(!w)return;");
    let ws = Workspace::new(&bundle);
    let (tools, _) = toolchain(Failures::default());

    let err = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::DryRun),
    )
    .unwrap_err()
    .error;

    let SessionError::Rules(failure) = err else {
        panic!("expected a rule failure, got {err}");
    };
    assert_eq!(failure.rule, "reasoning_no_autocollapse_on_finish");
    assert!(failure
        .completed
        .iter()
        .all(|o| o.status == RuleStatus::WouldApply));
}

#[test]
fn test_extracted_tree_is_removed() {
    let ws = Workspace::new(BUNDLE);
    let (tools, _) = toolchain(Failures::default());

    run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap();

    assert!(ws.scratch_entries().is_empty());
}

#[test]
fn test_keep_extracted_moves_tree() {
    let ws = Workspace::new(BUNDLE);
    let (tools, _) = toolchain(Failures::default());
    let mut options = ws.options(RunMode::Apply);
    options.keep_extracted = true;

    let report = run_session(&ws.archive, &builtin().unwrap(), &tools, &options).unwrap();

    let kept = report.kept_extracted.expect("tree kept");
    assert_eq!(
        kept,
        ws.scratch
            .path()
            .join(format!("codex_app_asar_extract_keep.{TIMESTAMP}"))
    );
    let patched = fs::read_to_string(kept.join(BUNDLE_PATH)).unwrap();
    assert_eq!(patched, ws.bundle_text());
}

#[test]
fn test_keep_extracted_refuses_existing_target() {
    let ws = Workspace::new(BUNDLE);
    let existing = ws
        .scratch
        .path()
        .join(format!("codex_app_asar_extract_keep.{TIMESTAMP}"));
    fs::create_dir(&existing).unwrap();
    fs::write(existing.join("marker"), "earlier run").unwrap();

    let (tools, _) = toolchain(Failures::default());
    let mut options = ws.options(RunMode::DryRun);
    options.keep_extracted = true;

    let report = run_session(&ws.archive, &builtin().unwrap(), &tools, &options).unwrap();

    assert_eq!(report.kept_extracted, None);
    assert_eq!(
        fs::read_to_string(existing.join("marker")).unwrap(),
        "earlier run"
    );
}

#[test]
fn test_missing_bundle_reference() {
    let ws = Workspace::new(BUNDLE);
    super::fixtures::write_archive(
        &ws.archive,
        &[("webview/index.html", "<html><body></body></html>")],
    );
    let (tools, _) = toolchain(Failures::default());

    let err = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::DryRun),
    )
    .unwrap_err()
    .error;

    assert!(matches!(err, SessionError::Bundle(_)), "got {err}");
}

#[test]
fn test_missing_archive() {
    let ws = Workspace::new(BUNDLE);
    let (tools, calls) = toolchain(Failures::default());

    let err = run_session(
        &ws.dir.path().join("absent.asar"),
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::DryRun),
    )
    .unwrap_err()
    .error;

    assert!(matches!(err, SessionError::ArchiveMissing(_)));
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_report_serializes_outcome_inline() {
    let ws = Workspace::new(BUNDLE);
    let (tools, _) = toolchain(Failures::default());

    let report = run_session(
        &ws.archive,
        &builtin().unwrap(),
        &tools,
        &ws.options(RunMode::DryRun),
    )
    .unwrap();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["outcome"], "would_apply");
    assert_eq!(value["outcomes"].as_array().unwrap().len(), 5);
    assert_eq!(value["outcomes"][0]["status"], "would_apply");
    assert!(value["persisted"].is_null());
}
