//! Rule sets loaded from TOML and driven through a full session.

use super::fixtures::{toolchain, Failures, Workspace};
use codex_asar_patcher::{load_from_path, run_session, Outcome, RuleStatus, RunMode};
use std::fs;

const BUNDLE: &str = r#"const cfg={telemetry:!0,updates:!0};cfg.telemetry&&send("ping");"#;

const RULES: &str = r#"
[meta]
name = "quiet"
description = "Disable telemetry in the webview"

[[rules]]
name = "telemetry_off"
unpatched = 'telemetry:!0'
replacement = 'telemetry:!1'

[[rules]]
name = "guard_send"
unpatched = '(?P<obj>\w+)\.telemetry&&(?P<send>\w+)\("ping"\)'
patched = '\w+\.telemetry===!0&&\w+\("ping"\)'
replacement = '${obj}.telemetry===!0&&${send}("ping")'
"#;

#[test]
fn test_toml_rules_patch_then_settle() {
    let ws = Workspace::new(BUNDLE);
    let rules_path = ws.dir.path().join("quiet.toml");
    fs::write(&rules_path, RULES).unwrap();
    let rule_set = load_from_path(&rules_path).unwrap();
    assert_eq!(rule_set.name, "quiet");

    let (tools, _) = toolchain(Failures::default());
    let report = run_session(
        &ws.archive,
        &rule_set.rules,
        &tools,
        &ws.options(RunMode::Apply),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::Applied);
    assert_eq!(
        ws.bundle_text(),
        r#"const cfg={telemetry:!1,updates:!0};cfg.telemetry===!0&&send("ping");"#
    );

    let (tools, _) = toolchain(Failures::default());
    let mut options = ws.options(RunMode::Apply);
    options.timestamp = "20260101T000009Z".to_string();
    let report = run_session(&ws.archive, &rule_set.rules, &tools, &options).unwrap();

    assert_eq!(report.outcome, Outcome::NoChanges);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == RuleStatus::Already));
}
