use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codex_asar_patcher::discover::{resolve_archive, ARCHIVE_ENV};
use codex_asar_patcher::{
    load_from_path, logging, run_session, Outcome, RuleOutcome, RuleSet, RuleStatus, RunMode,
    SessionError, SessionFailure, SessionOptions, SessionReport, Substitution, Toolchain,
};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};

/// Exit code when no archive could be found.
const EXIT_NOT_FOUND: i32 = 2;

#[derive(Parser)]
#[command(name = "codex-asar-patcher")]
#[command(about = "Idempotent patches for the Codex desktop webview bundle", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch the bundle inside app.asar
    Apply {
        /// Path to app.asar (auto-detected if not specified)
        #[arg(long)]
        asar: Option<PathBuf>,

        /// Rule file to use instead of the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Dry run - classify only, never write the archive
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip writing a beautified copy of the patched bundle
        #[arg(long)]
        no_beautify: bool,

        /// Keep the extracted archive tree after the run
        #[arg(long)]
        keep_extracted: bool,

        /// Show each substitution
        #[arg(short, long)]
        diff: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which rules are applied without changing anything
    Status {
        /// Path to app.asar (auto-detected if not specified)
        #[arg(long)]
        asar: Option<PathBuf>,

        /// Rule file to use instead of the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Exit non-zero unless every rule is already applied
    Verify {
        /// Path to app.asar (auto-detected if not specified)
        #[arg(long)]
        asar: Option<PathBuf>,

        /// Rule file to use instead of the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// List the rules that would run
    List {
        /// Rule file to use instead of the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

struct ApplyArgs {
    asar: Option<PathBuf>,
    rules: Option<PathBuf>,
    dry_run: bool,
    no_beautify: bool,
    keep_extracted: bool,
    diff: bool,
    json: bool,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            asar,
            rules,
            dry_run,
            no_beautify,
            keep_extracted,
            diff,
            json,
        } => cmd_apply(ApplyArgs {
            asar,
            rules,
            dry_run,
            no_beautify,
            keep_extracted,
            diff,
            json,
        }),

        Commands::Status { asar, rules } => cmd_status(asar, rules),

        Commands::Verify { asar, rules } => cmd_verify(asar, rules),

        Commands::List { rules } => cmd_list(rules),
    }
}

/// Helper: Load rules from `--rules` or fall back to the built-in set.
fn load_rules(rules: Option<&Path>) -> Result<RuleSet> {
    match rules {
        Some(path) => {
            load_from_path(path).with_context(|| format!("loading rules from {}", path.display()))
        }
        None => RuleSet::builtin().context("compiling built-in rules"),
    }
}

/// Helper: Resolve the archive or exit with code 2.
fn require_archive(flag: Option<&Path>) -> Result<PathBuf> {
    let archive = resolve_archive(flag)?;
    match archive {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => {
            eprintln!(
                "{}",
                format!("app.asar not found: {}", path.display()).red()
            );
            std::process::exit(EXIT_NOT_FOUND);
        }
        None => {
            eprintln!("{}", "Could not find app.asar.".red());
            eprintln!("{}", "Try one of:".bold());
            eprintln!("  1. Specify explicitly: codex-asar-patcher apply --asar /path/to/app.asar");
            eprintln!("  2. Set environment variable: export {ARCHIVE_ENV}=/path/to/app.asar");
            eprintln!("  3. Run from a directory containing squashfs-root/resources/app.asar");
            std::process::exit(EXIT_NOT_FOUND);
        }
    }
}

fn status_glyph(status: RuleStatus) -> colored::ColoredString {
    match status {
        RuleStatus::Already => "⊙".yellow(),
        RuleStatus::WouldApply => "→".cyan(),
        RuleStatus::Applied => "✓".green(),
    }
}

fn print_statuses(outcomes: &[RuleOutcome], show_diff: bool) {
    for outcome in outcomes {
        println!(
            "{} {}: {}",
            status_glyph(outcome.status),
            outcome.rule,
            outcome.status
        );
        if show_diff {
            for substitution in &outcome.substitutions {
                display_substitution(substitution);
            }
        }
    }
}

/// Helper: Show one substitution as a before/after diff.
fn display_substitution(substitution: &Substitution) {
    println!(
        "{}",
        format!("  @@ bytes {}..{}", substitution.start, substitution.end).dimmed()
    );

    let diff = TextDiff::from_lines(substitution.before.as_str(), substitution.after.as_str());

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("  -{}", change).red(),
            ChangeTag::Insert => format!("  +{}", change).green(),
            ChangeTag::Equal => format!("   {}", change).normal(),
        };
        print!("{}", sign);
        if change.missing_newline() {
            println!();
        }
    }
}

fn print_failure(rule: &str, reason: &str) {
    eprintln!("{} {}: Failed - {}", "✗".red(), rule, reason);
}

fn print_persisted(report: &SessionReport) {
    let Some(persisted) = &report.persisted else {
        return;
    };
    let unknown = || "unavailable".dimmed().to_string();

    println!();
    println!("{}", "PATCHED".green().bold());
    println!("  asar: {}", report.archive.display());
    println!("  backup: {}", persisted.backup.display());
    println!(
        "  sha256(new): {}",
        persisted.new_sha256.clone().unwrap_or_else(unknown)
    );
    println!(
        "  sha256(bak): {}",
        persisted.backup_sha256.clone().unwrap_or_else(unknown)
    );
    println!(
        "  asar_header_sha256: {}",
        persisted.header_sha256.clone().unwrap_or_else(unknown)
    );
    if let Some(beautified) = &persisted.beautified {
        println!(
            "{}",
            format!("  beautified: {}", beautified.display()).dimmed()
        );
    }
}

fn cmd_apply(args: ApplyArgs) -> Result<()> {
    // 1. Resolve archive and rules
    let archive = require_archive(args.asar.as_deref())?;
    let rule_set = load_rules(args.rules.as_deref())?;

    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };
    let mut options = SessionOptions::new(mode);
    options.beautify = !args.no_beautify;
    options.keep_extracted = args.keep_extracted;
    options.diff = args.diff;

    if !args.json {
        println!("Archive: {}", archive.display());
        println!("Rules: {} ({} rules)", rule_set.name, rule_set.rules.len());
        if args.dry_run {
            println!("{}", "[DRY RUN - the archive will not be modified]".cyan());
        }
        println!();
    }

    // 2. Run the session
    let tools = Toolchain::from_env();
    let result = run_session(&archive, &rule_set.rules, &tools, &options);

    // 3. Report
    let report = match result {
        Ok(report) => report,
        Err(SessionFailure {
            error,
            kept_extracted,
        }) => {
            match error {
                SessionError::Rules(failure) => {
                    if args.json {
                        let value = serde_json::json!({
                            "archive": archive,
                            "mode": mode,
                            "outcomes": failure.completed,
                            "outcome": failure.outcome(),
                            "kept_extracted": kept_extracted,
                        });
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    } else {
                        print_statuses(&failure.completed, false);
                        print_failure(&failure.rule, &failure.source.to_string());
                    }
                }
                err => eprintln!("{} {}", "✗".red(), err),
            }
            if !args.json {
                eprintln!("{}", "No changes written.".yellow());
                print_kept(kept_extracted.as_deref());
            }
            std::process::exit(1);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_statuses(&report.outcomes, args.diff);
    println!();

    match &report.outcome {
        Outcome::NoChanges => {
            println!("No changes to write (all patches already applied).");
        }
        Outcome::WouldApply => {
            let pending = report
                .outcomes
                .iter()
                .filter(|o| o.status == RuleStatus::WouldApply)
                .count();
            println!(
                "{}",
                format!("{pending} rule(s) would apply; run without --dry-run to patch.").cyan()
            );
        }
        Outcome::Applied => print_persisted(&report),
        // Failed runs come back as a `SessionFailure` and exit above.
        Outcome::Failed { .. } => {}
    }

    print_kept(report.kept_extracted.as_deref());

    Ok(())
}

fn print_kept(kept: Option<&Path>) {
    if let Some(kept) = kept {
        println!(
            "{}",
            format!("Kept extracted tree: {}", kept.display()).dimmed()
        );
    }
}

/// Helper: Dry-run classification used by `status` and `verify`.
fn classify_archive(
    asar: Option<PathBuf>,
    rules: Option<PathBuf>,
) -> Result<(PathBuf, Result<SessionReport, SessionError>)> {
    let archive = require_archive(asar.as_deref())?;
    let rule_set = load_rules(rules.as_deref())?;

    let mut options = SessionOptions::new(RunMode::DryRun);
    options.beautify = false;

    let result = run_session(&archive, &rule_set.rules, &Toolchain::from_env(), &options)
        .map_err(|failure| failure.error);
    Ok((archive, result))
}

fn cmd_status(asar: Option<PathBuf>, rules: Option<PathBuf>) -> Result<()> {
    let (archive, result) = classify_archive(asar, rules)?;

    println!("{}", "Patch Status Report".bold());
    println!("Archive: {}", archive.display());
    println!();

    let (outcomes, failed) = match result {
        Ok(report) => (report.outcomes, None),
        Err(SessionError::Rules(failure)) => {
            let reason = failure.source.to_string();
            (failure.completed, Some((failure.rule, reason)))
        }
        Err(err) => return Err(err.into()),
    };

    let applied: Vec<_> = outcomes
        .iter()
        .filter(|o| o.status == RuleStatus::Already)
        .collect();
    let pending: Vec<_> = outcomes
        .iter()
        .filter(|o| o.status != RuleStatus::Already)
        .collect();

    if !applied.is_empty() {
        println!(
            "{} {} ({} rules)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for outcome in &applied {
            println!("  - {}", outcome.rule);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} rules)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            pending.len()
        );
        for outcome in &pending {
            println!("  - {}", outcome.rule);
        }
        println!();
    }

    if let Some((rule, reason)) = failed {
        println!("{} {}", "✗".red(), "FAILED".red().bold());
        println!("  - {} ({})", rule, reason.dimmed());
        println!();
        println!(
            "{}",
            "Rules after a failure are not evaluated.".dimmed()
        );
    }

    Ok(())
}

fn cmd_verify(asar: Option<PathBuf>, rules: Option<PathBuf>) -> Result<()> {
    let (archive, result) = classify_archive(asar, rules)?;

    println!("{}", "Verifying patches...".bold());
    println!("Archive: {}", archive.display());
    println!();

    let mut verified = 0;
    let mut mismatch = 0;

    let outcomes = match result {
        Ok(report) => report.outcomes,
        Err(SessionError::Rules(failure)) => {
            eprintln!("{} {}: MISMATCH", "✗".red(), failure.rule);
            eprintln!("  Error: {}", failure.source);
            mismatch += 1;
            failure.completed
        }
        Err(err) => return Err(err.into()),
    };

    for outcome in &outcomes {
        match outcome.status {
            RuleStatus::Already => {
                println!("{} {}: Verified (already applied)", "✓".green(), outcome.rule);
                verified += 1;
            }
            RuleStatus::WouldApply | RuleStatus::Applied => {
                eprintln!("{} {}: MISMATCH", "✗".red(), outcome.rule);
                eprintln!("  Expected: patch already applied");
                eprintln!("  Found: patch not yet applied");
                mismatch += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(rules: Option<PathBuf>) -> Result<()> {
    let rule_set = load_rules(rules.as_deref())?;

    println!("{}", rule_set.name.bold());
    if let Some(description) = &rule_set.description {
        println!("{}", description.dimmed());
    }
    println!();

    for rule in &rule_set.rules {
        let evidence = if rule.patched().is_some() {
            "patched pattern"
        } else {
            "literal replacement"
        };
        println!(
            "  {} (expected {}, evidence: {})",
            rule.name(),
            rule.expected_count(),
            evidence.dimmed()
        );
    }

    Ok(())
}
