use crate::config::{ReplayOverrides, ReplayYamlConfig};
use crate::progress::ReplayProgress;
use crate::replay::{self, ReplayError, ReplayOutcome, ReplayRequest};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;

pub struct ReplayArgs {
    pub overrides: ReplayOverrides,
    pub config: Option<PathBuf>,
    pub fail_on_errors: bool,
    pub progress: bool,
    pub json: bool,
}

/// JSON output for a replay run
#[derive(Serialize)]
struct ReplayJsonOutput<'a> {
    source: String,
    destination: String,
    commit_every: usize,
    stop_on_error: bool,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a ReplayOutcome>,
}

pub fn run(args: ReplayArgs) -> anyhow::Result<()> {
    let file_config = args
        .config
        .as_deref()
        .map(ReplayYamlConfig::load)
        .transpose()?;
    let request = args.overrides.resolve(file_config)?;

    let started = chrono::Local::now();
    if !args.json {
        eprintln!("Starting import at {}", started.format("%Y-%m-%d %H:%M:%S"));
        eprintln!("Source: {}", request.origin.describe());
        if request.origin.compression().is_compressed() {
            eprintln!("Detected compression: {}", request.origin.compression());
        }
        eprintln!("Destination: {}", request.destination.describe());
        eprintln!();
    }

    let progress = (args.progress && !args.json).then(ReplayProgress::new);
    let callback = progress.clone().map(|bar| {
        Box::new(move |outcome: &ReplayOutcome| bar.update(outcome)) as replay::ProgressFn
    });

    let result = replay::run(&request, callback);

    if let Some(bar) = progress {
        bar.finish();
    }

    match result {
        Ok(outcome) => {
            if args.json {
                print_json(&request, "done", None, Some(&outcome))?;
            } else {
                print_summary(&outcome);
            }
            if args.fail_on_errors && outcome.has_failures() {
                anyhow::bail!("{} statements failed", outcome.failed_count);
            }
            Ok(())
        }
        Err(err) => {
            if args.json {
                print_json(&request, "aborted", Some(err.to_string()), err.outcome())?;
            } else if let Some(outcome) = err.outcome() {
                eprintln!("Import ABORTED");
                print_counts(outcome);
            } else if let ReplayError::Connection { cleanup_issues, .. } = &err {
                for issue in cleanup_issues {
                    eprintln!("Warning: cleanup step '{}' failed: {}", issue.step, issue.error);
                }
            }
            Err(err).context("replay aborted")
        }
    }
}

fn print_summary(outcome: &ReplayOutcome) {
    let finished = outcome.finished_at.unwrap_or_else(chrono::Local::now);
    eprintln!(
        "Import DONE at {} (took {:.3?})",
        finished.format("%Y-%m-%d %H:%M:%S"),
        outcome.elapsed()
    );
    print_counts(outcome);
}

fn print_counts(outcome: &ReplayOutcome) {
    eprintln!(
        "Applied: {} statements | Failed: {}",
        outcome.applied_count, outcome.failed_count
    );
    eprintln!("Commits: {}", outcome.commits);
    for issue in &outcome.cleanup_issues {
        eprintln!("Warning: cleanup step '{}' failed: {}", issue.step, issue.error);
    }
}

fn print_json(
    request: &ReplayRequest,
    status: &'static str,
    error: Option<String>,
    outcome: Option<&ReplayOutcome>,
) -> anyhow::Result<()> {
    let output = ReplayJsonOutput {
        source: request.origin.describe(),
        destination: request.destination.describe(),
        commit_every: request.options.commit_every,
        stop_on_error: request.options.stop_on_error,
        status,
        error,
        outcome,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
