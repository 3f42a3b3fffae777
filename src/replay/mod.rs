//! Replay driver: executes a statement stream against a destination.
//!
//! The driver runs statements strictly in order, one at a time, with
//! foreign-key checks suspended for the whole run. Work is committed every
//! `commit_every` successful statements and once more at the end. Statement
//! failures are counted and reported; they only abort the run when
//! `stop_on_error` is set.

use crate::destination::{Destination, DestinationConfig, DestinationError};
use crate::source::{DumpSource, Origin, SourceError};
use crate::tokenizer::StatementTokenizer;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_COMMIT_EVERY: usize = 200;

/// Characters of a failing statement kept for reporting.
pub const FAILURE_STATEMENT_PREFIX: usize = 1000;

/// Replay behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Commit after this many successful statements. Must be positive.
    pub commit_every: usize,
    /// Abort on the first failing statement instead of continuing
    pub stop_on_error: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            commit_every: DEFAULT_COMMIT_EVERY,
            stop_on_error: false,
        }
    }
}

/// One statement the destination rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementFailure {
    /// 1-based position in the statement stream
    pub index: u64,
    /// Leading part of the statement text
    pub statement: String,
    pub error: String,
}

/// Cleanup step that failed after the main run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStep {
    EnableConstraintChecks,
    Commit,
    Close,
}

impl std::fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupStep::EnableConstraintChecks => write!(f, "re-enable constraint checks"),
            CleanupStep::Commit => write!(f, "commit"),
            CleanupStep::Close => write!(f, "close connection"),
        }
    }
}

/// Best-effort cleanup failure. Recorded, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupIssue {
    pub step: CleanupStep,
    pub error: String,
}

/// Accounting for one replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub applied_count: u64,
    pub failed_count: u64,
    /// Commits issued for batches and the final remainder
    pub commits: u64,
    pub failures: Vec<StatementFailure>,
    pub cleanup_issues: Vec<CleanupIssue>,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub elapsed_secs: f64,
}

impl ReplayOutcome {
    fn begin() -> Self {
        Self {
            applied_count: 0,
            failed_count: 0,
            commits: 0,
            failures: Vec::new(),
            cleanup_issues: Vec::new(),
            started_at: Local::now(),
            finished_at: None,
            elapsed_secs: 0.0,
        }
    }

    /// Statements sent to the destination so far
    pub fn attempted(&self) -> u64 {
        self.applied_count + self.failed_count
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs)
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }

    fn record_failure(&mut self, index: u64, statement: &str, error: &DestinationError) {
        self.failed_count += 1;
        self.failures.push(StatementFailure {
            index,
            statement: truncate_chars(statement, FAILURE_STATEMENT_PREFIX).to_string(),
            error: error.to_string(),
        });
    }

    fn record_cleanup(&mut self, step: CleanupStep, error: &DestinationError) {
        warn!(%step, %error, "cleanup step failed");
        self.cleanup_issues.push(CleanupIssue {
            step,
            error: error.to_string(),
        });
    }

    fn finish(&mut self, clock: Instant) {
        self.finished_at = Some(Local::now());
        self.elapsed_secs = clock.elapsed().as_secs_f64();
    }
}

impl std::fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} applied, {} failed in {:.2}s",
            self.applied_count, self.failed_count, self.elapsed_secs
        )
    }
}

/// Fatal replay errors. Variants raised after statements started running
/// carry the partial outcome.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The destination could not be opened or prepared. `cleanup_issues`
    /// holds a failed close after a failed preparation.
    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: DestinationError,
        cleanup_issues: Vec<CleanupIssue>,
    },

    #[error("reading dump failed after {} statements: {source}", .outcome.attempted())]
    Stream {
        #[source]
        source: SourceError,
        outcome: Box<ReplayOutcome>,
    },

    #[error("statement #{index} failed: {source}")]
    Statement {
        index: u64,
        #[source]
        source: DestinationError,
        outcome: Box<ReplayOutcome>,
    },

    #[error("commit failed after statement #{index}: {source}")]
    Commit {
        index: u64,
        #[source]
        source: DestinationError,
        outcome: Box<ReplayOutcome>,
    },
}

impl ReplayError {
    /// Partial accounting, when the run got as far as executing statements
    pub fn outcome(&self) -> Option<&ReplayOutcome> {
        match self {
            ReplayError::Source(_) | ReplayError::Connection { .. } => None,
            ReplayError::Stream { outcome, .. }
            | ReplayError::Statement { outcome, .. }
            | ReplayError::Commit { outcome, .. } => Some(outcome),
        }
    }
}

enum Abort {
    Stream(SourceError),
    Statement { index: u64, source: DestinationError },
    Commit { index: u64, source: DestinationError },
}

impl Abort {
    fn into_error(self, outcome: ReplayOutcome) -> ReplayError {
        let outcome = Box::new(outcome);
        match self {
            Abort::Stream(source) => ReplayError::Stream { source, outcome },
            Abort::Statement { index, source } => ReplayError::Statement {
                index,
                source,
                outcome,
            },
            Abort::Commit { index, source } => ReplayError::Commit {
                index,
                source,
                outcome,
            },
        }
    }
}

pub type ProgressFn = Box<dyn FnMut(&ReplayOutcome)>;

/// Drives a statement stream into a destination it owns exclusively.
pub struct Replayer<D: Destination> {
    destination: D,
    options: ReplayOptions,
    progress_fn: Option<ProgressFn>,
}

impl<D: Destination> Replayer<D> {
    pub fn new(destination: D, options: ReplayOptions) -> Self {
        Self {
            destination,
            options,
            progress_fn: None,
        }
    }

    /// Called after every statement with the running totals
    pub fn with_progress<F: FnMut(&ReplayOutcome) + 'static>(mut self, f: F) -> Self {
        self.progress_fn = Some(Box::new(f));
        self
    }

    /// Replay already-materialised statements.
    pub fn replay_statements<I>(self, statements: I) -> Result<ReplayOutcome, ReplayError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.replay(statements.into_iter().map(|s| Ok(s.into())))
    }

    /// Replay a statement stream, typically a [`StatementTokenizer`].
    ///
    /// Constraint checks are re-enabled and the connection closed on every
    /// exit path; failures while doing so land in
    /// [`ReplayOutcome::cleanup_issues`].
    pub fn replay<I>(mut self, statements: I) -> Result<ReplayOutcome, ReplayError>
    where
        I: IntoIterator<Item = Result<String, SourceError>>,
    {
        let clock = Instant::now();
        let mut outcome = ReplayOutcome::begin();
        let target = self.destination.describe();

        info!(%target, "disabling foreign key checks");
        let suspended = self
            .destination
            .set_constraint_checks(false)
            .and_then(|()| self.destination.commit());
        if let Err(source) = suspended {
            if let Err(e) = self.destination.close() {
                outcome.record_cleanup(CleanupStep::Close, &e);
            }
            return Err(ReplayError::Connection {
                target,
                source,
                cleanup_issues: outcome.cleanup_issues,
            });
        }

        let result = self.drive(statements, &mut outcome);

        info!("re-enabling foreign key checks");
        match self.destination.set_constraint_checks(true) {
            Ok(()) => {
                if let Err(e) = self.destination.commit() {
                    outcome.record_cleanup(CleanupStep::Commit, &e);
                }
            }
            Err(e) => outcome.record_cleanup(CleanupStep::EnableConstraintChecks, &e),
        }
        if let Err(e) = self.destination.close() {
            outcome.record_cleanup(CleanupStep::Close, &e);
        }

        outcome.finish(clock);
        match result {
            Ok(()) => {
                info!(
                    applied = outcome.applied_count,
                    failed = outcome.failed_count,
                    commits = outcome.commits,
                    "replay finished"
                );
                Ok(outcome)
            }
            Err(abort) => Err(abort.into_error(outcome)),
        }
    }

    fn drive<I>(&mut self, statements: I, outcome: &mut ReplayOutcome) -> Result<(), Abort>
    where
        I: IntoIterator<Item = Result<String, SourceError>>,
    {
        let commit_every = self.options.commit_every.max(1);
        let mut batch = 0usize;

        for item in statements {
            let statement = item.map_err(Abort::Stream)?;
            let index = outcome.attempted() + 1;

            match self.destination.execute(&statement) {
                Ok(()) => {
                    outcome.applied_count += 1;
                    batch += 1;
                }
                Err(source) => {
                    outcome.record_failure(index, &statement, &source);
                    warn!(
                        failure = outcome.failed_count,
                        index,
                        statement = truncate_chars(&statement, FAILURE_STATEMENT_PREFIX),
                        error = %source,
                        "statement failed"
                    );
                    if self.options.stop_on_error {
                        return Err(Abort::Statement { index, source });
                    }
                }
            }

            if let Some(progress) = self.progress_fn.as_mut() {
                progress(&*outcome);
            }

            if batch >= commit_every {
                self.commit(index, outcome)?;
                batch = 0;
            }
        }

        if batch > 0 {
            self.commit(outcome.attempted(), outcome)?;
        }

        Ok(())
    }

    fn commit(&mut self, index: u64, outcome: &mut ReplayOutcome) -> Result<(), Abort> {
        self.destination
            .commit()
            .map_err(|source| Abort::Commit { index, source })?;
        outcome.commits += 1;
        debug!(index, commits = outcome.commits, "committed batch");
        Ok(())
    }
}

/// Everything needed for one end-to-end run.
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    pub origin: Origin,
    pub destination: DestinationConfig,
    pub options: ReplayOptions,
}

/// Resolve the source, connect, and replay. Source and connection failures
/// abort before any statement runs.
pub fn run(
    request: &ReplayRequest,
    progress: Option<ProgressFn>,
) -> Result<ReplayOutcome, ReplayError> {
    let source = DumpSource::open(&request.origin)?;

    let target = request.destination.describe();
    let destination = request
        .destination
        .connect()
        .map_err(|source| ReplayError::Connection {
            target: target.clone(),
            source,
            cleanup_issues: Vec::new(),
        })?;
    info!(%target, "connected");

    let mut replayer = Replayer::new(destination, request.options);
    replayer.progress_fn = progress;
    replayer.replay(StatementTokenizer::new(source))
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
