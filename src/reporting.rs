//! User-facing result lines and batch summaries.
//!
//! Result lines are command output, not logs: successes go to stdout and
//! failures to stderr, in input order, independent of `tracing` settings.

use std::io::Write;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::types::OperationResult;
use crate::types::error::S3ToolError;

/// A single line of command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Out(String),
    Err(String),
}

/// Destination of result lines.
pub struct ReportSink {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl ReportSink {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        ReportSink { out, err }
    }

    /// Process stdout and stderr.
    pub fn stdio() -> Self {
        ReportSink::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn out_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}").context("failed to write to stdout")?;
        self.out.flush().context("failed to flush stdout")
    }

    pub fn err_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.err, "{line}").context("failed to write to stderr")?;
        self.err.flush().context("failed to flush stderr")
    }

    pub fn write(&mut self, line: &ReportLine) -> Result<()> {
        match line {
            ReportLine::Out(line) => self.out_line(line),
            ReportLine::Err(line) => self.err_line(line),
        }
    }

    /// Emit one or more lines per result, in result order.
    ///
    /// Success and aborted details go to stdout (empty details are skipped);
    /// `failure_lines` decides how a failure is rendered.
    pub fn emit_results<F>(&mut self, results: &[OperationResult], failure_lines: F) -> Result<()>
    where
        F: Fn(&S3ToolError) -> Vec<ReportLine>,
    {
        for result in results {
            match result {
                OperationResult::Success(detail) | OperationResult::Aborted(detail) => {
                    if !detail.is_empty() {
                        self.out_line(detail)?;
                    }
                }
                OperationResult::Failure(e) => {
                    for line in failure_lines(e) {
                        self.write(&line)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Default failure rendering: `Error -> {cause}` on stderr.
pub fn error_line(e: &S3ToolError) -> Vec<ReportLine> {
    vec![ReportLine::Err(format!("Error -> {e}"))]
}

/// Counts of a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub aborted: u64,
    pub cancelled: u64,
    /// Failed items that left a copy at both the origin and the destination.
    pub partial_moves: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[OperationResult]) -> Self {
        let mut summary = BatchSummary::default();
        for result in results {
            match result {
                OperationResult::Success(_) => summary.succeeded += 1,
                OperationResult::Aborted(_) => summary.aborted += 1,
                OperationResult::Failure(S3ToolError::Cancelled) => summary.cancelled += 1,
                OperationResult::Failure(e) => {
                    summary.failed += 1;
                    if e.is_partial_move() {
                        summary.partial_moves += 1;
                    }
                }
            }
        }
        summary
    }

    /// Log the summary and turn it into the command outcome.
    ///
    /// Any failed item makes the command fail with
    /// [`S3ToolError::PartialFailure`]. Aborted and cancelled items do not.
    pub fn finish(self, command: &str) -> Result<BatchSummary> {
        info!(
            command = command,
            succeeded = self.succeeded,
            failed = self.failed,
            aborted = self.aborted,
            cancelled = self.cancelled,
            "{} finished.",
            command
        );
        if self.partial_moves > 0 {
            warn!(
                partial_moves = self.partial_moves,
                "some objects were copied but their origin could not be deleted."
            );
        }

        if self.failed > 0 {
            return Err(anyhow!(S3ToolError::PartialFailure {
                succeeded: self.succeeded,
                failed: self.failed,
            }));
        }
        if self.cancelled > 0 {
            return Err(anyhow!(S3ToolError::Cancelled));
        }

        Ok(self)
    }
}
