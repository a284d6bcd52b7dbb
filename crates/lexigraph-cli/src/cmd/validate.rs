use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use lexigraph_core::relation::RelationRegistry;
use lexigraph_core::validate::report::IssueLog;
use lexigraph_core::validate::source::JsonLinesSource;
use lexigraph_core::validate::{ValidationReport, Validator};

use super::{Session, ValidationOverrides, effective_config};
use crate::output::{kv, render, section};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// JSON-lines scan events of the candidate data set.
    pub file: PathBuf,

    #[command(flatten)]
    pub overrides: ValidationOverrides,
}

/// Error returned when a data set does not pass validation.
#[derive(Debug)]
pub struct Rejected {
    pub errors: usize,
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data set rejected with {} error(s)", self.errors)
    }
}

impl std::error::Error for Rejected {}

/// Execute `lexigraph validate`: run all three steps, never write.
///
/// # Errors
///
/// Fails with [`Rejected`] when the report does not pass, and propagates
/// engine failures.
pub fn run_validate(args: &ValidateArgs, session: &Session) -> Result<()> {
    let config = effective_config(session, Some(&args.overrides), None)?;
    let store = session.open_store()?;
    let mut source = JsonLinesSource::new(&args.file);

    let report = Validator::new(RelationRegistry::global(), &config.validation)
        .validate(&mut source, &store)
        .with_context(|| format!("Failed to validate {}", args.file.display()))?;

    render(session.output, &report, |r, w| write_report(w, r))?;
    if report.passed() {
        Ok(())
    } else {
        Err(Rejected {
            errors: report.errors.count,
        }
        .into())
    }
}

/// Human form of a validation report.
pub fn write_report(w: &mut dyn Write, report: &ValidationReport) -> io::Result<()> {
    section(w, "Validation")?;
    kv(w, "Last step", report.step.to_string())?;
    kv(w, "Result", if report.passed() { "passed" } else { "failed" })?;
    if let Some(fatal) = &report.fatal {
        kv(w, "Fatal", fatal)?;
    }
    write_issues(w, "Errors", &report.errors)?;
    write_issues(w, "Warnings", &report.warnings)
}

fn write_issues(w: &mut dyn Write, heading: &str, log: &IssueLog) -> io::Result<()> {
    kv(w, heading, log.count.to_string())?;
    for issue in &log.first {
        writeln!(w, "  {issue}")?;
    }
    let hidden = log.count.saturating_sub(log.first.len());
    if hidden > 0 {
        writeln!(w, "  ... and {hidden} more")?;
    }
    Ok(())
}
