use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use lexigraph_core::pipeline::{ImportOutcome, ImportSummary, PendingRun, Pipeline};
use lexigraph_core::relation::RelationRegistry;
use lexigraph_core::validate::source::JsonLinesSource;
use serde::Serialize;

use super::phase::write_stats;
use super::validate::{Rejected, write_report};
use super::{PhaseOverrides, Session, ValidationOverrides, effective_config};
use crate::output::{kv, render, section};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON-lines scan events of the candidate data set.
    pub file: PathBuf,

    /// Normalize and augment right after a successful merge.
    #[arg(long)]
    pub run: bool,

    #[command(flatten)]
    pub validation: ValidationOverrides,

    #[command(flatten)]
    pub phase: PhaseOverrides,
}

#[derive(Debug, Serialize)]
struct ImportOutput {
    #[serde(flatten)]
    summary: ImportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<PendingRun>,
}

/// Execute `lexigraph import`: validate, merge, and optionally run the
/// pending phases, all under the graph lock.
///
/// # Errors
///
/// Fails with [`Rejected`] when validation does not pass, and propagates
/// lock, config and engine failures.
pub fn run_import(args: &ImportArgs, session: &Session) -> Result<()> {
    let config = effective_config(session, Some(&args.validation), Some(&args.phase))?;
    let _lock = session.lock()?;
    let mut store = session.open_store()?;
    let mut pipeline = Pipeline::new(&mut store, RelationRegistry::global(), &config);

    let mut source = JsonLinesSource::new(&args.file);
    let outcome = pipeline
        .import(&mut source)
        .with_context(|| format!("Failed to import {}", args.file.display()))?;

    let summary = match outcome {
        ImportOutcome::Merged(summary) => summary,
        ImportOutcome::Rejected(report) => {
            render(session.output, &report, |r, w| write_report(w, r))?;
            return Err(Rejected {
                errors: report.errors.count,
            }
            .into());
        }
    };

    let pending = if args.run {
        Some(pipeline.run_pending().context("Failed to run pending phases")?)
    } else {
        None
    };

    let result = ImportOutput { summary, pending };
    render(session.output, &result, |r, w| {
        section(w, "Import")?;
        kv(w, "Lexicon", &r.summary.lexicon)?;
        kv(w, "Nodes inserted", r.summary.nodes_inserted.to_string())?;
        kv(w, "Edges inserted", r.summary.edges_inserted.to_string())?;
        if r.summary.edges_reasserted > 0 {
            kv(w, "Edges reasserted", r.summary.edges_reasserted.to_string())?;
        }
        kv(w, "Skipped refs", r.summary.skipped_references.to_string())?;
        kv(w, "Warnings", r.summary.report.warnings.count.to_string())?;
        if let Some(run) = &r.pending {
            if let Some(stats) = &run.normalize {
                writeln!(w)?;
                write_stats(w, "Normalize", stats)?;
            }
            if let Some(stats) = &run.augment {
                writeln!(w)?;
                write_stats(w, "Augment", stats)?;
            }
        } else {
            writeln!(w)?;
            writeln!(w, "Run `lexigraph run` to normalize and augment.")?;
        }
        Ok(())
    })
}
