//! `lexigraph normalize`, `lexigraph augment` and `lexigraph run`.

use std::io::{self, Write};

use anyhow::{Context as _, Result};
use clap::Args;
use lexigraph_core::pipeline::Pipeline;
use lexigraph_core::relation::RelationRegistry;
use lexigraph_core::state::Phase;
use lexigraph_core::stats::InsertionStats;

use super::{PhaseOverrides, Session, effective_config};
use crate::output::{kv, render, section};

#[derive(Args, Debug, Default)]
pub struct PhaseArgs {
    #[command(flatten)]
    pub overrides: PhaseOverrides,
}

/// Run one phase under the graph lock.
///
/// # Errors
///
/// Propagates lock, config and engine failures, including phase-order
/// refusals.
pub fn run_phase(phase: Phase, args: &PhaseArgs, session: &Session) -> Result<()> {
    let config = effective_config(session, None, Some(&args.overrides))?;
    let _lock = session.lock()?;
    let mut store = session.open_store()?;
    let mut pipeline = Pipeline::new(&mut store, RelationRegistry::global(), &config);

    let (heading, result) = match phase {
        Phase::Normalize => ("Normalize", pipeline.normalize()),
        Phase::Augment => ("Augment", pipeline.augment()),
        Phase::Validate => anyhow::bail!("validation needs a data set; use `lexigraph validate`"),
    };
    let stats = result.with_context(|| format!("{phase} failed"))?;

    render(session.output, &stats, |s, w| write_stats(w, heading, s))
}

/// Execute `lexigraph run`: whichever of normalize and augment is owed.
///
/// # Errors
///
/// Propagates lock, config and engine failures.
pub fn run_pending(args: &PhaseArgs, session: &Session) -> Result<()> {
    let config = effective_config(session, None, Some(&args.overrides))?;
    let _lock = session.lock()?;
    let mut store = session.open_store()?;

    let run = Pipeline::new(&mut store, RelationRegistry::global(), &config)
        .run_pending()
        .context("Failed to run pending phases")?;

    render(session.output, &run, |r, w| {
        if r.normalize.is_none() && r.augment.is_none() {
            return writeln!(w, "Nothing to do; the graph is up to date.");
        }
        if let Some(stats) = &r.normalize {
            write_stats(w, "Normalize", stats)?;
        }
        if let Some(stats) = &r.augment {
            if r.normalize.is_some() {
                writeln!(w)?;
            }
            write_stats(w, "Augment", stats)?;
        }
        Ok(())
    })
}

/// Human form of one phase's insertion statistics.
pub fn write_stats(w: &mut dyn Write, heading: &str, stats: &InsertionStats) -> io::Result<()> {
    section(w, heading)?;
    kv(w, "Edges before", stats.edges_prior_to_run.to_string())?;
    kv(w, "Inserted", stats.total_inserted().to_string())?;
    for (relation, count) in &stats.count_by_relation {
        writeln!(w, "  {relation:<24} {count}")?;
    }
    if stats.layers > 0 {
        kv(w, "Layers", stats.layers.to_string())?;
        kv(w, "Max depth", stats.max_depth_reached.to_string())?;
    }
    kv(w, "Elapsed", format!("{} ms", stats.elapsed_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_show_per_relation_counts() {
        let mut stats = InsertionStats::new(4);
        stats.count_by_relation.insert("hyponym".into(), 3);
        stats.layers = 2;
        stats.max_depth_reached = 3;

        let mut buf = Vec::new();
        write_stats(&mut buf, "Augment", &stats).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Augment\n"));
        assert!(text.contains("hyponym"));
        assert!(text.contains("Max depth"));
    }
}
