//! `lexigraph status`: what the graph holds and which phases are owed.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lexigraph_core::state::{GraphState, Phase};
use lexigraph_core::store::GraphStore;
use serde::Serialize;

use super::Session;
use crate::output::{kv, render, section};

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Include the BLAKE3 content fingerprint (reads every row).
    #[arg(long)]
    pub fingerprint: bool,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    db: PathBuf,
    config: Option<PathBuf>,
    schema_version: u32,
    nodes: u64,
    edges: u64,
    edges_by_relation: BTreeMap<String, u64>,
    state: GraphState,
    pending: Vec<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

/// Execute `lexigraph status`. Read-only; takes no lock.
///
/// # Errors
///
/// Fails when the store is missing or unreadable.
pub fn run_status(args: &StatusArgs, session: &Session) -> Result<()> {
    let store = session.open_store()?;
    let state = store.graph_state()?;

    let result = StatusOutput {
        db: session.db.clone(),
        config: session.config_path(),
        schema_version: store.schema_version()?,
        nodes: store.count_nodes()?,
        edges: store.count_edges()?,
        edges_by_relation: store.count_edges_by_relation()?,
        state,
        pending: state.pending_phases(),
        fingerprint: if args.fingerprint {
            Some(store.fingerprint()?)
        } else {
            None
        },
    };

    render(session.output, &result, |r, w| {
        section(w, "Graph")?;
        kv(w, "Database", r.db.display().to_string())?;
        kv(
            w,
            "Config",
            r.config
                .as_ref()
                .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string()),
        )?;
        kv(w, "Schema version", r.schema_version.to_string())?;
        kv(w, "Nodes", r.nodes.to_string())?;
        kv(w, "Edges", r.edges.to_string())?;
        for (relation, count) in &r.edges_by_relation {
            writeln!(w, "  {relation:<24} {count}")?;
        }
        if let Some(fingerprint) = &r.fingerprint {
            kv(w, "Fingerprint", fingerprint)?;
        }
        writeln!(w)?;
        section(w, "Phases")?;
        if r.pending.is_empty() {
            writeln!(w, "Up to date.")
        } else {
            let names: Vec<&str> = r.pending.iter().copied().map(Phase::as_str).collect();
            kv(w, "Pending", names.join(", "))
        }
    })
}
