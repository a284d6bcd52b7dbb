use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use lexigraph_core::config::EngineConfig;
use lexigraph_core::store::SqliteStore;
use serde::Serialize;

use super::Session;
use crate::output::{kv, render};

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Rewrite the project config even if the graph store already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    db: PathBuf,
    config: PathBuf,
    schema_version: u32,
    config_written: bool,
}

/// Execute `lexigraph init`. Creates the store and a default project config:
///
/// ```text
/// .lexigraph/
///   graph.db       (migrated to the latest schema)
///   config.toml    (engine defaults)
/// ```
///
/// # Errors
///
/// Fails if the store already exists and `--force` is not set, or if any
/// filesystem or migration step fails.
pub fn run_init(args: &InitArgs, session: &Session) -> Result<()> {
    if session.db.exists() && !args.force {
        anyhow::bail!(
            "{} already exists. Use `lexigraph init --force` to reinitialize.",
            session.db.display()
        );
    }

    let _lock = session.lock()?;
    let store = SqliteStore::open(&session.db)
        .with_context(|| format!("Failed to create graph store {}", session.db.display()))?;
    let schema_version = store.schema_version()?;

    let config_path = session.project_config_path();
    let config_written = args.force || !config_path.exists();
    if config_written {
        let text = toml::to_string_pretty(&EngineConfig::default())
            .context("Failed to encode default config")?;
        std::fs::write(&config_path, text)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
    }

    tracing::info!(db = %session.db.display(), schema_version, "graph store initialized");
    let result = InitOutput {
        db: session.db.clone(),
        config: config_path,
        schema_version,
        config_written,
    };
    render(session.output, &result, |r, w| {
        writeln!(w, "✓ Initialized graph store.")?;
        writeln!(w)?;
        kv(w, "Database", r.db.display().to_string())?;
        kv(w, "Config", r.config.display().to_string())?;
        kv(w, "Schema version", r.schema_version.to_string())?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  lexigraph import lexicon.jsonl --run")
    })
}
