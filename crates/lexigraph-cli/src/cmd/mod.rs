pub mod import;
pub mod init;
pub mod phase;
pub mod status;
pub mod validate;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use lexigraph_core::config::{self, EngineConfig};
use lexigraph_core::lock::GraphLock;
use lexigraph_core::store::SqliteStore;

use crate::output::OutputMode;

/// Config file name next to the database and under the user config dir.
pub const CONFIG_FILE: &str = "config.toml";

/// Everything a command needs to find and open the graph.
#[derive(Debug, Clone)]
pub struct Session {
    pub db: PathBuf,
    /// Explicit `--config` path, if any.
    pub config: Option<PathBuf>,
    pub lock_timeout: Duration,
    pub output: OutputMode,
}

impl Session {
    /// Config next to the database, e.g. `.lexigraph/config.toml`.
    pub fn project_config_path(&self) -> PathBuf {
        self.db
            .parent()
            .map_or_else(|| PathBuf::from(CONFIG_FILE), |dir| dir.join(CONFIG_FILE))
    }

    /// The config file in effect, if any exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        let user = dirs::config_dir().map(|dir| dir.join("lexigraph").join(CONFIG_FILE));
        resolve_config_path(
            self.config.as_deref(),
            &self.project_config_path(),
            user.as_deref(),
        )
    }

    /// Load the engine config; defaults when no config file is found. An
    /// explicit `--config` path must exist.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        if let Some(explicit) = &self.config
            && !explicit.exists()
        {
            anyhow::bail!("Config file {} does not exist", explicit.display());
        }
        match self.config_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading engine config");
                config::load_config(&path)
            }
            None => Ok(EngineConfig::default()),
        }
    }

    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open_existing(&self.db)
            .with_context(|| format!("Failed to open graph store {}", self.db.display()))
    }

    /// Take the advisory lock guarding the database for a mutating command.
    pub fn lock(&self) -> Result<GraphLock> {
        GraphLock::for_database(&self.db, self.lock_timeout)
            .with_context(|| format!("Failed to lock {}", self.db.display()))
    }
}

/// Explicit path wins; otherwise the first existing of project and user
/// config.
fn resolve_config_path(
    explicit: Option<&Path>,
    project: &Path,
    user: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if project.exists() {
        return Some(project.to_path_buf());
    }
    user.filter(|path| path.exists()).map(Path::to_path_buf)
}

// ---------------------------------------------------------------------------
// Shared overrides
// ---------------------------------------------------------------------------

/// Validation settings that override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidationOverrides {
    /// Treat missing external references as errors.
    #[arg(long)]
    pub strict: bool,

    /// Abort on the first error past the log limit.
    #[arg(long)]
    pub fail_fast: bool,

    /// Maximum issues logged; -1 for unlimited.
    #[arg(long, allow_hyphen_values = true, value_name = "N")]
    pub log_limit: Option<i64>,
}

impl ValidationOverrides {
    pub fn apply(&self, config: &mut EngineConfig) {
        if self.strict {
            config.validation.strict = true;
        }
        if self.fail_fast {
            config.validation.fail_fast = true;
        }
        if let Some(limit) = self.log_limit {
            config.validation.log_limit = limit;
        }
    }
}

/// Phase settings that override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct PhaseOverrides {
    /// Nodes or edges processed per flush/clear-cache cycle.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,
}

impl PhaseOverrides {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(batch_size) = self.batch_size {
            config.augment.batch_size = batch_size;
        }
    }
}

/// Load the config, apply overrides, and check the result.
pub fn effective_config(
    session: &Session,
    validation: Option<&ValidationOverrides>,
    phase: Option<&PhaseOverrides>,
) -> Result<EngineConfig> {
    let mut config = session.engine_config()?;
    if let Some(overrides) = validation {
        overrides.apply(&mut config);
    }
    if let Some(overrides) = phase {
        overrides.apply(&mut config);
    }
    config.validated().context("Invalid command-line override")
}
