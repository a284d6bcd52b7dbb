#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cmd::Session;
use cmd::validate::Rejected;
use lexigraph_core::error::ErrorCode;
use lexigraph_core::state::Phase;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status for a data set that failed validation.
const EXIT_REJECTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lexigraph: validation, normalization and closure for lexical relation graphs",
    long_about = None
)]
struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Graph database path.
    #[arg(long, global = true, default_value = ".lexigraph/graph.db")]
    db: PathBuf,

    /// Engine config file. Defaults to `config.toml` next to the database,
    /// then the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for another lexigraph process to release the graph.
    #[arg(long, global = true, default_value_t = 30, value_name = "SECS")]
    lock_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn session(&self) -> Session {
        Session {
            db: self.db.clone(),
            config: self.config.clone(),
            lock_timeout: Duration::from_secs(self.lock_timeout),
            output: self.output_mode(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Create the graph store",
        after_help = "EXAMPLES:\n    # Initialize .lexigraph/graph.db\n    lexigraph init\n\n    # Use another location\n    lexigraph --db /srv/wn/graph.db init"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Validate a data set without merging it",
        after_help = "EXAMPLES:\n    lexigraph validate lexicon.jsonl\n\n    # Missing external references are errors\n    lexigraph validate lexicon.jsonl --strict"
    )]
    Validate(cmd::validate::ValidateArgs),

    #[command(
        about = "Validate and merge a data set",
        after_help = "EXAMPLES:\n    lexigraph import lexicon.jsonl\n\n    # Normalize and augment afterwards\n    lexigraph import lexicon.jsonl --run --json"
    )]
    Import(cmd::import::ImportArgs),

    #[command(about = "Materialize inverse and domain edges")]
    Normalize(cmd::phase::PhaseArgs),

    #[command(about = "Compute the transitive closure")]
    Augment(cmd::phase::PhaseArgs),

    #[command(about = "Run whichever of normalize and augment is pending")]
    Run(cmd::phase::PhaseArgs),

    #[command(about = "Show graph counts and readiness flags")]
    Status(cmd::status::StatusArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEXIGRAPH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "lexigraph=debug,lexigraph_core=debug,info"
        } else {
            "lexigraph=info,lexigraph_core=info,warn"
        })
    });

    let format = env::var("LEXIGRAPH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let session = cli.session();

    let result = match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &session),
        Commands::Validate(args) => cmd::validate::run_validate(args, &session),
        Commands::Import(args) => cmd::import::run_import(args, &session),
        Commands::Normalize(args) => cmd::phase::run_phase(Phase::Normalize, args, &session),
        Commands::Augment(args) => cmd::phase::run_phase(Phase::Augment, args, &session),
        Commands::Run(args) => cmd::phase::run_pending(args, &session),
        Commands::Status(args) => cmd::status::run_status(args, &session),
    };

    let Err(err) = result else {
        return ExitCode::SUCCESS;
    };

    let rejected = err.downcast_ref::<Rejected>().is_some();
    let mut cli_error = CliError::from_anyhow(&err);
    if rejected {
        cli_error.error_code = Some(ErrorCode::ValidationFailed.code().to_string());
        cli_error.hint = ErrorCode::ValidationFailed.hint().map(str::to_string);
    }
    if render_error(session.output, &cli_error).is_err() {
        eprintln!("error: {err:#}");
    }

    if rejected {
        ExitCode::from(EXIT_REJECTED)
    } else {
        ExitCode::FAILURE
    }
}
