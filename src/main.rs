//! Binary entry point for the xindex CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Index a tree of sources that have sidecar indexes
//! xindex index src/
//!
//! # Definitions and references of the symbol at line 10, column 5
//! xindex refs src/a.cc --at 10:5 --with src/
//!
//! # Map a position from indexed content to edited content
//! xindex map --indexed a.cc.orig --buffer a.cc --at 12:3
//!
//! # Print the merged store
//! xindex dump src/
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use xindex::cli::{run_dump, run_index, run_map, run_refs};
use xindex::config::{CliOverrides, ResolvedConfig};
use xindex::error::XindexError;
use xindex::output::{emit_response, ErrorResponse};

// ============================================================================
// CLI Structure
// ============================================================================

/// Incremental code indexer.
///
/// Parses units concurrently, merges their symbols into one store and
/// answers position queries. All output is JSON.
#[derive(Parser, Debug)]
#[command(name = "xindex", version, about = "Incremental code indexer")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Workspace root holding `.xindex.toml` (default: current directory).
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Worker thread count.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Deltas applied per store tick.
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Store consumer tick in milliseconds.
    #[arg(long, global = true)]
    tick_ms: Option<u64>,

    /// How long a query waits for its file to be indexed, in milliseconds.
    #[arg(long, global = true)]
    backlog_timeout_ms: Option<u64>,

    /// Directory of the persistent index cache.
    #[arg(long, global = true, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,

    /// Keep cached indexes in memory only.
    #[arg(long, global = true)]
    no_cache: bool,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index source files and directories.
    Index {
        /// Files or directories (directories contribute files with sidecars).
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Definitions and references of the symbol at a position.
    Refs {
        /// File containing the position.
        path: PathBuf,
        /// Position (line:col, 1-based).
        #[arg(long)]
        at: String,
        /// Also index these files or directories first.
        #[arg(long)]
        with: Vec<PathBuf>,
        /// Include declarations and definitions among the references.
        #[arg(long)]
        include_decls: bool,
    },
    /// Map a position between indexed and edited content.
    Map {
        /// File with the content that was indexed.
        #[arg(long)]
        indexed: PathBuf,
        /// File with the current buffer content.
        #[arg(long)]
        buffer: PathBuf,
        /// Position (line:col, 1-based).
        #[arg(long)]
        at: String,
        /// Treat the position as the end of a range.
        #[arg(long)]
        end: bool,
        /// Map from buffer to indexed content instead.
        #[arg(long)]
        reverse: bool,
    },
    /// Index paths and print the merged store.
    Dump {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let response = ErrorResponse::from_error(&err);
            // Errors go to stdout as JSON like every other response.
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();
            ExitCode::from(err.error_code().code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn resolve_config(global: &GlobalArgs) -> Result<ResolvedConfig, XindexError> {
    let workspace = match &global.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let overrides = CliOverrides {
        threads: global.threads,
        batch_size: global.batch_size,
        tick_ms: global.tick_ms,
        backlog_timeout_ms: global.backlog_timeout_ms,
        cache_dir: global.cache_dir.clone(),
    };
    let mut config = ResolvedConfig::resolve(&workspace, &overrides)?;
    if global.no_cache {
        config.cache_dir.value = None;
    }
    Ok(config)
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), XindexError> {
    let config = resolve_config(&cli.global)?.indexer_config();
    let mut out = io::stdout();
    match cli.command {
        Command::Index { paths } => emit_response(&run_index(&config, &paths)?, &mut out)?,
        Command::Refs {
            path,
            at,
            with,
            include_decls,
        } => emit_response(
            &run_refs(&config, &path, &at, include_decls, &with)?,
            &mut out,
        )?,
        Command::Map {
            indexed,
            buffer,
            at,
            end,
            reverse,
        } => emit_response(
            &run_map(&indexed, &buffer, &at, end, reverse, config.align)?,
            &mut out,
        )?,
        Command::Dump { paths } => emit_response(&run_dump(&config, &paths)?, &mut out)?,
    }
    Ok(())
}
