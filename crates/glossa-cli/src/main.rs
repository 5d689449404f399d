//! glossa: a content-addressed pool of source-code functions.
//!
//! Functions that implement the same logic under different human-language
//! identifiers collapse to one SHA-256 identity; per-language mappings
//! restore each author's view.
//!
//! ```bash
//! glossa add snippets/somme.py@fr --comment "formal"
//! glossa get 3b4e…@en
//! glossa show 3b4e
//! glossa translate 3b4e@en fr --rename total=totale
//! glossa migrate --dry-run
//! glossa validate
//! ```

mod commands;
mod config;
mod error;
mod telemetry;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;

use glossa_store::{MigrateOptions, Pool};

use crate::config::{load_config, normalize_options, resolve_author, resolve_pool_root};
use crate::error::CliResult;

#[derive(Parser)]
#[command(name = "glossa")]
#[command(version = "0.1.0")]
#[command(about = "Content-addressed pool of source-code functions with per-language mappings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pool root (overrides GLOSSA_POOL / POOL_ROOT / config)
    #[arg(long, global = true)]
    pool: Option<String>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a source file and store it: add <path>@<lang>
    Add {
        target: String,

        /// Free-form variant label stored in the mapping
        #[arg(long)]
        comment: Option<String>,

        /// Object tag; may repeat
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Reconstruct author-visible source: get <hash>@<lang>
    Get {
        target: String,

        /// Mapping hash; defaults to the latest variant
        #[arg(long)]
        mapping: Option<String>,
    },

    /// Summarize an object: metadata, languages, variants
    Show { hash: String },

    /// Derive a new language variant: translate <hash>@<src> <dst>
    Translate {
        source: String,
        dst: String,

        /// Identifier rename, OLD=NEW; may repeat
        #[arg(long = "rename", value_name = "OLD=NEW")]
        renames: Vec<String>,

        /// Docstring for the new variant (defaults to the source's)
        #[arg(long)]
        docstring: Option<String>,

        /// Free-form variant label
        #[arg(long)]
        comment: Option<String>,

        /// Source mapping hash; defaults to the latest variant
        #[arg(long)]
        mapping: Option<String>,
    },

    /// Migrate legacy v0 records to the v1 layout
    Migrate {
        hash: Option<String>,

        /// Simulate without writing
        #[arg(long)]
        dry_run: bool,

        /// Keep the v0 file after migration
        #[arg(long)]
        keep_v0: bool,
    },

    /// Check pool integrity
    Validate { hash: Option<String> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = telemetry::init(&cfg.telemetry) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli, &cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, cfg: &config::CliConfig) -> CliResult<()> {
    let root = resolve_pool_root(cli.pool.as_deref(), cfg);
    let pool = Pool::open(&root)?;
    let opts = normalize_options(cfg);
    debug!(root = %root.display(), "pool opened");

    match &cli.command {
        Commands::Add { target, comment, tags } => {
            commands::add::run(&pool, &opts, &resolve_author(), target, comment.as_deref(), tags.clone())
        }
        Commands::Get { target, mapping } => {
            commands::get::run(&pool, &opts, target, mapping.as_deref())
        }
        Commands::Show { hash } => commands::show::run(&pool, hash),
        Commands::Translate { source, dst, renames, docstring, comment, mapping } => {
            commands::translate::run(
                &pool,
                &resolve_author(),
                source,
                dst,
                renames,
                docstring.as_deref(),
                comment.as_deref(),
                mapping.as_deref(),
            )
        }
        Commands::Migrate { hash, dry_run, keep_v0 } => {
            let migrate_opts = MigrateOptions { dry_run: *dry_run, keep_v0: *keep_v0 };
            commands::migrate::run(&pool, &opts, &resolve_author(), hash.as_deref(), &migrate_opts)
        }
        Commands::Validate { hash } => commands::validate::run(&pool, &opts, hash.as_deref()),
    }
}
