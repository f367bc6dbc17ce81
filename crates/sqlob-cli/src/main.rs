//! sqlob CLI
//!
//! Command-line tool for inspecting the SQL type mappings of a dialect.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use sqlob::{DialectConfig, TypeRegistry};

/// Inspect and validate sqlob dialect type mappings.
#[derive(Parser)]
#[command(name = "sqlob")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the type mapping table of a dialect.
    Types {
        /// Built-in dialect.
        #[arg(short, long, value_enum, default_value_t = Dialect::Sqlite)]
        dialect: Dialect,

        /// Dialect file to load instead of a built-in dialect.
        #[arg(short, long, env = "SQLOB_DIALECT")]
        config: Option<PathBuf>,
    },

    /// Check that a dialect file maps every value kind.
    Check {
        /// Dialect file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Dialect {
    Sqlite,
    Postgres,
}

fn load(path: &Path) -> anyhow::Result<(DialectConfig, TypeRegistry)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = DialectConfig::from_json(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    let registry = TypeRegistry::from_config(&config)?;
    debug!(dialect = %config.name, path = %path.display(), "Loaded dialect");
    Ok((config, registry))
}

fn print_types(registry: &TypeRegistry) {
    println!("{:<12} {:<24} {:>6}", "KIND", "SQL TYPE", "CODE");
    println!("{:-<44}", "");
    for entry in registry.iter() {
        println!(
            "{:<12} {:<24} {:>6}",
            entry.kind.as_str(),
            entry.sql_type,
            entry.code.code()
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Types { dialect, config } => {
            let registry = match (config, dialect) {
                (Some(path), _) => load(&path)?.1,
                (None, Dialect::Sqlite) => TypeRegistry::sqlite(),
                (None, Dialect::Postgres) => TypeRegistry::postgres(),
            };
            print_types(&registry);
        }

        Commands::Check { config } => {
            let (dialect, registry) = load(&config)?;
            let missing = registry.missing_kinds();
            if missing.is_empty() {
                info!(dialect = %dialect.name, "Every value kind is mapped");
            } else {
                for kind in &missing {
                    println!(" [ ] {kind}");
                }
                bail!(
                    "dialect {} leaves {} value kind(s) unmapped",
                    dialect.name,
                    missing.len()
                );
            }
        }
    }

    Ok(())
}
