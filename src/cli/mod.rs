//! CLI module for vizvault
//!
//! Command-line surface over the snippet and dataset stores. Uses clap for
//! argument parsing and a structured Args/Command pair per subcommand.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

use crate::data_paths::{DataPaths, DEFAULT_DATA_DIR};
use crate::logging::{init_logging, LogMode, LoggingConfig};

use commands::datasets::{DatasetsArgs, DatasetsCommand};
use commands::resolve::{ResolveArgs, ResolveCommand};
use commands::snippets::{SnippetsArgs, SnippetsCommand};
use commands::transfer::{ExportArgs, ExportCommand, ImportArgs, ImportCommand};

#[derive(Parser)]
#[command(name = "vizvault")]
#[command(version)]
#[command(about = "Store, version and resolve visualization snippets and datasets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory path (default: ./data)
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage dataset records
    Datasets(DatasetsArgs),

    /// Manage snippet records and their draft/publish workflow
    Snippets(SnippetsArgs),

    /// Import a record set exported from another vault
    Import(ImportArgs),

    /// Export a record set for another vault
    Export(ExportArgs),

    /// Resolve a snippet's dataset references into a render-ready spec
    Resolve(ResolveArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let data_paths = DataPaths::new(&self.data_dir);

        // Ensure all directories exist
        data_paths.ensure_directories()?;

        if self.verbose > 0 && std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "debug");
        }
        init_logging(LoggingConfig::new(LogMode::ConsoleAndFile, data_paths.clone()))?;

        match self.command {
            Commands::Datasets(args) => DatasetsCommand::new(args).execute(data_paths).await,
            Commands::Snippets(args) => SnippetsCommand::new(args).execute(data_paths).await,
            Commands::Import(args) => ImportCommand::new(args).execute(data_paths).await,
            Commands::Export(args) => ExportCommand::new(args).execute(data_paths).await,
            Commands::Resolve(args) => ResolveCommand::new(args).execute(data_paths).await,
        }
    }
}
