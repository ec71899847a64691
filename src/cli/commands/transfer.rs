//! Import and export commands

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use std::path::PathBuf;

use crate::data_paths::DataPaths;
use crate::store::datasets::DatasetStore;
use crate::store::snippets::SnippetStore;
use crate::transfer::{self, ExportKind};

#[derive(Args, Clone)]
pub struct ImportArgs {
    /// Which store to merge into
    #[arg(value_enum)]
    pub kind: ExportKind,

    /// File holding the exported record set
    pub file: PathBuf,
}

pub struct ImportCommand {
    args: ImportArgs,
}

impl ImportCommand {
    pub fn new(args: ImportArgs) -> Self {
        Self { args }
    }

    pub async fn execute(&self, data_paths: DataPaths) -> Result<()> {
        let text = std::fs::read_to_string(&self.args.file)
            .with_context(|| format!("Failed to read import file: {}", self.args.file.display()))?;

        let report = match self.args.kind {
            ExportKind::Snippets => {
                let mut store = SnippetStore::open(data_paths.snippets_file())
                    .context("Failed to open snippet store")?;
                transfer::import_snippets(&mut store, &text)?
            }
            ExportKind::Datasets => {
                let mut store = DatasetStore::open(data_paths.datasets())
                    .context("Failed to open dataset store")?;
                transfer::import_datasets(&mut store, &text)?
            }
        };

        println!(
            "{}: {} inserted, {} skipped, {} renamed",
            "Import finished".green(),
            report.inserted,
            report.skipped,
            report.renamed
        );
        Ok(())
    }
}

#[derive(Args, Clone)]
pub struct ExportArgs {
    /// Which store to export
    #[arg(value_enum)]
    pub kind: ExportKind,

    /// Output file for the record set
    pub output: PathBuf,
}

pub struct ExportCommand {
    args: ExportArgs,
}

impl ExportCommand {
    pub fn new(args: ExportArgs) -> Self {
        Self { args }
    }

    pub async fn execute(&self, data_paths: DataPaths) -> Result<()> {
        let (payload, count) = match self.args.kind {
            ExportKind::Snippets => {
                let store = SnippetStore::open(data_paths.snippets_file())
                    .context("Failed to open snippet store")?;
                (transfer::export_snippets(&store)?, store.len())
            }
            ExportKind::Datasets => {
                let store = DatasetStore::open(data_paths.datasets())
                    .context("Failed to open dataset store")?;
                (transfer::export_datasets(&store)?, store.len())
            }
        };

        std::fs::write(&self.args.output, payload)
            .with_context(|| format!("Failed to write export file: {}", self.args.output.display()))?;

        println!(
            "{} {} record(s) to {}",
            "Exported".green(),
            count,
            self.args.output.display()
        );
        Ok(())
    }
}
