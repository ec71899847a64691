//! Dataset management command: list, show, add, delete, refresh

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::Path;
use tracing::{info, warn};

use crate::data_paths::DataPaths;
use crate::detect;
use crate::fetch::FetchClient;
use crate::ingest;
use crate::store::datasets::{DatasetContent, DatasetStore};
use crate::store::{format_bytes, SortKey, SortOrder};

#[derive(Args, Clone)]
pub struct DatasetsArgs {
    #[command(subcommand)]
    pub action: DatasetsAction,
}

#[derive(Subcommand, Clone)]
pub enum DatasetsAction {
    /// List datasets
    List {
        /// Case-insensitive search over name and comment
        #[arg(long, default_value = "")]
        search: String,

        /// Sort key
        #[arg(long, value_enum, default_value = "modified")]
        sort: SortKey,

        /// Sort direction
        #[arg(long, value_enum, default_value = "desc")]
        order: SortOrder,
    },

    /// Show one dataset in detail
    Show {
        /// Dataset name
        name: String,
    },

    /// Add a dataset from a data file or an http(s) URL
    Add {
        /// Dataset name (must be unique)
        name: String,

        /// Path to a data file, or an http(s) URL to register
        input: String,

        /// Free-text comment
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Delete a dataset
    Rm {
        /// Dataset name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Re-fetch a URL dataset and refresh its metadata
    Refresh {
        /// Dataset name
        name: String,
    },
}

pub struct DatasetsCommand {
    args: DatasetsArgs,
}

impl DatasetsCommand {
    pub fn new(args: DatasetsArgs) -> Self {
        Self { args }
    }

    pub async fn execute(&self, data_paths: DataPaths) -> Result<()> {
        let mut store = DatasetStore::open(data_paths.datasets())
            .context("Failed to open dataset store")?;

        match &self.args.action {
            DatasetsAction::List { search, sort, order } => {
                self.list_datasets(&store, *sort, *order, search)
            }
            DatasetsAction::Show { name } => self.show_dataset(&store, name),
            DatasetsAction::Add {
                name,
                input,
                comment,
            } => self.add_dataset(&mut store, name, input, comment),
            DatasetsAction::Rm { name, force } => self.delete_dataset(&mut store, name, *force),
            DatasetsAction::Refresh { name } => self.refresh_dataset(&mut store, name).await,
        }
    }

    fn list_datasets(
        &self,
        store: &DatasetStore,
        sort: SortKey,
        order: SortOrder,
        search: &str,
    ) -> Result<()> {
        let datasets = store.list(sort, order, search);

        if datasets.is_empty() {
            println!("No datasets found.");
            return Ok(());
        }

        let mut table = Table::new();
        table.set_header(vec!["Name", "Source", "Format", "Rows", "Cols", "Size", "Modified"]);
        for dataset in &datasets {
            table.add_row(vec![
                dataset.name.clone(),
                dataset.content.source().to_string(),
                dataset.format.to_string(),
                dataset.row_count.to_string(),
                dataset.column_count.to_string(),
                format_bytes(dataset.size as u64),
                dataset.modified.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }
        println!("{table}");
        println!("{} dataset(s)", datasets.len());
        Ok(())
    }

    fn show_dataset(&self, store: &DatasetStore, name: &str) -> Result<()> {
        let dataset = store
            .get_by_name(name)
            .ok_or_else(|| anyhow!("Dataset '{}' not found", name))?;

        println!("{}  (id {})", dataset.name.bold(), dataset.id);
        println!("  source:   {}", dataset.content.source());
        println!("  format:   {}", dataset.format);
        println!("  rows:     {}", dataset.row_count);
        if !dataset.columns.is_empty() {
            let columns: Vec<String> = dataset
                .columns
                .iter()
                .zip(dataset.column_types.iter())
                .map(|(name, ctype)| format!("{} ({})", name, ctype))
                .collect();
            println!("  columns:  {}", columns.join(", "));
        }
        println!("  size:     {}", format_bytes(dataset.size as u64));
        println!("  created:  {}", dataset.created.format("%Y-%m-%d %H:%M:%S"));
        println!("  modified: {}", dataset.modified.format("%Y-%m-%d %H:%M:%S"));
        if !dataset.comment.is_empty() {
            println!("  comment:  {}", dataset.comment);
        }
        if let DatasetContent::Url(url) = &dataset.content {
            println!("  url:      {}", url);
        }
        Ok(())
    }

    fn add_dataset(
        &self,
        store: &mut DatasetStore,
        name: &str,
        input: &str,
        comment: &str,
    ) -> Result<()> {
        let dataset = if input.starts_with("http://") || input.starts_with("https://") {
            // Remote registration: the format is a best guess from the URL
            // path until the first metadata refresh
            let format = detect::format_from_hint(input).unwrap_or(detect::DataFormat::Json);
            store.create(name, DatasetContent::Url(input.to_string()), format, comment)?
        } else {
            let path = Path::new(input);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read data file: {}", input))?;
            let filename = path.file_name().and_then(|n| n.to_str());
            let parsed = ingest::parse_data_text(&text, filename)?;

            info!(
                "Detected {} ({} confidence)",
                parsed.format, parsed.confidence
            );
            store.create(
                name,
                DatasetContent::Inline(parsed.data),
                parsed.format,
                comment,
            )?
        };

        println!(
            "{} dataset '{}' ({}, {} rows)",
            "Created".green(),
            dataset.name,
            dataset.format,
            dataset.row_count
        );
        Ok(())
    }

    fn delete_dataset(&self, store: &mut DatasetStore, name: &str, force: bool) -> Result<()> {
        let dataset = store
            .get_by_name(name)
            .ok_or_else(|| anyhow!("Dataset '{}' not found", name))?;
        let id = dataset.id;

        if !force {
            warn!("Snippets referencing '{}' will fail to resolve until it is recreated", name);
            println!("Delete dataset '{}'? (y/N): ", name);

            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut answer = String::new();
            io::stdin().read_line(&mut answer)?;
            if !answer.trim().to_lowercase().starts_with('y') {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        store.delete(id)?;
        println!("{} dataset '{}'", "Deleted".red(), name);
        Ok(())
    }

    async fn refresh_dataset(&self, store: &mut DatasetStore, name: &str) -> Result<()> {
        let dataset = store
            .get_by_name(name)
            .ok_or_else(|| anyhow!("Dataset '{}' not found", name))?;
        let id = dataset.id;

        let mut client = FetchClient::new().context("Failed to create HTTP client")?;
        let refreshed = store.refresh_metadata(id, &mut client).await?;

        println!(
            "{} metadata for '{}': {} rows, {} column(s), {}",
            "Refreshed".green(),
            refreshed.name,
            refreshed.row_count,
            refreshed.column_count,
            format_bytes(refreshed.size as u64)
        );
        Ok(())
    }
}
