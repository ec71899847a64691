//! Snippet management command: CRUD plus the draft/publish workflow

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::PathBuf;

use crate::data_paths::DataPaths;
use crate::settings::Settings;
use crate::store::datasets::DatasetStore;
use crate::store::snippets::SnippetStore;
use crate::store::{format_bytes, SortKey, SortOrder};
use crate::transfer;

#[derive(Args, Clone)]
pub struct SnippetsArgs {
    #[command(subcommand)]
    pub action: SnippetsAction,
}

#[derive(Subcommand, Clone)]
pub enum SnippetsAction {
    /// List snippets
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

    /// Create a new snippet
    New {
        /// Snippet name (defaults to a timestamp token)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show one snippet in detail
    Show {
        /// Snippet id
        id: i64,
    },

    /// Load spec text from a file into the snippet's draft
    Edit {
        /// Snippet id
        id: i64,

        /// File holding the specification text
        file: PathBuf,
    },

    /// Publish the draft, making it the committed spec
    Publish {
        /// Snippet id
        id: i64,
    },

    /// Discard the draft, keeping the published spec
    Revert {
        /// Snippet id
        id: i64,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Copy a snippet under a fresh id and a suffixed name
    Duplicate {
        /// Snippet id
        id: i64,
    },

    /// Delete a snippet
    Rm {
        /// Snippet id
        id: i64,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Pull inline data out of a snippet spec into named datasets
    ExtractData {
        /// Snippet id
        id: i64,
    },

    /// Show storage usage against the quota
    Usage,
}

pub struct SnippetsCommand {
    args: SnippetsArgs,
}

impl SnippetsCommand {
    pub fn new(args: SnippetsArgs) -> Self {
        Self { args }
    }

    pub async fn execute(&self, data_paths: DataPaths) -> Result<()> {
        let mut store = SnippetStore::open(data_paths.snippets_file())
            .context("Failed to open snippet store")?;

        match &self.args.action {
            SnippetsAction::List { search, sort, order } => {
                self.list_snippets(&store, *sort, *order, search)
            }
            SnippetsAction::New { name } => {
                // The settings record owns the timestamp-token format
                let settings = Settings::load(&data_paths.settings_file())?;
                let name = name.clone().or_else(|| {
                    Some(chrono::Utc::now().format(&settings.date_format).to_string())
                });
                let snippet = store.create(name)?;
                println!("{} snippet '{}' (id {})", "Created".green(), snippet.name, snippet.id);
                Ok(())
            }
            SnippetsAction::Show { id } => self.show_snippet(&store, *id),
            SnippetsAction::Edit { id, file } => {
                let text = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read spec file: {}", file.display()))?;
                let snippet = store.update_draft(*id, &text)?;
                if snippet.is_dirty() {
                    println!("Draft updated; publish to commit.");
                } else {
                    println!("Draft matches the published spec; nothing pending.");
                }
                Ok(())
            }
            SnippetsAction::Publish { id } => {
                let snippet = store.publish(*id)?;
                println!("{} snippet '{}'", "Published".green(), snippet.name);
                Ok(())
            }
            SnippetsAction::Revert { id, force } => self.revert_snippet(&mut store, *id, *force),
            SnippetsAction::Duplicate { id } => {
                let copy = store.duplicate(*id)?;
                println!("Duplicated as '{}' (id {})", copy.name, copy.id);
                Ok(())
            }
            SnippetsAction::Rm { id, force } => self.delete_snippet(&mut store, *id, *force),
            SnippetsAction::ExtractData { id } => {
                let mut datasets = DatasetStore::open(data_paths.datasets())
                    .context("Failed to open dataset store")?;
                let created = transfer::extract_inline_data(&mut store, &mut datasets, *id)?;
                if created.is_empty() {
                    println!("No inline data found in the spec.");
                } else {
                    println!("Extracted {} dataset(s): {}", created.len(), created.join(", "));
                }
                Ok(())
            }
            SnippetsAction::Usage => {
                let usage = store.usage();
                println!(
                    "{} of {} used ({:.1}%)",
                    format_bytes(usage.used as u64),
                    format_bytes(usage.capacity as u64),
                    usage.percent()
                );
                Ok(())
            }
        }
    }

    fn list_snippets(
        &self,
        store: &SnippetStore,
        sort: SortKey,
        order: SortOrder,
        search: &str,
    ) -> Result<()> {
        let snippets = store.list(sort, order, search);

        if snippets.is_empty() {
            println!("No snippets found.");
            return Ok(());
        }

        let mut table = Table::new();
        table.set_header(vec!["Id", "Name", "State", "Refs", "Tags", "Modified"]);
        for snippet in &snippets {
            table.add_row(vec![
                snippet.id.to_string(),
                snippet.name.clone(),
                if snippet.is_dirty() { "draft" } else { "clean" }.to_string(),
                snippet.dataset_refs.join(", "),
                snippet.tags.join(", "),
                snippet.modified.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }
        println!("{table}");
        println!("{} snippet(s)", snippets.len());
        Ok(())
    }

    fn show_snippet(&self, store: &SnippetStore, id: i64) -> Result<()> {
        let snippet = store
            .get(id)
            .ok_or_else(|| anyhow!("Snippet {} not found", id))?;

        println!("{}  (id {})", snippet.name.bold(), snippet.id);
        println!(
            "  state:    {}",
            if snippet.is_dirty() {
                "draft pending".yellow().to_string()
            } else {
                "clean".to_string()
            }
        );
        println!("  created:  {}", snippet.created.format("%Y-%m-%d %H:%M:%S"));
        println!("  modified: {}", snippet.modified.format("%Y-%m-%d %H:%M:%S"));
        if !snippet.dataset_refs.is_empty() {
            println!("  refs:     {}", snippet.dataset_refs.join(", "));
        }
        if !snippet.tags.is_empty() {
            println!("  tags:     {}", snippet.tags.join(", "));
        }
        if !snippet.comment.is_empty() {
            println!("  comment:  {}", snippet.comment);
        }
        println!();
        println!("{}", snippet.current_spec());
        Ok(())
    }

    fn revert_snippet(&self, store: &mut SnippetStore, id: i64, force: bool) -> Result<()> {
        let snippet = store
            .get(id)
            .ok_or_else(|| anyhow!("Snippet {} not found", id))?;

        if !snippet.is_dirty() {
            println!("Nothing to revert; the draft matches the published spec.");
            return Ok(());
        }

        if !force {
            println!("Discard uncommitted draft changes for '{}'? (y/N): ", snippet.name);

            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut answer = String::new();
            io::stdin().read_line(&mut answer)?;
            if !answer.trim().to_lowercase().starts_with('y') {
                println!("Revert cancelled.");
                return Ok(());
            }
        }

        let reverted = store.revert(id)?;
        println!("{} snippet '{}'", "Reverted".yellow(), reverted.name);
        Ok(())
    }

    fn delete_snippet(&self, store: &mut SnippetStore, id: i64, force: bool) -> Result<()> {
        let snippet = store
            .get(id)
            .ok_or_else(|| anyhow!("Snippet {} not found", id))?;
        let name = snippet.name.clone();

        if !force {
            println!("Delete snippet '{}'? (y/N): ", name);

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
        println!("{} snippet '{}'", "Deleted".red(), name);
        Ok(())
    }
}
