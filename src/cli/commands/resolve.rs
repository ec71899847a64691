//! Resolve command: turn a snippet into a render-ready specification

use anyhow::{anyhow, Context, Result};
use clap::Args;

use crate::data_paths::DataPaths;
use crate::resolve;
use crate::store::datasets::DatasetStore;
use crate::store::snippets::SnippetStore;

#[derive(Args, Clone)]
pub struct ResolveArgs {
    /// Snippet id
    pub id: i64,

    /// Resolve the published spec instead of the current draft view
    #[arg(long)]
    pub published: bool,
}

pub struct ResolveCommand {
    args: ResolveArgs,
}

impl ResolveCommand {
    pub fn new(args: ResolveArgs) -> Self {
        Self { args }
    }

    pub async fn execute(&self, data_paths: DataPaths) -> Result<()> {
        let snippets = SnippetStore::open(data_paths.snippets_file())
            .context("Failed to open snippet store")?;
        let datasets = DatasetStore::open(data_paths.datasets())
            .context("Failed to open dataset store")?;

        let snippet = snippets
            .get(self.args.id)
            .ok_or_else(|| anyhow!("Snippet {} not found", self.args.id))?;

        let text = if self.args.published {
            &snippet.spec
        } else {
            snippet.current_spec()
        };

        let resolved = resolve::resolve_spec_text(text, &datasets)?;
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        Ok(())
    }
}
