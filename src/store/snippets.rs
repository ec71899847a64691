//! Snippet records and the size-constrained snippet store
//!
//! The whole collection serializes into a single file; total bytes are
//! accounted against a fixed quota and a write that would exceed it fails
//! without touching memory or disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::resolve::extract_refs_from_text;
use crate::settings::DEFAULT_DATE_FORMAT;
use crate::store::{generate_record_id, matches_search, SortKey, SortOrder, StoreError};

/// Default capacity of the snippet store, in bytes
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Name suffix applied by [`SnippetStore::duplicate`]
const COPY_SUFFIX: &str = "_copy";

/// A stored visualization specification with draft/published versioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,

    pub name: String,

    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    /// Published specification text
    pub spec: String,

    /// Working copy; `None` means there are no uncommitted changes and the
    /// draft mirrors the published spec
    #[serde(default)]
    pub draft_spec: Option<String>,

    #[serde(default)]
    pub comment: String,

    /// Ordered tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Denormalized, best-effort index of dataset names referenced by the
    /// spec. Rebuilt after every save, never a foreign-key constraint.
    #[serde(default)]
    pub dataset_refs: Vec<String>,

    /// Opaque extensibility bag
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Snippet {
    /// Whether there are uncommitted draft changes
    pub fn is_dirty(&self) -> bool {
        self.draft_spec.is_some()
    }

    /// Spec text authoritative for the current view: the draft when dirty,
    /// the published text otherwise
    pub fn current_spec(&self) -> &str {
        self.draft_spec.as_deref().unwrap_or(&self.spec)
    }

    fn rebuild_refs(&mut self) {
        self.dataset_refs = extract_refs_from_text(self.current_spec())
            .into_iter()
            .collect();
    }

    fn serialized_size(&self) -> usize {
        serde_json::to_string(self).map(|json| json.len()).unwrap_or(0)
    }
}

/// Field-level patch applied by [`SnippetStore::update`].
///
/// Spec text is deliberately absent: published text only changes through
/// the draft/publish path, so edits against the published view while a
/// draft exists are impossible by construction.
#[derive(Debug, Clone, Default)]
pub struct SnippetPatch {
    pub name: Option<String>,
    pub comment: Option<String>,
    pub tags: Option<Vec<String>>,
    pub meta: Option<Map<String, Value>>,
}

/// Current capacity accounting of the snippet store
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreUsage {
    pub used: usize,
    pub capacity: usize,
}

impl StoreUsage {
    pub fn percent(&self) -> f64 {
        if self.capacity == 0 {
            return 100.0;
        }
        self.used as f64 / self.capacity as f64 * 100.0
    }
}

#[derive(Serialize, Deserialize)]
struct SnippetCollection {
    version: u32,
    snippets: Vec<Snippet>,
}

/// CRUD + draft/publish store over snippet records
pub struct SnippetStore {
    file_path: PathBuf,
    records: BTreeMap<i64, Snippet>,
    quota: usize,
    used: usize,
}

impl SnippetStore {
    pub fn open(file_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_quota(file_path, DEFAULT_QUOTA_BYTES)
    }

    /// Open the store with an explicit capacity
    pub fn open_with_quota(
        file_path: impl AsRef<Path>,
        quota: usize,
    ) -> Result<Self, StoreError> {
        let file_path = file_path.as_ref().to_path_buf();
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut store = Self {
            file_path: file_path.clone(),
            records: BTreeMap::new(),
            quota,
            used: 0,
        };

        if file_path.exists() {
            let contents = fs::read_to_string(&file_path)?;
            let collection: SnippetCollection = serde_json::from_str(&contents)?;
            store.used = contents.len();
            for snippet in collection.snippets {
                store.records.insert(snippet.id, snippet);
            }
        }

        debug!("Opened snippet store with {} records", store.records.len());
        Ok(store)
    }

    fn serialize_collection(&self) -> Result<String, StoreError> {
        let collection = SnippetCollection {
            version: 1,
            snippets: self.records.values().cloned().collect(),
        };
        Ok(serde_json::to_string(&collection)?)
    }

    /// Write the whole collection, enforcing the quota. Never partially
    /// persists: a failed write leaves the previous file contents in place.
    fn persist(&mut self) -> Result<(), StoreError> {
        let json = self.serialize_collection()?;
        if json.len() > self.quota {
            return Err(StoreError::QuotaExceeded {
                needed: json.len(),
                capacity: self.quota,
            });
        }
        fs::write(&self.file_path, &json)?;
        self.used = json.len();
        Ok(())
    }

    /// Persist, rolling the in-memory record back to `previous` on failure
    /// so memory and disk stay consistent
    fn persist_or_rollback(
        &mut self,
        id: i64,
        previous: Option<Snippet>,
    ) -> Result<(), StoreError> {
        match self.persist() {
            Ok(()) => Ok(()),
            Err(e) => {
                match previous {
                    Some(prev) => self.records.insert(id, prev),
                    None => self.records.remove(&id),
                };
                Err(e)
            }
        }
    }

    /// Create a snippet. The name defaults to a timestamp token; the
    /// published spec starts as an empty object.
    pub fn create(&mut self, name: Option<String>) -> Result<Snippet, StoreError> {
        let mut id = generate_record_id();
        while self.records.contains_key(&id) {
            id = generate_record_id();
        }

        let now = Utc::now();
        let name = name.unwrap_or_else(|| now.format(DEFAULT_DATE_FORMAT).to_string());
        let snippet = Snippet {
            id,
            name,
            created: now,
            modified: now,
            spec: "{}".to_string(),
            draft_spec: None,
            comment: String::new(),
            tags: Vec::new(),
            dataset_refs: Vec::new(),
            meta: Map::new(),
        };

        self.records.insert(id, snippet.clone());
        self.persist_or_rollback(id, None)?;
        info!("Created snippet '{}' (id {})", snippet.name, id);
        Ok(snippet)
    }

    /// Insert a fully-formed record (import path). The caller is
    /// responsible for id freshness.
    pub(crate) fn insert_record(&mut self, snippet: Snippet) -> Result<Snippet, StoreError> {
        let id = snippet.id;
        let previous = self.records.insert(id, snippet.clone());
        self.persist_or_rollback(id, previous)?;
        Ok(snippet)
    }

    pub fn get(&self, id: i64) -> Option<&Snippet> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records.contains_key(&id)
    }

    /// Patch record metadata (name, comment, tags, meta)
    pub fn update(&mut self, id: i64, patch: SnippetPatch) -> Result<Snippet, StoreError> {
        let existing = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let previous = existing.clone();
        let mut updated = previous.clone();

        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(comment) = patch.comment {
            updated.comment = comment;
        }
        if let Some(tags) = patch.tags {
            updated.tags = tags;
        }
        if let Some(meta) = patch.meta {
            updated.meta = meta;
        }
        updated.modified = Utc::now();

        self.records.insert(id, updated.clone());
        self.persist_or_rollback(id, Some(previous))?;
        Ok(updated)
    }

    /// Commit an edit to the draft slot.
    ///
    /// An edit whose text equals the published spec collapses the draft
    /// back to clean; anything else marks the snippet dirty. The reference
    /// index is rebuilt from the authoritative view after every save.
    pub fn update_draft(&mut self, id: i64, text: &str) -> Result<Snippet, StoreError> {
        let existing = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let previous = existing.clone();
        let mut updated = previous.clone();

        updated.draft_spec = if text == updated.spec {
            None
        } else {
            Some(text.to_string())
        };
        updated.modified = Utc::now();
        updated.rebuild_refs();

        self.records.insert(id, updated.clone());
        self.persist_or_rollback(id, Some(previous))?;
        Ok(updated)
    }

    /// Commit the draft: `spec := draft_spec; draft_spec := None`.
    /// Publishing a clean snippet is a no-op.
    pub fn publish(&mut self, id: i64) -> Result<Snippet, StoreError> {
        let existing = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        if !existing.is_dirty() {
            return Ok(existing.clone());
        }

        let previous = existing.clone();
        let mut updated = previous.clone();
        if let Some(draft) = updated.draft_spec.take() {
            updated.spec = draft;
        }
        updated.modified = Utc::now();
        updated.rebuild_refs();

        self.records.insert(id, updated.clone());
        self.persist_or_rollback(id, Some(previous))?;
        info!("Published snippet '{}' (id {})", updated.name, id);
        Ok(updated)
    }

    /// Discard the draft, keeping the published spec. Destructive; callers
    /// confirm before invoking. Reverting a clean snippet is a no-op.
    pub fn revert(&mut self, id: i64) -> Result<Snippet, StoreError> {
        let existing = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        if !existing.is_dirty() {
            return Ok(existing.clone());
        }

        let previous = existing.clone();
        let mut updated = previous.clone();
        updated.draft_spec = None;
        updated.modified = Utc::now();
        updated.rebuild_refs();

        self.records.insert(id, updated.clone());
        self.persist_or_rollback(id, Some(previous))?;
        info!("Reverted snippet '{}' (id {})", updated.name, id);
        Ok(updated)
    }

    /// Rebuild the reference index from the authoritative spec view and
    /// return the referenced names
    pub fn extract_dataset_refs(&mut self, id: i64) -> Result<Vec<String>, StoreError> {
        let existing = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let previous = existing.clone();
        let mut updated = previous.clone();
        updated.rebuild_refs();

        let refs = updated.dataset_refs.clone();
        self.records.insert(id, updated);
        self.persist_or_rollback(id, Some(previous))?;
        Ok(refs)
    }

    /// Copy a snippet under a fresh id and a suffixed name. The copy shares
    /// no mutable state with the source.
    pub fn duplicate(&mut self, id: i64) -> Result<Snippet, StoreError> {
        let source = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let mut copy = source.clone();

        let mut new_id = generate_record_id();
        while self.records.contains_key(&new_id) {
            new_id = generate_record_id();
        }
        copy.id = new_id;
        copy.name = format!("{}{}", copy.name, COPY_SUFFIX);

        self.records.insert(new_id, copy.clone());
        self.persist_or_rollback(new_id, None)?;
        info!("Duplicated snippet {} as '{}' (id {})", id, copy.name, new_id);
        Ok(copy)
    }

    pub fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let previous = self.records.remove(&id).ok_or(StoreError::NotFound(id))?;
        let name = previous.name.clone();
        self.persist_or_rollback(id, Some(previous))?;
        info!("Deleted snippet '{}' (id {})", name, id);
        Ok(())
    }

    /// List records matching the search term, sorted by the requested key
    /// with a stable tie-break on id ascending.
    pub fn list(&self, sort: SortKey, order: SortOrder, search: &str) -> Vec<&Snippet> {
        let mut items: Vec<&Snippet> = self
            .records
            .values()
            .filter(|s| matches_search(search, &s.name, &s.comment))
            .collect();

        items.sort_by(|a, b| {
            let primary = match sort {
                SortKey::Name => a.name.cmp(&b.name),
                SortKey::Created => a.created.cmp(&b.created),
                SortKey::Modified => a.modified.cmp(&b.modified),
                SortKey::Size => a.serialized_size().cmp(&b.serialized_size()),
            };
            let primary = match order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });
        items
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current usage against the configured capacity
    pub fn usage(&self) -> StoreUsage {
        StoreUsage {
            used: self.used,
            capacity: self.quota,
        }
    }
}
