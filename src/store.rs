//! File-backed persistence for the known-articles log and the monitor state.
//!
//! Every document lives as pretty-printed JSON under the namespace directory. Writes go
//! to a temporary sibling file first and are renamed into place, so a concurrent reader
//! sees either the old or the new document, never a partial one.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::article::ArticleRecord;

/// Maximum number of records kept in the known-articles log.
pub const KNOWN_ARTICLES_CAP: usize = 200;

const KNOWN_ARTICLES_KEY: &str = "known_articles/data.json";
const MONITOR_STATE_KEY: &str = "monitor_state.json";

/// Key -> JSON document store rooted at one directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Reads a document. `Ok(None)` when it does not exist yet.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let document = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(document))
    }

    pub async fn write<T: Serialize + ?Sized>(&self, key: &str, document: &T) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let body = serde_json::to_string_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move {} into place", path.display()))?;

        debug!("Wrote document {}", path.display());
        Ok(())
    }
}

/// The durable "seen" set: most-recent-first, capped at [`KNOWN_ARTICLES_CAP`].
#[derive(Debug, Clone)]
pub struct ArticleStore {
    documents: DocumentStore,
}

impl ArticleStore {
    pub fn new(documents: DocumentStore) -> Self {
        Self { documents }
    }

    /// Loads the log. A missing or corrupt document is reset to an empty list and never
    /// reported as an error.
    pub async fn load(&self) -> Vec<ArticleRecord> {
        match self.documents.read::<Vec<ArticleRecord>>(KNOWN_ARTICLES_KEY).await {
            Ok(Some(records)) => records,
            Ok(None) => {
                debug!("No known-articles log yet, starting empty");
                self.reset().await;
                Vec::new()
            }
            Err(e) => {
                warn!("Known-articles log unreadable, resetting: {:#}", e);
                self.reset().await;
                Vec::new()
            }
        }
    }

    /// Persists at most the first [`KNOWN_ARTICLES_CAP`] records.
    pub async fn save(&self, records: &[ArticleRecord]) -> Result<()> {
        let bounded = &records[..records.len().min(KNOWN_ARTICLES_CAP)];
        self.documents.write(KNOWN_ARTICLES_KEY, bounded).await
    }

    async fn reset(&self) {
        if let Err(e) = self.documents.write::<[ArticleRecord]>(KNOWN_ARTICLES_KEY, &[]).await {
            warn!("Failed to initialize known-articles log: {:#}", e);
        }
    }
}

/// Prepends the freshly fetched records to the prior log and truncates to the cap.
///
/// Each id appears once: the first fetched copy wins over later fetched copies and over
/// the prior entry for the same id.
pub fn merge_known(fetched: &[ArticleRecord], known: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut merged = Vec::with_capacity(fetched.len() + known.len());
    merged.extend(fetched.iter().cloned());
    merged.extend(known);
    let mut merged = dedupe_by_id(merged);
    merged.truncate(KNOWN_ARTICLES_CAP);
    merged
}

/// Drops every record whose id already appeared earlier in `records`.
pub fn dedupe_by_id(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

/// Monitor switch persisted by the start/stop commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub enabled: bool,
}

impl MonitorState {
    pub async fn load(documents: &DocumentStore) -> Option<Self> {
        match documents.read::<MonitorState>(MONITOR_STATE_KEY).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable monitor state: {:#}", e);
                None
            }
        }
    }

    pub async fn save(&self, documents: &DocumentStore) -> Result<()> {
        documents.write(MONITOR_STATE_KEY, self).await
    }
}
