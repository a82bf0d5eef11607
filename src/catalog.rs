use crate::error::{EnrichError, Result};
use crate::types::ContentRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Which ids have already been enriched successfully, so later runs skip
/// them. An id in here implies the catalog holds a record with at least one
/// location for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeState {
    pub processed_ids: Vec<String>,
    pub last_run_date: Option<String>,
}

impl ResumeState {
    pub fn contains(&self, id: &str) -> bool {
        self.processed_ids.iter().any(|p| p == id)
    }
}

/// Owns the catalog file and the resume-state file. Writes are merge-only:
/// the catalog is re-read fresh immediately before every write and existing
/// records are never dropped, so a partial run can never shrink it.
/// Persistence failures here are fatal, unlike everything upstream: silent
/// data loss is never acceptable.
pub struct CatalogStore {
    catalog_path: PathBuf,
    resume_path: PathBuf,
    backup_done: bool,
}

impl CatalogStore {
    pub fn new(catalog_path: impl Into<PathBuf>, resume_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            resume_path: resume_path.into(),
            backup_done: false,
        }
    }

    /// Current catalog contents. A missing file is an empty catalog; a file
    /// that exists but does not parse is fatal, because the merge would
    /// otherwise overwrite data it never read.
    pub fn load_catalog(&self) -> Result<Vec<ContentRecord>> {
        if !self.catalog_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.catalog_path)
            .map_err(|e| EnrichError::Persist(format!("cannot read catalog: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| EnrichError::Persist(format!("catalog is not valid JSON: {e}")))
    }

    /// Merge a batch into the catalog: replace records the batch updates,
    /// keep everything else, append what is new.
    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    pub fn merge_batch(&mut self, batch: &[ContentRecord]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(self.load_catalog()?.len());
        }

        // Re-read fresh: the file may have grown since this run started.
        let existing = self.load_catalog()?;
        self.write_backup_once()?;

        let updates: HashMap<&str, &ContentRecord> =
            batch.iter().map(|record| (record.id.as_str(), record)).collect();
        let existing_ids: HashSet<&str> =
            existing.iter().map(|record| record.id.as_str()).collect();

        let mut merged: Vec<ContentRecord> = existing
            .iter()
            .map(|record| match updates.get(record.id.as_str()) {
                Some(update) => (*update).clone(),
                None => record.clone(),
            })
            .collect();
        for record in batch {
            if !existing_ids.contains(record.id.as_str()) {
                merged.push(record.clone());
            }
        }

        if let Some(dir) = self.catalog_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| EnrichError::Persist(format!("cannot create data dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&merged)
            .map_err(|e| EnrichError::Persist(format!("cannot serialize catalog: {e}")))?;
        fs::write(&self.catalog_path, json)
            .map_err(|e| EnrichError::Persist(format!("cannot write catalog: {e}")))?;

        info!("catalog now holds {} records", merged.len());
        Ok(merged.len())
    }

    /// One backup of the pre-write catalog per run, taken before the first
    /// overwrite.
    fn write_backup_once(&mut self) -> Result<()> {
        if self.backup_done || !self.catalog_path.exists() {
            self.backup_done = true;
            return Ok(());
        }
        let backup_path = backup_path_for(&self.catalog_path);
        fs::copy(&self.catalog_path, &backup_path)
            .map_err(|e| EnrichError::Persist(format!("cannot write catalog backup: {e}")))?;
        info!("catalog backup written to {}", backup_path.display());
        self.backup_done = true;
        Ok(())
    }

    /// Resume state, or an empty one when the file is missing or unreadable.
    /// Starting over only means redundant work, never lost data.
    pub fn load_resume(&self) -> ResumeState {
        match fs::read_to_string(&self.resume_path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("resume state unreadable, starting fresh: {}", e);
                    ResumeState::default()
                }
            },
            Err(_) => ResumeState::default(),
        }
    }

    /// Adds ids to the processed set and stamps the run. Only call with ids
    /// whose records were persisted with a non-empty location list.
    pub fn mark_processed<I: IntoIterator<Item = String>>(&self, ids: I) -> Result<()> {
        let mut state = self.load_resume();
        let mut known: HashSet<String> = state.processed_ids.iter().cloned().collect();
        for id in ids {
            if known.insert(id.clone()) {
                state.processed_ids.push(id);
            }
        }
        state.last_run_date = Some(chrono::Utc::now().to_rfc3339());

        if let Some(dir) = self.resume_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| EnrichError::Persist(format!("cannot create data dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| EnrichError::Persist(format!("cannot serialize resume state: {e}")))?;
        fs::write(&self.resume_path, json)
            .map_err(|e| EnrichError::Persist(format!("cannot write resume state: {e}")))
    }

    /// `--reset`: forget all processed ids. Missing file is a no-op.
    pub fn reset_resume(&self) -> Result<()> {
        match fs::remove_file(&self.resume_path) {
            Ok(()) => {
                info!("resume state cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EnrichError::Persist(format!("cannot clear resume state: {e}"))),
        }
    }
}

fn backup_path_for(catalog_path: &Path) -> PathBuf {
    let mut os_string = catalog_path.as_os_str().to_os_string();
    os_string.push(".bak");
    PathBuf::from(os_string)
}
