//! Submission ledger.
//!
//! Every accepted export of a run is appended to
//! `data/submissions/<run-tag>.json`. Entries are keyed by description,
//! so re-running a city replaces its entries; a changed expression digest
//! on re-run means the request body changed and is reported.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PipelineError;
use crate::batch::BatchReport;
use crate::city::Submission;
use crate::paths;

/// All submissions recorded under one run tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Run tag.
    pub run_tag: String,
    /// Last write.
    pub updated_at: DateTime<Utc>,
    /// Accepted exports, sorted by description.
    pub submissions: Vec<Submission>,
}

/// A job whose expression changed between two submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChange {
    /// Task description.
    pub description: String,
    /// Digest already in the ledger.
    pub previous: String,
    /// Digest just submitted.
    pub current: String,
}

impl Ledger {
    /// An empty ledger for `run_tag`.
    #[must_use]
    pub fn new(run_tag: &str) -> Self {
        Self {
            run_tag: run_tag.to_string(),
            updated_at: Utc::now(),
            submissions: Vec::new(),
        }
    }

    /// Reads the ledger at `path`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, PipelineError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PipelineError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Adds `submissions`, replacing entries with the same description.
    /// Returns the entries whose digest changed.
    pub fn merge<'a>(
        &mut self,
        submissions: impl IntoIterator<Item = &'a Submission>,
    ) -> Vec<DigestChange> {
        let mut changes = Vec::new();

        for submission in submissions {
            match self
                .submissions
                .iter_mut()
                .find(|s| s.description == submission.description)
            {
                Some(existing) => {
                    if existing.digest != submission.digest {
                        changes.push(DigestChange {
                            description: submission.description.clone(),
                            previous: existing.digest.clone(),
                            current: submission.digest.clone(),
                        });
                    }
                    *existing = submission.clone();
                }
                None => self.submissions.push(submission.clone()),
            }
        }

        self.submissions
            .sort_by(|a, b| a.description.cmp(&b.description));
        self.updated_at = Utc::now();
        changes
    }

    /// Writes the ledger to `path` as pretty JSON, creating parent
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)
    }
}

/// Merges the batch's submissions into the run's ledger under `dir`
/// (default `data/submissions/`) and returns the ledger path.
///
/// # Errors
///
/// Returns [`PipelineError`] if the existing ledger cannot be read or the
/// new one cannot be written.
pub fn record(dir: Option<&Path>, report: &BatchReport) -> Result<PathBuf, PipelineError> {
    let dir = dir.map_or_else(paths::submissions_dir, Path::to_path_buf);
    let path = paths::ledger_path(&dir, &report.run_tag);

    let mut ledger = Ledger::load(&path)?.unwrap_or_else(|| Ledger::new(&report.run_tag));
    for change in ledger.merge(report.submissions()) {
        log::warn!(
            "{}: expression changed since last submission ({} -> {})",
            change.description,
            &change.previous[..change.previous.len().min(12)],
            &change.current[..change.current.len().min(12)],
        );
    }
    ledger.save(&path)?;

    log::info!(
        "Recorded {} submissions in {}",
        ledger.submissions.len(),
        path.display()
    );
    Ok(path)
}
