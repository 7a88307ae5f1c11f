//! Reconciliation store: merges a run's statuses into the persisted snapshot
//! without letting a failed run erase earlier good data.
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::model::{ReconciledSnapshot, ReviewStatus, ScholarStatus, SourceStatus};

pub const FLAG_UPDATED: &str = "true";
pub const FLAG_NOT_UPDATED: &str = "false";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    pub snapshot_written: bool,
    pub updated: bool,
}

#[derive(Debug, Clone)]
pub struct Store {
    metadata_path: PathBuf,
    flag_path: PathBuf,
}

impl Store {
    pub fn new(metadata_path: impl Into<PathBuf>, flag_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
            flag_path: flag_path.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.app.metadata_path(), cfg.app.update_flag_path())
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn flag_path(&self) -> &Path {
        &self.flag_path
    }

    /// A missing or unparsable snapshot is treated as no snapshot.
    #[instrument(skip_all)]
    pub async fn load_previous(&self) -> Option<ReconciledSnapshot> {
        let content = match tokio::fs::read_to_string(&self.metadata_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(?err, path = %self.metadata_path.display(), "failed to read previous snapshot");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(?err, path = %self.metadata_path.display(), "ignoring unparsable snapshot");
                None
            }
        }
    }

    /// Writes the snapshot when this run produced fresh data or nothing was
    /// stored before. The flag file is written in every case.
    #[instrument(skip(self, snapshot))]
    pub async fn persist(
        &self,
        snapshot: &ReconciledSnapshot,
        updated: bool,
        had_previous: bool,
    ) -> Result<PersistOutcome> {
        let snapshot_written = updated || !had_previous;
        if snapshot_written {
            if let Some(parent) = self.metadata_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let body = serde_json::to_string_pretty(snapshot).context("failed to encode snapshot")?;
            tokio::fs::write(&self.metadata_path, body)
                .await
                .with_context(|| format!("failed to write {}", self.metadata_path.display()))?;
            info!(path = %self.metadata_path.display(), "snapshot written");
        } else {
            info!("no fresh data; keeping previous snapshot");
        }
        self.write_flag(updated).await?;
        Ok(PersistOutcome {
            snapshot_written,
            updated,
        })
    }

    pub async fn write_flag(&self, updated: bool) -> Result<()> {
        if let Some(parent) = self.flag_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let value = if updated { FLAG_UPDATED } else { FLAG_NOT_UPDATED };
        tokio::fs::write(&self.flag_path, value)
            .await
            .with_context(|| format!("failed to write {}", self.flag_path.display()))
    }

    /// Used after a failed `persist`; errors are only logged.
    pub async fn write_flag_best_effort(&self, updated: bool) {
        if let Err(err) = self.write_flag(updated).await {
            warn!(?err, "failed to write update flag");
        }
    }
}

/// Per source: fresh success wins, then a previous success, then this run's
/// status. A skip never replaces a previously recorded status.
fn merge_source<P: Clone>(previous: Option<&SourceStatus<P>>, current: SourceStatus<P>) -> SourceStatus<P> {
    let previous = previous.filter(|p| !matches!(p, SourceStatus::NotAttempted));
    match (previous, current) {
        (_, current @ SourceStatus::Success { .. }) => current,
        (Some(prev @ SourceStatus::Success { .. }), _) => prev.clone(),
        (Some(prev), SourceStatus::Skipped { .. }) => prev.clone(),
        (_, current) => current,
    }
}

/// Merge this run's statuses into `previous`. The flag is true iff at least
/// one source succeeded in this run.
pub fn merge(
    previous: Option<&ReconciledSnapshot>,
    scholar: ScholarStatus,
    wos: ReviewStatus,
) -> (ReconciledSnapshot, bool) {
    let updated = scholar.is_success() || wos.is_success();
    let snapshot = ReconciledSnapshot {
        generated_at: Utc::now(),
        google_scholar: merge_source(previous.map(|p| &p.google_scholar), scholar),
        web_of_science: merge_source(previous.map(|p| &p.web_of_science), wos),
    };
    (snapshot, updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorRecord, ReviewCount, ReviewData, ScholarData};
    use tempfile::tempdir;

    fn scholar_ok(citedby: u64) -> ScholarStatus {
        SourceStatus::Success {
            message: format!("{} citations", citedby),
            data: ScholarData {
                author: AuthorRecord {
                    citedby,
                    ..AuthorRecord::placeholder("abc")
                },
                publications: vec![],
            },
        }
    }

    fn wos_ok(n: u64) -> ReviewStatus {
        SourceStatus::Success {
            message: "ok".into(),
            data: ReviewData {
                review_count: ReviewCount::Count(n),
            },
        }
    }

    fn failed<P>(msg: &str) -> SourceStatus<P> {
        SourceStatus::Failed { error: msg.into() }
    }

    fn skipped<P>() -> SourceStatus<P> {
        SourceStatus::Skipped {
            reason: "not provided".into(),
        }
    }

    fn snapshot(scholar: ScholarStatus, wos: ReviewStatus) -> ReconciledSnapshot {
        ReconciledSnapshot {
            generated_at: Utc::now(),
            google_scholar: scholar,
            web_of_science: wos,
        }
    }

    #[test]
    fn failure_preserves_previous_success() {
        let prev = snapshot(scholar_ok(40), wos_ok(3));
        for current in [failed("boom"), SourceStatus::NotAttempted, SourceStatus::Processing, skipped()] {
            let (merged, _) = merge(Some(&prev), current, failed("x"));
            assert_eq!(merged.google_scholar, prev.google_scholar);
            assert_eq!(merged.web_of_science, prev.web_of_science);
        }
    }

    #[test]
    fn fresh_success_overrides_any_previous() {
        let prevs = [
            None,
            Some(snapshot(scholar_ok(1), wos_ok(1))),
            Some(snapshot(failed("old"), skipped())),
        ];
        for prev in prevs.iter() {
            let (merged, updated) = merge(prev.as_ref(), scholar_ok(42), wos_ok(7));
            assert!(updated);
            assert_eq!(merged.google_scholar.data().unwrap().author.citedby, 42);
            assert_eq!(
                merged.web_of_science.data().unwrap().review_count,
                ReviewCount::Count(7)
            );
        }
    }

    #[test]
    fn failure_without_previous_success_records_reason() {
        let prev = snapshot(failed("old failure"), SourceStatus::NotAttempted);
        let (merged, updated) = merge(Some(&prev), failed("new failure"), skipped());
        assert!(!updated);
        assert_eq!(merged.google_scholar, failed("new failure"));
        assert_eq!(merged.web_of_science, skipped());
    }

    #[test]
    fn skip_does_not_replace_previous_failure() {
        let prev = snapshot(scholar_ok(1), failed("timed out"));
        let (merged, _) = merge(Some(&prev), scholar_ok(2), skipped());
        assert_eq!(merged.web_of_science, failed("timed out"));
    }

    #[test]
    fn update_flag_requires_fresh_success() {
        let prev = snapshot(scholar_ok(1), wos_ok(1));
        assert!(!merge(Some(&prev), failed("a"), failed("b")).1);
        assert!(!merge(Some(&prev), skipped(), skipped()).1);
        assert!(!merge(None, failed("a"), skipped()).1);
        assert!(merge(Some(&prev), failed("a"), wos_ok(2)).1);
        assert!(merge(None, scholar_ok(2), skipped()).1);
    }

    #[tokio::test]
    async fn load_previous_missing_or_garbage_is_none() {
        let td = tempdir().unwrap();
        let store = Store::new(td.path().join("metadata.json"), td.path().join("updated.txt"));
        assert!(store.load_previous().await.is_none());

        std::fs::write(store.metadata_path(), "{ not json").unwrap();
        assert!(store.load_previous().await.is_none());
    }

    #[tokio::test]
    async fn persist_round_trips_and_writes_flag() {
        let td = tempdir().unwrap();
        let store = Store::new(
            td.path().join("dist").join("metadata.json"),
            td.path().join("dist").join("updated.txt"),
        );
        let (snap, updated) = merge(None, scholar_ok(42), skipped());
        let outcome = store.persist(&snap, updated, false).await.unwrap();
        assert!(outcome.snapshot_written);
        assert_eq!(std::fs::read_to_string(store.flag_path()).unwrap(), "true");
        assert_eq!(store.load_previous().await.unwrap(), snap);
    }

    #[tokio::test]
    async fn persist_without_update_keeps_previous_file() {
        let td = tempdir().unwrap();
        let store = Store::new(td.path().join("metadata.json"), td.path().join("updated.txt"));
        std::fs::write(store.metadata_path(), "previous").unwrap();

        let (snap, updated) = merge(None, failed("a"), skipped());
        let outcome = store.persist(&snap, updated, true).await.unwrap();
        assert!(!outcome.snapshot_written);
        assert_eq!(std::fs::read_to_string(store.metadata_path()).unwrap(), "previous");
        assert_eq!(std::fs::read_to_string(store.flag_path()).unwrap(), "false");
    }

    #[tokio::test]
    async fn persist_without_update_writes_first_snapshot() {
        let td = tempdir().unwrap();
        let store = Store::new(td.path().join("metadata.json"), td.path().join("updated.txt"));
        let (snap, updated) = merge(None, failed("a"), skipped());
        let outcome = store.persist(&snap, updated, false).await.unwrap();
        assert!(outcome.snapshot_written);
        assert!(!outcome.updated);
        let loaded = store.load_previous().await.unwrap();
        assert_eq!(loaded.google_scholar, failed("a"));
    }
}
