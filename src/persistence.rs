//! Durable storage for the session store.
//!
//! The whole [`AppSnapshot`] is loaded once at startup and rewritten after
//! every mutation. [`JsonFileRepository`] keeps it in one JSON file;
//! [`InMemoryRepository`] keeps it in memory for tests and ephemeral runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SessionError;
use crate::session::{AppSnapshot, SNAPSHOT_VERSION};

/// Load/save contract for the persisted payload.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Returns the stored snapshot, or an empty one when nothing was saved yet.
    async fn load(&self) -> Result<AppSnapshot, SessionError>;

    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: &AppSnapshot) -> Result<(), SessionError>;
}

/// Stores the snapshot as pretty-printed JSON at `path`.
///
/// Saves go through `<path>.tmp` and a rename so a crash mid-write never
/// leaves a truncated file behind. A file that cannot be parsed is moved to
/// `<path>.corrupt` and loading starts from an empty snapshot.
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

#[async_trait]
impl StateRepository for JsonFileRepository {
    async fn load(&self) -> Result<AppSnapshot, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved sessions, starting fresh");
                return Ok(AppSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut snapshot = match serde_json::from_slice::<AppSnapshot>(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let quarantine = self.sibling(".corrupt");
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    moved_to = %quarantine.display(),
                    "saved sessions unreadable, starting fresh"
                );
                tokio::fs::rename(&self.path, &quarantine).await?;
                return Ok(AppSnapshot::default());
            }
        };

        if snapshot.version > SNAPSHOT_VERSION {
            warn!(
                found = snapshot.version,
                supported = SNAPSHOT_VERSION,
                "saved sessions come from a newer version, loading best-effort"
            );
        }
        snapshot.normalize(Utc::now());
        info!(candidates = snapshot.candidates.len(), "loaded saved sessions");
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &AppSnapshot) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.sibling(".tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Keeps the last saved snapshot in memory. Lost on restart.
#[derive(Default)]
pub struct InMemoryRepository {
    saved: Mutex<Option<AppSnapshot>>,
    saves: Mutex<usize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the repository, as if a previous process had saved `snapshot`.
    pub fn with_snapshot(snapshot: AppSnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    pub async fn saved(&self) -> Option<AppSnapshot> {
        self.saved.lock().await.clone()
    }

    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl StateRepository for InMemoryRepository {
    async fn load(&self) -> Result<AppSnapshot, SessionError> {
        let mut snapshot = self.saved.lock().await.clone().unwrap_or_default();
        snapshot.normalize(Utc::now());
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &AppSnapshot) -> Result<(), SessionError> {
        *self.saved.lock().await = Some(snapshot.clone());
        *self.saves.lock().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Candidate, IdentityField, IdentityFields, Status};
    use tempfile::tempdir;

    fn snapshot_with_candidate() -> (AppSnapshot, String) {
        let candidate = Candidate::new(
            IdentityFields::default().with(IdentityField::Name, "Ada"),
            Utc::now(),
        );
        let id = candidate.id.clone();
        let mut snapshot = AppSnapshot::default();
        snapshot.active_candidate_id = Some(id.clone());
        snapshot.candidates.insert(id.clone(), candidate);
        (snapshot, id)
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("state.json"));
        let snapshot = repo.load().await.unwrap();
        assert!(snapshot.candidates.is_empty());
        assert!(snapshot.active_candidate_id.is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_snapshot() {
        let dir = tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested/state.json"));
        let (snapshot, id) = snapshot_with_candidate();
        repo.save(&snapshot).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.active_candidate_id.as_deref(), Some(id.as_str()));
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let repo = JsonFileRepository::new(&path);
        let snapshot = repo.load().await.unwrap();
        assert!(snapshot.candidates.is_empty());
        assert!(!path.exists());
        assert_eq!(
            std::fs::read(dir.path().join("state.json.corrupt")).unwrap(),
            b"{ not json"
        );
    }

    #[tokio::test]
    async fn older_payload_without_optional_fields_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"candidates": {"c1": {"identity": {"email": "x@y.io"}, "status": "in_progress", "extra": true}}}"#,
        )
        .unwrap();

        let snapshot = JsonFileRepository::new(&path).load().await.unwrap();
        let candidate = &snapshot.candidates["c1"];
        assert_eq!(candidate.id, "c1");
        assert_eq!(candidate.status, Status::InProgress);
        assert_eq!(candidate.identity.email.as_deref(), Some("x@y.io"));
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    }

    #[tokio::test]
    async fn in_memory_counts_saves() {
        let repo = InMemoryRepository::new();
        let (snapshot, _) = snapshot_with_candidate();
        repo.save(&snapshot).await.unwrap();
        repo.save(&snapshot).await.unwrap();
        assert_eq!(repo.save_count().await, 2);
        assert_eq!(repo.load().await.unwrap(), snapshot);
    }
}
