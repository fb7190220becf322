//! Process-wide session state with write-through persistence.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::error;

use super::candidate::{AppSnapshot, Candidate};
use crate::error::SessionError;
use crate::persistence::{InMemoryRepository, StateRepository};

/// Holds every [`Candidate`] plus the active candidate id.
///
/// Each mutation runs under one lock together with its save, so the order of
/// writes on disk always matches the order of mutations in memory and two
/// transitions can never interleave on the same record.
pub struct SessionStore {
    snapshot: Mutex<AppSnapshot>,
    repo: Arc<dyn StateRepository>,
}

impl SessionStore {
    /// Loads the persisted snapshot from `repo`.
    pub async fn open(repo: Arc<dyn StateRepository>) -> Result<Self, SessionError> {
        let snapshot = repo.load().await?;
        Ok(Self {
            snapshot: Mutex::new(snapshot),
            repo,
        })
    }

    /// An empty store that persists nowhere but memory.
    pub fn in_memory() -> Self {
        Self {
            snapshot: Mutex::new(AppSnapshot::default()),
            repo: Arc::new(InMemoryRepository::new()),
        }
    }

    pub async fn read<R>(&self, f: impl FnOnce(&AppSnapshot) -> R) -> R {
        let snapshot = self.snapshot.lock().await;
        f(&snapshot)
    }

    pub async fn candidate(&self, id: &str) -> Option<Candidate> {
        self.read(|s| s.candidates.get(id).cloned()).await
    }

    /// Runs `f` against the candidate without mutating it.
    pub async fn inspect<R>(
        &self,
        id: &str,
        f: impl FnOnce(&Candidate) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let snapshot = self.snapshot.lock().await;
        let candidate = snapshot
            .candidates
            .get(id)
            .ok_or_else(|| SessionError::CandidateNotFound(id.to_string()))?;
        f(candidate)
    }

    /// Applies `f` to the whole snapshot and persists the result.
    pub async fn update<R>(&self, f: impl FnOnce(&mut AppSnapshot) -> R) -> R {
        let mut snapshot = self.snapshot.lock().await;
        let result = f(&mut snapshot);
        self.persist(&snapshot).await;
        result
    }

    /// Applies `f` to one candidate, persisting only when `f` succeeds.
    ///
    /// `f` must leave the candidate untouched when it returns an error.
    pub async fn update_candidate<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Candidate) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut snapshot = self.snapshot.lock().await;
        let candidate = snapshot
            .candidates
            .get_mut(id)
            .ok_or_else(|| SessionError::CandidateNotFound(id.to_string()))?;
        let result = f(candidate)?;
        self.persist(&snapshot).await;
        Ok(result)
    }

    async fn persist(&self, snapshot: &AppSnapshot) {
        if let Err(e) = self.repo.save(snapshot).await {
            error!(error = %e, "failed to persist sessions, keeping in-memory state");
        }
    }
}
