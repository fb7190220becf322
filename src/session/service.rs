use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::candidate::{Candidate, IdentityFields, Role, Status};
use super::machine::{AnswerReceipt, Finalized, StateMachine};
use super::store::SessionStore;
use crate::dashboard::{DashboardRow, dashboard_rows};
use crate::error::SessionError;
use crate::questions::{BuiltinQuestions, QuestionSource, generate_or_fallback};
use crate::scoring::{ScoringOracle, refine_score};

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of a submitted answer.
pub struct Submission {
    pub receipt: AnswerReceipt,
    /// Resolves once the scoring oracle's result has been applied or discarded.
    /// Dropping the handle does not cancel the refinement.
    pub refinement: JoinHandle<Result<u8, SessionError>>,
}

/// Entry point for every interview operation.
///
/// Synchronous transitions run as one critical section in the [`SessionStore`].
/// The two suspending operations, question generation and score refinement,
/// re-fetch their target by id when they resume and drop stale results.
pub struct InterviewService {
    store: SessionStore,
    questions: Arc<dyn QuestionSource>,
    scorer: Option<Arc<dyn ScoringOracle>>,
    generation_timeout: Duration,
    pending_starts: Mutex<HashSet<String>>,
}

/// Marks a candidate's `start` as in flight until dropped.
struct PendingStart<'a> {
    pending: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock(pending: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InterviewService {
    /// A service with the built-in question set and heuristic-only scoring.
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            questions: Arc::new(BuiltinQuestions),
            scorer: None,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            pending_starts: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_question_source(mut self, source: Arc<dyn QuestionSource>) -> Self {
        self.questions = source;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ScoringOracle>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Creates a candidate in `collecting_info` and makes it the active one.
    pub async fn create(&self, identity: IdentityFields) -> String {
        let candidate = Candidate::new(identity, Utc::now());
        let id = candidate.id.clone();
        self.store
            .update(|s| {
                s.candidates.insert(id.clone(), candidate);
                s.active_candidate_id = Some(id.clone());
            })
            .await;
        info!(candidate = %id, "candidate created");
        id
    }

    /// Merges `fields` into the identity; only keys present in `fields` change.
    pub async fn upsert_identity_fields(
        &self,
        id: &str,
        fields: IdentityFields,
    ) -> Result<(), SessionError> {
        self.store
            .update_candidate(id, |c| {
                c.identity.merge(fields);
                c.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    pub async fn append_message(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<(), SessionError> {
        let content = content.into();
        self.store
            .update_candidate(id, |c| {
                c.push_message(role, content, Utc::now());
                Ok(())
            })
            .await
    }

    /// Fetches a question set and starts the interview.
    ///
    /// The candidate stays in `collecting_info` while questions are generated;
    /// identity updates made meanwhile are kept. A second `start` for the same
    /// candidate during that window is rejected with
    /// [`SessionError::StartPending`].
    pub async fn start(&self, id: &str) -> Result<(), SessionError> {
        let name = self
            .store
            .inspect(id, |c| {
                StateMachine::check_startable(c)?;
                Ok(c.identity.name.clone())
            })
            .await?;

        let _pending = {
            let mut pending = lock(&self.pending_starts);
            if !pending.insert(id.to_string()) {
                return Err(SessionError::StartPending(id.to_string()));
            }
            PendingStart {
                pending: &self.pending_starts,
                id: id.to_string(),
            }
        };

        let questions =
            generate_or_fallback(self.questions.as_ref(), name.as_deref(), self.generation_timeout)
                .await;

        self.store
            .update_candidate(id, |c| StateMachine::begin(c, questions, Utc::now()))
            .await?;
        info!(candidate = %id, "interview started");
        Ok(())
    }

    /// Whether a `start` for `id` is waiting on question generation.
    pub fn start_pending(&self, id: &str) -> bool {
        lock(&self.pending_starts).contains(id)
    }

    /// Records the answer to the current question with a provisional score and
    /// spawns its refinement.
    ///
    /// The caller then calls [`advance`](Self::advance) or
    /// [`finalize`](Self::finalize) according to `receipt.next`.
    pub async fn submit_answer(
        self: &Arc<Self>,
        id: &str,
        answer: &str,
        auto_submitted: bool,
        time_taken_seconds: u32,
    ) -> Result<Submission, SessionError> {
        let receipt = self
            .store
            .update_candidate(id, |c| {
                StateMachine::record_answer(c, answer, auto_submitted, time_taken_seconds, Utc::now())
            })
            .await?;
        debug!(
            candidate = %id,
            question = %receipt.question_id,
            score = receipt.provisional_score,
            auto_submitted,
            "answer recorded"
        );

        let refinement = self.spawn_refinement(id, &receipt, answer);
        Ok(Submission { receipt, refinement })
    }

    fn spawn_refinement(
        self: &Arc<Self>,
        id: &str,
        receipt: &AnswerReceipt,
        answer: &str,
    ) -> JoinHandle<Result<u8, SessionError>> {
        let service = Arc::clone(self);
        let id = id.to_string();
        let question_id = receipt.question_id.clone();
        let difficulty = receipt.difficulty;
        let answer = answer.to_string();

        tokio::spawn(async move {
            let score = refine_score(service.scorer.as_deref(), &answer, difficulty).await;
            let applied = service
                .store
                .update_candidate(&id, |c| {
                    StateMachine::apply_refined_score(c, &question_id, score, Utc::now())
                })
                .await;
            match &applied {
                Ok(()) => debug!(candidate = %id, question = %question_id, score, "score refined"),
                Err(e) => debug!(candidate = %id, question = %question_id, error = %e, "stale refinement discarded"),
            }
            applied.map(|()| score)
        })
    }

    /// Moves to the next question. Returns its index.
    pub async fn advance(&self, id: &str) -> Result<usize, SessionError> {
        self.store
            .update_candidate(id, |c| StateMachine::advance(c, Utc::now()))
            .await
    }

    /// Completes the interview. Repeated calls change nothing.
    pub async fn finalize(&self, id: &str) -> Result<Finalized, SessionError> {
        let finalized = self
            .store
            .update_candidate(id, |c| StateMachine::finalize(c, Utc::now()))
            .await?;
        if let Finalized::Completed { final_score } = finalized {
            info!(candidate = %id, final_score, "interview completed");
        }
        Ok(finalized)
    }

    /// Suspends a running interview with the caller-computed remaining time.
    pub async fn pause(&self, id: &str, remaining_seconds: u32) -> Result<(), SessionError> {
        self.store
            .update_candidate(id, |c| StateMachine::pause(c, remaining_seconds, Utc::now()))
            .await?;
        info!(candidate = %id, remaining_seconds, "interview paused");
        Ok(())
    }

    /// Resumes a paused interview. Returns the timer baseline.
    pub async fn resume(&self, id: &str) -> Result<u32, SessionError> {
        let baseline = self
            .store
            .update_candidate(id, |c| StateMachine::resume(c, Utc::now()))
            .await?;
        info!(candidate = %id, baseline, "interview resumed");
        Ok(baseline)
    }

    /// Process-exit hook: pauses the active candidate with the exact remaining
    /// time at `now` if a question is running. Returns that remaining time.
    pub async fn suspend_active(&self, now: DateTime<Utc>) -> Result<Option<u32>, SessionError> {
        let Some(id) = self.store.read(|s| s.active_candidate_id.clone()).await else {
            return Ok(None);
        };
        self.store
            .update_candidate(&id, |c| {
                if c.status != Status::InProgress {
                    return Ok(None);
                }
                let remaining = c
                    .read_timer(now)
                    .map(|r| r.remaining_seconds)
                    .or_else(|| c.timer_baseline())
                    .unwrap_or_default();
                StateMachine::pause(c, remaining, now)?;
                Ok(Some(remaining))
            })
            .await
    }

    /// Drops every candidate and the active selection.
    pub async fn reset_all(&self) {
        self.store
            .update(|s| {
                s.candidates.clear();
                s.active_candidate_id = None;
            })
            .await;
        info!("all sessions cleared");
    }

    pub async fn set_active(&self, id: Option<&str>) -> Result<(), SessionError> {
        self.store
            .update(|s| {
                if let Some(id) = id {
                    if !s.candidates.contains_key(id) {
                        return Err(SessionError::CandidateNotFound(id.to_string()));
                    }
                }
                s.active_candidate_id = id.map(str::to_string);
                Ok(())
            })
            .await
    }

    pub async fn candidate(&self, id: &str) -> Option<Candidate> {
        self.store.candidate(id).await
    }

    pub async fn active_candidate(&self) -> Option<Candidate> {
        self.store
            .read(|s| {
                s.active_candidate_id
                    .as_ref()
                    .and_then(|id| s.candidates.get(id))
                    .cloned()
            })
            .await
    }

    /// A paused or running interview left over from an earlier process,
    /// preferring the active candidate, then the most recently updated one.
    pub async fn unfinished_candidate(&self) -> Option<Candidate> {
        fn unfinished(c: &Candidate) -> bool {
            c.status == Status::Paused
                || (c.status == Status::InProgress && c.current_question_index >= 0)
        }
        self.store
            .read(|s| {
                let active = s
                    .active_candidate_id
                    .as_ref()
                    .and_then(|id| s.candidates.get(id))
                    .filter(|c| unfinished(c));
                active
                    .or_else(|| {
                        s.candidates
                            .values()
                            .filter(|c| unfinished(c))
                            .max_by_key(|c| c.updated_at)
                    })
                    .cloned()
            })
            .await
    }

    /// Interviewer overview, best scores first.
    pub async fn dashboard(&self, search: Option<&str>) -> Vec<DashboardRow> {
        self.store.read(|s| dashboard_rows(s, search)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::Semaphore;

    use crate::persistence::InMemoryRepository;
    use crate::questions::builtin_questions;
    use crate::session::{AppSnapshot, Difficulty, IdentityField, NextStep, Question};

    fn identity() -> IdentityFields {
        IdentityFields::default()
            .with(IdentityField::Name, "Linus")
            .with(IdentityField::Email, "linus@kernel.org")
            .with(IdentityField::Phone, "+358 401234567")
    }

    fn service() -> Arc<InterviewService> {
        Arc::new(InterviewService::new(SessionStore::in_memory()))
    }

    /// Blocks generation until released, counting calls.
    struct GatedSource {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl QuestionSource for GatedSource {
        async fn generate(&self, _name: Option<&str>) -> Result<Vec<Question>, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            Ok(builtin_questions())
        }
    }

    /// Scores only when released.
    struct GatedScorer {
        gate: Semaphore,
        score: u8,
    }

    impl GatedScorer {
        fn new(score: u8) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                score,
            })
        }
    }

    #[async_trait]
    impl ScoringOracle for GatedScorer {
        async fn score(&self, _answer: &str, _difficulty: Difficulty) -> Result<u8, SessionError> {
            self.gate.acquire().await.unwrap().forget();
            Ok(self.score)
        }
    }

    async fn started(service: &Arc<InterviewService>) -> String {
        let id = service.create(identity()).await;
        service.start(&id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn create_makes_candidate_active() {
        let service = service();
        let id = service.create(IdentityFields::default()).await;
        let active = service.active_candidate().await.unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.status, Status::CollectingInfo);
    }

    #[tokio::test]
    async fn start_rejected_until_identity_complete() {
        let service = service();
        let id = service
            .create(IdentityFields::default().with(IdentityField::Name, "Linus"))
            .await;
        let err = service.start(&id).await.unwrap_err();
        assert!(err.is_user_facing());
        assert_eq!(service.candidate(&id).await.unwrap().status, Status::CollectingInfo);

        service.upsert_identity_fields(&id, identity()).await.unwrap();
        service.start(&id).await.unwrap();
        let c = service.candidate(&id).await.unwrap();
        assert_eq!(c.status, Status::InProgress);
        assert_eq!(c.questions.len(), 6);
    }

    #[tokio::test]
    async fn unknown_candidate_operations_are_not_found() {
        let service = service();
        let err = service
            .upsert_identity_fields("ghost", identity())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = service
            .append_message("ghost", Role::User, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CandidateNotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn concurrent_start_is_single_flight_and_keeps_updates() {
        let source = GatedSource::new();
        let service = Arc::new(
            InterviewService::new(SessionStore::in_memory()).with_question_source(source.clone()),
        );
        let id = service.create(identity()).await;

        let first = tokio::spawn({
            let service = service.clone();
            let id = id.clone();
            async move { service.start(&id).await }
        });
        while !service.start_pending(&id) {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            service.candidate(&id).await.unwrap().status,
            Status::CollectingInfo
        );
        service
            .upsert_identity_fields(
                &id,
                IdentityFields::default().with(IdentityField::Email, "torvalds@kernel.org"),
            )
            .await
            .unwrap();
        assert!(matches!(
            service.start(&id).await,
            Err(SessionError::StartPending(_))
        ));

        source.gate.add_permits(1);
        first.await.unwrap().unwrap();

        let c = service.candidate(&id).await.unwrap();
        assert_eq!(c.status, Status::InProgress);
        assert_eq!(c.identity.email.as_deref(), Some("torvalds@kernel.org"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!service.start_pending(&id));
    }

    #[tokio::test]
    async fn reset_during_generation_discards_start() {
        let source = GatedSource::new();
        let service = Arc::new(
            InterviewService::new(SessionStore::in_memory()).with_question_source(source.clone()),
        );
        let id = service.create(identity()).await;
        let pending = tokio::spawn({
            let service = service.clone();
            let id = id.clone();
            async move { service.start(&id).await }
        });
        while !service.start_pending(&id) {
            tokio::task::yield_now().await;
        }
        service.reset_all().await;
        source.gate.add_permits(1);

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(service.active_candidate().await.is_none());
    }

    #[tokio::test]
    async fn full_interview_then_idempotent_finalize() {
        let service = service();
        let id = started(&service).await;

        for i in 0..6 {
            let submission = service
                .submit_answer(&id, &format!("answer {i} ").repeat(10), false, 4)
                .await
                .unwrap();
            submission.refinement.await.unwrap().unwrap();
            match submission.receipt.next {
                NextStep::Advance => {
                    service.advance(&id).await.unwrap();
                }
                NextStep::Finalize => {
                    let c = service.candidate(&id).await.unwrap();
                    assert_eq!(c.answers.len(), 6);
                    assert_eq!(c.current_question_index, 5);
                }
            }
        }

        let first = service.finalize(&id).await.unwrap();
        let after_first = service.candidate(&id).await.unwrap();
        let second = service.finalize(&id).await.unwrap();
        let after_second = service.candidate(&id).await.unwrap();

        assert!(matches!(first, Finalized::Completed { .. }));
        assert!(matches!(second, Finalized::AlreadyCompleted { .. }));
        assert_eq!(first.final_score(), second.final_score());
        assert_eq!(after_first.summary, after_second.summary);
        assert_eq!(after_first.transcript.len(), after_second.transcript.len());
        assert_eq!(after_first.final_score, Some(after_first.total_score()));
    }

    #[tokio::test]
    async fn late_refinement_lands_on_its_own_answer() {
        let scorer = GatedScorer::new(9);
        let service = Arc::new(
            InterviewService::new(SessionStore::in_memory()).with_scorer(scorer.clone()),
        );
        let id = started(&service).await;

        let first = service.submit_answer(&id, "tiny", false, 3).await.unwrap();
        service.advance(&id).await.unwrap();
        service.pause(&id, 15).await.unwrap();

        scorer.gate.add_permits(1);
        assert_eq!(first.refinement.await.unwrap().unwrap(), 9);

        let c = service.candidate(&id).await.unwrap();
        assert_eq!(c.answers.len(), 1);
        assert_eq!(c.answers[0].question_id, first.receipt.question_id);
        assert_eq!(c.answers[0].score, 9);
        assert_eq!(c.status, Status::Paused);
        assert_eq!(c.current_question_index, 1);
    }

    #[tokio::test]
    async fn refinement_after_finalize_never_changes_final_score() {
        let scorer = GatedScorer::new(10);
        let service = Arc::new(
            InterviewService::new(SessionStore::in_memory()).with_scorer(scorer.clone()),
        );
        let id = started(&service).await;

        let submission = service.submit_answer(&id, "short", false, 2).await.unwrap();
        let finalized = service.finalize(&id).await.unwrap();
        let before = service.candidate(&id).await.unwrap();

        scorer.gate.add_permits(1);
        let refined = submission.refinement.await.unwrap();
        assert!(refined.is_err());

        let after = service.candidate(&id).await.unwrap();
        assert_eq!(after.final_score, Some(finalized.final_score()));
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn refinement_after_reset_is_discarded() {
        let scorer = GatedScorer::new(7);
        let service = Arc::new(
            InterviewService::new(SessionStore::in_memory()).with_scorer(scorer.clone()),
        );
        let id = started(&service).await;
        let submission = service.submit_answer(&id, "answer", false, 2).await.unwrap();
        service.reset_all().await;

        scorer.gate.add_permits(1);
        let err = submission.refinement.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn out_of_order_refinements_touch_only_their_answer() {
        let slow = GatedScorer::new(6);
        let service = Arc::new(
            InterviewService::new(SessionStore::in_memory()).with_scorer(slow.clone()),
        );
        let id = started(&service).await;

        let a = service.submit_answer(&id, "first answer", false, 2).await.unwrap();
        service.advance(&id).await.unwrap();
        let b = service.submit_answer(&id, "second answer", false, 2).await.unwrap();

        slow.gate.add_permits(2);
        let (ra, rb) = (a.refinement.await.unwrap(), b.refinement.await.unwrap());
        assert_eq!(ra.unwrap(), 6);
        assert_eq!(rb.unwrap(), 6);

        let c = service.candidate(&id).await.unwrap();
        assert_eq!(c.answers.len(), 2);
        assert!(c.answers.iter().all(|a| a.score == 6));
        let judged = c
            .transcript
            .iter()
            .filter(|m| m.content == "Judged: 6/10")
            .count();
        assert_eq!(judged, 2);
    }

    #[tokio::test]
    async fn suspend_active_pauses_with_exact_remaining() {
        let service = service();
        let id = started(&service).await;
        let c = service.candidate(&id).await.unwrap();
        let start = c.current_question_start_ts.unwrap();

        let at = start + ChronoDuration::milliseconds(7_400);
        let remaining = service.suspend_active(at).await.unwrap();
        assert_eq!(remaining, Some(13));

        let paused = service.candidate(&id).await.unwrap();
        assert_eq!(paused.status, Status::Paused);
        assert_eq!(paused.remaining_seconds, Some(13));

        assert_eq!(service.suspend_active(Utc::now()).await.unwrap(), None);
        assert_eq!(service.resume(&id).await.unwrap(), 13);
        assert_eq!(
            service.unfinished_candidate().await.map(|c| c.id),
            Some(id.clone())
        );
    }

    #[tokio::test]
    async fn loaded_session_without_start_instant_keeps_its_clock() {
        let snapshot: AppSnapshot = serde_json::from_str(
            r#"{"active_candidate_id": "c1", "candidates": {"c1": {
                "status": "in_progress",
                "identity": {"name": "Grace"},
                "current_question_index": 0,
                "questions": [{"id": "q1", "text": "Explain props.", "difficulty": "medium", "time_limit_seconds": 60}]
            }}}"#,
        )
        .unwrap();
        let repo = Arc::new(InMemoryRepository::with_snapshot(snapshot));
        let service = InterviewService::new(SessionStore::open(repo).await.unwrap());

        let c = service.candidate("c1").await.unwrap();
        let start = c.current_question_start_ts.unwrap();
        assert_eq!(c.read_timer(start).unwrap().remaining_seconds, 60);

        let remaining = service
            .suspend_active(start + ChronoDuration::seconds(5))
            .await
            .unwrap();
        assert_eq!(remaining, Some(55));
        assert_eq!(service.resume("c1").await.unwrap(), 55);
    }

    #[tokio::test]
    async fn set_active_requires_known_candidate() {
        let service = service();
        let id = service.create(IdentityFields::default()).await;
        assert!(service.set_active(Some("ghost")).await.is_err());
        service.set_active(None).await.unwrap();
        assert!(service.active_candidate().await.is_none());
        service.set_active(Some(&id)).await.unwrap();
        assert_eq!(service.active_candidate().await.unwrap().id, id);
    }
}
