use chrono::{DateTime, Utc};

use super::candidate::{AnswerRecord, Candidate, Difficulty, Question, Role, Status};
use crate::error::SessionError;
use crate::scoring::heuristic_score;

pub const INTRO_MESSAGE: &str = "Starting interview. You will get 6 questions with timers. Good luck!";
pub const ACK_MESSAGE: &str = "Answer received.";
pub const NO_ANSWER: &str = "(no answer)";

/// What the caller must do once an answer has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Advance,
    Finalize,
}

/// Result of recording an answer for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub question_id: String,
    pub difficulty: Difficulty,
    pub provisional_score: u8,
    pub next: NextStep,
}

/// Result of a finalize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    Completed { final_score: u32 },
    /// The candidate was already completed; nothing changed.
    AlreadyCompleted { final_score: u32 },
}

impl Finalized {
    pub fn final_score(&self) -> u32 {
        match self {
            Finalized::Completed { final_score } | Finalized::AlreadyCompleted { final_score } => {
                *final_score
            }
        }
    }
}

/// Transitions over a single [`Candidate`].
///
/// Every function checks its precondition before touching the record, so a
/// rejected transition leaves the candidate exactly as it was.
pub struct StateMachine;

impl StateMachine {
    /// Checks that `begin` would be accepted right now.
    pub fn check_startable(candidate: &Candidate) -> Result<(), SessionError> {
        if candidate.status != Status::CollectingInfo {
            return Err(SessionError::InvalidTransition {
                action: "start the interview",
                status: candidate.status,
            });
        }
        let missing = candidate.identity.missing();
        if !missing.is_empty() {
            return Err(SessionError::MissingIdentity(missing));
        }
        Ok(())
    }

    /// `collecting_info → in_progress` with the given question set.
    pub fn begin(
        candidate: &mut Candidate,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        Self::check_startable(candidate)?;
        let Some(first) = questions.first() else {
            return Err(SessionError::NoNextQuestion(-1));
        };
        let first_text = first.text.clone();
        let first_limit = first.time_limit_seconds;

        candidate.questions = questions;
        candidate.status = Status::InProgress;
        candidate.current_question_index = 0;
        candidate.current_question_start_ts = Some(now);
        candidate.remaining_seconds = Some(first_limit);
        candidate.push_message(Role::Assistant, INTRO_MESSAGE, now);
        candidate.push_message(Role::Assistant, first_text, now);
        Ok(())
    }

    /// Appends the [`AnswerRecord`] for the current question with a heuristic
    /// provisional score.
    pub fn record_answer(
        candidate: &mut Candidate,
        answer: &str,
        auto_submitted: bool,
        time_taken_seconds: u32,
        now: DateTime<Utc>,
    ) -> Result<AnswerReceipt, SessionError> {
        if candidate.status != Status::InProgress {
            return Err(SessionError::InvalidTransition {
                action: "submit an answer",
                status: candidate.status,
            });
        }
        let index = candidate
            .current_index()
            .ok_or(SessionError::NoNextQuestion(candidate.current_question_index))?;
        let question = candidate
            .questions
            .get(index)
            .cloned()
            .ok_or(SessionError::NoNextQuestion(candidate.current_question_index))?;
        if candidate.answers.len() != index {
            return Err(SessionError::AlreadyAnswered(index));
        }

        let provisional_score = heuristic_score(answer, question.difficulty);
        candidate.answers.push(AnswerRecord {
            question_id: question.id.clone(),
            answer: answer.to_string(),
            time_taken_seconds,
            auto_submitted,
            score: provisional_score,
        });

        let shown = if answer.trim().is_empty() { NO_ANSWER } else { answer };
        candidate.push_message(Role::User, shown, now);
        candidate.push_message(Role::Assistant, ACK_MESSAGE, now);

        let next = if candidate.is_last_question() {
            NextStep::Finalize
        } else {
            NextStep::Advance
        };
        Ok(AnswerReceipt {
            question_id: question.id,
            difficulty: question.difficulty,
            provisional_score,
            next,
        })
    }

    /// Moves to the next question and re-arms its timer. Returns the new index.
    pub fn advance(candidate: &mut Candidate, now: DateTime<Utc>) -> Result<usize, SessionError> {
        if candidate.status != Status::InProgress {
            return Err(SessionError::InvalidTransition {
                action: "advance",
                status: candidate.status,
            });
        }
        let index = candidate
            .current_index()
            .ok_or(SessionError::NoNextQuestion(candidate.current_question_index))?;
        let next_index = index + 1;
        let Some(next) = candidate.questions.get(next_index) else {
            return Err(SessionError::NoNextQuestion(candidate.current_question_index));
        };
        if !candidate.current_answered() {
            return Err(SessionError::Unanswered(index));
        }
        let text = next.text.clone();
        let limit = next.time_limit_seconds;

        candidate.current_question_index += 1;
        candidate.current_question_start_ts = Some(now);
        candidate.remaining_seconds = Some(limit);
        candidate.push_message(Role::Assistant, text, now);
        Ok(next_index)
    }

    /// Sums the recorded scores and completes the interview. Idempotent.
    pub fn finalize(candidate: &mut Candidate, now: DateTime<Utc>) -> Result<Finalized, SessionError> {
        match candidate.status {
            Status::Completed => {
                return Ok(Finalized::AlreadyCompleted {
                    final_score: candidate.final_score.unwrap_or_default(),
                });
            }
            Status::CollectingInfo => {
                return Err(SessionError::InvalidTransition {
                    action: "finalize",
                    status: candidate.status,
                });
            }
            Status::InProgress | Status::Paused => {}
        }

        let final_score = candidate.total_score();
        candidate.summary = Some(Self::summarize(candidate, final_score));
        candidate.final_score = Some(final_score);
        candidate.status = Status::Completed;
        candidate.current_question_start_ts = None;
        candidate.updated_at = now;
        Ok(Finalized::Completed { final_score })
    }

    /// `in_progress → paused`, keeping the exact remaining time as the resume baseline.
    pub fn pause(
        candidate: &mut Candidate,
        remaining_seconds: u32,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if candidate.status != Status::InProgress {
            return Err(SessionError::InvalidTransition {
                action: "pause",
                status: candidate.status,
            });
        }
        candidate.status = Status::Paused;
        candidate.remaining_seconds = Some(remaining_seconds);
        candidate.current_question_start_ts = None;
        candidate.updated_at = now;
        Ok(())
    }

    /// `paused → in_progress`. The timer restarts from the paused baseline,
    /// whatever the dormancy was. Returns that baseline.
    pub fn resume(candidate: &mut Candidate, now: DateTime<Utc>) -> Result<u32, SessionError> {
        if candidate.status != Status::Paused {
            return Err(SessionError::InvalidTransition {
                action: "resume",
                status: candidate.status,
            });
        }
        let baseline = candidate
            .timer_baseline()
            .ok_or(SessionError::NoNextQuestion(candidate.current_question_index))?;

        candidate.status = Status::InProgress;
        candidate.remaining_seconds = Some(baseline);
        candidate.current_question_start_ts = Some(now);
        candidate.updated_at = now;
        Ok(baseline)
    }

    /// Overwrites the score of the answer to `question_id` in place.
    ///
    /// Late results are dropped once the candidate is completed so the final
    /// score never moves after it has been computed.
    pub fn apply_refined_score(
        candidate: &mut Candidate,
        question_id: &str,
        score: u8,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if candidate.status == Status::Completed {
            return Err(SessionError::InvalidTransition {
                action: "refine a score",
                status: candidate.status,
            });
        }
        let record = candidate
            .answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
            .ok_or_else(|| SessionError::AnswerNotFound(question_id.to_string()))?;
        record.score = score.min(10);
        candidate.push_message(Role::Assistant, format!("Judged: {}/10", score.min(10)), now);
        Ok(())
    }

    /// Short textual verdict derived from the aggregate score.
    pub fn summarize(candidate: &Candidate, final_score: u32) -> String {
        let name = candidate
            .identity
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown");
        let strengths = if final_score > 40 {
            "Solid fundamentals"
        } else {
            "Basic understanding"
        };
        let improve = if final_score < 30 {
            "Depth in system design and performance"
        } else {
            "Advanced topics"
        };
        format!(
            "Candidate {name} scored {final_score}/{}. Strengths: {strengths}. Areas to improve: {improve}.",
            candidate.max_score()
        )
    }
}
