//! Question set generation.
//!
//! A [`QuestionSource`] produces the six interview questions. When a chat model
//! is configured, [`LlmQuestionSource`] asks it for a JSON array; anything that
//! does not yield exactly two easy, two medium and two hard questions (or that
//! takes too long) falls back to [`builtin_questions`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Collaborator, SessionError};
use crate::openai::{ChatSender, ChatSettings, ask};
use crate::session::{Difficulty, Question};

/// Questions per interview.
pub const QUESTION_COUNT: usize = 6;
/// Questions of each difficulty per interview.
pub const PER_DIFFICULTY: usize = 2;

const GENERATION_SYSTEM_PROMPT: &str = "You generate concise technical interview questions.";

const BUILTIN: [(&str, Difficulty); QUESTION_COUNT] = [
    ("What is the virtual DOM and why is it useful in React?", Difficulty::Easy),
    ("Explain state vs props with a simple example.", Difficulty::Easy),
    ("Design a REST API for tasks in Node/Express. What routes?", Difficulty::Medium),
    ("How do you handle performance issues in large React lists?", Difficulty::Medium),
    ("Describe Node.js event loop: macrotasks vs microtasks with examples.", Difficulty::Hard),
    ("How would you implement JWT auth with refresh tokens and RBAC?", Difficulty::Hard),
];

/// Produces the question set for one candidate.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn generate(&self, candidate_name: Option<&str>) -> Result<Vec<Question>, SessionError>;
}

/// The fixed set, in fixed order, with fresh ids per call.
pub fn builtin_questions() -> Vec<Question> {
    BUILTIN
        .iter()
        .map(|(text, difficulty)| Question::new(*text, *difficulty))
        .collect()
}

/// Always serves [`builtin_questions`].
pub struct BuiltinQuestions;

#[async_trait]
impl QuestionSource for BuiltinQuestions {
    async fn generate(&self, _candidate_name: Option<&str>) -> Result<Vec<Question>, SessionError> {
        Ok(builtin_questions())
    }
}

/// Raw item from the model's JSON reply.
#[derive(Debug, Deserialize)]
struct LlmQuestion {
    text: String,
    difficulty: Difficulty,
}

/// Generates full-stack questions with a chat model.
pub struct LlmQuestionSource {
    sender: Arc<dyn ChatSender>,
    settings: ChatSettings,
}

impl LlmQuestionSource {
    pub fn new(sender: Arc<dyn ChatSender>, settings: ChatSettings) -> Self {
        Self { sender, settings }
    }
}

#[async_trait]
impl QuestionSource for LlmQuestionSource {
    async fn generate(&self, candidate_name: Option<&str>) -> Result<Vec<Question>, SessionError> {
        let prompt = format!(
            "Create {QUESTION_COUNT} full-stack (React/Node) questions: {PER_DIFFICULTY} easy, \
             {PER_DIFFICULTY} medium, {PER_DIFFICULTY} hard. Output as JSON array of \
             {{text, difficulty}} with difficulty in [easy, medium, hard]. Keep questions short. \
             Candidate: {}.",
            candidate_name.unwrap_or("N/A")
        );
        let text = ask(
            self.sender.as_ref(),
            &self.settings,
            GENERATION_SYSTEM_PROMPT,
            prompt,
        )
        .await
        .map_err(|e| SessionError::unavailable(Collaborator::Generation, e.to_string()))?;

        parse_questions(&text)
    }
}

/// Parses the model reply, tolerating a surrounding markdown code fence.
pub fn parse_questions(text: &str) -> Result<Vec<Question>, SessionError> {
    let raw: Vec<LlmQuestion> = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        SessionError::unavailable(Collaborator::Generation, format!("invalid question JSON: {e}"))
    })?;
    let questions: Vec<Question> = raw
        .into_iter()
        .take(QUESTION_COUNT)
        .filter(|q| !q.text.trim().is_empty())
        .map(|q| Question::new(q.text.trim(), q.difficulty))
        .collect();
    validate_question_set(&questions)?;
    Ok(questions)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening fence line.
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Checks the 6-question, 2/2/2 distribution and the per-difficulty time limits.
pub fn validate_question_set(questions: &[Question]) -> Result<(), SessionError> {
    if questions.len() != QUESTION_COUNT {
        return Err(SessionError::unavailable(
            Collaborator::Generation,
            format!("expected {QUESTION_COUNT} questions, got {}", questions.len()),
        ));
    }
    for difficulty in Difficulty::ALL {
        let count = questions.iter().filter(|q| q.difficulty == difficulty).count();
        if count != PER_DIFFICULTY {
            return Err(SessionError::unavailable(
                Collaborator::Generation,
                format!("expected {PER_DIFFICULTY} {difficulty} questions, got {count}"),
            ));
        }
    }
    if let Some(bad) = questions
        .iter()
        .find(|q| q.time_limit_seconds != q.difficulty.time_limit_seconds())
    {
        return Err(SessionError::unavailable(
            Collaborator::Generation,
            format!("question {} has a {}s limit", bad.id, bad.time_limit_seconds),
        ));
    }
    Ok(())
}

/// Asks `source` for a question set, degrading to the built-in set on error,
/// invalid output, or when `timeout` elapses.
pub async fn generate_or_fallback(
    source: &dyn QuestionSource,
    candidate_name: Option<&str>,
    timeout: Duration,
) -> Vec<Question> {
    let outcome = tokio::time::timeout(timeout, source.generate(candidate_name)).await;
    let generated = match outcome {
        Ok(Ok(questions)) => validate_question_set(&questions).map(|()| questions),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SessionError::unavailable(
            Collaborator::Generation,
            format!("no reply within {}s", timeout.as_secs()),
        )),
    };
    match generated {
        Ok(questions) => questions,
        Err(e) => {
            warn!(error = %e, "question generation failed, using built-in set");
            builtin_questions()
        }
    }
}
