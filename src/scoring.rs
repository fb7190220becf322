//! Answer scoring.
//!
//! [`heuristic_score`] is pure and always available; it provides the
//! provisional score on every submission. A [`ScoringOracle`] may later refine
//! it, and [`refine_score`] falls back to the heuristic whenever the oracle is
//! absent, fails, or answers with something that is not a number.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Collaborator, SessionError};
use crate::openai::{ChatSender, ChatSettings, ask};
use crate::session::Difficulty;

const SHORT_ANSWER_CHARS: usize = 10;
const CHARS_PER_POINT: usize = 60;
const MAX_LENGTH_POINTS: usize = 6;

const SCORING_SYSTEM_PROMPT: &str = "Score answers from 0-10 considering correctness, clarity, and depth. Respond ONLY with a number.";

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)?").expect("invalid score pattern")
});

/// Deterministic length-and-difficulty score in `2..=10`.
///
/// Trimmed answers shorter than ten characters always score 2. Otherwise one
/// point per sixty characters (at most six) plus 0/1/2 for easy/medium/hard.
pub fn heuristic_score(answer: &str, difficulty: Difficulty) -> u8 {
    let len = answer.trim().chars().count();
    if len < SHORT_ANSWER_CHARS {
        return 2;
    }
    let length_points = (len / CHARS_PER_POINT).min(MAX_LENGTH_POINTS) as u8;
    let bonus = match difficulty {
        Difficulty::Easy => 0,
        Difficulty::Medium => 1,
        Difficulty::Hard => 2,
    };
    (2 + length_points + bonus).min(10)
}

/// External scorer. Any error is treated as "unavailable".
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score(&self, answer: &str, difficulty: Difficulty) -> Result<u8, SessionError>;
}

/// Scores answers with a chat model.
pub struct LlmScorer {
    sender: Arc<dyn ChatSender>,
    settings: ChatSettings,
}

impl LlmScorer {
    pub fn new(sender: Arc<dyn ChatSender>, settings: ChatSettings) -> Self {
        Self { sender, settings }
    }
}

#[async_trait]
impl ScoringOracle for LlmScorer {
    async fn score(&self, answer: &str, difficulty: Difficulty) -> Result<u8, SessionError> {
        let text = ask(
            self.sender.as_ref(),
            &self.settings,
            SCORING_SYSTEM_PROMPT,
            format!("Difficulty: {difficulty}. Answer: {answer}"),
        )
        .await
        .map_err(|e| SessionError::unavailable(Collaborator::Scoring, e.to_string()))?;

        parse_score(&text).ok_or_else(|| {
            SessionError::unavailable(Collaborator::Scoring, format!("unparseable score: {text:?}"))
        })
    }
}

/// Extracts the first number in `text`, rounded and clamped to `0..=10`.
pub fn parse_score(text: &str) -> Option<u8> {
    let found = NUMBER.find(text)?;
    let value: f64 = found.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 10.0) as u8)
}

/// The oracle's score when it delivers one, the heuristic otherwise.
pub async fn refine_score(
    oracle: Option<&dyn ScoringOracle>,
    answer: &str,
    difficulty: Difficulty,
) -> u8 {
    let Some(oracle) = oracle else {
        debug!("no scoring oracle configured, using heuristic");
        return heuristic_score(answer, difficulty);
    };
    match oracle.score(answer, difficulty).await {
        Ok(score) => score.min(10),
        Err(e) => {
            warn!(error = %e, "scoring oracle failed, using heuristic");
            heuristic_score(answer, difficulty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::mock::MockSender;

    fn settings() -> ChatSettings {
        ChatSettings {
            model: "gpt-4o-mini".into(),
            temperature: 0.3,
        }
    }

    #[test]
    fn short_answers_score_two_regardless_of_difficulty() {
        for difficulty in Difficulty::ALL {
            assert_eq!(heuristic_score("", difficulty), 2);
            assert_eq!(heuristic_score("   yes   ", difficulty), 2);
            assert_eq!(heuristic_score("123456789", difficulty), 2);
        }
    }

    #[test]
    fn length_and_difficulty_points() {
        let ten = "a".repeat(10);
        assert_eq!(heuristic_score(&ten, Difficulty::Easy), 2);
        assert_eq!(heuristic_score(&ten, Difficulty::Medium), 3);
        assert_eq!(heuristic_score(&ten, Difficulty::Hard), 4);

        let long = "a".repeat(125);
        assert_eq!(heuristic_score(&long, Difficulty::Easy), 4);
        assert_eq!(heuristic_score(&long, Difficulty::Hard), 6);
    }

    #[test]
    fn score_is_capped_at_ten() {
        let essay = "word ".repeat(400);
        assert_eq!(heuristic_score(&essay, Difficulty::Easy), 8);
        assert_eq!(heuristic_score(&essay, Difficulty::Medium), 9);
        assert_eq!(heuristic_score(&essay, Difficulty::Hard), 10);
    }

    #[test]
    fn monotonic_in_length_and_difficulty() {
        for difficulty in Difficulty::ALL {
            let mut previous = 0;
            for len in 0..600 {
                let score = heuristic_score(&"x".repeat(len), difficulty);
                assert!(score >= previous, "dropped at len {len} for {difficulty}");
                assert!(score <= 10);
                previous = score;
            }
        }
        for len in [0, 9, 10, 59, 60, 200, 420, 1000] {
            let answer = "y".repeat(len);
            let easy = heuristic_score(&answer, Difficulty::Easy);
            let medium = heuristic_score(&answer, Difficulty::Medium);
            let hard = heuristic_score(&answer, Difficulty::Hard);
            assert!(easy <= medium && medium <= hard, "len {len}");
        }
    }

    #[test]
    fn parse_score_variants() {
        assert_eq!(parse_score("7"), Some(7));
        assert_eq!(parse_score("Score: 8/10"), Some(8));
        assert_eq!(parse_score("6.6"), Some(7));
        assert_eq!(parse_score("42"), Some(10));
        assert_eq!(parse_score("no idea"), None);
    }

    #[tokio::test]
    async fn llm_scorer_parses_reply_and_sends_difficulty() {
        let sender = Arc::new(MockSender::ok("9"));
        let scorer = LlmScorer::new(sender.clone(), settings());
        assert_eq!(scorer.score("closures capture env", Difficulty::Hard).await.unwrap(), 9);
        let prompt = sender.last_user_prompt().unwrap();
        assert!(prompt.starts_with("Difficulty: hard. Answer: closures"));
        assert_eq!(sender.calls(), 1);
    }

    #[tokio::test]
    async fn llm_scorer_rejects_unparseable_reply() {
        let scorer = LlmScorer::new(Arc::new(MockSender::ok("excellent!")), settings());
        let err = scorer.score("answer", Difficulty::Easy).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CollaboratorUnavailable);
    }

    #[tokio::test]
    async fn refine_falls_back_to_heuristic() {
        let answer = "a".repeat(130);
        let failing = LlmScorer::new(Arc::new(MockSender::failing()), settings());
        assert_eq!(refine_score(Some(&failing as &dyn ScoringOracle), &answer, Difficulty::Medium).await, 5);
        assert_eq!(refine_score(None, &answer, Difficulty::Medium).await, 5);

        let working = LlmScorer::new(Arc::new(MockSender::ok("1")), settings());
        assert_eq!(refine_score(Some(&working as &dyn ScoringOracle), &answer, Difficulty::Medium).await, 1);
    }
}
