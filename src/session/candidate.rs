use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version written into every persisted [`AppSnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Question difficulty. Drives both the time limit and the heuristic bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Seconds allotted to a question of this difficulty.
    pub fn time_limit_seconds(self) -> u32 {
        match self {
            Difficulty::Easy => 20,
            Difficulty::Medium => 60,
            Difficulty::Hard => 120,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Lifecycle status of a candidate's interview.
///
/// `CollectingInfo → InProgress ⇄ Paused → Completed`, with `Completed` terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    CollectingInfo,
    InProgress,
    Paused,
    Completed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::CollectingInfo => write!(f, "collecting_info"),
            Status::InProgress => write!(f, "in_progress"),
            Status::Paused => write!(f, "paused"),
            Status::Completed => write!(f, "completed"),
        }
    }
}

/// One of the three identity fields required before an interview can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityField {
    Name,
    Email,
    Phone,
}

impl IdentityField {
    /// Collection order used by the conversational intake.
    pub const ALL: [IdentityField; 3] = [
        IdentityField::Name,
        IdentityField::Email,
        IdentityField::Phone,
    ];
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityField::Name => write!(f, "name"),
            IdentityField::Email => write!(f, "email"),
            IdentityField::Phone => write!(f, "phone"),
        }
    }
}

/// Partially known candidate identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl IdentityFields {
    pub fn with(mut self, field: IdentityField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the field's value; blank values count as absent.
    pub fn get(&self, field: IdentityField) -> Option<&str> {
        let value = match field {
            IdentityField::Name => self.name.as_deref(),
            IdentityField::Email => self.email.as_deref(),
            IdentityField::Phone => self.phone.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, field: IdentityField, value: impl Into<String>) {
        let slot = match field {
            IdentityField::Name => &mut self.name,
            IdentityField::Email => &mut self.email,
            IdentityField::Phone => &mut self.phone,
        };
        *slot = Some(value.into());
    }

    /// Overwrites only the keys present in `other`.
    pub fn merge(&mut self, other: IdentityFields) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
        if other.phone.is_some() {
            self.phone = other.phone;
        }
    }

    pub fn missing(&self) -> Vec<IdentityField> {
        IdentityField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub difficulty: Difficulty,
    pub time_limit_seconds: u32,
}

impl Question {
    /// Builds a question with a fresh id and the difficulty's time limit.
    pub fn new(text: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            difficulty,
            time_limit_seconds: difficulty.time_limit_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer: String,
    pub time_taken_seconds: u32,
    pub auto_submitted: bool,
    /// 0-10. Provisional until the scoring oracle refines it.
    pub score: u8,
}

/// One interview instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub identity: IdentityFields,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub transcript: Vec<ChatMessage>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
    /// `-1` until the interview starts.
    #[serde(default = "not_started")]
    pub current_question_index: i32,
    #[serde(default)]
    pub current_question_start_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remaining_seconds: Option<u32>,
    #[serde(default)]
    pub final_score: Option<u32>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn not_started() -> i32 {
    -1
}

impl Candidate {
    pub fn new(identity: IdentityFields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identity,
            status: Status::CollectingInfo,
            transcript: Vec::new(),
            questions: Vec::new(),
            answers: Vec::new(),
            current_question_index: not_started(),
            current_question_start_ts: None,
            remaining_seconds: None,
            final_score: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        usize::try_from(self.current_question_index).ok()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_index().and_then(|i| self.questions.get(i))
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// True when the current question already has its [`AnswerRecord`].
    pub fn current_answered(&self) -> bool {
        self.current_index()
            .is_some_and(|i| self.answers.len() > i)
    }

    pub fn is_last_question(&self) -> bool {
        self.current_index()
            .is_some_and(|i| i + 1 >= self.questions.len())
    }

    /// Upper bound for the final score: ten points per question.
    pub fn max_score(&self) -> u32 {
        self.questions.len() as u32 * 10
    }

    pub fn total_score(&self) -> u32 {
        self.answers.iter().map(|a| u32::from(a.score)).sum()
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>, now: DateTime<Utc>) {
        self.transcript.push(ChatMessage::new(role, content, now));
        self.updated_at = now;
    }
}

/// Everything the session store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSnapshot {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub active_candidate_id: Option<String>,
    #[serde(default)]
    pub candidates: HashMap<String, Candidate>,
}

fn current_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for AppSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            active_candidate_id: None,
            candidates: HashMap::new(),
        }
    }
}

impl AppSnapshot {
    /// Repairs what older or hand-edited payloads may leave inconsistent.
    ///
    /// A running question without a start instant is re-armed at `now` with
    /// its stored remaining time, or the full limit when that is missing too.
    pub fn normalize(&mut self, now: DateTime<Utc>) {
        for (id, candidate) in self.candidates.iter_mut() {
            if candidate.id.is_empty() {
                candidate.id = id.clone();
            }
            if candidate.status == Status::InProgress
                && candidate.current_question_start_ts.is_none()
                && !candidate.current_answered()
            {
                if let Some(baseline) = candidate.timer_baseline() {
                    candidate.remaining_seconds = Some(baseline);
                    candidate.current_question_start_ts = Some(now);
                }
            }
        }
        if let Some(active) = &self.active_candidate_id {
            if !self.candidates.contains_key(active) {
                self.active_candidate_id = None;
            }
        }
        self.version = SNAPSHOT_VERSION;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_creation_defaults() {
        let c = Candidate::new(IdentityFields::default(), Utc::now());
        assert_eq!(c.status, Status::CollectingInfo);
        assert_eq!(c.current_question_index, -1);
        assert!(c.current_question().is_none());
        assert!(c.transcript.is_empty());
        assert!(c.questions.is_empty());
        assert!(c.final_score.is_none());
    }

    #[test]
    fn merge_overwrites_matching_keys_only() {
        let mut fields = IdentityFields::default()
            .with(IdentityField::Name, "Ada")
            .with(IdentityField::Email, "ada@example.com");
        fields.merge(IdentityFields {
            email: Some("ada@lovelace.dev".into()),
            ..Default::default()
        });
        assert_eq!(fields.get(IdentityField::Name), Some("Ada"));
        assert_eq!(fields.get(IdentityField::Email), Some("ada@lovelace.dev"));
        assert_eq!(fields.missing(), vec![IdentityField::Phone]);
    }

    #[test]
    fn blank_values_count_as_missing() {
        let fields = IdentityFields::default()
            .with(IdentityField::Name, "   ")
            .with(IdentityField::Email, "a@b.co")
            .with(IdentityField::Phone, "5551234567");
        assert!(!fields.is_complete());
        assert_eq!(fields.missing(), vec![IdentityField::Name]);
    }

    #[test]
    fn time_limits_follow_difficulty() {
        assert_eq!(Question::new("q", Difficulty::Easy).time_limit_seconds, 20);
        assert_eq!(Question::new("q", Difficulty::Medium).time_limit_seconds, 60);
        assert_eq!(Question::new("q", Difficulty::Hard).time_limit_seconds, 120);
    }

    #[test]
    fn candidate_loads_with_missing_fields() {
        let json = r#"{"id": "c1", "identity": {"name": "Ada"}, "unknown_field": 3}"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, "c1");
        assert_eq!(c.status, Status::CollectingInfo);
        assert_eq!(c.current_question_index, -1);
        assert!(c.answers.is_empty());
    }

    #[test]
    fn snapshot_normalize_fills_ids_and_drops_dangling_active() {
        let mut snapshot: AppSnapshot = serde_json::from_str(
            r#"{"active_candidate_id": "gone", "candidates": {"k1": {"status": "paused"}}}"#,
        )
        .unwrap();
        snapshot.normalize(Utc::now());
        assert_eq!(snapshot.candidates["k1"].id, "k1");
        assert_eq!(snapshot.candidates["k1"].status, Status::Paused);
        assert!(snapshot.active_candidate_id.is_none());
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn snapshot_normalize_rearms_running_question_without_start() {
        let mut snapshot: AppSnapshot = serde_json::from_str(
            r#"{"candidates": {"k1": {
                "status": "in_progress",
                "current_question_index": 0,
                "questions": [{"id": "q1", "text": "What is JSX?", "difficulty": "easy", "time_limit_seconds": 20}]
            }}}"#,
        )
        .unwrap();
        let now = Utc::now();
        snapshot.normalize(now);
        let c = &snapshot.candidates["k1"];
        assert_eq!(c.current_question_start_ts, Some(now));
        assert_eq!(c.remaining_seconds, Some(20));
        assert_eq!(c.read_timer(now).unwrap().remaining_seconds, 20);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&Status::CollectingInfo).unwrap();
        assert_eq!(json, r#""collecting_info""#);
        assert_eq!(Status::InProgress.to_string(), "in_progress");
    }
}
