use thiserror::Error;

use crate::session::{IdentityField, Status};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing identity fields: {}", join_fields(.0))]
    MissingIdentity(Vec<IdentityField>),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: IdentityField, value: String },

    #[error("candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("no answer recorded for question {0}")]
    AnswerNotFound(String),

    #[error("cannot {action} while {status}")]
    InvalidTransition { action: &'static str, status: Status },

    #[error("question {0} has already been answered")]
    AlreadyAnswered(usize),

    #[error("question {0} has not been answered yet")]
    Unanswered(usize),

    #[error("no question follows index {0}")]
    NoNextQuestion(i32),

    #[error("interview start already in flight for {0}")]
    StartPending(String),

    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: Collaborator,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Groups every [`SessionError`] into how callers are expected to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing user input. Surfaced, state unchanged.
    Validation,
    /// Unknown candidate or answer. Silently ignored.
    NotFound,
    /// The operation's precondition does not hold in the current status.
    Rejected,
    /// An external collaborator failed; a local fallback applies.
    CollaboratorUnavailable,
    /// Durable storage failed. Logged, the in-memory session carries on.
    Storage,
}

/// External collaborators the interview flow depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Extraction,
    Generation,
    Scoring,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::Extraction => write!(f, "identity extraction"),
            Collaborator::Generation => write!(f, "question generation"),
            Collaborator::Scoring => write!(f, "scoring"),
        }
    }
}

impl SessionError {
    pub fn unavailable(collaborator: Collaborator, reason: impl Into<String>) -> Self {
        SessionError::Unavailable {
            collaborator,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::MissingIdentity(_) | SessionError::InvalidField { .. } => {
                ErrorKind::Validation
            }
            SessionError::CandidateNotFound(_) | SessionError::AnswerNotFound(_) => {
                ErrorKind::NotFound
            }
            SessionError::InvalidTransition { .. }
            | SessionError::AlreadyAnswered(_)
            | SessionError::Unanswered(_)
            | SessionError::NoNextQuestion(_)
            | SessionError::StartPending(_) => ErrorKind::Rejected,
            SessionError::Unavailable { .. } => ErrorKind::CollaboratorUnavailable,
            SessionError::Io(_) | SessionError::Json(_) => ErrorKind::Storage,
        }
    }

    /// Whether the presentation layer should show this error to the candidate.
    pub fn is_user_facing(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

fn join_fields(fields: &[IdentityField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
