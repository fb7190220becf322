//! Interview sessions: the candidate record, its lifecycle transitions, the
//! per-question timer, and the store and service that serialize access to them.

mod candidate;
mod machine;
mod service;
mod store;
mod timer;

pub use candidate::{
    AnswerRecord, AppSnapshot, Candidate, ChatMessage, Difficulty, IdentityField, IdentityFields,
    Question, Role, SNAPSHOT_VERSION, Status,
};
pub use machine::{
    ACK_MESSAGE, AnswerReceipt, Finalized, INTRO_MESSAGE, NO_ANSWER, NextStep, StateMachine,
};
pub use service::{DEFAULT_GENERATION_TIMEOUT, InterviewService, Submission};
pub use store::SessionStore;
pub use timer::{TimerReading, read_timer};
