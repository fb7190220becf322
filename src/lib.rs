//! Timed technical interview sessions.
//!
//! A candidate supplies name, email and phone, then answers six questions
//! (two easy, two medium, two hard) under per-question time limits. Answers get
//! a provisional heuristic score that a scoring model may refine later.
//! Sessions survive restarts and a paused timer resumes with exactly the time
//! it had left.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod intake;
pub mod openai;
pub mod persistence;
pub mod questions;
pub mod resume;
pub mod scoring;
pub mod session;
