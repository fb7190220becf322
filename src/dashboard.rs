//! Interviewer overview of every candidate.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{AppSnapshot, Candidate, Status};

/// One line of the interviewer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: Status,
    /// Final score, or 0 while the interview is not completed.
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

impl DashboardRow {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let field = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            id: candidate.id.clone(),
            name: field(&candidate.identity.name, "Unknown"),
            email: field(&candidate.identity.email, "-"),
            phone: field(&candidate.identity.phone, "-"),
            status: candidate.status,
            score: candidate.final_score.unwrap_or_default(),
            created_at: candidate.created_at,
        }
    }

    /// Case-insensitive substring match over `"name email phone"`.
    pub fn matches(&self, search: &str) -> bool {
        let needle = search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        format!("{} {} {}", self.name, self.email, self.phone)
            .to_lowercase()
            .contains(&needle)
    }
}

/// Rows sorted by score descending, then newest first.
pub fn dashboard_rows(snapshot: &AppSnapshot, search: Option<&str>) -> Vec<DashboardRow> {
    let mut rows: Vec<DashboardRow> = snapshot
        .candidates
        .values()
        .map(DashboardRow::from_candidate)
        .filter(|row| search.is_none_or(|q| row.matches(q)))
        .collect();
    rows.sort_by_key(|row| (Reverse(row.score), Reverse(row.created_at)));
    rows
}
