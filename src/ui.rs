//! Terminal output: countdown bar, transcript lines and interviewer tables.
//!
//! `indicatif` draws the per-question countdown and the generation spinner,
//! `console` styles roles and statuses.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};

use crispi::dashboard::DashboardRow;
use crispi::session::{Candidate, ChatMessage, NO_ANSWER, Question, Role, Status};

/// Width of the short id shown in tables. `show` and `finalize` accept it.
pub const SHORT_ID: usize = 8;

/// Countdown for the running question. The bar empties as time runs out.
pub struct QuestionProgress {
    pb: ProgressBar,
}

impl QuestionProgress {
    pub fn start(question: &Question, remaining_seconds: u32) -> Self {
        let pb = ProgressBar::new(u64::from(question.time_limit_seconds));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:30.cyan/blue} {msg}")
                .expect("invalid template")
                .progress_chars("█░ "),
        );
        let progress = Self { pb };
        progress.tick(remaining_seconds);
        progress
    }

    pub fn tick(&self, remaining_seconds: u32) {
        self.pb.set_position(u64::from(remaining_seconds));
        let msg = format!("{remaining_seconds:>3}s left");
        if remaining_seconds <= 5 {
            self.pb.set_message(style(msg).red().bold().to_string());
        } else {
            self.pb.set_message(msg);
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Spinner shown while a question set is generated.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

pub fn print_banner() {
    println!("{}", style("crispi · technical interview").cyan().bold());
    println!(
        "{}",
        style("Answer each question before its timer runs out. Ctrl-C pauses the session.").dim()
    );
    println!();
}

pub fn print_message(message: &ChatMessage) {
    let (label, label_style) = match message.role {
        Role::Assistant => ("crispi", Style::new().cyan().bold()),
        Role::User => ("you", Style::new().green().bold()),
        Role::System => ("system", Style::new().dim()),
    };
    println!("{} {}", label_style.apply_to(format!("{label:>6} ›")), message.content);
}

/// Prints every transcript message after the first `skip`.
pub fn print_transcript_from(candidate: &Candidate, skip: usize) {
    for message in candidate.transcript.iter().skip(skip) {
        print_message(message);
    }
}

pub fn print_question(index: usize, total: usize, question: &Question) {
    println!();
    println!(
        "{} {}",
        style(format!("Question {}/{total}", index + 1)).bold(),
        style(format!(
            "[{}, {}s]",
            question.difficulty, question.time_limit_seconds
        ))
        .dim()
    );
    println!("  {}", question.text);
}

pub fn print_welcome_back(candidate: &Candidate) {
    println!("{}", style("Welcome back").yellow().bold());
    println!(
        "You have an unfinished session{}. Your progress and timers are restored.",
        candidate
            .identity
            .name
            .as_deref()
            .map(|n| format!(" for {n}"))
            .unwrap_or_default()
    );
    println!();
}

pub fn print_info(text: &str) {
    println!("  {} {text}", style("•").cyan());
}

pub fn print_success(text: &str) {
    println!("  {} {text}", style("✓").green().bold());
}

pub fn print_warning(text: &str) {
    println!("  {} {text}", style("!").yellow().bold());
}

pub fn print_error(text: &str) {
    println!("  {} {text}", style("✗").red().bold());
}

pub fn print_summary(candidate: &Candidate) {
    println!();
    println!("{}", style("─── Interview complete ───").green().bold());
    if let Some(score) = candidate.final_score {
        println!("  Final score: {score}/{}", candidate.max_score());
    }
    if let Some(summary) = &candidate.summary {
        println!("  {summary}");
    }
}

pub fn print_dashboard(rows: &[DashboardRow]) {
    if rows.is_empty() {
        println!("{}", style("No candidates yet.").dim());
        return;
    }
    println!("{}", style(dashboard_header()).bold());
    for row in rows {
        println!("{}", status_style(row.status).apply_to(dashboard_line(row)));
    }
}

pub fn print_detail(candidate: &Candidate) {
    for line in detail_lines(candidate) {
        println!("{line}");
    }
}

fn status_style(status: Status) -> Style {
    match status {
        Status::Completed => Style::new().green(),
        Status::InProgress => Style::new().yellow(),
        Status::Paused => Style::new().magenta(),
        Status::CollectingInfo => Style::new().dim(),
    }
}

pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID).unwrap_or(id)
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn dashboard_header() -> String {
    format!(
        "{:<8}  {:<22}  {:<28}  {:<16}  {:<15}  {:>5}  {}",
        "ID", "NAME", "EMAIL", "PHONE", "STATUS", "SCORE", "CREATED"
    )
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}

pub fn dashboard_line(row: &DashboardRow) -> String {
    format!(
        "{:<8}  {:<22}  {:<28}  {:<16}  {:<15}  {:>5}  {}",
        short_id(&row.id),
        truncate(&row.name, 22),
        truncate(&row.email, 28),
        truncate(&row.phone, 16),
        row.status.to_string(),
        row.score,
        local_time(row.created_at)
    )
}

/// Plain-text detail view: identity, every question with its answer, summary.
pub fn detail_lines(candidate: &Candidate) -> Vec<String> {
    let identity = &candidate.identity;
    let mut lines = vec![
        format!("Candidate {}", candidate.id),
        format!("  Name:   {}", identity.name.as_deref().unwrap_or("Unknown")),
        format!("  Email:  {}", identity.email.as_deref().unwrap_or("-")),
        format!("  Phone:  {}", identity.phone.as_deref().unwrap_or("-")),
        format!("  Status: {}", candidate.status),
    ];
    if let Some(score) = candidate.final_score {
        lines.push(format!("  Score:  {score}/{}", candidate.max_score()));
    }

    for (i, question) in candidate.questions.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!(
            "Q{} [{}] {}",
            i + 1,
            question.difficulty,
            question.text
        ));
        match candidate.answer_for(&question.id) {
            Some(answer) => {
                let text = if answer.answer.trim().is_empty() {
                    NO_ANSWER
                } else {
                    answer.answer.as_str()
                };
                lines.push(format!("  Answer: {text}"));
                lines.push(format!(
                    "  Score: {}/10 · Time: {}s{}",
                    answer.score,
                    answer.time_taken_seconds,
                    if answer.auto_submitted {
                        " · auto-submitted"
                    } else {
                        ""
                    }
                ));
            }
            None => lines.push(format!("  Answer: {NO_ANSWER}")),
        }
    }

    if let Some(summary) = &candidate.summary {
        lines.push(String::new());
        lines.push(format!("Summary: {summary}"));
    }
    lines
}
