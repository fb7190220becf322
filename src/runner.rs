//! Interactive interview loop for the candidate.
//!
//! The countdown is re-read from the stored start instant once per second, so
//! a stalled terminal only delays the reading. When it reaches zero the
//! current input is discarded and an empty answer is auto-submitted with the
//! timer baseline as time taken.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crispi::error::{ErrorKind, SessionError};
use crispi::intake::{self, IntakeStep};
use crispi::resume::{DocumentKind, extract_identity};
use crispi::session::{
    ACK_MESSAGE, Candidate, IdentityFields, InterviewService, NextStep, Status,
};

use crate::ui;

type Input = Lines<BufReader<Stdin>>;

/// How waiting on one question ended.
enum Waited {
    Answered(String),
    Expired { baseline_seconds: u32 },
    /// The stored candidate no longer has a running question.
    Stale,
    Interrupted,
    Closed,
}

pub struct Runner {
    service: Arc<InterviewService>,
    input: Input,
    refinements: Vec<JoinHandle<Result<u8, SessionError>>>,
}

impl Runner {
    pub fn new(service: Arc<InterviewService>) -> Self {
        Self {
            service,
            input: BufReader::new(tokio::io::stdin()).lines(),
            refinements: Vec::new(),
        }
    }

    /// Runs one interview from identity collection to the final summary,
    /// or resumes the unfinished one.
    pub async fn run(mut self, resume_file: Option<&Path>) -> Result<()> {
        ui::print_banner();

        let id = match resume_file {
            Some(path) => self.create_from_resume(path).await,
            None => match self.service.unfinished_candidate().await {
                Some(candidate) => {
                    ui::print_welcome_back(&candidate);
                    self.service.set_active(Some(&candidate.id)).await?;
                    ui::print_transcript_from(&candidate, 0);
                    candidate.id
                }
                None => self.collecting_or_new().await,
            },
        };

        let Some(candidate) = self.service.candidate(&id).await else {
            return Ok(());
        };
        if candidate.status == Status::CollectingInfo {
            if !self.collect_identity(&id).await? {
                return Ok(());
            }
            if !self.start(&id).await? {
                return Ok(());
            }
        }
        self.answer_questions(&id).await
    }

    async fn collecting_or_new(&self) -> String {
        if let Some(active) = self.service.active_candidate().await {
            if active.status == Status::CollectingInfo {
                ui::print_transcript_from(&active, 0);
                return active.id;
            }
        }
        self.service.create(IdentityFields::default()).await
    }

    /// The candidate exists before extraction so a failed parse still leaves
    /// it ready for conversational intake.
    async fn create_from_resume(&self, path: &Path) -> String {
        let id = self.service.create(IdentityFields::default()).await;
        match read_resume(path).await {
            Ok(fields) => {
                if let Err(e) = self.service.upsert_identity_fields(&id, fields).await {
                    debug!(error = %e, "could not store extracted fields");
                }
                ui::print_success("Resume parsed. Please confirm missing fields.");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "resume extraction failed");
                ui::print_warning("Could not auto-extract details. Please fill Name, Email, Phone.");
            }
        }
        id
    }

    /// Returns false if input closed before every field was known.
    async fn collect_identity(&mut self, id: &str) -> Result<bool> {
        let seen = self.transcript_len(id).await;
        let mut step = intake::begin_conversation(&self.service, id).await?;
        self.print_new_messages(id, seen).await;
        if step == IntakeStep::Complete {
            ui::print_info(intake::COMPLETE_MESSAGE);
        }

        while step != IntakeStep::Complete {
            let Some(line) = self.input.next_line().await? else {
                return Ok(false);
            };
            let seen = self.transcript_len(id).await;
            match intake::accept_field(&self.service, id, &line).await {
                Ok(next) => step = next,
                Err(e) if e.is_user_facing() => {
                    ui::print_error(&format!("Please enter a valid {}", field_of(&e)));
                }
                Err(e) => return Err(e.into()),
            }
            self.print_new_messages(id, seen + 1).await;
        }

        Ok(self.input.next_line().await?.is_some())
    }

    /// Returns false if the interview did not start.
    async fn start(&self, id: &str) -> Result<bool> {
        let seen = self.transcript_len(id).await;
        let spinner = ui::Spinner::start("Preparing your questions...");
        let started = self.service.start(id).await;
        spinner.finish();

        match started {
            Ok(()) => {
                self.print_new_messages(id, seen).await;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::Rejected || e.is_user_facing() => {
                ui::print_error(&e.to_string());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn answer_questions(&mut self, id: &str) -> Result<()> {
        let mut shutdown = Shutdown::listen().context("installing signal handlers")?;
        loop {
            let Some(candidate) = self.service.candidate(id).await else {
                return Ok(());
            };
            match candidate.status {
                Status::Completed => {
                    ui::print_summary(&candidate);
                    return Ok(());
                }
                Status::CollectingInfo => return Ok(()),
                Status::Paused => {
                    let baseline = self.service.resume(id).await?;
                    ui::print_info(&format!("Resuming with {baseline}s on the clock."));
                    continue;
                }
                Status::InProgress => {}
            }

            if candidate.current_answered() {
                self.settle(id, &candidate).await?;
                continue;
            }

            let (Some(index), Some(question)) =
                (candidate.current_index(), candidate.current_question().cloned())
            else {
                return Ok(());
            };
            ui::print_question(index, candidate.questions.len(), &question);
            let remaining = candidate
                .read_timer(Utc::now())
                .map(|r| r.remaining_seconds)
                .unwrap_or(question.time_limit_seconds);
            let progress = ui::QuestionProgress::start(&question, remaining);
            let waited = self.wait_for_answer(id, &progress, &mut shutdown).await;
            progress.finish();

            let (answer, auto_submitted, taken) = match waited? {
                Waited::Answered(answer) => {
                    let remaining = self
                        .service
                        .candidate(id)
                        .await
                        .and_then(|c| c.read_timer(Utc::now()))
                        .map(|r| r.remaining_seconds)
                        .unwrap_or_default();
                    (answer, false, question.time_limit_seconds.saturating_sub(remaining))
                }
                Waited::Expired { baseline_seconds } => {
                    ui::print_warning("Time is up, moving on.");
                    (String::new(), true, baseline_seconds)
                }
                Waited::Stale => continue,
                Waited::Interrupted | Waited::Closed => {
                    if let Some(remaining) = self.service.suspend_active(Utc::now()).await? {
                        println!();
                        ui::print_info(&format!(
                            "Interview paused with {remaining}s left. Run crispi again to continue."
                        ));
                    }
                    return Ok(());
                }
            };

            let submission = self
                .service
                .submit_answer(id, &answer, auto_submitted, taken)
                .await?;
            debug!(score = submission.receipt.provisional_score, "provisional score");
            ui::print_info(ACK_MESSAGE);
            self.refinements.push(submission.refinement);

            match submission.receipt.next {
                NextStep::Advance => {
                    self.service.advance(id).await?;
                }
                NextStep::Finalize => {
                    self.await_refinements().await;
                    self.service.finalize(id).await?;
                }
            }
        }
    }

    /// Lets in-flight scoring land before the total is taken.
    async fn await_refinements(&mut self) {
        if self.refinements.is_empty() {
            return;
        }
        let spinner = ui::Spinner::start("Scoring your answers...");
        for handle in self.refinements.drain(..) {
            match handle.await {
                Ok(Ok(score)) => debug!(score, "refined score applied"),
                Ok(Err(e)) => debug!(error = %e, "refined score discarded"),
                Err(e) => warn!(error = %e, "scoring task failed"),
            }
        }
        spinner.finish();
    }

    /// Completes the step left undone when a previous process stopped between
    /// recording an answer and moving on.
    async fn settle(&self, id: &str, candidate: &Candidate) -> Result<()> {
        if candidate.is_last_question() {
            self.service.finalize(id).await?;
        } else {
            self.service.advance(id).await?;
        }
        Ok(())
    }

    async fn wait_for_answer(
        &mut self,
        id: &str,
        progress: &ui::QuestionProgress,
        shutdown: &mut Shutdown,
    ) -> Result<Waited> {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reading = self
                        .service
                        .candidate(id)
                        .await
                        .and_then(|c| c.read_timer(Utc::now()));
                    let Some(reading) = reading else {
                        return Ok(Waited::Stale);
                    };
                    progress.tick(reading.remaining_seconds);
                    if reading.expired() {
                        return Ok(Waited::Expired {
                            baseline_seconds: reading.baseline_seconds,
                        });
                    }
                }
                line = self.input.next_line() => {
                    return Ok(match line.context("reading answer")? {
                        Some(answer) => Waited::Answered(answer),
                        None => Waited::Closed,
                    });
                }
                _ = shutdown.recv() => {
                    return Ok(Waited::Interrupted);
                }
            }
        }
    }

    async fn transcript_len(&self, id: &str) -> usize {
        self.service
            .candidate(id)
            .await
            .map(|c| c.transcript.len())
            .unwrap_or_default()
    }

    async fn print_new_messages(&self, id: &str, seen: usize) {
        if let Some(c) = self.service.candidate(id).await {
            ui::print_transcript_from(&c, seen);
        }
    }
}

/// Ctrl-C, plus SIGTERM and SIGHUP on unix, so a closed terminal or a
/// killed process still pauses the running question.
struct Shutdown {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl Shutdown {
    #[cfg(unix)]
    fn listen() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    fn listen() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = self.terminate.recv() => {}
            _ = self.hangup.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn read_resume(path: &Path) -> Result<IdentityFields> {
    let kind = DocumentKind::from_path(path)
        .context("invalid file, only PDF or DOCX supported")?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(extract_identity(&bytes, kind)?)
}

fn field_of(err: &SessionError) -> String {
    match err {
        SessionError::InvalidField { field, .. } => field.to_string(),
        _ => "value".to_string(),
    }
}
