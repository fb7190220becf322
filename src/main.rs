mod cli;
mod runner;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use crispi::config::CrispiConfig;
use crispi::openai::{ChatSender, OpenAiClient};
use crispi::persistence::JsonFileRepository;
use crispi::questions::LlmQuestionSource;
use crispi::scoring::LlmScorer;
use crispi::session::{Candidate, Finalized, InterviewService, SessionStore};
use runner::Runner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = CrispiConfig::load()?;
    if let Some(state) = &cli.state {
        config.state_path = state.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    let service = Arc::new(build_service(&config).await?);

    match cli.command_or_default() {
        Command::Interview { resume } => Runner::new(service).run(resume.as_deref()).await,
        Command::List { search } => {
            ui::print_dashboard(&service.dashboard(search.as_deref()).await);
            Ok(())
        }
        Command::Show { id } => {
            let candidate = find_candidate(&service, &id).await?;
            ui::print_detail(&candidate);
            Ok(())
        }
        Command::Finalize { id } => {
            let candidate = find_candidate(&service, &id).await?;
            match service.finalize(&candidate.id).await? {
                Finalized::Completed { final_score } => {
                    ui::print_success(&format!("Finalized with {final_score} points."));
                }
                Finalized::AlreadyCompleted { final_score } => {
                    ui::print_info(&format!("Already completed with {final_score} points."));
                }
            }
            if let Some(updated) = service.candidate(&candidate.id).await {
                ui::print_detail(&updated);
            }
            Ok(())
        }
        Command::Reset => {
            let count = service.dashboard(None).await.len();
            service.reset_all().await;
            ui::print_success(&format!("Removed {count} session(s)."));
            Ok(())
        }
    }
}

/// Logs go to stderr so they never interleave with the interview on stdout.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn build_service(config: &CrispiConfig) -> Result<InterviewService> {
    let repo = Arc::new(JsonFileRepository::new(&config.state_path));
    let store = SessionStore::open(repo)
        .await
        .with_context(|| format!("opening {}", config.state_path.display()))?;
    let mut service =
        InterviewService::new(store).with_generation_timeout(config.generation_timeout());

    if config.has_api_key() {
        let client: Arc<dyn ChatSender> = Arc::new(OpenAiClient::with_base_url(
            config.api_key.clone(),
            config.base_url.clone(),
            config.request_timeout(),
        )?);
        service = service
            .with_question_source(Arc::new(LlmQuestionSource::new(
                client.clone(),
                config.chat_settings(),
            )))
            .with_scorer(Arc::new(LlmScorer::new(client, config.chat_settings())));
        info!(model = %config.model, "question generation and scoring by model enabled");
    } else {
        info!("no API key configured, using built-in questions and heuristic scoring");
    }
    Ok(service)
}

/// Looks a candidate up by full id or by a unique id prefix.
async fn find_candidate(service: &InterviewService, id: &str) -> Result<Candidate> {
    if let Some(candidate) = service.candidate(id).await {
        return Ok(candidate);
    }
    let matches: Vec<_> = service
        .dashboard(None)
        .await
        .into_iter()
        .filter(|row| row.id.starts_with(id))
        .collect();
    match matches.as_slice() {
        [row] => service
            .candidate(&row.id)
            .await
            .with_context(|| format!("candidate {} disappeared", row.id)),
        [] => bail!("no candidate matches {id}"),
        _ => bail!(
            "{id} matches {} candidates, use a longer id",
            matches.len()
        ),
    }
}
