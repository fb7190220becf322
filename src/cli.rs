//! Command-line interface built on clap.
//!
//! [`Cli`] carries the [`Command`] subcommands (interview, list, show,
//! finalize, reset) and the global flags (--state, --model, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Timed technical interviews in the terminal.
#[derive(Debug, Parser)]
#[command(name = "crispi", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Session file, overriding `state_path` from crispi.toml.
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Chat model, overriding `model` from crispi.toml.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Enables debug logging on stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Runs an interview as the candidate. This is the default.
    Interview {
        /// PDF or DOCX resume to prefill name, email and phone.
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Lists every candidate, best score first.
    List {
        /// Case-insensitive filter on name, email or phone.
        #[arg(long)]
        search: Option<String>,
    },

    /// Shows one candidate's answers, scores and summary.
    Show {
        id: String,
    },

    /// Completes a candidate's interview with the answers recorded so far.
    Finalize {
        id: String,
    },

    /// Deletes every stored session.
    Reset,
}

impl Cli {
    /// The subcommand to run, `interview` when none was given.
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Interview { resume: None })
    }
}
