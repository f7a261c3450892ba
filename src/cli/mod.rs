//! CLI entry point for voxrun.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ask an assistant questions by voice or text.
#[derive(Parser, Debug)]
#[command(name = "voxrun", version, about = "Voice questions answered by an assistant run")]
pub struct Cli {
    /// Config file (defaults to $VOXRUN_CONFIG or ~/.voxrun/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a typed question
    Ask(AskArgs),
    /// Ask a question recorded in an audio file
    Listen(ListenArgs),
    /// Only transcribe an audio file
    Transcribe(TranscribeArgs),
}

/// Options shared by the commands that run a turn.
#[derive(Args, Debug, Clone, Default)]
pub struct TurnArgs {
    /// Consume the run as an event stream instead of polling
    #[arg(long)]
    pub stream: bool,

    /// JSON object of product name to quantity for the stock tool
    #[arg(long)]
    pub stock_file: Option<PathBuf>,

    /// Append answered questions to this JSON-lines file
    #[arg(long)]
    pub history: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question
    pub question: String,

    #[command(flatten)]
    pub turn: TurnArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Recorded question
    pub audio: PathBuf,

    /// MIME type (guessed from the extension when omitted)
    #[arg(long)]
    pub mime: Option<String>,

    #[command(flatten)]
    pub turn: TurnArgs,
}

#[derive(Args, Debug)]
pub struct TranscribeArgs {
    pub audio: PathBuf,

    #[arg(long)]
    pub mime: Option<String>,

    /// Language hint (ISO-639-1)
    #[arg(long)]
    pub language: Option<String>,
}
