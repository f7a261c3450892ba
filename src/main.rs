//! voxrun CLI binary entry point.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use voxrun::cli::commands::{handle_ask, handle_listen, handle_transcribe, load_config};
use voxrun::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn,voxrun=info",
        1 => "info,voxrun=debug",
        _ => "debug,voxrun=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling turn");
            ctrl_c.cancel();
        }
    });

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Ask(args) => handle_ask(config, args, cancel).await,
            Commands::Listen(args) => handle_listen(config, args, cancel).await,
            Commands::Transcribe(args) => handle_transcribe(config, args).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(hint) = e.recovery_suggestion().hint() {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}
