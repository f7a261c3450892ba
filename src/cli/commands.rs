//! CLI command handlers.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{AskArgs, ListenArgs, TranscribeArgs, TurnArgs};
use crate::audio::mime::mime_for_path;
use crate::audio::{Transcriber, WhisperTranscriber};
use crate::config::VoxConfig;
use crate::error::{Result, VoxError};
use crate::run::TurnMode;
use crate::session::AssistantSession;

/// Layered config, with `--config` replacing the default file location.
pub fn load_config(path: Option<&Path>) -> Result<VoxConfig> {
    match path {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let mut config = VoxConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => VoxConfig::load(),
    }
}

/// Handle `voxrun ask <question>`.
pub async fn handle_ask(mut config: VoxConfig, args: AskArgs, cancel: CancellationToken) -> Result<()> {
    apply_turn_args(&mut config, &args.turn);
    let session = AssistantSession::from_config(&config).await?;
    let reply = session.ask(&args.question, &cancel).await?;
    println!("{}", reply.text.trim());
    Ok(())
}

/// Handle `voxrun listen <audio-file>`.
pub async fn handle_listen(
    mut config: VoxConfig,
    args: ListenArgs,
    cancel: CancellationToken,
) -> Result<()> {
    apply_turn_args(&mut config, &args.turn);
    let mime = resolve_mime(&args.audio, args.mime.as_deref())?;
    let audio = tokio::fs::read(&args.audio).await?;

    let session = AssistantSession::from_config(&config).await?;
    let turn = session.ask_audio(&audio, &mime, &cancel).await?;
    eprintln!("> {}", turn.transcript.text);
    println!("{}", turn.reply.text.trim());
    Ok(())
}

/// Handle `voxrun transcribe <audio-file>`.
pub async fn handle_transcribe(config: VoxConfig, args: TranscribeArgs) -> Result<()> {
    if config.api_key.trim().is_empty() {
        return Err(VoxError::Configuration(
            "api_key is not set (OPENAI_API_KEY)".to_string(),
        ));
    }
    let mime = resolve_mime(&args.audio, args.mime.as_deref())?;
    let audio = tokio::fs::read(&args.audio).await?;

    let transcript = WhisperTranscriber::from_config(&config)?
        .transcribe(&audio, &mime, args.language.as_deref())
        .await?;
    println!("{}", transcript.text);
    Ok(())
}

fn apply_turn_args(config: &mut VoxConfig, turn: &TurnArgs) {
    if turn.stream {
        config.mode = TurnMode::Stream;
    }
    if let Some(path) = &turn.stock_file {
        config.stock_path = Some(path.clone());
    }
    if let Some(path) = &turn.history {
        config.history_path = Some(path.clone());
    }
}

fn resolve_mime(path: &Path, explicit: Option<&str>) -> Result<String> {
    if let Some(mime) = explicit {
        return Ok(mime.to_string());
    }
    mime_for_path(path).map(str::to_string).ok_or_else(|| {
        VoxError::InvalidArgument(format!(
            "cannot guess the audio type of {}; pass --mime",
            path.display()
        ))
    })
}
