//! Kokoro application binary - composition root.
//!
//! Ties together all Kokoro crates into a single executable:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Build the HTTP backend client and probe its health
//! 3. Wire microphone, player and terminal renderer into the turn pipeline
//! 4. Greet the user once, then run the interactive prompt until exit

mod cli;
mod render;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use kokoro_audio::{
    AudioOutput, CaptureAdapter, CommandAudioOutput, FileMicrophone, MicrophoneSource,
    NoMicrophone, PlaybackAdapter,
};
use kokoro_chat::{
    Backends, ChatError, CompanionSession, PipelineSettings, TurnOutcome, TurnPipeline,
};
use kokoro_core::config::KokoroConfig;
use kokoro_speech::{HealthCheck, HttpBackend};

use cli::CliArgs;
use render::TerminalRenderer;

const HELP: &str = "\
Comandos:
  /talk    grabar un mensaje de voz
  /stop    terminar la grabación
  /voice   activar o desactivar la voz
  /memory  mostrar la memoria de la conversación
  /status  mostrar el estado de la sesión
  /help    mostrar esta ayuda
  /quit    salir
Cualquier otro texto se envía como mensaje.";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Talk,
    Stop,
    Voice,
    Memory,
    Status,
    Help,
    Quit,
    Unknown(&'a str),
    Say(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "/talk" => Command::Talk,
        "/stop" => Command::Stop,
        "/voice" => Command::Voice,
        "/memory" => Command::Memory,
        "/status" => Command::Status,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other if other.starts_with('/') => Command::Unknown(other),
        _ => Command::Say(line),
    }
}

fn log_outcome(result: Result<TurnOutcome, ChatError>, renderer: &TerminalRenderer<std::io::Stdout>) {
    match result {
        Ok(outcome) => tracing::debug!(?outcome, "Turn finished"),
        Err(e) => renderer.line(&format!("! {e}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured level applies.
    let config_file = args.resolve_config_path();
    let loaded = KokoroConfig::load(&config_file);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    args.apply(&mut config);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            args.resolve_log_filter(&config.general.log_level),
        ))
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Kokoro v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Configuration unavailable, using defaults"
        ),
    }

    // Backend.
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    match backend.health().await {
        Ok(health) if health.is_ready() => {
            tracing::info!(url = %backend.base_url(), "Backend ready")
        }
        Ok(health) => tracing::warn!(
            url = %backend.base_url(),
            whisper = health.whisper,
            tts = health.tts,
            openai = health.openai,
            "Backend reachable but not fully ready"
        ),
        Err(e) => tracing::warn!(url = %backend.base_url(), error = %e, "Backend unreachable"),
    }

    // Audio devices.
    let microphone: Arc<dyn MicrophoneSource> = match &config.audio.microphone_file {
        Some(path) => {
            tracing::info!(path = %path, "Using recorded utterance as microphone");
            Arc::new(FileMicrophone::new(path).with_pace(std::time::Duration::from_millis(100)))
        }
        None => {
            tracing::info!("No microphone configured, voice input disabled");
            Arc::new(NoMicrophone)
        }
    };
    let output: Arc<dyn AudioOutput> = Arc::new(CommandAudioOutput::new(
        &config.audio.player_command,
        &config.audio.output_dir,
    )?);

    // Pipeline.
    let renderer = Arc::new(TerminalRenderer::stdout());
    let pipeline = Arc::new(TurnPipeline::new(
        PipelineSettings::from_config(&config),
        Backends::shared(Arc::clone(&backend)),
        Arc::new(CaptureAdapter::new(microphone)),
        Arc::new(PlaybackAdapter::new(output)),
        renderer.clone(),
    ));
    let session = Arc::new(CompanionSession::from_config(
        Arc::clone(&pipeline),
        &config.conversation,
    ));

    renderer.line(HELP);
    let greeting = session.spawn_greeting();

    // === Interactive prompt ===

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Command::Talk => {
                let pipeline = Arc::clone(&pipeline);
                let renderer = Arc::clone(&renderer);
                tokio::spawn(async move { log_outcome(pipeline.talk().await, &renderer) });
            }
            Command::Stop => {
                if let Err(e) = pipeline.stop_listening() {
                    renderer.line(&format!("! {e}"));
                }
            }
            Command::Voice => {
                let enabled = pipeline.toggle_voice();
                renderer.line(if enabled { "Voz activada" } else { "Voz desactivada" });
            }
            Command::Memory => match serde_json::to_string_pretty(&pipeline.memory()) {
                Ok(json) => renderer.line(&json),
                Err(e) => tracing::warn!(error = %e, "Failed to render memory"),
            },
            Command::Status => {
                let view = pipeline.view();
                renderer.line(&format!(
                    "estado: {} | emoción: {} | mensajes: {} | voz: {} | conexión: {}",
                    view.state,
                    view.emotion,
                    view.messages.len(),
                    if view.voice_enabled { "sí" } else { "no" },
                    if view.connection_error { "error" } else { "ok" },
                ));
            }
            Command::Help => renderer.line(HELP),
            Command::Quit => break,
            Command::Unknown(command) => {
                renderer.line(&format!("! Comando desconocido: {command} (usa /help)"))
            }
            Command::Say(text) => {
                let text = text.to_string();
                let pipeline = Arc::clone(&pipeline);
                let renderer = Arc::clone(&renderer);
                tokio::spawn(async move { log_outcome(pipeline.submit_text(&text).await, &renderer) });
            }
        }
    }

    greeting.abort();
    pipeline.set_voice_enabled(false);
    tracing::info!("Kokoro shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/talk"), Command::Talk);
        assert_eq!(parse_command("  /stop "), Command::Stop);
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("/status"), Command::Status);
        assert_eq!(parse_command("/dance"), Command::Unknown("/dance"));
    }

    #[test]
    fn test_plain_text_is_sent_verbatim() {
        assert_eq!(parse_command("hola Yuki"), Command::Say("hola Yuki"));
        assert_eq!(parse_command(" hola "), Command::Say(" hola "));
    }
}
