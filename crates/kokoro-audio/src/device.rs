//! File and command backed devices for the terminal client.
//!
//! [`FileMicrophone`] streams a pre-recorded utterance as if it came from a
//! microphone. [`CommandAudioOutput`] stages synthesized audio in a file and
//! hands it to an external player such as `aplay` or `afplay`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use uuid::Uuid;

use kokoro_core::error::KokoroError;

use crate::{AudioOutput, BufferHandle, MicrophoneSource, MicrophoneStream};

/// Chunk size used when streaming a recording, roughly 100 ms of opus.
const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Placeholder replaced with the staged audio path in player arguments.
const FILE_PLACEHOLDER: &str = "{file}";

// =============================================================================
// Microphones
// =============================================================================

/// Streams a recorded file in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct FileMicrophone {
    path: PathBuf,
    chunk_size: usize,
    pace: Duration,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pace: Duration::ZERO,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Wait `pace` before each chunk, to emulate a live device.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

#[async_trait]
impl MicrophoneSource for FileMicrophone {
    async fn open(&self) -> Result<Box<dyn MicrophoneStream>, KokoroError> {
        let file = File::open(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied | ErrorKind::NotFound => KokoroError::PermissionDenied(
                format!("{}: {}", self.path.display(), e),
            ),
            _ => KokoroError::Audio(format!("{}: {}", self.path.display(), e)),
        })?;
        tracing::debug!(path = %self.path.display(), "Microphone file opened");

        Ok(Box::new(FileMicrophoneStream {
            file: Some(file),
            mime_type: mime_for_path(&self.path),
            chunk_size: self.chunk_size,
            pace: self.pace,
        }))
    }
}

struct FileMicrophoneStream {
    file: Option<File>,
    mime_type: &'static str,
    chunk_size: usize,
    pace: Duration,
}

#[async_trait]
impl MicrophoneStream for FileMicrophoneStream {
    fn mime_type(&self) -> &str {
        self.mime_type
    }

    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, KokoroError>> {
        let file = self.file.as_mut()?;
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        let mut buf = vec![0u8; self.chunk_size];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(buf))
            }
            Err(e) => Some(Err(e.into())),
        }
    }

    fn release(&mut self) {
        self.file = None;
    }
}

/// Stand-in for a host without any capture device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMicrophone;

#[async_trait]
impl MicrophoneSource for NoMicrophone {
    async fn open(&self) -> Result<Box<dyn MicrophoneStream>, KokoroError> {
        Err(KokoroError::PermissionDenied(
            "no microphone configured".to_string(),
        ))
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        _ => "audio/webm",
    }
}

// =============================================================================
// Command output
// =============================================================================

/// Plays staged audio files through an external player process.
#[derive(Debug)]
pub struct CommandAudioOutput {
    program: String,
    args: Vec<String>,
    output_dir: PathBuf,
    kill_slot: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandAudioOutput {
    /// Build from a command line such as `["aplay", "-q", "{file}"]`.
    pub fn new(command: &[String], output_dir: impl Into<PathBuf>) -> Result<Self, KokoroError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| KokoroError::Config("audio.player_command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            output_dir: output_dir.into(),
            kill_slot: Mutex::new(None),
        })
    }

    fn player_args(&self, file: &Path) -> Vec<String> {
        let file = file.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            args.push(file.to_string());
        }
        args
    }
}

#[async_trait]
impl AudioOutput for CommandAudioOutput {
    async fn load(&self, audio: Vec<u8>) -> Result<BufferHandle, KokoroError> {
        let id = Uuid::new_v4();
        let path = self.output_dir.join(format!("kokoro-{id}.wav"));
        tokio::fs::write(&path, &audio).await?;
        Ok(BufferHandle {
            id,
            len: audio.len(),
            path: Some(path),
        })
    }

    async fn play(&self, handle: &BufferHandle) -> Result<(), KokoroError> {
        let path = handle
            .path
            .as_deref()
            .ok_or_else(|| KokoroError::Playback("buffer has no backing file".to_string()))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.kill_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(kill_tx);

        let child = Command::new(&self.program)
            .args(self.player_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KokoroError::Playback(format!("failed to start {}: {}", self.program, e)))?;

        // wait_with_output drains stderr; dropping it on stop kills the player.
        tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(KokoroError::Playback(format!(
                        "{} exited with {}: {}",
                        self.program,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    )))
                }
            }
            _ = kill_rx => {
                tracing::debug!(program = %self.program, "Player stopped");
                Ok(())
            }
        }
    }

    fn stop(&self) {
        if let Some(tx) = self
            .kill_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }
    }

    fn release(&self, handle: BufferHandle) {
        if let Some(path) = handle.path {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged audio");
            }
        }
    }
}
