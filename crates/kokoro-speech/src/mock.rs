//! Scripted backend for testing without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use kokoro_core::error::KokoroError;
use kokoro_core::types::AudioClip;

use crate::{
    BackendHealth, GenerationReply, GenerationRequest, GenerationService, HealthCheck,
    SpeechSynthesisService, Transcript, TranscriptionService,
};

/// Text returned by transcribe when nothing is queued.
pub const MOCK_TRANSCRIPT: &str = "[mock transcription]";

/// Text returned by generate when nothing is queued.
pub const MOCK_REPLY: &str = "[mock reply]";

#[derive(Default)]
struct Script {
    transcripts: VecDeque<Result<String, KokoroError>>,
    replies: VecDeque<Result<GenerationReply, KokoroError>>,
    audio: VecDeque<Result<Vec<u8>, KokoroError>>,
    health: Option<Result<BackendHealth, KokoroError>>,
    transcribed: Vec<usize>,
    requests: Vec<GenerationRequest>,
    synthesized: Vec<String>,
}

/// Backend whose results are queued up front, one per call.
///
/// When a queue runs dry each operation falls back to a fixed success. Clones
/// share the script and the call log.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    delay: Duration,
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `delay` (use a paused tokio clock in tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    pub fn push_transcript(&self, text: impl Into<String>) -> &Self {
        self.script().transcripts.push_back(Ok(text.into()));
        self
    }

    pub fn push_transcription_error(&self, detail: impl Into<String>) -> &Self {
        self.script()
            .transcripts
            .push_back(Err(KokoroError::Transcription(detail.into())));
        self
    }

    pub fn push_reply(&self, reply: GenerationReply) -> &Self {
        self.script().replies.push_back(Ok(reply));
        self
    }

    pub fn push_generation_error(&self, detail: impl Into<String>) -> &Self {
        self.script()
            .replies
            .push_back(Err(KokoroError::Generation(detail.into())));
        self
    }

    pub fn push_audio(&self, audio: Vec<u8>) -> &Self {
        self.script().audio.push_back(Ok(audio));
        self
    }

    pub fn push_synthesis_error(&self, detail: impl Into<String>) -> &Self {
        self.script()
            .audio
            .push_back(Err(KokoroError::Synthesis(detail.into())));
        self
    }

    pub fn set_health(&self, health: Result<BackendHealth, KokoroError>) -> &Self {
        self.script().health = Some(health);
        self
    }

    /// Number of transcribe calls made.
    pub fn transcribe_count(&self) -> usize {
        self.script().transcribed.len()
    }

    /// Byte length of each clip sent for transcription.
    pub fn transcribed_sizes(&self) -> Vec<usize> {
        self.script().transcribed.clone()
    }

    /// Every generation request received, in order.
    pub fn generation_requests(&self) -> Vec<GenerationRequest> {
        self.script().requests.clone()
    }

    pub fn generate_count(&self) -> usize {
        self.script().requests.len()
    }

    /// Every text sent for synthesis, in order.
    pub fn synthesized_texts(&self) -> Vec<String> {
        self.script().synthesized.clone()
    }

    pub fn synthesize_count(&self) -> usize {
        self.script().synthesized.len()
    }
}

#[async_trait]
impl TranscriptionService for ScriptedBackend {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcript, KokoroError> {
        let next = {
            let mut script = self.script();
            script.transcribed.push(clip.bytes.len());
            script.transcripts.pop_front()
        };
        self.wait().await;
        let text = next.unwrap_or_else(|| Ok(MOCK_TRANSCRIPT.to_string()))?;
        tracing::debug!(bytes = clip.bytes.len(), "Mock transcription generated");
        Ok(Transcript { text })
    }
}

#[async_trait]
impl GenerationService for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, KokoroError> {
        let next = {
            let mut script = self.script();
            script.requests.push(request.clone());
            script.replies.pop_front()
        };
        self.wait().await;
        next.unwrap_or_else(|| {
            Ok(GenerationReply {
                response: MOCK_REPLY.to_string(),
                ..GenerationReply::default()
            })
        })
    }
}

#[async_trait]
impl SpeechSynthesisService for ScriptedBackend {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, KokoroError> {
        let next = {
            let mut script = self.script();
            script.synthesized.push(text.to_string());
            script.audio.pop_front()
        };
        self.wait().await;
        next.unwrap_or_else(|| Ok(vec![0u8; 2048]))
    }
}

#[async_trait]
impl HealthCheck for ScriptedBackend {
    async fn health(&self) -> Result<BackendHealth, KokoroError> {
        let configured = self.script().health.take();
        configured.unwrap_or_else(|| {
            Ok(BackendHealth {
                status: "healthy".to_string(),
                whisper: true,
                tts: true,
                openai: true,
            })
        })
    }
}
