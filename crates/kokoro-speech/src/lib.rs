//! Kokoro Speech crate - the companion backend's three request/response
//! operations.
//!
//! Provides trait-based abstractions for transcription, reply generation, and
//! speech synthesis, the request/result types they exchange, an HTTP client
//! for the companion backend, and a scripted mock for testing without a
//! network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kokoro_core::error::KokoroError;
use kokoro_core::types::{AudioClip, ConversationMemory, Emotion, Message};

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::ScriptedBackend;

/// Synthesized audio shorter than this is most likely silence or an error
/// page, but is still played.
pub const MIN_EXPECTED_AUDIO_BYTES: usize = 1000;

// =============================================================================
// Request / result types
// =============================================================================

/// Text recognized from one captured utterance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    pub text: String,
}

/// Everything the generation backend receives for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The user's utterance, already trimmed and non-empty.
    pub message: String,
    /// Snapshot of the memory at the time the turn started.
    pub memory: ConversationMemory,
    /// Trailing window of messages preceding `message`.
    pub history: Vec<Message>,
}

/// The backend's answer to a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationReply {
    pub response: String,
    /// Parsed emotion tag. `None` when absent or not a known emotion.
    pub emotion: Option<Emotion>,
    /// Replacement memory. `None` keeps the current memory.
    pub updated_memory: Option<ConversationMemory>,
}

/// Readiness report of the backend's models.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub whisper: bool,
    #[serde(default)]
    pub tts: bool,
    #[serde(default)]
    pub openai: bool,
}

impl BackendHealth {
    /// Whether every stage of a voice turn can be served.
    pub fn is_ready(&self) -> bool {
        self.status == "healthy" && self.whisper && self.tts && self.openai
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Speech-to-text for a captured utterance.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcript, KokoroError>;
}

/// Reply generation with conversation memory and recent history as context.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, KokoroError>;
}

/// Text-to-speech for an assistant reply.
#[async_trait]
pub trait SpeechSynthesisService: Send + Sync {
    /// Returns encoded audio ready for an `AudioOutput`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, KokoroError>;
}

/// Liveness probe for whatever serves the three operations.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health(&self) -> Result<BackendHealth, KokoroError>;
}

/// Parse a backend emotion tag into the closed enumeration.
///
/// Unknown tags are logged and dropped so the caller can fall back to local
/// classification.
pub fn parse_emotion_tag(tag: Option<&str>) -> Option<Emotion> {
    let tag = tag?.trim();
    if tag.is_empty() {
        return None;
    }
    match tag.parse::<Emotion>() {
        Ok(emotion) => Some(emotion),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring backend emotion tag");
            None
        }
    }
}
