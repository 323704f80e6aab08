//! HTTP client for the companion backend.
//!
//! Speaks the backend's JSON/multipart contract:
//!
//! | Operation  | Request                                              | Response                                   |
//! |------------|------------------------------------------------------|--------------------------------------------|
//! | transcribe | `POST` multipart, part `audio`                       | `{ text }`                                 |
//! | generate   | `POST { message, memory, conversation_history }`     | `{ response, emotion?, updated_memory? }`  |
//! | synthesize | `POST { text }`                                      | encoded audio bytes                        |
//! | health     | `GET`                                                | `{ status, whisper, tts, openai }`         |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};

use kokoro_core::config::BackendConfig;
use kokoro_core::error::KokoroError;
use kokoro_core::types::{AudioClip, ConversationMemory, Message};

use crate::{
    parse_emotion_tag, BackendHealth, GenerationReply, GenerationRequest, GenerationService,
    HealthCheck, SpeechSynthesisService, Transcript, TranscriptionService,
    MIN_EXPECTED_AUDIO_BYTES,
};

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    message: &'a str,
    memory: &'a ConversationMemory,
    conversation_history: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponseBody {
    response: String,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    updated_memory: Option<ConversationMemory>,
}

#[derive(Deserialize)]
struct TranscribeResponseBody {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct SynthesizeRequestBody<'a> {
    text: &'a str,
}

/// Which operation a request belongs to, for error mapping and logs.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Transcribe,
    Generate,
    Synthesize,
    Health,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Transcribe => "transcribe",
            Stage::Generate => "generate",
            Stage::Synthesize => "synthesize",
            Stage::Health => "health",
        }
    }

    fn error(self, detail: String) -> KokoroError {
        match self {
            Stage::Transcribe => KokoroError::Transcription(detail),
            Stage::Generate => KokoroError::Generation(detail),
            Stage::Synthesize => KokoroError::Synthesis(detail),
            Stage::Health => KokoroError::Http(detail),
        }
    }
}

/// Backend client implementing all three services plus the health probe.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    transcribe_path: String,
    chat_path: String,
    synthesize_path: String,
    health_path: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, KokoroError> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KokoroError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transcribe_path: config.transcribe_path.clone(),
            chat_path: config.chat_path.clone(),
            synthesize_path: config.synthesize_path.clone(),
            health_path: config.health_path.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn transport_error(&self, stage: Stage, err: reqwest::Error) -> KokoroError {
        if err.is_timeout() {
            KokoroError::Timeout {
                stage: stage.name().to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            stage.error(err.to_string())
        }
    }

    /// Turn a non-success status into the stage's error, keeping the body.
    async fn check_status(&self, stage: Stage, resp: Response) -> Result<Response, KokoroError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(stage.error(format!("HTTP {}: {}", status, body.trim())))
    }
}

#[async_trait]
impl TranscriptionService for HttpBackend {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcript, KokoroError> {
        let stage = Stage::Transcribe;
        let started = Instant::now();

        let part = multipart::Part::bytes(clip.bytes.clone())
            .file_name("recording.webm")
            .mime_str(&clip.mime_type)
            .map_err(|e| stage.error(format!("invalid audio mime type: {e}")))?;
        let form = multipart::Form::new().part("audio", part);

        let resp = self
            .client
            .post(self.url(&self.transcribe_path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        let resp = self.check_status(stage, resp).await?;

        let body: TranscribeResponseBody = resp
            .json()
            .await
            .map_err(|e| stage.error(format!("invalid response body: {e}")))?;

        tracing::info!(
            bytes = clip.bytes.len(),
            chars = body.text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcription complete"
        );
        Ok(Transcript { text: body.text })
    }
}

#[async_trait]
impl GenerationService for HttpBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, KokoroError> {
        let stage = Stage::Generate;
        let started = Instant::now();

        let body = ChatRequestBody {
            message: &request.message,
            memory: &request.memory,
            conversation_history: &request.history,
        };

        let resp = self
            .client
            .post(self.url(&self.chat_path))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        let resp = self.check_status(stage, resp).await?;

        let text = resp
            .text()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        let reply: ChatResponseBody = serde_json::from_str(&text)
            .map_err(|e| stage.error(format!("invalid response body: {e}")))?;

        let emotion = parse_emotion_tag(reply.emotion.as_deref());
        tracing::info!(
            history = request.history.len(),
            emotion = ?emotion,
            memory_updated = reply.updated_memory.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation complete"
        );

        Ok(GenerationReply {
            response: reply.response,
            emotion,
            updated_memory: reply.updated_memory,
        })
    }
}

#[async_trait]
impl SpeechSynthesisService for HttpBackend {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, KokoroError> {
        let stage = Stage::Synthesize;
        let started = Instant::now();

        let resp = self
            .client
            .post(self.url(&self.synthesize_path))
            .json(&SynthesizeRequestBody { text })
            .send()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        let resp = self.check_status(stage, resp).await?;

        let audio = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error(stage, e))?
            .to_vec();

        if audio.is_empty() {
            return Err(stage.error("backend returned no audio".to_string()));
        }
        if audio.len() < MIN_EXPECTED_AUDIO_BYTES {
            tracing::warn!(bytes = audio.len(), "Synthesized audio is suspiciously small");
        }
        tracing::info!(
            bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synthesis complete"
        );
        Ok(audio)
    }
}

#[async_trait]
impl HealthCheck for HttpBackend {
    async fn health(&self) -> Result<BackendHealth, KokoroError> {
        let stage = Stage::Health;
        let resp = self
            .client
            .get(self.url(&self.health_path))
            .send()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        let resp = self.check_status(stage, resp).await?;
        resp.json()
            .await
            .map_err(|e| KokoroError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            base_url: base_url.to_string(),
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_joining() {
        let b = backend("http://localhost:8000/");
        assert_eq!(b.base_url(), "http://localhost:8000");
        assert_eq!(b.url("/api/chat"), "http://localhost:8000/api/chat");
        assert_eq!(b.url("health"), "http://localhost:8000/health");
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let memory = ConversationMemory {
            user_name: Some("Carlos".to_string()),
            relationship_level: 15,
            ..ConversationMemory::default()
        };
        let history = vec![Message::user("hola")];
        let body = ChatRequestBody {
            message: "¿cómo estás?",
            memory: &memory,
            conversation_history: &history,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "¿cómo estás?");
        assert_eq!(json["memory"]["userName"], "Carlos");
        assert_eq!(json["memory"]["relationshipLevel"], 15);
        assert_eq!(json["conversation_history"][0]["isUser"], true);
    }

    #[test]
    fn test_chat_response_optional_fields() {
        let body: ChatResponseBody = serde_json::from_str(r#"{"response": "¡Hola!"}"#).unwrap();
        assert_eq!(body.response, "¡Hola!");
        assert!(body.emotion.is_none());
        assert!(body.updated_memory.is_none());
    }

    #[test]
    fn test_stage_errors() {
        assert!(matches!(
            Stage::Transcribe.error("x".into()),
            KokoroError::Transcription(_)
        ));
        assert!(matches!(
            Stage::Generate.error("x".into()),
            KokoroError::Generation(_)
        ));
        assert!(matches!(
            Stage::Synthesize.error("x".into()),
            KokoroError::Synthesis(_)
        ));
        assert!(matches!(Stage::Health.error("x".into()), KokoroError::Http(_)));
    }
}
