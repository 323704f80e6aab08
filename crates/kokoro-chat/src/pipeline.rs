//! Turn pipeline: the single-turn state machine driving a conversation.
//!
//! A turn enters at `Listening` (talk control) or `Generating` (typed text)
//! and always ends at `Idle`. Each backend stage is bounded by the stage
//! timeout and every failure is recovered with a fixed message:
//!
//! | Failure        | Message appended      | Connection flag |
//! |----------------|-----------------------|-----------------|
//! | microphone     | none (notice instead) | unchanged       |
//! | transcription  | apology               | raised          |
//! | generation     | technical fallback    | raised          |
//! | synthesis      | voice apology         | raised          |
//! | playback       | none                  | raised          |

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use kokoro_audio::{CaptureAdapter, PlaybackAdapter, PlaybackEnd};
use kokoro_core::config::KokoroConfig;
use kokoro_core::error::KokoroError;
use kokoro_core::events::PresentationEvent;
use kokoro_core::types::{ConversationMemory, Emotion, Message, TurnState};
use kokoro_speech::{
    GenerationRequest, GenerationService, SpeechSynthesisService, TranscriptionService,
};

use crate::emotion::{classify, resolve, FALLBACK_EMOTION};
use crate::error::ChatError;
use crate::memory::MemoryStore;
use crate::presentation::PresentationSink;
use crate::state::{StateMachine, TurnId};

/// Appended when the utterance could not be transcribed.
pub const TRANSCRIPTION_APOLOGY: &str = "Lo siento, no pude entenderte bien. ¿Podrías repetirlo?";

/// Appended when no reply could be generated.
pub const GENERATION_FALLBACK: &str = "Lo siento, tengo problemas técnicos... ¡Pero aún te amo! 💕";

/// Appended when the reply could not be synthesized.
pub const SYNTHESIS_APOLOGY: &str =
    "¡Ay no! Parece que tengo problemas con mi voz... ¡Pero aún te amo! 💕";

/// Shown when the microphone cannot be acquired.
pub const MICROPHONE_NOTICE: &str = "No se pudo acceder al micrófono. Por favor, permite el acceso.";

// =============================================================================
// Settings and collaborators
// =============================================================================

/// Tunables for the pipeline, usually derived from [`KokoroConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Trailing messages sent with each generation request.
    pub history_window: usize,
    /// Longest typed message accepted, in characters.
    pub max_message_chars: usize,
    pub max_capture: Duration,
    pub stage_timeout: Duration,
    pub voice_enabled: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&KokoroConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &KokoroConfig) -> Self {
        Self {
            history_window: config.conversation.history_window,
            max_message_chars: config.conversation.max_message_chars,
            max_capture: config.audio.max_capture(),
            stage_timeout: config.conversation.stage_timeout(),
            voice_enabled: config.conversation.voice_enabled,
        }
    }
}

/// The three backend services a turn talks to.
#[derive(Clone)]
pub struct Backends {
    pub transcriber: Arc<dyn TranscriptionService>,
    pub generator: Arc<dyn GenerationService>,
    pub synthesizer: Arc<dyn SpeechSynthesisService>,
}

impl Backends {
    /// Use one value for all three services.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: TranscriptionService + GenerationService + SpeechSynthesisService + 'static,
    {
        Self {
            transcriber: backend.clone(),
            generator: backend.clone(),
            synthesizer: backend,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// What happened to the voice output of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Voice output was off; nothing was synthesized.
    Disabled,
    Played,
    /// Playback was cut short by voice being toggled off or a newer playback.
    Interrupted,
    SynthesisFailed,
    PlaybackFailed,
}

/// Backend stage whose failure ended a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFailure {
    Transcription,
    Generation,
}

/// How a turn that was admitted into the pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// An assistant reply was appended.
    Replied {
        emotion: Emotion,
        speech: SpeechOutcome,
    },
    /// Nothing was said; the turn was dropped without a message.
    Discarded,
    /// A backend stage failed and its fallback message was appended.
    Recovered(TurnFailure),
    /// The microphone could not be used; a notice was shown.
    Aborted { notice: String },
}

/// Read-only snapshot for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub state: TurnState,
    pub emotion: Emotion,
    pub is_listening: bool,
    pub is_processing: bool,
    pub is_speaking: bool,
    pub messages: Vec<Message>,
    pub memory: ConversationMemory,
    pub connection_error: bool,
    pub voice_enabled: bool,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Owns the session's conversation state and runs one turn at a time.
pub struct TurnPipeline {
    settings: PipelineSettings,
    backends: Backends,
    capture: Arc<CaptureAdapter>,
    playback: Arc<PlaybackAdapter>,
    sink: Arc<dyn PresentationSink>,
    state: StateMachine,
    memory: MemoryStore,
    messages: Mutex<Vec<Message>>,
    emotion: Mutex<Emotion>,
    connection_error: AtomicBool,
    voice_enabled: AtomicBool,
}

impl std::fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("settings", &self.settings)
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

impl TurnPipeline {
    pub fn new(
        settings: PipelineSettings,
        backends: Backends,
        capture: Arc<CaptureAdapter>,
        playback: Arc<PlaybackAdapter>,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        let voice_enabled = AtomicBool::new(settings.voice_enabled);
        Self {
            settings,
            backends,
            capture,
            playback,
            sink,
            state: StateMachine::new(),
            memory: MemoryStore::new(),
            messages: Mutex::new(Vec::new()),
            emotion: Mutex::new(Emotion::default()),
            connection_error: AtomicBool::new(false),
            voice_enabled,
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn state(&self) -> TurnState {
        self.state.current()
    }

    pub fn emotion(&self) -> Emotion {
        *self.emotion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn memory(&self) -> ConversationMemory {
        self.memory.current()
    }

    pub fn connection_error(&self) -> bool {
        self.connection_error.load(Ordering::SeqCst)
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn view(&self) -> SessionView {
        let state = self.state();
        SessionView {
            state,
            emotion: self.emotion(),
            is_listening: state.is_listening(),
            is_processing: state.is_processing(),
            is_speaking: state.is_speaking(),
            messages: self.messages(),
            memory: self.memory(),
            connection_error: self.connection_error(),
            voice_enabled: self.voice_enabled(),
        }
    }

    // -------------------------------------------------------------------------
    // User actions
    // -------------------------------------------------------------------------

    /// Run a voice turn: capture, transcribe, then reply.
    ///
    /// Fails only with `ChatError::Busy` when another turn occupies the
    /// pipeline; every other problem is reported through the outcome.
    pub async fn talk(&self) -> Result<TurnOutcome, ChatError> {
        let turn = self.begin(TurnState::Listening)?;

        let clip = match self.capture.capture(self.settings.max_capture).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(error = %e, "Microphone unavailable, turn aborted");
                self.emit(PresentationEvent::Notice {
                    text: MICROPHONE_NOTICE.to_string(),
                });
                self.enter(TurnState::Idle)?;
                return Ok(TurnOutcome::Aborted {
                    notice: MICROPHONE_NOTICE.to_string(),
                });
            }
        };
        self.enter(TurnState::Transcribing)?;

        if clip.is_empty() {
            tracing::debug!("Captured no audio, turn discarded");
            self.enter(TurnState::Idle)?;
            return Ok(TurnOutcome::Discarded);
        }

        let transcript = self
            .bounded("transcribe", self.backends.transcriber.transcribe(&clip))
            .await;
        let text = match transcript {
            Ok(transcript) => {
                self.set_connection_error(false);
                transcript.text.trim().to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = clip.bytes.len(), "Transcription failed");
                self.set_connection_error(true);
                self.append(Message::assistant(TRANSCRIPTION_APOLOGY, FALLBACK_EMOTION));
                self.enter(TurnState::Idle)?;
                return Ok(TurnOutcome::Recovered(TurnFailure::Transcription));
            }
        };

        if text.is_empty() {
            tracing::debug!("Empty transcript, turn discarded");
            self.enter(TurnState::Idle)?;
            return Ok(TurnOutcome::Discarded);
        }

        self.enter(TurnState::Generating)?;
        let outcome = self.reply(text).await;
        drop(turn);
        outcome
    }

    /// End the active capture early so the turn proceeds to transcription.
    pub fn stop_listening(&self) -> Result<(), ChatError> {
        if !self.state().is_listening() || !self.capture.stop() {
            return Err(ChatError::NotListening);
        }
        Ok(())
    }

    /// Run a typed turn, entering directly at `Generating`.
    pub async fn submit_text(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.settings.max_message_chars {
            return Err(ChatError::MessageTooLong(self.settings.max_message_chars));
        }

        let turn = self.begin(TurnState::Generating)?;
        let outcome = self.reply(text.to_string()).await;
        drop(turn);
        outcome
    }

    /// Append an unprompted assistant message and speak it if possible.
    ///
    /// The message is always appended. It is spoken only when voice is
    /// enabled and no turn is in progress; returns `None` when not spoken.
    pub async fn announce(&self, text: &str, emotion: Emotion) -> Option<SpeechOutcome> {
        self.append(Message::assistant(text, emotion));
        if !self.voice_enabled() {
            return None;
        }
        let turn = match self.begin(TurnState::Speaking) {
            Ok(turn) => turn,
            Err(e) => {
                tracing::debug!(error = %e, "Announcement not spoken");
                return None;
            }
        };
        let speech = self.speak(text).await;
        if let Err(e) = self.enter(TurnState::Idle) {
            tracing::warn!(error = %e, "Announcement did not return to Idle");
        }
        drop(turn);
        Some(speech)
    }

    /// Turn voice output on or off, returning the previous setting.
    ///
    /// Turning it off while speaking stops the playback immediately.
    pub fn set_voice_enabled(&self, enabled: bool) -> bool {
        let previous = self.voice_enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::info!(enabled, "Voice output toggled");
        }
        if !enabled && self.state().is_speaking() && self.playback.stop() {
            tracing::debug!("Active playback stopped by voice toggle");
        }
        previous
    }

    /// Flip voice output, returning the new setting.
    pub fn toggle_voice(&self) -> bool {
        let enabled = !self.voice_enabled();
        self.set_voice_enabled(enabled);
        enabled
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Generation and optional speech for a non-empty utterance.
    ///
    /// Must be called in `Generating`; leaves the pipeline `Idle`.
    async fn reply(&self, text: String) -> Result<TurnOutcome, ChatError> {
        let history = self.trailing_history();
        self.append(Message::user(text.clone()));

        let local = classify(&text);
        if local != Emotion::Neutral {
            self.set_emotion(local);
        }

        let request = GenerationRequest {
            message: text,
            memory: self.memory.current(),
            history,
        };
        let reply = match self
            .bounded("generate", self.backends.generator.generate(&request))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Generation failed");
                self.set_connection_error(true);
                self.append(Message::assistant(GENERATION_FALLBACK, FALLBACK_EMOTION));
                self.enter(TurnState::Idle)?;
                return Ok(TurnOutcome::Recovered(TurnFailure::Generation));
            }
        };

        let emotion = resolve(reply.emotion, &request.message);
        if let Some(memory) = reply.updated_memory {
            self.memory.replace(memory);
            self.emit(PresentationEvent::MemoryReplaced {
                memory: self.memory.current(),
            });
        }
        self.set_connection_error(false);
        self.append(Message::assistant(reply.response.clone(), emotion));

        if !self.voice_enabled() {
            self.enter(TurnState::Idle)?;
            return Ok(TurnOutcome::Replied {
                emotion,
                speech: SpeechOutcome::Disabled,
            });
        }

        self.enter(TurnState::Speaking)?;
        let speech = self.speak(&reply.response).await;
        self.enter(TurnState::Idle)?;
        Ok(TurnOutcome::Replied { emotion, speech })
    }

    /// Synthesize and play `text`. Must be called in `Speaking`.
    async fn speak(&self, text: &str) -> SpeechOutcome {
        let audio = match self
            .bounded("synthesize", self.backends.synthesizer.synthesize(text))
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "Speech synthesis failed");
                self.set_connection_error(true);
                self.append(Message::assistant(SYNTHESIS_APOLOGY, FALLBACK_EMOTION));
                return SpeechOutcome::SynthesisFailed;
            }
        };

        // Checked as the playback slot is taken, so a later voice toggle
        // always finds the playback to stop.
        match self.playback.play_if(audio, || self.voice_enabled()).await {
            Ok(PlaybackEnd::Finished) => {
                self.set_connection_error(false);
                SpeechOutcome::Played
            }
            Ok(PlaybackEnd::Interrupted) => SpeechOutcome::Interrupted,
            Err(e) => {
                tracing::warn!(error = %e, "Playback failed");
                self.set_connection_error(true);
                SpeechOutcome::PlaybackFailed
            }
        }
    }

    async fn bounded<T, F>(&self, stage: &str, fut: F) -> Result<T, KokoroError>
    where
        F: Future<Output = Result<T, KokoroError>>,
    {
        let limit = self.settings.stage_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(KokoroError::Timeout {
                stage: stage.to_string(),
                secs: limit.as_secs(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // State updates
    // -------------------------------------------------------------------------

    fn emit(&self, event: PresentationEvent) {
        tracing::trace!(event = event.event_name(), "Presentation event");
        self.sink.handle(&event);
    }

    /// Admit a new turn; the guard resets it if the turn is cut short.
    fn begin(&self, entry: TurnState) -> Result<TurnGuard<'_>, ChatError> {
        let turn = self.state.begin(entry)?;
        let guard = TurnGuard {
            pipeline: self,
            turn,
        };
        self.emit_state(TurnState::Idle, entry);
        Ok(guard)
    }

    fn enter(&self, target: TurnState) -> Result<(), ChatError> {
        let from = self.state.transition(target)?;
        self.emit_state(from, target);
        Ok(())
    }

    fn emit_state(&self, from: TurnState, to: TurnState) {
        self.emit(PresentationEvent::StateChanged {
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    /// The last `history_window` messages of the log.
    fn trailing_history(&self) -> Vec<Message> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let start = messages.len().saturating_sub(self.settings.history_window);
        messages[start..].to_vec()
    }

    /// Append to the log; a tagged message also becomes the current emotion.
    fn append(&self, message: Message) {
        let emotion = message.emotion;
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        tracing::debug!(user = message.is_user, emotion = ?emotion, "Message appended");
        self.emit(PresentationEvent::MessageAppended { message });
        if let Some(emotion) = emotion {
            self.set_emotion(emotion);
        }
    }

    fn set_emotion(&self, emotion: Emotion) {
        let previous = std::mem::replace(
            &mut *self.emotion.lock().unwrap_or_else(PoisonError::into_inner),
            emotion,
        );
        if previous != emotion {
            tracing::debug!(emotion = %emotion, "Emotion changed");
            self.emit(PresentationEvent::EmotionChanged {
                emotion,
                timestamp: Utc::now(),
            });
        }
    }

    fn set_connection_error(&self, active: bool) {
        if self.connection_error.swap(active, Ordering::SeqCst) != active {
            self.emit(PresentationEvent::ConnectionError { active });
        }
    }

    /// Return to Idle if `turn` was abandoned mid-way.
    fn abandon(&self, turn: TurnId) {
        if let Some(from) = self.state.release(turn) {
            self.playback.stop();
            self.capture.stop();
            self.emit_state(from, TurnState::Idle);
        }
    }
}

/// Puts the pipeline back to Idle if a turn future is dropped or an
/// unexpected transition error cuts a turn short.
///
/// Only acts while its own turn still holds the state.
struct TurnGuard<'a> {
    pipeline: &'a TurnPipeline,
    turn: TurnId,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.abandon(self.turn);
    }
}

// =============================================================================
// Tests
// =============================================================================
