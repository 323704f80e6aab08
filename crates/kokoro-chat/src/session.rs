//! Session lifecycle: owns the pipeline and the one-time greeting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use kokoro_core::config::ConversationConfig;

use crate::emotion::FALLBACK_EMOTION;
use crate::pipeline::{SpeechOutcome, TurnPipeline};

/// One companion session from start-up to exit.
#[derive(Debug)]
pub struct CompanionSession {
    pipeline: Arc<TurnPipeline>,
    greeting: String,
    greeting_delay: Duration,
    greeted: AtomicBool,
}

impl CompanionSession {
    pub fn new(pipeline: Arc<TurnPipeline>, greeting: impl Into<String>, delay: Duration) -> Self {
        Self {
            pipeline,
            greeting: greeting.into(),
            greeting_delay: delay,
            greeted: AtomicBool::new(false),
        }
    }

    pub fn from_config(pipeline: Arc<TurnPipeline>, config: &ConversationConfig) -> Self {
        Self::new(pipeline, config.greeting.clone(), config.greeting_delay())
    }

    pub fn pipeline(&self) -> &Arc<TurnPipeline> {
        &self.pipeline
    }

    pub fn has_greeted(&self) -> bool {
        self.greeted.load(Ordering::SeqCst)
    }

    /// Wait the greeting delay, then greet once.
    ///
    /// Returns `None` when the greeting is disabled, was already given, or
    /// was not spoken.
    pub async fn greet(&self) -> Option<SpeechOutcome> {
        if self.greeting.trim().is_empty() || self.greeted.swap(true, Ordering::SeqCst) {
            return None;
        }
        tokio::time::sleep(self.greeting_delay).await;
        tracing::info!("Greeting user");
        self.pipeline.announce(&self.greeting, FALLBACK_EMOTION).await
    }

    /// Run [`greet`](Self::greet) in the background.
    pub fn spawn_greeting(self: &Arc<Self>) -> JoinHandle<Option<SpeechOutcome>> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.greet().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Backends, PipelineSettings};
    use crate::presentation::RecordingSink;
    use kokoro_audio::{CaptureAdapter, MockAudioOutput, MockMicrophone, PlaybackAdapter};
    use kokoro_core::types::{Emotion, TurnState};
    use kokoro_speech::ScriptedBackend;

    const GREETING: &str = "¡Hola mi amor! Soy Yuki, tu novia virtual. ¿Cómo estás hoy?";

    fn session(greeting: &str, backend: &ScriptedBackend) -> (Arc<CompanionSession>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let pipeline = TurnPipeline::new(
            PipelineSettings::default(),
            Backends::shared(Arc::new(backend.clone())),
            Arc::new(CaptureAdapter::new(Arc::new(MockMicrophone::with_chunks(vec![])))),
            Arc::new(PlaybackAdapter::new(Arc::new(MockAudioOutput::new()))),
            sink.clone(),
        );
        let session = CompanionSession::new(Arc::new(pipeline), greeting, Duration::from_secs(1));
        (Arc::new(session), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_greets_once_after_delay() {
        let backend = ScriptedBackend::new();
        let (session, sink) = session(GREETING, &backend);

        let started = tokio::time::Instant::now();
        assert_eq!(session.greet().await, Some(SpeechOutcome::Played));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(session.has_greeted());

        assert_eq!(session.greet().await, None);

        let messages = session.pipeline().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, GREETING);
        assert_eq!(messages[0].emotion, Some(Emotion::Happy));
        assert_eq!(backend.synthesized_texts(), vec![GREETING.to_string()]);
        assert_eq!(sink.states(), vec![TurnState::Speaking, TurnState::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_greetings_greet_once() {
        let backend = ScriptedBackend::new();
        let (session, _sink) = session(GREETING, &backend);

        let a = session.spawn_greeting();
        let b = session.spawn_greeting();
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        assert_eq!(session.pipeline().messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_greeting_disabled() {
        let backend = ScriptedBackend::new();
        let (session, sink) = session("  ", &backend);

        assert_eq!(session.greet().await, None);
        assert!(session.pipeline().messages().is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_without_voice_is_text_only() {
        let backend = ScriptedBackend::new();
        let (session, sink) = session(GREETING, &backend);
        session.pipeline().set_voice_enabled(false);

        assert_eq!(session.greet().await, None);
        assert_eq!(session.pipeline().messages().len(), 1);
        assert_eq!(backend.synthesize_count(), 0);
        assert!(sink.states().is_empty());
    }
}
