//! Terminal presentation of pipeline events.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use kokoro_chat::{appearance, PresentationSink};
use kokoro_core::events::PresentationEvent;
use kokoro_core::types::{Message, TurnState};

const ASSISTANT_NAME: &str = "Yuki";

/// Renders presentation events as lines of text.
pub struct TerminalRenderer<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Print a line that is not tied to an event.
    pub fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Failed to write to terminal");
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> PresentationSink for TerminalRenderer<W> {
    fn handle(&self, event: &PresentationEvent) {
        if let Some(text) = format_event(event) {
            self.line(&text);
        }
    }
}

fn format_message(message: &Message) -> String {
    let time = message.timestamp.format("%H:%M");
    if message.is_user {
        return format!("[{time}] Tú: {}", message.text);
    }
    match message.emotion {
        Some(emotion) => format!(
            "[{time}] {ASSISTANT_NAME} ({}): {}",
            appearance(emotion).label,
            message.text
        ),
        None => format!("[{time}] {ASSISTANT_NAME}: {}", message.text),
    }
}

fn format_status(state: TurnState) -> Option<&'static str> {
    match state {
        TurnState::Idle => None,
        TurnState::Listening => Some("🎤 Escuchando... (/stop para terminar)"),
        TurnState::Transcribing => Some("… Transcribiendo"),
        TurnState::Generating => Some("… Pensando"),
        TurnState::Speaking => Some("🔊 Hablando"),
    }
}

/// One line for the events worth showing in a terminal.
fn format_event(event: &PresentationEvent) -> Option<String> {
    match event {
        PresentationEvent::MessageAppended { message } => Some(format_message(message)),
        PresentationEvent::StateChanged { to, .. } => format_status(*to).map(str::to_string),
        PresentationEvent::EmotionChanged { emotion, .. } => {
            let look = appearance(*emotion);
            Some(format!("   ~ {} [{} {}]", look.label, look.portrait, look.tint))
        }
        PresentationEvent::ConnectionError { active: true } => {
            Some("⚠ Problemas de conexión con el servidor".to_string())
        }
        PresentationEvent::ConnectionError { active: false } => {
            Some("✓ Conexión restablecida".to_string())
        }
        PresentationEvent::Notice { text } => Some(format!("! {text}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kokoro_core::types::{ConversationMemory, Emotion};

    fn rendered(events: &[PresentationEvent]) -> String {
        let renderer = TerminalRenderer::new(Vec::new());
        for event in events {
            renderer.handle(event);
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_messages_rendered_with_speaker() {
        let out = rendered(&[
            PresentationEvent::MessageAppended {
                message: Message::user("hola"),
            },
            PresentationEvent::MessageAppended {
                message: Message::assistant("¡Hola amor!", Emotion::Love),
            },
        ]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Tú: hola"));
        assert!(lines[1].ends_with("Yuki (love): ¡Hola amor!"));
    }

    #[test]
    fn test_idle_and_memory_are_silent() {
        let out = rendered(&[
            PresentationEvent::MemoryReplaced {
                memory: ConversationMemory::default(),
            },
            PresentationEvent::StateChanged {
                from: TurnState::Speaking,
                to: TurnState::Idle,
                timestamp: Message::user("x").timestamp,
            },
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_emotion_shows_appearance() {
        let out = rendered(&[PresentationEvent::EmotionChanged {
            emotion: Emotion::Angry,
            timestamp: Message::user("x").timestamp,
        }]);
        assert!(out.contains("angry"));
        assert!(out.contains("/images/angry.jpeg"));
        assert!(out.contains("#ff4444"));
    }

    #[test]
    fn test_connection_banner_and_notice() {
        let out = rendered(&[
            PresentationEvent::ConnectionError { active: true },
            PresentationEvent::Notice {
                text: "No se pudo acceder al micrófono.".to_string(),
            },
            PresentationEvent::ConnectionError { active: false },
        ]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('⚠'));
        assert_eq!(lines[1], "! No se pudo acceder al micrófono.");
        assert!(lines[2].starts_with('✓'));
    }
}
