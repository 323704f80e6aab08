//! Presentation sink contract and the emotion-to-appearance mapping.

use std::sync::{Mutex, PoisonError};

use kokoro_core::events::PresentationEvent;
use kokoro_core::types::{Emotion, TurnState};

/// Receives every observable change made by the turn pipeline.
///
/// Implementations are owned by the rendering layer. They must not block and
/// never feed back into the pipeline.
pub trait PresentationSink: Send + Sync {
    fn handle(&self, event: &PresentationEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn handle(&self, _event: &PresentationEvent) {}
}

/// Keeps every event in arrival order, for tests and replay.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PresentationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresentationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every emotion published, in order.
    pub fn emotions(&self) -> Vec<Emotion> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresentationEvent::EmotionChanged { emotion, .. } => Some(emotion),
                _ => None,
            })
            .collect()
    }

    /// Every state entered, in order.
    pub fn states(&self) -> Vec<TurnState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresentationEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    /// Every connection-error flag value published, in order.
    pub fn connection_flags(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresentationEvent::ConnectionError { active } => Some(active),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresentationEvent::Notice { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl PresentationSink for RecordingSink {
    fn handle(&self, event: &PresentationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// How the avatar presents one emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appearance {
    pub label: &'static str,
    /// Portrait for the 2D presentation.
    pub portrait: &'static str,
    /// Material colour for the 3D presentation.
    pub tint: &'static str,
    pub hostile: bool,
}

const HAPPY_PORTRAIT: &str = "/images/happy.jpeg";
const ANGRY_PORTRAIT: &str = "/images/angry.jpeg";
const DEFAULT_TINT: &str = "#dda0dd";

/// Static appearance of each emotion.
pub const fn appearance(emotion: Emotion) -> Appearance {
    match emotion {
        Emotion::Neutral => Appearance {
            label: "neutral",
            portrait: HAPPY_PORTRAIT,
            tint: DEFAULT_TINT,
            hostile: false,
        },
        Emotion::Happy => Appearance {
            label: "happy",
            portrait: HAPPY_PORTRAIT,
            tint: "#ff69b4",
            hostile: false,
        },
        Emotion::Blush => Appearance {
            label: "blush",
            portrait: HAPPY_PORTRAIT,
            tint: "#ffb6c1",
            hostile: false,
        },
        Emotion::Angry => Appearance {
            label: "angry",
            portrait: ANGRY_PORTRAIT,
            tint: "#ff4444",
            hostile: true,
        },
        Emotion::Love => Appearance {
            label: "love",
            portrait: HAPPY_PORTRAIT,
            tint: "#ff1493",
            hostile: false,
        },
        Emotion::Annoyed => Appearance {
            label: "annoyed",
            portrait: HAPPY_PORTRAIT,
            tint: DEFAULT_TINT,
            hostile: true,
        },
    }
}
