use serde::Serialize;

use crate::types::{ConversationMemory, Emotion, Message, Timestamp, TurnState};

/// Updates published by the turn pipeline to the presentation layer.
///
/// The rendering surface (2D portrait, 3D viewer, terminal) consumes these
/// and never writes back. Events for one session arrive in the order the
/// pipeline produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum PresentationEvent {
    /// The pipeline moved between turn stages.
    StateChanged {
        from: TurnState,
        to: TurnState,
        timestamp: Timestamp,
    },

    /// The current emotion changed.
    EmotionChanged {
        emotion: Emotion,
        timestamp: Timestamp,
    },

    /// A message was appended to the conversation log.
    MessageAppended { message: Message },

    /// The backend returned a new conversation memory.
    MemoryReplaced { memory: ConversationMemory },

    /// The connection-error banner should be shown or hidden.
    ConnectionError { active: bool },

    /// A user-visible alert that does not belong in the message log.
    Notice { text: String },
}

impl PresentationEvent {
    /// Short stable name, used as a log field.
    pub fn event_name(&self) -> &'static str {
        match self {
            PresentationEvent::StateChanged { .. } => "state_changed",
            PresentationEvent::EmotionChanged { .. } => "emotion_changed",
            PresentationEvent::MessageAppended { .. } => "message_appended",
            PresentationEvent::MemoryReplaced { .. } => "memory_replaced",
            PresentationEvent::ConnectionError { .. } => "connection_error",
            PresentationEvent::Notice { .. } => "notice",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_event_names_match_serde_tag() {
        let events = vec![
            PresentationEvent::StateChanged {
                from: TurnState::Idle,
                to: TurnState::Generating,
                timestamp: Utc::now(),
            },
            PresentationEvent::EmotionChanged {
                emotion: Emotion::Angry,
                timestamp: Utc::now(),
            },
            PresentationEvent::MessageAppended {
                message: Message::user("hola"),
            },
            PresentationEvent::MemoryReplaced {
                memory: ConversationMemory::default(),
            },
            PresentationEvent::ConnectionError { active: true },
            PresentationEvent::Notice {
                text: "No se pudo acceder al micrófono.".to_string(),
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_name());
        }
    }

    #[test]
    fn test_state_changed_serializes_snake_case_states() {
        let event = PresentationEvent::StateChanged {
            from: TurnState::Generating,
            to: TurnState::Speaking,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "generating");
        assert_eq!(json["to"], "speaking");
    }
}
