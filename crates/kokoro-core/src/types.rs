//! Domain types shared by the audio, speech, and chat crates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Wall-clock instant used for message timestamps.
pub type Timestamp = DateTime<Utc>;

/// Upper bound for the relationship and annoyance levels.
pub const MAX_LEVEL: u8 = 100;

// =============================================================================
// Emotion
// =============================================================================

/// Affective tag describing the companion's current presentation.
///
/// Exactly one value is current at any instant. It is derived from backend
/// replies or local classification, never set by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Blush,
    Angry,
    Love,
    Annoyed,
}

impl Emotion {
    /// Every variant, in declaration order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Blush,
        Emotion::Angry,
        Emotion::Love,
        Emotion::Annoyed,
    ];

    /// Lowercase wire name of this emotion.
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Blush => "blush",
            Emotion::Angry => "angry",
            Emotion::Love => "love",
            Emotion::Annoyed => "annoyed",
        }
    }

    /// Collapse onto the minimal `{happy, angry}` presentation.
    pub fn reduced(self) -> Emotion {
        match self {
            Emotion::Angry => Emotion::Angry,
            _ => Emotion::Happy,
        }
    }

    /// Whether this emotion reads as hostile toward the user.
    pub fn is_hostile(self) -> bool {
        matches!(self, Emotion::Angry | Emotion::Annoyed)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tag does not name one of the closed emotion variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion tag: {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == tag)
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

// =============================================================================
// Message
// =============================================================================

/// One entry of the conversation log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub is_user: bool,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
}

impl Message {
    /// A message typed or spoken by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            timestamp: Utc::now(),
            emotion: None,
        }
    }

    /// A message produced by the companion, tagged with its emotion.
    pub fn assistant(text: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            timestamp: Utc::now(),
            emotion: Some(emotion),
        }
    }
}

// =============================================================================
// ConversationMemory
// =============================================================================

/// Relationship and context state accumulated across turns.
///
/// The generation backend owns its evolution. The client caches whatever the
/// backend last returned and replaces it wholesale; fields are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub preferences: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient_emotion")]
    pub last_emotion: Emotion,
    #[serde(default, deserialize_with = "clamped_level")]
    pub relationship_level: u8,
    #[serde(default, deserialize_with = "clamped_level")]
    pub annoyance_level: u8,
}

impl ConversationMemory {
    /// Return the memory with both levels clamped into `[0, MAX_LEVEL]`.
    pub fn clamped(mut self) -> Self {
        self.relationship_level = self.relationship_level.min(MAX_LEVEL);
        self.annoyance_level = self.annoyance_level.min(MAX_LEVEL);
        self
    }
}

fn clamped_level<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, f64::from(MAX_LEVEL)) as u8)
}

fn lenient_emotion<'de, D>(deserializer: D) -> Result<Emotion, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|tag| tag.parse::<Emotion>().ok())
        .unwrap_or_default())
}

// =============================================================================
// TurnState
// =============================================================================

/// Stage of the turn pipeline. Exactly one is active per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    Transcribing,
    Generating,
    Speaking,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::Listening => write!(f, "Listening"),
            TurnState::Transcribing => write!(f, "Transcribing"),
            TurnState::Generating => write!(f, "Generating"),
            TurnState::Speaking => write!(f, "Speaking"),
        }
    }
}

impl TurnState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TurnState) -> bool {
        matches!(
            (self, target),
            (TurnState::Idle, TurnState::Listening)
                | (TurnState::Listening, TurnState::Transcribing)
                | (TurnState::Transcribing, TurnState::Generating)
                | (TurnState::Generating, TurnState::Speaking)
                | (TurnState::Speaking, TurnState::Idle)
                // Typed input skips capture and transcription
                | (TurnState::Idle, TurnState::Generating)
                // Unprompted announcements (greeting)
                | (TurnState::Idle, TurnState::Speaking)
                // Error edge, empty-input guard, voice disabled
                | (TurnState::Listening, TurnState::Idle)
                | (TurnState::Transcribing, TurnState::Idle)
                | (TurnState::Generating, TurnState::Idle)
        )
    }

    pub fn is_listening(&self) -> bool {
        *self == TurnState::Listening
    }

    /// Transcription or generation in flight.
    pub fn is_processing(&self) -> bool {
        matches!(self, TurnState::Transcribing | TurnState::Generating)
    }

    pub fn is_speaking(&self) -> bool {
        *self == TurnState::Speaking
    }
}

// =============================================================================
// AudioClip
// =============================================================================

/// A captured utterance: encoded chunks concatenated in capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub chunk_count: usize,
    pub duration: Duration,
}

impl AudioClip {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_display_matches_wire_name() {
        for emotion in Emotion::ALL {
            assert_eq!(emotion.to_string(), emotion.as_str());
            let json = serde_json::to_string(&emotion).unwrap();
            assert_eq!(json, format!("\"{}\"", emotion.as_str()));
        }
    }

    #[test]
    fn test_emotion_parse_is_case_insensitive() {
        assert_eq!("ANGRY".parse::<Emotion>().unwrap(), Emotion::Angry);
        assert_eq!("  Blush ".parse::<Emotion>().unwrap(), Emotion::Blush);
        assert_eq!("love".parse::<Emotion>().unwrap(), Emotion::Love);
    }

    #[test]
    fn test_emotion_parse_unknown() {
        let err = "sad".parse::<Emotion>().unwrap_err();
        assert_eq!(err, UnknownEmotion("sad".to_string()));
        assert!("".parse::<Emotion>().is_err());
    }

    #[test]
    fn test_emotion_reduced() {
        assert_eq!(Emotion::Angry.reduced(), Emotion::Angry);
        assert_eq!(Emotion::Annoyed.reduced(), Emotion::Happy);
        assert_eq!(Emotion::Neutral.reduced(), Emotion::Happy);
        assert_eq!(Emotion::Love.reduced(), Emotion::Happy);
    }

    #[test]
    fn test_emotion_hostility() {
        assert!(Emotion::Angry.is_hostile());
        assert!(Emotion::Annoyed.is_hostile());
        assert!(!Emotion::Happy.is_hostile());
        assert!(!Emotion::Neutral.is_hostile());
    }

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hola");
        assert!(m.is_user);
        assert!(m.emotion.is_none());

        let m = Message::assistant("¡Hola!", Emotion::Happy);
        assert!(!m.is_user);
        assert_eq!(m.emotion, Some(Emotion::Happy));
    }

    #[test]
    fn test_message_wire_format_is_camel_case() {
        let json = serde_json::to_value(Message::user("hola")).unwrap();
        assert_eq!(json["isUser"], true);
        assert_eq!(json["text"], "hola");
        assert!(json.get("emotion").is_none());
    }

    #[test]
    fn test_memory_default() {
        let m = ConversationMemory::default();
        assert!(m.user_name.is_none());
        assert!(m.topics.is_empty());
        assert!(m.preferences.is_empty());
        assert_eq!(m.last_emotion, Emotion::Neutral);
        assert_eq!(m.relationship_level, 0);
        assert_eq!(m.annoyance_level, 0);
    }

    #[test]
    fn test_memory_deserialize_backend_shape() {
        let json = r#"{
            "userName": "Carlos",
            "topics": ["anime", "musica", "anime"],
            "lastEmotion": "love",
            "relationshipLevel": 15,
            "annoyanceLevel": 0
        }"#;
        let m: ConversationMemory = serde_json::from_str(json).unwrap();
        assert_eq!(m.user_name.as_deref(), Some("Carlos"));
        assert_eq!(m.topics.len(), 2);
        assert!(m.preferences.is_empty());
        assert_eq!(m.last_emotion, Emotion::Love);
        assert_eq!(m.relationship_level, 15);
    }

    #[test]
    fn test_memory_levels_clamp_on_deserialize() {
        let json = r#"{"relationshipLevel": 140, "annoyanceLevel": -20}"#;
        let m: ConversationMemory = serde_json::from_str(json).unwrap();
        assert_eq!(m.relationship_level, 100);
        assert_eq!(m.annoyance_level, 0);
    }

    #[test]
    fn test_memory_null_level_and_unknown_emotion() {
        let json = r#"{"relationshipLevel": null, "lastEmotion": "melancholy"}"#;
        let m: ConversationMemory = serde_json::from_str(json).unwrap();
        assert_eq!(m.relationship_level, 0);
        assert_eq!(m.last_emotion, Emotion::Neutral);
    }

    #[test]
    fn test_memory_clamped() {
        let m = ConversationMemory {
            relationship_level: 250,
            annoyance_level: 101,
            ..ConversationMemory::default()
        }
        .clamped();
        assert_eq!(m.relationship_level, 100);
        assert_eq!(m.annoyance_level, 100);
    }

    #[test]
    fn test_turn_state_display() {
        assert_eq!(TurnState::Idle.to_string(), "Idle");
        assert_eq!(TurnState::Listening.to_string(), "Listening");
        assert_eq!(TurnState::Transcribing.to_string(), "Transcribing");
        assert_eq!(TurnState::Generating.to_string(), "Generating");
        assert_eq!(TurnState::Speaking.to_string(), "Speaking");
    }

    #[test]
    fn test_valid_transitions() {
        // Voice turn
        assert!(TurnState::Idle.can_transition_to(&TurnState::Listening));
        assert!(TurnState::Listening.can_transition_to(&TurnState::Transcribing));
        assert!(TurnState::Transcribing.can_transition_to(&TurnState::Generating));
        assert!(TurnState::Generating.can_transition_to(&TurnState::Speaking));
        assert!(TurnState::Speaking.can_transition_to(&TurnState::Idle));

        // Text turn and greeting
        assert!(TurnState::Idle.can_transition_to(&TurnState::Generating));
        assert!(TurnState::Idle.can_transition_to(&TurnState::Speaking));

        // Error edges
        assert!(TurnState::Listening.can_transition_to(&TurnState::Idle));
        assert!(TurnState::Transcribing.can_transition_to(&TurnState::Idle));
        assert!(TurnState::Generating.can_transition_to(&TurnState::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!TurnState::Idle.can_transition_to(&TurnState::Transcribing));
        assert!(!TurnState::Listening.can_transition_to(&TurnState::Generating));
        assert!(!TurnState::Speaking.can_transition_to(&TurnState::Listening));
        assert!(!TurnState::Generating.can_transition_to(&TurnState::Listening));

        for state in [
            TurnState::Idle,
            TurnState::Listening,
            TurnState::Transcribing,
            TurnState::Generating,
            TurnState::Speaking,
        ] {
            assert!(!state.can_transition_to(&state), "{state} -> {state}");
        }
    }

    #[test]
    fn test_turn_state_flags_are_exclusive() {
        for state in [
            TurnState::Idle,
            TurnState::Listening,
            TurnState::Transcribing,
            TurnState::Generating,
            TurnState::Speaking,
        ] {
            let active = [state.is_listening(), state.is_processing(), state.is_speaking()]
                .iter()
                .filter(|f| **f)
                .count();
            let expected = usize::from(state != TurnState::Idle);
            assert_eq!(active, expected, "{state}");
        }
    }

    #[test]
    fn test_audio_clip_is_empty() {
        let clip = AudioClip {
            bytes: vec![],
            mime_type: "audio/webm".to_string(),
            chunk_count: 0,
            duration: Duration::ZERO,
        };
        assert!(clip.is_empty());
    }
}
