//! Keyword-based emotion classification.
//!
//! Used as the fallback signal when the backend does not tag its reply, and
//! to pre-seed the displayed emotion while a reply is in flight.

use kokoro_core::types::Emotion;

/// Emotion attached to every fixed fallback message.
pub const FALLBACK_EMOTION: Emotion = Emotion::Happy;

const ANGER_KEYWORDS: &[&str] = &["enojo", "enojado", "molesto", "odio", "rabia", "furioso"];
const SHY_KEYWORDS: &[&str] = &["tímido", "sonrojo", "me gustas", "nervioso"];
const JOY_KEYWORDS: &[&str] = &["feliz", "genial", "me alegra", "contento"];

/// Checked in order; the first rule with a matching keyword wins.
const RULES: [(&[&str], Emotion); 3] = [
    (ANGER_KEYWORDS, Emotion::Angry),
    (SHY_KEYWORDS, Emotion::Blush),
    (JOY_KEYWORDS, Emotion::Happy),
];

/// Classify an utterance by case-insensitive substring match.
///
/// Returns `Emotion::Neutral` when nothing matches, including for empty or
/// whitespace-only input.
pub fn classify(utterance: &str) -> Emotion {
    let text = utterance.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, emotion)| *emotion)
        .unwrap_or(Emotion::Neutral)
}

/// The backend's tag when it supplied one, otherwise the local classification.
pub fn resolve(tag: Option<Emotion>, utterance: &str) -> Emotion {
    tag.unwrap_or_else(|| classify(utterance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anger_keywords() {
        for keyword in ANGER_KEYWORDS {
            assert_eq!(classify(&format!("estoy {keyword} hoy")), Emotion::Angry);
        }
        assert_eq!(classify("estoy muy enojado"), Emotion::Angry);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("ESTOY FURIOSO"), Emotion::Angry);
        assert_eq!(classify("Me Gustas Mucho"), Emotion::Blush);
        assert_eq!(classify("SOY TÍMIDO"), Emotion::Blush);
        assert_eq!(classify("¡Qué GENIAL!"), Emotion::Happy);
    }

    #[test]
    fn test_first_rule_wins() {
        // anger outranks joy and shyness
        assert_eq!(classify("me alegra que estés molesto"), Emotion::Angry);
        assert_eq!(classify("me gustas y estoy feliz"), Emotion::Blush);
    }

    #[test]
    fn test_no_match_is_neutral() {
        assert_eq!(classify("hola"), Emotion::Neutral);
        assert_eq!(classify(""), Emotion::Neutral);
        assert_eq!(classify("   "), Emotion::Neutral);
    }

    #[test]
    fn test_substring_matching() {
        // matches inside longer words, like the keyword lists intend
        assert_eq!(classify("felizmente"), Emotion::Happy);
    }

    #[test]
    fn test_resolve_prefers_backend_tag() {
        assert_eq!(resolve(Some(Emotion::Love), "estoy enojado"), Emotion::Love);
        assert_eq!(resolve(None, "estoy enojado"), Emotion::Angry);
        assert_eq!(resolve(None, "hola"), Emotion::Neutral);
    }

    #[test]
    fn test_fallback_emotion_is_not_hostile() {
        assert!(!FALLBACK_EMOTION.is_hostile());
    }
}
