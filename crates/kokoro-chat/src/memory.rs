//! Session-scoped cache of the backend-owned conversation memory.

use std::sync::{PoisonError, RwLock};

use kokoro_core::types::ConversationMemory;

/// Holds the memory most recently returned by the generation backend.
///
/// Readers always observe a whole memory value: `replace` swaps it under a
/// write lock and never merges fields.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: RwLock<ConversationMemory>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current memory.
    pub fn current(&self) -> ConversationMemory {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the memory wholesale, clamping both levels into range.
    pub fn replace(&self, next: ConversationMemory) {
        let next = next.clamped();
        tracing::debug!(
            relationship = next.relationship_level,
            annoyance = next.annoyance_level,
            topics = next.topics.len(),
            "Conversation memory replaced"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kokoro_core::types::Emotion;

    #[test]
    fn test_initial_value() {
        let store = MemoryStore::new();
        assert_eq!(store.current(), ConversationMemory::default());
    }

    #[test]
    fn test_replace_is_not_a_merge() {
        let store = MemoryStore::new();
        store.replace(ConversationMemory {
            user_name: Some("Carlos".to_string()),
            topics: ["anime".to_string()].into_iter().collect(),
            relationship_level: 40,
            ..ConversationMemory::default()
        });

        let next = ConversationMemory {
            last_emotion: Emotion::Love,
            relationship_level: 45,
            ..ConversationMemory::default()
        };
        store.replace(next.clone());

        let current = store.current();
        assert_eq!(current, next);
        assert!(current.user_name.is_none());
        assert!(current.topics.is_empty());
    }

    #[test]
    fn test_replace_clamps_levels() {
        let store = MemoryStore::new();
        store.replace(ConversationMemory {
            relationship_level: 180,
            annoyance_level: 255,
            ..ConversationMemory::default()
        });
        let current = store.current();
        assert_eq!(current.relationship_level, 100);
        assert_eq!(current.annoyance_level, 100);
    }
}
