use thiserror::Error;

/// Top-level error type for the companion client.
///
/// Audio devices and backend clients report failures through this enum. The
/// turn pipeline absorbs every variant into a recovered outcome; none of them
/// is fatal to a session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KokoroError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for KokoroError {
    fn from(err: toml::de::Error) -> Self {
        KokoroError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KokoroError {
    fn from(err: toml::ser::Error) -> Self {
        KokoroError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KokoroError {
    fn from(err: serde_json::Error) -> Self {
        KokoroError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for companion operations.
pub type Result<T> = std::result::Result<T, KokoroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(KokoroError, &str)> = vec![
            (
                KokoroError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                KokoroError::Audio("no device".to_string()),
                "Audio error: no device",
            ),
            (
                KokoroError::PermissionDenied("blocked".to_string()),
                "Microphone permission denied: blocked",
            ),
            (
                KokoroError::Transcription("HTTP 500".to_string()),
                "Transcription error: HTTP 500",
            ),
            (
                KokoroError::Generation("unreachable".to_string()),
                "Generation error: unreachable",
            ),
            (
                KokoroError::Synthesis("model not loaded".to_string()),
                "Synthesis error: model not loaded",
            ),
            (
                KokoroError::Playback("decode failed".to_string()),
                "Playback error: decode failed",
            ),
            (
                KokoroError::Timeout {
                    stage: "generate".to_string(),
                    secs: 30,
                },
                "generate timed out after 30s",
            ),
            (
                KokoroError::Http("connection refused".to_string()),
                "HTTP error: connection refused",
            ),
            (
                KokoroError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KokoroError = io_err.into();
        assert!(matches!(err, KokoroError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: KokoroError = err.unwrap_err().into();
        assert!(matches!(err, KokoroError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: KokoroError = err.unwrap_err().into();
        assert!(matches!(err, KokoroError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
