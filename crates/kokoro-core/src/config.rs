use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KokoroError, Result};

/// Top-level configuration for the companion client.
///
/// Loaded from `~/.kokoro/config.toml` by default. Every section falls back
/// to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KokoroConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

impl KokoroConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KokoroConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KokoroError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Location of the transcription, generation, and synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub transcribe_path: String,
    pub chat_path: String,
    pub synthesize_path: String,
    pub health_path: String,
    /// Per-request ceiling applied by the HTTP client.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            transcribe_path: "/api/speech-to-text".to_string(),
            chat_path: "/api/chat".to_string(),
            synthesize_path: "/api/text-to-speech".to_string(),
            health_path: "/health".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Turn pipeline behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of trailing messages sent with each generation request.
    pub history_window: usize,
    /// Longest typed message accepted, in characters.
    pub max_message_chars: usize,
    /// Speak replies aloud.
    pub voice_enabled: bool,
    /// Greeting appended once per session. Empty disables it.
    pub greeting: String,
    pub greeting_delay_ms: u64,
    /// Ceiling for each backend stage (transcribe, generate, synthesize).
    pub stage_timeout_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_message_chars: 2000,
            voice_enabled: true,
            greeting: "¡Hola mi amor! Soy Yuki, tu novia virtual. ¿Cómo estás hoy?".to_string(),
            greeting_delay_ms: 1000,
            stage_timeout_secs: 30,
        }
    }
}

impl ConversationConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.greeting_delay_ms)
    }
}

/// Capture and playback devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Recording ceiling for one utterance, in milliseconds.
    pub max_capture_ms: u64,
    /// Pre-recorded utterance streamed as microphone input. `None` means no
    /// microphone is available.
    pub microphone_file: Option<String>,
    /// Player invoked for synthesized audio; `{file}` is replaced with the
    /// staged audio path, or the path is appended when absent.
    pub player_command: Vec<String>,
    /// Directory where synthesized audio is staged during playback.
    pub output_dir: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_capture_ms: 5000,
            microphone_file: None,
            player_command: vec!["aplay".to_string(), "-q".to_string(), "{file}".to_string()],
            output_dir: std::env::temp_dir().to_string_lossy().to_string(),
        }
    }
}

impl AudioConfig {
    pub fn max_capture(&self) -> Duration {
        Duration::from_millis(self.max_capture_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = KokoroConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.conversation.history_window, 10);
        assert_eq!(config.conversation.stage_timeout(), Duration::from_secs(30));
        assert!(config.conversation.voice_enabled);
        assert_eq!(config.audio.max_capture(), Duration::from_secs(5));
        assert!(config.audio.microphone_file.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[general]
log_level = "debug"

[backend]
base_url = "http://10.0.0.2:9000"
request_timeout_secs = 12

[conversation]
history_window = 4
voice_enabled = false
greeting = ""

[audio]
max_capture_ms = 2500
microphone_file = "/tmp/utterance.webm"
player_command = ["paplay"]
"#,
        );

        let config = KokoroConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.backend.base_url, "http://10.0.0.2:9000");
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(12));
        // Unspecified keys keep their defaults
        assert_eq!(config.backend.chat_path, "/api/chat");
        assert_eq!(config.conversation.history_window, 4);
        assert!(!config.conversation.voice_enabled);
        assert!(config.conversation.greeting.is_empty());
        assert_eq!(config.audio.max_capture_ms, 2500);
        assert_eq!(
            config.audio.microphone_file.as_deref(),
            Some("/tmp/utterance.webm")
        );
        assert_eq!(config.audio.player_command, vec!["paplay".to_string()]);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = KokoroConfig::load(file.path()).unwrap();
        assert_eq!(config.backend.transcribe_path, "/api/speech-to-text");
        assert_eq!(config.backend.synthesize_path, "/api/text-to-speech");
        assert_eq!(config.conversation.max_message_chars, 2000);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[backend\nbase_url = ");
        let result = KokoroConfig::load(file.path());
        assert!(matches!(result, Err(KokoroError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = KokoroConfig::load_or_default(Path::new("/nonexistent/kokoro.toml"));
        assert_eq!(config.conversation.history_window, 10);
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = KokoroConfig::default();
        config.conversation.history_window = 6;
        config.audio.microphone_file = Some("mic.webm".to_string());
        config.save(&path).unwrap();

        let loaded = KokoroConfig::load(&path).unwrap();
        assert_eq!(loaded.conversation.history_window, 6);
        assert_eq!(loaded.audio.microphone_file.as_deref(), Some("mic.webm"));
    }
}
