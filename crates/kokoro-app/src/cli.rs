//! CLI argument definitions for the Kokoro companion.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use kokoro_core::config::KokoroConfig;

/// Kokoro: a voice and text companion client for the Yuki backend.
#[derive(Parser, Debug, Default)]
#[command(name = "kokoro", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the companion backend, e.g. http://localhost:8000.
    #[arg(short = 'b', long = "backend-url")]
    pub backend_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Start with voice output disabled.
    #[arg(long = "no-voice")]
    pub no_voice: bool,

    /// Skip the start-up greeting.
    #[arg(long = "no-greeting")]
    pub no_greeting: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > KOKORO_CONFIG env var > ~/.kokoro/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("KOKORO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the backend base URL.
    ///
    /// Priority: --backend-url flag > KOKORO_BACKEND_URL env var > config file value.
    pub fn resolve_backend_url(&self, config_url: &str) -> String {
        pick(
            self.backend_url.as_deref(),
            std::env::var("KOKORO_BACKEND_URL").ok().as_deref(),
            config_url,
        )
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        pick(self.log_level.as_deref(), None, config_level)
    }

    /// Resolve the tracing filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        pick(
            self.log_level.as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
            config_level,
        )
    }

    /// Apply every override to a loaded configuration.
    pub fn apply(&self, config: &mut KokoroConfig) {
        config.backend.base_url = self.resolve_backend_url(&config.backend.base_url);
        config.general.log_level = self.resolve_log_level(&config.general.log_level);
        if self.no_voice {
            config.conversation.voice_enabled = false;
        }
        if self.no_greeting {
            config.conversation.greeting.clear();
        }
    }
}

/// First non-blank of flag, env, then config value.
fn pick(flag: Option<&str>, env: Option<&str>, config: &str) -> String {
    flag.into_iter()
        .chain(env)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(config)
        .to_string()
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".kokoro").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".kokoro").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "kokoro",
            "--backend-url",
            "http://10.0.0.5:8000",
            "-l",
            "debug",
            "--no-voice",
        ]);
        assert_eq!(args.backend_url.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.no_voice);
        assert!(!args.no_greeting);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_pick_priority() {
        assert_eq!(pick(Some("flag"), Some("env"), "config"), "flag");
        assert_eq!(pick(None, Some("env"), "config"), "env");
        assert_eq!(pick(None, None, "config"), "config");
        assert_eq!(pick(Some("  "), Some(""), "config"), "config");
    }

    #[test]
    fn test_log_level_flag_beats_rust_log() {
        let args = CliArgs {
            log_level: Some("trace".to_string()),
            ..CliArgs::default()
        };
        assert_eq!(args.resolve_log_filter("info"), "trace");
    }

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs {
            config: Some(PathBuf::from("/etc/kokoro.toml")),
            ..CliArgs::default()
        };
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/kokoro.toml"));
    }

    #[test]
    fn test_apply_overrides() {
        let args = CliArgs {
            backend_url: Some("http://yuki.local:9000".to_string()),
            log_level: Some("warn".to_string()),
            no_voice: true,
            no_greeting: true,
            ..CliArgs::default()
        };
        let mut config = KokoroConfig::default();
        args.apply(&mut config);

        assert_eq!(config.backend.base_url, "http://yuki.local:9000");
        assert_eq!(config.general.log_level, "warn");
        assert!(!config.conversation.voice_enabled);
        assert!(config.conversation.greeting.is_empty());
    }

    #[test]
    fn test_apply_without_flags_keeps_config() {
        let mut config = KokoroConfig::default();
        config.general.log_level = "debug".to_string();
        CliArgs::default().apply(&mut config);

        assert_eq!(config.general.log_level, "debug");
        assert!(config.conversation.voice_enabled);
        assert!(!config.conversation.greeting.is_empty());
    }
}
