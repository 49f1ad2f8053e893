//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket front-ends attach to
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Voice session tuning
    pub voice: VoiceConfig,
}

/// Timing constants and control vocabulary for the voice session
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Language tag handed to the recognition engine at start
    pub language: String,

    /// Silence after the last final transcript before an utterance is submitted
    pub silence_threshold: Duration,

    /// Engine start attempts per intent, the immediate first one included
    pub max_retries: u32,

    /// Delay after the first failed attempt; doubles after each further failure
    pub retry_base_delay: Duration,

    /// Final transcripts must be strictly longer than this to be submitted
    pub min_utterance_chars: usize,

    /// Delay between handing off an utterance and clearing the input
    pub input_clear_delay: Duration,

    /// Spoken phrases that stop listening
    pub termination_phrases: Vec<String>,

    /// Typed phrase that restarts listening
    pub resume_phrase: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            silence_threshold: Duration::from_millis(1500),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            min_utterance_chars: 2,
            input_clear_delay: Duration::from_millis(100),
            termination_phrases: vec![
                "stop listening".to_string(),
                "bye".to_string(),
                "exit".to_string(),
            ],
            resume_phrase: "start listening".to_string(),
        }
    }
}

impl VoiceConfig {
    /// Apply `VOICE_SESSION_*` environment overrides
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(language) = std::env::var("VOICE_SESSION_LANG") {
            self.language = language;
        }
        if let Some(threshold) = env_millis("VOICE_SESSION_SILENCE_MS")? {
            self.silence_threshold = threshold;
        }
        if let Some(base) = env_millis("VOICE_SESSION_RETRY_BASE_MS")? {
            self.retry_base_delay = base;
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Self::from_home(Path::new(&home))
    }

    /// Derive paths under `home`, then apply environment overrides
    fn from_home(home: &Path) -> Result<Self> {
        let data_dir = home
            .join(".local")
            .join("share")
            .join("voice-session");

        let socket_path = match std::env::var("VOICE_SESSION_SOCKET") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_dir.join("voice-session.sock"),
        };

        let mut voice = VoiceConfig::default();
        voice.apply_env()?;

        Ok(Self {
            socket_path,
            data_dir,
            voice,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

/// Read an optional millisecond duration from the environment
fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(raw) => {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of milliseconds, got {raw:?}"))?;
            Ok(Some(Duration::from_millis(millis)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths_under_home() {
        let config = Config::from_home(Path::new("/home/tester")).unwrap();
        assert_eq!(
            config.data_dir,
            PathBuf::from("/home/tester/.local/share/voice-session")
        );
        if std::env::var("VOICE_SESSION_SOCKET").is_err() {
            assert_eq!(config.socket_path, config.data_dir.join("voice-session.sock"));
        }
    }

    #[test]
    fn test_default_vocabulary() {
        let voice = VoiceConfig::default();
        assert_eq!(voice.termination_phrases.len(), 3);
        assert_eq!(voice.resume_phrase, "start listening");
        assert_eq!(voice.silence_threshold, Duration::from_millis(1500));
    }

    #[test]
    fn test_env_millis_missing_is_none() {
        assert!(env_millis("VOICE_SESSION_TEST_UNSET_KEY").unwrap().is_none());
    }
}
