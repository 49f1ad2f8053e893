//! Control vocabulary matching
//!
//! Phrases are matched as case-insensitive substrings of the transcript
//! or typed text.

use crate::config::VoiceConfig;

/// Termination and resume phrases, stored lower-cased
#[derive(Debug, Clone)]
pub struct ControlPhrases {
    termination: Vec<String>,
    resume: String,
}

impl ControlPhrases {
    pub fn new<I, S>(termination: I, resume: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            termination: termination
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            resume: resume.into().to_lowercase(),
        }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(&config.termination_phrases, config.resume_phrase.clone())
    }

    /// Whether `text` contains any termination phrase
    pub fn is_termination(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let text = text.to_lowercase();
        self.termination.iter().any(|p| text.contains(p.as_str()))
    }

    /// Whether `text` contains the resume phrase
    pub fn is_resume(&self, text: &str) -> bool {
        !self.resume.is_empty() && text.to_lowercase().contains(&self.resume)
    }

    pub fn resume_phrase(&self) -> &str {
        &self.resume
    }
}

impl Default for ControlPhrases {
    fn default() -> Self {
        Self::from_config(&VoiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_substring_match() {
        let phrases = ControlPhrases::default();
        assert!(phrases.is_termination("okay bye now"));
        assert!(phrases.is_termination("please STOP Listening"));
        assert!(phrases.is_termination("exit"));
        assert!(!phrases.is_termination("hello world"));
        assert!(!phrases.is_termination(""));
    }

    #[test]
    fn test_resume_phrase() {
        let phrases = ControlPhrases::default();
        assert!(phrases.is_resume("Start Listening please"));
        assert!(!phrases.is_resume("start"));
        assert_eq!(phrases.resume_phrase(), "start listening");
    }

    #[test]
    fn test_custom_vocabulary() {
        let phrases = ControlPhrases::new(["Goodbye"], "Wake Up");
        assert!(phrases.is_termination("ok goodbye"));
        assert!(!phrases.is_termination("bye"));
        assert!(phrases.is_resume("wake up now"));
    }
}
