//! Wake word detection
//!
//! Wake words are matched against final transcripts: a transcript authorizes
//! command dispatch when it contains any configured wake word.

/// Detects wake words in transcripts
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    wake_words: Vec<String>,
}

impl WakeWordDetector {
    /// Create a new wake word detector
    ///
    /// # Arguments
    ///
    /// * `wake_words` - List of wake words to detect (e.g., "pi")
    #[must_use]
    pub fn new(wake_words: Vec<String>) -> Self {
        let normalized: Vec<String> = wake_words
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(wake_words = ?normalized, "wake word detector initialized");

        Self {
            wake_words: normalized,
        }
    }

    /// Return the first wake word contained in `transcript`
    #[must_use]
    pub fn detect(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();

        let found = self
            .wake_words
            .iter()
            .find(|w| normalized.contains(w.as_str()))
            .map(String::as_str);

        if let Some(wake_word) = found {
            tracing::info!(wake_word, transcript, "wake word detected");
        }

        found
    }

    /// Check if transcribed text contains a wake word
    #[must_use]
    pub fn check_wake_word(&self, transcript: &str) -> bool {
        self.detect(transcript).is_some()
    }

    /// Get the configured wake words
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_word_detection() {
        let detector = WakeWordDetector::new(vec!["pie".to_string()]);

        assert!(!detector.check_wake_word("hello world"));
        assert!(detector.check_wake_word("Pie, what time is it?"));
    }

    #[test]
    fn test_first_configured_word_wins() {
        let detector = WakeWordDetector::new(vec!["pi".to_string(), "pie".to_string()]);
        assert_eq!(detector.detect("hey pie show ip"), Some("pi"));
    }

    #[test]
    fn test_empty_words_are_dropped() {
        let detector = WakeWordDetector::new(vec!["  ".to_string(), "Orin".to_string()]);
        assert_eq!(detector.wake_words(), &["orin"]);
        assert!(!detector.check_wake_word(""));
    }
}
