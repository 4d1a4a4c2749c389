//! Voice processing module
//!
//! Handles audio capture, silence-adaptive recognizer resets, streaming
//! recognition, and wake word detection.

mod capture;
mod history;
mod recognizer;
mod silence;
mod wake_word;

pub use capture::{
    AudioCapture, FrameAssembler, FrameReceiver, FrameSource, f32_to_i16, frame_queue,
};
pub use history::{BoundedHistory, CommandHistoryEntry, TranscriptEntry};
pub use recognizer::{SpeechRecognizer, open_recognizer, speech_available};
pub use silence::{
    Classification, ResetReason, SilencePolicy, SilenceTracker, frame_loudness,
};
pub use wake_word::WakeWordDetector;
