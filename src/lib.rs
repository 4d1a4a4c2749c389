//! Voice Display - wake-word voice commands for small status displays
//!
//! Listens to a microphone, recognizes speech offline, and when a transcript
//! contains a wake word executes the configured command, rendering the result
//! on a character-grid LCD, a pixel OLED, or the console.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  frames  ┌──────────────────────────────────────┐
//! │ AudioCapture │ ───────▶ │             VoiceEngine              │
//! └──────────────┘          │ SilenceTracker ─ reset ─▶ Recognizer │
//!                           │ WakeWordDetector ─▶ ActionDispatcher │
//!                           └──────────────────┬───────────────────┘
//!                                              │
//!                           ┌──────────────────▼───────────────────┐
//!                           │   Display: LCD  │  OLED  │  console   │
//!                           └──────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod logging;
pub mod voice;

pub use commands::{
    ActionDispatcher, ActionKind, CommandDescriptor, CommandTable, find_matching_command,
};
pub use config::Config;
pub use display::{Display, DisplayBackend, DisplayMode, select_backend};
pub use engine::VoiceEngine;
pub use error::{Error, Result};
pub use voice::{SilenceTracker, SpeechRecognizer, WakeWordDetector};
