//! Voice engine - the orchestration loop
//!
//! One sequential pass per audio frame: tick the display, classify silence
//! (resetting the recognizer when due), feed the recognizer, and on a final
//! transcript show it, check the wake word and dispatch the command. Display
//! hold times are awaited inside this pass, so frames arriving meanwhile wait
//! in the capture queue or are dropped once it is full.

use std::future::Future;
use std::time::Duration;

use chrono::Local;

use crate::commands::{ActionDispatcher, CommandTable, DispatchContext};
use crate::config::Config;
use crate::display::{Display, DisplayMode, DisplaySession, ScrollLine, ScrollSpan};
use crate::voice::{
    BoundedHistory, Classification, CommandHistoryEntry, FrameSource, SilencePolicy,
    SilenceTracker, SpeechRecognizer, TranscriptEntry, WakeWordDetector,
};
use crate::Result;

/// Header shown above heard transcripts
pub const HEARD_HEADER: &str = "Heard:";

/// Pause between the header and a scrolled transcript
const HEARD_LEAD_IN: Duration = Duration::from_millis(500);

/// Static view after a scrolled transcript
const HEARD_TAIL: Duration = Duration::from_secs(1);

/// Engine settings taken from the configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub show_all_transcriptions: bool,
    pub short_text_display_time: Duration,
    pub heard_text_cycles: u32,
    pub startup_message: (String, String),
    pub idle_message: (String, String),
    pub text_buffer_size: usize,
    /// Command history capacity, `None` when disabled
    pub command_history: Option<usize>,
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            show_all_transcriptions: config.voice.show_all_transcriptions,
            short_text_display_time: config.display.short_text_display_time,
            heard_text_cycles: config.display.heard_text_cycles,
            startup_message: config.display.startup_message.clone(),
            idle_message: config.display.idle_message.clone(),
            text_buffer_size: config.voice.text_buffer_size,
            command_history: config
                .advanced
                .enable_command_history
                .then_some(config.advanced.max_command_history),
        }
    }
}

/// What happened to one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub classification: Classification,
    /// Final transcript produced by this frame
    pub transcript: Option<String>,
    /// Set when the transcript contained a wake word
    pub wake_word: Option<String>,
    /// Command executed for the transcript
    pub command: Option<String>,
}

/// The voice command loop and everything it owns
pub struct VoiceEngine {
    display: Display,
    session: DisplaySession,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    silence: SilenceTracker,
    wake_words: WakeWordDetector,
    commands: CommandTable,
    dispatcher: ActionDispatcher,
    settings: EngineSettings,
    transcripts: BoundedHistory<TranscriptEntry>,
    history: Option<BoundedHistory<CommandHistoryEntry>>,
    shut_down: bool,
}

impl VoiceEngine {
    /// Assemble an engine from configuration and the selected display
    ///
    /// A missing recognizer puts the engine in display-only mode.
    #[must_use]
    pub fn new(
        config: &Config,
        display: Display,
        session: DisplaySession,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
    ) -> Self {
        Self::with_parts(
            display,
            session,
            recognizer,
            SilencePolicy::from(&config.voice),
            WakeWordDetector::new(config.voice.wake_words.clone()),
            config.commands.clone(),
            ActionDispatcher::new(DispatchContext::from_config(config)),
            EngineSettings::from_config(config),
        )
    }

    /// Assemble an engine from explicit parts
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn with_parts(
        display: Display,
        session: DisplaySession,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        policy: SilencePolicy,
        wake_words: WakeWordDetector,
        commands: CommandTable,
        dispatcher: ActionDispatcher,
        settings: EngineSettings,
    ) -> Self {
        let history = settings.command_history.map(BoundedHistory::new);

        Self {
            display,
            session,
            recognizer,
            silence: SilenceTracker::new(policy, now()),
            wake_words,
            commands,
            dispatcher,
            transcripts: BoundedHistory::new(settings.text_buffer_size),
            history,
            settings,
            shut_down: false,
        }
    }

    /// Whether a recognizer is attached
    #[must_use]
    pub const fn speech_enabled(&self) -> bool {
        self.recognizer.is_some()
    }

    #[must_use]
    pub fn display_mode(&self) -> DisplayMode {
        self.display.mode()
    }

    #[must_use]
    pub const fn display(&self) -> &Display {
        &self.display
    }

    #[must_use]
    pub const fn session(&self) -> &DisplaySession {
        &self.session
    }

    /// Recent final transcripts, oldest first
    #[must_use]
    pub const fn transcripts(&self) -> &BoundedHistory<TranscriptEntry> {
        &self.transcripts
    }

    /// Dispatched utterances, when history is enabled
    #[must_use]
    pub const fn command_history(&self) -> Option<&BoundedHistory<CommandHistoryEntry>> {
        self.history.as_ref()
    }

    #[must_use]
    pub const fn silence(&self) -> &SilenceTracker {
        &self.silence
    }

    /// Run until `shutdown` resolves or the frame source ends
    ///
    /// The display is cleared and any stopped rendering service restarted on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns error if the frame source fails
    #[allow(clippy::future_not_send)]
    pub async fn run<F>(&mut self, source: &mut dyn FrameSource, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.show_startup();

        let result = tokio::select! {
            () = shutdown => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            result = self.listen(source) => result,
        };

        self.shutdown();
        result
    }

    #[allow(clippy::future_not_send)]
    async fn listen(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        if self.recognizer.is_none() {
            tracing::warn!("speech recognition not available, running display-only");
            let tick = self.display.timing().render_tick.max(Duration::from_millis(10));
            loop {
                tokio::time::sleep(tick).await;
                self.display.tick();
            }
        }

        tracing::info!(wake_words = ?self.wake_words.wake_words(), "listening for wake words");

        while let Some(frame) = source.read_frame().await? {
            self.process_frame(&frame).await;
        }

        tracing::info!("audio source ended");
        Ok(())
    }

    /// Show the startup message
    pub fn show_startup(&mut self) {
        let (line1, line2) = self.settings.startup_message.clone();
        self.display.show(&line1, &line2);
    }

    /// Return the display to the idle indicator
    pub fn show_idle(&mut self) {
        let (line1, line2) = self.settings.idle_message.clone();
        self.display.show(&line1, &line2);
    }

    /// Process one audio frame
    #[allow(clippy::future_not_send)]
    pub async fn process_frame(&mut self, frame: &[i16]) -> FrameReport {
        self.display.tick();

        let classification = self.silence.classify_at(frame, now());
        let mut report = FrameReport {
            classification,
            transcript: None,
            wake_word: None,
            command: None,
        };

        let Some(recognizer) = self.recognizer.as_mut() else {
            return report;
        };

        if let Some(reason) = classification.reset {
            tracing::debug!(?reason, "resetting recognizer");
            recognizer.reset();
        }

        let text = match recognizer.accept_frame(frame) {
            Ok(Some(text)) => text,
            Ok(None) => return report,
            Err(e) => {
                tracing::warn!(error = %e, "recognizer rejected frame");
                return report;
            }
        };

        let outcome = self.handle_transcript(&text).await;
        report.transcript = Some(text);
        report.wake_word = outcome.0;
        report.command = outcome.1;
        report
    }

    /// Route a final transcript
    ///
    /// Returns the detected wake word and the executed command, if any.
    #[allow(clippy::future_not_send)]
    pub async fn handle_transcript(&mut self, text: &str) -> (Option<String>, Option<String>) {
        let text = text.trim();
        if text.is_empty() {
            return (None, None);
        }

        self.transcripts.push(TranscriptEntry {
            text: text.to_string(),
            timestamp: Local::now(),
        });
        tracing::info!(transcript = text, "heard");

        if self.settings.show_all_transcriptions {
            self.show_heard(text).await;
        }

        let wake_word = self.wake_words.detect(text).map(ToString::to_string);
        let mut command = None;

        if wake_word.is_some() {
            if let Some(history) = self.history.as_mut() {
                history.push(CommandHistoryEntry {
                    timestamp: Local::now(),
                    raw_text: text.to_string(),
                });
            }

            command = self
                .dispatcher
                .handle(&mut self.display, &self.commands, text)
                .await
                .map(ToString::to_string);
        }

        self.show_idle();
        (wake_word, command)
    }

    #[allow(clippy::future_not_send)]
    async fn show_heard(&mut self, text: &str) {
        let width = self.display.width();

        if text.chars().count() <= width {
            self.display
                .show_for(HEARD_HEADER, text, self.settings.short_text_display_time)
                .await;
            return;
        }

        self.display.show_for(HEARD_HEADER, "", HEARD_LEAD_IN).await;
        self.display
            .scroll(
                HEARD_HEADER,
                text,
                ScrollLine::Second,
                ScrollSpan::Cycles(self.settings.heard_text_cycles),
            )
            .await;

        if self.display.mode() != DisplayMode::Pixel {
            let head: String = text.chars().take(width).collect();
            self.display.show_for(HEARD_HEADER, &head, HEARD_TAIL).await;
        }
    }

    /// Clear the display and restore any stopped rendering service
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.display.clear();
        self.session.restore();
        tracing::info!(
            transcripts = self.transcripts.len(),
            resets = self.silence.reset_count(),
            "shutdown complete"
        );
    }
}

impl Drop for VoiceEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Current time on the runtime clock
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// Resolve on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
