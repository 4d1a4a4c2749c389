//! Silence-adaptive recognizer reset policy
//!
//! Streaming recognizers accumulate internal state over long sessions, which
//! shows up as growing transcription latency. The tracker requests a reset at
//! the boundary of each sufficiently long silence episode, and unconditionally
//! once `max_reset_interval` has elapsed since the last reset.

use std::time::{Duration, Instant};

use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Largest magnitude of a PCM16 sample, used to normalize RMS into `[0, 1]`
const MAX_SAMPLE_MAGNITUDE: f32 = 32768.0;

/// Why a reset was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// A silence episode lasted `silence_duration`
    Silence,
    /// `max_reset_interval` elapsed since the last reset
    Interval,
}

/// Classification of a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Normalized RMS loudness in `[0, 1]`
    pub loudness: f32,
    pub is_silence: bool,
    /// Set when the recognizer must be reset before this frame is fed
    pub reset: Option<ResetReason>,
}

impl Classification {
    #[must_use]
    pub const fn should_reset(&self) -> bool {
        self.reset.is_some()
    }
}

/// Ring-buffer reset thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilencePolicy {
    pub silence_threshold: f32,
    pub silence_duration: Duration,
    pub max_reset_interval: Duration,
}

impl From<&VoiceConfig> for SilencePolicy {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            silence_duration: config.silence_duration,
            max_reset_interval: config.max_reset_interval,
        }
    }
}

/// Tracks silence episodes and reset timing
#[derive(Debug)]
pub struct SilenceTracker {
    policy: SilencePolicy,
    silence_started_at: Option<Instant>,
    /// Set once the current silence episode has produced its reset
    episode_reset: bool,
    last_reset_at: Instant,
    resets: u64,
}

impl SilenceTracker {
    /// Create a tracker whose reset interval starts at `now`
    #[must_use]
    pub const fn new(policy: SilencePolicy, now: Instant) -> Self {
        Self {
            policy,
            silence_started_at: None,
            episode_reset: false,
            last_reset_at: now,
            resets: 0,
        }
    }

    /// Classify a frame at the current time
    pub fn classify(&mut self, frame: &[i16]) -> Classification {
        self.classify_at(frame, Instant::now())
    }

    /// Classify a frame observed at `now`
    ///
    /// When the returned classification requests a reset, the tracker has
    /// already recorded it: the caller only has to reset the recognizer.
    pub fn classify_at(&mut self, frame: &[i16], now: Instant) -> Classification {
        let (loudness, is_silence) = match frame_loudness(frame) {
            Ok(loudness) => (loudness, loudness < self.policy.silence_threshold),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "loudness computation failed, treating frame as non-silent"
                );
                (0.0, false)
            }
        };

        let mut reset = None;

        if is_silence {
            if !self.episode_reset {
                let started = *self.silence_started_at.get_or_insert(now);
                if now.saturating_duration_since(started) >= self.policy.silence_duration {
                    reset = Some(ResetReason::Silence);
                }
            }
        } else {
            self.silence_started_at = None;
            self.episode_reset = false;
        }

        if reset.is_none()
            && now.saturating_duration_since(self.last_reset_at) >= self.policy.max_reset_interval
        {
            reset = Some(ResetReason::Interval);
        }

        if let Some(reason) = reset {
            self.record_reset(now, is_silence);
            tracing::debug!(?reason, loudness, resets = self.resets, "recognizer reset requested");
        }

        Classification {
            loudness,
            is_silence,
            reset,
        }
    }

    fn record_reset(&mut self, now: Instant, is_silence: bool) {
        self.last_reset_at = now;
        self.silence_started_at = None;
        // A reset during silence consumes the episode; only a non-silent frame re-arms it
        self.episode_reset = is_silence;
        self.resets += 1;
    }

    /// Start time of the current, not yet reset, silence episode
    #[must_use]
    pub const fn silence_started_at(&self) -> Option<Instant> {
        self.silence_started_at
    }

    #[must_use]
    pub const fn last_reset_at(&self) -> Instant {
        self.last_reset_at
    }

    /// Resets requested since creation
    #[must_use]
    pub const fn reset_count(&self) -> u64 {
        self.resets
    }

    #[must_use]
    pub const fn policy(&self) -> &SilencePolicy {
        &self.policy
    }
}

/// Normalized RMS loudness of a PCM16 frame
///
/// # Errors
///
/// Returns `Error::AudioFrame` for an empty frame
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn frame_loudness(frame: &[i16]) -> Result<f32> {
    if frame.is_empty() {
        return Err(Error::AudioFrame("empty frame".to_string()));
    }

    let sum_squares: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_squares / frame.len() as f64).sqrt() as f32;
    Ok((rms / MAX_SAMPLE_MAGNITUDE).min(1.0))
}
