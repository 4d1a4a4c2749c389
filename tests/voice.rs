//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::time::{Duration, Instant};

use voice_display::voice::{
    BoundedHistory, FrameSource, ResetReason, SilencePolicy, SilenceTracker, WakeWordDetector,
    f32_to_i16, frame_loudness, frame_queue,
};

mod common;

use common::{config, loud_frame, silent_frame};

/// Generate sine wave PCM16 samples
#[allow(clippy::cast_precision_loss)]
fn sine_frame(frequency: f32, amplitude: f32, samples: usize, sample_rate: u32) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            f32_to_i16(amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin())
        })
        .collect()
}

#[test]
fn test_policy_comes_from_config() {
    let config = config(
        r#"
        [voice]
        silence_threshold = 0.05
        silence_duration_seconds = 1.5
        max_reset_interval_seconds = 10
        "#,
    );

    let policy = SilencePolicy::from(&config.voice);
    assert!((policy.silence_threshold - 0.05).abs() < f32::EPSILON);
    assert_eq!(policy.silence_duration, Duration::from_millis(1500));
    assert_eq!(policy.max_reset_interval, Duration::from_secs(10));
}

#[test]
fn test_sine_loudness_matches_rms() {
    // RMS of a sine is amplitude / sqrt(2)
    let frame = sine_frame(440.0, 0.5, 16_000, 16_000);
    let loudness = frame_loudness(&frame).unwrap();
    assert!((loudness - 0.5 / std::f32::consts::SQRT_2).abs() < 0.01, "{loudness}");
}

#[test]
fn test_quiet_room_then_speech_then_quiet() {
    let policy = SilencePolicy {
        silence_threshold: 0.01,
        silence_duration: Duration::from_secs(2),
        max_reset_interval: Duration::from_secs(30),
    };
    let start = Instant::now();
    let mut tracker = SilenceTracker::new(policy, start);
    let at = |ms: u64| start + Duration::from_millis(ms);

    let mut resets = Vec::new();
    let mut t = 0;

    // 3s of quiet room noise, 1s of speech, 3s of quiet; 250ms frames
    let quiet = sine_frame(100.0, 0.002, 160, 16_000);
    let speech = sine_frame(300.0, 0.3, 160, 16_000);
    let script = std::iter::repeat_n(&quiet, 12)
        .chain(std::iter::repeat_n(&speech, 4))
        .chain(std::iter::repeat_n(&quiet, 12));

    for frame in script {
        let classification = tracker.classify_at(frame, at(t));
        if let Some(reason) = classification.reset {
            resets.push((t, reason));
        }
        t += 250;
    }

    assert_eq!(
        resets,
        vec![(2000, ResetReason::Silence), (6000, ResetReason::Silence)]
    );
    assert_eq!(tracker.reset_count(), 2);
}

#[test]
fn test_interval_reset_during_long_speech() {
    let policy = SilencePolicy {
        silence_threshold: 0.01,
        silence_duration: Duration::from_secs(2),
        max_reset_interval: Duration::from_secs(30),
    };
    let start = Instant::now();
    let mut tracker = SilenceTracker::new(policy, start);

    let reasons: Vec<_> = (1..=70)
        .filter_map(|s| {
            tracker
                .classify_at(&loud_frame(), start + Duration::from_secs(s))
                .reset
                .map(|reason| (s, reason))
        })
        .collect();

    assert_eq!(
        reasons,
        vec![(30, ResetReason::Interval), (60, ResetReason::Interval)]
    );
}

#[test]
fn test_empty_frame_is_not_silence() {
    let mut tracker = SilenceTracker::new(
        SilencePolicy {
            silence_threshold: 0.01,
            silence_duration: Duration::ZERO,
            max_reset_interval: Duration::from_secs(30),
        },
        Instant::now(),
    );

    let classification = tracker.classify(&[]);
    assert!(!classification.is_silence);
    assert!(classification.reset.is_none());

    // A real silent frame still resets immediately with a zero duration
    assert_eq!(
        tracker.classify(&silent_frame()).reset,
        Some(ResetReason::Silence)
    );
}

#[test]
fn test_wake_words_from_config() {
    let config = config(
        r#"
        [voice]
        wake_words = ["Hey Pi", "computer"]
        "#,
    );
    let detector = WakeWordDetector::new(config.voice.wake_words.clone());

    assert_eq!(detector.detect("HEY PI what time is it"), Some("hey pi"));
    assert_eq!(detector.detect("computer, show ip"), Some("computer"));
    assert!(!detector.check_wake_word("what time is it"));
}

#[test]
fn test_history_evicts_oldest() {
    let mut history = BoundedHistory::new(2);
    assert_eq!(history.push("a"), None);
    assert_eq!(history.push("b"), None);
    assert_eq!(history.push("c"), Some("a"));
    assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec!["b", "c"]);
}

#[tokio::test]
async fn test_sample_stream_becomes_frames() {
    let (mut assembler, mut frames) = frame_queue(4000, 8);

    // One second of 16 kHz audio delivered in uneven driver callbacks
    let audio = sine_frame(440.0, 0.2, 16_000, 16_000);
    for chunk in audio.chunks(1234) {
        assembler.push_samples(chunk.iter().copied());
    }
    drop(assembler);

    let mut received = Vec::new();
    while let Some(frame) = frames.read_frame().await.unwrap() {
        assert_eq!(frame.len(), 4000);
        received.push(frame);
    }

    assert_eq!(received.len(), 4);
    assert_eq!(received.concat(), audio);
    assert_eq!(frames.dropped_frames(), 0);
}
