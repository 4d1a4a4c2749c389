//! Audio capture from microphone
//!
//! The capture callback runs on the audio driver's thread. It converts samples
//! to PCM16, cuts them into fixed-size frames and hands them to the loop over a
//! bounded queue. When the loop is busy (display hold times, command
//! execution) and the queue is full, new frames are dropped and counted
//! instead of blocking the driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sequential source of fixed-size PCM16 mono frames
#[async_trait(?Send)]
pub trait FrameSource {
    /// Wait for the next frame; `None` once the source is exhausted
    ///
    /// # Errors
    ///
    /// Returns error if the source fails
    async fn read_frame(&mut self) -> Result<Option<Vec<i16>>>;
}

/// Cuts a sample stream into frames and pushes them into the bounded queue
pub struct FrameAssembler {
    chunk_size: usize,
    pending: Vec<i16>,
    tx: mpsc::Sender<Vec<i16>>,
    dropped: Arc<AtomicU64>,
}

impl FrameAssembler {
    /// Append samples, emitting every completed frame
    pub fn push_samples(&mut self, samples: impl IntoIterator<Item = i16>) {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.chunk_size {
                let frame =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
                if self.tx.try_send(frame).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Receiving end of the frame queue
pub struct FrameReceiver {
    rx: mpsc::Receiver<Vec<i16>>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Frames discarded because the queue was full
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait(?Send)]
impl FrameSource for FrameReceiver {
    async fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        Ok(self.rx.recv().await)
    }
}

/// Create a frame queue holding at most `capacity` frames of `chunk_size` samples
#[must_use]
pub fn frame_queue(chunk_size: usize, capacity: usize) -> (FrameAssembler, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    (
        FrameAssembler {
            chunk_size: chunk_size.max(1),
            pending: Vec::with_capacity(chunk_size),
            tx,
            dropped: Arc::clone(&dropped),
        },
        FrameReceiver { rx, dropped },
    )
}

/// Convert an f32 sample in `[-1.0, 1.0]` to PCM16
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Captures PCM16 mono frames from the default input device
pub struct AudioCapture {
    // Dropping the stream stops the driver callback
    _stream: Stream,
    frames: FrameReceiver,
    sample_rate: u32,
}

impl AudioCapture {
    /// Open the default input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the audio device cannot be opened
    pub fn open(sample_rate: u32, chunk_size: usize, queue_frames: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
                    && matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            chunk_size,
            queue_frames,
            ?sample_format,
            "audio capture initialized"
        );

        let (mut assembler, frames) = frame_queue(chunk_size, queue_frames);
        let on_error = |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio capture error");
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    assembler.push_samples(data.iter().copied());
                },
                on_error,
                None,
            ),
            _ => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    assembler.push_samples(data.iter().copied().map(f32_to_i16));
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");

        Ok(Self {
            _stream: stream,
            frames,
            sample_rate,
        })
    }

    /// Frames discarded while the loop was busy
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.frames.dropped_frames()
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[async_trait(?Send)]
impl FrameSource for AudioCapture {
    async fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        self.frames.read_frame().await
    }
}
