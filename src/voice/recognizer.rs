//! Streaming speech recognizer capability
//!
//! The recognizer is opaque: it takes PCM16 frames, occasionally yields a
//! final transcript at an utterance boundary, and can be told to drop its
//! buffered audio state.

use std::path::Path;

use crate::{Error, Result};

/// Streaming recognizer fed one frame at a time
pub trait SpeechRecognizer {
    /// Feed one frame; returns the final transcript when an utterance ends
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer rejects the frame
    fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>>;

    /// Discard buffered audio state
    fn reset(&mut self);
}

impl<R: SpeechRecognizer + ?Sized> SpeechRecognizer for Box<R> {
    fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>> {
        (**self).accept_frame(frame)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Whether this build can recognize speech from a model at `model_path`
#[must_use]
pub fn speech_available(model_path: Option<&Path>) -> bool {
    cfg!(feature = "vosk") && model_path.is_some_and(Path::exists)
}

/// Open the recognizer for `model_path`
///
/// # Errors
///
/// Returns `Error::Recognizer` when no model is configured, the model
/// directory does not exist, or this build has no recognizer backend
pub fn open_recognizer(
    model_path: Option<&Path>,
    sample_rate: u32,
) -> Result<Box<dyn SpeechRecognizer>> {
    let model_path =
        model_path.ok_or_else(|| Error::Recognizer("no model path configured".to_string()))?;

    if !model_path.exists() {
        return Err(Error::Recognizer(format!(
            "speech model not found at {}",
            model_path.display()
        )));
    }

    #[cfg(feature = "vosk")]
    {
        vosk_backend::VoskRecognizer::open(model_path, sample_rate)
            .map(|r| Box::new(r) as Box<dyn SpeechRecognizer>)
    }

    #[cfg(not(feature = "vosk"))]
    {
        let _ = sample_rate;
        Err(Error::Recognizer(
            "built without a recognizer backend (enable the `vosk` feature)".to_string(),
        ))
    }
}

#[cfg(feature = "vosk")]
mod vosk_backend {
    use std::path::Path;

    use vosk::{DecodingState, Model, Recognizer};

    use super::SpeechRecognizer;
    use crate::{Error, Result};

    /// Offline Kaldi recognizer through libvosk
    pub struct VoskRecognizer {
        recognizer: Recognizer,
        // The recognizer borrows model data internally; keep it alive
        _model: Model,
    }

    impl VoskRecognizer {
        pub fn open(model_path: &Path, sample_rate: u32) -> Result<Self> {
            let path = model_path
                .to_str()
                .ok_or_else(|| Error::Recognizer("model path is not valid UTF-8".to_string()))?;

            tracing::info!(path, "loading speech model");
            let model = Model::new(path)
                .ok_or_else(|| Error::Recognizer(format!("failed to load model from {path}")))?;

            #[allow(clippy::cast_precision_loss)]
            let recognizer = Recognizer::new(&model, sample_rate as f32)
                .ok_or_else(|| Error::Recognizer("failed to create recognizer".to_string()))?;

            tracing::info!(sample_rate, "speech recognizer ready");
            Ok(Self {
                recognizer,
                _model: model,
            })
        }
    }

    impl SpeechRecognizer for VoskRecognizer {
        fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>> {
            let state = self
                .recognizer
                .accept_waveform(frame)
                .map_err(|e| Error::Recognizer(format!("{e:?}")))?;

            if !matches!(state, DecodingState::Finalized) {
                return Ok(None);
            }

            let text = self
                .recognizer
                .result()
                .single()
                .map(|r| r.text.trim().to_string())
                .unwrap_or_default();

            Ok((!text.is_empty()).then_some(text))
        }

        fn reset(&mut self) {
            self.recognizer.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_unavailable() {
        let err = open_recognizer(None, 16_000).err().unwrap();
        assert!(matches!(err, Error::Recognizer(_)));

        let err = open_recognizer(Some(Path::new("/nonexistent/model")), 16_000)
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
        assert!(!speech_available(Some(Path::new("/nonexistent/model"))));
    }
}
