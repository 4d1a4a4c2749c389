//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

use voice_display::config::Config;
use voice_display::display::{
    Display, DisplayBackend, DisplayMode, DisplayTiming, HardwareProbe, ServiceControl,
    ServiceStatus,
};
use voice_display::voice::{FrameSource, SpeechRecognizer};
use voice_display::{Error, Result};

/// Samples per test frame
pub const FRAME_SAMPLES: usize = 160;

/// A frame well below the default silence threshold
#[must_use]
pub fn silent_frame() -> Vec<i16> {
    vec![0; FRAME_SAMPLES]
}

/// A frame well above the default silence threshold
#[must_use]
pub fn loud_frame() -> Vec<i16> {
    (0..FRAME_SAMPLES)
        .map(|i| if i % 2 == 0 { 8000 } else { -8000 })
        .collect()
}

/// Parse a TOML config rooted at `/tmp`
#[must_use]
pub fn config(toml: &str) -> Config {
    Config::from_toml_str(toml, Path::new("/tmp")).expect("valid test config")
}

/// Frames played back in order, optionally one per `interval`
pub struct ScriptedFrameSource {
    frames: VecDeque<Vec<i16>>,
    interval: Option<Duration>,
}

impl ScriptedFrameSource {
    #[must_use]
    pub fn new(frames: impl IntoIterator<Item = Vec<i16>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            interval: None,
        }
    }

    /// Wait `interval` before yielding each frame
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait(?Send)]
impl FrameSource for ScriptedFrameSource {
    async fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        if let Some(interval) = self.interval {
            tokio::time::sleep(interval).await;
        }
        Ok(self.frames.pop_front())
    }
}

/// What a scripted recognizer observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Frame,
    Reset,
}

/// Recognizer that yields scripted transcripts at given frame positions
pub struct ScriptedRecognizer {
    /// Transcript to emit on the n-th accepted frame (0-based)
    transcripts: VecDeque<(usize, String)>,
    accepted: usize,
    events: Rc<RefCell<Vec<RecognizerEvent>>>,
}

impl ScriptedRecognizer {
    #[must_use]
    pub fn new(transcripts: &[(usize, &str)]) -> (Self, Rc<RefCell<Vec<RecognizerEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let recognizer = Self {
            transcripts: transcripts
                .iter()
                .map(|(at, text)| (*at, (*text).to_string()))
                .collect(),
            accepted: 0,
            events: Rc::clone(&events),
        };
        (recognizer, events)
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn accept_frame(&mut self, _frame: &[i16]) -> Result<Option<String>> {
        self.events.borrow_mut().push(RecognizerEvent::Frame);
        let index = self.accepted;
        self.accepted += 1;

        if self.transcripts.front().is_some_and(|(at, _)| *at == index) {
            return Ok(self.transcripts.pop_front().map(|(_, text)| text));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.events.borrow_mut().push(RecognizerEvent::Reset);
    }
}

/// Everything written to a [`RecordingBackend`]
#[derive(Debug, Default)]
pub struct Screen {
    pub writes: Vec<(String, String)>,
    pub clears: u32,
    pub ticks: u32,
}

impl Screen {
    /// Most recent two lines
    #[must_use]
    pub fn last(&self) -> Option<(&str, &str)> {
        self.writes.last().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Whether any write had `line1` as its first line
    #[must_use]
    pub fn shown(&self, line1: &str) -> bool {
        self.writes.iter().any(|(l1, _)| l1 == line1)
    }

    /// Whether any write contained `text` on either line
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.writes
            .iter()
            .any(|(l1, l2)| l1.contains(text) || l2.contains(text))
    }
}

/// Backend that records writes for assertions
pub struct RecordingBackend {
    mode: DisplayMode,
    width: usize,
    screen: Rc<RefCell<Screen>>,
    probe_log: Option<Rc<RefCell<Vec<String>>>>,
}

impl RecordingBackend {
    #[must_use]
    pub fn new(mode: DisplayMode, width: usize) -> (Self, Rc<RefCell<Screen>>) {
        let screen = Rc::new(RefCell::new(Screen::default()));
        let backend = Self {
            mode,
            width,
            screen: Rc::clone(&screen),
            probe_log: None,
        };
        (backend, screen)
    }
}

impl DisplayBackend for RecordingBackend {
    fn mode(&self) -> DisplayMode {
        self.mode
    }

    fn width(&self) -> usize {
        self.width
    }

    fn write_lines(&mut self, line1: &str, line2: &str) -> Result<()> {
        self.screen
            .borrow_mut()
            .writes
            .push((line1.to_string(), line2.to_string()));
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.screen.borrow_mut().clears += 1;
        if let Some(log) = &self.probe_log {
            log.borrow_mut().push("clear".to_string());
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.screen.borrow_mut().ticks += 1;
        Ok(())
    }
}

/// Character-grid display of `width` columns with test timing
#[must_use]
pub fn recording_display(width: usize) -> (Display, Rc<RefCell<Screen>>) {
    let (backend, screen) = RecordingBackend::new(DisplayMode::CharacterGrid, width);
    (Display::new(Box::new(backend), test_timing()), screen)
}

#[must_use]
pub const fn test_timing() -> DisplayTiming {
    DisplayTiming {
        scroll_speed: Duration::from_millis(100),
        render_tick: Duration::from_millis(100),
    }
}

/// Hardware probe with scripted outcomes; logs every call to a shared log
pub struct FakeProbe {
    pub grid_ok: bool,
    /// Pixel addresses that answer
    pub pixel_ok: Vec<u16>,
    pub log: Rc<RefCell<Vec<String>>>,
    pub screen: Rc<RefCell<Screen>>,
}

impl FakeProbe {
    #[must_use]
    pub fn new(grid_ok: bool, pixel_ok: &[u16], log: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            grid_ok,
            pixel_ok: pixel_ok.to_vec(),
            log: Rc::clone(log),
            screen: Rc::new(RefCell::new(Screen::default())),
        }
    }

    fn backend(&self, mode: DisplayMode, width: usize) -> Box<dyn DisplayBackend> {
        Box::new(RecordingBackend {
            mode,
            width,
            screen: Rc::clone(&self.screen),
            probe_log: Some(Rc::clone(&self.log)),
        })
    }
}

impl HardwareProbe for FakeProbe {
    fn connect_character_grid(&mut self) -> Result<Box<dyn DisplayBackend>> {
        self.log.borrow_mut().push("probe grid".to_string());
        if self.grid_ok {
            Ok(self.backend(DisplayMode::CharacterGrid, 16))
        } else {
            Err(Error::Display("no ack".to_string()))
        }
    }

    fn connect_pixel(&mut self, address: u16) -> Result<Box<dyn DisplayBackend>> {
        self.log.borrow_mut().push(format!("probe pixel {address:#04x}"));
        if self.pixel_ok.contains(&address) {
            Ok(self.backend(DisplayMode::Pixel, 21))
        } else {
            Err(Error::Display("no ack".to_string()))
        }
    }
}

/// Service manager fake sharing the probe's call log
pub struct FakeServices {
    pub active: bool,
    pub log: Rc<RefCell<Vec<String>>>,
}

impl FakeServices {
    #[must_use]
    pub fn new(active: bool, log: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            active,
            log: Rc::clone(log),
        }
    }
}

impl ServiceControl for FakeServices {
    fn status(&mut self, _name: &str) -> Result<ServiceStatus> {
        Ok(if self.active {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        })
    }

    fn stop(&mut self, name: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("stop {name}"));
        self.active = false;
        Ok(())
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("start {name}"));
        self.active = true;
        Ok(())
    }
}

/// Count of log entries equal to `entry`
#[must_use]
pub fn count(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> usize {
    log.borrow().iter().filter(|e| *e == entry).count()
}

/// Position of the first log entry equal to `entry`
#[must_use]
pub fn position(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> Option<usize> {
    log.borrow().iter().position(|e| e == entry)
}
