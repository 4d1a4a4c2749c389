//! Status display backends
//!
//! Every backend implements [`DisplayBackend`], a uniform "write two lines"
//! capability. The [`Display`] facade owns the selected backend and adds the
//! timing behavior shared by all of them: hold times, marquee scrolling, and
//! render ticks for backends with their own animation state.

pub mod lcd;
pub mod oled;
pub mod selection;
pub mod service;
pub mod wrap;

use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::Result;
use crate::config::DisplayConfig;

pub use lcd::{Hd44780, LcdBackend};
pub use oled::{OledBackend, OledLayout, PixelSurface};
pub use selection::{
    Capabilities, DisplaySession, HardwareProbe, I2cProbe, RetryPolicy, SelectionOutcome,
    SelectionParams, SelectionState, probe_capabilities, select_backend,
};
pub use service::{ServiceControl, ServiceStatus, SystemdServices};
pub use wrap::wrap_text;

/// Which kind of backend is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// HD44780-style character grid
    CharacterGrid,
    /// Monochrome pixel display
    Pixel,
    /// Console echo
    None,
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CharacterGrid => write!(f, "character-grid"),
            Self::Pixel => write!(f, "pixel"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Uniform text rendering capability
pub trait DisplayBackend {
    fn mode(&self) -> DisplayMode;

    /// Characters per line
    fn width(&self) -> usize;

    /// Replace the screen content with two lines
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails
    fn write_lines(&mut self, line1: &str, line2: &str) -> Result<()>;

    /// Show long text with the backend's own layout
    ///
    /// Returns the number of render ticks one full pass over the text takes,
    /// or `None` if the backend has no native long-text rendering and the
    /// caller should scroll it instead.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails
    fn write_long(&mut self, _header: &str, _text: &str) -> Result<Option<u32>> {
        Ok(None)
    }

    /// Blank the screen
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails
    fn clear(&mut self) -> Result<()>;

    /// Advance time-driven rendering by one render tick
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails
    fn tick(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Degraded backend that echoes writes to the console
#[derive(Debug, Clone)]
pub struct ConsoleBackend {
    width: usize,
}

impl ConsoleBackend {
    #[must_use]
    pub const fn new(width: usize) -> Self {
        Self { width }
    }
}

impl DisplayBackend for ConsoleBackend {
    fn mode(&self) -> DisplayMode {
        DisplayMode::None
    }

    fn width(&self) -> usize {
        self.width
    }

    fn write_lines(&mut self, line1: &str, line2: &str) -> Result<()> {
        println!("LCD: '{line1}' | '{line2}'");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Line a marquee runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollLine {
    /// Marquee on line 1, line 2 blank
    First,
    /// Header on line 1, marquee on line 2
    Second,
}

/// How long a scroll lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollSpan {
    /// Wall-clock duration
    For(Duration),
    /// Full passes over the text
    Cycles(u32),
}

/// Timing shared by all backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTiming {
    /// Delay between marquee steps
    pub scroll_speed: Duration,
    /// Interval between render ticks while holding
    pub render_tick: Duration,
}

impl From<&DisplayConfig> for DisplayTiming {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            scroll_speed: config.scroll_speed,
            render_tick: config.render_tick,
        }
    }
}

/// The active backend plus timing
///
/// Write failures are logged and swallowed: a flaky display never stops the
/// voice loop.
pub struct Display {
    backend: Box<dyn DisplayBackend>,
    timing: DisplayTiming,
}

impl Display {
    #[must_use]
    pub fn new(backend: Box<dyn DisplayBackend>, timing: DisplayTiming) -> Self {
        tracing::debug!(mode = %backend.mode(), width = backend.width(), "display ready");
        Self { backend, timing }
    }

    /// Console-only display
    #[must_use]
    pub fn console(width: usize, timing: DisplayTiming) -> Self {
        Self::new(Box::new(ConsoleBackend::new(width)), timing)
    }

    #[must_use]
    pub fn mode(&self) -> DisplayMode {
        self.backend.mode()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.backend.width()
    }

    #[must_use]
    pub const fn timing(&self) -> DisplayTiming {
        self.timing
    }

    /// Show two lines
    pub fn show(&mut self, line1: &str, line2: &str) {
        if let Err(e) = self.backend.write_lines(line1, line2) {
            tracing::warn!(error = %e, "display write failed");
        }
    }

    pub fn clear(&mut self) {
        if let Err(e) = self.backend.clear() {
            tracing::warn!(error = %e, "display clear failed");
        }
    }

    /// Advance backend animation by one tick
    pub fn tick(&mut self) {
        if let Err(e) = self.backend.tick() {
            tracing::warn!(error = %e, "display tick failed");
        }
    }

    /// Keep the current content for `duration`, ticking the backend
    pub async fn hold(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let step = self.timing.render_tick.max(Duration::from_millis(1));

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(step.min(deadline - now)).await;
            self.tick();
        }
    }

    /// Show two lines and hold them
    pub async fn show_for(&mut self, line1: &str, line2: &str, duration: Duration) {
        self.show(line1, line2);
        self.hold(duration).await;
    }

    /// Scroll `text` across one line
    ///
    /// Backends with native long-text rendering lay the text out themselves;
    /// the call then only holds for the span. Otherwise the text runs as a
    /// marquee padded with one display width of blanks on each side.
    pub async fn scroll(&mut self, header: &str, text: &str, line: ScrollLine, span: ScrollSpan) {
        if text.is_empty() {
            return;
        }

        match self.backend.write_long(header, text) {
            Ok(Some(cycle_ticks)) => {
                let duration = match span {
                    ScrollSpan::For(duration) => duration,
                    ScrollSpan::Cycles(cycles) => {
                        self.timing.render_tick * cycle_ticks.max(1) * cycles
                    }
                };
                self.hold(duration).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "display write failed");
                return;
            }
        }

        let frames = marquee_frames(text, self.width());
        match span {
            ScrollSpan::For(duration) => {
                let start = Instant::now();
                'outer: while start.elapsed() < duration {
                    for frame in &frames {
                        if start.elapsed() >= duration {
                            break 'outer;
                        }
                        self.show_marquee(header, frame, line);
                        sleep(self.timing.scroll_speed).await;
                    }
                }
            }
            ScrollSpan::Cycles(cycles) => {
                for _ in 0..cycles {
                    for frame in &frames {
                        self.show_marquee(header, frame, line);
                        sleep(self.timing.scroll_speed).await;
                    }
                }
            }
        }
    }

    fn show_marquee(&mut self, header: &str, frame: &str, line: ScrollLine) {
        match line {
            ScrollLine::First => self.show(frame, ""),
            ScrollLine::Second => self.show(header, frame),
        }
    }
}

/// Every window of a marquee over `text` for a `width`-column line
#[must_use]
pub fn marquee_frames(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let padded: Vec<char> = std::iter::repeat_n(' ', width)
        .chain(text.chars())
        .chain(std::iter::repeat_n(' ', width))
        .collect();

    padded
        .windows(width)
        .map(|window| window.iter().collect())
        .collect()
}
