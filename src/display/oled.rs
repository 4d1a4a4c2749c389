//! Pixel backend: SSD1306 monochrome display with wrap/scroll rendering
//!
//! The screen shows a status line, a divider, and a window of word-wrapped
//! body text. When the wrapped text has more lines than fit, the window
//! advances one line every `scroll_ticks` render ticks and returns to the top
//! after the last line has been shown.

use display_interface::WriteOnlyDataCommand;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle};
use embedded_graphics::text::{Baseline, Text};
use ssd1306::Ssd1306;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::{DisplayConfig as _, DisplayRotation, DisplaySize};

use super::wrap::wrap_text;
use super::{DisplayBackend, DisplayMode};
use crate::config::DisplayConfig;
use crate::{Error, Result};

/// Text drawing capability of a pixel display
pub trait PixelSurface {
    /// Blank the frame buffer
    ///
    /// # Errors
    ///
    /// Returns error if the buffer cannot be cleared
    fn clear(&mut self) -> Result<()>;

    /// Draw the status line above the divider
    ///
    /// # Errors
    ///
    /// Returns error if drawing fails
    fn draw_status(&mut self, text: &str) -> Result<()>;

    /// Draw body line `row` (0 = first line below the divider)
    ///
    /// # Errors
    ///
    /// Returns error if drawing fails
    fn draw_body_line(&mut self, row: usize, text: &str) -> Result<()>;

    /// Push the frame buffer to the panel
    ///
    /// # Errors
    ///
    /// Returns error if the bus write fails
    fn flush(&mut self) -> Result<()>;
}

/// Text geometry of the pixel backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OledLayout {
    /// Characters per wrapped line
    pub line_width: usize,
    /// Body lines visible at once
    pub visible_lines: usize,
    /// Render ticks per scroll step
    pub scroll_ticks: u32,
}

impl From<&DisplayConfig> for OledLayout {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            line_width: config.oled_line_width,
            visible_lines: config.oled_visible_lines,
            scroll_ticks: config.oled_scroll_ticks,
        }
    }
}

/// Pixel [`DisplayBackend`] holding the wrap/scroll render state
pub struct OledBackend<S> {
    surface: S,
    layout: OledLayout,
    status: String,
    lines: Vec<String>,
    offset: usize,
    tick_count: u32,
}

impl<S: PixelSurface> OledBackend<S> {
    #[must_use]
    pub fn new(surface: S, layout: OledLayout) -> Self {
        let layout = OledLayout {
            line_width: layout.line_width.max(1),
            visible_lines: layout.visible_lines.max(1),
            scroll_ticks: layout.scroll_ticks.max(1),
        };

        Self {
            surface,
            layout,
            status: String::new(),
            lines: Vec::new(),
            offset: 0,
            tick_count: 0,
        }
    }

    /// Wrapped body lines of the current content
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Index of the first visible body line
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Whether the body is taller than the window
    #[must_use]
    pub fn is_scrolling(&self) -> bool {
        self.lines.len() > self.layout.visible_lines
    }

    /// Body lines currently on screen
    #[must_use]
    pub fn visible(&self) -> &[String] {
        let end = (self.offset + self.layout.visible_lines).min(self.lines.len());
        &self.lines[self.offset..end]
    }

    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    fn set_content(&mut self, status: &str, body: &str) -> Result<()> {
        self.status = status.to_string();
        self.lines = wrap_text(body, self.layout.line_width);
        self.offset = 0;
        self.tick_count = 0;
        self.render()
    }

    /// Window positions in one full pass
    fn positions(&self) -> usize {
        self.lines.len().saturating_sub(self.layout.visible_lines) + 1
    }

    fn render(&mut self) -> Result<()> {
        self.surface.clear()?;
        self.surface.draw_status(&self.status)?;

        let end = (self.offset + self.layout.visible_lines).min(self.lines.len());
        for (row, line) in self.lines[self.offset..end].iter().enumerate() {
            self.surface.draw_body_line(row, line)?;
        }

        self.surface.flush()
    }
}

impl<S: PixelSurface> DisplayBackend for OledBackend<S> {
    fn mode(&self) -> DisplayMode {
        DisplayMode::Pixel
    }

    fn width(&self) -> usize {
        self.layout.line_width
    }

    fn write_lines(&mut self, line1: &str, line2: &str) -> Result<()> {
        self.set_content(line1, line2)
    }

    fn write_long(&mut self, header: &str, text: &str) -> Result<Option<u32>> {
        self.set_content(header, text)?;
        let positions = u32::try_from(self.positions()).unwrap_or(u32::MAX);
        Ok(Some(positions.saturating_mul(self.layout.scroll_ticks)))
    }

    fn clear(&mut self) -> Result<()> {
        self.status.clear();
        self.lines.clear();
        self.offset = 0;
        self.tick_count = 0;
        self.surface.clear()?;
        self.surface.flush()
    }

    fn tick(&mut self) -> Result<()> {
        if !self.is_scrolling() {
            return Ok(());
        }

        self.tick_count += 1;
        if self.tick_count < self.layout.scroll_ticks {
            return Ok(());
        }

        self.tick_count = 0;
        self.offset = if self.offset + 1 >= self.positions() {
            0
        } else {
            self.offset + 1
        };
        self.render()
    }
}

/// Height of one FONT_6X10 text row in pixels
const ROW_HEIGHT: i32 = 10;

/// y of the divider under the status line
const DIVIDER_Y: i32 = 11;

/// y of the first body row
const BODY_TOP: i32 = 13;

/// SSD1306 panel drawn through embedded-graphics
pub struct Ssd1306Surface<DI, SIZE: DisplaySize> {
    display: Ssd1306<DI, SIZE, BufferedGraphicsMode<SIZE>>,
}

impl<DI, SIZE> Ssd1306Surface<DI, SIZE>
where
    DI: WriteOnlyDataCommand,
    SIZE: DisplaySize,
{
    /// Initialize the panel behind `interface`
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` if the panel does not respond
    pub fn new(interface: DI, size: SIZE) -> Result<Self> {
        let mut display = Ssd1306::new(interface, size, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        display
            .init()
            .map_err(|e| Error::Display(format!("ssd1306 init failed: {e:?}")))?;
        Ok(Self { display })
    }

    fn draw_text(&mut self, text: &str, y: i32) -> Result<()> {
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        Text::with_baseline(text, Point::new(0, y), style, Baseline::Top)
            .draw(&mut self.display)
            .map_err(|e| Error::Display(format!("draw failed: {e:?}")))?;
        Ok(())
    }
}

impl<DI, SIZE> PixelSurface for Ssd1306Surface<DI, SIZE>
where
    DI: WriteOnlyDataCommand,
    SIZE: DisplaySize,
{
    fn clear(&mut self) -> Result<()> {
        DrawTarget::clear(&mut self.display, BinaryColor::Off)
            .map_err(|e| Error::Display(format!("clear failed: {e:?}")))
    }

    fn draw_status(&mut self, text: &str) -> Result<()> {
        self.draw_text(text, 0)?;
        let width = i32::from(self.display.dimensions().0);
        Line::new(Point::new(0, DIVIDER_Y), Point::new(width - 1, DIVIDER_Y))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut self.display)
            .map_err(|e| Error::Display(format!("draw failed: {e:?}")))
    }

    fn draw_body_line(&mut self, row: usize, text: &str) -> Result<()> {
        let row = i32::try_from(row).unwrap_or(i32::MAX / ROW_HEIGHT);
        self.draw_text(text, BODY_TOP + row * ROW_HEIGHT)
    }

    fn flush(&mut self) -> Result<()> {
        self.display
            .flush()
            .map_err(|e| Error::Display(format!("flush failed: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeSurface {
        status: String,
        body: Vec<String>,
        flushes: u32,
    }

    impl PixelSurface for FakeSurface {
        fn clear(&mut self) -> Result<()> {
            self.status.clear();
            self.body.clear();
            Ok(())
        }

        fn draw_status(&mut self, text: &str) -> Result<()> {
            self.status = text.to_string();
            Ok(())
        }

        fn draw_body_line(&mut self, row: usize, text: &str) -> Result<()> {
            assert_eq!(row, self.body.len());
            self.body.push(text.to_string());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn backend(visible_lines: usize) -> OledBackend<FakeSurface> {
        OledBackend::new(
            FakeSurface::default(),
            OledLayout {
                line_width: 10,
                visible_lines,
                scroll_ticks: 3,
            },
        )
    }

    #[test]
    fn short_text_is_static() {
        let mut oled = backend(4);
        oled.write_lines("Heard:", "THE QUICK BROWN FOX").unwrap();

        assert_eq!(oled.surface().status, "Heard:");
        assert_eq!(oled.surface().body, vec!["THE QUICK", "BROWN FOX"]);
        assert!(!oled.is_scrolling());

        for _ in 0..20 {
            oled.tick().unwrap();
        }
        assert_eq!(oled.offset(), 0);
        assert_eq!(oled.surface().flushes, 1);
    }

    #[test]
    fn long_text_scrolls_and_wraps_around() {
        let mut oled = backend(2);
        // Four wrapped lines, two visible: offsets 0, 1, 2, then back to 0
        let ticks = oled
            .write_long("Out:", "one two three four five six seven")
            .unwrap();
        assert_eq!(oled.lines().len(), 4);
        assert_eq!(ticks, Some(9));

        let mut offsets = vec![oled.offset()];
        for _ in 0..4 {
            for _ in 0..3 {
                oled.tick().unwrap();
            }
            offsets.push(oled.offset());
        }

        assert_eq!(offsets, vec![0, 1, 2, 0, 1]);
        assert_eq!(oled.surface().body, oled.visible());
        assert_eq!(oled.surface().status, "Out:");
    }

    #[test]
    fn scroll_advances_only_every_scroll_ticks() {
        let mut oled = backend(1);
        oled.write_lines("", "aaaaaaaa bbbbbbbb cccccccc").unwrap();
        assert_eq!(oled.lines().len(), 3);

        oled.tick().unwrap();
        oled.tick().unwrap();
        assert_eq!(oled.offset(), 0);
        oled.tick().unwrap();
        assert_eq!(oled.offset(), 1);
    }

    #[test]
    fn new_content_resets_scroll() {
        let mut oled = backend(1);
        oled.write_lines("", "aaaaaaaa bbbbbbbb").unwrap();
        for _ in 0..3 {
            oled.tick().unwrap();
        }
        assert_eq!(oled.offset(), 1);

        oled.write_lines("Listening...", "").unwrap();
        assert_eq!(oled.offset(), 0);
        assert!(oled.lines().is_empty());
    }

    #[test]
    fn clear_blanks_state() {
        let mut oled = backend(2);
        oled.write_lines("x", "y").unwrap();
        oled.clear().unwrap();
        assert!(oled.surface().status.is_empty());
        assert!(oled.surface().body.is_empty());
        assert!(oled.status().is_empty());
    }
}
