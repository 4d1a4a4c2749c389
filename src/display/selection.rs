//! Startup backend selection with fallback and service handoff
//!
//! ```text
//! Init -> ProbeCharacterGrid -> CharacterGridActive
//!                |
//!                v (retries exhausted)
//!           ProbePixel ------> PixelActive
//!                |
//!                v (every address failed; restart the service)
//!           NoneActive
//! ```
//!
//! Probing the pixel display may require stopping an external rendering
//! service that holds the bus. The returned [`DisplaySession`] remembers that
//! and restarts the service exactly once: on rollback, on shutdown, or when
//! the session is dropped.

use std::path::PathBuf;
use std::time::Duration;

use super::oled::OledLayout;
use super::service::ServiceControl;
use super::{ConsoleBackend, DisplayBackend, DisplayMode};
use crate::config::{Config, DisplayPreference};
use crate::voice::speech_available;
use crate::{Error, Result};

/// What this host can do, queried once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Character-grid display bus is present
    pub character_grid: bool,
    /// Pixel display bus is present
    pub pixel: bool,
    /// A service manager is available for the rendering service handoff
    pub service_manager: bool,
    /// A speech recognizer can be opened
    pub speech: bool,
}

/// Query host capabilities for `config`
#[must_use]
pub fn probe_capabilities(config: &Config) -> Capabilities {
    let bus_present = cfg!(target_os = "linux") && config.hardware.i2c_bus.exists();

    let capabilities = Capabilities {
        character_grid: bus_present,
        pixel: bus_present,
        service_manager: which::which("systemctl").is_ok(),
        speech: speech_available(config.voice.model_path.as_deref()),
    };

    tracing::info!(
        character_grid = capabilities.character_grid,
        pixel = capabilities.pixel,
        service_manager = capabilities.service_manager,
        speech = capabilities.speech,
        "capabilities"
    );
    capabilities
}

/// Bounded retry with a fixed backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are used up
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    tracing::debug!(attempt, attempts, error = %e, "attempt failed, retrying");
                    std::thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}

/// Connects to display hardware
pub trait HardwareProbe {
    /// Connect to the character-grid display
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` if the device does not respond
    fn connect_character_grid(&mut self) -> Result<Box<dyn DisplayBackend>>;

    /// Connect to a pixel display at `address`
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` if the device does not respond
    fn connect_pixel(&mut self, address: u16) -> Result<Box<dyn DisplayBackend>>;
}

/// Selection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Init,
    ProbeCharacterGrid,
    CharacterGridActive,
    ProbePixel,
    PixelActive,
    NoneActive,
}

/// Inputs to backend selection
#[derive(Debug, Clone)]
pub struct SelectionParams {
    pub retry: RetryPolicy,
    pub allow_character_grid: bool,
    pub allow_pixel: bool,
    /// Pixel display candidate addresses, tried in order
    pub pixel_addresses: Vec<u16>,
    /// Rendering service that may hold the pixel display bus
    pub service: Option<String>,
    /// Wait after stopping the service
    pub service_grace: Duration,
    /// Line width of the console fallback
    pub console_width: usize,
}

impl SelectionParams {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let preference = config.hardware.display_preference;

        Self {
            retry: RetryPolicy {
                attempts: config.hardware.probe_attempts,
                backoff: config.hardware.probe_backoff,
            },
            allow_character_grid: matches!(
                preference,
                DisplayPreference::Auto | DisplayPreference::Lcd
            ),
            allow_pixel: matches!(preference, DisplayPreference::Auto | DisplayPreference::Oled),
            pixel_addresses: config.hardware.oled_addresses.clone(),
            service: config.display.oled_service.clone(),
            service_grace: config.display.service_grace,
            console_width: config.columns(),
        }
    }
}

/// Tracks whether this process stopped the external rendering service
pub struct DisplaySession {
    services: Box<dyn ServiceControl>,
    stopped_service: Option<String>,
}

impl DisplaySession {
    #[must_use]
    pub fn new(services: Box<dyn ServiceControl>) -> Self {
        Self {
            services,
            stopped_service: None,
        }
    }

    /// Service stopped during probing and not yet restarted
    #[must_use]
    pub fn stopped_service(&self) -> Option<&str> {
        self.stopped_service.as_deref()
    }

    /// Stop `name` if it is running, recording it for restoration
    fn stop_service(&mut self, name: &str) -> bool {
        if !self.services.is_active(name) {
            tracing::debug!(service = name, "service not active");
            return false;
        }

        match self.services.stop(name) {
            Ok(()) => {
                self.stopped_service = Some(name.to_string());
                true
            }
            Err(e) => {
                tracing::warn!(service = name, error = %e, "failed to stop service");
                false
            }
        }
    }

    /// Restart the stopped service, at most once over the session's life
    ///
    /// Returns `true` if a restart was attempted by this call.
    pub fn restore(&mut self) -> bool {
        let Some(name) = self.stopped_service.take() else {
            return false;
        };

        match self.services.start(&name) {
            Ok(()) => tracing::info!(service = %name, "service restored"),
            Err(e) => tracing::warn!(service = %name, error = %e, "failed to restore service"),
        }
        true
    }
}

impl Drop for DisplaySession {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Result of backend selection
pub struct SelectionOutcome {
    pub backend: Box<dyn DisplayBackend>,
    pub session: DisplaySession,
    /// States visited, in order
    pub states: Vec<SelectionState>,
}

impl SelectionOutcome {
    #[must_use]
    pub fn mode(&self) -> DisplayMode {
        self.backend.mode()
    }
}

/// Pick the display backend
///
/// Never fails: when no hardware answers the console backend is returned.
pub fn select_backend(
    probe: &mut dyn HardwareProbe,
    services: Box<dyn ServiceControl>,
    capabilities: &Capabilities,
    params: &SelectionParams,
) -> SelectionOutcome {
    let mut session = DisplaySession::new(services);
    let mut states = vec![SelectionState::Init];

    if params.allow_character_grid && capabilities.character_grid {
        states.push(SelectionState::ProbeCharacterGrid);

        let connected = params.retry.run(|attempt| {
            tracing::debug!(attempt, "probing character display");
            probe.connect_character_grid()
        });

        match connected {
            Ok(backend) => {
                states.push(SelectionState::CharacterGridActive);
                tracing::info!("character display active");
                return SelectionOutcome {
                    backend,
                    session,
                    states,
                };
            }
            Err(e) => tracing::warn!(
                attempts = params.retry.attempts,
                error = %e,
                "character display not available"
            ),
        }
    }

    if params.allow_pixel && capabilities.pixel {
        states.push(SelectionState::ProbePixel);

        if let Some(service) = params.service.as_deref()
            && capabilities.service_manager
            && session.stop_service(service)
        {
            tracing::info!(
                service,
                grace = ?params.service_grace,
                "service stopped for pixel display"
            );
            std::thread::sleep(params.service_grace);
        }

        for &address in &params.pixel_addresses {
            match probe.connect_pixel(address) {
                Ok(backend) => {
                    states.push(SelectionState::PixelActive);
                    tracing::info!(
                        address = format_args!("{address:#04x}"),
                        "pixel display active"
                    );
                    return SelectionOutcome {
                        backend,
                        session,
                        states,
                    };
                }
                Err(e) => tracing::debug!(
                    address = format_args!("{address:#04x}"),
                    error = %e,
                    "pixel display not at address"
                ),
            }
        }

        tracing::warn!("pixel display not available");
        session.restore();
    }

    states.push(SelectionState::NoneActive);
    tracing::info!("no display hardware, echoing to console");
    SelectionOutcome {
        backend: Box::new(ConsoleBackend::new(params.console_width)),
        session,
        states,
    }
}

/// Connects to displays on a Linux I2C bus
#[derive(Debug, Clone)]
pub struct I2cProbe {
    pub bus: PathBuf,
    pub lcd_address: u16,
    pub lcd_cols: usize,
    pub lcd_rows: usize,
    pub oled_width: u32,
    pub oled_height: u32,
    pub layout: OledLayout,
}

impl I2cProbe {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            bus: config.hardware.i2c_bus.clone(),
            lcd_address: config.hardware.lcd_address,
            lcd_cols: config.hardware.lcd_cols,
            lcd_rows: config.hardware.lcd_rows,
            oled_width: config.hardware.oled_width,
            oled_height: config.hardware.oled_height,
            layout: OledLayout::from(&config.display),
        }
    }
}

fn seven_bit(address: u16) -> Result<u8> {
    u8::try_from(address)
        .ok()
        .filter(|a| *a < 0x80)
        .ok_or_else(|| Error::Display(format!("invalid i2c address {address:#x}")))
}

#[cfg(target_os = "linux")]
impl HardwareProbe for I2cProbe {
    fn connect_character_grid(&mut self) -> Result<Box<dyn DisplayBackend>> {
        use linux_embedded_hal::{Delay, I2cdev};

        use super::lcd::LcdBackend;

        let address = seven_bit(self.lcd_address)?;
        let i2c = I2cdev::new(&self.bus)
            .map_err(|e| Error::Display(format!("open {}: {e}", self.bus.display())))?;
        let backend = LcdBackend::connect(i2c, Delay, address, self.lcd_cols, self.lcd_rows)?;
        Ok(Box::new(backend))
    }

    fn connect_pixel(&mut self, address: u16) -> Result<Box<dyn DisplayBackend>> {
        use linux_embedded_hal::I2cdev;
        use ssd1306::I2CDisplayInterface;
        use ssd1306::size::{DisplaySize128x32, DisplaySize128x64};

        use super::oled::{OledBackend, Ssd1306Surface};

        let address = seven_bit(address)?;
        let i2c = I2cdev::new(&self.bus)
            .map_err(|e| Error::Display(format!("open {}: {e}", self.bus.display())))?;
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);

        let backend: Box<dyn DisplayBackend> = match (self.oled_width, self.oled_height) {
            (128, 32) => Box::new(OledBackend::new(
                Ssd1306Surface::new(interface, DisplaySize128x32)?,
                self.layout,
            )),
            _ => Box::new(OledBackend::new(
                Ssd1306Surface::new(interface, DisplaySize128x64)?,
                self.layout,
            )),
        };
        Ok(backend)
    }
}

#[cfg(not(target_os = "linux"))]
impl HardwareProbe for I2cProbe {
    fn connect_character_grid(&mut self) -> Result<Box<dyn DisplayBackend>> {
        seven_bit(self.lcd_address)?;
        Err(Error::Display("i2c displays require linux".to_string()))
    }

    fn connect_pixel(&mut self, address: u16) -> Result<Box<dyn DisplayBackend>> {
        seven_bit(address)?;
        Err(Error::Display("i2c displays require linux".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn retry_stops_at_first_success() {
        let policy = RetryPolicy {
            attempts: 5,
            backoff: Duration::ZERO,
        };
        let calls = Cell::new(0);

        let result = policy.run(|attempt| {
            calls.set(calls.get() + 1);
            if attempt < 3 {
                Err(Error::Display("busy".to_string()))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_returns_last_error_when_exhausted() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        };
        let calls = Cell::new(0);

        let result: Result<()> = policy.run(|attempt| {
            calls.set(calls.get() + 1);
            Err(Error::Display(format!("attempt {attempt}")))
        });

        assert_eq!(result.unwrap_err().to_string(), "display error: attempt 3");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            attempts: 0,
            backoff: Duration::ZERO,
        };
        assert_eq!(policy.run(Ok).unwrap(), 1);
    }

    struct CountingServices {
        starts: Rc<Cell<u32>>,
    }

    impl ServiceControl for CountingServices {
        fn status(&mut self, _name: &str) -> Result<crate::display::ServiceStatus> {
            Ok(crate::display::ServiceStatus::Running)
        }

        fn stop(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn start(&mut self, _name: &str) -> Result<()> {
            self.starts.set(self.starts.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn session_restores_once_even_when_dropped() {
        let starts = Rc::new(Cell::new(0));
        let mut session = DisplaySession::new(Box::new(CountingServices {
            starts: Rc::clone(&starts),
        }));

        assert!(session.stop_service("oled.service"));
        assert_eq!(session.stopped_service(), Some("oled.service"));

        assert!(session.restore());
        assert!(!session.restore());
        drop(session);

        assert_eq!(starts.get(), 1);
    }

    #[test]
    fn drop_restores_stopped_service() {
        let starts = Rc::new(Cell::new(0));
        let mut session = DisplaySession::new(Box::new(CountingServices {
            starts: Rc::clone(&starts),
        }));
        session.stop_service("oled.service");
        drop(session);

        assert_eq!(starts.get(), 1);
    }

    #[test]
    fn addresses_must_be_seven_bit() {
        assert_eq!(seven_bit(0x27).unwrap(), 0x27);
        assert!(seven_bit(0x80).is_err());
        assert!(seven_bit(0x1234).is_err());
    }
}
