//! Configuration management for the voice display
//!
//! Configuration is read once, before any other component initializes.
//! Missing sections and fields fall back to documented defaults; every
//! fallback that hides a mistake is recorded in [`Config::warnings`] so it can
//! be logged once logging is up.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;

use crate::commands::CommandTable;
use file::{AddressValue, ConfigFile};

/// Default I2C bus device
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

/// Default character-grid (PCF8574 backpack) address
pub const DEFAULT_LCD_ADDRESS: u16 = 0x3f;

/// Default pixel display (SSD1306) candidate addresses
pub const DEFAULT_OLED_ADDRESSES: [u16; 2] = [0x3c, 0x3d];

/// Default external rendering service that may hold the pixel display bus
pub const DEFAULT_OLED_SERVICE: &str = "oled-animations.service";

/// Voice display configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,

    /// Directory relative paths are resolved against
    pub base_dir: PathBuf,

    /// Bus addressing, geometry, audio format
    pub hardware: HardwareConfig,

    /// Scroll speed and hold times
    pub display: DisplayConfig,

    /// Wake words, recognizer model, ring-buffer thresholds
    pub voice: VoiceConfig,

    /// Validated command table
    pub commands: CommandTable,

    /// Joke and error-response pools
    pub messages: MessagesConfig,

    /// Rotating log files
    pub logging: LoggingConfig,

    /// Legacy logging and command history
    pub advanced: AdvancedConfig,

    /// Problems found while loading, already replaced by defaults
    pub warnings: Vec<String>,
}

/// Which display backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayPreference {
    /// Probe the character grid, then fall back to the pixel display
    #[default]
    Auto,
    /// Character grid only
    Lcd,
    /// Pixel display only
    Oled,
    /// Console echo only
    None,
}

/// Hardware configuration
#[derive(Debug, Clone)]
pub struct HardwareConfig {
    pub i2c_bus: PathBuf,
    pub lcd_address: u16,
    pub lcd_cols: usize,
    pub lcd_rows: usize,
    pub oled_addresses: Vec<u16>,
    pub oled_width: u32,
    pub oled_height: u32,
    pub sample_rate: u32,
    pub chunk_size: usize,
    /// Frames buffered between the capture callback and the loop
    pub queue_frames: usize,
    pub probe_attempts: u32,
    pub probe_backoff: Duration,
    pub display_preference: DisplayPreference,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: PathBuf::from(DEFAULT_I2C_BUS),
            lcd_address: DEFAULT_LCD_ADDRESS,
            lcd_cols: 16,
            lcd_rows: 2,
            oled_addresses: DEFAULT_OLED_ADDRESSES.to_vec(),
            oled_width: 128,
            oled_height: 64,
            sample_rate: 16_000,
            chunk_size: 4000,
            queue_frames: 8,
            probe_attempts: 3,
            probe_backoff: Duration::from_millis(500),
            display_preference: DisplayPreference::Auto,
        }
    }
}

/// Display timing and rendering configuration
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    /// Delay between marquee steps
    pub scroll_speed: Duration,
    /// Hold time for short "Heard:" transcripts
    pub short_text_display_time: Duration,
    /// Hold time for command results
    pub command_result_time: Duration,
    /// Marquee cycles for long "Heard:" transcripts
    pub heard_text_cycles: u32,
    pub startup_message: (String, String),
    pub idle_message: (String, String),
    /// Interval between pixel-backend render ticks while holding
    pub render_tick: Duration,
    /// Pixel backend characters per wrapped line
    pub oled_line_width: usize,
    /// Pixel backend wrapped lines visible at once
    pub oled_visible_lines: usize,
    /// Render ticks per scroll step
    pub oled_scroll_ticks: u32,
    /// External rendering service to stop while probing the pixel display
    pub oled_service: Option<String>,
    /// Wait after stopping the service before probing
    pub service_grace: Duration,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            scroll_speed: Duration::from_millis(150),
            short_text_display_time: Duration::from_secs(3),
            command_result_time: Duration::from_secs(3),
            heard_text_cycles: 2,
            startup_message: ("Voice Display".to_string(), "Listening...".to_string()),
            idle_message: ("Listening...".to_string(), String::new()),
            render_tick: Duration::from_millis(100),
            oled_line_width: 21,
            oled_visible_lines: 4,
            oled_scroll_ticks: 10,
            oled_service: Some(DEFAULT_OLED_SERVICE.to_string()),
            service_grace: Duration::from_secs(1),
        }
    }
}

/// Voice configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Lowercased wake words
    pub wake_words: Vec<String>,
    /// Recognizer model location
    pub model_path: Option<PathBuf>,
    /// Render every final transcript as "Heard:"
    pub show_all_transcriptions: bool,
    /// Normalized RMS below which a frame is silent
    pub silence_threshold: f32,
    pub silence_duration: Duration,
    pub max_reset_interval: Duration,
    /// Recent transcript queue capacity
    pub text_buffer_size: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            wake_words: vec!["pi".to_string(), "pie".to_string()],
            model_path: None,
            show_all_transcriptions: true,
            silence_threshold: 0.01,
            silence_duration: Duration::from_secs(2),
            max_reset_interval: Duration::from_secs(30),
            text_buffer_size: 10,
        }
    }
}

/// Message pools
#[derive(Debug, Clone)]
pub struct MessagesConfig {
    pub jokes: Vec<String>,
    pub error_responses: Vec<String>,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            jokes: vec!["No jokes configured!".to_string()],
            error_responses: vec!["Command not recognized".to_string()],
        }
    }
}

/// Log file rotation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Rotating log file configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub rotation: LogRotation,
    /// Rotated files retained per component
    pub backups: usize,
    /// Default level directive
    pub level: String,
    /// Component name -> level override
    pub components: IndexMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("logs"),
            rotation: LogRotation::Daily,
            backups: 5,
            level: "info".to_string(),
            components: IndexMap::new(),
        }
    }
}

/// Legacy logging and command history
#[derive(Debug, Clone)]
pub struct AdvancedConfig {
    /// Legacy single-file log
    pub enable_logging: bool,
    pub log_file: PathBuf,
    pub enable_command_history: bool,
    pub max_command_history: usize,
    /// Default disk usage warning threshold for `system_health`
    pub disk_warning_percent: f32,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            enable_logging: false,
            log_file: PathBuf::from("voice_lcd.log"),
            enable_command_history: false,
            max_command_history: 50,
            disk_warning_percent: 90.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            base_dir: PathBuf::from("."),
            hardware: HardwareConfig::default(),
            display: DisplayConfig::default(),
            voice: VoiceConfig::default(),
            commands: CommandTable::default(),
            messages: MessagesConfig::default(),
            logging: LoggingConfig::default(),
            advanced: AdvancedConfig::default(),
            warnings: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    ///
    /// Never fails: unreadable or invalid files produce defaults plus a warning.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).or_else(file::default_config_path);

        let Some(path) = path else {
            let mut config = Self::default();
            config
                .warnings
                .push("no config path could be determined, using defaults".to_string());
            config.finish_defaults();
            return config;
        };

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        match file::load_config_file(&path) {
            Ok(parsed) => {
                let mut config = Self::from_file_config(parsed, &base_dir);
                config.source = Some(path);
                config
            }
            Err(e) => {
                let mut config = Self {
                    base_dir,
                    ..Self::default()
                };
                config.warnings.push(format!(
                    "failed to load config from {}: {e}, using defaults",
                    path.display()
                ));
                config.finish_defaults();
                config
            }
        }
    }

    /// Parse a TOML document with paths resolved against `base_dir`
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid TOML
    pub fn from_toml_str(content: &str, base_dir: &Path) -> crate::Result<Self> {
        let parsed: ConfigFile = toml::from_str(content)?;
        Ok(Self::from_file_config(parsed, base_dir))
    }

    /// Overlay a parsed file on the defaults and validate it
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn from_file_config(file: ConfigFile, base_dir: &Path) -> Self {
        let mut warnings = Vec::new();
        let defaults = Self::default();

        // Hardware
        let hw = file.hardware;
        let hw_default = defaults.hardware;
        let lcd_address = match hw.lcd_i2c_address {
            Some(value) => parse_address(&value, "hardware.lcd_i2c_address", &mut warnings)
                .unwrap_or(hw_default.lcd_address),
            None => hw_default.lcd_address,
        };
        let oled_addresses = match hw.oled_i2c_addresses {
            Some(values) => {
                let parsed: Vec<u16> = values
                    .iter()
                    .filter_map(|v| {
                        parse_address(v, "hardware.oled_i2c_addresses", &mut warnings)
                    })
                    .collect();
                if parsed.is_empty() {
                    warnings.push(
                        "hardware.oled_i2c_addresses has no valid address, using defaults"
                            .to_string(),
                    );
                    hw_default.oled_addresses
                } else {
                    parsed
                }
            }
            None => hw_default.oled_addresses,
        };
        let display_preference = match hw.display_type.as_deref().map(str::to_lowercase) {
            None => DisplayPreference::Auto,
            Some(t) => match t.as_str() {
                "auto" => DisplayPreference::Auto,
                "lcd" => DisplayPreference::Lcd,
                "oled" => DisplayPreference::Oled,
                "none" => DisplayPreference::None,
                other => {
                    warnings.push(format!(
                        "hardware.display_type '{other}' is not one of auto/lcd/oled/none, using auto"
                    ));
                    DisplayPreference::Auto
                }
            },
        };
        let hardware = HardwareConfig {
            i2c_bus: hw.i2c_bus.map_or(hw_default.i2c_bus, PathBuf::from),
            lcd_address,
            lcd_cols: positive(
                hw.lcd_cols,
                hw_default.lcd_cols,
                "hardware.lcd_cols",
                &mut warnings,
            ),
            lcd_rows: positive(
                hw.lcd_rows,
                hw_default.lcd_rows,
                "hardware.lcd_rows",
                &mut warnings,
            ),
            oled_addresses,
            oled_width: positive(
                hw.oled_width,
                hw_default.oled_width,
                "hardware.oled_width",
                &mut warnings,
            ),
            oled_height: positive(
                hw.oled_height,
                hw_default.oled_height,
                "hardware.oled_height",
                &mut warnings,
            ),
            sample_rate: positive(
                hw.audio_sample_rate,
                hw_default.sample_rate,
                "hardware.audio_sample_rate",
                &mut warnings,
            ),
            chunk_size: positive(
                hw.audio_chunk_size,
                hw_default.chunk_size,
                "hardware.audio_chunk_size",
                &mut warnings,
            ),
            queue_frames: positive(
                hw.audio_queue_frames,
                hw_default.queue_frames,
                "hardware.audio_queue_frames",
                &mut warnings,
            ),
            probe_attempts: positive(
                hw.probe_attempts,
                hw_default.probe_attempts,
                "hardware.probe_attempts",
                &mut warnings,
            ),
            probe_backoff: seconds(
                hw.probe_backoff_seconds,
                hw_default.probe_backoff,
                "hardware.probe_backoff_seconds",
                &mut warnings,
            ),
            display_preference,
        };

        // Display
        let d = file.display;
        let d_default = defaults.display;
        let display = DisplayConfig {
            scroll_speed: seconds(
                d.scroll_speed,
                d_default.scroll_speed,
                "display.scroll_speed",
                &mut warnings,
            ),
            short_text_display_time: seconds(
                d.short_text_display_time,
                d_default.short_text_display_time,
                "display.short_text_display_time",
                &mut warnings,
            ),
            command_result_time: seconds(
                d.command_result_time,
                d_default.command_result_time,
                "display.command_result_time",
                &mut warnings,
            ),
            heard_text_cycles: positive(
                d.heard_text_cycles,
                d_default.heard_text_cycles,
                "display.heard_text_cycles",
                &mut warnings,
            ),
            startup_message: two_lines(d.startup_message, d_default.startup_message),
            idle_message: two_lines(d.idle_message, d_default.idle_message),
            render_tick: seconds(
                d.render_tick_seconds,
                d_default.render_tick,
                "display.render_tick_seconds",
                &mut warnings,
            ),
            oled_line_width: positive(
                d.oled_line_width,
                d_default.oled_line_width,
                "display.oled_line_width",
                &mut warnings,
            ),
            oled_visible_lines: positive(
                d.oled_visible_lines,
                d_default.oled_visible_lines,
                "display.oled_visible_lines",
                &mut warnings,
            ),
            oled_scroll_ticks: positive(
                d.oled_scroll_ticks,
                d_default.oled_scroll_ticks,
                "display.oled_scroll_ticks",
                &mut warnings,
            ),
            oled_service: match d.oled_service {
                Some(name) if name.trim().is_empty() => None,
                Some(name) => Some(name.trim().to_string()),
                None => d_default.oled_service,
            },
            service_grace: seconds(
                d.service_grace_seconds,
                d_default.service_grace,
                "display.service_grace_seconds",
                &mut warnings,
            ),
        };

        // Voice
        let v = file.voice;
        let v_default = defaults.voice;
        let wake_words = match v.wake_words {
            Some(words) => {
                let normalized: Vec<String> = words
                    .into_iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                if normalized.is_empty() {
                    warnings.push(
                        "voice.wake_words is empty, no command will ever dispatch".to_string(),
                    );
                }
                normalized
            }
            None => v_default.wake_words,
        };
        let model_path = v.model_path.map(|p| resolve_path(base_dir, &p));
        if model_path.is_none() {
            warnings.push(
                "voice.model_path is not set, speech recognition is disabled".to_string(),
            );
        }
        let silence_threshold = match v.silence_threshold {
            Some(t) if t.is_finite() && (0.0..=1.0).contains(&t) => narrow(t),
            Some(t) => {
                warnings.push(format!(
                    "voice.silence_threshold {t} is outside [0, 1], using {}",
                    v_default.silence_threshold
                ));
                v_default.silence_threshold
            }
            None => v_default.silence_threshold,
        };
        let voice = VoiceConfig {
            wake_words,
            model_path,
            show_all_transcriptions: v
                .show_all_transcriptions
                .unwrap_or(v_default.show_all_transcriptions),
            silence_threshold,
            silence_duration: seconds(
                v.silence_duration_seconds,
                v_default.silence_duration,
                "voice.silence_duration_seconds",
                &mut warnings,
            ),
            max_reset_interval: seconds(
                v.max_reset_interval_seconds,
                v_default.max_reset_interval,
                "voice.max_reset_interval_seconds",
                &mut warnings,
            ),
            text_buffer_size: positive(
                v.text_buffer_size,
                v_default.text_buffer_size,
                "voice.text_buffer_size",
                &mut warnings,
            ),
        };

        // Advanced (before commands: supplies the health threshold default)
        let a = file.advanced;
        let a_default = defaults.advanced;
        let disk_warning_percent = match a.disk_warning_percent {
            Some(p) if p.is_finite() && (0.0..=100.0).contains(&p) => narrow(p),
            Some(p) => {
                warnings.push(format!(
                    "advanced.disk_warning_percent {p} is outside [0, 100], using {}",
                    a_default.disk_warning_percent
                ));
                a_default.disk_warning_percent
            }
            None => a_default.disk_warning_percent,
        };
        let advanced = AdvancedConfig {
            enable_logging: a.enable_logging.unwrap_or(a_default.enable_logging),
            log_file: resolve_path(
                base_dir,
                a.log_file
                    .as_deref()
                    .unwrap_or_else(|| a_default.log_file.to_str().unwrap_or("voice_lcd.log")),
            ),
            enable_command_history: a
                .enable_command_history
                .unwrap_or(a_default.enable_command_history),
            max_command_history: positive(
                a.max_command_history,
                a_default.max_command_history,
                "advanced.max_command_history",
                &mut warnings,
            ),
            disk_warning_percent,
        };

        // Commands
        let (commands, command_warnings) =
            CommandTable::from_entries(&file.commands, advanced.disk_warning_percent);
        warnings.extend(command_warnings);
        if commands.is_empty() {
            warnings.push("no commands configured".to_string());
        }

        // Messages
        let m = file.messages;
        let m_default = defaults.messages;
        let messages = MessagesConfig {
            jokes: non_empty(m.jokes, m_default.jokes, "messages.jokes", &mut warnings),
            error_responses: non_empty(
                m.error_responses,
                m_default.error_responses,
                "messages.error_responses",
                &mut warnings,
            ),
        };

        // Logging
        let l = file.logging;
        let l_default = defaults.logging;
        let rotation = match l.rotation.as_deref().map(str::to_lowercase) {
            None => l_default.rotation,
            Some(r) => match r.as_str() {
                "daily" => LogRotation::Daily,
                "hourly" => LogRotation::Hourly,
                "never" => LogRotation::Never,
                other => {
                    warnings.push(format!(
                        "logging.rotation '{other}' is not one of daily/hourly/never, using daily"
                    ));
                    LogRotation::Daily
                }
            },
        };
        let logging = LoggingConfig {
            enabled: l.enabled.unwrap_or(l_default.enabled),
            directory: resolve_path(
                base_dir,
                l.directory
                    .as_deref()
                    .unwrap_or_else(|| l_default.directory.to_str().unwrap_or("logs")),
            ),
            rotation,
            backups: positive(l.backups, l_default.backups, "logging.backups", &mut warnings),
            level: l.level.unwrap_or(l_default.level),
            components: l.components,
        };

        Self {
            source: None,
            base_dir: base_dir.to_path_buf(),
            hardware,
            display,
            voice,
            commands,
            messages,
            logging,
            advanced,
            warnings,
        }
    }

    /// Resolve default relative paths against `base_dir`
    fn finish_defaults(&mut self) {
        self.logging.directory = resolve_path(&self.base_dir, "logs");
        self.advanced.log_file = resolve_path(&self.base_dir, "voice_lcd.log");
        self.warnings
            .push("voice.model_path is not set, speech recognition is disabled".to_string());
    }

    /// Display width in characters for the character grid
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.hardware.lcd_cols
    }
}

/// Resolve `path` against `base_dir` unless it is already absolute
#[must_use]
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

fn parse_address(value: &AddressValue, field: &str, warnings: &mut Vec<String>) -> Option<u16> {
    let parsed = value.parse();
    if parsed.is_none() {
        warnings.push(format!("{field}: invalid I2C address {value:?}"));
    }
    parsed
}

fn positive<T>(value: Option<T>, default: T, field: &str, warnings: &mut Vec<String>) -> T
where
    T: PartialOrd + Default + std::fmt::Display + Copy,
{
    match value {
        Some(v) if v > T::default() => v,
        Some(v) => {
            warnings.push(format!("{field} must be positive (got {v}), using {default}"));
            default
        }
        None => default,
    }
}

fn seconds(
    value: Option<f64>,
    default: Duration,
    field: &str,
    warnings: &mut Vec<String>,
) -> Duration {
    match value {
        Some(s) if s.is_finite() && s >= 0.0 => Duration::from_secs_f64(s),
        Some(s) => {
            warnings.push(format!(
                "{field} must be a non-negative number of seconds (got {s}), using {}",
                default.as_secs_f64()
            ));
            default
        }
        None => default,
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn narrow(value: f64) -> f32 {
    value as f32
}

fn two_lines(value: Option<Vec<String>>, default: (String, String)) -> (String, String) {
    value.map_or(default, |lines| {
        (
            lines.first().cloned().unwrap_or_default(),
            lines.get(1).cloned().unwrap_or_default(),
        )
    })
}

fn non_empty(
    value: Option<Vec<String>>,
    default: Vec<String>,
    field: &str,
    warnings: &mut Vec<String>,
) -> Vec<String> {
    match value {
        Some(items) if !items.is_empty() => items,
        Some(_) => {
            warnings.push(format!("{field} is empty, using defaults"));
            default
        }
        None => default,
    }
}
