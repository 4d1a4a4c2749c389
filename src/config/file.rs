//! Configuration file loading
//!
//! Supports a TOML document (or the legacy JSON layout when the file ends in
//! `.json`). All fields are optional — the file is a partial overlay on top of
//! defaults, applied in [`super::Config::from_file_config`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::Result;

/// Top-level configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Bus addressing, display geometry, audio format
    #[serde(default)]
    pub hardware: HardwareFileConfig,

    /// Scroll speed, hold times, startup message
    #[serde(default)]
    pub display: DisplayFileConfig,

    /// Wake words, recognizer model, ring-buffer thresholds
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Command table, in configured order
    #[serde(default)]
    pub commands: IndexMap<String, CommandFileConfig>,

    /// Joke and error-response pools
    #[serde(default)]
    pub messages: MessagesFileConfig,

    /// Rotating log files
    #[serde(default)]
    pub logging: LoggingFileConfig,

    /// Legacy logging and command history
    #[serde(default)]
    pub advanced: AdvancedFileConfig,
}

/// An I2C address written either as a hex string (`"0x27"`) or an integer
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AddressValue {
    Number(u16),
    Text(String),
}

impl AddressValue {
    /// Parse into a 7-bit bus address
    #[must_use]
    pub fn parse(&self) -> Option<u16> {
        let addr = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => {
                let s = s.trim();
                s.strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .map_or_else(|| s.parse().ok(), |hex| u16::from_str_radix(hex, 16).ok())
            }
        };
        addr.filter(|addr| *addr < 0x80)
    }
}

/// Hardware configuration
#[derive(Debug, Default, Deserialize)]
pub struct HardwareFileConfig {
    pub i2c_bus: Option<String>,
    pub lcd_i2c_address: Option<AddressValue>,
    pub lcd_cols: Option<usize>,
    pub lcd_rows: Option<usize>,
    pub oled_i2c_addresses: Option<Vec<AddressValue>>,
    pub oled_width: Option<u32>,
    pub oled_height: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub audio_chunk_size: Option<usize>,
    pub audio_queue_frames: Option<usize>,
    pub probe_attempts: Option<u32>,
    pub probe_backoff_seconds: Option<f64>,
    /// "auto", "lcd", "oled" or "none"
    pub display_type: Option<String>,
}

/// Display timing configuration
#[derive(Debug, Default, Deserialize)]
pub struct DisplayFileConfig {
    pub scroll_speed: Option<f64>,
    pub short_text_display_time: Option<f64>,
    pub command_result_time: Option<f64>,
    pub heard_text_cycles: Option<u32>,
    pub startup_message: Option<Vec<String>>,
    pub idle_message: Option<Vec<String>>,
    pub render_tick_seconds: Option<f64>,
    pub oled_line_width: Option<usize>,
    pub oled_visible_lines: Option<usize>,
    pub oled_scroll_ticks: Option<u32>,
    pub oled_service: Option<String>,
    pub service_grace_seconds: Option<f64>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    pub wake_words: Option<Vec<String>>,
    pub model_path: Option<String>,
    pub show_all_transcriptions: Option<bool>,
    pub silence_threshold: Option<f64>,
    pub silence_duration_seconds: Option<f64>,
    pub max_reset_interval_seconds: Option<f64>,
    pub text_buffer_size: Option<usize>,
}

/// One entry of the command table, before validation
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CommandFileConfig {
    pub action: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub display_format: Option<Vec<String>>,
    pub scroll_duration: Option<f64>,
    pub timeout: Option<f64>,
    pub show_errors: Option<bool>,
    pub message: Option<String>,
    pub command: Option<String>,
    pub shell: Option<bool>,
    pub time_format: Option<String>,
    pub date_format: Option<String>,
    pub disk_warning_percent: Option<f64>,
}

/// Message pools
#[derive(Debug, Default, Deserialize)]
pub struct MessagesFileConfig {
    pub jokes: Option<Vec<String>>,
    pub error_responses: Option<Vec<String>>,
}

/// Rotating log file configuration
#[derive(Debug, Default, Deserialize)]
pub struct LoggingFileConfig {
    pub enabled: Option<bool>,
    pub directory: Option<String>,
    /// "daily", "hourly" or "never"
    pub rotation: Option<String>,
    pub backups: Option<usize>,
    pub level: Option<String>,
    #[serde(default)]
    pub components: IndexMap<String, String>,
}

/// Legacy and miscellaneous options
#[derive(Debug, Default, Deserialize)]
pub struct AdvancedFileConfig {
    pub enable_logging: Option<bool>,
    pub log_file: Option<String>,
    pub enable_command_history: Option<bool>,
    pub max_command_history: Option<usize>,
    pub disk_warning_percent: Option<f64>,
}

/// Parse a configuration document, choosing the format from the file extension
///
/// # Errors
///
/// Returns error if the document is not valid TOML (or JSON for `.json` files)
pub fn parse_config(path: &Path, content: &str) -> Result<ConfigFile> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(toml::from_str(content)?)
    }
}

/// Read and parse a configuration file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(path, &content)?;
    tracing::debug!(path = %path.display(), "parsed config file");
    Ok(config)
}

/// Return the default config path
///
/// `./voice_config.toml` when present, otherwise
/// `~/.config/voice-display/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("voice_config.toml");
    if local.exists() {
        return Some(local);
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-display").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parsing() {
        assert_eq!(AddressValue::Text("0x27".to_string()).parse(), Some(0x27));
        assert_eq!(AddressValue::Text("0X3F".to_string()).parse(), Some(0x3f));
        assert_eq!(AddressValue::Text("60".to_string()).parse(), Some(60));
        assert_eq!(AddressValue::Number(0x3c).parse(), Some(0x3c));
        assert_eq!(AddressValue::Text("zz".to_string()).parse(), None);
        assert_eq!(AddressValue::Number(0x200).parse(), None);
    }

    #[test]
    fn json_layout_is_accepted() {
        let json = r#"{
            "hardware": {"lcd_i2c_address": "0x3f", "lcd_cols": 16},
            "commands": {"ip": {"action": "show_ip", "aliases": ["address"]}}
        }"#;
        let parsed = parse_config(Path::new("voice_config.json"), json).unwrap();
        assert_eq!(parsed.hardware.lcd_cols, Some(16));
        assert_eq!(parsed.commands["ip"].aliases, vec!["address"]);
    }

    #[test]
    fn command_order_is_preserved() {
        let toml = r#"
            [commands.zulu]
            action = "clear_display"

            [commands.alpha]
            action = "show_ip"

            [commands.mike]
            action = "show_time"
        "#;
        let parsed = parse_config(Path::new("voice_config.toml"), toml).unwrap();
        let names: Vec<&str> = parsed.commands.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zulu", "alpha", "mike"]);
    }
}
