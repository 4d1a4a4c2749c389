//! Voice command table
//!
//! Commands are configured as an ordered map of name -> descriptor. Each entry
//! is validated once at load time into a [`CommandDescriptor`] whose
//! [`ActionKind`] carries only the fields meaningful for that action.

pub mod dispatcher;
pub mod matcher;
pub mod runner;
pub mod system;
pub mod template;

use std::time::Duration;

use indexmap::IndexMap;

use crate::config::file::CommandFileConfig;
use crate::{Error, Result};

pub use dispatcher::{ActionDispatcher, DispatchContext};
pub use matcher::find_matching_command;
pub use runner::{CommandOutcome, RunCommandSpec};

/// Default strftime format for the time line of `show_time`
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S";

/// Default strftime format for the date line of `show_time`
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%y";

/// Action executed when a command matches
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Show the host IP address
    ShowIp,
    /// Show the current time and date
    ShowTime {
        time_format: String,
        date_format: String,
    },
    /// Show a random joke from the message pool
    TellJoke,
    /// Show a templated message
    CustomMessage { message: String },
    /// Run a shell command and show its output
    RunCommand(RunCommandSpec),
    /// Show log directory size
    ShowLogInfo,
    /// Remove rotated log files
    CleanLogs,
    /// Show disk and memory usage
    SystemHealth { disk_warning_percent: f32 },
    /// Clear the display
    ClearDisplay,
}

impl ActionKind {
    /// Configuration tag for this action
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::ShowIp => "show_ip",
            Self::ShowTime { .. } => "show_time",
            Self::TellJoke => "tell_joke",
            Self::CustomMessage { .. } => "custom_message",
            Self::RunCommand(_) => "run_command",
            Self::ShowLogInfo => "show_log_info",
            Self::CleanLogs => "clean_logs",
            Self::SystemHealth { .. } => "system_health",
            Self::ClearDisplay => "clear_display",
        }
    }
}

/// Two-line display template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFormat {
    pub line1: String,
    pub line2: String,
}

impl DisplayFormat {
    #[must_use]
    pub fn new(line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self {
            line1: line1.into(),
            line2: line2.into(),
        }
    }
}

/// A validated command table entry
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    /// Command name (lowercase)
    pub name: String,
    /// Alternative phrases (lowercase)
    pub aliases: Vec<String>,
    /// What to do when matched
    pub action: ActionKind,
    /// Optional two-line template overriding the action's default
    pub display_format: Option<DisplayFormat>,
    /// How long scrolled or static messages stay visible
    pub scroll_duration: Option<Duration>,
}

impl CommandDescriptor {
    /// Validate a raw command table entry
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the name is blank, the action is unknown,
    /// or a field the action requires is missing
    pub fn from_file(
        name: &str,
        raw: &CommandFileConfig,
        default_disk_warning: f32,
    ) -> Result<Self> {
        // A blank phrase is a substring of every transcript
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::Config("command with an empty name".to_string()));
        }

        let tag = raw
            .action
            .as_deref()
            .ok_or_else(|| Error::Config(format!("command '{name}' has no action")))?;

        let action = match tag.trim().to_lowercase().as_str() {
            "show_ip" => ActionKind::ShowIp,
            "show_time" => ActionKind::ShowTime {
                time_format: raw
                    .time_format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string()),
                date_format: raw
                    .date_format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            },
            "tell_joke" => ActionKind::TellJoke,
            "custom_message" => ActionKind::CustomMessage {
                message: raw.message.clone().ok_or_else(|| {
                    Error::Config(format!("custom_message command '{name}' has no message"))
                })?,
            },
            "run_command" => {
                let command = raw
                    .command
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        Error::Config(format!("run_command command '{name}' has no command"))
                    })?;
                ActionKind::RunCommand(RunCommandSpec {
                    command,
                    shell: raw.shell.unwrap_or(true),
                    timeout: positive_seconds(raw.timeout),
                    show_errors: raw.show_errors.unwrap_or(false),
                })
            }
            "show_log_info" => ActionKind::ShowLogInfo,
            "clean_logs" => ActionKind::CleanLogs,
            "system_health" => {
                #[allow(clippy::cast_possible_truncation)]
                let disk_warning_percent = raw
                    .disk_warning_percent
                    .map_or(default_disk_warning, |p| p as f32);
                ActionKind::SystemHealth {
                    disk_warning_percent,
                }
            }
            "clear_display" => ActionKind::ClearDisplay,
            other => {
                return Err(Error::Config(format!(
                    "command '{name}' has unknown action '{other}'"
                )));
            }
        };

        let display_format = raw.display_format.as_ref().map(|lines| {
            DisplayFormat::new(
                lines.first().cloned().unwrap_or_default(),
                lines.get(1).cloned().unwrap_or_default(),
            )
        });

        Ok(Self {
            name,
            aliases: raw
                .aliases
                .iter()
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
            action,
            display_format,
            scroll_duration: positive_seconds(raw.scroll_duration),
        })
    }

    /// Name followed by aliases, in match order
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

fn positive_seconds(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
}

/// Ordered, validated command table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandTable {
    commands: Vec<CommandDescriptor>,
}

impl CommandTable {
    /// Build a table from already validated descriptors
    #[must_use]
    pub const fn new(commands: Vec<CommandDescriptor>) -> Self {
        Self { commands }
    }

    /// Validate raw entries, skipping invalid ones
    ///
    /// Returns the table and one warning per skipped entry.
    #[must_use]
    pub fn from_entries(
        entries: &IndexMap<String, CommandFileConfig>,
        default_disk_warning: f32,
    ) -> (Self, Vec<String>) {
        let mut commands = Vec::with_capacity(entries.len());
        let mut warnings = Vec::new();

        for (name, raw) in entries {
            match CommandDescriptor::from_file(name, raw, default_disk_warning) {
                Ok(descriptor) => commands.push(descriptor),
                Err(e) => warnings.push(format!("skipping command: {e}")),
            }
        }

        (Self { commands }, warnings)
    }

    /// Iterate commands in configured order
    pub fn iter(&self) -> std::slice::Iter<'_, CommandDescriptor> {
        self.commands.iter()
    }

    /// Look up a command by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<'a> IntoIterator for &'a CommandTable {
    type Item = &'a CommandDescriptor;
    type IntoIter = std::slice::Iter<'a, CommandDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}
