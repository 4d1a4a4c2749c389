//! Action execution
//!
//! Every action renders onto the [`Display`] and holds for its configured
//! time. Failures (process spawn, timeouts, unreadable log directory) are
//! turned into short display strings here; nothing propagates to the loop.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use rand::seq::SliceRandom;

use super::runner::{self, RenderPlan, truncate_chars};
use super::system::{self, HealthReport};
use super::template::{TemplateVars, substitute_variables};
use super::{ActionKind, CommandDescriptor, CommandTable, DEFAULT_TIME_FORMAT, DisplayFormat};
use crate::Error;
use crate::config::Config;
use crate::display::{Display, ScrollLine, ScrollSpan};

/// Hold time for jokes without a `scroll_duration`
pub const DEFAULT_JOKE_DURATION: Duration = Duration::from_secs(8);

/// Hold time for custom messages without a `scroll_duration`
pub const DEFAULT_MESSAGE_DURATION: Duration = Duration::from_secs(5);

/// Scroll time of the "not recognized" response
pub const NO_MATCH_DURATION: Duration = Duration::from_secs(3);

/// Hold after clearing the display
pub const CLEAR_HOLD: Duration = Duration::from_secs(1);

/// Pause between a header and a scroll on the line below it
pub const SCROLL_LEAD_IN: Duration = Duration::from_millis(500);

/// Marquee passes for long command output
pub const OUTPUT_SCROLL_CYCLES: u32 = 2;

/// Error text length on a display line
const ERROR_TEXT_CHARS: usize = 16;

/// Settings the dispatcher needs from the configuration
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub jokes: Vec<String>,
    pub error_responses: Vec<String>,
    /// Hold time for command results
    pub command_result_time: Duration,
    /// Directory inspected by `show_log_info` and `clean_logs`
    pub log_dir: PathBuf,
}

impl DispatchContext {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            jokes: config.messages.jokes.clone(),
            error_responses: config.messages.error_responses.clone(),
            command_result_time: config.display.command_result_time,
            log_dir: config.logging.directory.clone(),
        }
    }
}

/// Executes matched commands against the display
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    context: DispatchContext,
}

impl ActionDispatcher {
    #[must_use]
    pub const fn new(context: DispatchContext) -> Self {
        Self { context }
    }

    #[must_use]
    pub const fn context(&self) -> &DispatchContext {
        &self.context
    }

    /// Match `transcript` against `table` and execute the result
    ///
    /// Returns the matched command's name, or `None` after showing an error
    /// response.
    #[allow(clippy::future_not_send)]
    pub async fn handle<'a>(
        &self,
        display: &mut Display,
        table: &'a CommandTable,
        transcript: &str,
    ) -> Option<&'a str> {
        match super::find_matching_command(transcript, table) {
            Some(command) => {
                self.execute(display, command, transcript).await;
                Some(command.name.as_str())
            }
            None => {
                self.reject(display).await;
                None
            }
        }
    }

    /// Execute `command`
    #[allow(clippy::future_not_send, clippy::too_many_lines)]
    pub async fn execute(
        &self,
        display: &mut Display,
        command: &CommandDescriptor,
        transcript: &str,
    ) {
        tracing::info!(
            command = %command.name,
            action = command.action.tag(),
            transcript,
            "executing command"
        );

        match &command.action {
            ActionKind::ShowIp => {
                let format = command
                    .display_format
                    .clone()
                    .unwrap_or_else(|| DisplayFormat::new("IP Address:", "{ip}"));
                self.show_format(display, &format).await;
            }
            ActionKind::ShowTime {
                time_format,
                date_format,
            } => {
                if let Some(format) = &command.display_format {
                    self.show_format(display, format).await;
                } else {
                    let now = Local::now();
                    let time = format_timestamp(now, time_format);
                    let date = format_timestamp(now, date_format);
                    display
                        .show_for(&time, &date, self.context.command_result_time)
                        .await;
                }
            }
            ActionKind::TellJoke => {
                let joke = pick(&self.context.jokes, "No jokes configured!");
                let text = self.render(&joke, None).await;
                let duration = command.scroll_duration.unwrap_or(DEFAULT_JOKE_DURATION);
                show_message(display, &text, duration).await;
            }
            ActionKind::CustomMessage { message } => {
                let text = self.render(message, None).await;
                let duration = command.scroll_duration.unwrap_or(DEFAULT_MESSAGE_DURATION);
                show_message(display, &text, duration).await;
            }
            ActionKind::RunCommand(spec) => {
                let outcome = runner::run_command(spec).await;

                let (line1, line2) = match outcome.into_result(spec.show_errors) {
                    Ok(output) => {
                        let format = command
                            .display_format
                            .clone()
                            .unwrap_or_else(|| DisplayFormat::new("Output:", "{output}"));
                        (
                            self.render(&format.line1, Some(&output)).await,
                            self.render(&format.line2, Some(&output)).await,
                        )
                    }
                    Err(error) => {
                        tracing::warn!(command = %command.name, error = %error, "command failed");
                        let text = match error {
                            Error::Command(text) => text,
                            other => other.to_string(),
                        };
                        ("Command Error:".to_string(), text)
                    }
                };

                match runner::plan_render(line1, line2, display.width()) {
                    RenderPlan::Static { line1, line2 } => {
                        display
                            .show_for(&line1, &line2, self.context.command_result_time)
                            .await;
                    }
                    RenderPlan::Scroll { line1, text } => {
                        display.show_for(&line1, "", SCROLL_LEAD_IN).await;
                        display
                            .scroll(
                                &line1,
                                &text,
                                ScrollLine::Second,
                                ScrollSpan::Cycles(OUTPUT_SCROLL_CYCLES),
                            )
                            .await;
                    }
                }
            }
            ActionKind::ShowLogInfo => {
                let (line1, line2) = match system::log_summary(&self.context.log_dir) {
                    Ok(summary) => (
                        format!("Logs: {} files", summary.files),
                        system::format_bytes(summary.bytes),
                    ),
                    Err(e) => error_lines("Log Error:", &e),
                };
                display
                    .show_for(&line1, &line2, self.context.command_result_time)
                    .await;
            }
            ActionKind::CleanLogs => {
                let (line1, line2) = match system::clean_logs(&self.context.log_dir) {
                    Ok(removed) => (
                        "Logs cleaned".to_string(),
                        format!("Freed {}", system::format_bytes(removed.bytes)),
                    ),
                    Err(e) => error_lines("Clean Error:", &e),
                };
                display
                    .show_for(&line1, &line2, self.context.command_result_time)
                    .await;
            }
            ActionKind::SystemHealth {
                disk_warning_percent,
            } => {
                let report = HealthReport::collect();
                tracing::info!("{}", report.diagnostics());

                if report.disk_warning(*disk_warning_percent) {
                    tracing::warn!(
                        used = report.disk_used_percent(),
                        threshold = disk_warning_percent,
                        "disk usage above warning threshold"
                    );
                }

                let (line1, line2) = report.summary_lines(*disk_warning_percent);
                display
                    .show_for(&line1, &line2, self.context.command_result_time)
                    .await;
            }
            ActionKind::ClearDisplay => {
                display.clear();
                display.hold(CLEAR_HOLD).await;
            }
        }
    }

    /// Show a random "not recognized" response
    pub async fn reject(&self, display: &mut Display) {
        let response = pick(&self.context.error_responses, "Command not recognized");
        tracing::info!(response = %response, "no command matched");
        display
            .scroll(
                "",
                &response,
                ScrollLine::First,
                ScrollSpan::For(NO_MATCH_DURATION),
            )
            .await;
    }

    async fn show_format(&self, display: &mut Display, format: &DisplayFormat) {
        let line1 = self.render(&format.line1, None).await;
        let line2 = self.render(&format.line2, None).await;
        display
            .show_for(&line1, &line2, self.context.command_result_time)
            .await;
    }

    async fn render(&self, template: &str, output: Option<&str>) -> String {
        let ip = if template.contains("{ip}") {
            system::local_ip().await
        } else {
            String::new()
        };
        let resolve_ip = || ip.clone();

        substitute_variables(
            template,
            &TemplateVars {
                now: Local::now(),
                output,
                ip: &resolve_ip,
            },
        )
    }
}

/// Static when it fits one line, otherwise a marquee on line 1
async fn show_message(display: &mut Display, text: &str, duration: Duration) {
    if text.chars().count() <= display.width() {
        display.show_for(text, "", duration).await;
    } else {
        display
            .scroll("", text, ScrollLine::First, ScrollSpan::For(duration))
            .await;
    }
}

fn pick(pool: &[String], fallback: &str) -> String {
    pool.choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

fn error_lines(header: &str, error: &Error) -> (String, String) {
    tracing::warn!(error = %error, "{header}");
    (header.to_string(), truncate_chars(&error.to_string(), ERROR_TEXT_CHARS))
}

/// strftime `format`, falling back to the default time format when invalid
fn format_timestamp(now: DateTime<Local>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        tracing::warn!(format, "invalid time format");
        return now.format(DEFAULT_TIME_FORMAT).to_string();
    }
    out
}
