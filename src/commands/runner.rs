//! External command execution via subprocess

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::{Error, Result};

/// Timeout applied when a command does not configure one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Displayed output is cut to this many characters
pub const MAX_OUTPUT_CHARS: usize = 50;

/// Exit status shells use for "command not found"
const SHELL_NOT_FOUND: i32 = 127;

/// Parameters of a `run_command` action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommandSpec {
    pub command: String,
    /// Run through `sh -c`; otherwise split on whitespace and spawn directly
    pub shell: bool,
    pub timeout: Option<Duration>,
    /// Show stderr on non-zero exit instead of a generic message
    pub show_errors: bool,
}

/// Result of running a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exit status zero, trimmed stdout
    Success(String),
    /// Non-zero exit
    Failed { code: Option<i32>, stderr: String },
    /// Killed after the timeout elapsed
    TimedOut(Duration),
    /// The program does not exist
    NotFound(String),
    /// Any other spawn or wait failure
    Error(String),
}

impl CommandOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Bounded, user-visible text for this outcome
    #[must_use]
    pub fn display_text(&self, show_errors: bool) -> String {
        let text = match self {
            Self::Success(stdout) => stdout.clone(),
            Self::Failed { stderr, .. } if show_errors && !stderr.is_empty() => stderr.clone(),
            Self::Failed { code: Some(code), .. } => format!("Command failed ({code})"),
            Self::Failed { code: None, .. } => "Command failed".to_string(),
            Self::TimedOut(after) => format!("Timed out after {}s", after.as_secs_f32()),
            Self::NotFound(program) => format!("Not found: {program}"),
            Self::Error(e) => format!("Error: {e}"),
        };
        truncate_chars(&text, MAX_OUTPUT_CHARS)
    }

    /// Trimmed output on success, `Error::Command` with the display text otherwise
    ///
    /// # Errors
    ///
    /// Returns `Error::Command` for every outcome except `Success`
    pub fn into_result(self, show_errors: bool) -> Result<String> {
        let text = self.display_text(show_errors);
        if self.is_success() {
            Ok(text)
        } else {
            Err(Error::Command(text))
        }
    }
}

/// Run `spec` to completion or timeout; never fails
pub async fn run_command(spec: &RunCommandSpec) -> CommandOutcome {
    let timeout_duration = spec.timeout.unwrap_or(DEFAULT_TIMEOUT);

    let (program, args) = match determine_invocation(spec) {
        Ok(invocation) => invocation,
        Err(outcome) => return outcome,
    };

    let child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return CommandOutcome::NotFound(program);
        }
        Err(e) => return CommandOutcome::Error(format!("failed to spawn: {e}")),
    };

    // Dropping the child on timeout kills it
    let output = match timeout(timeout_duration, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return CommandOutcome::Error(format!("execution failed: {e}")),
        Err(_) => {
            tracing::warn!(command = %spec.command, ?timeout_duration, "command timed out");
            return CommandOutcome::TimedOut(timeout_duration);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !stderr.is_empty() {
        tracing::debug!(command = %spec.command, stderr = %stderr, "command stderr");
    }

    if output.status.success() {
        return CommandOutcome::Success(stdout);
    }

    let code = output.status.code();
    if spec.shell && code == Some(SHELL_NOT_FOUND) {
        return CommandOutcome::NotFound(first_word(&spec.command).to_string());
    }

    tracing::warn!(command = %spec.command, ?code, "command exited with failure");
    CommandOutcome::Failed { code, stderr }
}

/// Program and arguments for `spec`, or the outcome when it cannot run
fn determine_invocation(
    spec: &RunCommandSpec,
) -> std::result::Result<(String, Vec<String>), CommandOutcome> {
    if spec.shell {
        return Ok((
            "sh".to_string(),
            vec!["-c".to_string(), spec.command.clone()],
        ));
    }

    let mut parts = spec.command.split_whitespace().map(ToString::to_string);
    let program = parts
        .next()
        .ok_or_else(|| CommandOutcome::Error("empty command".to_string()))?;

    if which::which(&program).is_err() {
        return Err(CommandOutcome::NotFound(program));
    }

    Ok((program, parts.collect()))
}

fn first_word(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

/// First `max` characters of `text`
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// How a two-line result is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPlan {
    /// Both lines fit: show them and hold
    Static { line1: String, line2: String },
    /// Second line too wide: show the header, then scroll the text
    Scroll { line1: String, text: String },
}

/// Choose between static and scrolling rendering for a display `width`
#[must_use]
pub fn plan_render(line1: String, line2: String, width: usize) -> RenderPlan {
    if line2.chars().count() <= width {
        RenderPlan::Static { line1, line2 }
    } else {
        RenderPlan::Scroll { line1, text: line2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(command: &str) -> RunCommandSpec {
        RunCommandSpec {
            command: command.to_string(),
            shell: true,
            timeout: Some(Duration::from_secs(5)),
            show_errors: true,
        }
    }

    #[tokio::test]
    async fn test_stdout_is_captured() {
        let outcome = run_command(&shell("echo hello")).await;
        assert_eq!(outcome, CommandOutcome::Success("hello".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_yields_timeout_message() {
        let spec = RunCommandSpec {
            timeout: Some(Duration::from_millis(200)),
            ..shell("sleep 5")
        };

        let outcome = run_command(&spec).await;
        assert!(matches!(outcome, CommandOutcome::TimedOut(_)));
        assert!(outcome.display_text(true).starts_with("Timed out"));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let direct = RunCommandSpec {
            shell: false,
            ..shell("no-such-program-voice-display --flag")
        };
        assert_eq!(
            run_command(&direct).await,
            CommandOutcome::NotFound("no-such-program-voice-display".to_string())
        );

        let via_shell = run_command(&shell("no-such-program-voice-display")).await;
        assert!(matches!(via_shell, CommandOutcome::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stderr_shown_only_when_enabled() {
        let outcome = run_command(&shell("echo oops >&2; exit 3")).await;
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                code: Some(3),
                stderr: "oops".to_string()
            }
        );
        assert_eq!(outcome.display_text(true), "oops");
        assert_eq!(outcome.display_text(false), "Command failed (3)");
    }

    #[tokio::test]
    async fn test_long_output_is_truncated_and_scrolled() {
        let long = "x".repeat(80);
        let outcome = run_command(&shell(&format!("echo {long}"))).await;

        let text = outcome.display_text(false);
        assert_eq!(text.len(), MAX_OUTPUT_CHARS);

        let plan = plan_render("Output:".to_string(), text.clone(), 16);
        assert_eq!(
            plan,
            RenderPlan::Scroll {
                line1: "Output:".to_string(),
                text
            }
        );
    }

    #[tokio::test]
    async fn test_failures_become_command_errors() {
        let ok = run_command(&shell("echo fine")).await.into_result(true);
        assert_eq!(ok.unwrap(), "fine");

        let failed = run_command(&shell("exit 4")).await.into_result(false);
        match failed {
            Err(Error::Command(text)) => assert_eq!(text, "Command failed (4)"),
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[test]
    fn test_short_output_is_static() {
        let plan = plan_render("Uptime:".to_string(), "3 days".to_string(), 16);
        assert!(matches!(plan, RenderPlan::Static { .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
    }
}
