//! External rendering service control
//!
//! Another process (an ambient animation service) may own the pixel display
//! bus. It is stopped before the pixel display is probed and restarted on
//! rollback or shutdown through the host service manager.

use crate::{Error, Result};

/// Service state as reported by the service manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Service is running
    Running,
    /// Service is installed but not running
    Stopped,
    /// Status could not be determined
    Unknown(String),
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown(msg) => write!(f, "unknown ({msg})"),
        }
    }
}

/// Start/stop access to named system services
pub trait ServiceControl {
    /// Query a service
    ///
    /// # Errors
    ///
    /// Returns error if the service manager cannot be reached
    fn status(&mut self, name: &str) -> Result<ServiceStatus>;

    /// Stop a running service
    ///
    /// # Errors
    ///
    /// Returns error if the service manager refuses
    fn stop(&mut self, name: &str) -> Result<()>;

    /// Start a service
    ///
    /// # Errors
    ///
    /// Returns error if the service manager refuses
    fn start(&mut self, name: &str) -> Result<()>;

    /// Whether the service is known to be running
    fn is_active(&mut self, name: &str) -> bool {
        matches!(self.status(name), Ok(ServiceStatus::Running))
    }
}

/// systemd system services through `systemctl`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdServices;

impl ServiceControl for SystemdServices {
    fn status(&mut self, name: &str) -> Result<ServiceStatus> {
        let output = std::process::Command::new("systemctl")
            .args(["is-active", name])
            .output()
            .map_err(|e| Error::Service(format!("failed to run systemctl: {e}")))?;

        let status = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(parse_is_active(&status))
    }

    fn stop(&mut self, name: &str) -> Result<()> {
        tracing::info!(service = name, "stopping service");
        run_systemctl(&["stop", name])
    }

    fn start(&mut self, name: &str) -> Result<()> {
        tracing::info!(service = name, "starting service");
        run_systemctl(&["start", name])
    }
}

fn parse_is_active(status: &str) -> ServiceStatus {
    match status {
        "active" | "activating" | "reloading" => ServiceStatus::Running,
        "inactive" | "failed" | "deactivating" => ServiceStatus::Stopped,
        other => ServiceStatus::Unknown(other.to_string()),
    }
}

fn run_systemctl(args: &[&str]) -> Result<()> {
    let output = std::process::Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|e| Error::Service(format!("failed to run systemctl: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Service(format!(
            "systemctl {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(())
}
