//! Host queries used by actions: IP address, log directory, disk and memory

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sysinfo::{Disks, System};
use tokio::process::Command;

use crate::Result;

/// Shown when no address can be determined
pub const NO_NETWORK: &str = "No Network";

/// First address reported by `hostname -I`
pub async fn local_ip() -> String {
    match Command::new("hostname").arg("-I").output().await {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .next()
            .map_or_else(|| NO_NETWORK.to_string(), ToString::to_string),
        Ok(output) => {
            tracing::debug!(status = ?output.status, "hostname -I failed");
            NO_NETWORK.to_string()
        }
        Err(e) => {
            tracing::debug!(error = %e, "hostname not available");
            NO_NETWORK.to_string()
        }
    }
}

/// Human readable byte count
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Files and total size of the log directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Summarize regular files in `dir`; a missing directory is empty
///
/// # Errors
///
/// Returns error if the directory exists but cannot be read
pub fn log_summary(dir: &Path) -> Result<LogSummary> {
    let mut summary = LogSummary::default();
    for (_, meta) in log_files(dir)? {
        summary.files += 1;
        summary.bytes += meta.len();
    }
    Ok(summary)
}

/// Delete rotated log files, keeping the newest file of each log
///
/// Files are grouped by their name with date segments removed, so the
/// rolling files `voice.2024-03-08.log` and `voice.2024-03-09-14.log` and a
/// legacy `voice.log.2024-03-07` all belong to the `voice.log` group.
///
/// # Errors
///
/// Returns error if the directory exists but cannot be read
pub fn clean_logs(dir: &Path) -> Result<LogSummary> {
    let mut groups: HashMap<String, Vec<(PathBuf, fs::Metadata)>> = HashMap::new();
    for (path, meta) in log_files(dir)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        groups.entry(log_group(&name)).or_default().push((path, meta));
    }

    let mut removed = LogSummary::default();
    for (_, mut files) in groups {
        files.sort_by_key(|(path, meta)| {
            (
                meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path.clone(),
            )
        });
        files.pop();

        for (path, meta) in files {
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed.files += 1;
                    removed.bytes += meta.len();
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove log file");
                }
            }
        }
    }

    tracing::info!(files = removed.files, bytes = removed.bytes, "rotated logs removed");
    Ok(removed)
}

/// Log name with rotation date segments dropped
fn log_group(file_name: &str) -> String {
    file_name
        .split('.')
        .filter(|segment| !is_date_segment(segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// `YYYY-MM-DD`, `YYYY-MM-DD-HH` or `YYYY-MM-DD-HH-MM`
fn is_date_segment(segment: &str) -> bool {
    let parts: Vec<&str> = segment.split('-').collect();
    (3..=5).contains(&parts.len())
        && parts[0].len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

fn log_files(dir: &Path) -> Result<Vec<(PathBuf, fs::Metadata)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            files.push((entry.path(), meta));
        }
    }
    Ok(files)
}

/// Disk, memory and load snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub disk_mount: PathBuf,
    pub disk_total: u64,
    pub disk_available: u64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub uptime_secs: u64,
    pub load_average: [f64; 3],
}

impl HealthReport {
    /// Collect a snapshot for the root filesystem
    #[must_use]
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));

        let (disk_mount, disk_total, disk_available) = root.map_or_else(
            || (PathBuf::from("/"), 0, 0),
            |d| (d.mount_point().to_path_buf(), d.total_space(), d.available_space()),
        );

        let load = System::load_average();

        Self {
            disk_mount,
            disk_total,
            disk_available,
            memory_total: sys.total_memory(),
            memory_used: sys.used_memory(),
            uptime_secs: System::uptime(),
            load_average: [load.one, load.five, load.fifteen],
        }
    }

    #[must_use]
    pub fn disk_used_percent(&self) -> f32 {
        percent(self.disk_total.saturating_sub(self.disk_available), self.disk_total)
    }

    #[must_use]
    pub fn memory_used_percent(&self) -> f32 {
        percent(self.memory_used, self.memory_total)
    }

    /// Whether disk usage reached `threshold` percent
    #[must_use]
    pub fn disk_warning(&self, threshold: f32) -> bool {
        self.disk_used_percent() >= threshold
    }

    /// Two-line summary for the display
    #[must_use]
    pub fn summary_lines(&self, threshold: f32) -> (String, String) {
        let line1 = format!(
            "Disk {:.0}% Mem {:.0}%",
            self.disk_used_percent(),
            self.memory_used_percent()
        );

        let line2 = if self.disk_warning(threshold) {
            "DISK WARNING!".to_string()
        } else {
            format!("Up {}", format_uptime(self.uptime_secs))
        };

        (line1, line2)
    }

    /// Extended multi-line report for the console
    #[must_use]
    pub fn diagnostics(&self) -> String {
        let [one, five, fifteen] = self.load_average;
        format!(
            "System health\n  disk {}: {} used of {} ({:.1}%)\n  memory: {} used of {} ({:.1}%)\n  uptime: {}\n  load: {one:.2} {five:.2} {fifteen:.2}",
            self.disk_mount.display(),
            format_bytes(self.disk_total.saturating_sub(self.disk_available)),
            format_bytes(self.disk_total),
            self.disk_used_percent(),
            format_bytes(self.memory_used),
            format_bytes(self.memory_total),
            self.memory_used_percent(),
            format_uptime(self.uptime_secs),
        )
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn percent(part: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 100.0) as f32
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn report(disk_used: u64, memory_used: u64) -> HealthReport {
        HealthReport {
            disk_mount: PathBuf::from("/"),
            disk_total: 100,
            disk_available: 100 - disk_used,
            memory_total: 1000,
            memory_used,
            uptime_secs: 3 * 86_400 + 4 * 3_600,
            load_average: [0.5, 0.25, 0.1],
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_health_summary_under_threshold() {
        let (line1, line2) = report(42, 310).summary_lines(90.0);
        assert_eq!(line1, "Disk 42% Mem 31%");
        assert_eq!(line2, "Up 3d 4h");
    }

    #[test]
    fn test_health_summary_warns_at_threshold() {
        let health = report(95, 100);
        assert!(health.disk_warning(90.0));
        assert_eq!(health.summary_lines(90.0).1, "DISK WARNING!");
        assert!(health.diagnostics().contains("load: 0.50 0.25 0.10"));
    }

    #[test]
    fn test_empty_totals_do_not_divide_by_zero() {
        let health = HealthReport {
            disk_total: 0,
            disk_available: 0,
            memory_total: 0,
            ..report(0, 0)
        };
        assert!(health.disk_used_percent().abs() < f32::EPSILON);
        assert!(health.memory_used_percent().abs() < f32::EPSILON);
    }

    #[test]
    fn test_log_summary_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, size: usize| {
            fs::write(dir.path().join(name), vec![b'x'; size]).unwrap();
            // Distinct modification times
            std::thread::sleep(Duration::from_millis(20));
        };

        write("voice.2024-03-08.log", 100);
        write("voice.2024-03-09.log", 50);
        write("engine.2024-03-09.log", 10);

        let summary = log_summary(dir.path()).unwrap();
        assert_eq!(summary, LogSummary { files: 3, bytes: 160 });

        let removed = clean_logs(dir.path()).unwrap();
        assert_eq!(removed, LogSummary { files: 1, bytes: 100 });
        assert!(dir.path().join("voice.2024-03-09.log").exists());
        assert!(dir.path().join("engine.2024-03-09.log").exists());
        assert!(!dir.path().join("voice.2024-03-08.log").exists());
    }

    #[test]
    fn test_log_group_drops_dates() {
        assert_eq!(log_group("voice.2024-03-08.log"), "voice.log");
        assert_eq!(log_group("voice.2024-03-08-14.log"), "voice.log");
        assert_eq!(log_group("voice.log.2024-03-08"), "voice.log");
        assert_eq!(log_group("voice-display.2024-03-08.log"), "voice-display.log");
        assert_eq!(log_group("voice.log"), "voice.log");
        assert_eq!(log_group("notes.2024.txt"), "notes.2024.txt");
    }

    #[test]
    fn test_clean_keeps_active_rolling_file() {
        use std::io::Write as _;

        use tracing_appender::rolling::{RollingFileAppender, Rotation};

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("voice.2024-03-07.log"), vec![b'x'; 70]).unwrap();
        fs::write(dir.path().join("voice.2024-03-08.log"), vec![b'x'; 30]).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let mut appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("voice")
            .filename_suffix("log")
            .build(dir.path())
            .unwrap();
        appender.write_all(b"listening\n").unwrap();
        appender.flush().unwrap();
        drop(appender);

        let active = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .find(|n| n != "voice.2024-03-07.log" && n != "voice.2024-03-08.log")
            .unwrap();

        let removed = clean_logs(dir.path()).unwrap();
        assert_eq!(removed, LogSummary { files: 2, bytes: 100 });
        assert!(dir.path().join(&active).exists());
        assert_eq!(log_summary(dir.path()).unwrap().files, 1);
    }

    #[test]
    fn test_missing_log_dir_is_empty() {
        let summary = log_summary(Path::new("/nonexistent/voice-display/logs")).unwrap();
        assert_eq!(summary, LogSummary::default());
    }
}
