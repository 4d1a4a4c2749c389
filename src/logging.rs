//! Logging setup
//!
//! Console output on stderr filtered by verbosity (or `RUST_LOG`), plus
//! rolling log files: one per component, selected by tracing target, and a
//! combined `voice-display.log`. The legacy single-file log is added when
//! `advanced.enable_logging` is set.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Filter, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{Config, LogRotation};
use crate::{Error, Result};

/// Component name and the module target its events come from
pub const COMPONENTS: [(&str, &str); 4] = [
    ("voice", "voice_display::voice"),
    ("display", "voice_display::display"),
    ("commands", "voice_display::commands"),
    ("engine", "voice_display::engine"),
];

/// Prefix of the combined log file
pub const COMBINED_LOG: &str = "voice-display";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background log writers alive
///
/// Dropping it flushes and stops file logging.
#[must_use = "file logging stops when the guard is dropped"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Console filter directive for a `-v` count
#[must_use]
pub const fn console_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "info,voice_display=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Parse a level name, falling back to `info`
#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::INFO)
}

/// Level for `component`: its override, else the default level
#[must_use]
pub fn component_level(config: &Config, component: &str) -> LevelFilter {
    config
        .logging
        .components
        .get(component)
        .map_or_else(|| parse_level(&config.logging.level), |level| parse_level(level))
}

/// Target filter for the combined log
#[must_use]
pub fn combined_targets(config: &Config) -> Targets {
    COMPONENTS.iter().fold(
        Targets::new().with_default(parse_level(&config.logging.level)),
        |targets, (component, target)| {
            targets.with_target(*target, component_level(config, component))
        },
    )
}

const fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Never => Rotation::NEVER,
    }
}

fn file_layer<F>(
    directory: &Path,
    prefix: &str,
    rotation: Rotation,
    backups: usize,
    filter: F,
    guards: &mut Vec<WorkerGuard>,
) -> Result<BoxedLayer>
where
    F: Filter<Registry> + Send + Sync + 'static,
{
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log");
    if backups > 0 {
        builder = builder.max_log_files(backups);
    }

    let appender = builder
        .build(directory)
        .map_err(|e| Error::Config(format!("log file {prefix} in {}: {e}", directory.display())))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);

    Ok(fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter)
        .boxed())
}

fn file_layers(config: &Config, guards: &mut Vec<WorkerGuard>) -> Result<Vec<BoxedLayer>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.logging.enabled {
        let directory = &config.logging.directory;
        std::fs::create_dir_all(directory)?;
        let rotation = rotation(config.logging.rotation);

        for (component, target) in COMPONENTS {
            let filter = Targets::new().with_target(target, component_level(config, component));
            layers.push(file_layer(
                directory,
                component,
                rotation.clone(),
                config.logging.backups,
                filter,
                guards,
            )?);
        }

        layers.push(file_layer(
            directory,
            COMBINED_LOG,
            rotation,
            config.logging.backups,
            combined_targets(config),
            guards,
        )?);
    }

    if config.advanced.enable_logging {
        let path = &config.advanced.log_file;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let prefix = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(COMBINED_LOG);
        std::fs::create_dir_all(directory)?;

        layers.push(file_layer(
            directory,
            prefix,
            Rotation::NEVER,
            0,
            parse_level(&config.logging.level),
            guards,
        )?);
    }

    Ok(layers)
}

/// Install the global subscriber
///
/// File logging failures are reported on the console and do not stop the
/// program; configuration warnings are logged once the subscriber is up.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed
pub fn init(config: &Config, verbosity: u8) -> Result<LogGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directive(verbosity)));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .with_filter(console_filter)
        .boxed();

    let mut guards = Vec::new();
    let (mut layers, file_error) = match file_layers(config, &mut guards) {
        Ok(layers) => (layers, None),
        Err(e) => {
            guards.clear();
            (Vec::new(), Some(e))
        }
    };
    layers.push(console);

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    if let Some(e) = file_error {
        tracing::warn!(error = %e, "file logging disabled");
    } else if config.logging.enabled {
        tracing::debug!(directory = %config.logging.directory.display(), "file logging enabled");
    }

    for warning in &config.warnings {
        tracing::warn!("config: {warning}");
    }

    Ok(LogGuard { _guards: guards })
}
