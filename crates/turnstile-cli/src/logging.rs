//! Console and rolling-file logging for the turnstile binary.
//!
//! | Log File        | Component                | Target Prefixes               |
//! |-----------------|--------------------------|-------------------------------|
//! | turnstile.log   | Root logger (all events) | (all)                         |
//! | lock.log        | Lock protocol            | turnstile_lock                |
//! | store.log       | Coordination store       | turnstile_store               |
//! | simulation.log  | Contention simulation    | turnstile_cli, turnstile      |
//!
//! File logging is off by default; enable it with `log.file: true`.

use std::path::PathBuf;

use anyhow::Context as _;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const ROOT_LOG_FILE: &str = "turnstile.log";

struct ComponentLogDef {
    file_name: &'static str,
    /// Target module prefixes routed to this file
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "lock.log",
        targets: &["turnstile_lock"],
    },
    ComponentLogDef {
        file_name: "store.log",
        targets: &["turnstile_store"],
    },
    ComponentLogDef {
        file_name: "simulation.log",
        targets: &["turnstile_cli", "turnstile"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy)]
pub enum LogRotation {
    Daily,
    Hourly,
    /// Single file, never rotated
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub file_logging: bool,
    /// Level used when `RUST_LOG` is not set
    pub level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            console_output: true,
            file_logging: false,
            level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    pub fn from_config(
        log_dir: Option<PathBuf>,
        console_output: bool,
        file_logging: bool,
        level: &str,
    ) -> Self {
        let defaults = Self::default();
        Self {
            log_dir: log_dir.unwrap_or(defaults.log_dir),
            console_output,
            file_logging,
            level: level.parse().unwrap_or(defaults.level),
            rotation: defaults.rotation,
        }
    }

    /// Non-blocking rolling writer for `file_name`; its guard joins `guards`
    fn file_writer(&self, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
        let appender = RollingFileAppender::new(self.rotation.into(), &self.log_dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        writer
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Keeps the non-blocking file writers alive; dropping it flushes buffered output.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// The console and root file honour `RUST_LOG`, falling back to the configured
/// level. Component files capture every event from their targets.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        layers.push(Box::new(fmt::layer().with_filter(config.env_filter())));
    }

    if config.file_logging {
        let root_writer = config.file_writer(ROOT_LOG_FILE, &mut guards);
        let root_layer = fmt::layer()
            .with_writer(root_writer)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(config.env_filter());
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let targets: Targets = component
                .targets
                .iter()
                .map(|target| (*target, LevelFilter::TRACE))
                .collect();
            let layer = fmt::layer()
                .with_writer(config.file_writer(component.file_name, &mut guards))
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
