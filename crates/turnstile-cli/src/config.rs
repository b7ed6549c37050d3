//! Configuration management for the turnstile binary
//!
//! Sources, lowest precedence first: the YAML config file, `TURNSTILE_`
//! environment variables (`__` separates nested keys), then command-line
//! flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use turnstile_lock::LockerConfig;

use crate::logging::LoggingConfig;
use crate::simulation::SimulationConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

const DEFAULT_RESOURCE: &str = "accounts:42";
const DEFAULT_WORKERS: i64 = 8;
const DEFAULT_ROUNDS: i64 = 25;
const DEFAULT_HOLD_MS: i64 = 5;
const DEFAULT_TIMEOUT_MS: i64 = 5000;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(
    name = "turnstile",
    version,
    about = "Run independent lockers against one coordination store and check mutual exclusion"
)]
pub struct Cli {
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    #[arg(short = 'r', long = "resource")]
    pub resource: Option<String>,
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<u32>,
    #[arg(short = 'n', long = "rounds")]
    pub rounds: Option<u32>,
    #[arg(long = "hold-ms")]
    pub hold_ms: Option<u64>,
    /// Acquire deadline per round; 0 waits without a deadline
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
    #[arg(long = "max-lease-ms")]
    pub max_lease_ms: Option<u64>,
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix("turnstile")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.resource {
            builder = builder.set_override("simulation.resource", v)?;
        }
        if let Some(v) = args.workers {
            builder = builder.set_override("simulation.workers", i64::from(v))?;
        }
        if let Some(v) = args.rounds {
            builder = builder.set_override("simulation.rounds", i64::from(v))?;
        }
        if let Some(v) = args.hold_ms {
            builder = builder.set_override("simulation.hold_ms", v as i64)?;
        }
        if let Some(v) = args.timeout_ms {
            builder = builder.set_override("simulation.timeout_ms", v as i64)?;
        }
        if let Some(v) = args.max_lease_ms {
            builder = builder.set_override("lock.max_lease_ms", v as i64)?;
        }
        if let Some(v) = args.log_level {
            builder = builder.set_override("log.level", v)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Locker settings from the `lock` table; defaults when the table is absent
    pub fn locker_config(&self) -> Result<LockerConfig, ConfigError> {
        match self.config.get::<LockerConfig>("lock") {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(LockerConfig::default()),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Simulation Configuration
    // ========================================================================

    pub fn simulation_resource(&self) -> String {
        self.config
            .get_string("simulation.resource")
            .unwrap_or(DEFAULT_RESOURCE.to_string())
    }

    pub fn simulation_workers(&self) -> usize {
        self.config
            .get_int("simulation.workers")
            .unwrap_or(DEFAULT_WORKERS)
            .max(1) as usize
    }

    pub fn simulation_rounds(&self) -> usize {
        self.config
            .get_int("simulation.rounds")
            .unwrap_or(DEFAULT_ROUNDS)
            .max(0) as usize
    }

    pub fn simulation_hold(&self) -> Duration {
        let ms = self
            .config
            .get_int("simulation.hold_ms")
            .unwrap_or(DEFAULT_HOLD_MS)
            .max(0);
        Duration::from_millis(ms as u64)
    }

    pub fn simulation_timeout(&self) -> Option<Duration> {
        let ms = self
            .config
            .get_int("simulation.timeout_ms")
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        if ms > 0 {
            Some(Duration::from_millis(ms as u64))
        } else {
            None
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            resource: self.simulation_resource(),
            workers: self.simulation_workers(),
            rounds: self.simulation_rounds(),
            hold: self.simulation_hold(),
            timeout: self.simulation_timeout(),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn log_level(&self) -> String {
        self.config
            .get_string("log.level")
            .unwrap_or("info".to_string())
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.config.get_string("log.dir").ok().map(PathBuf::from)
    }

    pub fn log_console(&self) -> bool {
        self.config.get_bool("log.console").unwrap_or(true)
    }

    pub fn log_file(&self) -> bool {
        self.config.get_bool("log.file").unwrap_or(false)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.log_dir(),
            self.log_console(),
            self.log_file(),
            &self.log_level(),
        )
    }
}
