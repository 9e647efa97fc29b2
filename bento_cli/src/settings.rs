//! The YAML configuration file, and how command-line options override it.

use crate::config::GlobalOptions;
use crate::error::CliError;
use bento_link::config::{DEFAULT_ACK_TIMEOUT, DEFAULT_COAP_PORT, DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_MAX_RETRANSMIT};
use bento_link::ExchangeConfig;
use libbento::{ControllerAddress, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_CONSOLE_READ_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Used until discovery finds something else.
    pub controller_address: Option<ControllerAddress>,
    pub exchange: ExchangeSettings,
    pub discovery: DiscoverySettings,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub timeout_secs: u64,
    pub port: u16,
    pub ack_timeout_ms: u64,
    pub max_retransmit: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_EXCHANGE_TIMEOUT.as_secs(),
            port: DEFAULT_COAP_PORT,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT.as_millis() as u64,
            max_retransmit: DEFAULT_MAX_RETRANSMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    /// Discovery attempts. When absent, each caller picks its own default.
    pub attempts: Option<u32>,
    pub retry_delay_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            attempts: None,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            read_timeout_ms: DEFAULT_CONSOLE_READ_TIMEOUT_MS,
        }
    }
}

impl Settings {
    pub fn try_load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, CliError> {
        load_config_file(path)
    }

    /// Load the configuration file, treating a missing file as an empty one.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, CliError> {
        match Self::try_load(path) {
            Ok(settings) => Ok(settings),
            Err(CliError::IoError(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No configuration file found. Using defaults.");
                Ok(Self::default())
            }
            Err(err) => Err(err),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        save_config_file(path, self)
    }

    /// Apply command-line overrides on top of the file settings.
    pub fn with_overrides(mut self, options: &GlobalOptions) -> Self {
        if let Some(address) = options.controller.as_ref() {
            self.controller_address = Some(address.clone());
        }
        if let Some(timeout) = options.timeout_secs {
            self.exchange.timeout_secs = timeout;
        }
        if let Some(port) = options.serial_port.as_ref() {
            self.discovery.serial_port = Some(port.clone());
        }
        if let Some(baud_rate) = options.baud_rate {
            self.discovery.baud_rate = baud_rate;
        }
        self
    }

    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig::default()
            .with_timeout(Duration::from_secs(self.exchange.timeout_secs))
            .with_port(self.exchange.port)
            .with_ack_timeout(Duration::from_millis(self.exchange.ack_timeout_ms))
            .with_max_retransmit(self.exchange.max_retransmit)
    }

    /// The discovery retry policy, using `default_attempts` unless the file names a number.
    pub fn retry_policy(&self, default_attempts: u32) -> RetryPolicy {
        let attempts = self.discovery.attempts.unwrap_or(default_attempts);
        RetryPolicy::new(attempts, Duration::from_millis(self.discovery.retry_delay_ms))
    }

    pub fn console_read_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.read_timeout_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    let mut home = std::env::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.push(".bento");
    home.push("config.yml");
    home
}

pub fn load_config_file<P: AsRef<Path>>(path: Option<P>) -> Result<Settings, CliError> {
    let path = path.map(|p| p.as_ref().to_path_buf()).unwrap_or_else(default_config_path);
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let settings = serde_yml::from_reader(reader)?;
    Ok(settings)
}

pub fn save_config_file<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<(), CliError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    serde_yml::to_writer(writer, settings)?;
    Ok(())
}
