use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid configuration file: {0}")]
    InvalidConfig(#[from] serde_yml::Error),
    #[error("No serial port configured. Use --serial-port or set `discovery.serial_port` in the configuration file.")]
    NoSerialPort,
}
