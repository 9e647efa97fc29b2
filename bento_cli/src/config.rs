#![doc = include_str!("../README.md")]

use bento_link::GimaticAction;
use clap::{Parser, Subcommand};
use libbento::ControllerAddress;
use std::path::PathBuf;

/// Bento controller command line.
///
/// Send valve, pressure and gripper commands to a Bento controller and run automated test sequences.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Path to the configuration file. The default is `$HOME/.bento/config.yml`.
    #[arg(long = "config-file", short = 'c')]
    pub config_file: Option<PathBuf>,
    /// Controller address (`host` or `host:port`). Overrides the configuration file.
    #[arg(long = "controller", short = 'a', env = "BENTO_CONTROLLER")]
    pub controller: Option<ControllerAddress>,
    /// Time allowed for one exchange with the controller, in seconds.
    #[arg(long = "timeout", env = "BENTO_TIMEOUT")]
    pub timeout_secs: Option<u64>,
    /// Serial port of the controller's diagnostic console, used for discovery.
    #[arg(long = "serial-port")]
    pub serial_port: Option<String>,
    /// Baud rate of the diagnostic console. The default is 115200.
    #[arg(long = "baud-rate")]
    pub baud_rate: Option<u32>,
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Find the controller address through the diagnostic console.
    #[command(name = "discover", alias = "ip")]
    Discover,
    /// Open, close or query a valve.
    #[command(subcommand, name = "valve")]
    Valve(ValveCommand),
    /// Read the pneumatic module's pressure.
    #[command(name = "pressure")]
    Pressure,
    /// Drive the Gimatic gripper.
    #[command(subcommand, name = "gimatic", alias = "gripper")]
    Gimatic(GimaticCommand),
    /// Run an automated test sequence.
    #[command(subcommand, name = "test")]
    Test(TestCommand),
    /// Menu-driven session. This is the default.
    #[command(name = "interactive", alias = "i")]
    Interactive,
}

#[derive(Debug, Subcommand)]
pub enum ValveCommand {
    /// Open a valve.
    Open {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=6))]
        channel: u8,
    },
    /// Close a valve.
    Close {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=6))]
        channel: u8,
    },
    /// Read the state of a valve.
    #[command(name = "state", alias = "read")]
    State {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=6))]
        channel: u8,
    },
}

#[derive(Debug, Subcommand)]
pub enum GimaticCommand {
    /// Open the gripper.
    Open,
    /// Close the gripper.
    Close,
    /// Read the gripper status.
    Status,
}

impl GimaticCommand {
    /// The action to send, or `None` for a status query.
    pub fn action(&self) -> Option<GimaticAction> {
        match self {
            GimaticCommand::Open => Some(GimaticAction::Open),
            GimaticCommand::Close => Some(GimaticAction::Close),
            GimaticCommand::Status => None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum TestCommand {
    /// Discover the controller, then cycle every valve and record pressures and states.
    Valves,
    /// Open, check, close and check the gripper.
    Gimatic,
}

pub struct GlobalOptions {
    pub config_file: Option<PathBuf>,
    pub controller: Option<ControllerAddress>,
    pub timeout_secs: Option<u64>,
    pub serial_port: Option<String>,
    pub baud_rate: Option<u32>,
}

impl Config {
    pub fn to_parts(self) -> (GlobalOptions, CliCommand) {
        let global = GlobalOptions {
            config_file: self.config_file,
            controller: self.controller,
            timeout_secs: self.timeout_secs,
            serial_port: self.serial_port,
            baud_rate: self.baud_rate,
        };
        (global, self.command.unwrap_or(CliCommand::Interactive))
    }
}
