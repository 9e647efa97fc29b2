//! One-shot subcommands.

use crate::auto_test::{gimatic_test, valve_test, Pacing, TestReport, VALVE_TEST_DISCOVERY_ATTEMPTS};
use crate::config::{CliCommand, GimaticCommand, TestCommand, ValveCommand};
use crate::error::CliError;
use crate::serial_console::SerialConsole;
use crate::settings::Settings;
use anyhow::{anyhow, Result};
use bento_link::{new_dispatcher, DeviceCommands, Dispatcher, Transport};
use libbento::{discover_controller_address, ControllerAddress, EndpointRegistry, RetryPolicy};
use log::*;

/// Run one subcommand to completion and return what should be printed.
pub async fn exec_command<T: Transport>(command: CliCommand, settings: &Settings, transport: T) -> Result<String> {
    if let CliCommand::Discover = command {
        let (address, attempt) = discover(settings, settings.retry_policy(1)).await?;
        debug!("Controller found on attempt {attempt}");
        return Ok(address.to_string());
    }
    let registry = EndpointRegistry::new();
    if let Some(address) = settings.controller_address.clone() {
        registry.set(address);
    } else if settings.discovery.serial_port.is_some() && !matches!(command, CliCommand::Test(TestCommand::Valves)) {
        let (address, _) = discover(settings, settings.retry_policy(1)).await?;
        registry.set(address);
    }
    let (dispatcher, event_loop) = new_dispatcher(transport, registry.clone(), settings.exchange_config());
    tokio::spawn(event_loop.run());
    let devices = DeviceCommands::new(dispatcher.clone());
    let result = run_on_devices(command, settings, &devices, &registry).await;
    shut_down(&dispatcher).await;
    result
}

async fn run_on_devices(
    command: CliCommand,
    settings: &Settings,
    devices: &DeviceCommands,
    registry: &EndpointRegistry,
) -> Result<String> {
    let output = match command {
        CliCommand::Valve(ValveCommand::Open { channel }) => {
            devices.set_valve(channel, true).await?;
            format!("Valve {channel} opened")
        }
        CliCommand::Valve(ValveCommand::Close { channel }) => {
            devices.set_valve(channel, false).await?;
            format!("Valve {channel} closed")
        }
        CliCommand::Valve(ValveCommand::State { channel }) => devices.read_valve_state(channel).await?.to_string(),
        CliCommand::Pressure => devices.read_pressure().await?.to_string(),
        CliCommand::Gimatic(GimaticCommand::Status) => devices.gimatic_status().await?.to_string(),
        CliCommand::Gimatic(cmd) => {
            let action = cmd.action().ok_or_else(|| anyhow!("No gripper action"))?;
            devices.gimatic_command(action).await?;
            format!("{action} sent")
        }
        CliCommand::Test(TestCommand::Valves) => {
            let console = console(settings).ok();
            let policy = settings.retry_policy(VALVE_TEST_DISCOVERY_ATTEMPTS);
            let report = TestReport::new("Valve test");
            let report = valve_test(devices, registry, console, policy, Pacing::default(), report).await;
            report.to_string()
        }
        CliCommand::Test(TestCommand::Gimatic) => {
            gimatic_test(devices, TestReport::new("Gripper test")).await.to_string()
        }
        CliCommand::Discover | CliCommand::Interactive => {
            return Err(anyhow!("This command is not a one-shot device command"));
        }
    };
    Ok(output)
}

pub fn console(settings: &Settings) -> Result<SerialConsole, CliError> {
    let port = settings.discovery.serial_port.clone().ok_or(CliError::NoSerialPort)?;
    Ok(SerialConsole::new(port, settings.discovery.baud_rate, settings.console_read_timeout()))
}

async fn discover(settings: &Settings, policy: RetryPolicy) -> Result<(ControllerAddress, u32)> {
    let mut console = console(settings)?;
    info!("Looking for the controller on {}", console.port_name());
    let found = tokio::task::spawn_blocking(move || discover_controller_address(&mut console, &policy)).await??;
    Ok(found)
}

async fn shut_down(dispatcher: &Dispatcher) {
    let rejected = dispatcher.stop().await;
    if rejected > 0 {
        warn!("{rejected} commands were still queued at exit");
    }
}
