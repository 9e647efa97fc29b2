//! The menu-driven session.
//!
//! The menu thread owns a [`StatusBoard`]. Commands run on the background executor and report back through a
//! [`CallerContext`], so the board only ever changes on the menu thread, between prompts.

pub mod formatting;
pub mod menus;

use crate::auto_test::{gimatic_test, valve_test, Pacing, TestReport, VALVE_TEST_DISCOVERY_ATTEMPTS};
use crate::config::GlobalOptions;
use crate::serial_console::SerialConsole;
use crate::settings::{default_config_path, Settings};
use anyhow::{anyhow, Result};
use bento_link::devices::VALVE_CHANNELS;
use bento_link::{
    caller_context, BackgroundExecutor, CallerContext, CallerLoop, CoapTransport, DeviceCommands, DispatchError,
    GimaticAction, SubmissionHandle,
};
use dialoguer::{console::Style, theme::ColorfulTheme, FuzzySelect, Input};
use formatting::{format_data, operator_message, status_indicator, Status};
use libbento::{discover_controller_address, ControllerAddress, EndpointRegistry};
use log::*;
use menus::*;
use serde_json::Value;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

/// Caller-owned state. Only touched on the menu thread.
#[derive(Debug, Default)]
pub struct StatusBoard {
    pub status: Status,
    pub message: String,
    /// Output waiting to be printed before the next prompt.
    pub pending_output: Vec<String>,
}

impl StatusBoard {
    pub fn busy(&mut self, message: impl Into<String>) {
        self.status = Status::Busy;
        self.message = message.into();
    }

    pub fn succeeded(&mut self, message: impl Into<String>) {
        self.status = Status::Ok;
        self.message = message.into();
    }

    pub fn failed(&mut self, message: impl Into<String>) {
        self.status = Status::Failed;
        self.message = message.into();
    }
}

pub struct InteractiveApp {
    settings: Settings,
    config_path: PathBuf,
    registry: EndpointRegistry,
    executor: BackgroundExecutor,
    devices: DeviceCommands,
    ctx: CallerContext<StatusBoard>,
    caller: CallerLoop<StatusBoard>,
    board: StatusBoard,
    current_menu: &'static Menu,
    breadcrumbs: Vec<&'static Menu>,
}

impl InteractiveApp {
    pub fn new(options: GlobalOptions) -> Result<Self> {
        let config_path = options.config_file.clone().unwrap_or_else(default_config_path);
        let settings = Settings::load_or_default(Some(&config_path))?.with_overrides(&options);
        let registry = EndpointRegistry::new();
        if let Some(address) = settings.controller_address.clone() {
            registry.set(address);
        }
        let exchange = settings.exchange_config();
        let executor = BackgroundExecutor::start(CoapTransport::new(&exchange), registry.clone(), exchange)?;
        let devices = DeviceCommands::new(executor.dispatcher());
        let (ctx, caller) = caller_context();
        Ok(Self {
            settings,
            config_path,
            registry,
            executor,
            devices,
            ctx,
            caller,
            board: StatusBoard::default(),
            current_menu: top_menu(),
            breadcrumbs: vec![top_menu()],
        })
    }

    /// Run the menu loop until the operator exits, then stop the executor.
    pub fn run(mut self) -> Result<()> {
        println!("Bento controller console");
        loop {
            self.caller.run_pending(&mut self.board);
            self.flush_output();
            let theme = ColorfulTheme { prompt_style: Style::new().magenta().bold(), ..ColorfulTheme::default() };
            let i = FuzzySelect::with_theme(&theme)
                .with_prompt(self.menu_prompt())
                .items(self.current_menu.1)
                .default(0)
                .interact()?;
            match self.current_menu.1[i] {
                NAV_BACK => self.pop_menu(),
                NAV_TO_CONNECTION_MENU => self.select_menu(connection_menu()),
                NAV_TO_VALVE_MENU => self.select_menu(valve_menu()),
                NAV_TO_GRIPPER_MENU => self.select_menu(gripper_menu()),
                NAV_TO_TEST_MENU => self.select_menu(test_menu()),
                EXIT => break,
                FETCH_ADDRESS => self.fetch_address(),
                ENTER_ADDRESS => handle_response(self.enter_address()),
                SAVE_ADDRESS => handle_response(self.save_address()),
                OPEN_VALVE => self.set_valve(true)?,
                CLOSE_VALVE => self.set_valve(false)?,
                READ_VALVE_STATE => self.read_valve_state()?,
                READ_PRESSURE => self.read_pressure(),
                GIMATIC_OPEN => self.gimatic_command(GimaticAction::Open),
                GIMATIC_CLOSE => self.gimatic_command(GimaticAction::Close),
                GIMATIC_STATUS => self.gimatic_status(),
                RUN_VALVE_TEST => self.run_valve_test(),
                RUN_GIMATIC_TEST => self.run_gimatic_test(),
                REFRESH_STATUS => {
                    self.caller.run_for(&mut self.board, Duration::from_millis(250));
                }
                _ => continue,
            }
        }
        let rejected = self.executor.stop();
        if rejected > 0 {
            println!("{rejected} queued commands were cancelled.");
        }
        Ok(())
    }

    fn menu_prompt(&self) -> String {
        let breadcrumbs = self.breadcrumbs.iter().map(|m| m.0).collect::<Vec<&str>>().join(" » ");
        let controller = match self.registry.get() {
            Some(address) => format!("Controller {address}"),
            None => "No controller address".to_string(),
        };
        let status = status_indicator(self.board.status);
        format!("\n{breadcrumbs:-30}{controller:40}{status} {}\n", self.board.message)
    }

    fn flush_output(&mut self) {
        for text in self.board.pending_output.drain(..) {
            println!("{text}");
        }
    }

    fn pop_menu(&mut self) {
        if self.breadcrumbs.len() > 1 {
            self.breadcrumbs.pop();
            self.current_menu = self.breadcrumbs.last().copied().unwrap_or(top_menu());
        }
    }

    fn select_menu(&mut self, menu: &'static Menu) {
        self.breadcrumbs.push(menu);
        self.current_menu = menu;
    }

    fn select_channel(&self) -> Result<u8> {
        let channels = VALVE_CHANNELS.map(|c| format!("Valve {c}")).collect::<Vec<_>>();
        let theme = ColorfulTheme { prompt_style: Style::new().magenta().bold(), ..ColorfulTheme::default() };
        let i = FuzzySelect::with_theme(&theme).with_prompt("Select valve").items(&channels).default(0).interact()?;
        Ok(*VALVE_CHANNELS.start() + i as u8)
    }

    /// Run discovery on the executor's blocking pool and post the outcome back to the board.
    fn fetch_address(&mut self) {
        let Some(port) = self.settings.discovery.serial_port.clone() else {
            self.board.failed("No serial port configured. Use --serial-port or the config file.");
            return;
        };
        let discovery = &self.settings.discovery;
        let mut console = SerialConsole::new(port, discovery.baud_rate, self.settings.console_read_timeout());
        let policy = self.settings.retry_policy(1);
        let registry = self.registry.clone();
        let ctx = self.ctx.clone();
        self.board.busy(format!("Querying {}", console.port_name()));
        std::mem::drop(self.executor.spawn(async move {
            let found = tokio::task::spawn_blocking(move || discover_controller_address(&mut console, &policy)).await;
            ctx.run_later(move |board: &mut StatusBoard| match found {
                Ok(Ok((address, attempt))) => {
                    registry.set(address.clone());
                    board.succeeded(format!("Controller found at {address} (attempt {attempt})"));
                }
                Ok(Err(err)) => board.failed(format!("Discovery failed. {err}")),
                Err(err) => board.failed(format!("Discovery was aborted. {err}")),
            });
        }));
    }

    fn enter_address(&mut self) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt("Controller address");
        if let Some(current) = self.registry.get() {
            input = input.with_initial_text(current.to_string());
        }
        let address = input.interact_text()?.parse::<ControllerAddress>()?;
        if address.as_str().is_empty() {
            return Err(anyhow!("The controller address cannot be empty"));
        }
        self.registry.set(address.clone());
        self.board.succeeded(format!("Controller address set to {address}"));
        Ok(format!("Commands will go to {address}"))
    }

    fn save_address(&mut self) -> Result<String> {
        let address = self.registry.get().ok_or_else(|| anyhow!("There is no controller address to save"))?;
        let mut file_settings = Settings::load_or_default(Some(&self.config_path))?;
        file_settings.controller_address = Some(address.clone());
        file_settings.save(&self.config_path)?;
        self.settings.controller_address = Some(address.clone());
        Ok(format!("Saved {address} to {}", self.config_path.display()))
    }

    fn set_valve(&mut self, open: bool) -> Result<()> {
        let channel = self.select_channel()?;
        let verb = if open { "open" } else { "close" };
        self.board.busy(format!("Sending {verb} to valve {channel}"));
        let handle = self.devices.set_valve(channel, open);
        report(&self.ctx, handle, move |_| format!("Valve {channel} {verb} sent"));
        Ok(())
    }

    fn read_valve_state(&mut self) -> Result<()> {
        let channel = self.select_channel()?;
        self.board.busy(format!("Reading valve {channel}"));
        let handle = self.devices.read_valve_state(channel);
        report(&self.ctx, handle, move |data| format!("Valve {channel} state: {}", format_data(&data)));
        Ok(())
    }

    fn read_pressure(&mut self) {
        self.board.busy("Reading pressure");
        let handle = self.devices.read_pressure();
        report(&self.ctx, handle, |data| format!("Pressure: {}", format_data(&data)));
    }

    fn gimatic_command(&mut self, action: GimaticAction) {
        self.board.busy(format!("Sending {action}"));
        report(&self.ctx, self.devices.gimatic_command(action), move |_| format!("{action} sent"));
    }

    fn gimatic_status(&mut self) {
        self.board.busy("Reading gripper status");
        report(&self.ctx, self.devices.gimatic_status(), |data: Value| format!("Gripper: {}", format_data(&data)));
    }

    fn run_valve_test(&mut self) {
        let console = self.settings.discovery.serial_port.clone().map(|port| {
            SerialConsole::new(port, self.settings.discovery.baud_rate, self.settings.console_read_timeout())
        });
        let policy = self.settings.retry_policy(VALVE_TEST_DISCOVERY_ATTEMPTS);
        let devices = self.devices.clone();
        let registry = self.registry.clone();
        let report = self.observed_report("Valve test");
        let ctx = self.ctx.clone();
        self.board.busy("Valve test running");
        std::mem::drop(self.executor.spawn(async move {
            let report = valve_test(&devices, &registry, console, policy, Pacing::default(), report).await;
            post_report(&ctx, report);
        }));
    }

    fn run_gimatic_test(&mut self) {
        let devices = self.devices.clone();
        let report = self.observed_report("Gripper test");
        let ctx = self.ctx.clone();
        self.board.busy("Gripper test running");
        std::mem::drop(self.executor.spawn(async move {
            let report = gimatic_test(&devices, report).await;
            post_report(&ctx, report);
        }));
    }

    /// A report that mirrors each line onto the status board as it is recorded.
    fn observed_report(&self, title: &str) -> TestReport {
        let ctx = self.ctx.clone();
        TestReport::new(title).with_observer(move |line| {
            let line = line.clone();
            ctx.run_later(move |board: &mut StatusBoard| {
                if line.ok {
                    board.busy(line.text);
                } else {
                    board.failed(line.text);
                }
            });
        })
    }
}

/// Post the outcome of `handle` to the board: `describe` on success, the operator message on failure.
fn report<T, F>(ctx: &CallerContext<StatusBoard>, handle: SubmissionHandle<T>, describe: F)
where
    T: Send + 'static,
    F: FnOnce(T) -> String + Send + 'static,
{
    handle.react(
        ctx,
        move |board, value| {
            let message = describe(value);
            board.pending_output.push(message.clone());
            board.succeeded(message);
        },
        |board, err: DispatchError| {
            let message = operator_message(&err);
            board.pending_output.push(format!("Error. {message}"));
            board.failed(message);
        },
    );
}

fn post_report(ctx: &CallerContext<StatusBoard>, report: TestReport) {
    let passed = report.is_success();
    let text = report.to_string();
    if !ctx.run_later(move |board: &mut StatusBoard| {
        if passed {
            board.succeeded("Test complete");
        } else {
            board.failed("Test complete with failures");
        }
        board.pending_output.push(text);
    }) {
        warn!("The menu closed before the test finished. Report:\n{report}");
    }
}

fn handle_response<T: Display>(res: Result<T>) {
    match res {
        Ok(res) => println!("Ok.\n{res}\n"),
        Err(e) => println!("Error.\n{e}"),
    }
}
