//! Automated test sequences.
//!
//! A sequence never stops at the first failure. Every step is recorded in a [`TestReport`], failures included, and
//! the sequence carries on with the next valve or step.

use bento_link::{DeviceCommands, DispatchError, GimaticAction};
use bento_link::devices::VALVE_CHANNELS;
use chrono::{DateTime, Local};
use libbento::{discover_controller_address, DiagnosticConsole, EndpointRegistry, RetryPolicy};
use log::*;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Discovery attempts for the valve test unless the configuration says otherwise.
pub const VALVE_TEST_DISCOVERY_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLine {
    pub text: String,
    pub ok: bool,
}

type Observer = Box<dyn FnMut(&ReportLine) + Send>;

pub struct TestReport {
    title: String,
    started: DateTime<Local>,
    lines: Vec<ReportLine>,
    observer: Option<Observer>,
}

impl TestReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), started: Local::now(), lines: Vec::new(), observer: None }
    }

    /// Call `observer` with every line as it is recorded.
    pub fn with_observer<F: FnMut(&ReportLine) + Send + 'static>(mut self, observer: F) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn record(&mut self, text: impl Into<String>) {
        self.push(ReportLine { text: text.into(), ok: true });
    }

    pub fn fail(&mut self, text: impl Into<String>) {
        self.push(ReportLine { text: text.into(), ok: false });
    }

    fn push(&mut self, line: ReportLine) {
        if line.ok {
            info!("{}", line.text);
        } else {
            warn!("{}", line.text);
        }
        if let Some(observer) = self.observer.as_mut() {
            observer(&line);
        }
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    pub fn failures(&self) -> usize {
        self.lines.iter().filter(|l| !l.ok).count()
    }

    pub fn is_success(&self) -> bool {
        !self.lines.is_empty() && self.failures() == 0
    }
}

impl Display for TestReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({})", self.title, self.started.format("%Y-%m-%d %H:%M:%S"))?;
        for line in &self.lines {
            writeln!(f, "{}", line.text)?;
        }
        match self.failures() {
            0 => write!(f, "All {} steps passed", self.lines.len()),
            n => write!(f, "{n} of {} steps failed", self.lines.len()),
        }
    }
}

/// Pauses between valve operations.
#[derive(Clone, Copy, Debug)]
pub struct Pacing {
    /// How long a valve stays open before the pressure is read again.
    pub open_dwell: Duration,
    /// Pause after closing a valve, or after a failure, before the next valve.
    pub settle: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self { open_dwell: Duration::from_secs(1), settle: Duration::from_millis(500) }
    }
}

impl Pacing {
    pub fn immediate() -> Self {
        Self { open_dwell: Duration::ZERO, settle: Duration::ZERO }
    }
}

/// Find the controller and store its address in `registry`. Returns false if there is no address to test against.
///
/// Discovery talks to a serial port and sleeps between attempts, so it runs on the blocking pool.
pub async fn locate_controller<C>(
    registry: &EndpointRegistry,
    console: Option<C>,
    policy: RetryPolicy,
    report: &mut TestReport,
) -> bool
where
    C: DiagnosticConsole + Send + 'static,
{
    let Some(mut console) = console else {
        return match registry.get() {
            Some(address) => {
                report.record(format!("IP Fetch - No console configured. Using {address}"));
                true
            }
            None => {
                report.fail("IP Fetch - No console configured and no controller address known");
                false
            }
        };
    };
    let attempts = policy.attempts.max(1);
    let result = tokio::task::spawn_blocking(move || discover_controller_address(&mut console, &policy)).await;
    match result {
        Ok(Ok((address, attempt))) => {
            report.record(format!("IP Fetch - Success on attempt {attempt}: {address}"));
            registry.set(address);
            true
        }
        Ok(Err(err)) => {
            debug!("Discovery failed. {err}");
            report.fail(format!("IP Fetch - Failed after {attempts} attempts"));
            false
        }
        Err(err) => {
            error!("The discovery task did not finish. {err}");
            report.fail("IP Fetch - Discovery was aborted");
            false
        }
    }
}

/// Discover the controller, then open and close every valve in turn, recording pressures and states.
pub async fn valve_test<C>(
    devices: &DeviceCommands,
    registry: &EndpointRegistry,
    console: Option<C>,
    policy: RetryPolicy,
    pacing: Pacing,
    mut report: TestReport,
) -> TestReport
where
    C: DiagnosticConsole + Send + 'static,
{
    if !locate_controller(registry, console, policy, &mut report).await {
        return report;
    }
    for channel in VALVE_CHANNELS {
        if let Err(err) = cycle_valve(devices, channel, pacing, &mut report).await {
            report.fail(format!("Valve {channel} - Error: {err}"));
            tokio::time::sleep(pacing.settle).await;
        }
    }
    report
}

async fn cycle_valve(
    devices: &DeviceCommands,
    channel: u8,
    pacing: Pacing,
    report: &mut TestReport,
) -> Result<(), DispatchError> {
    let pre_pressure = devices.read_pressure().await?;
    report.record(format!("Valve {channel} - Pre-open pressure: {pre_pressure}"));
    devices.set_valve(channel, true).await?;
    tokio::time::sleep(pacing.open_dwell).await;
    let post_pressure = devices.read_pressure().await?;
    report.record(format!("Valve {channel} - Post-open pressure: {post_pressure}"));
    let state = devices.read_valve_state(channel).await?;
    report.record(format!("Valve {channel} - State after open: {state}"));
    devices.set_valve(channel, false).await?;
    report.record(format!("Valve {channel} - Closed"));
    tokio::time::sleep(pacing.settle).await;
    Ok(())
}

/// Open the gripper, check it, close it and check it again.
pub async fn gimatic_test(devices: &DeviceCommands, mut report: TestReport) -> TestReport {
    for action in [GimaticAction::Open, GimaticAction::Close] {
        let name = match action {
            GimaticAction::Open => "open",
            GimaticAction::Close => "close",
        };
        match devices.gimatic_command(action).await {
            Ok(()) => report.record(format!("Gimatic - {action} sent")),
            Err(err) => report.fail(format!("Gimatic - {action} failed: {err}")),
        }
        match devices.gimatic_status().await {
            Ok(status) => report.record(format!("Gimatic - Status after {name}: {status}")),
            Err(err) => report.fail(format!("Gimatic - Status after {name} failed: {err}")),
        }
    }
    report
}

#[cfg(test)]
mod test {
    use super::*;
    use bento_link::new_dispatcher;
    use bento_link::transport::mock::{ScriptedReply, ScriptedTransport};
    use bento_link::TransportError;
    use libbento::{ControllerAddress, DiscoveryError};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct CannedConsole(Vec<Result<Vec<String>, DiscoveryError>>);

    impl DiagnosticConsole for CannedConsole {
        fn query(&mut self, _command: &str) -> Result<Vec<String>, DiscoveryError> {
            if self.0.is_empty() {
                return Ok(Vec::new());
            }
            self.0.remove(0)
        }
    }

    fn console_with_address() -> CannedConsole {
        CannedConsole(vec![
            Err(DiscoveryError::Console("port busy".into())),
            Ok(vec!["DHCP preferred 86400 192.168.7.7/255.255.255.0".to_string()]),
        ])
    }

    fn devices(transport: &ScriptedTransport, registry: &EndpointRegistry) -> DeviceCommands {
        let (dispatcher, event_loop) = new_dispatcher(transport.clone(), registry.clone(), Default::default());
        tokio::spawn(event_loop.run());
        DeviceCommands::new(dispatcher)
    }

    fn quick_retries() -> RetryPolicy {
        RetryPolicy::new(VALVE_TEST_DISCOVERY_ATTEMPTS, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn valve_test_discovers_then_cycles_every_valve() {
        let transport = ScriptedTransport::new();
        transport.set_default(ScriptedReply::json(json!({"ret": "OK", "data": 1})));
        let registry = EndpointRegistry::new();
        let devices = devices(&transport, &registry);
        let report = TestReport::new("Valve test");
        let console = Some(console_with_address());
        let report = valve_test(&devices, &registry, console, quick_retries(), Pacing::immediate(), report).await;

        assert!(report.is_success(), "{report}");
        assert_eq!(report.lines()[0].text, "IP Fetch - Success on attempt 2: 192.168.7.7");
        // Discovery plus four lines for each of the six valves
        assert_eq!(report.lines().len(), 1 + 6 * 4);
        assert_eq!(registry.get(), Some(ControllerAddress::new("192.168.7.7")));

        let sent = transport.exchanges();
        assert_eq!(sent.len(), 6 * 5);
        let first_cycle = sent[..5].iter().map(|e| e.payload_json()["val"]["cmd"].clone()).collect::<Vec<_>>();
        assert_eq!(first_cycle, vec!["read_pressure", "set_valve", "read_pressure", "p_read", "set_valve"]);
        assert_eq!(sent[4].payload_json()["val"]["data"], json!({"valve_n": 1, "open": false}));
        assert_eq!(sent[29].payload_json()["val"]["data"], json!({"valve_n": 6, "open": false}));
    }

    #[tokio::test]
    async fn a_failing_valve_does_not_stop_the_sequence() {
        let transport = ScriptedTransport::new();
        transport.set_default(ScriptedReply::json(json!({"ret": "OK", "data": 0})));
        // Valve 1's first pressure read times out
        transport.push(ScriptedReply::error(TransportError::Timeout(Duration::from_secs(60))));
        let registry = EndpointRegistry::with_address(ControllerAddress::new("10.0.0.8"));
        let devices = devices(&transport, &registry);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = Arc::clone(&seen);
        let report = TestReport::new("Valve test").with_observer(move |line| observed.lock().unwrap().push(line.ok));
        let no_console: Option<CannedConsole> = None;
        let report = valve_test(&devices, &registry, no_console, quick_retries(), Pacing::immediate(), report).await;

        assert_eq!(report.failures(), 1);
        assert!(report.lines()[1].text.starts_with("Valve 1 - Error: The controller did not answer"));
        assert_eq!(report.lines().last().unwrap().text, "Valve 6 - Closed");
        assert_eq!(seen.lock().unwrap().len(), report.lines().len());
        assert_eq!(transport.exchanges().len(), 1 + 5 * 5);
    }

    #[tokio::test]
    async fn valve_test_gives_up_when_discovery_fails() {
        let transport = ScriptedTransport::new();
        let registry = EndpointRegistry::new();
        let devices = devices(&transport, &registry);
        let console = CannedConsole(vec![Ok(vec!["no address here".to_string()])]);
        let report =
            valve_test(&devices, &registry, Some(console), quick_retries(), Pacing::immediate(), TestReport::new("t"))
                .await;
        assert_eq!(report.lines().len(), 1);
        assert_eq!(report.lines()[0].text, "IP Fetch - Failed after 3 attempts");
        assert!(!report.is_success());
        assert!(transport.exchanges().is_empty());
    }

    #[tokio::test]
    async fn gimatic_test_records_each_step() {
        let transport = ScriptedTransport::new();
        transport
            .push(ScriptedReply::json(json!({"ret": "OK"})))
            .push(ScriptedReply::json(json!({"ret": "OK", "data": "opened"})))
            .push(ScriptedReply::error(TransportError::NetworkError("unreachable".into())))
            .push(ScriptedReply::json(json!({"ret": "OK"})));
        let registry = EndpointRegistry::with_address(ControllerAddress::new("10.0.0.8"));
        let devices = devices(&transport, &registry);
        let report = gimatic_test(&devices, TestReport::new("Gimatic test")).await;
        let texts = report.lines().iter().map(|l| l.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts[0], "Gimatic - GIMATIC_CMD_OPEN sent");
        assert_eq!(texts[1], "Gimatic - Status after open: \"opened\"");
        assert!(texts[2].starts_with("Gimatic - GIMATIC_CMD_CLOSE failed: The controller is unreachable"));
        assert!(texts[3].starts_with("Gimatic - Status after close failed: The controller reply to"));
        assert_eq!(report.failures(), 2);
        assert!(report.to_string().ends_with("2 of 4 steps failed"));
    }
}
