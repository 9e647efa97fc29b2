//! Finding the controller's network address.
//!
//! The controller prints its interface table on a local diagnostic console in response to `net ipv4`. The address is
//! taken from the first line mentioning both `DHCP` and `preferred`, e.g.
//!
//! ```text
//!  DHCP    preferred       1       172.16.50.2/255.255.255.0
//! ```
//!
//! Whether a failed lookup is retried is up to the caller, through [`RetryPolicy`].

use crate::endpoint::ControllerAddress;
use crate::error::DiscoveryError;
use log::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Diagnostic command that lists the controller's IPv4 configuration.
pub const NET_IPV4_COMMAND: &str = "net ipv4";

/// A line-oriented console that accepts a command and returns the lines printed in reply.
pub trait DiagnosticConsole {
    fn query(&mut self, command: &str) -> Result<Vec<String>, DiscoveryError>;
}

/// Extract the controller address from the output of [`NET_IPV4_COMMAND`].
///
/// The address is the fourth whitespace-separated token of the matching line, with any `/mask` suffix removed.
pub fn parse_controller_address<S: AsRef<str>>(lines: &[S]) -> Option<ControllerAddress> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| line.contains("DHCP") && line.contains("preferred"))
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter_map(|token| token.split('/').next())
        .find(|address| !address.is_empty())
        .map(ControllerAddress::new)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self { attempts: 1, ..Self::default() }
    }

    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, retry_delay_ms: delay.as_millis() as u64 }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 1, retry_delay_ms: 500 }
    }
}

/// Query `console` for the controller address, retrying according to `policy`.
///
/// Console failures count as failed attempts; they are logged and do not abort the remaining attempts. Returns the
/// address together with the (1-based) attempt that produced it.
pub fn discover_controller_address<C: DiagnosticConsole + ?Sized>(
    console: &mut C,
    policy: &RetryPolicy,
) -> Result<(ControllerAddress, u32), DiscoveryError> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match console.query(NET_IPV4_COMMAND) {
            Ok(lines) => {
                if let Some(address) = parse_controller_address(&lines) {
                    info!("🔎 Controller address {address} found on attempt {attempt}");
                    return Ok((address, attempt));
                }
                debug!("Attempt {attempt}: no DHCP preferred address in {} console lines", lines.len());
            }
            Err(err) => warn!("Attempt {attempt}: diagnostic console query failed. {err}"),
        }
        if attempt < attempts {
            std::thread::sleep(policy.delay());
        }
    }
    Err(DiscoveryError::NotFound { attempts })
}

#[cfg(test)]
mod test {
    use super::*;

    struct CannedConsole {
        replies: Vec<Result<Vec<String>, DiscoveryError>>,
        commands: Vec<String>,
    }

    impl CannedConsole {
        fn new(replies: Vec<Result<Vec<String>, DiscoveryError>>) -> Self {
            Self { replies, commands: Vec::new() }
        }
    }

    impl DiagnosticConsole for CannedConsole {
        fn query(&mut self, command: &str) -> Result<Vec<String>, DiscoveryError> {
            self.commands.push(command.to_string());
            if self.replies.is_empty() {
                return Ok(Vec::new());
            }
            self.replies.remove(0)
        }
    }

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_dhcp_preferred_address() {
        let output = ["Some text", " DHCP    preferred       1       172.16.50.2/255.255.255.0", "Other line"];
        assert_eq!(parse_controller_address(&output), Some(ControllerAddress::new("172.16.50.2")));
    }

    #[test]
    fn absent_without_a_matching_line() {
        let output = ["Some text", " MANUAL  preferred  1  10.0.0.5/255.0.0.0", " DHCP  tentative  1  10.0.0.6/8"];
        assert_eq!(parse_controller_address(&output), None);
        assert_eq!(parse_controller_address::<&str>(&[]), None);
    }

    #[test]
    fn short_matching_lines_are_skipped() {
        let output = ["DHCP preferred", "DHCP preferred 1 192.168.0.7"];
        assert_eq!(parse_controller_address(&output), Some(ControllerAddress::new("192.168.0.7")));
    }

    #[test]
    fn retries_until_the_address_appears() {
        let mut console = CannedConsole::new(vec![
            Err(DiscoveryError::Console("port busy".into())),
            Ok(lines(&["booting..."])),
            Ok(lines(&[" DHCP    preferred       1       172.16.50.74/255.255.255.0"])),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let (address, attempt) = discover_controller_address(&mut console, &policy).unwrap();
        assert_eq!(address.as_str(), "172.16.50.74");
        assert_eq!(attempt, 3);
        assert_eq!(console.commands, vec!["net ipv4"; 3]);
    }

    #[test]
    fn gives_up_after_the_configured_attempts() {
        env_logger::try_init().ok();
        let mut console = CannedConsole::new(vec![]);
        let err = discover_controller_address(&mut console, &RetryPolicy::new(2, Duration::ZERO)).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound { attempts: 2 }));
        assert_eq!(console.commands.len(), 2);
        // A single attempt is the default
        let mut console = CannedConsole::new(vec![]);
        assert!(discover_controller_address(&mut console, &RetryPolicy::default()).is_err());
        assert_eq!(console.commands.len(), 1);
    }
}
