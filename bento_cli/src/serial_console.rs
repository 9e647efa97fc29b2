//! The controller's USB diagnostic console.
//!
//! The console answers a text command with a block of lines terminated by a blank line. The port is opened for each
//! query and closed again straight afterwards, so the console stays usable from other tools.

use libbento::{DiagnosticConsole, DiscoveryError};
use log::*;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

pub struct SerialConsole {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConsole {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self { port_name: port_name.into(), baud_rate, read_timeout }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl DiagnosticConsole for SerialConsole {
    fn query(&mut self, command: &str) -> Result<Vec<String>, DiscoveryError> {
        let mut port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| DiscoveryError::Console(format!("Could not open {}. {e}", self.port_name)))?;
        debug!("Opened diagnostic console {} at {} baud", self.port_name, self.baud_rate);
        port.write_all(format!("{command}\n").as_bytes())?;
        port.flush()?;
        let reply = read_until_blank_line(&mut port, self.read_timeout)?;
        let lines = console_lines(&reply);
        trace!("Console replied with {} lines to `{command}`", lines.len());
        Ok(lines)
    }
}

/// Read until the reply ends with a blank line, the reader is exhausted or `timeout` passes without the terminator.
///
/// Whatever arrived before a timeout is returned; a partial reply may still hold the line we are after.
pub fn read_until_blank_line<R: Read + ?Sized>(reader: &mut R, timeout: Duration) -> std::io::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut reply = Vec::new();
    let mut buf = [0u8; 256];
    while !ends_with_blank_line(&reply) && Instant::now() < deadline {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => reply.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(reply)
}

fn ends_with_blank_line(reply: &[u8]) -> bool {
    reply.ends_with(b"\n\n") || reply.ends_with(b"\r\n\r\n")
}

/// Split a console reply into trimmed, non-empty lines.
pub fn console_lines(reply: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(reply).lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use libbento::parse_controller_address;
    use std::io::Cursor;

    const NET_IPV4_REPLY: &[u8] = b"net ipv4\r\nIPv4 addresses for interface 1 (0x20001234) (Ethernet)\r\n\
        ====================================================\r\n\
        Type  \tState    \tLifetime (sec)\tAddress\r\n\
        DHCP  \tpreferred\t85918         \t192.168.1.40/255.255.255.0\r\n\r\n";

    #[test]
    fn stops_at_the_blank_line() {
        let mut stream = NET_IPV4_REPLY.to_vec();
        stream.extend_from_slice(b"uart:~$ ");
        let mut reader = Cursor::new(stream);
        let reply = read_until_blank_line(&mut reader, Duration::from_secs(1)).unwrap();
        assert!(reply.ends_with(b"\r\n\r\n"));
        let lines = console_lines(&reply);
        assert_eq!(lines.len(), 5);
        assert_eq!(parse_controller_address(&lines).unwrap().as_str(), "192.168.1.40");
    }

    #[test]
    fn partial_reply_is_kept_at_end_of_stream() {
        let mut reader = Cursor::new(b"DHCP preferred 100 10.0.0.7/24\n".to_vec());
        let reply = read_until_blank_line(&mut reader, Duration::from_secs(1)).unwrap();
        assert_eq!(console_lines(&reply), vec!["DHCP preferred 100 10.0.0.7/24".to_string()]);
    }

    struct TimesOut;

    impl Read for TimesOut {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn port_timeout_ends_the_read_quietly() {
        assert!(read_until_blank_line(&mut TimesOut, Duration::from_secs(1)).unwrap().is_empty());
    }

    #[test]
    fn missing_port_is_a_console_error() {
        let mut console = SerialConsole::new("/dev/bento-does-not-exist", 115_200, Duration::from_millis(100));
        assert!(matches!(console.query("net ipv4"), Err(DiscoveryError::Console(_))));
    }
}
