use std::time::Duration;

/// Default time allowed for one complete request/response exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);
/// IANA-assigned CoAP port.
pub const DEFAULT_COAP_PORT: u16 = 5683;
/// RFC 7252 `ACK_TIMEOUT`.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);
/// RFC 7252 `MAX_RETRANSMIT`.
pub const DEFAULT_MAX_RETRANSMIT: u32 = 4;

/// Tuning knobs for exchanges with the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Upper bound on a whole exchange, retransmissions included.
    pub timeout: Duration,
    /// Port used when the controller address does not name one.
    pub port: u16,
    /// Initial retransmission interval for confirmable requests. Doubles after every retransmission.
    pub ack_timeout: Duration,
    pub max_retransmit: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
            port: DEFAULT_COAP_PORT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retransmit: DEFAULT_MAX_RETRANSMIT,
        }
    }
}

impl ExchangeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_max_retransmit(mut self, max_retransmit: u32) -> Self {
        self.max_retransmit = max_retransmit;
        self
    }
}
