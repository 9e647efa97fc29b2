//! A scripted, in-process [`Transport`] for exercising the dispatcher without a controller.
//!
//! Replies are consumed in order. Once the script runs dry, every exchange receives the default reply
//! (`{"ret":"OK"}` unless overridden). Scripted delays honour the exchange timeout, so a delay longer than the timeout
//! resolves as [`TransportError::Timeout`].

use super::{ExchangeGauge, Transport};
use crate::errors::TransportError;
use async_trait::async_trait;
use libbento::ControllerAddress;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ScriptedReply {
    pub delay: Duration,
    pub outcome: Result<Vec<u8>, TransportError>,
}

impl ScriptedReply {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { delay: Duration::ZERO, outcome: Ok(bytes.into()) }
    }

    pub fn json(value: Value) -> Self {
        Self::bytes(value.to_string())
    }

    pub fn error(err: TransportError) -> Self {
        Self { delay: Duration::ZERO, outcome: Err(err) }
    }

    /// Deliver this reply only after `delay`.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One exchange as seen by the transport.
#[derive(Clone, Debug)]
pub struct RecordedExchange {
    pub address: ControllerAddress,
    pub payload: Vec<u8>,
    pub timeout: Duration,
}

impl RecordedExchange {
    pub fn payload_json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap_or(Value::Null)
    }
}

#[derive(Debug)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    default_reply: ScriptedReply,
    exchanges: Vec<RecordedExchange>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Clone, Debug)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    gauge: ExchangeGauge,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let script = Script {
            replies: VecDeque::new(),
            default_reply: ScriptedReply::bytes(&b"{\"ret\":\"OK\"}"[..]),
            exchanges: Vec::new(),
            in_flight: 0,
            max_in_flight: 0,
        };
        Self { script: Arc::new(Mutex::new(script)), gauge: ExchangeGauge::default() }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        self.script().replies.push_back(reply);
        self
    }

    pub fn set_default(&self, reply: ScriptedReply) {
        self.script().default_reply = reply;
    }

    pub fn exchanges(&self) -> Vec<RecordedExchange> {
        self.script().exchanges.clone()
    }

    /// The largest number of exchanges that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.script().max_in_flight
    }

    pub fn open_exchanges(&self) -> usize {
        self.gauge.current()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(
        &self,
        address: &ControllerAddress,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let _open = self.gauge.open();
        let reply = {
            let mut script = self.script();
            script.exchanges.push(RecordedExchange { address: address.clone(), payload: payload.to_vec(), timeout });
            script.in_flight += 1;
            script.max_in_flight = script.max_in_flight.max(script.in_flight);
            script.replies.pop_front().unwrap_or_else(|| script.default_reply.clone())
        };
        let outcome = if reply.delay > timeout {
            tokio::time::sleep(timeout).await;
            Err(TransportError::Timeout(timeout))
        } else {
            tokio::time::sleep(reply.delay).await;
            reply.outcome
        };
        self.script().in_flight -= 1;
        outcome
    }
}
