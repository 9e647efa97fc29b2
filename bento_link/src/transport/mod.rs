//! Request/response exchanges with the controller.
//!
//! A [`Transport`] carries one encoded command to the controller and returns the raw reply bytes. It knows nothing
//! about the command envelope; encoding and decoding happen in the dispatcher's event loop.
//!
//! - [`CoapTransport`]: the production transport, a confirmable CoAP `POST` to `coap://<address>/controller`.
//! - [`mock::ScriptedTransport`]: an in-process double that replays scripted replies.

pub mod coap;
pub mod mock;
mod udp;

use crate::errors::TransportError;
use async_trait::async_trait;
use libbento::ControllerAddress;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use udp::CoapTransport;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `payload` to the controller at `address` and wait at most `timeout` for its reply.
    ///
    /// Implementations release everything they acquired for the exchange before returning, on every path.
    async fn exchange(
        &self,
        address: &ControllerAddress,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn exchange(
        &self,
        address: &ControllerAddress,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(address, payload, timeout).await
    }
}

/// Counts exchanges that currently hold resources.
#[derive(Clone, Debug, Default)]
pub struct ExchangeGauge {
    open: Arc<AtomicUsize>,
}

impl ExchangeGauge {
    /// Mark an exchange as open until the returned guard is dropped.
    pub fn open(&self) -> ExchangeGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        ExchangeGuard { open: Arc::clone(&self.open) }
    }

    pub fn current(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

pub struct ExchangeGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
