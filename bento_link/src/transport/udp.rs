use super::coap::{CoapMessage, MessageType};
use super::{ExchangeGauge, Transport};
use crate::config::ExchangeConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use libbento::ControllerAddress;
use log::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Resource on the controller that accepts commands.
pub const CONTROLLER_RESOURCE: &str = "controller";
const MAX_DATAGRAM_SIZE: usize = 65_535;
const TOKEN_LENGTH: usize = 4;

/// Sends each command as a confirmable CoAP `POST` to `coap://<address>/controller`.
///
/// Every exchange binds its own UDP socket, so no state is shared between exchanges and nothing survives a timeout.
#[derive(Clone, Debug)]
pub struct CoapTransport {
    port: u16,
    ack_timeout: Duration,
    max_retransmit: u32,
    gauge: ExchangeGauge,
}

impl CoapTransport {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self {
            port: config.port,
            ack_timeout: config.ack_timeout,
            max_retransmit: config.max_retransmit,
            gauge: ExchangeGauge::default(),
        }
    }

    /// Number of exchanges currently holding a socket.
    pub fn open_exchanges(&self) -> usize {
        self.gauge.current()
    }

    async fn resolve(&self, address: &ControllerAddress) -> Result<SocketAddr, TransportError> {
        let addr = address.as_str();
        if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
            return Ok(socket_addr);
        }
        if let Ok(ip) = addr.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => (host, port),
                Err(_) => (addr, self.port),
            },
            None => (addr, self.port),
        };
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| TransportError::NetworkError(format!("Cannot resolve {addr}. {e}")))?
            .next()
            .ok_or_else(|| TransportError::NetworkError(format!("{addr} did not resolve to any address")))
    }

    async fn converse(&self, address: &ControllerAddress, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let target = self.resolve(address).await?;
        let any = if target.is_ipv4() { IpAddr::V4(Ipv4Addr::UNSPECIFIED) } else { IpAddr::V6(Ipv6Addr::UNSPECIFIED) };
        let socket = UdpSocket::bind(SocketAddr::new(any, 0)).await?;
        socket.connect(target).await?;

        let message_id = rand::random::<u16>();
        let token = rand::random::<[u8; TOKEN_LENGTH]>();
        let request = CoapMessage::post(message_id, &token, CONTROLLER_RESOURCE, payload.to_vec());
        let datagram = request.to_bytes();
        trace!("CoAP POST to {target}: mid={message_id:#06x}, {} bytes", datagram.len());
        socket.send(&datagram).await?;

        let mut wait = self.ack_timeout;
        let mut next_retransmit = Instant::now() + wait;
        let mut retransmissions = 0;
        let mut acknowledged = false;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let received = if acknowledged || retransmissions >= self.max_retransmit {
                Some(socket.recv(&mut buf).await?)
            } else {
                match tokio::time::timeout_at(next_retransmit, socket.recv(&mut buf)).await {
                    Ok(result) => Some(result?),
                    Err(_) => None,
                }
            };
            let Some(len) = received else {
                retransmissions += 1;
                wait *= 2;
                next_retransmit = Instant::now() + wait;
                debug!("No ACK from {target} yet. Retransmission {retransmissions}/{}", self.max_retransmit);
                socket.send(&datagram).await?;
                continue;
            };
            let reply = CoapMessage::from_bytes(&buf[..len])?;
            let same_exchange = reply.message_id == message_id;
            let same_token = reply.token == token;
            match reply.message_type {
                MessageType::Reset if same_exchange => {
                    return Err(TransportError::NetworkError("The controller reset the exchange".into()));
                }
                MessageType::Acknowledgement if same_exchange && reply.code.is_empty() => {
                    trace!("Empty ACK from {target}; waiting for a separate response");
                    acknowledged = true;
                }
                MessageType::Acknowledgement if same_exchange => {
                    if !same_token {
                        return Err(TransportError::ProtocolError("Acknowledgement carries a foreign token".into()));
                    }
                    return finish(reply);
                }
                MessageType::Confirmable | MessageType::NonConfirmable if same_token && reply.code.is_response() => {
                    if reply.message_type == MessageType::Confirmable {
                        socket.send(&CoapMessage::empty_ack(reply.message_id).to_bytes()).await?;
                    }
                    return finish(reply);
                }
                _ => trace!("Ignoring unrelated {:?} datagram (mid={:#06x})", reply.message_type, reply.message_id),
            }
        }
    }
}

fn finish(reply: CoapMessage) -> Result<Vec<u8>, TransportError> {
    if reply.code.is_success() {
        Ok(reply.payload)
    } else {
        let detail = String::from_utf8_lossy(&reply.payload);
        Err(TransportError::ProtocolError(format!("The controller responded {} {detail}", reply.code)))
    }
}

#[async_trait]
impl Transport for CoapTransport {
    async fn exchange(
        &self,
        address: &ControllerAddress,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let _open = self.gauge.open();
        match tokio::time::timeout(timeout, self.converse(address, payload)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("⏰ Exchange with {address} abandoned after {timeout:?}");
                Err(TransportError::Timeout(timeout))
            }
        }
    }
}
