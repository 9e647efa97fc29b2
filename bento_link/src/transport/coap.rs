//! Just enough of the CoAP message format (RFC 7252, section 3) to POST a command and read the reply.
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use crate::errors::TransportError;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const COAP_VERSION: u8 = 1;
pub const PAYLOAD_MARKER: u8 = 0xFF;
pub const MAX_TOKEN_LENGTH: usize = 8;

pub const OPTION_URI_PATH: u16 = 11;
pub const OPTION_CONTENT_FORMAT: u16 = 12;
/// `application/json`
pub const CONTENT_FORMAT_JSON: u16 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Malformed CoAP message: {0}")]
pub struct FormatError(pub String);

impl From<FormatError> for TransportError {
    fn from(err: FormatError) -> Self {
        TransportError::ProtocolError(err.0)
    }
}

fn format_error(msg: impl Into<String>) -> FormatError {
    FormatError(msg.into())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn bits(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }
}

/// A message code in `class.detail` form, e.g. `0.02` (POST) or `2.05` (Content).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageCode(pub u8);

impl MessageCode {
    pub const EMPTY: MessageCode = MessageCode(0x00);
    pub const POST: MessageCode = MessageCode(0x02);
    pub const CHANGED: MessageCode = MessageCode(0x44);
    pub const CONTENT: MessageCode = MessageCode(0x45);
    pub const BAD_REQUEST: MessageCode = MessageCode(0x80);
    pub const NOT_FOUND: MessageCode = MessageCode(0x84);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_response(self) -> bool {
        matches!(self.class(), 2 | 4 | 5)
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl Display for MessageCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoapMessage {
    pub message_type: MessageType,
    pub code: MessageCode,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Kept sorted by option number.
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl CoapMessage {
    /// A confirmable JSON `POST` to `path` (slash-separated, without a leading slash).
    pub fn post(message_id: u16, token: &[u8], path: &str, payload: Vec<u8>) -> Self {
        let mut msg = Self {
            message_type: MessageType::Confirmable,
            code: MessageCode::POST,
            message_id,
            token: token.to_vec(),
            options: Vec::new(),
            payload,
        };
        path.split('/').filter(|s| !s.is_empty()).for_each(|segment| msg.add_option(OPTION_URI_PATH, segment.into()));
        msg.add_option(OPTION_CONTENT_FORMAT, encode_uint(CONTENT_FORMAT_JSON));
        msg
    }

    pub fn empty_ack(message_id: u16) -> Self {
        Self {
            message_type: MessageType::Acknowledgement,
            code: MessageCode::EMPTY,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Append an option, keeping options ordered. Options with equal numbers keep their insertion order.
    pub fn add_option(&mut self, number: u16, value: Vec<u8>) {
        let at = self.options.partition_point(|o| o.number <= number);
        self.options.insert(at, CoapOption { number, value });
    }

    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options.iter().filter(move |o| o.number == number).map(|o| o.value.as_slice())
    }

    /// The `Uri-Path` segments joined with `/`.
    pub fn uri_path(&self) -> String {
        self.option_values(OPTION_URI_PATH)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        let tkl = self.token.len().min(MAX_TOKEN_LENGTH) as u8;
        out.push((COAP_VERSION << 6) | (self.message_type.bits() << 4) | tkl);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token[..tkl as usize]);
        let mut previous = 0u16;
        for option in &self.options {
            let delta = option.number - previous;
            previous = option.number;
            let (delta_nibble, delta_ext) = split_option_field(delta as usize);
            let (len_nibble, len_ext) = split_option_field(option.value.len());
            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&option.value);
        }
        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < 4 {
            return Err(format_error(format!("{} bytes is shorter than the fixed header", bytes.len())));
        }
        let version = bytes[0] >> 6;
        if version != COAP_VERSION {
            return Err(format_error(format!("unsupported version {version}")));
        }
        let message_type = MessageType::from_bits(bytes[0] >> 4);
        let tkl = (bytes[0] & 0x0F) as usize;
        if tkl > MAX_TOKEN_LENGTH {
            return Err(format_error(format!("token length {tkl} exceeds {MAX_TOKEN_LENGTH}")));
        }
        let code = MessageCode(bytes[1]);
        let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);
        if code.is_empty() && bytes.len() != 4 {
            return Err(format_error("empty message carries data after the header"));
        }
        let mut pos = 4;
        let token = bytes.get(pos..pos + tkl).ok_or_else(|| format_error("truncated token"))?.to_vec();
        pos += tkl;

        let mut options = Vec::new();
        let mut number = 0usize;
        let mut payload = Vec::new();
        while pos < bytes.len() {
            let head = bytes[pos];
            pos += 1;
            if head == PAYLOAD_MARKER {
                if pos == bytes.len() {
                    return Err(format_error("payload marker followed by an empty payload"));
                }
                payload = bytes[pos..].to_vec();
                break;
            }
            let delta = read_option_field(head >> 4, bytes, &mut pos)?;
            let len = read_option_field(head & 0x0F, bytes, &mut pos)?;
            number += delta;
            let number = u16::try_from(number).map_err(|_| format_error("option number out of range"))?;
            let value = bytes.get(pos..pos + len).ok_or_else(|| format_error("truncated option value"))?.to_vec();
            pos += len;
            options.push(CoapOption { number, value });
        }
        Ok(Self { message_type, code, message_id, token, options, payload })
    }
}

/// Minimal big-endian encoding of an unsigned option value.
pub fn encode_uint(value: u16) -> Vec<u8> {
    match value {
        0 => Vec::new(),
        1..=0xFF => vec![value as u8],
        _ => value.to_be_bytes().to_vec(),
    }
}

fn split_option_field(value: usize) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, ((value - 269) as u16).to_be_bytes().to_vec()),
    }
}

fn read_option_field(nibble: u8, bytes: &[u8], pos: &mut usize) -> Result<usize, FormatError> {
    match nibble {
        0..=12 => Ok(nibble as usize),
        13 => {
            let ext = *bytes.get(*pos).ok_or_else(|| format_error("truncated option header"))?;
            *pos += 1;
            Ok(ext as usize + 13)
        }
        14 => {
            let ext = bytes.get(*pos..*pos + 2).ok_or_else(|| format_error("truncated option header"))?;
            *pos += 2;
            Ok(u16::from_be_bytes([ext[0], ext[1]]) as usize + 269)
        }
        _ => Err(format_error("reserved option nibble 15")),
    }
}
