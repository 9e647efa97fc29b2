use libbento::CodecError;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single request/response exchange with the controller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No reply from the controller within {0:?}.")]
    Timeout(Duration),
    #[error("The controller could not be reached. {0}")]
    NetworkError(String),
    #[error("The controller reply violates the CoAP framing. {0}")]
    ProtocolError(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::NetworkError(err.to_string())
    }
}

/// Everything that can go wrong between submitting a command and receiving its decoded reply.
///
/// Each variant renders its own operator-facing message, so that "controller unreachable" is never confused with
/// "controller replied with nonsense".
#[derive(Clone, Debug, Error)]
pub enum DispatchError {
    #[error("No controller address is configured. Fetch or enter the controller address first.")]
    EndpointNotSet,
    #[error("The command is not valid for its register. {0}")]
    InvalidCommandShape(String),
    #[error("The controller did not answer within {0:?}.")]
    Timeout(Duration),
    #[error("The controller is unreachable. {0}")]
    NetworkError(String),
    #[error("The controller answered with a malformed message. {0}")]
    ProtocolError(String),
    #[error("The controller answered with an empty reply.")]
    EmptyResponse,
    #[error("The controller reply is not valid JSON ({reason}).")]
    DecodeError { raw: Vec<u8>, reason: String },
    #[error("The controller reply to `{cmd}` has no `data` field: {reply}")]
    MalformedReply { cmd: String, reply: Value },
    #[error("The command dispatcher has been stopped.")]
    ExecutorStopped,
}

impl DispatchError {
    /// A short, stable label for the kind of failure.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::EndpointNotSet => "endpoint not set",
            DispatchError::InvalidCommandShape(_) => "invalid command",
            DispatchError::Timeout(_) => "timeout",
            DispatchError::NetworkError(_) => "unreachable",
            DispatchError::ProtocolError(_) => "protocol error",
            DispatchError::EmptyResponse => "empty reply",
            DispatchError::DecodeError { .. } => "undecodable reply",
            DispatchError::MalformedReply { .. } => "malformed reply",
            DispatchError::ExecutorStopped => "dispatcher stopped",
        }
    }

    /// The raw reply bytes of an undecodable reply.
    pub fn raw_payload(&self) -> Option<&[u8]> {
        match self {
            DispatchError::DecodeError { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(d) => DispatchError::Timeout(d),
            TransportError::NetworkError(msg) => DispatchError::NetworkError(msg),
            TransportError::ProtocolError(msg) => DispatchError::ProtocolError(msg),
        }
    }
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidCommandShape { .. } | CodecError::Serialization(_) => {
                DispatchError::InvalidCommandShape(err.to_string())
            }
            CodecError::EmptyResponse => DispatchError::EmptyResponse,
            CodecError::DecodeError { raw, reason } => DispatchError::DecodeError { raw, reason },
        }
    }
}
