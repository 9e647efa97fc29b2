use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Register {register} does not accept a structured value.")]
    InvalidCommandShape { register: String },
    #[error("The controller replied with an empty payload.")]
    EmptyResponse,
    #[error("The controller reply could not be decoded ({reason}). Raw payload: {}", hex::encode(.raw))]
    DecodeError { raw: Vec<u8>, reason: String },
    #[error("The command could not be serialized. {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CodecError {
    /// The raw reply bytes, if this error carries them.
    pub fn raw_payload(&self) -> Option<&[u8]> {
        match self {
            CodecError::DecodeError { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("The diagnostic console could not be queried. {0}")]
    Console(String),
    #[error("No controller address was reported after {attempts} attempt(s).")]
    NotFound { attempts: u32 },
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Console(err.to_string())
    }
}
