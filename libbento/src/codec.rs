//! The command envelope understood by the controller.
//!
//! Every command is a JSON object `{"reg": <register>, "val": <value>}` sent as UTF-8 bytes. Most registers take a
//! plain string value. A handful take a structured object instead; those are listed in [`STRUCTURED_REGISTERS`] and
//! pairing a structured value with any other register is rejected before anything is transmitted.

use crate::error::CodecError;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Forward the value to a module on the controller's CAN bus. See [`crate::relay`].
pub const RELAY_TO_MODULE: &str = "RELAY_TO_MODULE_J";
/// Firmware upload and management.
pub const FIRMWARE_MANAGEMENT: &str = "FIRMWARE_J";
/// Controller log retrieval.
pub const LOG: &str = "LOG_J";

/// Registers that accept a structured (object) value.
pub const STRUCTURED_REGISTERS: [&str; 3] = [RELAY_TO_MODULE, FIRMWARE_MANAGEMENT, LOG];

pub fn accepts_structured_value(register: &str) -> bool {
    STRUCTURED_REGISTERS.contains(&register)
}

/// The value half of a command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Text(String),
    Structured(Map<String, Value>),
}

impl From<&str> for CommandValue {
    fn from(s: &str) -> Self {
        CommandValue::Text(s.to_string())
    }
}

impl From<String> for CommandValue {
    fn from(s: String) -> Self {
        CommandValue::Text(s)
    }
}

impl From<Map<String, Value>> for CommandValue {
    fn from(map: Map<String, Value>) -> Self {
        CommandValue::Structured(map)
    }
}

/// A register/value pair, ready to be encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandEnvelope {
    pub register: String,
    pub value: CommandValue,
}

impl CommandEnvelope {
    pub fn new(register: impl Into<String>, value: impl Into<CommandValue>) -> Self {
        Self { register: register.into(), value: value.into() }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(&self.register, &self.value)
    }
}

#[derive(Serialize)]
struct WireCommand<'a> {
    reg: &'a str,
    val: &'a CommandValue,
}

/// Serialize a command to the bytes sent to the controller.
///
/// Fails with [`CodecError::InvalidCommandShape`] when `value` is structured and `register` is not one of
/// [`STRUCTURED_REGISTERS`]. String values are accepted for any register.
pub fn encode(register: &str, value: &CommandValue) -> Result<Vec<u8>, CodecError> {
    match value {
        CommandValue::Text(_) => {}
        CommandValue::Structured(_) if accepts_structured_value(register) => {}
        CommandValue::Structured(_) => {
            return Err(CodecError::InvalidCommandShape { register: register.to_string() });
        }
    }
    let bytes = serde_json::to_vec(&WireCommand { reg: register, val: value })?;
    trace!("Encoded {register} command into {} bytes", bytes.len());
    Ok(bytes)
}

/// Parse a reply payload.
///
/// An empty payload is reported as [`CodecError::EmptyResponse`]. Anything else that is not valid JSON is a
/// [`CodecError::DecodeError`] which keeps the raw bytes.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyResponse);
    }
    serde_json::from_slice(bytes).map_err(|e| CodecError::DecodeError { raw: bytes.to_vec(), reason: e.to_string() })
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn structured(value: Value) -> CommandValue {
        match value {
            Value::Object(map) => CommandValue::Structured(map),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn structured_values_need_an_allowed_register() {
        let value = structured(json!({"a": 1, "nested": {"b": true}}));
        for register in ["SET_LED", "reg", "", "relay_to_module_j", "RELAY_TO_MODULE"] {
            let err = encode(register, &value).unwrap_err();
            assert!(
                matches!(err, CodecError::InvalidCommandShape { register: ref r } if r == register),
                "{register}: {err}"
            );
        }
        for register in STRUCTURED_REGISTERS {
            assert!(encode(register, &value).is_ok(), "{register} should accept structured values");
        }
    }

    #[test]
    fn string_values_are_accepted_for_any_register() {
        for register in ["SET_LED", "RELAY_TO_MODULE_J", "LOG_J", "", "ünïcode"] {
            let bytes = encode(register, &"on".into()).unwrap();
            let decoded: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(decoded, json!({"reg": register, "val": "on"}));
        }
    }

    #[test]
    fn wire_shape_uses_reg_and_val_keys() {
        let envelope = CommandEnvelope::new(RELAY_TO_MODULE, structured(json!({"cmd": "p_read"})));
        let bytes = envelope.encode().unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"reg":"RELAY_TO_MODULE_J","val":{"cmd":"p_read"}}"#);
    }

    #[test]
    fn decode_returns_structurally_equal_values() {
        let samples = [
            json!({"ret": "OK", "data": {"pressure": 4.25, "valves": [true, false, null]}}),
            json!("plain"),
            json!([1, -2, 3.5e10]),
            json!(null),
            json!({"deep": {"er": {"est": {"x": "ü"}}}}),
        ];
        for sample in samples {
            let bytes = serde_json::to_vec(&sample).unwrap();
            assert_eq!(decode(&bytes).unwrap(), sample);
        }
    }

    #[test]
    fn empty_payload_is_not_a_decode_error() {
        assert!(matches!(decode(&[]), Err(CodecError::EmptyResponse)));
    }

    #[test]
    fn undecodable_payload_keeps_raw_bytes() {
        let raw = [0x7f, 0x45, 0x4c, 0x46, 0x00, 0xff];
        let err = decode(&raw).unwrap_err();
        assert_eq!(err.raw_payload(), Some(&raw[..]));
        assert!(err.to_string().contains("7f454c4600ff"));
        let err = decode(b"{\"ret\": ").unwrap_err();
        assert_eq!(err.raw_payload(), Some(&b"{\"ret\": "[..]));
    }
}
