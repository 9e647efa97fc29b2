//! Relay envelopes address a module on the controller's secondary (CAN) bus.
//!
//! The controller unpacks the value of a [`RELAY_TO_MODULE`] command and forwards it to the module whose bus id is
//! `dest_can_bus_id`:
//!
//! ```json
//! {"origin_can_id": 1026, "dest_can_bus_id": 544, "cmd": "set_valve", "data": {"valve_n": 3, "open": true}}
//! ```
//!
//! The contents of `data` are specific to `cmd` and are not checked here.

use crate::codec::{CommandEnvelope, CommandValue, RELAY_TO_MODULE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bus id that identifies this dispatcher as the originator of relayed commands.
pub const ORIGIN_CAN_ID: u16 = 0x0402;
/// Bus id of the pneumatic valve module.
pub const PNEUMATIC_MODULE_BUS_ID: u16 = 544;
/// Bus id of the Gimatic gripper module.
pub const GIMATIC_MODULE_BUS_ID: u16 = 0x0320;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub origin_can_id: u16,
    pub dest_can_bus_id: u16,
    pub cmd: String,
    pub data: Map<String, Value>,
}

impl RelayEnvelope {
    pub fn new(dest_can_bus_id: u16, cmd: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { origin_can_id: ORIGIN_CAN_ID, dest_can_bus_id, cmd: cmd.into(), data }
    }

    /// Recover a relay envelope from a structured command value.
    pub fn from_value(value: &CommandValue) -> Option<Self> {
        match value {
            CommandValue::Structured(map) => serde_json::from_value(Value::Object(map.clone())).ok(),
            CommandValue::Text(_) => None,
        }
    }

    pub fn to_value(&self) -> CommandValue {
        let mut map = Map::with_capacity(4);
        map.insert("origin_can_id".into(), self.origin_can_id.into());
        map.insert("dest_can_bus_id".into(), self.dest_can_bus_id.into());
        map.insert("cmd".into(), Value::String(self.cmd.clone()));
        map.insert("data".into(), Value::Object(self.data.clone()));
        CommandValue::Structured(map)
    }

    /// Wrap this envelope in a [`RELAY_TO_MODULE`] command.
    pub fn into_command(self) -> CommandEnvelope {
        CommandEnvelope::new(RELAY_TO_MODULE, self.to_value())
    }
}

/// Build the structured value of a relay command. `origin_can_id` is always [`ORIGIN_CAN_ID`].
pub fn build_relay_envelope(dest_bus_id: u16, cmd: impl Into<String>, data: Map<String, Value>) -> CommandValue {
    RelayEnvelope::new(dest_bus_id, cmd, data).to_value()
}
