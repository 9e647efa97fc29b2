//! Commands for the pneumatic module: six valves and a shared pressure sensor.

use libbento::relay::{RelayEnvelope, PNEUMATIC_MODULE_BUS_ID};
use libbento::CommandEnvelope;
use serde_json::{json, Map};

pub const VALVE_CHANNELS: std::ops::RangeInclusive<u8> = 1..=6;

pub const SET_VALVE: &str = "set_valve";
pub const READ_VALVE_STATE: &str = "p_read";
pub const READ_PRESSURE: &str = "read_pressure";

pub fn envelope_for_set_valve(channel: u8, open: bool) -> CommandEnvelope {
    let mut data = Map::new();
    data.insert("valve_n".into(), json!(channel));
    data.insert("open".into(), json!(open));
    RelayEnvelope::new(PNEUMATIC_MODULE_BUS_ID, SET_VALVE, data).into_command()
}

pub fn envelope_for_read_valve_state(channel: u8) -> CommandEnvelope {
    let mut data = Map::new();
    data.insert("valve_n".into(), json!(channel));
    RelayEnvelope::new(PNEUMATIC_MODULE_BUS_ID, READ_VALVE_STATE, data).into_command()
}

pub fn envelope_for_read_pressure() -> CommandEnvelope {
    RelayEnvelope::new(PNEUMATIC_MODULE_BUS_ID, READ_PRESSURE, Map::new()).into_command()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::{json, Value};

    fn wire(envelope: &CommandEnvelope) -> Value {
        serde_json::from_slice(&envelope.encode().unwrap()).unwrap()
    }

    #[test]
    fn open_valve_three() {
        let envelope = envelope_for_set_valve(3, true);
        assert_eq!(
            wire(&envelope),
            json!({
                "reg": "RELAY_TO_MODULE_J",
                "val": {
                    "origin_can_id": 1026,
                    "dest_can_bus_id": 544,
                    "cmd": "set_valve",
                    "data": {"valve_n": 3, "open": true}
                }
            })
        );
    }

    #[test]
    fn read_state_and_pressure() {
        assert_eq!(wire(&envelope_for_read_valve_state(6))["val"]["data"], json!({"valve_n": 6}));
        assert_eq!(wire(&envelope_for_read_valve_state(6))["val"]["cmd"], json!("p_read"));
        let pressure = wire(&envelope_for_read_pressure());
        assert_eq!(pressure["val"]["cmd"], json!("read_pressure"));
        assert_eq!(pressure["val"]["data"], json!({}));
    }
}
