//! Commands for the Gimatic gripper module.

use libbento::relay::{RelayEnvelope, GIMATIC_MODULE_BUS_ID};
use libbento::CommandEnvelope;
use serde_json::{json, Map};
use std::fmt::Display;
use std::str::FromStr;

pub const GIMATIC: &str = "gimatic";
pub const GIMATIC_CMD_STATUS: &str = "GIMATIC_CMD_STATUS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GimaticAction {
    Open,
    Close,
}

impl GimaticAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GimaticAction::Open => "GIMATIC_CMD_OPEN",
            GimaticAction::Close => "GIMATIC_CMD_CLOSE",
        }
    }
}

impl Display for GimaticAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GimaticAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "gimatic_cmd_open" => Ok(GimaticAction::Open),
            "close" | "gimatic_cmd_close" => Ok(GimaticAction::Close),
            _ => Err(format!("Unknown gripper action: {s}. Expected 'open' or 'close'")),
        }
    }
}

pub fn envelope_for_gimatic_command(action: GimaticAction) -> CommandEnvelope {
    let mut data = Map::new();
    data.insert("action".into(), json!(action.as_str()));
    data.insert("wait".into(), json!("no"));
    RelayEnvelope::new(GIMATIC_MODULE_BUS_ID, GIMATIC, data).into_command()
}

pub fn envelope_for_gimatic_status() -> CommandEnvelope {
    let mut data = Map::new();
    data.insert("action".into(), json!(GIMATIC_CMD_STATUS));
    RelayEnvelope::new(GIMATIC_MODULE_BUS_ID, GIMATIC, data).into_command()
}
