use bento_link::DispatchError;
use dialoguer::console::{Color, Style};
use serde_json::Value;
use std::fmt::Display;

/// The state of the most recent operation, as shown next to every prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Busy,
    Ok,
    Failed,
}

impl Status {
    pub fn style(&self) -> Style {
        match self {
            Status::Idle => Style::new().fg(Color::Color256(245)),
            Status::Busy => Style::new().fg(Color::Color256(208)),
            Status::Ok => Style::new().green(),
            Status::Failed => Style::new().red(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Idle => "Idle",
            Status::Busy => "Busy",
            Status::Ok => "OK",
            Status::Failed => "Failed",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub fn status_indicator(status: Status) -> String {
    format!("{}", status.style().apply_to(format!("● {status}")))
}

/// What the operator should read for each kind of failure.
pub fn operator_message(err: &DispatchError) -> String {
    let hint = match err {
        DispatchError::EndpointNotSet => return err.to_string(),
        DispatchError::InvalidCommandShape(_) => "This is a bug in the command builder.",
        DispatchError::Timeout(_) => "Check that the controller is powered and on the network.",
        DispatchError::NetworkError(_) => "Check the controller address and the network connection.",
        DispatchError::ProtocolError(_) => "The controller may be running incompatible firmware.",
        DispatchError::EmptyResponse | DispatchError::DecodeError { .. } | DispatchError::MalformedReply { .. } => {
            "The controller replied with something unexpected."
        }
        DispatchError::ExecutorStopped => "Restart bento to continue.",
    };
    match err.raw_payload() {
        Some(raw) => format!("{err} {hint} Raw reply: {}", String::from_utf8_lossy(raw)),
        None => format!("{err} {hint}"),
    }
}

/// Render a reply's `data` field for humans. Strings lose their quotes; everything else is compact JSON.
pub fn format_data(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Null => "(nothing)".to_string(),
        other => other.to_string(),
    }
}
