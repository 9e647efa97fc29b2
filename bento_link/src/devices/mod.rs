//! Named device operations on top of the [`Dispatcher`].
//!
//! Every operation builds a relay envelope for the right module, submits it and returns immediately. Nothing here
//! retries; multi-step sequences decide that for themselves.

pub mod gimatic;
pub mod pneumatic;

use crate::dispatcher::{Dispatcher, SubmissionHandle};
use crate::errors::DispatchError;
use serde_json::Value;

pub use gimatic::{envelope_for_gimatic_command, envelope_for_gimatic_status, GimaticAction};
pub use pneumatic::{envelope_for_read_pressure, envelope_for_read_valve_state, envelope_for_set_valve, VALVE_CHANNELS};

#[derive(Clone)]
pub struct DeviceCommands {
    dispatcher: Dispatcher,
}

impl DeviceCommands {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn set_valve(&self, channel: u8, open: bool) -> SubmissionHandle<()> {
        self.dispatcher.submit(envelope_for_set_valve(channel, open)).map(|_| ())
    }

    /// Resolves to the `data` field of the controller's reply.
    pub fn read_valve_state(&self, channel: u8) -> SubmissionHandle<Value> {
        self.dispatcher
            .submit_checked(envelope_for_read_valve_state(channel), |reply| {
                reply_data(pneumatic::READ_VALVE_STATE, reply)
            })
    }

    /// Resolves to the `data` field of the controller's reply.
    pub fn read_pressure(&self) -> SubmissionHandle<Value> {
        self.dispatcher
            .submit_checked(envelope_for_read_pressure(), |reply| reply_data(pneumatic::READ_PRESSURE, reply))
    }

    pub fn gimatic_command(&self, action: GimaticAction) -> SubmissionHandle<()> {
        self.dispatcher.submit(envelope_for_gimatic_command(action)).map(|_| ())
    }

    pub fn gimatic_status(&self) -> SubmissionHandle<Value> {
        self.dispatcher
            .submit_checked(envelope_for_gimatic_status(), |reply| reply_data(gimatic::GIMATIC_CMD_STATUS, reply))
    }
}

/// Pull the `data` field out of a decoded reply. Runs on the dispatcher, so a malformed reply is logged there even if
/// nobody is waiting for it.
pub fn reply_data(cmd: &str, reply: Value) -> Result<Value, DispatchError> {
    match reply {
        Value::Object(mut fields) if fields.contains_key("data") => Ok(fields.remove("data").unwrap_or(Value::Null)),
        reply => Err(DispatchError::MalformedReply { cmd: cmd.to_string(), reply }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dispatcher::new_dispatcher;
    use crate::transport::mock::{ScriptedReply, ScriptedTransport};
    use libbento::{ControllerAddress, EndpointRegistry};
    use serde_json::json;

    fn devices(transport: &ScriptedTransport) -> DeviceCommands {
        let registry = EndpointRegistry::with_address(ControllerAddress::new("192.168.4.2"));
        let (dispatcher, event_loop) = new_dispatcher(transport.clone(), registry, Default::default());
        tokio::spawn(event_loop.run());
        DeviceCommands::new(dispatcher)
    }

    #[tokio::test]
    async fn set_valve_sends_the_relay_envelope() {
        let transport = ScriptedTransport::new();
        let devices = devices(&transport);
        devices.set_valve(3, true).await.unwrap();
        let sent = transport.exchanges()[0].payload_json();
        assert_eq!(sent["reg"], json!("RELAY_TO_MODULE_J"));
        assert_eq!(sent["val"]["origin_can_id"], json!(0x0402));
        assert_eq!(sent["val"]["dest_can_bus_id"], json!(544));
        assert_eq!(sent["val"]["cmd"], json!("set_valve"));
        assert_eq!(sent["val"]["data"], json!({"valve_n": 3, "open": true}));
    }

    #[tokio::test]
    async fn reads_resolve_to_the_data_field() {
        let transport = ScriptedTransport::new();
        transport
            .push(ScriptedReply::json(json!({"ret": "OK", "data": {"pressure": 4.2}})))
            .push(ScriptedReply::json(json!({"ret": "OK", "data": true})));
        let devices = devices(&transport);
        assert_eq!(devices.read_pressure().await.unwrap(), json!({"pressure": 4.2}));
        assert_eq!(devices.read_valve_state(2).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn replies_without_data_are_malformed() {
        env_logger::try_init().ok();
        let transport = ScriptedTransport::new();
        transport.push(ScriptedReply::json(json!({"ret": "OK"}))).push(ScriptedReply::json(json!([1, 2, 3])));
        let devices = devices(&transport);
        match devices.gimatic_status().await {
            Err(DispatchError::MalformedReply { cmd, reply }) => {
                assert_eq!(cmd, "GIMATIC_CMD_STATUS");
                assert_eq!(reply, json!({"ret": "OK"}));
            }
            other => panic!("Expected a malformed reply, got {other:?}"),
        }
        assert!(matches!(devices.read_pressure().await, Err(DispatchError::MalformedReply { .. })));
    }

    #[tokio::test]
    async fn commands_accept_any_well_formed_reply() {
        let transport = ScriptedTransport::new();
        transport.push(ScriptedReply::json(json!("done")));
        let devices = devices(&transport);
        devices.gimatic_command(GimaticAction::Open).await.unwrap();
        devices.set_valve(1, false).await.unwrap();
        assert_eq!(transport.exchanges().len(), 2);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let transport = ScriptedTransport::new();
        transport.push(ScriptedReply::bytes(&b"{oops"[..]));
        let devices = devices(&transport);
        assert!(matches!(devices.read_pressure().await, Err(DispatchError::DecodeError { .. })));
    }
}
