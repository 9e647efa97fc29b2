//! Core, network-free building blocks for talking to a Bento controller.
//!
//! - [`endpoint`]: the shared, swappable controller address.
//! - [`codec`]: the `{"reg": .., "val": ..}` command envelope and reply decoding.
//! - [`relay`]: the nested envelope used to reach modules on the controller's CAN bus.
//! - [`discovery`]: locating the controller address from its diagnostic console output.

pub mod codec;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod relay;

pub use codec::{decode, encode, CommandEnvelope, CommandValue};
pub use discovery::{discover_controller_address, parse_controller_address, DiagnosticConsole, RetryPolicy};
pub use endpoint::{ControllerAddress, EndpointRegistry};
pub use error::{CodecError, DiscoveryError};
pub use relay::{build_relay_envelope, RelayEnvelope};
