//! # bento-link
//!
//! Runs controller commands in the background. The pieces, from the bottom up:
//!
//! - [`transport`]: a single request/response exchange with the controller, over CoAP.
//! - [`dispatcher`]: a dedicated executor that runs submitted commands one at a time and resolves a
//!   [`SubmissionHandle`] for each.
//! - [`caller`]: hands reactions back to the thread that owns the caller's state.
//! - [`devices`]: named valve, pressure and gripper operations.

pub mod caller;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod errors;
pub mod transport;

pub use caller::{caller_context, CallerContext, CallerLoop};
pub use config::ExchangeConfig;
pub use devices::{DeviceCommands, GimaticAction};
pub use dispatcher::{new_dispatcher, BackgroundExecutor, Dispatcher, EventLoop, SubmissionHandle, SubmissionId};
pub use errors::{DispatchError, TransportError};
pub use transport::{CoapTransport, Transport};
