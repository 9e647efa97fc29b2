//! Background execution of controller commands.
//!
//! Callers hand [`CommandEnvelope`](libbento::CommandEnvelope)s to a [`Dispatcher`] and get a [`SubmissionHandle`]
//! back straight away. A single [`EventLoop`] executes the submissions strictly one after another: it reads the
//! current controller address, encodes the command, runs the exchange and decodes the reply. The outcome, good or
//! bad, always lands in the handle.

mod client;
mod completion;
mod event_loop;
mod executor;

pub use client::{new_dispatcher, Dispatcher};
pub use completion::{SubmissionHandle, SubmissionId};
pub use event_loop::EventLoop;
pub use executor::BackgroundExecutor;
