use crate::config::ExchangeConfig;
use crate::dispatcher::completion::{completion, failed, SubmissionHandle, SubmissionId};
use crate::dispatcher::event_loop::{DispatcherCommand, EventLoop, ReplyCheck, Submission};
use crate::errors::DispatchError;
use crate::transport::Transport;
use futures::channel::{mpsc, oneshot};
use libbento::{CommandEnvelope, EndpointRegistry};
use log::*;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Create a dispatcher and the event loop that serves it.
///
/// The event loop does nothing until it is driven, either by [`BackgroundExecutor`](super::BackgroundExecutor) or by
/// spawning [`EventLoop::run`] on a runtime you already have. Reactions attached to submission handles are driven by
/// the runtime this is called from.
///
/// # Panics
/// Panics if called outside of a Tokio runtime.
pub fn new_dispatcher<T: Transport>(
    transport: T,
    registry: EndpointRegistry,
    config: ExchangeConfig,
) -> (Dispatcher, EventLoop<T>) {
    let (sender, receiver) = mpsc::unbounded();
    let dispatcher = Dispatcher { sender, next_id: Arc::new(AtomicU64::new(1)), runtime: Handle::current() };
    (dispatcher, EventLoop::new(transport, registry, config, receiver))
}

/// The submitting side of the dispatcher. Cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<DispatcherCommand>,
    next_id: Arc<AtomicU64>,
    runtime: Handle,
}

impl Dispatcher {
    /// Queue `command` for execution. Never blocks and never fails; problems are reported through the handle.
    pub fn submit(&self, command: CommandEnvelope) -> SubmissionHandle<Value> {
        self.enqueue(command, None)
    }

    /// Like [`submit`](Self::submit), but `check` validates the decoded reply on the dispatcher before it is delivered.
    /// A rejected reply is logged and reported like any other failed exchange.
    pub fn submit_checked<F>(&self, command: CommandEnvelope, check: F) -> SubmissionHandle<Value>
    where
        F: FnOnce(Value) -> Result<Value, DispatchError> + Send + 'static,
    {
        self.enqueue(command, Some(Box::new(check)))
    }

    fn enqueue(&self, command: CommandEnvelope, check: Option<ReplyCheck>) -> SubmissionHandle<Value> {
        let id = SubmissionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (completer, handle) = completion(id, self.runtime.clone());
        let register = command.register.clone();
        let submission = Submission { id, command, check, completer };
        match self.sender.unbounded_send(DispatcherCommand::Submit(submission)) {
            Ok(()) => {
                trace!("Submission {id} queued for {register}");
                handle
            }
            Err(err) => {
                warn!("Submission {id} for {register} was rejected. The dispatcher has stopped.");
                // The completer travels back inside the error. Resolving it here keeps the handle consistent.
                if let DispatcherCommand::Submit(submission) = err.into_inner() {
                    submission.completer.resolve(Err(DispatchError::ExecutorStopped));
                    handle
                } else {
                    failed(id, DispatchError::ExecutorStopped, self.runtime.clone())
                }
            }
        }
    }

    /// Ask the event loop to stop. Everything submitted before this call still runs; anything that races in
    /// afterwards resolves with [`DispatchError::ExecutorStopped`]. Returns how many were rejected that way.
    pub async fn stop(&self) -> usize {
        let (ack, rx) = oneshot::channel();
        if self.sender.unbounded_send(DispatcherCommand::Stop(ack)).is_err() {
            debug!("Dispatcher was already stopped");
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}
