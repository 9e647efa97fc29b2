use crate::config::ExchangeConfig;
use crate::dispatcher::completion::{Completer, Outcome, SubmissionId};
use crate::errors::DispatchError;
use crate::transport::Transport;
use futures::channel::mpsc::UnboundedReceiver;
use futures::channel::oneshot;
use futures::StreamExt;
use libbento::{decode, CommandEnvelope, EndpointRegistry};
use log::*;
use serde_json::Value;

/// Validates a decoded reply before it is handed to the caller.
pub(crate) type ReplyCheck = Box<dyn FnOnce(Value) -> Outcome + Send>;

pub(crate) struct Submission {
    pub id: SubmissionId,
    pub command: CommandEnvelope,
    pub check: Option<ReplyCheck>,
    pub completer: Completer,
}

pub(crate) enum DispatcherCommand {
    Submit(Submission),
    /// Reject whatever arrived after this command and acknowledge with the number of rejected submissions.
    Stop(oneshot::Sender<usize>),
}

/// Executes submissions one at a time, in the order they were submitted.
///
/// The loop ends when a stop command arrives or every [`Dispatcher`](super::Dispatcher) clone has been dropped.
pub struct EventLoop<T: Transport> {
    runner: Runner<T>,
    receiver: UnboundedReceiver<DispatcherCommand>,
}

struct Runner<T: Transport> {
    transport: T,
    registry: EndpointRegistry,
    config: ExchangeConfig,
}

impl<T: Transport> EventLoop<T> {
    pub(crate) fn new(
        transport: T,
        registry: EndpointRegistry,
        config: ExchangeConfig,
        receiver: UnboundedReceiver<DispatcherCommand>,
    ) -> Self {
        Self { runner: Runner { transport, registry, config }, receiver }
    }

    pub async fn run(mut self) {
        debug!("Dispatcher event loop started");
        while let Some(command) = self.receiver.next().await {
            match command {
                DispatcherCommand::Submit(submission) => self.runner.handle_submission(submission).await,
                DispatcherCommand::Stop(ack) => {
                    let rejected = self.shut_down();
                    if ack.send(rejected).is_err() {
                        debug!("Nobody waited for the dispatcher to stop");
                    }
                    break;
                }
            }
        }
        debug!("Dispatcher event loop finished");
    }

    fn shut_down(&mut self) -> usize {
        self.receiver.close();
        let mut rejected = 0;
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                DispatcherCommand::Submit(submission) => {
                    submission.completer.resolve(Err(DispatchError::ExecutorStopped));
                    rejected += 1;
                }
                DispatcherCommand::Stop(ack) => {
                    let _ = ack.send(0);
                }
            }
        }
        if rejected > 0 {
            info!("Dispatcher stopped. {rejected} late submissions were rejected");
        } else {
            info!("Dispatcher stopped");
        }
        rejected
    }
}

impl<T: Transport> Runner<T> {
    async fn handle_submission(&self, submission: Submission) {
        let Submission { id, command, check, completer } = submission;
        trace!("Executing submission {id} on {}", command.register);
        let outcome = match (self.execute(&command).await, check) {
            (Ok(reply), Some(check)) => check(reply),
            (outcome, _) => outcome,
        };
        match &outcome {
            Ok(_) => debug!("Submission {id} ({}) completed", command.register),
            Err(err) => error!("Submission {id} ({}) failed. {err}", command.register),
        }
        completer.resolve(outcome);
    }

    async fn execute(&self, command: &CommandEnvelope) -> Outcome {
        // Read at run time so that a rediscovered controller is picked up by already queued commands.
        let address = self.registry.get().ok_or(DispatchError::EndpointNotSet)?;
        let payload = command.encode()?;
        let reply = self.transport.exchange(&address, &payload, self.config.timeout).await?;
        Ok(decode(&reply)?)
    }
}
