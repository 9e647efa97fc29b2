//! The one-shot link between a submission and whoever is interested in its result.
//!
//! The event loop holds the [`Completer`]; the caller holds the [`SubmissionHandle`]. Exactly one outcome passes
//! from one to the other over a oneshot channel. The caller can either await the handle, block on it, or attach a
//! reaction that is posted to its own [`CallerContext`] once the outcome is known.

use crate::caller::CallerContext;
use crate::errors::DispatchError;
use futures::channel::oneshot;
use futures::FutureExt;
use log::*;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::runtime::Handle;

pub type Outcome = Result<Value, DispatchError>;
type Transform<T> = Box<dyn FnOnce(Value) -> T + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

impl Display for SubmissionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Create a linked completer / handle pair for submission `id`. Reactions attached to the handle wait on `runtime`.
pub(crate) fn completion(id: SubmissionId, runtime: Handle) -> (Completer, SubmissionHandle<Value>) {
    let (sender, receiver) = oneshot::channel();
    let completer = Completer { id, sender };
    let handle = SubmissionHandle { id, receiver, transform: Some(Box::new(|value| value)), runtime };
    (completer, handle)
}

/// The resolving half. Dropping it unresolved resolves the submission with [`DispatchError::ExecutorStopped`].
pub(crate) struct Completer {
    id: SubmissionId,
    sender: oneshot::Sender<Outcome>,
}

impl Completer {
    pub fn resolve(self, outcome: Outcome) {
        let id = self.id;
        match self.sender.send(outcome) {
            Ok(()) => {}
            Err(Ok(_)) => warn!("Submission {id} completed but nobody holds its handle. Result discarded."),
            // Failures are logged where they happen
            Err(Err(err)) => debug!("Submission {id} failed and nobody holds its handle. {err}"),
        }
    }
}

/// The caller's view of a submitted command.
///
/// The handle resolves exactly once, to the decoded reply (possibly transformed by [`map`](Self::map)) or to a
/// [`DispatchError`]. Every error a handle can carry has already been logged by the dispatcher, so dropping the handle
/// or ignoring its errors never hides a failure. Dropping the handle does not cancel the command.
#[must_use = "a submission handle does nothing unless awaited or given a reaction"]
pub struct SubmissionHandle<T> {
    id: SubmissionId,
    receiver: oneshot::Receiver<Outcome>,
    transform: Option<Transform<T>>,
    runtime: Handle,
}

impl<T: Send + 'static> SubmissionHandle<T> {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    /// Transform the successful outcome. `f` runs wherever the outcome is delivered.
    pub fn map<U, F>(mut self, f: F) -> SubmissionHandle<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let transform = self.transform.take().map(|inner| -> Transform<U> { Box::new(move |value| f(inner(value))) });
        SubmissionHandle { id: self.id, receiver: self.receiver, transform, runtime: self.runtime }
    }

    /// Block the current thread until the outcome is known.
    ///
    /// Never call this from the dispatcher's own thread; the submission could then never run.
    pub fn wait_blocking(self) -> Result<T, DispatchError> {
        futures::executor::block_on(self)
    }

    /// Post `f` to `ctx` together with the outcome once it is known.
    pub fn on_result<S, F>(mut self, ctx: &CallerContext<S>, f: F)
    where
        S: 'static,
        F: FnOnce(&mut S, Result<T, DispatchError>) + Send + 'static,
    {
        let ctx = ctx.clone();
        let deliver = move |outcome: Result<T, DispatchError>| {
            ctx.run_later(move |state| f(state, outcome));
        };
        match self.receiver.try_recv() {
            Ok(None) => {
                let runtime = self.runtime.clone();
                drop(runtime.spawn(async move { deliver(self.await) }));
            }
            Ok(Some(outcome)) => {
                let outcome = self.finish(Ok(outcome));
                deliver(outcome);
            }
            Err(canceled) => {
                let outcome = self.finish(Err(canceled));
                deliver(outcome);
            }
        }
    }

    /// Post `f` to `ctx` if the submission succeeds. Failures are only logged, as they always are.
    pub fn on_complete<S, F>(self, ctx: &CallerContext<S>, f: F)
    where
        S: 'static,
        F: FnOnce(&mut S, T) + Send + 'static,
    {
        let id = self.id;
        self.on_result(ctx, move |state, outcome| match outcome {
            Ok(value) => f(state, value),
            Err(err) => debug!("Submission {id} has no error reaction. {err}"),
        });
    }

    /// Post `f` to `ctx` if the submission fails.
    pub fn on_error<S, F>(self, ctx: &CallerContext<S>, f: F)
    where
        S: 'static,
        F: FnOnce(&mut S, DispatchError) + Send + 'static,
    {
        self.on_result(ctx, move |state, outcome| {
            if let Err(err) = outcome {
                f(state, err)
            }
        });
    }

    /// [`on_complete`](Self::on_complete) and [`on_error`](Self::on_error) in one go.
    pub fn react<S, C, E>(self, ctx: &CallerContext<S>, on_complete: C, on_error: E)
    where
        S: 'static,
        C: FnOnce(&mut S, T) + Send + 'static,
        E: FnOnce(&mut S, DispatchError) + Send + 'static,
    {
        self.on_result(ctx, move |state, outcome| match outcome {
            Ok(value) => on_complete(state, value),
            Err(err) => on_error(state, err),
        });
    }
}

impl<T> SubmissionHandle<T> {
    fn finish(&mut self, received: Result<Outcome, oneshot::Canceled>) -> Result<T, DispatchError> {
        let outcome = received.unwrap_or_else(|_| {
            warn!("Submission {} was dropped by the dispatcher before it ran", self.id);
            Err(DispatchError::ExecutorStopped)
        });
        let transform = self.transform.take();
        outcome.and_then(|value| transform.map(|f| f(value)).ok_or(DispatchError::ExecutorStopped))
    }
}

impl<T> Future for SubmissionHandle<T> {
    type Output = Result<T, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = ready!(self.receiver.poll_unpin(cx));
        Poll::Ready(self.finish(received))
    }
}

/// A handle that is already resolved with `err`.
pub(crate) fn failed(id: SubmissionId, err: DispatchError, runtime: Handle) -> SubmissionHandle<Value> {
    let (completer, handle) = completion(id, runtime);
    completer.resolve(Err(err));
    handle
}
