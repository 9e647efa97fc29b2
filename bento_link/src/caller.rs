//! Hand work back to the thread that owns some state.
//!
//! A UI (or any other single-threaded owner of state `S`) creates a [`CallerContext`] / [`CallerLoop`] pair. Other
//! threads post closures through the context; the owner runs them against its state whenever it pumps the loop. This
//! is how submission reactions reach the caller without the caller's state ever being touched from the dispatcher
//! thread.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

pub fn caller_context<S>() -> (CallerContext<S>, CallerLoop<S>) {
    let (sender, receiver) = channel();
    (CallerContext { sender }, CallerLoop { receiver })
}

pub struct CallerContext<S> {
    sender: Sender<Task<S>>,
}

impl<S> Clone for CallerContext<S> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<S> CallerContext<S> {
    /// Queue `task` to run on the owner's next pump. Returns false if the owner has gone away.
    pub fn run_later<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.sender.send(Box::new(task)).is_ok()
    }
}

pub struct CallerLoop<S> {
    receiver: Receiver<Task<S>>,
}

impl<S> CallerLoop<S> {
    /// Run every task queued so far, returning how many ran. Never blocks.
    pub fn run_pending(&self, state: &mut S) -> usize {
        let mut count = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task(state);
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return count,
            }
        }
    }

    /// Run tasks as they arrive for `duration`, returning how many ran. Stops early once every context is gone.
    pub fn run_for(&self, state: &mut S, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut count = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return count + self.run_pending(state);
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok(task) => {
                    task(state);
                    count += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return count,
            }
        }
    }
}
