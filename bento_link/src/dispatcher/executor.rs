use crate::config::ExchangeConfig;
use crate::dispatcher::client::{new_dispatcher, Dispatcher};
use crate::transport::Transport;
use libbento::EndpointRegistry;
use log::*;
use std::future::Future;
use std::io;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::runtime::Handle;

const DISPATCH_THREAD_NAME: &str = "bento-dispatch";

/// Owns the dispatcher thread.
///
/// All network exchanges happen on this thread's runtime. Callers only ever see a [`Dispatcher`], so they never block
/// on the network themselves.
pub struct BackgroundExecutor {
    dispatcher: Dispatcher,
    runtime: Handle,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundExecutor {
    pub fn start<T: Transport>(transport: T, registry: EndpointRegistry, config: ExchangeConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (dispatcher, event_loop) = {
            let _guard = runtime.enter();
            new_dispatcher(transport, registry, config)
        };
        let (started_tx, started_rx) = mpsc::channel();
        let thread = std::thread::Builder::new().name(DISPATCH_THREAD_NAME.into()).spawn(move || {
            let _ = started_tx.send(());
            runtime.block_on(event_loop.run());
            // Reactions to the last few submissions still need a turn
            runtime.block_on(tokio::task::yield_now());
            // Let sequences spawned on this runtime see the stop before the runtime goes away
            runtime.shutdown_background();
        })?;
        started_rx.recv().map_err(|_| io::Error::other("The dispatcher thread died during start-up"))?;
        info!("Background executor started");
        Ok(Self { dispatcher, runtime: handle, thread: Some(thread) })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Run `future` on the dispatcher thread. Multi-step sequences that await their own submissions go here, so the
    /// caller stays responsive while they run.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Stop accepting work, let earlier submissions finish and join the thread. Returns how many late submissions were
    /// rejected.
    pub fn stop(mut self) -> usize {
        let rejected = futures::executor::block_on(self.dispatcher.stop());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("The dispatcher thread panicked");
            }
        }
        info!("Background executor stopped");
        rejected
    }
}

impl Drop for BackgroundExecutor {
    fn drop(&mut self) {
        if self.thread.is_some() {
            // Don't join here. The thread winds down on its own once the stop is processed.
            let dispatcher = self.dispatcher.clone();
            std::mem::drop(self.runtime.spawn(async move {
                dispatcher.stop().await;
            }));
        }
    }
}
