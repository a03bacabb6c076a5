//! Per-root debounce: many raw events, one quiescence callback.
//!
//! Each coalescer is a tokio task holding a single resettable deadline.
//! Every [`CoalescerHandle::notify`] pushes the deadline back by the
//! configured delay; when it expires the callback runs and is awaited
//! before the next window can open, so callbacks never overlap.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Cheap, cloneable trigger for one coalescer.
#[derive(Debug, Clone)]
pub struct CoalescerHandle {
    tx: mpsc::Sender<()>,
}

impl CoalescerHandle {
    /// Signal that something changed. Never blocks.
    ///
    /// Safe to call from non-async threads such as the OS watch callback.
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::trace!("Coalescer stopped, dropping notification");
            }
        }
    }
}

/// A running debounce task.
///
/// Dropping it cancels the task; a callback already running completes.
#[derive(Debug)]
pub struct DebounceCoalescer {
    handle: CoalescerHandle,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DebounceCoalescer {
    /// Spawn a coalescer that calls `on_quiescence` after `delay` of quiet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(delay: Duration, cancel: CancellationToken, on_quiescence: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // one slot is enough: a queued signal already guarantees a new window
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run(delay, rx, cancel.clone(), on_quiescence));

        Self {
            handle: CoalescerHandle { tx },
            cancel,
            task: Some(task),
        }
    }

    /// Trigger handle for routing raw events.
    #[must_use]
    pub fn handle(&self) -> CoalescerHandle {
        self.handle.clone()
    }

    /// Shorthand for `handle().notify()`.
    pub fn notify(&self) {
        self.handle.notify();
    }

    /// Cancel any pending window.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to exit, including a running callback.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Coalescer task ended abnormally");
            }
        }
    }
}

impl Drop for DebounceCoalescer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<F, Fut>(
    delay: Duration,
    mut rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    mut on_quiescence: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        // idle until the first event of a burst
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            msg = rx.recv() => {
                if msg.is_none() {
                    return;
                }
            }
        }

        let deadline = sleep(delay);
        tokio::pin!(deadline);
        let mut closed = false;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                msg = rx.recv(), if !closed => match msg {
                    Some(()) => deadline.as_mut().reset(Instant::now() + delay),
                    None => closed = true,
                },
                () = &mut deadline => break,
            }
        }

        tracing::trace!("Quiet period elapsed");
        on_quiescence().await;

        if closed {
            return;
        }
    }
}
