#![forbid(unsafe_code)]

//! Dedicated delivery thread.
//!
//! [`DispatcherThread`] owns a named thread that runs posted tasks one at a
//! time, in posting order. Its [`DispatcherHandle`] is the
//! [`DeliveryContext`] handed to notification buses: `is_current` is true only
//! on the dispatcher thread, and `post` enqueues without blocking.
//!
//! # Failure Isolation
//!
//! Every task runs under `catch_unwind`. A panicking task is logged and
//! reported as [`BusError::HandlerFailure`] on a bounded error channel; the
//! loop then continues with the next task. The caller polls
//! [`DispatcherThread::check_error`] to observe failures. When the error
//! channel is full, further failures are only logged.
//!
//! # Shutdown
//!
//! [`DispatcherThread::shutdown`] (or drop) raises a stop flag, enqueues a
//! shutdown marker and joins the thread. Tasks still queued when the flag goes
//! up run when `drain_on_shutdown` is set and are discarded otherwise. Tasks
//! posted once the flag is up are dropped with a warning, as are any that
//! reach the channel behind the shutdown marker.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use wbus_core::{BusError, DeliveryContext, Task};

use crate::config::DispatcherConfig;

/// Messages sent to the dispatcher thread.
enum DispatchMsg {
    Run(Task),
    Shutdown,
}

/// Cloneable delivery context backed by a [`DispatcherThread`].
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<DispatchMsg>,
    thread_id: ThreadId,
    stopping: Arc<AtomicBool>,
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl DispatcherHandle {
    /// Id of the dispatcher thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl DeliveryContext for DispatcherHandle {
    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn post(&self, task: Task) {
        if self.stopping.load(Ordering::SeqCst) {
            tracing::warn!("dispatcher shutting down; dropping posted task");
            return;
        }
        if self.sender.send(DispatchMsg::Run(task)).is_err() {
            tracing::warn!("dispatcher shut down; dropping posted task");
        }
    }
}

/// A named thread that runs posted notification deliveries.
pub struct DispatcherThread {
    handle: DispatcherHandle,
    join: Option<JoinHandle<()>>,
    error_rx: mpsc::Receiver<BusError>,
}

impl std::fmt::Debug for DispatcherThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherThread")
            .field("thread_id", &self.handle.thread_id)
            .field("running", &self.join.is_some())
            .finish()
    }
}

impl DispatcherThread {
    /// Spawn the dispatcher thread.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the OS refuses to create the thread, or
    /// `InvalidInput` if `config` fails validation.
    pub fn start(config: &DispatcherConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let (tx, rx) = mpsc::channel::<DispatchMsg>();
        let (err_tx, err_rx) = mpsc::sync_channel::<BusError>(config.error_capacity);
        let drain = config.drain_on_shutdown;
        let stopping = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stopping);

        let join = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || dispatch_loop(rx, err_tx, &stop_flag, drain))?;
        let thread_id = join.thread().id();
        tracing::debug!(thread = %config.thread_name, "dispatcher started");

        Ok(Self {
            handle: DispatcherHandle {
                sender: tx,
                thread_id,
                stopping,
            },
            join: Some(join),
            error_rx: err_rx,
        })
    }

    /// A cloneable handle usable as a delivery context.
    #[must_use]
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// The handle as a shareable trait object, ready for a bus constructor.
    #[must_use]
    pub fn context(&self) -> Arc<dyn DeliveryContext> {
        Arc::new(self.handle.clone())
    }

    /// Id of the dispatcher thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.handle.thread_id
    }

    /// Take the oldest unreported handler failure, if any.
    pub fn check_error(&self) -> Option<BusError> {
        self.error_rx.try_recv().ok()
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.stopping.store(true, Ordering::SeqCst);
        let _ = self.handle.sender.send(DispatchMsg::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("dispatcher thread exited by panic");
            }
        }
    }
}

impl Drop for DispatcherThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    rx: mpsc::Receiver<DispatchMsg>,
    err_tx: mpsc::SyncSender<BusError>,
    stopping: &AtomicBool,
    drain_on_shutdown: bool,
) {
    let mut discarded = 0usize;
    while let Ok(msg) = rx.recv() {
        match msg {
            DispatchMsg::Run(task) => {
                if !drain_on_shutdown && stopping.load(Ordering::SeqCst) {
                    discarded += 1;
                } else {
                    run_task(task, &err_tx);
                }
            }
            DispatchMsg::Shutdown => break,
        }
    }
    let late = rx
        .try_iter()
        .filter(|msg| matches!(msg, DispatchMsg::Run(_)))
        .count();
    if late > 0 {
        tracing::warn!(late, "dispatcher stopped; dropping tasks posted after shutdown");
    }
    if discarded > 0 {
        tracing::debug!(discarded, "dispatcher discarded queued tasks on shutdown");
    }
    tracing::debug!("dispatcher stopped");
}

fn run_task(task: Task, err_tx: &mpsc::SyncSender<BusError>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
        let err = BusError::from_panic(payload.as_ref());
        tracing::error!(error = %err, "posted delivery panicked");
        let _ = err_tx.try_send(err);
    }
}
