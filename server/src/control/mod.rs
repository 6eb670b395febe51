//! Single-writer control context.
//!
//! One tokio task owns the [`Core`] (State Store and Audit Log). Everything
//! else talks to it through a cloneable [`ControlHandle`]: a closure is sent
//! over a bounded channel, runs against `&mut Core` on the control task, and
//! its result comes back over a oneshot. Engine work never runs here.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::audit::AuditLog;
use crate::state::StateStore;

/// Pending jobs before callers start waiting on the channel.
const CHANNEL_CAPACITY: usize = 256;

/// State owned by the control task.
#[derive(Debug)]
pub struct Core {
    pub store: StateStore,
    pub audit: AuditLog,
}

impl Core {
    pub const fn new(store: StateStore, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    /// Flush both stores, logging failures.
    pub fn flush(&self) {
        self.store.persist();
        self.audit.persist();
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Control context is shut down")]
    Closed,

    #[error("Control job was dropped before completing")]
    Dropped,
}

type Job = Box<dyn FnOnce(&mut Core) + Send>;

enum Message {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the control task.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Message>,
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl ControlHandle {
    /// Run `f` on the control task and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ControlError>
    where
        F: FnOnce(&mut Core) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: Job = Box::new(move |core| {
            let _ = reply.send(f(core));
        });
        self.tx
            .send(Message::Run(job))
            .await
            .map_err(|_| ControlError::Closed)?;
        rx.await.map_err(|_| ControlError::Dropped)
    }

    /// Flush both stores and stop the control task.
    ///
    /// Jobs queued before this call still run.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown(done))
            .await
            .map_err(|_| ControlError::Closed)?;
        rx.await.map_err(|_| ControlError::Dropped)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the control task.
///
/// The returned `JoinHandle` resolves to the `Core` once the task stops, so
/// callers can inspect the final state.
pub fn spawn_control(core: Core) -> (ControlHandle, JoinHandle<Core>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(run(core, rx));
    (ControlHandle { tx }, task)
}

async fn run(mut core: Core, mut rx: mpsc::Receiver<Message>) -> Core {
    debug!("Control context started");
    while let Some(message) = rx.recv().await {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(|| job(&mut core))).is_err() {
                    error!("Control job panicked");
                }
            }
            Message::Shutdown(done) => {
                core.flush();
                let _ = done.send(());
                info!("Control context stopped");
                return core;
            }
        }
    }
    // Every handle dropped without an explicit shutdown.
    core.flush();
    core
}

/// Start the periodic flush task.
///
/// Every `interval` both stores are flushed; when `retention_days > 0` the
/// audit log is pruned first. Stops once the control context is gone.
pub fn spawn_autosave_task(
    control: ControlHandle,
    interval: Duration,
    retention_days: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume immediate first tick
        loop {
            ticker.tick().await;
            let result = control
                .call(move |core| {
                    let pruned = core.audit.prune(retention_days);
                    core.flush();
                    pruned
                })
                .await;
            match result {
                Ok(pruned) => debug!(pruned, "Autosave completed"),
                Err(_) => {
                    debug!("Control context gone, stopping autosave");
                    break;
                }
            }
        }
    })
}
