//! Shared background execution context.
//!
//! One lazily-started thread runs a tokio current-thread runtime that all
//! long-running or blocking work is deferred to, so nothing in this crate
//! ever blocks the game-tick thread. The scheduler is an explicitly
//! constructed instance owned by the composition root and passed down by
//! reference; there is no process-wide singleton.
//!
//! Blocking functions go through [`Scheduler::run_blocking`], which routes
//! them onto tokio's blocking worker pool so the shared loop itself stays
//! responsive.

use futures::FutureExt;
use log::{debug, error};
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::runtime;
use tokio::sync::oneshot;

/// How a scheduled task ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The task ran to completion.
    Completed(T),
    /// The task panicked; the payload message is captured here instead of
    /// unwinding into unrelated tasks.
    Panicked(String),
    /// The task was cancelled before completing.
    Cancelled,
    /// The scheduler could not run the task at all.
    Failed(String),
}

impl<T> TaskOutcome<T> {
    /// The completed value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

type CompletionCallback<T> = Box<dyn FnOnce(&TaskOutcome<T>) + Send>;

struct HandleState<T> {
    outcome: Option<Arc<TaskOutcome<T>>>,
    callbacks: Vec<CompletionCallback<T>>,
}

/// Handle to one scheduled task: observe completion, or cancel it.
pub struct TaskHandle<T> {
    state: Arc<Mutex<HandleState<T>>>,
    abort: Option<tokio::task::AbortHandle>,
}

impl<T: Send + Sync + 'static> TaskHandle<T> {
    fn spawn_on<F>(handle: &runtime::Handle, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(HandleState {
            outcome: None,
            callbacks: Vec::new(),
        }));
        let task_state = Arc::clone(&state);
        let join = handle.spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => TaskOutcome::Completed(value),
                Err(panic) => TaskOutcome::Panicked(panic_message(panic.as_ref())),
            };
            Self::finish(&task_state, outcome);
        });
        Self {
            state,
            abort: Some(join.abort_handle()),
        }
    }

    fn completed(outcome: TaskOutcome<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                outcome: Some(Arc::new(outcome)),
                callbacks: Vec::new(),
            })),
            abort: None,
        }
    }

    /// First writer wins; later completions (a cancel racing the task's own
    /// finish) are no-ops.
    fn finish(state: &Arc<Mutex<HandleState<T>>>, outcome: TaskOutcome<T>) {
        let (outcome, callbacks) = {
            let mut locked = state.lock();
            if locked.outcome.is_some() {
                return;
            }
            let outcome = Arc::new(outcome);
            locked.outcome = Some(Arc::clone(&outcome));
            (outcome, std::mem::take(&mut locked.callbacks))
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&outcome))).is_err() {
                error!("task completion callback panicked");
            }
        }
    }

    /// Attach a completion callback. Runs on the scheduler's loop thread
    /// when the task finishes, or immediately on the calling thread if the
    /// task already did.
    pub fn on_complete(&self, callback: impl FnOnce(&TaskOutcome<T>) + Send + 'static) {
        let boxed: CompletionCallback<T> = Box::new(callback);
        let ready = {
            let mut state = self.state.lock();
            match state.outcome.clone() {
                Some(outcome) => Some((outcome, boxed)),
                None => {
                    state.callbacks.push(boxed);
                    None
                }
            }
        };
        if let Some((outcome, callback)) = ready {
            callback(&outcome);
        }
    }

    /// Abort the task if it is still running. Cancelling a finished or
    /// already-cancelled task is a no-op.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        Self::finish(&self.state, TaskOutcome::Cancelled);
    }

    /// True once an outcome has been recorded.
    pub fn is_finished(&self) -> bool {
        self.state.lock().outcome.is_some()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic payload of unknown type".to_string()
    }
}

struct LoopHandle {
    handle: runtime::Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// The process's shared background loop, created lazily on first use.
#[derive(Default)]
pub struct Scheduler {
    inner: Mutex<Option<LoopHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the loop thread and runtime if they do not exist yet. Safe to
    /// call redundantly from any thread.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return;
        }

        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = thread::spawn(move || {
            let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(err) => {
                    let _ = handle_tx.send(Err(err.to_string()));
                    return;
                }
            };
            let _ = handle_tx.send(Ok(rt.handle().clone()));
            debug!("background loop started");
            // Drives every spawned task until stop() fires the shutdown signal.
            rt.block_on(async {
                let _ = shutdown_rx.await;
            });
            debug!("background loop exited");
        });

        match handle_rx.recv() {
            Ok(Ok(handle)) => {
                *inner = Some(LoopHandle {
                    handle,
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                });
            }
            Ok(Err(message)) => {
                error!("failed to build background runtime: {message}");
                let _ = thread.join();
            }
            Err(_) => {
                error!("background loop thread died during startup");
                let _ = thread.join();
            }
        }
    }

    /// True while the loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Submit a future to the shared loop from any thread, starting the
    /// loop first if needed. Work scheduled here must not block; use
    /// [`Scheduler::run_blocking`] for anything that does.
    pub fn schedule<F, T>(&self, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.start();
        let inner = self.inner.lock();
        match inner.as_ref() {
            Some(loop_handle) => TaskHandle::spawn_on(&loop_handle.handle, future),
            None => TaskHandle::completed(TaskOutcome::Failed(
                "background loop unavailable".to_string(),
            )),
        }
    }

    /// Run a synchronous, potentially blocking function on a worker thread
    /// so it cannot stall the shared loop.
    pub fn run_blocking<F, T>(&self, function: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.schedule(async move {
            match tokio::task::spawn_blocking(function).await {
                Ok(value) => value,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => std::panic::panic_any(format!("blocking worker lost: {err}")),
            }
        })
    }

    /// Signal the loop to terminate and join its thread. Idempotent; safe
    /// even if the loop never started. Must not be called from a task
    /// running on the loop itself.
    pub fn stop(&self) {
        let loop_handle = self.inner.lock().take();
        if let Some(mut loop_handle) = loop_handle {
            if let Some(shutdown) = loop_handle.shutdown.take() {
                let _ = shutdown.send(());
            }
            if let Some(thread) = loop_handle.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
