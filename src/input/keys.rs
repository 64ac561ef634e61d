//! Keyboard input source: push-driven by a [`KeyHookBackend`].
//!
//! Unlike the pad source there is no polling tick; the backend delivers
//! key-down events from its own thread and dispatch happens inline in that
//! context, so callback panics are isolated per hook invocation. The hook
//! registry is owned by the `KeySource` instance rather than being process
//! global, which keeps multiple instances (tests in particular) from
//! colliding.

use crate::binding::Binding;
use crate::error::Result;
use crate::input::capture::{CaptureRequest, CaptureSlot};
use crate::input::ActionCallback;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives key-down names from the backend's delivery context.
pub type KeySink = Arc<dyn Fn(&str) + Send + Sync>;

/// Platform seam for global key-down delivery.
///
/// `install` begins delivery into `sink` (idempotent per source lifecycle);
/// `remove` stops delivery. Implementations own whatever thread the
/// underlying hook mechanism requires.
pub trait KeyHookBackend: Send + Sync {
    fn install(&self, sink: KeySink) -> Result<()>;
    fn remove(&self);
}

/// In-memory backend for tests: `emit` plays the role of the hook thread
/// and delivers synchronously.
#[derive(Default)]
pub struct ScriptedKeyBackend {
    sink: Mutex<Option<KeySink>>,
}

impl ScriptedKeyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one key-down as the hook mechanism would.
    pub fn emit(&self, key: &str) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(key);
        }
    }
}

impl KeyHookBackend for ScriptedKeyBackend {
    fn install(&self, sink: KeySink) -> Result<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn remove(&self) {
        *self.sink.lock() = None;
    }
}

struct KeyShared {
    hooks: Mutex<HashMap<String, ActionCallback>>,
    capture: CaptureSlot,
}

impl KeyShared {
    /// Runs on the backend's delivery thread for every key-down.
    fn on_key_down(&self, key: &str) {
        debug!("key press: {key}");
        if self.capture.try_fulfill(Binding::key(key)) {
            return;
        }

        // Clone out of the map so the lock is not held across the callback.
        let callback = self.hooks.lock().get(key).cloned();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("hotkey callback for key binding '{key}' panicked");
            }
        }
    }
}

/// Keyboard input source with the same two-mode contract as the pad source.
pub struct KeySource {
    backend: Arc<dyn KeyHookBackend>,
    shared: Arc<KeyShared>,
    started: AtomicBool,
}

impl KeySource {
    pub fn new(backend: Arc<dyn KeyHookBackend>) -> Self {
        Self {
            backend,
            shared: Arc::new(KeyShared {
                hooks: Mutex::new(HashMap::new()),
                capture: CaptureSlot::default(),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Install the backend hook if not already installed. Idempotent; a
    /// failing backend is logged and leaves the source inert, never fatal.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let sink: KeySink = Arc::new(move |key| shared.on_key_down(key));
        if let Err(err) = self.backend.install(sink) {
            error!("keyboard hook installation failed: {err}");
            self.started.store(false, Ordering::SeqCst);
        }
    }

    /// Remove the backend hook. Idempotent.
    pub fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.backend.remove();
        }
    }

    /// Wire a key binding to a callback for normal-mode dispatch.
    pub fn register(&self, binding: &Binding, callback: ActionCallback) {
        match binding {
            Binding::Key(name) => {
                self.shared.hooks.lock().insert(name.clone(), callback);
            }
            Binding::Pad(_) => warn!("ignoring non-key binding '{binding}' on key source"),
        }
    }

    /// Remove a key binding from normal-mode dispatch. No-op when absent.
    pub fn unregister(&self, binding: &Binding) {
        if let Binding::Key(name) = binding {
            self.shared.hooks.lock().remove(name);
        }
    }

    /// Block until the next key-down or until `timeout` elapses. While armed
    /// the capture intercepts every key, bound or not; the intercept is
    /// removed unconditionally before returning.
    pub fn arm_capture(&self, timeout: Duration) -> Option<Binding> {
        let request = self.begin_capture();
        self.wait_capture(request, timeout)
    }

    /// Arm capture mode and hand back the request identifying this attempt.
    pub fn begin_capture(&self) -> Arc<CaptureRequest> {
        self.shared.capture.arm()
    }

    /// Block on a request from `begin_capture`, removing the intercept
    /// unconditionally before returning.
    pub fn wait_capture(&self, request: Arc<CaptureRequest>, timeout: Duration) -> Option<Binding> {
        let result = request.wait(timeout);
        self.shared.capture.disarm(&request);
        result
    }

    /// Cancel one specific attempt's capture. A successor attempt's armed
    /// request is left untouched; cancelling a completed or already
    /// cancelled request is a no-op.
    pub fn end_capture(&self, request: &Arc<CaptureRequest>) {
        self.shared.capture.disarm(request);
    }

    /// Disarm whatever capture is in flight. Idempotent.
    pub fn cancel_capture(&self) {
        self.shared.capture.cancel_active();
    }

    /// True while a rebind capture is armed on this source (the UI's
    /// "listening" indicator).
    pub fn capture_armed(&self) -> bool {
        self.shared.capture.is_armed()
    }
}

impl Drop for KeySource {
    fn drop(&mut self) {
        self.stop();
    }
}
