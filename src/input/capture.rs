//! One-shot capture requests used during interactive rebinding.
//!
//! Each rebind attempt arms one [`CaptureRequest`] per input source. The
//! request is single-use and tied to its attempt by `Arc` identity: a source
//! can only deliver into the request currently installed in its
//! [`CaptureSlot`], and a stale waiter cleaning up after itself cannot disarm
//! a successor request that was armed in the meantime.

use crate::binding::Binding;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single rebind attempt's wait state for one input source.
pub struct CaptureRequest {
    state: Mutex<CaptureState>,
    signal: Condvar,
}

struct CaptureState {
    armed: bool,
    result: Option<Binding>,
}

impl CaptureRequest {
    fn new() -> Self {
        Self {
            state: Mutex::new(CaptureState {
                armed: true,
                result: None,
            }),
            signal: Condvar::new(),
        }
    }

    /// Deliver a detected input. Returns false when the request already
    /// completed or was cancelled; the result is written at most once.
    pub fn fulfill(&self, binding: Binding) -> bool {
        let mut state = self.state.lock();
        if !state.armed {
            return false;
        }
        state.armed = false;
        state.result = Some(binding);
        self.signal.notify_all();
        true
    }

    /// Disarm without a result, waking the waiter. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if state.armed {
            state.armed = false;
            self.signal.notify_all();
        }
    }

    /// Block until the request is fulfilled, cancelled, or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<Binding> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.armed {
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.armed = false;
        state.result.take()
    }
}

/// The per-source holder for the currently armed capture request, if any.
///
/// Lock order is slot before request; `CaptureRequest::wait` takes only the
/// request lock, so a waiter never holds the slot.
#[derive(Default)]
pub struct CaptureSlot {
    active: Mutex<Option<Arc<CaptureRequest>>>,
}

impl CaptureSlot {
    /// Install a fresh request, cancelling any request left armed by a
    /// previous attempt.
    pub fn arm(&self) -> Arc<CaptureRequest> {
        let request = Arc::new(CaptureRequest::new());
        let stale = self.active.lock().replace(Arc::clone(&request));
        if let Some(stale) = stale {
            stale.cancel();
        }
        request
    }

    /// Remove `request` if it is still the installed one, then cancel it.
    /// Pointer identity keeps a stale caller from disarming a successor.
    pub fn disarm(&self, request: &Arc<CaptureRequest>) {
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|r| Arc::ptr_eq(r, request)) {
                *active = None;
            }
        }
        request.cancel();
    }

    /// Cancel and remove whatever request is installed. Idempotent.
    pub fn cancel_active(&self) {
        let request = self.active.lock().take();
        if let Some(request) = request {
            request.cancel();
        }
    }

    /// Deliver a detected input to the installed request, consuming it.
    /// Returns true when the input was captured (and so must not be
    /// dispatched as a normal hotkey).
    pub fn try_fulfill(&self, binding: Binding) -> bool {
        let mut active = self.active.lock();
        match active.take() {
            Some(request) => request.fulfill(binding),
            None => false,
        }
    }

    /// True while a capture request is installed.
    pub fn is_armed(&self) -> bool {
        self.active.lock().is_some()
    }
}
