//! Interactive rebind orchestration.
//!
//! One rebind attempt walks Idle -> Racing -> Resolving -> Done: both input
//! sources arm their one-shot capture on blocking workers, the first
//! completion wins, the loser is cancelled before the result is applied, and
//! the caller's completion callback fires exactly once on the scheduler's
//! loop thread. The entry point returns immediately; the caller is typically
//! a real-time game-tick loop that must never block.
//!
//! Policy for a second request while one is racing: cancel-and-replace
//! (last request wins). The superseded attempt cancels its captures and
//! reports `None` through its own completion callback so a UI prompt tied
//! to it can close.

use crate::action::Action;
use crate::binding::Binding;
use crate::input::{KeySource, PadSource};
use crate::registry::HotkeyRegistry;
use crate::scheduler::{Scheduler, TaskOutcome};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long a rebind listens before giving up, unless the caller overrides.
pub const DEFAULT_REBIND_TIMEOUT: Duration = Duration::from_secs(10);

/// Observable progress of the most recent rebind attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindPhase {
    Idle,
    Racing,
    Resolving,
    Done,
}

/// Orchestrates interactive rebinds on top of the registry and scheduler.
pub struct RebindCoordinator {
    registry: Arc<HotkeyRegistry>,
    scheduler: Arc<Scheduler>,
    active: Mutex<Option<CancellationToken>>,
    phase: Arc<Mutex<RebindPhase>>,
}

impl RebindCoordinator {
    pub fn new(registry: Arc<HotkeyRegistry>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            registry,
            scheduler,
            active: Mutex::new(None),
            phase: Arc::new(Mutex::new(RebindPhase::Idle)),
        }
    }

    /// Phase of the most recent attempt (the replacement, once superseded).
    pub fn phase(&self) -> RebindPhase {
        *self.phase.lock()
    }

    /// Begin listening on both sources for the next press and bind it to
    /// `action`. Returns immediately; the race runs on the background
    /// scheduler and `on_complete` fires exactly once with the captured
    /// binding, or `None` on timeout, cancellation, or device failure.
    pub fn start_interactive_rebind(
        &self,
        action: Action,
        timeout: Duration,
        on_complete: impl FnOnce(Action, Option<Binding>) + Send + 'static,
    ) {
        let token = CancellationToken::new();
        {
            let mut active = self.active.lock();
            if let Some(previous) = active.replace(token.clone()) {
                debug!("superseding in-flight rebind (last request wins)");
                previous.cancel();
            }
        }
        *self.phase.lock() = RebindPhase::Racing;
        info!("listening for a pad or key press to bind '{action}'");

        let registry = Arc::clone(&self.registry);
        let pad = Arc::clone(registry.pad());
        let keys = Arc::clone(registry.keys());
        let phase = Arc::clone(&self.phase);

        let handle = self.scheduler.schedule(async move {
            // A replacement may have cancelled this attempt before the task
            // ever ran; arming in that state would stale-cancel the
            // replacement's own captures, so never arm at all.
            let captured = if token.is_cancelled() {
                None
            } else {
                race_captures(&pad, &keys, timeout, &token).await
            };

            let current = !token.is_cancelled();
            if current {
                *phase.lock() = RebindPhase::Resolving;
            }

            if let Some(binding) = captured.clone() {
                let apply = AssertUnwindSafe(|| registry.add_binding(action, binding));
                if catch_unwind(apply).is_err() {
                    error!("applying rebind result for '{action}' panicked");
                }
            } else {
                info!("rebind for '{action}' ended without a capture");
            }

            let callback = AssertUnwindSafe(move || on_complete(action, captured));
            if catch_unwind(callback).is_err() {
                error!("rebind completion callback for '{action}' panicked");
            }

            if current {
                *phase.lock() = RebindPhase::Done;
            }
        });

        // A panic escaping the task body is already a bug; surface it in the
        // log rather than letting the handle swallow it silently.
        handle.on_complete(|outcome: &TaskOutcome<()>| {
            if let TaskOutcome::Panicked(message) = outcome {
                error!("rebind task panicked: {message}");
            }
        });
    }

    /// Cancel the in-flight rebind, if any. Its completion callback still
    /// fires, with `None`. Idempotent.
    pub fn cancel_rebind(&self) {
        if let Some(token) = self.active.lock().take() {
            token.cancel();
        }
    }
}

/// First-completed-wins race between the two sources' captures.
///
/// Each wait runs on its own blocking worker. Cancellation goes through the
/// capture requests armed *here*, never through "whatever the source is
/// capturing now": a replacement rebind may already have armed fresh
/// requests on the same sources by the time this attempt observes its own
/// cancellation, and those must not be touched. The loser is disarmed
/// before this returns, so its late result can only land in a consumed
/// request and never leaks into the registry or into a future attempt.
async fn race_captures(
    pad: &Arc<PadSource>,
    keys: &Arc<KeySource>,
    timeout: Duration,
    token: &CancellationToken,
) -> Option<Binding> {
    let pad_request = pad.begin_capture();
    let keys_request = keys.begin_capture();

    let pad_wait = {
        let pad = Arc::clone(pad);
        let request = Arc::clone(&pad_request);
        tokio::task::spawn_blocking(move || pad.wait_capture(request, timeout))
    };
    let keys_wait = {
        let keys = Arc::clone(keys);
        let request = Arc::clone(&keys_request);
        tokio::task::spawn_blocking(move || keys.wait_capture(request, timeout))
    };

    tokio::select! {
        result = pad_wait => {
            keys.end_capture(&keys_request);
            flatten_wait(result)
        }
        result = keys_wait => {
            pad.end_capture(&pad_request);
            flatten_wait(result)
        }
        _ = token.cancelled() => {
            pad.end_capture(&pad_request);
            keys.end_capture(&keys_request);
            None
        }
    }
}

fn flatten_wait(result: Result<Option<Binding>, tokio::task::JoinError>) -> Option<Binding> {
    result.unwrap_or_else(|err| {
        error!("capture worker failed: {err}");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ScriptedKeyBackend, ScriptedPadDriver};
    use std::sync::mpsc;
    use std::time::Instant;

    struct Fixture {
        backend: Arc<ScriptedKeyBackend>,
        registry: Arc<HotkeyRegistry>,
        scheduler: Arc<Scheduler>,
        coordinator: RebindCoordinator,
    }

    fn fixture() -> Fixture {
        let driver = ScriptedPadDriver::new();
        let backend = ScriptedKeyBackend::new();
        let pad = Arc::new(PadSource::with_poll_interval(
            driver,
            Duration::from_millis(2),
        ));
        let keys = Arc::new(KeySource::new(backend.clone()));
        let registry = Arc::new(HotkeyRegistry::new(pad, keys));
        registry.start();
        let scheduler = Arc::new(Scheduler::new());
        let coordinator = RebindCoordinator::new(Arc::clone(&registry), Arc::clone(&scheduler));
        Fixture {
            backend,
            registry,
            scheduler,
            coordinator,
        }
    }

    #[test]
    fn phase_walks_to_done() {
        let fx = fixture();
        assert_eq!(fx.coordinator.phase(), RebindPhase::Idle);

        let (tx, rx) = mpsc::channel();
        fx.coordinator.start_interactive_rebind(
            Action::ResetShot,
            Duration::from_millis(30),
            move |_, result| {
                let _ = tx.send(result);
            },
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), None);

        let deadline = Instant::now() + Duration::from_secs(2);
        while fx.coordinator.phase() != RebindPhase::Done {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        fx.registry.stop();
        fx.scheduler.stop();
    }

    #[test]
    fn replacement_cancels_the_previous_attempt() {
        let fx = fixture();
        let (first_tx, first_rx) = mpsc::channel();
        fx.coordinator.start_interactive_rebind(
            Action::ResetShot,
            Duration::from_secs(30),
            move |_, result| {
                let _ = first_tx.send(result);
            },
        );

        let (second_tx, second_rx) = mpsc::channel();
        fx.coordinator.start_interactive_rebind(
            Action::ToggleTimeout,
            Duration::from_secs(30),
            move |_, result| {
                let _ = second_tx.send(result);
            },
        );

        // The superseded attempt reports None through its own callback.
        assert_eq!(first_rx.recv_timeout(Duration::from_secs(5)).unwrap(), None);

        // The replacement is still racing and wins with the key press.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !fx.registry.keys().capture_armed() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        fx.backend.emit("f9");
        assert_eq!(
            second_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(Binding::key("f9"))
        );
        assert_eq!(
            fx.registry.get_bindings(Action::ToggleTimeout),
            vec![Binding::key("f9")]
        );
        assert!(fx.registry.get_bindings(Action::ResetShot).is_empty());
        fx.registry.stop();
        fx.scheduler.stop();
    }

    #[test]
    fn cancel_rebind_reports_none_and_is_idempotent() {
        let fx = fixture();
        let (tx, rx) = mpsc::channel();
        fx.coordinator.start_interactive_rebind(
            Action::NextScenario,
            Duration::from_secs(30),
            move |_, result| {
                let _ = tx.send(result);
            },
        );
        fx.coordinator.cancel_rebind();
        fx.coordinator.cancel_rebind();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), None);
        assert!(fx.registry.get_bindings(Action::NextScenario).is_empty());
        fx.registry.stop();
        fx.scheduler.stop();
    }

    #[test]
    fn panicking_completion_callback_is_contained() {
        let fx = fixture();
        let (tx, rx) = mpsc::channel();
        fx.coordinator.start_interactive_rebind(
            Action::ResetShot,
            Duration::from_millis(20),
            |_, _| panic!("ui fell over"),
        );
        // A later rebind still works.
        fx.coordinator.start_interactive_rebind(
            Action::ResetShot,
            Duration::from_millis(20),
            move |_, result| {
                let _ = tx.send(result);
            },
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), None);
        fx.registry.stop();
        fx.scheduler.stop();
    }
}
