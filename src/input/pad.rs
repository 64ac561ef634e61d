//! Gamepad input source: a dedicated polling thread over a [`PadDriver`].
//!
//! The driver seam keeps the source testable and backend-agnostic: production
//! builds plug in the gilrs-backed driver (behind the `gamepad` feature),
//! tests use [`ScriptedPadDriver`]. Raw button indices and hat positions are
//! translated to stable names through fixed tables so bindings survive
//! device swaps that preserve the mapping.

use crate::binding::Binding;
use crate::input::capture::{CaptureRequest, CaptureSlot};
use crate::input::ActionCallback;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Polling tick interval; the reference loop runs at 30 Hz.
pub const PAD_POLL_INTERVAL: Duration = Duration::from_millis(33);

/// Identifier for one connected pad, stable while it stays attached.
pub type PadId = u32;

/// Standard SDL game controller button layout.
const BUTTON_NAMES: [&str; 12] = [
    "A",     // Cross on PS, B on Nintendo
    "B",     // Circle on PS, A on Nintendo
    "X",     // Square on PS, Y on Nintendo
    "Y",     // Triangle on PS, X on Nintendo
    "LB",    // L1
    "RB",    // R1
    "Back",  // Select/Share
    "Start", // Start/Options
    "LS",    // L3
    "RS",    // R3
    "Guide", // Home/PS button
    "Misc1", // Share/Capture button
];

/// Stable name for a raw button index.
pub fn button_name(index: u8) -> String {
    match BUTTON_NAMES.get(index as usize) {
        Some(name) => (*name).to_string(),
        None => format!("Button {index}"),
    }
}

/// Stable name for a hat/D-pad position; `(0, 0)` is the released state.
pub fn hat_name(x: i8, y: i8) -> Option<&'static str> {
    match (x, y) {
        (0, 1) => Some("D-Up"),
        (0, -1) => Some("D-Down"),
        (-1, 0) => Some("D-Left"),
        (1, 0) => Some("D-Right"),
        (-1, 1) => Some("D-Up-Left"),
        (1, 1) => Some("D-Up-Right"),
        (-1, -1) => Some("D-Down-Left"),
        (1, -1) => Some("D-Down-Right"),
        _ => None,
    }
}

/// Raw events surfaced by a pad driver on each poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadEvent {
    ButtonDown { pad: PadId, button: u8 },
    ButtonUp { pad: PadId, button: u8 },
    HatMotion { pad: PadId, x: i8, y: i8 },
    Connected { pad: PadId, name: String },
    Disconnected { pad: PadId },
}

/// Device seam for the polling thread: drain whatever happened since the
/// last tick. Implementations must be cheap to poll at 30 Hz.
pub trait PadDriver: Send + Sync {
    fn poll(&self) -> Vec<PadEvent>;
}

/// In-memory driver fed by tests (and the capture replay tooling): events
/// pushed here are drained by the next poll tick.
#[derive(Default)]
pub struct ScriptedPadDriver {
    queue: Mutex<VecDeque<PadEvent>>,
}

impl ScriptedPadDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: PadEvent) {
        self.queue.lock().push_back(event);
    }

    /// Convenience: a full press (down, then up) of one button on pad 0.
    pub fn press_button(&self, button: u8) {
        self.push(PadEvent::ButtonDown { pad: 0, button });
        self.push(PadEvent::ButtonUp { pad: 0, button });
    }
}

impl PadDriver for ScriptedPadDriver {
    fn poll(&self) -> Vec<PadEvent> {
        self.queue.lock().drain(..).collect()
    }
}

/// Shared state between the polling thread and the configuration side.
struct PadShared {
    hotkeys: Mutex<HashMap<String, ActionCallback>>,
    capture: CaptureSlot,
    held: Mutex<HeldState>,
    pads: Mutex<HashMap<PadId, String>>,
}

#[derive(Default)]
struct HeldState {
    buttons: HashSet<(PadId, u8)>,
    hats: HashMap<PadId, (i8, i8)>,
}

impl PadShared {
    fn handle_event(&self, event: PadEvent) {
        match event {
            PadEvent::ButtonDown { pad, button } => {
                self.held.lock().buttons.insert((pad, button));
                self.on_press(button_name(button));
            }
            PadEvent::ButtonUp { pad, button } => {
                self.held.lock().buttons.remove(&(pad, button));
            }
            PadEvent::HatMotion { pad, x, y } => {
                self.held.lock().hats.insert(pad, (x, y));
                if let Some(name) = hat_name(x, y) {
                    self.on_press(name.to_string());
                }
            }
            PadEvent::Connected { pad, name } => {
                info!("pad {pad} connected: {name}");
                self.pads.lock().insert(pad, name);
            }
            PadEvent::Disconnected { pad } => {
                // Bindings referencing this pad stay configured; they simply
                // stop matching until a device with the same mapping returns.
                info!("pad {pad} disconnected");
                self.pads.lock().remove(&pad);
                let mut held = self.held.lock();
                held.buttons.retain(|(p, _)| *p != pad);
                held.hats.remove(&pad);
            }
        }
    }

    fn on_press(&self, name: String) {
        debug!("pad press: {name}");
        if self.capture.try_fulfill(Binding::pad(name.clone())) {
            return;
        }

        // Clone out of the map so the lock is not held across the callback.
        let callback = self.hotkeys.lock().get(&name).cloned();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("hotkey callback for pad binding '{name}' panicked");
            }
        }
    }
}

/// Gamepad input source. `start` spawns the polling thread; `register`
/// wires a binding to a callback for normal dispatch; `arm_capture` is the
/// one-shot rebind listener and must only run on a scheduler worker.
pub struct PadSource {
    driver: Arc<dyn PadDriver>,
    shared: Arc<PadShared>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    poll_interval: Duration,
}

impl PadSource {
    pub fn new(driver: Arc<dyn PadDriver>) -> Self {
        Self::with_poll_interval(driver, PAD_POLL_INTERVAL)
    }

    /// Custom tick interval (useful for tests that cannot wait 33 ms).
    pub fn with_poll_interval(driver: Arc<dyn PadDriver>, poll_interval: Duration) -> Self {
        Self {
            driver,
            shared: Arc::new(PadShared {
                hotkeys: Mutex::new(HashMap::new()),
                capture: CaptureSlot::default(),
                held: Mutex::new(HeldState::default()),
                pads: Mutex::new(HashMap::new()),
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            poll_interval,
        }
    }

    /// Spawn the polling thread if it is not already running. Idempotent.
    pub fn start(&self) {
        let mut slot = self.thread.lock();
        if let Some(handle) = slot.take() {
            if !handle.is_finished() {
                *slot = Some(handle);
                return;
            }
            let _ = handle.join();
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let driver = Arc::clone(&self.driver);
        let shared = Arc::clone(&self.shared);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.poll_interval;
        *slot = Some(thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                for event in driver.poll() {
                    shared.handle_event(event);
                }
                thread::sleep(interval);
            }
        }));
    }

    /// Signal the polling thread to exit and join it. Idempotent.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Wire a pad binding to a callback for normal-mode dispatch.
    pub fn register(&self, binding: &Binding, callback: ActionCallback) {
        match binding {
            Binding::Pad(name) => {
                self.shared.hotkeys.lock().insert(name.clone(), callback);
            }
            Binding::Key(_) => warn!("ignoring non-pad binding '{binding}' on pad source"),
        }
    }

    /// Remove a pad binding from normal-mode dispatch. No-op when absent.
    pub fn unregister(&self, binding: &Binding) {
        if let Binding::Pad(name) = binding {
            self.shared.hotkeys.lock().remove(name);
        }
    }

    /// Block until the next button/hat press or until `timeout` elapses.
    ///
    /// Disarms defensively on every exit path and tolerates an immediate
    /// re-arm afterwards. Runs on a scheduler worker, never on the caller's
    /// real-time thread.
    pub fn arm_capture(&self, timeout: Duration) -> Option<Binding> {
        let request = self.begin_capture();
        self.wait_capture(request, timeout)
    }

    /// Arm capture mode and hand back the request identifying this attempt.
    pub fn begin_capture(&self) -> Arc<CaptureRequest> {
        self.shared.capture.arm()
    }

    /// Block on a request from `begin_capture`, disarming defensively on
    /// every exit path.
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

    /// Disarm whatever capture is in flight so a press arriving later is
    /// dispatched normally instead. Idempotent.
    pub fn cancel_capture(&self) {
        self.shared.capture.cancel_active();
    }

    /// True while a rebind capture is armed on this source (the UI's
    /// "listening" indicator).
    pub fn capture_armed(&self) -> bool {
        self.shared.capture.is_armed()
    }

    /// Names of buttons and hat directions currently held, across all pads.
    pub fn pressed_buttons(&self) -> Vec<String> {
        let held = self.shared.held.lock();
        let mut names: Vec<String> = held
            .buttons
            .iter()
            .map(|(_, button)| button_name(*button))
            .collect();
        names.extend(
            held.hats
                .values()
                .filter_map(|(x, y)| hat_name(*x, *y))
                .map(str::to_string),
        );
        names
    }

    /// Connected pad names keyed by id, for diagnostics.
    pub fn connected_pads(&self) -> HashMap<PadId, String> {
        self.shared.pads.lock().clone()
    }
}

impl Drop for PadSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn fast_source() -> (Arc<ScriptedPadDriver>, PadSource) {
        let driver = ScriptedPadDriver::new();
        let source = PadSource::with_poll_interval(driver.clone(), Duration::from_millis(2));
        (driver, source)
    }

    fn wait_for(pred: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !pred() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn press_dispatches_registered_callback_once() {
        let (driver, source) = fast_source();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        source.register(
            &Binding::pad("Back"),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        source.start();

        driver.press_button(6); // "Back"
        wait_for(|| hits.load(Ordering::SeqCst) == 1);

        // The release and an unbound press must not fire it again.
        driver.press_button(0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        source.stop();
    }

    #[test]
    fn panicking_callback_does_not_kill_the_loop() {
        let (driver, source) = fast_source();
        let hits = Arc::new(AtomicUsize::new(0));
        source.register(&Binding::pad("A"), Arc::new(|| panic!("boom")));
        let counter = Arc::clone(&hits);
        source.register(
            &Binding::pad("B"),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        source.start();

        driver.press_button(0); // panics, is caught
        driver.press_button(1);
        wait_for(|| hits.load(Ordering::SeqCst) == 1);
        source.stop();
    }

    #[test]
    fn armed_capture_swallows_the_press() {
        let (driver, source) = fast_source();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        source.register(
            &Binding::pad("Start"),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        source.start();

        let captured = {
            let driver = driver.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                driver.press_button(7); // "Start"
            });
            source.arm_capture(Duration::from_secs(2))
        };

        assert_eq!(captured, Some(Binding::pad("Start")));
        // Captured press never reached the normal dispatch path.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        source.stop();
    }

    #[test]
    fn hat_motion_is_capturable() {
        let (driver, source) = fast_source();
        source.start();

        let handle = {
            let driver = driver.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                driver.push(PadEvent::HatMotion { pad: 0, x: 0, y: 1 });
            })
        };
        let captured = source.arm_capture(Duration::from_secs(2));
        handle.join().unwrap();

        assert_eq!(captured, Some(Binding::pad("D-Up")));
        source.stop();
    }

    #[test]
    fn capture_times_out_empty_and_rearms_cleanly() {
        let (driver, source) = fast_source();
        source.start();

        assert_eq!(source.arm_capture(Duration::from_millis(20)), None);

        // No leaked armed state: an immediate second capture still works.
        let handle = {
            let driver = driver.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                driver.press_button(2);
            })
        };
        assert_eq!(
            source.arm_capture(Duration::from_secs(2)),
            Some(Binding::pad("X"))
        );
        handle.join().unwrap();
        source.stop();
    }

    #[test]
    fn cancel_capture_wakes_the_waiter_early() {
        let (_driver, source) = fast_source();
        let source = Arc::new(source);
        source.start();

        let canceller = {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                source.cancel_capture();
                source.cancel_capture(); // idempotent
            })
        };
        let started = Instant::now();
        assert_eq!(source.arm_capture(Duration::from_secs(30)), None);
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
        source.stop();
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (_driver, source) = fast_source();
        source.start();
        source.start();
        source.stop();
        source.stop();
        source.start();
        source.stop();
    }

    #[test]
    fn disconnect_clears_held_state_but_not_bindings() {
        let (driver, source) = fast_source();
        source.register(&Binding::pad("A"), Arc::new(|| {}));
        source.start();

        driver.push(PadEvent::Connected {
            pad: 3,
            name: "Test Pad".to_string(),
        });
        driver.push(PadEvent::ButtonDown { pad: 3, button: 0 });
        wait_for(|| source.pressed_buttons() == vec!["A".to_string()]);

        driver.push(PadEvent::Disconnected { pad: 3 });
        wait_for(|| source.pressed_buttons().is_empty());
        assert!(source.connected_pads().is_empty());
        source.stop();
    }

    #[test]
    fn unknown_button_indices_get_fallback_names() {
        assert_eq!(button_name(6), "Back");
        assert_eq!(button_name(20), "Button 20");
        assert_eq!(hat_name(1, -1), Some("D-Down-Right"));
        assert_eq!(hat_name(0, 0), None);
    }
}
