//! Input subsystem: the two physical sources and their capture machinery.
//!
//! Both sources expose the same two-mode contract (normal hotkey dispatch,
//! plus a one-shot capture mode used during interactive rebinding) but are
//! driven differently: the pad source polls a driver on its own thread, the
//! key source is pushed by the platform hook's delivery thread.

pub mod capture;
pub mod keys;
pub mod pad;

#[cfg(feature = "gamepad")]
pub mod pad_gilrs;

#[cfg(feature = "keyhook")]
pub mod keys_rdev;

use std::sync::Arc;

/// A bound action's callback. Zero-argument by design; what it does is owned
/// by the caller that registered it.
pub type ActionCallback = Arc<dyn Fn() + Send + Sync>;

// Public re-exports for convenience. Modules outside this crate should prefer
// importing from `crate::input` rather than reaching into submodules.
pub use capture::{CaptureRequest, CaptureSlot};
pub use keys::{KeyHookBackend, KeySink, KeySource, ScriptedKeyBackend};
pub use pad::{PadDriver, PadEvent, PadId, PadSource, ScriptedPadDriver, PAD_POLL_INTERVAL};
