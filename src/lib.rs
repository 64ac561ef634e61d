//! # rebind - Interactive Hotkey Binding & Dispatch
//!
//! Lets a game-training overlay assign physical inputs (gamepad buttons,
//! D-pad directions, keyboard keys) to logical actions, including a live
//! rebind flow that listens on both devices at once, races them against a
//! shared timeout, and hands the result back without ever blocking the
//! caller's real-time loop.
//!
//! ## Architecture
//!
//! The library is organized into focused modules:
//!
//! - [`error`] - Centralized error types and handling
//! - [`action`] / [`binding`] - The logical and physical sides of a hotkey
//! - [`input`] - The two input sources and their one-shot capture machinery
//! - [`scheduler`] - The shared background loop blocking work is deferred to
//! - [`registry`] - Action/binding/callback state and JSON persistence
//! - [`rebind`] - The first-completed-wins interactive rebind race
//!
//! ## Wiring
//!
//! The composition root owns everything explicitly; nothing in this crate
//! is a process-wide global:
//!
//! ```no_run
//! use rebind::input::{KeySource, PadSource, ScriptedKeyBackend, ScriptedPadDriver};
//! use rebind::{Action, HotkeyRegistry, RebindCoordinator, Scheduler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let pad = Arc::new(PadSource::new(ScriptedPadDriver::new()));
//! let keys = Arc::new(KeySource::new(ScriptedKeyBackend::new()));
//! let registry = Arc::new(HotkeyRegistry::new(pad, keys));
//! let scheduler = Arc::new(Scheduler::new());
//! let coordinator = RebindCoordinator::new(Arc::clone(&registry), Arc::clone(&scheduler));
//!
//! registry.start();
//! registry.set_callback(Action::ResetShot, Arc::new(|| println!("reset!")));
//! registry.load(&HotkeyRegistry::default_config_path());
//! coordinator.start_interactive_rebind(
//!     Action::ResetShot,
//!     Duration::from_secs(5),
//!     |action, binding| println!("{action} now bound to {binding:?}"),
//! );
//! ```

// Core modules
pub mod action;
pub mod binding;
pub mod error;

// Subsystems
pub mod input;
pub mod rebind;
pub mod registry;
pub mod scheduler;

// Re-export commonly used types for convenience
pub use action::Action;
pub use binding::Binding;
pub use error::{RebindError, Result};
pub use rebind::{RebindCoordinator, RebindPhase, DEFAULT_REBIND_TIMEOUT};
pub use registry::HotkeyRegistry;
pub use scheduler::{Scheduler, TaskHandle, TaskOutcome};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
