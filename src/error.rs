//! Error types and handling infrastructure for rebind.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. Nothing in this crate is allowed to propagate a failure to
//! the real-time caller thread; errors either surface through these types at the
//! configuration boundary or terminate in a log line inside the worker contexts.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for rebind operations.
///
/// Covers device access, hook registration, scheduling, and bindings
/// persistence. Dispatch-time failures (a callback panicking, a device
/// vanishing mid-capture) are deliberately *not* represented here: those are
/// logged and swallowed at the site per the propagation policy.
#[derive(Error, Debug)]
pub enum RebindError {
    /// A physical input device could not be opened or queried
    #[error("Device error: {message}")]
    DeviceError { message: String },

    /// Installing or removing a keyboard hook failed
    #[error("Hook registration failed: {message}")]
    HookError { message: String },

    /// The background scheduler rejected an operation
    #[error("Scheduler error: {message}")]
    SchedulerError { message: String },

    /// Bindings file exists but could not be read or parsed
    #[error("Bindings file unreadable: {path}: {message}")]
    PersistenceError { path: PathBuf, message: String },

    /// Bindings file could not be written
    #[error("Failed to write bindings file: {path}")]
    PersistenceWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A binding string did not parse (bad namespace prefix or empty name)
    #[error("Invalid binding: {text}")]
    InvalidBinding { text: String },

    /// Generic error for cases not covered by specific variants
    #[error("Operation failed: {message}")]
    Other { message: String },
}

/// Standard Result type for rebind operations.
pub type Result<T> = std::result::Result<T, RebindError>;

impl RebindError {
    /// Create a DeviceError with a descriptive message
    pub fn device(message: impl Into<String>) -> Self {
        Self::DeviceError {
            message: message.into(),
        }
    }

    /// Create a HookError with a descriptive message
    pub fn hook(message: impl Into<String>) -> Self {
        Self::HookError {
            message: message.into(),
        }
    }

    /// Create a SchedulerError with a descriptive message
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::SchedulerError {
            message: message.into(),
        }
    }

    /// Create a PersistenceError for a given path
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PersistenceError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a generic Other error with a descriptive message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let device = RebindError::device("no pads detected");
        assert_eq!(device.to_string(), "Device error: no pads detected");

        let hook = RebindError::hook("listener thread refused to start");
        assert_eq!(
            hook.to_string(),
            "Hook registration failed: listener thread refused to start"
        );

        let invalid = RebindError::InvalidBinding {
            text: "pad:".to_string(),
        };
        assert_eq!(invalid.to_string(), "Invalid binding: pad:");
    }

    #[test]
    fn persistence_error_includes_path() {
        let err = RebindError::persistence("/tmp/hotkeys.json", "truncated document");
        assert_eq!(
            err.to_string(),
            "Bindings file unreadable: /tmp/hotkeys.json: truncated document"
        );
    }
}
