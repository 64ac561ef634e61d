//! Binding identifiers: one physical input, namespaced by source.
//!
//! Gamepad inputs carry the `pad:` prefix in their string form; keyboard keys
//! are stored bare. The string form is what the bindings document persists and
//! what the UI displays, so both directions of the codec live here.

use crate::error::RebindError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace prefix for gamepad bindings in their persisted/display form.
pub const PAD_PREFIX: &str = "pad:";

/// A unique identifier for one physical input.
///
/// `Pad` names come from the fixed button/hat tables in
/// [`crate::input::pad`]; `Key` names are whatever the keyboard backend
/// reports (lowercased key names, e.g. `"f5"` or `"space"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Binding {
    Pad(String),
    Key(String),
}

impl Binding {
    /// Binding for a gamepad button or D-pad direction.
    pub fn pad(name: impl Into<String>) -> Self {
        Binding::Pad(name.into())
    }

    /// Binding for a keyboard key.
    pub fn key(name: impl Into<String>) -> Self {
        Binding::Key(name.into())
    }

    /// True when this binding is dispatched by the gamepad source.
    pub fn is_pad(&self) -> bool {
        matches!(self, Binding::Pad(_))
    }

    /// The raw input name without the namespace prefix.
    pub fn name(&self) -> &str {
        match self {
            Binding::Pad(name) | Binding::Key(name) => name,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Pad(name) => write!(f, "{PAD_PREFIX}{name}"),
            Binding::Key(name) => f.write_str(name),
        }
    }
}

impl FromStr for Binding {
    type Err = RebindError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let binding = match text.strip_prefix(PAD_PREFIX) {
            Some(name) => Binding::pad(name),
            None => Binding::key(text),
        };
        if binding.name().is_empty() {
            return Err(RebindError::InvalidBinding {
                text: text.to_string(),
            });
        }
        Ok(binding)
    }
}

impl From<Binding> for String {
    fn from(binding: Binding) -> Self {
        binding.to_string()
    }
}

impl TryFrom<String> for Binding {
    type Error = RebindError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}
