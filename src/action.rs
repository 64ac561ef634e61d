//! The closed set of logical actions a user can trigger.
//!
//! Actions are independent of the physical input that fires them; the mapping
//! lives in [`crate::registry::HotkeyRegistry`]. The strum `Display` strings
//! double as the stable labels used in the persisted bindings document, so
//! renaming a variant's label is a config-format change.

use strum::{Display, EnumString, VariantArray};

/// A logical operation the training overlay exposes for binding.
///
/// The bindings document keys entries by label rather than variant name so
/// that files survive refactors; `EnumString` is the load-time parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, VariantArray)]
pub enum Action {
    /// Put the ball and car back to the current shot's spawn state
    #[strum(serialize = "Reset shot")]
    ResetShot,
    /// Advance to the next scenario in the playlist
    #[strum(serialize = "Next scenario")]
    NextScenario,
    /// Go back to the previous scenario in the playlist
    #[strum(serialize = "Previous scenario")]
    PreviousScenario,
    /// Pause/resume the scenario countdown
    #[strum(serialize = "Toggle timeout")]
    ToggleTimeout,
    /// Freeze the scenario generator on the current layout
    #[strum(serialize = "Toggle freeze scenario")]
    ToggleFreezeScenario,
    /// Snapshot the live game state into the active playlist
    #[strum(serialize = "Save game state to playlist")]
    SaveStateToPlaylist,
}

impl Action {
    /// Human-readable label, identical to the persisted form.
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// All actions in declaration order, for menus and wholesale re-registration.
    pub fn all() -> &'static [Action] {
        <Action as VariantArray>::VARIANTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn labels_round_trip_through_from_str() {
        for action in Action::all() {
            let parsed = Action::from_str(&action.label()).unwrap();
            assert_eq!(parsed, *action);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(Action::from_str("Do a barrel roll").is_err());
    }

    #[test]
    fn all_lists_every_variant_once() {
        let all = Action::all();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], Action::ResetShot);
    }
}
