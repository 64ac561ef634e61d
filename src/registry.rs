//! The single source of truth for action/binding/callback state.
//!
//! The registry owns both input sources and mediates which one a binding is
//! wired into by its namespace. Configured state (the action to bindings
//! map) and live wiring (what the sources currently dispatch) are kept
//! deliberately separate: `register_bindings` rebuilds the live set
//! wholesale so the two can never diverge for longer than one rebuild.

use crate::action::Action;
use crate::binding::Binding;
use crate::error::{RebindError, Result};
use crate::input::{ActionCallback, KeySource, PadSource};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Default binding set applied when no config file exists yet.
const DEFAULT_BINDINGS: &[(Action, &str)] = &[(Action::ResetShot, "pad:Back")];

/// Flat persisted shape: action label to ordered binding strings. A BTreeMap
/// keeps the file diff-stable across saves.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BindingsDocument {
    bindings: BTreeMap<String, Vec<String>>,
}

struct RegistryState {
    bindings: HashMap<Action, Vec<Binding>>,
    callbacks: HashMap<Action, ActionCallback>,
    /// Bindings currently wired into the sources.
    live: HashSet<Binding>,
}

/// Owns the two input sources and the action/binding/callback maps.
pub struct HotkeyRegistry {
    pad: Arc<PadSource>,
    keys: Arc<KeySource>,
    state: Mutex<RegistryState>,
}

impl HotkeyRegistry {
    pub fn new(pad: Arc<PadSource>, keys: Arc<KeySource>) -> Self {
        Self {
            pad,
            keys,
            state: Mutex::new(RegistryState {
                bindings: HashMap::new(),
                callbacks: HashMap::new(),
                live: HashSet::new(),
            }),
        }
    }

    /// Start both input sources. Idempotent.
    pub fn start(&self) {
        self.pad.start();
        self.keys.start();
    }

    /// Tear down live wiring and stop both sources. Idempotent.
    pub fn stop(&self) {
        self.unregister_bindings();
        self.pad.stop();
        self.keys.stop();
    }

    pub fn pad(&self) -> &Arc<PadSource> {
        &self.pad
    }

    pub fn keys(&self) -> &Arc<KeySource> {
        &self.keys
    }

    /// Set the callback an action dispatches. Takes effect on the next
    /// `register_bindings` call.
    pub fn set_callback(&self, action: Action, callback: ActionCallback) {
        self.state.lock().callbacks.insert(action, callback);
    }

    /// Bindings configured for an action, in insertion (display) order.
    pub fn get_bindings(&self, action: Action) -> Vec<Binding> {
        self.state
            .lock()
            .bindings
            .get(&action)
            .cloned()
            .unwrap_or_default()
    }

    /// Add a binding to an action. A binding held by a different action is
    /// displaced from it first (last bind wins); re-adding to the same
    /// action is a no-op.
    pub fn add_binding(&self, action: Action, binding: Binding) {
        let mut state = self.state.lock();
        for (other, bindings) in state.bindings.iter_mut() {
            if *other != action && bindings.contains(&binding) {
                bindings.retain(|b| b != &binding);
                info!("binding '{binding}' displaced from '{other}'");
            }
        }
        let bindings = state.bindings.entry(action).or_default();
        if !bindings.contains(&binding) {
            info!("binding '{binding}' added to '{action}'");
            bindings.push(binding);
        }
    }

    /// Remove one binding from an action. No-op when absent.
    pub fn remove_binding(&self, action: Action, binding: &Binding) {
        if let Some(bindings) = self.state.lock().bindings.get_mut(&action) {
            bindings.retain(|b| b != binding);
        }
    }

    /// Clear every binding configured for one action.
    pub fn clear(&self, action: Action) {
        self.state.lock().bindings.remove(&action);
    }

    /// Clear all bindings for all actions.
    pub fn clear_all(&self) {
        self.state.lock().bindings.clear();
    }

    /// Replace the configuration with the built-in default set.
    pub fn reset_defaults(&self) {
        self.clear_all();
        for (action, text) in DEFAULT_BINDINGS {
            match Binding::from_str(text) {
                Ok(binding) => self.add_binding(*action, binding),
                Err(err) => warn!("skipping malformed default binding: {err}"),
            }
        }
        info!("bindings reset to defaults");
    }

    /// Rebuild the live wiring from the configured map: unregister
    /// everything, then register each binding of every action that has a
    /// callback. The brief all-unbound window is the price of the live set
    /// never diverging from the configuration.
    pub fn register_bindings(&self) {
        let mut state = self.state.lock();
        self.unregister_locked(&mut state);

        let mut wired = 0usize;
        for action in Action::all() {
            let Some(callback) = state.callbacks.get(action).cloned() else {
                continue;
            };
            let bindings = state.bindings.get(action).cloned().unwrap_or_default();
            for binding in bindings {
                match &binding {
                    Binding::Pad(_) => self.pad.register(&binding, Arc::clone(&callback)),
                    Binding::Key(_) => self.keys.register(&binding, Arc::clone(&callback)),
                }
                state.live.insert(binding);
                wired += 1;
            }
        }
        info!("registered {wired} hotkey bindings");
    }

    /// Tear down all live wiring. Always safe, including when nothing is
    /// registered.
    pub fn unregister_bindings(&self) {
        let mut state = self.state.lock();
        self.unregister_locked(&mut state);
    }

    fn unregister_locked(&self, state: &mut RegistryState) {
        for binding in state.live.drain() {
            match &binding {
                Binding::Pad(_) => self.pad.unregister(&binding),
                Binding::Key(_) => self.keys.unregister(&binding),
            }
        }
    }

    /// Serialize the action to bindings map (callbacks are process-local
    /// and never persisted). Creates parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let document = {
            let state = self.state.lock();
            let mut document = BindingsDocument::default();
            for action in Action::all() {
                let bindings = state.bindings.get(action).cloned().unwrap_or_default();
                document.bindings.insert(
                    action.label(),
                    bindings.iter().map(ToString::to_string).collect(),
                );
            }
            document
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                RebindError::PersistenceWriteError {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }
        let json = serde_json::to_string_pretty(&document)
            .map_err(|err| RebindError::persistence(path, err.to_string()))?;
        std::fs::write(path, json).map_err(|source| RebindError::PersistenceWriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!("saved hotkey bindings to {}", path.display());
        Ok(())
    }

    /// Load the bindings map and rebuild live wiring. A missing or
    /// unreadable file falls back to defaults; unknown action labels and
    /// malformed binding strings are skipped with a warning so old files
    /// keep loading across versions.
    pub fn load(&self, path: &Path) {
        match Self::read_document(path) {
            Ok(document) => {
                self.clear_all();
                for (label, bindings) in document.bindings {
                    let Ok(action) = Action::from_str(&label) else {
                        warn!("unknown action '{label}' in bindings file, skipping");
                        continue;
                    };
                    for text in bindings {
                        match Binding::from_str(&text) {
                            Ok(binding) => self.add_binding(action, binding),
                            Err(err) => warn!("skipping binding for '{label}': {err}"),
                        }
                    }
                }
                info!("loaded hotkey bindings from {}", path.display());
            }
            Err(RebindError::PersistenceError { path, message }) => {
                warn!(
                    "bindings file {} unreadable ({message}), using defaults",
                    path.display()
                );
                self.reset_defaults();
            }
            Err(_) => {
                // Missing file is the expected first-run case.
                info!("no bindings file at {}, using defaults", path.display());
                self.reset_defaults();
            }
        }
        self.register_bindings();
    }

    fn read_document(path: &Path) -> Result<BindingsDocument> {
        if !path.exists() {
            return Err(RebindError::other("bindings file missing"));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|err| RebindError::persistence(path, err.to_string()))?;
        serde_json::from_str(&text).map_err(|err| RebindError::persistence(path, err.to_string()))
    }

    /// Platform config location for the bindings document.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rebind")
            .join("hotkey_bindings.json")
    }

    /// Textual dump of the current bindings, one action per line.
    pub fn format_bindings(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        for action in Action::all() {
            let bindings = state.bindings.get(action).cloned().unwrap_or_default();
            let list = if bindings.is_empty() {
                "(none)".to_string()
            } else {
                bindings
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(out, "{:30} -> {list}", action.label());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ScriptedKeyBackend, ScriptedPadDriver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixture {
        driver: Arc<ScriptedPadDriver>,
        backend: Arc<ScriptedKeyBackend>,
        registry: HotkeyRegistry,
    }

    fn fixture() -> Fixture {
        let driver = ScriptedPadDriver::new();
        let backend = ScriptedKeyBackend::new();
        let pad = Arc::new(crate::input::PadSource::with_poll_interval(
            driver.clone(),
            Duration::from_millis(2),
        ));
        let keys = Arc::new(KeySource::new(backend.clone()));
        Fixture {
            driver,
            backend,
            registry: HotkeyRegistry::new(pad, keys),
        }
    }

    fn counting_callback() -> (Arc<AtomicUsize>, ActionCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callback: ActionCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn every_binding_belongs_to_exactly_one_action() {
        let fx = fixture();
        let back = Binding::pad("Back");
        fx.registry.add_binding(Action::ResetShot, back.clone());
        fx.registry.add_binding(Action::ResetShot, Binding::key("r"));
        fx.registry.add_binding(Action::NextScenario, back.clone());
        fx.registry.add_binding(Action::ToggleTimeout, back.clone());

        let holders: Vec<Action> = Action::all()
            .iter()
            .copied()
            .filter(|action| fx.registry.get_bindings(*action).contains(&back))
            .collect();
        assert_eq!(holders, vec![Action::ToggleTimeout]);
    }

    #[test]
    fn displacement_removes_the_old_owner() {
        let fx = fixture();
        let binding = Binding::key("space");
        fx.registry.add_binding(Action::ResetShot, binding.clone());
        fx.registry
            .add_binding(Action::SaveStateToPlaylist, binding.clone());

        assert!(fx.registry.get_bindings(Action::ResetShot).is_empty());
        assert_eq!(
            fx.registry.get_bindings(Action::SaveStateToPlaylist),
            vec![binding]
        );
    }

    #[test]
    fn re_adding_is_idempotent_and_order_is_preserved() {
        let fx = fixture();
        fx.registry.add_binding(Action::ResetShot, Binding::pad("Back"));
        fx.registry.add_binding(Action::ResetShot, Binding::key("r"));
        fx.registry.add_binding(Action::ResetShot, Binding::pad("Back"));

        assert_eq!(
            fx.registry.get_bindings(Action::ResetShot),
            vec![Binding::pad("Back"), Binding::key("r")]
        );
    }

    #[test]
    fn remove_and_clear_are_safe_when_absent() {
        let fx = fixture();
        fx.registry
            .remove_binding(Action::ResetShot, &Binding::key("x"));
        fx.registry.clear(Action::NextScenario);
        fx.registry.clear_all();
    }

    #[test]
    fn register_bindings_routes_by_namespace() {
        let fx = fixture();
        fx.registry.start();
        let (pad_hits, pad_callback) = counting_callback();
        let (key_hits, key_callback) = counting_callback();
        fx.registry.set_callback(Action::ResetShot, pad_callback);
        fx.registry.set_callback(Action::ToggleTimeout, key_callback);
        fx.registry.add_binding(Action::ResetShot, Binding::pad("Back"));
        fx.registry
            .add_binding(Action::ToggleTimeout, Binding::key("f5"));
        fx.registry.register_bindings();

        fx.driver.press_button(6); // "Back"
        fx.backend.emit("f5");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while pad_hits.load(Ordering::SeqCst) == 0 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(key_hits.load(Ordering::SeqCst), 1);
        fx.registry.stop();
    }

    #[test]
    fn actions_without_callbacks_are_not_wired() {
        let fx = fixture();
        fx.registry.start();
        fx.registry
            .add_binding(Action::ToggleTimeout, Binding::key("f5"));
        fx.registry.register_bindings();

        fx.backend.emit("f5");
        // Nothing panics and nothing was wired; re-register after setting a
        // callback picks the binding up.
        let (hits, callback) = counting_callback();
        fx.registry.set_callback(Action::ToggleTimeout, callback);
        fx.registry.register_bindings();
        fx.backend.emit("f5");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        fx.registry.stop();
    }

    #[test]
    fn register_bindings_rebuilds_wholesale() {
        let fx = fixture();
        fx.registry.start();
        let (hits, callback) = counting_callback();
        fx.registry.set_callback(Action::ToggleTimeout, callback);
        fx.registry
            .add_binding(Action::ToggleTimeout, Binding::key("f5"));
        fx.registry.register_bindings();

        // Rebinding the action to a different key must drop the old wiring.
        fx.registry
            .remove_binding(Action::ToggleTimeout, &Binding::key("f5"));
        fx.registry
            .add_binding(Action::ToggleTimeout, Binding::key("f6"));
        fx.registry.register_bindings();

        fx.backend.emit("f5");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        fx.backend.emit("f6");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        fx.registry.stop();
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hotkey_bindings.json");

        let fx = fixture();
        fx.registry.add_binding(Action::ResetShot, Binding::pad("Back"));
        fx.registry.add_binding(Action::ResetShot, Binding::key("r"));
        fx.registry
            .add_binding(Action::NextScenario, Binding::pad("D-Right"));
        fx.registry.save(&path).unwrap();

        let fresh = fixture();
        fresh.registry.load(&path);
        assert_eq!(
            fresh.registry.get_bindings(Action::ResetShot),
            vec![Binding::pad("Back"), Binding::key("r")]
        );
        assert_eq!(
            fresh.registry.get_bindings(Action::NextScenario),
            vec![Binding::pad("D-Right")]
        );
    }

    #[test]
    fn unknown_actions_in_the_file_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotkey_bindings.json");
        std::fs::write(
            &path,
            r#"{"bindings": {"Reset shot": ["pad:Back"], "Dance": ["pad:A"]}}"#,
        )
        .unwrap();

        let fx = fixture();
        fx.registry.load(&path);
        assert_eq!(
            fx.registry.get_bindings(Action::ResetShot),
            vec![Binding::pad("Back")]
        );
        for action in Action::all().iter().skip(1) {
            assert!(fx.registry.get_bindings(*action).is_empty());
        }
    }

    #[test]
    fn missing_file_populates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture();
        fx.registry.load(&dir.path().join("nope.json"));
        assert_eq!(
            fx.registry.get_bindings(Action::ResetShot),
            vec![Binding::pad("Back")]
        );
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotkey_bindings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let fx = fixture();
        fx.registry.load(&path);
        assert_eq!(
            fx.registry.get_bindings(Action::ResetShot),
            vec![Binding::pad("Back")]
        );
    }

    #[test]
    fn format_bindings_lists_every_action() {
        let fx = fixture();
        fx.registry.add_binding(Action::ResetShot, Binding::pad("Back"));
        let dump = fx.registry.format_bindings();
        assert!(dump.contains("Reset shot"));
        assert!(dump.contains("pad:Back"));
        assert!(dump.contains("(none)"));
    }
}
