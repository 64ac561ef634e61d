//! rdev-backed keyboard hook (the `keyhook` feature).
//!
//! rdev's global listener cannot be torn down once started, so the listener
//! thread is detached and lives for the process; `remove` gates delivery by
//! clearing the sink slot instead. Key names prefer the printable name the
//! platform reports and fall back to the lowercased key identifier for
//! function and modifier keys.

use crate::error::Result;
use crate::input::keys::{KeyHookBackend, KeySink};
use log::error;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn key_label(event: &rdev::Event, key: rdev::Key) -> String {
    match event.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.to_lowercase(),
        _ => format!("{key:?}").to_lowercase(),
    }
}

/// [`KeyHookBackend`] over rdev's global input listener.
#[derive(Default)]
pub struct RdevHookBackend {
    sink: Arc<Mutex<Option<KeySink>>>,
    listening: AtomicBool,
}

impl RdevHookBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl KeyHookBackend for RdevHookBackend {
    fn install(&self, sink: KeySink) -> Result<()> {
        *self.sink.lock() = Some(sink);
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let slot = Arc::clone(&self.sink);
        thread::spawn(move || {
            let result = rdev::listen(move |event| {
                if let rdev::EventType::KeyPress(key) = event.event_type {
                    let label = key_label(&event, key);
                    let sink = slot.lock().clone();
                    if let Some(sink) = sink {
                        sink(&label);
                    }
                }
            });
            if let Err(err) = result {
                error!("keyboard listener failed: {err:?}");
            }
        });
        Ok(())
    }

    fn remove(&self) {
        *self.sink.lock() = None;
    }
}
