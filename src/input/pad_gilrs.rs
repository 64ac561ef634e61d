//! gilrs-backed pad driver (the `gamepad` feature).
//!
//! gilrs reports buttons by semantic position; this driver folds them back
//! onto the SDL index layout the name tables are written against, and turns
//! the four D-pad buttons into hat positions so diagonals (both directions
//! held) come out the same as they would from a hat-reporting driver.

use crate::error::{RebindError, Result};
use crate::input::pad::{PadDriver, PadEvent, PadId};
use gilrs::{Button, Event, EventType, Gilrs};
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

enum Mapped {
    Button(u8),
    Dpad(i8, i8),
    Ignored,
}

fn map_button(button: Button) -> Mapped {
    match button {
        Button::South => Mapped::Button(0),        // "A"
        Button::East => Mapped::Button(1),         // "B"
        Button::West => Mapped::Button(2),         // "X"
        Button::North => Mapped::Button(3),        // "Y"
        Button::LeftTrigger => Mapped::Button(4),  // "LB"
        Button::RightTrigger => Mapped::Button(5), // "RB"
        Button::Select => Mapped::Button(6),       // "Back"
        Button::Start => Mapped::Button(7),        // "Start"
        Button::LeftThumb => Mapped::Button(8),    // "LS"
        Button::RightThumb => Mapped::Button(9),   // "RS"
        Button::Mode => Mapped::Button(10),        // "Guide"
        Button::DPadUp => Mapped::Dpad(0, 1),
        Button::DPadDown => Mapped::Dpad(0, -1),
        Button::DPadLeft => Mapped::Dpad(-1, 0),
        Button::DPadRight => Mapped::Dpad(1, 0),
        _ => Mapped::Ignored, // analog triggers and unknowns
    }
}

struct GilrsState {
    gilrs: Gilrs,
    /// Current hat position per pad, folded from D-pad button edges.
    hats: HashMap<PadId, (i8, i8)>,
}

/// [`PadDriver`] over the system's gamepads via gilrs.
pub struct GilrsPadDriver {
    inner: Mutex<GilrsState>,
}

impl GilrsPadDriver {
    pub fn new() -> Result<Arc<Self>> {
        let gilrs = Gilrs::new().map_err(|err| RebindError::device(err.to_string()))?;
        Ok(Arc::new(Self {
            inner: Mutex::new(GilrsState {
                gilrs,
                hats: HashMap::new(),
            }),
        }))
    }
}

impl PadDriver for GilrsPadDriver {
    fn poll(&self) -> Vec<PadEvent> {
        let mut state = self.inner.lock();
        let mut out = Vec::new();

        while let Some(Event { id, event, .. }) = state.gilrs.next_event() {
            let pad = usize::from(id) as PadId;
            match event {
                EventType::ButtonPressed(button, _) => match map_button(button) {
                    Mapped::Button(index) => out.push(PadEvent::ButtonDown { pad, button: index }),
                    Mapped::Dpad(dx, dy) => {
                        let hat = state.hats.entry(pad).or_insert((0, 0));
                        if dx != 0 {
                            hat.0 = dx;
                        }
                        if dy != 0 {
                            hat.1 = dy;
                        }
                        let (x, y) = *hat;
                        out.push(PadEvent::HatMotion { pad, x, y });
                    }
                    Mapped::Ignored => {}
                },
                EventType::ButtonReleased(button, _) => match map_button(button) {
                    Mapped::Button(index) => out.push(PadEvent::ButtonUp { pad, button: index }),
                    Mapped::Dpad(dx, dy) => {
                        let hat = state.hats.entry(pad).or_insert((0, 0));
                        if dx != 0 && hat.0 == dx {
                            hat.0 = 0;
                        }
                        if dy != 0 && hat.1 == dy {
                            hat.1 = 0;
                        }
                        let (x, y) = *hat;
                        out.push(PadEvent::HatMotion { pad, x, y });
                    }
                    Mapped::Ignored => {}
                },
                EventType::Connected => {
                    let name = state.gilrs.gamepad(id).name().to_string();
                    out.push(PadEvent::Connected { pad, name });
                }
                EventType::Disconnected => {
                    state.hats.remove(&pad);
                    out.push(PadEvent::Disconnected { pad });
                }
                _ => {}
            }
        }

        if out.len() > 64 {
            warn!("pad driver drained {} events in one tick", out.len());
        }
        out
    }
}
