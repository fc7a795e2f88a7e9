// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Input State Tracker
//!
//! Keeps the protocol state a HID host expects the device to remember
//! between reports (held mouse buttons, modifier byte, key rollover list)
//! and turns each raw input event into at most one report.

use log::trace;

use super::hid::{HidReport, KeyboardReport, ModifierKeys, MouseButtons, MouseReport, ROLLOVER};
use super::keymap::hid_usage;
use crate::evdev::{RawInputEvent, btn, ev, keys, rel};

/// Result of applying one raw event to the tracker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Translation {
    /// Nothing to send
    Ignored,
    /// Send this report on the interrupt channel
    Report(HidReport),
    /// PAUSE was released: end the session.
    ///
    /// `neutral` is to be sent first when a session is live. `terminate` is
    /// set when Left-Ctrl and Left-Alt were held, asking for process exit.
    Disconnect {
        neutral: KeyboardReport,
        terminate: bool,
    },
}

/// Device-side protocol state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    mouse_buttons: MouseButtons,
    modifiers: ModifierKeys,
    /// Held key usages in press order, zero-padded
    pressed_keys: [u8; ROLLOVER],
}

impl InputState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything held
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn mouse_buttons(&self) -> MouseButtons {
        self.mouse_buttons
    }

    pub fn modifiers(&self) -> ModifierKeys {
        self.modifiers
    }

    /// Held key usages in press order
    pub fn pressed_keys(&self) -> &[u8] {
        let len = self
            .pressed_keys
            .iter()
            .position(|&k| k == 0)
            .unwrap_or(ROLLOVER);
        &self.pressed_keys[..len]
    }

    /// Current keyboard snapshot
    pub fn keyboard_report(&self) -> KeyboardReport {
        KeyboardReport {
            modifiers: self.modifiers,
            keys: self.pressed_keys,
        }
    }

    /// Translate one raw event, updating the state
    pub fn apply(&mut self, event: &RawInputEvent) -> Translation {
        trace!(
            "EVENT{{{:04X} {:04X} {:08X}}}",
            event.ev_type, event.code, event.value
        );

        match event.ev_type {
            ev::EV_KEY => self.apply_key(event.code, event.value),
            ev::EV_REL => self.apply_rel(event.code, event.value),
            _ => Translation::Ignored,
        }
    }

    fn apply_key(&mut self, code: u16, value: i32) -> Translation {
        if let Some(button) = mouse_button(code) {
            self.mouse_buttons.set(button, value == 1);
            return self.mouse_report(0, 0, 0);
        }

        if code == keys::KEY_PAUSE {
            if value != 0 {
                return Translation::Ignored;
            }
            let panic_combo = ModifierKeys::LEFT_CTRL | ModifierKeys::LEFT_ALT;
            return Translation::Disconnect {
                neutral: KeyboardReport::neutral(),
                terminate: self.modifiers.contains(panic_combo),
            };
        }

        if let Some(modifier) = modifier_key(code) {
            self.modifiers.set(modifier, value >= 1);
            return Translation::Report(self.keyboard_report().into());
        }

        let Some(usage) = hid_usage(code) else {
            return Translation::Ignored;
        };
        match value {
            1 => self.press(usage),
            0 => self.release(usage),
            // Autorepeat is generated by the receiving host
            _ => {}
        }
        Translation::Report(self.keyboard_report().into())
    }

    fn apply_rel(&mut self, code: u16, value: i32) -> Translation {
        // Truncating cast, as the kernel's own uinput HID bridges do
        let delta = value as i8;
        match code {
            rel::REL_X => self.mouse_report(delta, 0, 0),
            rel::REL_Y => self.mouse_report(0, delta, 0),
            rel::REL_Z | rel::REL_WHEEL => self.mouse_report(0, 0, delta),
            _ => Translation::Ignored,
        }
    }

    fn mouse_report(&self, dx: i8, dy: i8, wheel: i8) -> Translation {
        Translation::Report(
            MouseReport {
                buttons: self.mouse_buttons,
                dx,
                dy,
                wheel,
            }
            .into(),
        )
    }

    fn press(&mut self, usage: u8) {
        for slot in self.pressed_keys.iter_mut() {
            if *slot == usage {
                return;
            }
            if *slot == 0 {
                *slot = usage;
                return;
            }
        }
        trace!("rollover exceeded, dropping usage {usage:#04x}");
    }

    fn release(&mut self, usage: u8) {
        if let Some(pos) = self.pressed_keys.iter().position(|&k| k == usage) {
            self.pressed_keys.copy_within(pos + 1.., pos);
            self.pressed_keys[ROLLOVER - 1] = 0;
        }
    }
}

fn mouse_button(code: u16) -> Option<MouseButtons> {
    match code {
        btn::BTN_LEFT => Some(MouseButtons::LEFT),
        btn::BTN_RIGHT => Some(MouseButtons::RIGHT),
        btn::BTN_MIDDLE => Some(MouseButtons::MIDDLE),
        _ => None,
    }
}

fn modifier_key(code: u16) -> Option<ModifierKeys> {
    match code {
        keys::KEY_LEFTCTRL => Some(ModifierKeys::LEFT_CTRL),
        keys::KEY_LEFTSHIFT => Some(ModifierKeys::LEFT_SHIFT),
        keys::KEY_LEFTALT => Some(ModifierKeys::LEFT_ALT),
        keys::KEY_LEFTMETA => Some(ModifierKeys::LEFT_META),
        keys::KEY_RIGHTCTRL => Some(ModifierKeys::RIGHT_CTRL),
        keys::KEY_RIGHTSHIFT => Some(ModifierKeys::RIGHT_SHIFT),
        keys::KEY_RIGHTALT => Some(ModifierKeys::RIGHT_ALT),
        keys::KEY_RIGHTMETA => Some(ModifierKeys::RIGHT_META),
        _ => None,
    }
}
