// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bluetooth HID Device Model
//!
//! This crate holds the pure, I/O-free half of the HID client: the Linux
//! input event vocabulary, the HID report wire format and descriptor, and
//! the stateful translation from raw input events to reports.
//!
//! ```text
//! RawInputEvent ──► InputState::apply ──► Translation
//!                     (buttons,             ├─ Ignored
//!                      modifiers,           ├─ Report(HidReport) ──► bytes
//!                      pressed keys)        └─ Disconnect { neutral, terminate }
//! ```

pub mod bluetooth;
pub mod evdev;

pub use bluetooth::{
    HidReport, InputState, KeyboardReport, ModifierKeys, MouseButtons, MouseReport, Translation,
};
pub use evdev::RawInputEvent;
