// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bluetooth HID Device Emulation
//!
//! This module provides the combined mouse/keyboard HID device as seen
//! by a Bluetooth host: report layouts, report descriptor, key usage map
//! and the input state tracker feeding them.

pub mod hid;
pub mod keymap;
pub mod tracker;

pub use hid::{
    HidReport, KeyboardReport, ModifierKeys, MouseButtons, MouseReport, HIDP_DATA_INPUT,
    KEYBOARD_REPORT_LEN, MOUSE_REPORT_LEN, REPORT_ID_KEYBOARD, REPORT_ID_MOUSE, ROLLOVER,
    keyboard_report_descriptor, mouse_report_descriptor, report_descriptor,
};
pub use keymap::hid_usage;
pub use tracker::{InputState, Translation};
