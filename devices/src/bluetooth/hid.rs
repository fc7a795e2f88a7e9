// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bluetooth HID Reports
//!
//! Wire layout of the input reports sent on the HID interrupt channel and
//! the report descriptor advertised through SDP. Every report is prefixed
//! by the HIDP transaction header `DATA | Input` (0xA1) and the report ID.

use bitflags::bitflags;

// ============================================================================
// HID Protocol Constants
// ============================================================================

/// HIDP transaction header: DATA (0xA0) with report type Input (0x01)
pub const HIDP_DATA_INPUT: u8 = 0xA1;

/// Report ID of the mouse collection
pub const REPORT_ID_MOUSE: u8 = 1;

/// Report ID of the keyboard collection
pub const REPORT_ID_KEYBOARD: u8 = 2;

/// Maximum number of simultaneously reported non-modifier keys
pub const ROLLOVER: usize = 8;

/// Mouse report length on the wire
pub const MOUSE_REPORT_LEN: usize = 6;

/// Keyboard report length on the wire
pub const KEYBOARD_REPORT_LEN: usize = 3 + ROLLOVER;

bitflags! {
    /// Mouse button bits (byte 2 of the mouse report)
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MouseButtons: u8 {
        const LEFT = 0x01;
        const RIGHT = 0x02;
        const MIDDLE = 0x04;
    }
}

bitflags! {
    /// Keyboard modifier bits (byte 2 of the keyboard report), HID usages 0xE0-0xE7
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ModifierKeys: u8 {
        const LEFT_CTRL = 0x01;
        const LEFT_SHIFT = 0x02;
        const LEFT_ALT = 0x04;
        const LEFT_META = 0x08;
        const RIGHT_CTRL = 0x10;
        const RIGHT_SHIFT = 0x20;
        const RIGHT_ALT = 0x40;
        const RIGHT_META = 0x80;
    }
}

// ============================================================================
// HID Report Descriptors
// ============================================================================

/// Mouse collection: 3 buttons, relative X/Y/wheel, report ID 1
pub fn mouse_report_descriptor() -> Vec<u8> {
    vec![
        0x05, 0x01,        // Usage Page (Generic Desktop)
        0x09, 0x02,        // Usage (Mouse)
        0xA1, 0x01,        // Collection (Application)
        0x85, 0x01,        //   Report ID (1)
        0x09, 0x01,        //   Usage (Pointer)
        0xA1, 0x00,        //   Collection (Physical)
        0x05, 0x09,        //     Usage Page (Button)
        0x19, 0x01,        //     Usage Minimum (1)
        0x29, 0x03,        //     Usage Maximum (3)
        0x15, 0x00,        //     Logical Minimum (0)
        0x25, 0x01,        //     Logical Maximum (1)
        0x75, 0x01,        //     Report Size (1)
        0x95, 0x03,        //     Report Count (3)
        0x81, 0x02,        //     Input (Data, Var, Abs)
        0x75, 0x05,        //     Report Size (5)
        0x95, 0x01,        //     Report Count (1)
        0x81, 0x01,        //     Input (Const) - Padding
        0x05, 0x01,        //     Usage Page (Generic Desktop)
        0x09, 0x30,        //     Usage (X)
        0x09, 0x31,        //     Usage (Y)
        0x09, 0x38,        //     Usage (Wheel)
        0x15, 0x81,        //     Logical Minimum (-127)
        0x25, 0x7F,        //     Logical Maximum (127)
        0x75, 0x08,        //     Report Size (8)
        0x95, 0x03,        //     Report Count (3)
        0x81, 0x06,        //     Input (Data, Var, Rel)
        0xC0,              //   End Collection
        0xC0,              // End Collection
    ]
}

/// Keyboard collection: 8 modifier bits, 8 key slots, report ID 2
pub fn keyboard_report_descriptor() -> Vec<u8> {
    vec![
        0x05, 0x01,        // Usage Page (Generic Desktop)
        0x09, 0x06,        // Usage (Keyboard)
        0xA1, 0x01,        // Collection (Application)
        0x85, 0x02,        //   Report ID (2)
        0xA1, 0x00,        //   Collection (Physical)
        0x05, 0x07,        //     Usage Page (Key Codes)
        0x19, 0xE0,        //     Usage Minimum (224)
        0x29, 0xE7,        //     Usage Maximum (231)
        0x15, 0x00,        //     Logical Minimum (0)
        0x25, 0x01,        //     Logical Maximum (1)
        0x75, 0x01,        //     Report Size (1)
        0x95, 0x08,        //     Report Count (8)
        0x81, 0x02,        //     Input (Data, Var, Abs) - Modifiers
        0x95, 0x08,        //     Report Count (8)
        0x75, 0x08,        //     Report Size (8)
        0x15, 0x00,        //     Logical Minimum (0)
        0x25, 0x65,        //     Logical Maximum (101)
        0x05, 0x07,        //     Usage Page (Key Codes)
        0x19, 0x00,        //     Usage Minimum (0)
        0x29, 0x65,        //     Usage Maximum (101)
        0x81, 0x00,        //     Input (Data, Array) - Keys
        0xC0,              //   End Collection
        0xC0,              // End Collection
    ]
}

/// Combined report descriptor advertised in the SDP record
pub fn report_descriptor() -> Vec<u8> {
    let mut desc = mouse_report_descriptor();
    desc.extend(keyboard_report_descriptor());
    desc
}

// ============================================================================
// Reports
// ============================================================================

/// Mouse input report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MouseReport {
    pub buttons: MouseButtons,
    pub dx: i8,
    pub dy: i8,
    pub wheel: i8,
}

impl MouseReport {
    /// Serialize to the interrupt channel layout
    pub fn to_bytes(&self) -> [u8; MOUSE_REPORT_LEN] {
        [
            HIDP_DATA_INPUT,
            REPORT_ID_MOUSE,
            self.buttons.bits() & 0x07,
            self.dx as u8,
            self.dy as u8,
            self.wheel as u8,
        ]
    }
}

/// Keyboard input report
///
/// Always a full snapshot of the held modifiers and keys, never a delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: ModifierKeys,
    pub keys: [u8; ROLLOVER],
}

impl KeyboardReport {
    /// All keys released, no modifiers
    pub const fn neutral() -> Self {
        Self {
            modifiers: ModifierKeys::empty(),
            keys: [0; ROLLOVER],
        }
    }

    /// Serialize to the interrupt channel layout
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_LEN] {
        let mut buf = [0u8; KEYBOARD_REPORT_LEN];
        buf[0] = HIDP_DATA_INPUT;
        buf[1] = REPORT_ID_KEYBOARD;
        buf[2] = self.modifiers.bits();
        buf[3..].copy_from_slice(&self.keys);
        buf
    }
}

/// Any report the device emits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HidReport {
    Mouse(MouseReport),
    Keyboard(KeyboardReport),
}

impl HidReport {
    /// Report ID carried in byte 1
    pub fn report_id(&self) -> u8 {
        match self {
            HidReport::Mouse(_) => REPORT_ID_MOUSE,
            HidReport::Keyboard(_) => REPORT_ID_KEYBOARD,
        }
    }

    /// Serialize to the interrupt channel layout
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HidReport::Mouse(m) => m.to_bytes().to_vec(),
            HidReport::Keyboard(k) => k.to_bytes().to_vec(),
        }
    }
}

impl From<MouseReport> for HidReport {
    fn from(report: MouseReport) -> Self {
        HidReport::Mouse(report)
    }
}

impl From<KeyboardReport> for HidReport {
    fn from(report: KeyboardReport) -> Self {
        HidReport::Keyboard(report)
    }
}
