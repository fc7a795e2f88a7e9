// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Linux key code to USB HID usage table (Keyboard/Keypad page 0x07).
//!
//! Modifier keys and PAUSE are deliberately absent: modifiers travel in the
//! modifier byte, and PAUSE is the session hotkey.

use crate::evdev::keys::*;

const KEYMAP_LEN: usize = 128;

const KEY_USAGES: &[(u16, u8)] = &[
    (KEY_A, 0x04),
    (KEY_B, 0x05),
    (KEY_C, 0x06),
    (KEY_D, 0x07),
    (KEY_E, 0x08),
    (KEY_F, 0x09),
    (KEY_G, 0x0A),
    (KEY_H, 0x0B),
    (KEY_I, 0x0C),
    (KEY_J, 0x0D),
    (KEY_K, 0x0E),
    (KEY_L, 0x0F),
    (KEY_M, 0x10),
    (KEY_N, 0x11),
    (KEY_O, 0x12),
    (KEY_P, 0x13),
    (KEY_Q, 0x14),
    (KEY_R, 0x15),
    (KEY_S, 0x16),
    (KEY_T, 0x17),
    (KEY_U, 0x18),
    (KEY_V, 0x19),
    (KEY_W, 0x1A),
    (KEY_X, 0x1B),
    (KEY_Y, 0x1C),
    (KEY_Z, 0x1D),
    (KEY_1, 0x1E),
    (KEY_2, 0x1F),
    (KEY_3, 0x20),
    (KEY_4, 0x21),
    (KEY_5, 0x22),
    (KEY_6, 0x23),
    (KEY_7, 0x24),
    (KEY_8, 0x25),
    (KEY_9, 0x26),
    (KEY_0, 0x27),
    (KEY_ENTER, 0x28),
    (KEY_ESC, 0x29),
    (KEY_BACKSPACE, 0x2A),
    (KEY_TAB, 0x2B),
    (KEY_SPACE, 0x2C),
    (KEY_MINUS, 0x2D),
    (KEY_EQUAL, 0x2E),
    (KEY_LEFTBRACE, 0x2F),
    (KEY_RIGHTBRACE, 0x30),
    (KEY_BACKSLASH, 0x31),
    (KEY_102ND, 0x32),
    (KEY_SEMICOLON, 0x33),
    (KEY_APOSTROPHE, 0x34),
    (KEY_GRAVE, 0x35),
    (KEY_COMMA, 0x36),
    (KEY_DOT, 0x37),
    (KEY_SLASH, 0x38),
    (KEY_CAPSLOCK, 0x39),
    (KEY_F1, 0x3A),
    (KEY_F2, 0x3B),
    (KEY_F3, 0x3C),
    (KEY_F4, 0x3D),
    (KEY_F5, 0x3E),
    (KEY_F6, 0x3F),
    (KEY_F7, 0x40),
    (KEY_F8, 0x41),
    (KEY_F9, 0x42),
    (KEY_F10, 0x43),
    (KEY_F11, 0x44),
    (KEY_F12, 0x45),
    (KEY_SYSRQ, 0x46),
    (KEY_SCROLLLOCK, 0x47),
    (KEY_INSERT, 0x49),
    (KEY_HOME, 0x4A),
    (KEY_PAGEUP, 0x4B),
    (KEY_DELETE, 0x4C),
    (KEY_END, 0x4D),
    (KEY_PAGEDOWN, 0x4E),
    (KEY_RIGHT, 0x4F),
    (KEY_LEFT, 0x50),
    (KEY_DOWN, 0x51),
    (KEY_UP, 0x52),
    (KEY_NUMLOCK, 0x53),
    (KEY_KPSLASH, 0x54),
    (KEY_KPASTERISK, 0x55),
    (KEY_KPMINUS, 0x56),
    (KEY_KPPLUS, 0x57),
    (KEY_KPENTER, 0x58),
    (KEY_KP1, 0x59),
    (KEY_KP2, 0x5A),
    (KEY_KP3, 0x5B),
    (KEY_KP4, 0x5C),
    (KEY_KP5, 0x5D),
    (KEY_KP6, 0x5E),
    (KEY_KP7, 0x5F),
    (KEY_KP8, 0x60),
    (KEY_KP9, 0x61),
    (KEY_KP0, 0x62),
    (KEY_KPDOT, 0x63),
];

static KEYMAP: [u8; KEYMAP_LEN] = build_keymap();

const fn build_keymap() -> [u8; KEYMAP_LEN] {
    let mut map = [0u8; KEYMAP_LEN];
    let mut i = 0;
    while i < KEY_USAGES.len() {
        let (code, usage) = KEY_USAGES[i];
        map[code as usize] = usage;
        i += 1;
    }
    map
}

/// HID usage for a Linux key code, `None` if the key is not reportable.
pub fn hid_usage(code: u16) -> Option<u8> {
    KEYMAP
        .get(usize::from(code))
        .copied()
        .filter(|&usage| usage != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_are_contiguous() {
        let letters = [
            KEY_A, KEY_B, KEY_C, KEY_D, KEY_E, KEY_F, KEY_G, KEY_H, KEY_I, KEY_J, KEY_K, KEY_L,
            KEY_M, KEY_N, KEY_O, KEY_P, KEY_Q, KEY_R, KEY_S, KEY_T, KEY_U, KEY_V, KEY_W, KEY_X,
            KEY_Y, KEY_Z,
        ];
        for (i, &code) in letters.iter().enumerate() {
            assert_eq!(hid_usage(code), Some(0x04 + i as u8));
        }
    }

    #[test]
    fn test_well_known_usages() {
        assert_eq!(hid_usage(KEY_ENTER), Some(0x28));
        assert_eq!(hid_usage(KEY_0), Some(0x27));
        assert_eq!(hid_usage(KEY_F12), Some(0x45));
        assert_eq!(hid_usage(KEY_UP), Some(0x52));
        assert_eq!(hid_usage(KEY_KPDOT), Some(0x63));
    }

    #[test]
    fn test_unmapped_keys() {
        assert_eq!(hid_usage(KEY_PAUSE), None);
        assert_eq!(hid_usage(KEY_LEFTSHIFT), None);
        assert_eq!(hid_usage(KEY_RIGHTMETA), None);
        assert_eq!(hid_usage(0), None);
        assert_eq!(hid_usage(0x110), None);
        assert_eq!(hid_usage(u16::MAX), None);
    }

    #[test]
    fn test_usages_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for &(_, usage) in KEY_USAGES {
            assert!(seen.insert(usage), "duplicate usage {usage:#04x}");
        }
    }
}
