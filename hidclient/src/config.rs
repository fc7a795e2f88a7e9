// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::DEFAULT_ADAPTER;

/// Highest number of `/dev/input/eventN` nodes probed
pub const MAX_EVENT_DEVICES: usize = 64;

/// L2CAP PSM of the HID control channel
pub const PSM_HID_CONTROL: u16 = 0x11;

/// L2CAP PSM of the HID interrupt channel
pub const PSM_HID_INTERRUPT: u16 = 0x13;

/// Where input events come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSelection {
    /// Event devices under `/dev/input`; an empty list selects all of them
    EventDevices(Vec<usize>),
    /// A single named pipe carrying `struct input_event` records
    Fifo(PathBuf),
}

impl InputSelection {
    /// Whether device `index` takes part in the selection
    pub fn includes_device(&self, index: usize) -> bool {
        match self {
            InputSelection::EventDevices(only) => only.is_empty() || only.contains(&index),
            InputSelection::Fifo(_) => false,
        }
    }
}

impl Default for InputSelection {
    fn default() -> Self {
        InputSelection::EventDevices(Vec::new())
    }
}

/// Session timing and transport parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Control channel PSM
    pub control_psm: u16,
    /// Interrupt channel PSM
    pub interrupt_psm: u16,
    /// Wait for an incoming control connection
    pub control_accept: Duration,
    /// Wait for the interrupt connection once control is up
    pub interrupt_accept: Duration,
    /// Input readiness wait while connected
    pub poll: Duration,
    /// Pause after a session closes before listening again
    pub settle: Duration,
    /// Longest a report send may block on a host that stopped reading
    pub send: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            control_psm: PSM_HID_CONTROL,
            interrupt_psm: PSM_HID_INTERRUPT,
            control_accept: Duration::from_secs(1),
            interrupt_accept: Duration::from_secs(3),
            poll: Duration::from_secs(1),
            settle: Duration::from_millis(500),
            send: Duration::from_secs(1),
        }
    }
}

/// HID client configuration
#[derive(Clone, Debug)]
pub struct HidClientConfig {
    /// Input sources to open
    pub input: InputSelection,
    /// Local adapter to power up and make discoverable
    pub adapter: String,
    /// Do not register the SDP service record
    pub skip_sdp: bool,
    /// Disable the opened devices in the local X server while running
    pub mute_x11: bool,
    /// Session parameters
    pub timeouts: SessionTimeouts,
}

impl Default for HidClientConfig {
    fn default() -> Self {
        Self {
            input: InputSelection::default(),
            adapter: DEFAULT_ADAPTER.to_string(),
            skip_sdp: false,
            mute_x11: false,
            timeouts: SessionTimeouts::default(),
        }
    }
}
