// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Local Input Capture
//!
//! This module owns every readable input origin of the process and turns
//! their byte streams into [`RawInputEvent`](devices::RawInputEvent)s:
//!
//! - **Event devices**: `/dev/input/eventN` nodes, all of them or a chosen
//!   subset, each read independently.
//! - **FIFO**: a single named pipe fed by another process with the same
//!   `struct input_event` records an event device would produce.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐       ┌──────────────┐
//! │ eventN       │ │ eventM       │  ...  │ FIFO         │
//! └──────┬───────┘ └──────┬───────┘       └──────┬───────┘
//!        └────────────────┼──────────────────────┘
//!                         ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  InputMultiplexer                        │
//! │  poll(timeout) -> Readiness   fetch(&Readiness) -> events │
//! └─────────────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//!                 InputState::apply
//! ```
//!
//! Devices opened this way keep delivering events to the local desktop as
//! well. An [`InputMuter`] can disable them in the X server for the lifetime
//! of the process.

mod multiplexer;
mod mute;
mod source;

pub use multiplexer::{InputMultiplexer, Readiness};
pub use mute::{InputMuter, MuteError, NoopMuter, XinputMuter, x11_device_names};
pub use source::{
    DeviceProbe, EVENT_RECORD_LEN, EventSource, SourceKind, decode_record, device_path,
    encode_record, probe_devices,
};

/// Result type for input operations.
pub type Result<T> = std::result::Result<T, InputError>;

/// Input error types.
///
/// Only failures that prevent capture altogether surface here; transient
/// read errors on one source are logged and skipped by the multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// No event device could be opened.
    ///
    /// Either no `/dev/input/eventN` node exists within the selection, or
    /// the process lacks read permission on all of them.
    #[error("No event devices could be opened")]
    NoDevices,

    /// The FIFO path exists but is something else.
    #[error("File {0} exists, but is not a fifo")]
    NotAFifo(String),

    /// The FIFO could not be created or opened.
    #[error("Failed to set up fifo {path}: {source}")]
    Fifo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The readiness wait over all sources failed.
    ///
    /// Interrupted waits are not reported as errors.
    #[error("Input readiness wait failed: {0}")]
    Poll(#[source] std::io::Error),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
