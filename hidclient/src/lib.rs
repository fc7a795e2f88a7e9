// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! hidclient
//!
//! Turns a Linux machine into a Bluetooth HID combo device: local keyboard
//! and mouse input is captured from evdev nodes (or a FIFO carrying the
//! same records) and forwarded as HID reports to a connected host.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐     ┌──────────────────────────────┐
//! │ /dev/input/eventN, FIFO  │ ──► │ InputMultiplexer (poll)      │
//! └──────────────────────────┘     └──────────────────────────────┘
//!                                                 │ RawInputEvent
//!                                                 ▼
//!                                  ┌──────────────────────────────┐
//!                                  │ InputState (devices crate)   │
//!                                  └──────────────────────────────┘
//!                                                 │ HidReport
//!                                                 ▼
//! ┌──────────────────────────┐     ┌──────────────────────────────┐
//! │ BlueZ ProfileManager1    │     │ SessionMachine               │
//! │ (SDP record)             │     │ L2CAP PSM 17 + PSM 19        │
//! └──────────────────────────┘     └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapter`]: Powering the adapter up and making it discoverable
//! - [`config`]: Runtime configuration and timing constants
//! - [`input`]: Input sources, multiplexing and X11 muting
//! - [`sdp`]: Service record and its registration
//! - [`session`]: L2CAP listeners and the connection state machine
//! - [`server`]: Startup and teardown ordering, exit codes
//! - [`shutdown`]: Signal-driven stop requests

pub mod adapter;
pub mod config;
pub mod input;
pub mod sdp;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::{HidClientConfig, InputSelection, SessionTimeouts};
pub use server::{HidServer, ServerError};
pub use shutdown::{ShutdownController, StopKind};
