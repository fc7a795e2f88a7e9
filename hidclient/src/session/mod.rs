// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! HID Session Management
//!
//! A Bluetooth HID session is a pair of L2CAP connections from the same
//! host: the control channel (PSM 17) and the interrupt channel (PSM 19).
//! Input reports only travel on the interrupt channel.
//!
//! # State Machine
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!        ┌──────┐    ┌─────────────────┐    ┌───────────────────┐
//!   ───► │ Idle │ ─► │ AwaitingControl │ ─► │ AwaitingInterrupt │
//!        └──────┘    └─────────────────┘    └───────────────────┘
//!            ▲          │ timeout/error          │ timeout/error
//!            ├──────────┘                        │ (control dropped)
//!            ├───────────────────────────────────┘
//!            │                                   │ accepted
//!        ┌─────────┐                       ┌───────────┐
//!        │ Closing │ ◄──────────────────── │ Connected │
//!        └─────────┘  send failure, PAUSE  └───────────┘
//! ```
//!
//! The listening side is abstracted behind [`HidListener`] and
//! [`HidChannel`] so the machine can be driven without a Bluetooth adapter.

mod l2cap;
mod machine;

use std::fmt;
use std::io;
use std::time::Duration;

pub use l2cap::{L2capChannel, L2capListener};
pub use machine::{SessionMachine, SessionState, SessionStats};

use crate::input::InputError;

/// Bluetooth device address, in the little-endian byte order used on the
/// wire and in `sockaddr_l2`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// `00:00:00:00:00:00`, binds to every local adapter
    pub const ANY: BdAddr = BdAddr([0; 6]);
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// Which of the two HID channels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Control,
    Interrupt,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Control => write!(f, "control"),
            ChannelKind::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// Failure of [`HidListener::accept_timeout`]
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    /// Waiting for an incoming connection failed; the listener is unusable.
    #[error("wait for connection failed: {0}")]
    Wait(#[source] io::Error),

    /// A pending connection could not be accepted; worth retrying.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// Session error types.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The L2CAP socket could not be created.
    #[error("Failed to create L2CAP socket: {0}")]
    Socket(#[source] io::Error),

    /// Binding the listening socket to its PSM failed.
    ///
    /// Usually another HID service (the BlueZ input plugin) already holds
    /// the PSM, or the adapter is down.
    #[error("Failed to bind L2CAP PSM {psm}: {source}")]
    Bind {
        psm: u16,
        #[source]
        source: io::Error,
    },

    /// Listening on the bound socket failed.
    #[error("Failed to listen on L2CAP PSM {psm}: {source}")]
    Listen {
        psm: u16,
        #[source]
        source: io::Error,
    },

    /// Waiting on a listening socket failed.
    #[error("Wait on {channel} socket failed: {source}")]
    AcceptWait {
        channel: ChannelKind,
        #[source]
        source: io::Error,
    },

    /// The input side failed.
    #[error("Input failure: {0}")]
    Input(#[from] InputError),
}

/// Connected HID channel
pub trait HidChannel {
    /// Send one report as a single packet
    fn send_report(&mut self, report: &[u8]) -> io::Result<usize>;
}

/// Listening side of a HID channel
pub trait HidListener {
    type Channel: HidChannel;

    /// Wait up to `timeout` for one incoming connection.
    ///
    /// Returns `Ok(None)` when the time ran out or the wait was interrupted.
    fn accept_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<(Self::Channel, BdAddr)>, AcceptError>;
}
