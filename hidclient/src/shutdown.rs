// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide stop request
//!
//! Signal handlers only store into the shared atomic; everything else reads
//! it between bounded waits.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

/// Stop request level, ordered by urgency
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(usize)]
pub enum StopKind {
    Running = 0,
    /// SIGTERM, SIGHUP or the Ctrl+Alt+Pause hotkey
    Graceful = 1,
    /// SIGINT
    Immediate = 2,
}

impl From<usize> for StopKind {
    fn from(value: usize) -> Self {
        match value {
            0 => StopKind::Running,
            1 => StopKind::Graceful,
            _ => StopKind::Immediate,
        }
    }
}

/// Shared stop flag
#[derive(Clone, Debug, Default)]
pub struct ShutdownController {
    state: Arc<AtomicUsize>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGTERM/SIGHUP to [`StopKind::Graceful`] and SIGINT to
    /// [`StopKind::Immediate`].
    pub fn install_signal_handlers(&self) -> io::Result<()> {
        for (signal, kind) in [
            (SIGTERM, StopKind::Graceful),
            (SIGHUP, StopKind::Graceful),
            (SIGINT, StopKind::Immediate),
        ] {
            signal_hook::flag::register_usize(signal, Arc::clone(&self.state), kind as usize)?;
        }
        debug!("Signal handlers installed");
        Ok(())
    }

    /// Ask for the run loop to stop; never lowers an earlier request
    pub fn request(&self, kind: StopKind) {
        self.state.fetch_max(kind as usize, Ordering::SeqCst);
    }

    pub fn state(&self) -> StopKind {
        StopKind::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_requested(&self) -> bool {
        self.state() != StopKind::Running
    }
}
