// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Input Multiplexer
//!
//! Waits on all attached sources at once and reads at most one record from
//! each ready source per cycle, visiting them in ascending index order.

use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

use devices::RawInputEvent;
use log::{debug, info, warn};

use super::source::{EventSource, device_path};
use super::{InputError, Result};
use crate::config::{InputSelection, MAX_EVENT_DEVICES};

/// Sources found ready by one [`InputMultiplexer::poll`], ascending
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    ready: Vec<usize>,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Indices into [`InputMultiplexer::sources`]
    pub fn indices(&self) -> &[usize] {
        &self.ready
    }
}

/// Owner of every input source of the process
#[derive(Debug)]
pub struct InputMultiplexer {
    sources: Vec<EventSource>,
}

impl InputMultiplexer {
    pub fn new(sources: Vec<EventSource>) -> Self {
        Self { sources }
    }

    /// Open the sources named by `selection`
    pub fn open(selection: &InputSelection) -> Result<Self> {
        if let InputSelection::Fifo(path) = selection {
            let source = EventSource::open_fifo(path)?;
            info!("Opened fifo {} for input", path.display());
            return Ok(Self::new(vec![source]));
        }

        let mut sources = Vec::new();
        for index in (0..MAX_EVENT_DEVICES).filter(|&i| selection.includes_device(i)) {
            let path = device_path(index);
            match EventSource::open_device(index) {
                Ok(source) => {
                    let counter = sources.len();
                    info!("Opened {path} as event device [counter {counter}]");
                    sources.push(source);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => debug!("Cannot open {path}: {e}"),
            }
        }

        if sources.is_empty() {
            return Err(InputError::NoDevices);
        }
        Ok(Self::new(sources))
    }

    pub fn sources(&self) -> &[EventSource] {
        &self.sources
    }

    /// Number of sources still being polled
    pub fn attached(&self) -> usize {
        self.sources.iter().filter(|s| !s.is_detached()).count()
    }

    /// Wait up to `timeout` for any attached source to become readable.
    ///
    /// A zero timeout only checks. An interrupted wait reports nothing
    /// ready so the caller gets to look at the stop flag.
    pub fn poll(&self, timeout: Duration) -> Result<Readiness> {
        let slots: Vec<usize> = (0..self.sources.len())
            .filter(|&i| !self.sources[i].is_detached())
            .collect();
        let mut fds: Vec<libc::pollfd> = slots
            .iter()
            .map(|&i| libc::pollfd {
                fd: self.sources[i].as_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        // SAFETY: fds points to fds.len() initialized pollfd entries whose
        // descriptors are owned by self.sources for the whole call.
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(InputError::Poll(err));
        }

        let ready = slots
            .into_iter()
            .zip(&fds)
            .filter(|(_, pfd)| pfd.revents != 0)
            .map(|(slot, _)| slot)
            .collect();
        Ok(Readiness { ready })
    }

    /// Read one record from each ready source.
    ///
    /// Sources that come back empty, short or would block contribute
    /// nothing. A source whose device vanished is detached for good.
    pub fn fetch(&mut self, readiness: &Readiness) -> Vec<RawInputEvent> {
        let mut events = Vec::with_capacity(readiness.len());
        for &slot in readiness.indices() {
            let Some(source) = self.sources.get_mut(slot) else {
                continue;
            };
            if source.is_detached() {
                continue;
            }
            match source.read_event() {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                    warn!(
                        "Input device event{} '{}' disappeared, no longer reading it",
                        source.index(),
                        source.name()
                    );
                    source.detach();
                }
                Err(e) => debug!("Read from '{}' failed: {e}", source.name()),
            }
        }
        events
    }

    /// Consume everything queued right now, handing each event to
    /// `on_event`. Stops at the first cycle that yields no full record.
    pub fn drain<F>(&mut self, mut on_event: F) -> Result<usize>
    where
        F: FnMut(&RawInputEvent),
    {
        let mut drained = 0;
        loop {
            let readiness = self.poll(Duration::ZERO)?;
            if readiness.is_empty() {
                break;
            }
            let events = self.fetch(&readiness);
            if events.is_empty() {
                break;
            }
            drained += events.len();
            for event in &events {
                on_event(event);
            }
        }
        Ok(drained)
    }
}
