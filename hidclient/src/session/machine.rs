// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Session State Machine
//!
//! Drives accept sequencing on the two listeners, forwards translated input
//! while connected and tears the session down on send failure or PAUSE.
//! Every blocking call is bounded, and the stop flag is checked between
//! steps.

use std::thread;

use devices::{InputState, RawInputEvent, Translation};
use log::{debug, info, warn};

use super::{AcceptError, BdAddr, ChannelKind, HidChannel, HidListener, SessionError};
use crate::config::SessionTimeouts;
use crate::input::InputMultiplexer;
use crate::shutdown::{ShutdownController, StopKind};

/// Session lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No peer; pending input is discarded
    Idle,
    /// Waiting for the host to open the control channel
    AwaitingControl,
    /// Control channel up, waiting for the interrupt channel
    AwaitingInterrupt,
    /// Both channels up, reports flowing
    Connected,
    /// Tearing the session down
    Closing,
}

/// Session statistics
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub sessions: u64,
    pub reports_sent: u64,
    pub reports_discarded: u64,
    pub send_failures: u64,
}

struct Session<C> {
    /// Held open for the session lifetime; nothing is exchanged on it
    _control: C,
    interrupt: C,
    peer: BdAddr,
}

/// HID session driver over a pair of listeners
pub struct SessionMachine<L: HidListener> {
    control: L,
    interrupt: L,
    timeouts: SessionTimeouts,
    shutdown: ShutdownController,
    state: SessionState,
    input_state: InputState,
    pending_control: Option<L::Channel>,
    session: Option<Session<L::Channel>>,
    stats: SessionStats,
}

impl<L: HidListener> SessionMachine<L> {
    pub fn new(
        control: L,
        interrupt: L,
        timeouts: SessionTimeouts,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            control,
            interrupt,
            timeouts,
            shutdown,
            state: SessionState::Idle,
            input_state: InputState::new(),
            pending_control: None,
            session: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn input_state(&self) -> &InputState {
        &self.input_state
    }

    /// Address of the connected host
    pub fn peer(&self) -> Option<BdAddr> {
        self.session.as_ref().map(|s| s.peer)
    }

    /// Step until a stop is requested, then close any live session
    pub fn run(&mut self, input: &mut InputMultiplexer) -> Result<(), SessionError> {
        let result = loop {
            if self.shutdown.is_requested() {
                break Ok(());
            }
            if let Err(e) = self.step(input) {
                break Err(e);
            }
        };
        if self.session.is_some() || self.pending_control.is_some() {
            self.close_session();
        }
        result
    }

    /// Perform one transition
    pub fn step(&mut self, input: &mut InputMultiplexer) -> Result<SessionState, SessionError> {
        self.state = match self.state {
            SessionState::Idle => self.idle(input)?,
            SessionState::AwaitingControl => self.await_control()?,
            SessionState::AwaitingInterrupt => self.await_interrupt(input)?,
            SessionState::Connected => self.forward(input)?,
            SessionState::Closing => self.closing(),
        };
        Ok(self.state)
    }

    fn idle(&mut self, input: &mut InputMultiplexer) -> Result<SessionState, SessionError> {
        self.discard_pending(input)?;
        Ok(SessionState::AwaitingControl)
    }

    fn await_control(&mut self) -> Result<SessionState, SessionError> {
        match self.control.accept_timeout(self.timeouts.control_accept) {
            Ok(Some((channel, peer))) => {
                debug!("Control channel opened by {peer}");
                self.pending_control = Some(channel);
                Ok(SessionState::AwaitingInterrupt)
            }
            Ok(None) => Ok(SessionState::Idle),
            Err(AcceptError::Wait(source)) => Err(SessionError::AcceptWait {
                channel: ChannelKind::Control,
                source,
            }),
            Err(AcceptError::Accept(e)) => {
                warn!("Failed to accept control connection: {e}");
                Ok(SessionState::Idle)
            }
        }
    }

    fn await_interrupt(
        &mut self,
        input: &mut InputMultiplexer,
    ) -> Result<SessionState, SessionError> {
        let accepted = self.interrupt.accept_timeout(self.timeouts.interrupt_accept);
        let Some(control) = self.pending_control.take() else {
            return Ok(SessionState::Idle);
        };

        match accepted {
            Ok(Some((interrupt, peer))) => {
                info!("Incoming connection from {peer}");
                self.discard_pending(input)?;
                self.input_state.reset();
                self.session = Some(Session {
                    _control: control,
                    interrupt,
                    peer,
                });
                self.stats.sessions += 1;
                Ok(SessionState::Connected)
            }
            Ok(None) => {
                warn!("Interrupt connection failed to establish (control connection already there), timeout");
                Ok(SessionState::Idle)
            }
            Err(AcceptError::Wait(source)) => Err(SessionError::AcceptWait {
                channel: ChannelKind::Interrupt,
                source,
            }),
            Err(AcceptError::Accept(e)) => {
                warn!("Failed to accept interrupt connection: {e}");
                Ok(SessionState::Idle)
            }
        }
    }

    fn forward(&mut self, input: &mut InputMultiplexer) -> Result<SessionState, SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(SessionState::Closing);
        };

        let readiness = input.poll(self.timeouts.poll)?;
        if readiness.is_empty() {
            return Ok(SessionState::Connected);
        }

        for event in input.fetch(&readiness) {
            match self.input_state.apply(&event) {
                Translation::Ignored => {}
                Translation::Report(report) => {
                    if let Err(e) = session.interrupt.send_report(&report.to_bytes()) {
                        warn!(
                            "Failed to send report {} to {}: {e}",
                            report.report_id(),
                            session.peer
                        );
                        self.stats.send_failures += 1;
                        return Ok(SessionState::Closing);
                    }
                    self.stats.reports_sent += 1;
                }
                Translation::Disconnect { neutral, terminate } => {
                    if let Err(e) = session.interrupt.send_report(&neutral.to_bytes()) {
                        debug!("Neutral report not delivered: {e}");
                    }
                    if terminate {
                        info!("Ctrl+Alt+Pause pressed, stopping");
                        self.shutdown.request(StopKind::Graceful);
                    } else {
                        info!("Pause pressed, disconnecting from {}", session.peer);
                    }
                    return Ok(SessionState::Closing);
                }
            }
        }
        Ok(SessionState::Connected)
    }

    fn closing(&mut self) -> SessionState {
        self.close_session();
        if !self.shutdown.is_requested() {
            thread::sleep(self.timeouts.settle);
        }
        SessionState::Idle
    }

    fn close_session(&mut self) {
        self.session = None;
        self.pending_control = None;
        self.input_state.reset();
        info!("Connection closed");
    }

    /// Drain queued input without a peer to send it to. The tracker still
    /// sees every event so that Ctrl+Alt+Pause works while idle.
    fn discard_pending(&mut self, input: &mut InputMultiplexer) -> Result<(), SessionError> {
        let input_state = &mut self.input_state;
        let shutdown = &self.shutdown;
        let stats = &mut self.stats;
        input.drain(|event: &RawInputEvent| match input_state.apply(event) {
            Translation::Ignored => {}
            Translation::Report(_) => stats.reports_discarded += 1,
            Translation::Disconnect { terminate, .. } => {
                if terminate {
                    info!("Ctrl+Alt+Pause pressed, stopping");
                    shutdown.request(StopKind::Graceful);
                }
            }
        })?;
        Ok(())
    }
}
