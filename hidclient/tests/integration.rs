// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for hidclient
//!
//! This file contains end-to-end tests for:
//! - Input sources and the multiplexer over socket pairs
//! - Complete sessions driven through in-memory listeners
//! - SDP record contents and configuration defaults

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use devices::RawInputEvent;
use devices::evdev::{btn, keys, rel};

use hidclient::input::{EventSource, InputMultiplexer, SourceKind, encode_record};
use hidclient::sdp::ServiceRecord;
use hidclient::session::{
    AcceptError, BdAddr, HidChannel, HidListener, SessionMachine, SessionState,
};
use hidclient::{HidClientConfig, InputSelection, SessionTimeouts, ShutdownController, StopKind};

// ============================================================================
// Test Doubles
// ============================================================================

type Sent = Rc<RefCell<Vec<Vec<u8>>>>;

struct RecordingChannel {
    sent: Sent,
    fail_after: Option<usize>,
}

impl HidChannel for RecordingChannel {
    fn send_report(&mut self, report: &[u8]) -> io::Result<usize> {
        if let Some(limit) = self.fail_after
            && self.sent.borrow().len() >= limit
        {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        self.sent.borrow_mut().push(report.to_vec());
        Ok(report.len())
    }
}

/// Accepts one connection per queued peer, then times out
struct QueuedListener {
    peers: RefCell<VecDeque<(BdAddr, Option<usize>)>>,
    sent: Sent,
}

impl QueuedListener {
    fn new(peers: &[(BdAddr, Option<usize>)]) -> Self {
        Self {
            peers: RefCell::new(peers.iter().copied().collect()),
            sent: Sent::default(),
        }
    }
}

impl HidListener for QueuedListener {
    type Channel = RecordingChannel;

    fn accept_timeout(
        &self,
        _timeout: Duration,
    ) -> Result<Option<(RecordingChannel, BdAddr)>, AcceptError> {
        Ok(self.peers.borrow_mut().pop_front().map(|(peer, fail_after)| {
            (
                RecordingChannel {
                    sent: Rc::clone(&self.sent),
                    fail_after,
                },
                peer,
            )
        }))
    }
}

const HOST_A: BdAddr = BdAddr([0x01, 0x00, 0x00, 0x1A, 0x5B, 0x00]);
const HOST_B: BdAddr = BdAddr([0x02, 0x00, 0x00, 0x1A, 0x5B, 0x00]);

fn timeouts() -> SessionTimeouts {
    SessionTimeouts {
        poll: Duration::from_millis(20),
        settle: Duration::ZERO,
        ..Default::default()
    }
}

/// Multiplexer over `count` socket-pair sources and their writing ends
fn sources(count: usize) -> (InputMultiplexer, Vec<UnixStream>) {
    let mut readers = Vec::new();
    let mut writers = Vec::new();
    for index in 0..count {
        let (tx, rx) = UnixStream::pair().unwrap();
        rx.set_nonblocking(true).unwrap();
        readers.push(EventSource::from_fd(
            OwnedFd::from(rx),
            SourceKind::Device,
            format!("fake event{index}"),
            index,
        ));
        writers.push(tx);
    }
    (InputMultiplexer::new(readers), writers)
}

fn write_events(writer: &mut UnixStream, events: &[RawInputEvent]) {
    for event in events {
        writer.write_all(&encode_record(event)).unwrap();
    }
}

fn press_and_release(code: u16) -> [RawInputEvent; 4] {
    [
        RawInputEvent::key(code, 1),
        RawInputEvent::syn(),
        RawInputEvent::key(code, 0),
        RawInputEvent::syn(),
    ]
}

fn connect<L: HidListener>(machine: &mut SessionMachine<L>, input: &mut InputMultiplexer) {
    while machine.state() != SessionState::Connected {
        machine.step(input).unwrap();
    }
}

/// Step while connected until no input is left queued
fn pump<L: HidListener>(machine: &mut SessionMachine<L>, input: &mut InputMultiplexer) -> SessionState {
    loop {
        if input.poll(Duration::ZERO).unwrap().is_empty() {
            return machine.state();
        }
        let state = machine.step(input).unwrap();
        if state != SessionState::Connected {
            return state;
        }
    }
}

// ============================================================================
// Multiplexer Tests
// ============================================================================

#[test]
fn test_multiplexer_reads_ready_sources_in_index_order() {
    let (mut input, mut writers) = sources(3);
    write_events(&mut writers[2], &[RawInputEvent::rel(rel::REL_Y, 2)]);
    write_events(&mut writers[0], &[RawInputEvent::rel(rel::REL_X, 1)]);

    let readiness = input.poll(Duration::from_millis(100)).unwrap();
    assert_eq!(readiness.indices(), &[0, 2]);

    let events = input.fetch(&readiness);
    assert_eq!(
        events,
        vec![RawInputEvent::rel(rel::REL_X, 1), RawInputEvent::rel(rel::REL_Y, 2)]
    );
}

#[test]
fn test_multiplexer_drain_empties_every_source() {
    let (mut input, mut writers) = sources(2);
    write_events(&mut writers[0], &press_and_release(keys::KEY_A));
    write_events(&mut writers[1], &[RawInputEvent::rel(rel::REL_WHEEL, -1)]);

    let mut seen = Vec::new();
    let drained = input.drain(|event| seen.push(*event)).unwrap();

    assert_eq!(drained, 5);
    assert_eq!(seen.len(), 5);
    assert!(input.poll(Duration::ZERO).unwrap().is_empty());
}

#[test]
fn test_multiplexer_nothing_ready() {
    let (input, _writers) = sources(2);
    assert!(input.poll(Duration::ZERO).unwrap().is_empty());
    assert_eq!(input.attached(), 2);
}

// ============================================================================
// Session Tests
// ============================================================================

#[test]
fn test_typing_session_wire_bytes() {
    let control = QueuedListener::new(&[(HOST_A, None)]);
    let interrupt = QueuedListener::new(&[(HOST_A, None)]);
    let sent = Rc::clone(&interrupt.sent);
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), ShutdownController::new());
    let (mut input, mut writers) = sources(1);

    connect(&mut machine, &mut input);
    assert_eq!(machine.peer(), Some(HOST_A));

    write_events(
        &mut writers[0],
        &[
            RawInputEvent::key(keys::KEY_LEFTSHIFT, 1),
            RawInputEvent::key(keys::KEY_H, 1),
            RawInputEvent::key(keys::KEY_H, 0),
            RawInputEvent::key(keys::KEY_LEFTSHIFT, 0),
        ],
    );
    assert_eq!(pump(&mut machine, &mut input), SessionState::Connected);

    let sent = sent.borrow();
    assert_eq!(
        *sent,
        vec![
            vec![0xA1, 0x02, 0x02, 0, 0, 0, 0, 0, 0, 0, 0],
            vec![0xA1, 0x02, 0x02, 0x0B, 0, 0, 0, 0, 0, 0, 0],
            vec![0xA1, 0x02, 0x02, 0, 0, 0, 0, 0, 0, 0, 0],
            vec![0xA1, 0x02, 0x00, 0, 0, 0, 0, 0, 0, 0, 0],
        ]
    );
}

#[test]
fn test_pointer_motion_then_click() {
    let control = QueuedListener::new(&[(HOST_A, None)]);
    let interrupt = QueuedListener::new(&[(HOST_A, None)]);
    let sent = Rc::clone(&interrupt.sent);
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), ShutdownController::new());
    let (mut input, mut writers) = sources(1);

    connect(&mut machine, &mut input);
    write_events(
        &mut writers[0],
        &[
            RawInputEvent::rel(rel::REL_X, 5),
            RawInputEvent::key(btn::BTN_LEFT, 1),
            RawInputEvent::key(btn::BTN_LEFT, 0),
        ],
    );
    pump(&mut machine, &mut input);

    assert_eq!(
        *sent.borrow(),
        vec![
            vec![0xA1, 0x01, 0x00, 0x05, 0, 0],
            vec![0xA1, 0x01, 0x01, 0, 0, 0],
            vec![0xA1, 0x01, 0x00, 0, 0, 0],
        ]
    );
}

#[test]
fn test_mouse_and_keyboard_sources_interleave() {
    let control = QueuedListener::new(&[(HOST_A, None)]);
    let interrupt = QueuedListener::new(&[(HOST_A, None)]);
    let sent = Rc::clone(&interrupt.sent);
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), ShutdownController::new());
    let (mut input, mut writers) = sources(2);

    connect(&mut machine, &mut input);

    write_events(&mut writers[1], &[RawInputEvent::key(btn::BTN_LEFT, 1)]);
    write_events(&mut writers[0], &[RawInputEvent::key(keys::KEY_A, 1)]);
    pump(&mut machine, &mut input);

    let sent = sent.borrow();
    assert_eq!(sent.len(), 2);
    // Source 0 is read first within one readiness cycle
    assert_eq!(sent[0][1], 0x02);
    assert_eq!(sent[0][3], 0x04);
    assert_eq!(sent[1], vec![0xA1, 0x01, 0x01, 0, 0, 0]);
}

#[test]
fn test_reconnect_after_pause_starts_clean() {
    let control = QueuedListener::new(&[(HOST_A, None), (HOST_B, None)]);
    let interrupt = QueuedListener::new(&[(HOST_A, None), (HOST_B, None)]);
    let sent = Rc::clone(&interrupt.sent);
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), ShutdownController::new());
    let (mut input, mut writers) = sources(1);

    connect(&mut machine, &mut input);
    write_events(
        &mut writers[0],
        &[
            RawInputEvent::key(keys::KEY_Z, 1),
            RawInputEvent::key(keys::KEY_PAUSE, 1),
            RawInputEvent::key(keys::KEY_PAUSE, 0),
        ],
    );
    assert_eq!(pump(&mut machine, &mut input), SessionState::Closing);
    // Held Z report, then the neutral report
    assert_eq!(sent.borrow().len(), 2);
    assert_eq!(sent.borrow()[1], vec![0xA1, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    assert_eq!(machine.step(&mut input).unwrap(), SessionState::Idle);
    assert!(machine.input_state().pressed_keys().is_empty());

    connect(&mut machine, &mut input);
    assert_eq!(machine.peer(), Some(HOST_B));
    assert_eq!(machine.stats().sessions, 2);

    write_events(&mut writers[0], &[RawInputEvent::key(keys::KEY_B, 1)]);
    pump(&mut machine, &mut input);
    assert_eq!(
        sent.borrow().last().unwrap(),
        &vec![0xA1, 0x02, 0, 0x05, 0, 0, 0, 0, 0, 0, 0]
    );
}

#[test]
fn test_broken_link_returns_to_listening() {
    let control = QueuedListener::new(&[(HOST_A, None)]);
    let interrupt = QueuedListener::new(&[(HOST_A, Some(1))]);
    let sent = Rc::clone(&interrupt.sent);
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), ShutdownController::new());
    let (mut input, mut writers) = sources(1);

    connect(&mut machine, &mut input);
    write_events(
        &mut writers[0],
        &[RawInputEvent::rel(rel::REL_X, 3), RawInputEvent::rel(rel::REL_X, 4)],
    );
    assert_eq!(pump(&mut machine, &mut input), SessionState::Closing);

    assert_eq!(sent.borrow().len(), 1);
    assert_eq!(machine.stats().send_failures, 1);
    assert_eq!(machine.step(&mut input).unwrap(), SessionState::Idle);
    assert_eq!(machine.peer(), None);
}

#[test]
fn test_ctrl_alt_pause_ends_run() {
    let control = QueuedListener::new(&[(HOST_A, None)]);
    let interrupt = QueuedListener::new(&[(HOST_A, None)]);
    let sent = Rc::clone(&interrupt.sent);
    let shutdown = ShutdownController::new();
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), shutdown.clone());
    let (mut input, mut writers) = sources(1);

    connect(&mut machine, &mut input);
    write_events(
        &mut writers[0],
        &[
            RawInputEvent::key(keys::KEY_LEFTCTRL, 1),
            RawInputEvent::key(keys::KEY_LEFTALT, 1),
            RawInputEvent::key(keys::KEY_PAUSE, 1),
            RawInputEvent::key(keys::KEY_PAUSE, 0),
        ],
    );

    machine.run(&mut input).unwrap();

    assert_eq!(shutdown.state(), StopKind::Graceful);
    assert_eq!(machine.peer(), None);
    assert_eq!(
        sent.borrow().last().unwrap(),
        &vec![0xA1, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    );
}

#[test]
fn test_signal_stop_before_any_connection() {
    let control = QueuedListener::new(&[]);
    let interrupt = QueuedListener::new(&[]);
    let shutdown = ShutdownController::new();
    let mut machine = SessionMachine::new(control, interrupt, timeouts(), shutdown.clone());
    let (mut input, _writers) = sources(1);

    shutdown.request(StopKind::Immediate);
    machine.run(&mut input).unwrap();

    assert_eq!(machine.state(), SessionState::Idle);
    assert_eq!(machine.stats().sessions, 0);
}

// ============================================================================
// SDP Record Tests
// ============================================================================

#[test]
fn test_service_record_follows_psm_config() {
    let record = ServiceRecord {
        control_psm: 0x1011,
        interrupt_psm: 0x1013,
        ..Default::default()
    };
    let xml = record.to_xml();
    assert!(xml.contains(r#"<uint16 value="0x1011" />"#));
    assert!(xml.contains(r#"<uint16 value="0x1013" />"#));
    assert!(xml.contains(r#"<text value="Raspberry Pi Virtual Keyboard" />"#));
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_default_config() {
    let config = HidClientConfig::default();
    assert_eq!(config.input, InputSelection::EventDevices(Vec::new()));
    assert!(!config.skip_sdp);
    assert!(!config.mute_x11);
    assert_eq!(config.timeouts.control_psm, 0x11);
    assert_eq!(config.timeouts.interrupt_psm, 0x13);
    assert_eq!(config.timeouts.poll, Duration::from_secs(1));
}

#[test]
fn test_device_selection() {
    let all = InputSelection::default();
    assert!(all.includes_device(0));
    assert!(all.includes_device(63));

    let some = InputSelection::EventDevices(vec![3, 7]);
    assert!(some.includes_device(7));
    assert!(!some.includes_device(4));

    let fifo = InputSelection::Fifo("/tmp/hidclient".into());
    assert!(!fifo.includes_device(0));
}
