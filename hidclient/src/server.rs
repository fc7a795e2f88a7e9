// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! HID Client Server
//!
//! Brings the collaborators up in order (SDP record, input sources, X11
//! muting, adapter, L2CAP listeners), hands control to the session machine,
//! and takes everything down again in reverse.

use std::io;

use log::{debug, info, warn};

use crate::adapter::{AdapterControl, BluezAdapter};
use crate::config::HidClientConfig;
use crate::input::{InputError, InputMultiplexer, InputMuter, NoopMuter, SourceKind, XinputMuter};
use crate::sdp::{BluezProfile, ProfileRegistry, SdpError, ServiceRecord};
use crate::session::{ChannelKind, L2capListener, SessionError, SessionMachine};
use crate::shutdown::ShutdownController;

/// Top-level failure, each class with its own process exit code
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// SDP registration failed.
    #[error("Failed to register with SDP server: {0}")]
    Sdp(#[from] SdpError),

    /// No input source could be opened.
    #[error("Failed to open input: {0}")]
    Input(#[from] InputError),

    /// Signal handlers could not be installed.
    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    /// Socket setup or the session loop failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ServerError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            ServerError::Sdp(_) => 1,
            ServerError::Input(_) => 2,
            ServerError::Signals(_) => 6,
            ServerError::Session(e) => match e {
                SessionError::Bind { .. } => 3,
                SessionError::Listen { .. } => 4,
                SessionError::Socket(_) => 5,
                SessionError::AcceptWait {
                    channel: ChannelKind::Control,
                    ..
                } => 11,
                SessionError::AcceptWait {
                    channel: ChannelKind::Interrupt,
                    ..
                } => 12,
                SessionError::Input(_) => 13,
            },
        }
    }
}

/// HID client
pub struct HidServer {
    config: HidClientConfig,
    shutdown: ShutdownController,
    registry: Box<dyn ProfileRegistry>,
    muter: Box<dyn InputMuter>,
    adapter: Box<dyn AdapterControl>,
    input: Option<InputMultiplexer>,
    machine: Option<SessionMachine<L2capListener>>,
}

impl HidServer {
    /// Create a server publishing through BlueZ and muting through xinput
    pub fn new(config: HidClientConfig, shutdown: ShutdownController) -> Self {
        let muter: Box<dyn InputMuter> = if config.mute_x11 {
            match XinputMuter::new() {
                Ok(muter) => Box::new(muter),
                Err(e) => {
                    warn!("x11-mutable information not available: {e}");
                    Box::new(NoopMuter)
                }
            }
        } else {
            Box::new(NoopMuter)
        };
        Self::with_collaborators(
            config,
            shutdown,
            Box::new(BluezProfile::new()),
            muter,
            Box::new(BluezAdapter),
        )
    }

    pub fn with_collaborators(
        config: HidClientConfig,
        shutdown: ShutdownController,
        registry: Box<dyn ProfileRegistry>,
        muter: Box<dyn InputMuter>,
        adapter: Box<dyn AdapterControl>,
    ) -> Self {
        Self {
            config,
            shutdown,
            registry,
            muter,
            adapter,
            input: None,
            machine: None,
        }
    }

    /// Bring every collaborator up
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.config.skip_sdp {
            info!("Skipping SDP registration");
        } else {
            self.registry.register(&ServiceRecord {
                control_psm: self.config.timeouts.control_psm,
                interrupt_psm: self.config.timeouts.interrupt_psm,
                ..Default::default()
            })?;
        }

        let input = self.input.insert(InputMultiplexer::open(&self.config.input)?);
        if self.config.mute_x11 {
            for source in input.sources() {
                if source.kind() != SourceKind::Device {
                    continue;
                }
                if let Err(e) = self.muter.mute(source) {
                    warn!("Failed to x11-mute '{}': {e}", source.name());
                }
            }
        }

        if let Err(e) = self.adapter.prepare(&self.config.adapter) {
            warn!("Adapter {} not prepared, hosts may not find it: {e}", self.config.adapter);
        }

        let timeouts = &self.config.timeouts;
        let control = L2capListener::bind(timeouts.control_psm, timeouts.send)?;
        let interrupt = L2capListener::bind(timeouts.interrupt_psm, timeouts.send)?;
        debug!(
            "Listening on control PSM {} and interrupt PSM {}",
            control.psm(),
            interrupt.psm()
        );
        self.machine = Some(SessionMachine::new(
            control,
            interrupt,
            self.config.timeouts.clone(),
            self.shutdown.clone(),
        ));

        info!("The HID-Client is now ready to accept connections from another machine");
        Ok(())
    }

    /// Serve sessions until a stop is requested
    pub fn run(&mut self) -> Result<(), ServerError> {
        let (Some(machine), Some(input)) = (self.machine.as_mut(), self.input.as_mut()) else {
            return Ok(());
        };
        machine.run(input)?;
        Ok(())
    }

    /// Tear down whatever [`HidServer::start`] brought up
    pub fn stop(&mut self) {
        if let Some(machine) = self.machine.take() {
            let stats = machine.stats();
            info!(
                "Served {} session(s): {} reports sent, {} discarded, {} send failures",
                stats.sessions, stats.reports_sent, stats.reports_discarded, stats.send_failures
            );
        }

        if let Some(input) = self.input.take() {
            for source in input.sources() {
                if let Err(e) = self.muter.unmute(source) {
                    warn!("Failed to x11-unmute '{}': {e}", source.name());
                }
            }
        }

        self.registry.unregister();
        debug!("Stop request: {:?}", self.shutdown.state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::adapter::AdapterError;
    use crate::config::InputSelection;

    #[derive(Default)]
    struct Calls {
        registered: Vec<ServiceRecord>,
        unregistered: usize,
        prepared: Vec<String>,
    }

    struct RecordingRegistry {
        calls: Rc<RefCell<Calls>>,
        fail: bool,
    }

    impl ProfileRegistry for RecordingRegistry {
        fn register(&mut self, record: &ServiceRecord) -> Result<(), SdpError> {
            if self.fail {
                return Err(SdpError::Register("org.bluez.Error.NotPermitted".to_string()));
            }
            self.calls.borrow_mut().registered.push(record.clone());
            Ok(())
        }

        fn unregister(&mut self) {
            self.calls.borrow_mut().unregistered += 1;
        }
    }

    struct RecordingAdapter {
        calls: Rc<RefCell<Calls>>,
    }

    impl AdapterControl for RecordingAdapter {
        fn prepare(&mut self, adapter: &str) -> Result<(), AdapterError> {
            self.calls.borrow_mut().prepared.push(adapter.to_string());
            Err(AdapterError::Connection("no system bus".to_string()))
        }
    }

    fn server(config: HidClientConfig, fail: bool) -> (HidServer, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let registry = RecordingRegistry {
            calls: Rc::clone(&calls),
            fail,
        };
        let adapter = RecordingAdapter {
            calls: Rc::clone(&calls),
        };
        let server = HidServer::with_collaborators(
            config,
            ShutdownController::new(),
            Box::new(registry),
            Box::new(NoopMuter),
            Box::new(adapter),
        );
        (server, calls)
    }

    #[test]
    fn test_exit_codes() {
        let io = || io::Error::from_raw_os_error(libc::EINVAL);
        let cases: Vec<(ServerError, u8)> = vec![
            (SdpError::Unsupported.into(), 1),
            (InputError::NoDevices.into(), 2),
            (SessionError::Bind { psm: 17, source: io() }.into(), 3),
            (SessionError::Listen { psm: 19, source: io() }.into(), 4),
            (SessionError::Socket(io()).into(), 5),
            (ServerError::Signals(io()), 6),
            (
                SessionError::AcceptWait {
                    channel: ChannelKind::Control,
                    source: io(),
                }
                .into(),
                11,
            ),
            (
                SessionError::AcceptWait {
                    channel: ChannelKind::Interrupt,
                    source: io(),
                }
                .into(),
                12,
            ),
            (SessionError::Input(InputError::Poll(io())).into(), 13),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{err}");
        }
    }

    #[test]
    fn test_sdp_failure_aborts_start() {
        let (mut server, calls) = server(HidClientConfig::default(), true);

        let err = server.start().unwrap_err();
        assert_eq!(err.exit_code(), 1);

        server.stop();
        assert_eq!(calls.borrow().unregistered, 1);
    }

    #[test]
    fn test_fifo_failure_after_registration() {
        let path = std::env::temp_dir().join(format!("hidclient-server-{}", std::process::id()));
        std::fs::write(&path, b"regular file").unwrap();
        let config = HidClientConfig {
            input: InputSelection::Fifo(path.clone()),
            ..Default::default()
        };
        let (mut server, calls) = server(config, false);

        let err = server.start().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(calls.borrow().registered.len(), 1);
        assert_eq!(calls.borrow().registered[0].control_psm, 17);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_skip_sdp() {
        let path = std::env::temp_dir().join(format!("hidclient-skip-{}", std::process::id()));
        std::fs::write(&path, b"regular file").unwrap();
        let config = HidClientConfig {
            input: InputSelection::Fifo(path.clone()),
            skip_sdp: true,
            ..Default::default()
        };
        let (mut server, calls) = server(config, true);

        // Registration would fail, but is never attempted
        assert_eq!(server.start().unwrap_err().exit_code(), 2);
        assert!(calls.borrow().registered.is_empty());
        // Input failed first, so the adapter was left alone
        assert!(calls.borrow().prepared.is_empty());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_adapter_failure_is_not_fatal() {
        let path = std::env::temp_dir().join(format!("hidclient-adapter-{}", std::process::id()));
        let config = HidClientConfig {
            input: InputSelection::Fifo(path.clone()),
            skip_sdp: true,
            ..Default::default()
        };
        let (mut server, calls) = server(config, false);

        // Without a Bluetooth stack the listeners fail next; with one they bind.
        if let Err(e) = server.start() {
            assert!(matches!(e.exit_code(), 3..=5), "{e}");
        }
        assert_eq!(calls.borrow().prepared, vec!["hci0".to_string()]);

        server.stop();
        let _ = std::fs::remove_file(&path);
    }
}
