// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! hidclient CLI entry point
//!
//! Presents this machine's keyboard and mouse to another host as a
//! Bluetooth HID device.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use log::{LevelFilter, error, info};
use simple_logger::SimpleLogger;

use hidclient::input::{probe_devices, x11_device_names};
use hidclient::{HidClientConfig, HidServer, InputSelection, ServerError, ShutdownController};

fn cli() -> Command {
    Command::new("hidclient")
        .version(env!("CARGO_PKG_VERSION"))
        .author("hidclient Authors")
        .about("Emulate a Bluetooth HID keyboard and mouse from local input devices")
        .arg(
            Arg::new("evdev")
                .short('e')
                .long("evdev")
                .value_name("N")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(u8).range(0..64))
                .help("Use only /dev/input/eventN (repeatable; default: all)"),
        )
        .arg(
            Arg::new("fifo")
                .short('f')
                .long("fifo")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .conflicts_with("evdev")
                .help("Read input_event records from a named pipe instead"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List available input devices and exit"),
        )
        .arg(
            Arg::new("skip-sdp")
                .short('s')
                .long("skip-sdp")
                .action(ArgAction::SetTrue)
                .help("Do not register the SDP service record"),
        )
        .arg(
            Arg::new("mute-x11")
                .short('x')
                .long("mute-x11")
                .action(ArgAction::SetTrue)
                .help("Disable the used devices in the local X server while running"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose logging"),
        )
        .arg(
            Arg::new("debug-events")
                .short('d')
                .long("debug-events")
                .action(ArgAction::SetTrue)
                .help("Log every raw input event"),
        )
}

/// Print every readable event device, marking the ones xinput can mute
fn list_devices() -> anyhow::Result<()> {
    let x11_names = x11_device_names().context("Querying X11 input devices");
    let mut out = io::stdout().lock();

    writeln!(out, "List of available input devices:")?;
    writeln!(out, "num\tVendor/Product, Name, -x compatible (x/-)")?;
    if let Err(e) = &x11_names {
        writeln!(out, "\tx11-mutable information not available ({e:#})")?;
    }

    for probe in probe_devices() {
        let marker = match (probe.name(), &x11_names) {
            (Some(name), Ok(names)) => {
                if names.iter().any(|n| n == name) {
                    " (+)"
                } else {
                    " (-)"
                }
            }
            _ => "",
        };
        writeln!(out, "{probe}{marker}")?;
    }

    out.flush().context("Writing device list")
}

/// Drop keystrokes typed at the terminal while input was being captured
fn flush_terminal_input() {
    if !io::stdin().is_terminal() {
        return;
    }
    // SAFETY: tcflush only discards queued input on a descriptor we verified is a terminal.
    unsafe {
        libc::tcflush(libc::STDIN_FILENO, libc::TCIFLUSH);
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    let log_level = if matches.get_flag("debug-events") {
        LevelFilter::Trace
    } else if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(log_level).init() {
        eprintln!("hidclient: cannot initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    if matches.get_flag("list") {
        return match list_devices() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("hidclient: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let input = match matches.get_one::<PathBuf>("fifo") {
        Some(path) => InputSelection::Fifo(path.clone()),
        None => InputSelection::EventDevices(
            matches
                .get_many::<u8>("evdev")
                .map(|indices| indices.map(|&i| usize::from(i)).collect())
                .unwrap_or_default(),
        ),
    };
    let config = HidClientConfig {
        input,
        skip_sdp: matches.get_flag("skip-sdp"),
        mute_x11: matches.get_flag("mute-x11"),
        ..Default::default()
    };

    info!("Starting hidclient with config: {config:?}");

    let shutdown = ShutdownController::new();
    if let Err(e) = shutdown.install_signal_handlers() {
        let err = ServerError::Signals(e);
        error!("{err}");
        eprintln!("hidclient: {err}");
        return ExitCode::from(err.exit_code());
    }

    let mut server = HidServer::new(config, shutdown);
    let result = server.start().and_then(|()| server.run());
    server.stop();
    flush_terminal_input();

    ExitCode::from(finish(&result))
}

/// Report how the run ended and pick the exit code
fn finish(result: &Result<(), ServerError>) -> u8 {
    match result {
        Ok(()) => {
            info!("Stopped hidclient.");
            0
        }
        Err(e) => {
            error!("{e}");
            eprintln!("hidclient: {e}");
            e.exit_code()
        }
    }
}
