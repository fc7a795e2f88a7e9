// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Local Input Muting
//!
//! Captured devices keep feeding the local desktop unless told otherwise.
//! [`XinputMuter`] disables them in the X server through the `xinput` tool
//! for as long as the process runs.

use std::collections::HashMap;
use std::process::Command;

use log::{debug, info};

use super::source::EventSource;

const XINPUT: &str = "xinput";

/// Shortest device name matched against the X device list
const MIN_NAME_LEN: usize = 4;

/// Muting error types.
#[derive(Debug, thiserror::Error)]
pub enum MuteError {
    /// `xinput` could not be started.
    #[error("Failed to run xinput: {0}")]
    Spawn(#[from] std::io::Error),

    /// `xinput` ran but reported failure.
    #[error("xinput {args} exited with {status}")]
    Status {
        args: String,
        status: std::process::ExitStatus,
    },

    /// The device is unknown to the X server.
    #[error("No X input device matches '{0}'")]
    UnknownDevice(String),
}

/// Suppresses local delivery of a source's events
pub trait InputMuter {
    /// Stop local delivery of events from `source`
    fn mute(&mut self, source: &EventSource) -> Result<(), MuteError>;

    /// Undo [`InputMuter::mute`]; no-op for sources never muted
    fn unmute(&mut self, source: &EventSource) -> Result<(), MuteError>;
}

/// Muter that leaves every device alone
#[derive(Debug, Default)]
pub struct NoopMuter;

impl InputMuter for NoopMuter {
    fn mute(&mut self, _source: &EventSource) -> Result<(), MuteError> {
        Ok(())
    }

    fn unmute(&mut self, _source: &EventSource) -> Result<(), MuteError> {
        Ok(())
    }
}

/// Muter driving `xinput set-int-prop <id> "Device Enabled" 8 0|1`
#[derive(Debug, Default)]
pub struct XinputMuter {
    listing: String,
    /// Source index to X device id
    muted: HashMap<usize, u32>,
}

impl XinputMuter {
    /// Snapshot the X server's device list
    pub fn new() -> Result<Self, MuteError> {
        Ok(Self::from_listing(run_xinput(&["--list", "--short"])?))
    }

    /// Build from the output of `xinput --list --short`
    pub fn from_listing(listing: impl Into<String>) -> Self {
        Self {
            listing: listing.into(),
            muted: HashMap::new(),
        }
    }

    /// X device id for an evdev device name
    pub fn device_id(&self, name: &str) -> Option<u32> {
        if name.len() < MIN_NAME_LEN {
            return None;
        }
        self.listing.lines().find_map(|line| {
            let (label, rest) = line.split_once("\tid=")?;
            let prefix = label.trim_end().strip_suffix(name)?;
            if !prefix.is_empty() && !prefix.ends_with(char::is_whitespace) {
                return None;
            }
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
    }

    /// Muted sources, as source index to X device id
    pub fn muted(&self) -> &HashMap<usize, u32> {
        &self.muted
    }
}

impl InputMuter for XinputMuter {
    fn mute(&mut self, source: &EventSource) -> Result<(), MuteError> {
        let id = self
            .device_id(source.name())
            .ok_or_else(|| MuteError::UnknownDevice(source.name().to_string()))?;
        set_device_enabled(id, false)?;
        info!("Muted '{}' in X11 [xinput id {id}]", source.name());
        self.muted.insert(source.index(), id);
        Ok(())
    }

    fn unmute(&mut self, source: &EventSource) -> Result<(), MuteError> {
        let Some(id) = self.muted.remove(&source.index()) else {
            return Ok(());
        };
        set_device_enabled(id, true)?;
        debug!("Unmuted '{}' [xinput id {id}]", source.name());
        Ok(())
    }
}

/// Names of all devices known to the X server (`xinput --list --name-only`)
pub fn x11_device_names() -> Result<Vec<String>, MuteError> {
    let output = run_xinput(&["--list", "--name-only"])?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn set_device_enabled(id: u32, enabled: bool) -> Result<(), MuteError> {
    let id = id.to_string();
    let value = if enabled { "1" } else { "0" };
    run_xinput(&["set-int-prop", &id, "Device Enabled", "8", value]).map(|_| ())
}

fn run_xinput(args: &[&str]) -> Result<String, MuteError> {
    let output = Command::new(XINPUT).args(args).output()?;
    if !output.status.success() {
        return Err(MuteError::Status {
            args: args.join(" "),
            status: output.status,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
