// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! SDP Service Advertisement
//!
//! Hosts discover the HID service, its PSMs and its report descriptor
//! through an SDP record. The record is handed to BlueZ as a profile
//! registration on `org.bluez.ProfileManager1`; BlueZ publishes it for as
//! long as the registering D-Bus connection stays open.

use devices::bluetooth::report_descriptor;

use crate::config::{PSM_HID_CONTROL, PSM_HID_INTERRUPT};

/// Human Interface Device service class UUID
pub const HID_PROFILE_UUID: &str = "00001124-0000-1000-8000-00805f9b34fb";

/// Object path the profile is registered under
pub const PROFILE_OBJECT_PATH: &str = "/bluez/hidclient/profile";

/// SDP error types.
#[derive(Debug, thiserror::Error)]
pub enum SdpError {
    /// The system bus could not be reached.
    #[error("Cannot connect to the system bus: {0}")]
    Connection(String),

    /// BlueZ rejected or failed the registration call.
    #[error("Unable to call RegisterProfile: {0}")]
    Register(String),

    /// Built without D-Bus support.
    #[error("SDP registration not available in this build (feature `bluez` disabled)")]
    Unsupported,
}

/// HID SDP service record contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub description: String,
    pub provider: String,
    pub control_psm: u16,
    pub interrupt_psm: u16,
    /// Report descriptor published in the HID descriptor list
    pub report_descriptor: Vec<u8>,
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self {
            name: "Raspberry Pi Virtual Keyboard".to_string(),
            description: "USB > BT Keyboard".to_string(),
            provider: "Raspberry Pi".to_string(),
            control_psm: PSM_HID_CONTROL,
            interrupt_psm: PSM_HID_INTERRUPT,
            report_descriptor: report_descriptor(),
        }
    }
}

impl ServiceRecord {
    /// BlueZ XML form of the record
    pub fn to_xml(&self) -> String {
        let control_psm = self.control_psm;
        let interrupt_psm = self.interrupt_psm;
        let name = xml_escape(&self.name);
        let description = xml_escape(&self.description);
        let provider = xml_escape(&self.provider);
        let descriptor: String = self
            .report_descriptor
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>
<record>
    <attribute id="0x0001">
        <sequence>
            <uuid value="0x1124" />
        </sequence>
    </attribute>
    <attribute id="0x0004">
        <sequence>
            <sequence>
                <uuid value="0x0100" />
                <uint16 value="{control_psm:#06x}" />
            </sequence>
            <sequence>
                <uuid value="0x0011" />
            </sequence>
        </sequence>
    </attribute>
    <attribute id="0x0005">
        <sequence>
            <uuid value="0x1002" />
        </sequence>
    </attribute>
    <attribute id="0x0006">
        <sequence>
            <uint16 value="0x656e" />
            <uint16 value="0x006a" />
            <uint16 value="0x0100" />
        </sequence>
    </attribute>
    <attribute id="0x0009">
        <sequence>
            <sequence>
                <uuid value="0x1124" />
                <uint16 value="0x0100" />
            </sequence>
        </sequence>
    </attribute>
    <attribute id="0x000d">
        <sequence>
            <sequence>
                <sequence>
                    <uuid value="0x0100" />
                    <uint16 value="{interrupt_psm:#06x}" />
                </sequence>
                <sequence>
                    <uuid value="0x0011" />
                </sequence>
            </sequence>
        </sequence>
    </attribute>
    <attribute id="0x0100">
        <text value="{name}" />
    </attribute>
    <attribute id="0x0101">
        <text value="{description}" />
    </attribute>
    <attribute id="0x0102">
        <text value="{provider}" />
    </attribute>
    <attribute id="0x0200">
        <uint16 value="0x0100" />
    </attribute>
    <attribute id="0x0201">
        <uint16 value="0x0111" />
    </attribute>
    <attribute id="0x0202">
        <uint8 value="0x40" />
    </attribute>
    <attribute id="0x0203">
        <uint8 value="0x00" />
    </attribute>
    <attribute id="0x0204">
        <boolean value="false" />
    </attribute>
    <attribute id="0x0205">
        <boolean value="false" />
    </attribute>
    <attribute id="0x0206">
        <sequence>
            <sequence>
                <uint8 value="0x22" />
                <text encoding="hex" value="{descriptor}" />
            </sequence>
        </sequence>
    </attribute>
    <attribute id="0x0207">
        <sequence>
            <sequence>
                <uint16 value="0x0409" />
                <uint16 value="0x0100" />
            </sequence>
        </sequence>
    </attribute>
    <attribute id="0x020b">
        <uint16 value="0x0100" />
    </attribute>
    <attribute id="0x020c">
        <uint16 value="0x0c80" />
    </attribute>
    <attribute id="0x020d">
        <boolean value="true" />
    </attribute>
    <attribute id="0x020e">
        <boolean value="false" />
    </attribute>
    <attribute id="0x020f">
        <uint16 value="0x0640" />
    </attribute>
    <attribute id="0x0210">
        <uint16 value="0x0320" />
    </attribute>
</record>
"#
        )
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Publisher of the HID service record
pub trait ProfileRegistry {
    /// Publish `record`
    fn register(&mut self, record: &ServiceRecord) -> Result<(), SdpError>;

    /// Withdraw the record; failures are logged only
    fn unregister(&mut self);
}

/// Registration through BlueZ's `ProfileManager1` D-Bus interface
#[derive(Default)]
pub struct BluezProfile {
    #[cfg(feature = "bluez")]
    connection: Option<zbus::blocking::Connection>,
}

impl BluezProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a registration is currently held
    pub fn is_registered(&self) -> bool {
        #[cfg(feature = "bluez")]
        {
            self.connection.is_some()
        }
        #[cfg(not(feature = "bluez"))]
        {
            false
        }
    }
}

#[cfg(feature = "bluez")]
mod bluez {
    use std::collections::HashMap;

    use log::{debug, info, warn};
    use zbus::blocking::Connection;
    use zbus::zvariant::{ObjectPath, Value};

    use super::{BluezProfile, HID_PROFILE_UUID, PROFILE_OBJECT_PATH, ProfileRegistry, SdpError, ServiceRecord};

    const BLUEZ_SERVICE: &str = "org.bluez";
    const BLUEZ_PATH: &str = "/org/bluez";
    const PROFILE_MANAGER: &str = "org.bluez.ProfileManager1";

    fn profile_path() -> Result<ObjectPath<'static>, SdpError> {
        ObjectPath::try_from(PROFILE_OBJECT_PATH).map_err(|e| SdpError::Register(e.to_string()))
    }

    impl ProfileRegistry for BluezProfile {
        fn register(&mut self, record: &ServiceRecord) -> Result<(), SdpError> {
            let connection =
                Connection::system().map_err(|e| SdpError::Connection(e.to_string()))?;

            let xml = record.to_xml();
            let mut options: HashMap<&str, Value<'_>> = HashMap::new();
            options.insert("ServiceRecord", Value::from(xml.as_str()));
            options.insert("Role", Value::from("server"));
            options.insert("RequireAuthentication", Value::from(false));
            options.insert("RequireAuthorization", Value::from(false));

            connection
                .call_method(
                    Some(BLUEZ_SERVICE),
                    BLUEZ_PATH,
                    Some(PROFILE_MANAGER),
                    "RegisterProfile",
                    &(profile_path()?, HID_PROFILE_UUID, options),
                )
                .map_err(|e| SdpError::Register(e.to_string()))?;

            info!("HID keyboard/mouse service registered");
            self.connection = Some(connection);
            Ok(())
        }

        fn unregister(&mut self) {
            let Some(connection) = self.connection.take() else {
                return;
            };
            let path = match profile_path() {
                Ok(path) => path,
                Err(e) => {
                    warn!("{e}");
                    return;
                }
            };
            match connection.call_method(
                Some(BLUEZ_SERVICE),
                BLUEZ_PATH,
                Some(PROFILE_MANAGER),
                "UnregisterProfile",
                &path,
            ) {
                Ok(_) => debug!("HID service record withdrawn"),
                Err(e) => warn!("Unable to call UnregisterProfile: {e}"),
            }
        }
    }
}

#[cfg(not(feature = "bluez"))]
impl ProfileRegistry for BluezProfile {
    fn register(&mut self, _record: &ServiceRecord) -> Result<(), SdpError> {
        Err(SdpError::Unsupported)
    }

    fn unregister(&mut self) {}
}
