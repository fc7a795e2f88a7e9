// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Adapter Bring-Up
//!
//! A host can only pair with an adapter that is powered and discoverable.
//! [`BluezAdapter`] sets both through the `org.bluez.Adapter1` properties
//! before the L2CAP listeners are bound.

/// Adapter used when none is configured
pub const DEFAULT_ADAPTER: &str = "hci0";

/// Adapter error types.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The system bus could not be reached.
    #[error("Cannot connect to the system bus: {0}")]
    Connection(String),

    /// BlueZ refused to change an adapter property.
    #[error("Unable to set {property} on {adapter}: {message}")]
    Property {
        adapter: String,
        property: &'static str,
        message: String,
    },

    /// Built without D-Bus support.
    #[error("Adapter setup not available in this build (feature `bluez` disabled)")]
    Unsupported,
}

/// Local Bluetooth adapter control
pub trait AdapterControl {
    /// Power `adapter` on and keep it discoverable
    fn prepare(&mut self, adapter: &str) -> Result<(), AdapterError>;
}

/// Adapter control through BlueZ's D-Bus properties
#[derive(Debug, Default)]
pub struct BluezAdapter;

#[cfg(feature = "bluez")]
mod bluez {
    use log::info;
    use zbus::blocking::Connection;
    use zbus::zvariant::Value;

    use super::{AdapterControl, AdapterError, BluezAdapter};

    const BLUEZ_SERVICE: &str = "org.bluez";
    const PROPERTIES: &str = "org.freedesktop.DBus.Properties";
    const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

    fn set_property(
        connection: &Connection,
        adapter: &str,
        property: &'static str,
        value: Value<'_>,
    ) -> Result<(), AdapterError> {
        let path = format!("/org/bluez/{adapter}");
        connection
            .call_method(
                Some(BLUEZ_SERVICE),
                path.as_str(),
                Some(PROPERTIES),
                "Set",
                &(ADAPTER_INTERFACE, property, value),
            )
            .map_err(|e| AdapterError::Property {
                adapter: adapter.to_string(),
                property,
                message: e.to_string(),
            })?;
        Ok(())
    }

    impl AdapterControl for BluezAdapter {
        fn prepare(&mut self, adapter: &str) -> Result<(), AdapterError> {
            let connection =
                Connection::system().map_err(|e| AdapterError::Connection(e.to_string()))?;

            set_property(&connection, adapter, "Powered", Value::from(true))?;
            // Zero keeps the adapter discoverable until told otherwise
            set_property(&connection, adapter, "DiscoverableTimeout", Value::from(0u32))?;
            set_property(&connection, adapter, "Discoverable", Value::from(true))?;

            info!("Adapter {adapter} powered and discoverable");
            Ok(())
        }
    }
}

#[cfg(not(feature = "bluez"))]
impl AdapterControl for BluezAdapter {
    fn prepare(&mut self, _adapter: &str) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported)
    }
}
