//! Device identities and ordered device signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Identity of one compute device as far as binary compatibility goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device vendor, e.g. `Advanced Micro Devices, Inc.`.
    #[serde(default)]
    pub vendor: String,

    /// Device name as reported by the runtime.
    pub name: String,

    /// Platform (driver stack) name.
    #[serde(default)]
    pub platform: String,

    /// Driver or platform version.
    #[serde(default)]
    pub driver_version: String,
}

impl DeviceIdentity {
    pub fn new(
        vendor: impl Into<String>,
        name: impl Into<String>,
        platform: impl Into<String>,
        driver_version: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            name: name.into(),
            platform: platform.into(),
            driver_version: driver_version.into(),
        }
    }

    /// Canonical text form `vendor/name/platform/driver_version`.
    ///
    /// `%`, `/` and `;` inside a field are percent-escaped so the form
    /// stays unambiguous once identities are joined into a signature.
    pub fn canonical(&self) -> String {
        [
            &self.vendor,
            &self.name,
            &self.platform,
            &self.driver_version,
        ]
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join("/")
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn escape_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            ';' => escaped.push_str("%3B"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Order-sensitive identifier of the device list a program targets.
///
/// The same devices in a different order give a different signature,
/// because the runtime lays out per-device binaries in list order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceSignature {
    text: String,
    devices: Vec<String>,
}

impl DeviceSignature {
    /// Builds the signature of `identities`, in the given order.
    pub fn from_identities(identities: &[DeviceIdentity]) -> Result<Self, CacheError> {
        if identities.is_empty() {
            return Err(CacheError::invalid_argument(
                "at least one device is required",
            ));
        }

        let devices: Vec<String> = identities.iter().map(DeviceIdentity::canonical).collect();
        Ok(Self {
            text: devices.join(";"),
            devices,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Canonical identity of each device, in signature order.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
