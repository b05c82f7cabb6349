//! Hardware signing devices as enumerated by the backend.

use alloc::string::String;
use core::{convert::Infallible, fmt, str::FromStr};

use bon::Builder;
use dissolve_derive::Dissolve;
use strum::{Display, IntoStaticStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// The vendor family of a hardware device.
///
/// Vendors the backend reports that are not known here are kept verbatim in
/// [`DeviceType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde_with::SerializeDisplay, serde_with::DeserializeFromStr))]
pub enum DeviceType {
    /// A Ledger device.
    Ledger,
    /// A Trezor device.
    Trezor,
    /// A Coldcard device.
    Coldcard,
    /// Any other vendor string.
    Other(String),
}

impl DeviceType {
    /// Returns the wire representation of this device type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ledger => "ledger",
            Self::Trezor => "trezor",
            Self::Coldcard => "coldcard",
            Self::Other(other) => other,
        }
    }

    /// Whether this device is unlocked by entering a PIN through the backend's
    /// prompt (`POST /prompt` then `POST /unlock`) rather than on the device itself.
    pub fn unlocks_via_pin_prompt(&self) -> bool {
        matches!(self, Self::Trezor)
    }
}

impl FromStr for DeviceType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let device_type = match s {
            "ledger" => Self::Ledger,
            "trezor" => Self::Trezor,
            "coldcard" => Self::Coldcard,
            other => Self::Other(other.into()),
        };

        Ok(device_type)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The coarse status of a [`Device`], mostly useful for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceStatus {
    /// The device reported its fingerprint and can sign.
    Unlocked,
    /// The device needs a PIN or passphrase before it reports a fingerprint.
    Locked,
    /// The device could not be used.
    Error,
}

/// A device that is unlocked and has reported its master key fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnlockedDevice {
    /// The connection handle of the device.
    #[builder(into)]
    path: String,

    /// The device vendor.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    device_type: DeviceType,

    /// The master key fingerprint.
    #[builder(into)]
    fingerprint: Fingerprint,
}

/// A device that is waiting for a PIN or passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LockedDevice {
    /// The connection handle of the device.
    #[builder(into)]
    path: String,

    /// The device vendor.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    device_type: DeviceType,

    /// Whether the device waits for a PIN.
    #[builder(default)]
    needs_pin_sent: bool,

    /// Whether the device waits for a passphrase.
    #[builder(default)]
    needs_passphrase_sent: bool,

    /// The error the backend reported while the device was locked, if any.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    error: Option<String>,
}

/// A device the backend could not talk to.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorDevice {
    /// The connection handle of the device.
    #[builder(into)]
    path: String,

    /// The device vendor.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    device_type: DeviceType,

    /// The backend's numeric error code, if one was reported.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    code: Option<i64>,

    /// The error message.
    #[builder(into)]
    message: String,
}

/// A hardware signing device in one of its three observable states.
///
/// A device may move between variants from one enumeration to the next, for
/// example from [`Device::Locked`] to [`Device::Unlocked`] once the user enters
/// its PIN. Devices carry no identity beyond their path and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "status", rename_all = "snake_case")
)]
pub enum Device {
    /// The device is unlocked and has a fingerprint.
    Unlocked(UnlockedDevice),
    /// The device is locked.
    Locked(LockedDevice),
    /// The device is unusable.
    Error(ErrorDevice),
}

impl UnlockedDevice {
    /// Returns the connection handle.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the device vendor.
    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    /// Returns the master key fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl LockedDevice {
    /// Returns the connection handle.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the device vendor.
    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    /// Whether the device waits for a PIN.
    pub fn needs_pin_sent(&self) -> bool {
        self.needs_pin_sent
    }

    /// Whether the device waits for a passphrase.
    pub fn needs_passphrase_sent(&self) -> bool {
        self.needs_passphrase_sent
    }

    /// Returns the error reported alongside the locked state.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl ErrorDevice {
    /// Returns the connection handle.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the device vendor.
    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    /// Returns the backend's error code.
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Device {
    /// Returns the connection handle.
    pub fn path(&self) -> &str {
        match self {
            Self::Unlocked(device) => device.path(),
            Self::Locked(device) => device.path(),
            Self::Error(device) => device.path(),
        }
    }

    /// Returns the device vendor.
    pub fn device_type(&self) -> &DeviceType {
        match self {
            Self::Unlocked(device) => device.device_type(),
            Self::Locked(device) => device.device_type(),
            Self::Error(device) => device.device_type(),
        }
    }

    /// Returns the fingerprint if, and only if, the device is unlocked.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.as_unlocked().map(UnlockedDevice::fingerprint)
    }

    /// Returns the unlocked device, if this is one.
    pub fn as_unlocked(&self) -> Option<&UnlockedDevice> {
        match self {
            Self::Unlocked(device) => Some(device),
            Self::Locked(_) | Self::Error(_) => None,
        }
    }

    /// Returns the coarse status of the device.
    pub fn status(&self) -> DeviceStatus {
        match self {
            Self::Unlocked(_) => DeviceStatus::Unlocked,
            Self::Locked(_) => DeviceStatus::Locked,
            Self::Error(_) => DeviceStatus::Error,
        }
    }
}

impl From<UnlockedDevice> for Device {
    fn from(device: UnlockedDevice) -> Self {
        Self::Unlocked(device)
    }
}

impl From<LockedDevice> for Device {
    fn from(device: LockedDevice) -> Self {
        Self::Locked(device)
    }
}

impl From<ErrorDevice> for Device {
    fn from(device: ErrorDevice) -> Self {
        Self::Error(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_round_trips_unknown_vendors() {
        let known: DeviceType = "coldcard".parse().unwrap();
        let unknown: DeviceType = "keepkey".parse().unwrap();

        assert_eq!(known, DeviceType::Coldcard);
        assert_eq!(unknown, DeviceType::Other("keepkey".into()));
        assert_eq!(unknown.as_str(), "keepkey");
    }

    #[test]
    fn only_unlocked_devices_expose_a_fingerprint() {
        let unlocked: Device = UnlockedDevice::builder()
            .path("usb:1")
            .device_type(DeviceType::Ledger)
            .fingerprint("123")
            .build()
            .into();
        let locked: Device = LockedDevice::builder()
            .path("usb:2")
            .device_type(DeviceType::Trezor)
            .needs_pin_sent(true)
            .build()
            .into();

        assert_eq!(unlocked.fingerprint().map(Fingerprint::as_str), Some("123"));
        assert_eq!(locked.fingerprint(), None);
        assert_eq!(locked.status(), DeviceStatus::Locked);
    }
}
