//! Domain types for the junction multisig wallet client.
//!
//! This crate models what the local wallet backend reports: attached hardware
//! [`device`]s, configured multisig [`wallet`]s with their signers, pending
//! [`psbt`]s, the wallet [`activity`] seen by the node and node [`settings`]. On top of these models it provides the pure
//! reconciliation logic that decides which devices can be added to a wallet, which
//! signers have a usable device attached, which signers have signed a PSBT and how
//! many signatures are still missing before it may be broadcast.
//!
//! Every function here is pure: the same inputs always produce the same outputs.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod activity;
pub mod device;
pub mod psbt;
pub mod settings;
pub mod wallet;

use alloc::string::String;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A master key fingerprint identifying a hardware signer.
///
/// Fingerprints are compared with exact string equality; no normalisation of
/// case or width is performed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns the fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(fingerprint: String) -> Self {
        Self(fingerprint)
    }
}

impl From<&str> for Fingerprint {
    fn from(fingerprint: &str) -> Self {
        Self(fingerprint.into())
    }
}

impl From<Fingerprint> for String {
    fn from(Fingerprint(fingerprint): Fingerprint) -> Self {
        fingerprint
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
