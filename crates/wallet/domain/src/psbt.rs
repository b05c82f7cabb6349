//! Partially signed transactions and signature tracking.
//!
//! A [`Psbt`] here is the backend's decoded view of a partially signed bitcoin
//! transaction: for each input, the BIP32 derivations of the keys that may sign it
//! and the partial signatures collected so far, plus the transaction outputs.

use alloc::{borrow::Cow, collections::BTreeMap, string::String, vec::Vec};

use bon::Builder;
use dissolve_derive::Dissolve;
use strum::{Display, EnumString, IntoStaticStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// A BIP32 derivation entry of a PSBT input.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bip32Deriv {
    /// The hex encoded public key this derivation produces.
    #[builder(into)]
    pubkey: String,

    /// The fingerprint of the master key the public key derives from.
    #[builder(into)]
    master_fingerprint: Fingerprint,

    /// The derivation path, e.g. `m/48'/1'/0'/2'/0/3`.
    #[builder(into, default)]
    path: String,
}

/// One input of a [`Psbt`].
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PsbtInput {
    /// Derivations of the keys that can sign this input.
    #[builder(default)]
    bip32_derivs: Vec<Bip32Deriv>,

    /// Collected signatures keyed by public key. `None` when the backend reported
    /// no signature map for this input at all.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    partial_signatures: Option<BTreeMap<String, String>>,
}

/// One output of the unsigned transaction.
#[derive(Debug, Clone, PartialEq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TxOutput {
    /// The output index.
    n: u32,

    /// The amount in BTC.
    value: f64,

    /// The addresses the output pays to.
    #[builder(default)]
    addresses: Vec<String>,
}

/// A pending partially signed transaction.
#[derive(Debug, Clone, PartialEq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Psbt {
    /// The id of the unsigned transaction, when the backend reports it.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    txid: Option<String>,

    /// The transaction inputs with their signing metadata.
    #[builder(default)]
    inputs: Vec<PsbtInput>,

    /// The transaction outputs.
    #[builder(default)]
    outputs: Vec<TxOutput>,

    /// The fee in BTC, when the backend reports it.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    fee: Option<f64>,
}

/// How the number of signatures already collected on a PSBT is counted.
///
/// [`SignatureCounting::FirstInput`] counts the partial signatures of the first
/// input only. This matches what wallets built against this backend have always
/// displayed, but under-reports missing signatures on PSBTs whose inputs were
/// signed unevenly. [`SignatureCounting::EveryInput`] takes the minimum, across
/// all inputs, of the distinct signing keys with a recorded signature, which is
/// exactly the condition under which every input meets the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum SignatureCounting {
    /// Count the partial signatures of the first input.
    #[default]
    FirstInput,
    /// Count the signing keys present on every input.
    EveryInput,
}

/// Where a PSBT stands in its signing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum PsbtStage {
    /// No signatures yet.
    Created,
    /// Some, but fewer than the threshold.
    PartiallySigned,
    /// At least the threshold; the PSBT may be broadcast.
    FullySigned,
    /// The PSBT has been broadcast and must not be signed or broadcast again.
    Broadcast,
}

/// Errors raised while reading a PSBT reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPsbtError {
    /// The PSBT is not an object of the expected shape.
    #[error("invalid psbt: {0}")]
    Invalid(Cow<'static, str>),

    /// The PSBT has no `inputs` field.
    #[error("psbt has no inputs")]
    MissingInputs,

    /// The PSBT has no `tx` field.
    #[error("psbt has no decoded transaction")]
    MissingTx,

    /// The decoded transaction has no `vout` field.
    #[error("psbt transaction has no outputs")]
    MissingOutputs,

    /// An input could not be read.
    #[error("malformed psbt input {index}: {reason}")]
    Input {
        /// The input index.
        index: usize,
        /// What is wrong with it.
        reason: Cow<'static, str>,
    },

    /// An output could not be read.
    #[error("malformed psbt output {index}: {reason}")]
    Output {
        /// The output index.
        index: usize,
        /// What is wrong with it.
        reason: Cow<'static, str>,
    },
}

impl Bip32Deriv {
    /// Returns the public key.
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    /// Returns the master fingerprint.
    pub fn master_fingerprint(&self) -> &Fingerprint {
        &self.master_fingerprint
    }

    /// Returns the derivation path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PsbtInput {
    /// Returns the BIP32 derivations of this input.
    pub fn bip32_derivs(&self) -> &[Bip32Deriv] {
        &self.bip32_derivs
    }

    /// Returns the collected signatures, if the input has a signature map.
    pub fn partial_signatures(&self) -> Option<&BTreeMap<String, String>> {
        self.partial_signatures.as_ref()
    }

    /// Whether the key of `fingerprint` has signed this input.
    ///
    /// Returns `None` when the input has no signature map at all.
    pub fn signed_by(&self, fingerprint: &Fingerprint) -> Option<bool> {
        let signatures = self.partial_signatures.as_ref()?;

        let signed = self.bip32_derivs.iter().any(|deriv| {
            deriv.master_fingerprint == *fingerprint && signatures.contains_key(&deriv.pubkey)
        });

        Some(signed)
    }

    /// Returns the number of entries in the signature map.
    pub fn signature_count(&self) -> usize {
        self.partial_signatures.as_ref().map_or(0, BTreeMap::len)
    }

    /// Returns the number of distinct (fingerprint, pubkey) derivations that carry
    /// a signature.
    pub fn signing_key_count(&self) -> usize {
        let Some(signatures) = self.partial_signatures.as_ref() else {
            return 0;
        };

        let mut signed: Vec<(&Fingerprint, &str)> = self
            .bip32_derivs
            .iter()
            .filter(|deriv| signatures.contains_key(&deriv.pubkey))
            .map(|deriv| (&deriv.master_fingerprint, deriv.pubkey.as_str()))
            .collect();

        signed.sort_unstable();
        signed.dedup();
        signed.len()
    }
}

impl TxOutput {
    /// Returns the output index.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Returns the amount in BTC.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns every address the output pays to.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Returns the first address the output pays to.
    pub fn address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

impl Psbt {
    /// Returns the id of the unsigned transaction.
    pub fn txid(&self) -> Option<&str> {
        self.txid.as_deref()
    }

    /// Returns the inputs.
    pub fn inputs(&self) -> &[PsbtInput] {
        &self.inputs
    }

    /// Returns the outputs.
    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    /// Returns the fee in BTC.
    pub fn fee(&self) -> Option<f64> {
        self.fee
    }

    /// Whether the key of `fingerprint` has signed every input.
    ///
    /// A single input without a signature map makes the whole PSBT count as
    /// unsigned by this key. Signatures on some inputs only do not count.
    pub fn signed_by(&self, fingerprint: &Fingerprint) -> bool {
        self.inputs.iter().all(|input| input.signed_by(fingerprint).unwrap_or(false))
    }

    /// Returns the number of signatures collected, counted with `counting`.
    pub fn signature_count(&self, counting: SignatureCounting) -> usize {
        match counting {
            SignatureCounting::FirstInput => {
                self.inputs.first().map_or(0, PsbtInput::signature_count)
            },
            SignatureCounting::EveryInput => {
                self.inputs.iter().map(PsbtInput::signing_key_count).min().unwrap_or(0)
            },
        }
    }
}

impl PsbtStage {
    /// Derives the signing stage from a signature count and a threshold.
    pub fn from_signatures(signature_count: usize, threshold: usize) -> Self {
        if signature_count >= threshold {
            Self::FullySigned
        } else if signature_count == 0 {
            Self::Created
        } else {
            Self::PartiallySigned
        }
    }

    /// Whether a PSBT in this stage may be broadcast.
    pub fn is_broadcastable(self) -> bool {
        matches!(self, Self::FullySigned)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn deriv(fingerprint: &str, pubkey: &str) -> Bip32Deriv {
        Bip32Deriv::builder().pubkey(pubkey).master_fingerprint(fingerprint).build()
    }

    fn input(derivs: Vec<Bip32Deriv>, signed_pubkeys: Option<&[&str]>) -> PsbtInput {
        let partial_signatures = signed_pubkeys.map(|pubkeys| {
            pubkeys.iter().map(|pubkey| (String::from(*pubkey), String::from("30440220"))).collect()
        });

        PsbtInput::builder().bip32_derivs(derivs).maybe_partial_signatures(partial_signatures).build()
    }

    #[test]
    fn signer_must_cover_every_input() {
        let psbt = Psbt::builder()
            .inputs(vec![
                input(vec![deriv("aa", "02a0"), deriv("bb", "02b0")], Some(&["02a0"])),
                input(vec![deriv("aa", "02a1"), deriv("bb", "02b1")], Some(&["02b1"])),
            ])
            .build();

        assert!(!psbt.signed_by(&"aa".into()));
        assert!(!psbt.signed_by(&"bb".into()));
    }

    #[test]
    fn input_without_signature_map_is_unsigned() {
        let psbt = Psbt::builder()
            .inputs(vec![
                input(vec![deriv("aa", "02a0")], Some(&["02a0"])),
                input(vec![deriv("aa", "02a1")], None),
            ])
            .build();

        assert!(!psbt.signed_by(&"aa".into()));
    }

    #[test]
    fn signature_on_foreign_key_does_not_count() {
        let psbt = Psbt::builder()
            .inputs(vec![input(vec![deriv("aa", "02a0"), deriv("bb", "02b0")], Some(&["02b0"]))])
            .build();

        assert!(!psbt.signed_by(&"aa".into()));
        assert!(psbt.signed_by(&"bb".into()));
    }

    #[test]
    fn first_input_counting_ignores_later_inputs() {
        let psbt = Psbt::builder()
            .inputs(vec![
                input(vec![deriv("aa", "02a0"), deriv("bb", "02b0")], Some(&["02a0", "02b0"])),
                input(vec![deriv("aa", "02a1"), deriv("bb", "02b1")], Some(&[])),
            ])
            .build();

        assert_eq!(psbt.signature_count(SignatureCounting::FirstInput), 2);
        assert_eq!(psbt.signature_count(SignatureCounting::EveryInput), 0);
    }

    #[test]
    fn every_input_counting_dedups_signing_keys() {
        let psbt = Psbt::builder()
            .inputs(vec![input(
                vec![deriv("aa", "02a0"), deriv("aa", "02a0"), deriv("bb", "02b0")],
                Some(&["02a0", "02b0", "02ff"]),
            )])
            .build();

        assert_eq!(psbt.signature_count(SignatureCounting::FirstInput), 3);
        assert_eq!(psbt.signature_count(SignatureCounting::EveryInput), 2);
    }

    #[test]
    fn stage_follows_signature_count() {
        assert_eq!(PsbtStage::from_signatures(0, 2), PsbtStage::Created);
        assert_eq!(PsbtStage::from_signatures(1, 2), PsbtStage::PartiallySigned);
        assert_eq!(PsbtStage::from_signatures(2, 2), PsbtStage::FullySigned);
        assert!(PsbtStage::from_signatures(3, 2).is_broadcastable());
    }
}
