//! Fixture builders for devices, signers, wallets and PSBTs.
//!
//! Every signing key in these fixtures is derived from its device fingerprint with
//! [`pubkey`], so a PSBT input can be described by fingerprints alone.

use core::num::NonZeroU32;
use std::collections::BTreeMap;

use junction_wallet_domain::{
    device::{Device, DeviceType, ErrorDevice, LockedDevice, UnlockedDevice},
    psbt::{Bip32Deriv, Psbt, PsbtInput, TxOutput},
    wallet::{Network, Signer, Wallet},
};
use serde_json::{Value, json};

/// The public key fixtures use for the device with `fingerprint`.
pub fn pubkey(fingerprint: &str) -> String {
    format!("02{fingerprint}")
}

/// An unlocked coldcard.
pub fn unlocked_device(path: &str, fingerprint: &str) -> Device {
    UnlockedDevice::builder()
        .path(path)
        .device_type(DeviceType::Coldcard)
        .fingerprint(fingerprint)
        .build()
        .into()
}

/// A trezor waiting for its PIN.
pub fn locked_trezor(path: &str) -> Device {
    LockedDevice::builder()
        .path(path)
        .device_type(DeviceType::Trezor)
        .needs_pin_sent(true)
        .build()
        .into()
}

/// A ledger that could not be opened.
pub fn error_ledger(path: &str) -> Device {
    ErrorDevice::builder()
        .path(path)
        .device_type(DeviceType::Ledger)
        .code(-13)
        .message("Could not open client")
        .build()
        .into()
}

/// A coldcard signer.
pub fn signer(name: &str, fingerprint: &str) -> Signer {
    signer_of_type(name, fingerprint, DeviceType::Coldcard)
}

/// A signer on a device of the given type.
pub fn signer_of_type(name: &str, fingerprint: &str, device_type: DeviceType) -> Signer {
    Signer::builder()
        .name(name)
        .device_type(device_type)
        .fingerprint(fingerprint)
        .xpub(format!("tpubD6NzVbkrYhZ4{fingerprint}"))
        .build()
}

/// A PSBT input spendable by the keys of `derivations`.
///
/// `signed` lists the fingerprints whose signature is recorded; `None` leaves the input
/// without a signature map at all.
pub fn psbt_input(derivations: &[&str], signed: Option<&[&str]>) -> PsbtInput {
    let bip32_derivs = derivations
        .iter()
        .map(|fingerprint| {
            Bip32Deriv::builder()
                .pubkey(pubkey(fingerprint))
                .master_fingerprint(*fingerprint)
                .path("m/48'/1'/0'/2'/0/0")
                .build()
        })
        .collect();

    let partial_signatures = signed.map(|signed| {
        signed
            .iter()
            .map(|fingerprint| (pubkey(fingerprint), format!("3044{fingerprint}01")))
            .collect::<BTreeMap<_, _>>()
    });

    PsbtInput::builder()
        .bip32_derivs(bip32_derivs)
        .maybe_partial_signatures(partial_signatures)
        .build()
}

/// A PSBT paying 0.1 BTC to a single recipient.
pub fn psbt(txid: &str, inputs: Vec<PsbtInput>) -> Psbt {
    let output = TxOutput::builder().n(0).value(0.1).addresses(vec!["tb1qrecipient".into()]).build();

    Psbt::builder().txid(txid).inputs(inputs).outputs(vec![output]).fee(0.0001).build()
}

/// A testnet wallet.
pub fn wallet(name: &str, m: u32, n: u32, signers: Vec<Signer>, psbts: Vec<Psbt>) -> Wallet {
    Wallet::builder()
        .name(name)
        .m(NonZeroU32::new(m).unwrap())
        .n(NonZeroU32::new(n).unwrap())
        .network(Network::Testnet)
        .signers(signers)
        .psbts(psbts)
        .synced(true)
        .build()
}

/// Wire fixtures, shaped the way the backend sends them.
pub mod json {
    use super::*;

    /// An unlocked device entry of `GET /devices`.
    pub fn unlocked_device(path: &str, device_type: &str, fingerprint: &str) -> Value {
        json!({
            "type": device_type,
            "model": device_type,
            "path": path,
            "fingerprint": fingerprint,
            "needs_pin_sent": false,
            "needs_passphrase_sent": false,
        })
    }

    /// A locked device entry of `GET /devices`.
    pub fn locked_device(path: &str, device_type: &str) -> Value {
        json!({
            "type": device_type,
            "path": path,
            "needs_pin_sent": true,
            "needs_passphrase_sent": false,
            "error": "Could not open client or get fingerprint information: device is locked",
        })
    }

    /// A signer entry of a wallet.
    pub fn signer(name: &str, fingerprint: &str) -> Value {
        json!({
            "name": name,
            "type": "coldcard",
            "fingerprint": fingerprint,
            "xpub": format!("tpubD6NzVbkrYhZ4{fingerprint}"),
        })
    }

    /// A PSBT input, see [`psbt_input`](super::psbt_input).
    pub fn psbt_input(derivations: &[&str], signed: Option<&[&str]>) -> Value {
        let bip32_derivs: Vec<Value> = derivations
            .iter()
            .map(|fingerprint| {
                json!({
                    "pubkey": pubkey(fingerprint),
                    "master_fingerprint": fingerprint,
                    "path": "m/48'/1'/0'/2'/0/0",
                })
            })
            .collect();

        match signed {
            Some(signed) => {
                let partial_signatures: serde_json::Map<String, Value> = signed
                    .iter()
                    .map(|fingerprint| (pubkey(fingerprint), json!(format!("3044{fingerprint}01"))))
                    .collect();

                json!({ "bip32_derivs": bip32_derivs, "partial_signatures": partial_signatures })
            },
            None => json!({ "bip32_derivs": bip32_derivs }),
        }
    }

    /// A decoded PSBT paying 0.1 BTC to a single recipient.
    pub fn psbt(txid: &str, inputs: Vec<Value>) -> Value {
        json!({
            "inputs": inputs,
            "tx": {
                "txid": txid,
                "vout": [{ "n": 0, "value": 0.1, "scriptPubKey": { "addresses": ["tb1qrecipient"] } }],
            },
            "fee": 0.0001,
        })
    }

    /// A wallet entry of `GET /wallets`.
    pub fn wallet(name: &str, m: u32, n: u32, signers: Vec<Value>, psbts: Vec<Value>) -> Value {
        json!({
            "name": name,
            "m": m,
            "n": n,
            "network": "testnet",
            "signers": signers,
            "balances": { "confirmed": 0.5, "unconfirmed": 0.0 },
            "psbts": psbts,
            "wallet_type": if n > 1 { "multi" } else { "single" },
            "script_type": "native",
            "synced": true,
            "node": {
                "host": "127.0.0.1",
                "port": "18332",
                "user": "bitcoin",
                "password": "secret",
                "wallet_name": name,
                "network": "testnet",
            },
        })
    }

    /// A `history` entry of a wallet, as the node lists it.
    pub fn transaction(txid: &str, address: &str, amount: f64, confirmations: i64) -> Value {
        json!({
            "txid": txid,
            "address": address,
            "category": if amount < 0.0 { "send" } else { "receive" },
            "amount": amount,
            "confirmations": confirmations,
            "time": 1_600_000_000,
        })
    }

    /// A `coins` entry of a wallet, as the node lists it.
    pub fn coin(txid: &str, vout: u32, address: &str, amount: f64) -> Value {
        json!({
            "txid": txid,
            "vout": vout,
            "address": address,
            "amount": amount,
            "confirmations": 6,
            "spendable": false,
            "solvable": true,
        })
    }

    /// The body of `GET /settings`.
    pub fn settings(error: Option<&str>) -> Value {
        let mut rpc = json!({ "user": "bitcoin", "password": "secret", "host": "127.0.0.1", "port": "18332" });
        if let Some(error) = error {
            rpc["error"] = json!(error);
        }

        json!({ "rpc": rpc })
    }
}
