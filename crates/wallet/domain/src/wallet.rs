//! Multisig wallets, their signers and the signer-device reconciliation.

use alloc::{string::String, vec::Vec};
use core::{fmt, num::NonZeroU32};

use bon::Builder;
use dissolve_derive::Dissolve;
use strum::{Display, EnumString, IntoStaticStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    Fingerprint,
    activity::{Coin, Transaction},
    device::{Device, DeviceType, UnlockedDevice},
    psbt::{Psbt, PsbtStage, SignatureCounting},
};

/// The bitcoin network a wallet lives on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum Network {
    /// Bitcoin mainnet.
    Mainnet,
    /// Bitcoin testnet.
    #[default]
    Testnet,
    /// A local regtest chain.
    Regtest,
}

/// Whether a wallet has a single signer or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum WalletType {
    /// One signer.
    Single,
    /// Several signers.
    Multi,
}

/// The output script flavour of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum ScriptType {
    /// Native segwit.
    Native,
    /// Segwit wrapped in P2SH.
    Wrapped,
}

/// A participant in a wallet's signing policy.
///
/// The fingerprint and xpub are recorded when the signer is added and never change.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signer {
    /// The display name chosen when the signer was added.
    #[builder(into)]
    name: String,

    /// The vendor of the signer's device.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    device_type: DeviceType,

    /// The master key fingerprint of the signer's device.
    #[builder(into)]
    fingerprint: Fingerprint,

    /// The extended public key the wallet derives addresses from.
    #[builder(into)]
    xpub: String,
}

/// Connection details of the bitcoin node backing a wallet.
#[derive(Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    /// The node host.
    #[builder(into)]
    host: String,

    /// The node RPC port.
    #[builder(into)]
    port: String,

    /// The RPC user.
    #[builder(into)]
    user: String,

    /// The RPC password. Never serialized.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing, default))]
    password: String,

    /// The watch-only wallet the backend keeps on the node.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    wallet_name: Option<String>,

    /// The network the node runs on.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    network: Option<Network>,

    /// The last error the backend saw while talking to the node.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    rpc_error: Option<String>,
}

/// Wallet balances in BTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Balances {
    /// The confirmed balance.
    confirmed: Option<f64>,

    /// The unconfirmed balance.
    unconfirmed: Option<f64>,
}

/// A configured multisig wallet.
///
/// A wallet requires `m` of its `n` signers to authorize a spend. Signers are added
/// one at a time until all `n` slots are filled, at which point the wallet is
/// [ready](Wallet::is_ready).
#[derive(Debug, Clone, PartialEq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wallet {
    /// The unique wallet name.
    #[builder(into)]
    name: String,

    /// The number of signatures required.
    m: NonZeroU32,

    /// The total number of signers.
    n: NonZeroU32,

    /// The network the wallet lives on.
    #[builder(default)]
    network: Network,

    /// The signers attached so far, in the order they were added.
    #[builder(default)]
    signers: Vec<Signer>,

    /// The wallet balances.
    #[builder(default)]
    balances: Balances,

    /// The node backing this wallet.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    node: Option<Node>,

    /// Pending PSBTs, addressed by their position in this list.
    #[builder(default)]
    psbts: Vec<Psbt>,

    /// Transactions that touched the wallet, newest last.
    #[builder(default)]
    #[cfg_attr(feature = "serde", serde(default))]
    history: Vec<Transaction>,

    /// Unspent outputs of the wallet.
    #[builder(default)]
    #[cfg_attr(feature = "serde", serde(default))]
    coins: Vec<Coin>,

    /// Whether the wallet is single or multi signer.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    wallet_type: Option<WalletType>,

    /// The output script flavour.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    script_type: Option<ScriptType>,

    /// Whether the backend finished syncing the wallet with its node.
    #[builder(default)]
    synced: bool,

    /// The next receive address index.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    address_index: Option<u32>,
}

impl Signer {
    /// Returns the signer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the vendor of the signer's device.
    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    /// Returns the master key fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Returns the extended public key.
    pub fn xpub(&self) -> &str {
        &self.xpub
    }

    /// Returns the first unlocked device whose fingerprint equals this signer's.
    ///
    /// Locked and errored devices never match since their fingerprint is unknown.
    pub fn available_device<'d>(&self, devices: &'d [Device]) -> Option<&'d UnlockedDevice> {
        devices
            .iter()
            .filter_map(Device::as_unlocked)
            .find(|device| *device.fingerprint() == self.fingerprint)
    }

    /// Whether this signer has signed every input of `psbt`.
    pub fn has_signed(&self, psbt: &Psbt) -> bool {
        psbt.signed_by(&self.fingerprint)
    }
}

impl Node {
    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns the RPC user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the RPC password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the watch-only wallet name on the node.
    pub fn wallet_name(&self) -> Option<&str> {
        self.wallet_name.as_deref()
    }

    /// Returns the node network.
    pub fn network(&self) -> Option<Network> {
        self.network
    }

    /// Returns the last RPC error.
    pub fn rpc_error(&self) -> Option<&str> {
        self.rpc_error.as_deref()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("wallet_name", &self.wallet_name)
            .field("network", &self.network)
            .field("rpc_error", &self.rpc_error)
            .finish()
    }
}

impl Balances {
    /// Returns the confirmed balance.
    pub fn confirmed(&self) -> Option<f64> {
        self.confirmed
    }

    /// Returns the unconfirmed balance.
    pub fn unconfirmed(&self) -> Option<f64> {
        self.unconfirmed
    }
}

impl Wallet {
    /// Returns the wallet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of required signatures.
    pub fn m(&self) -> NonZeroU32 {
        self.m
    }

    /// Returns the total number of signers.
    pub fn n(&self) -> NonZeroU32 {
        self.n
    }

    /// Returns the network.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Returns the attached signers.
    pub fn signers(&self) -> &[Signer] {
        &self.signers
    }

    /// Returns the balances.
    pub fn balances(&self) -> Balances {
        self.balances
    }

    /// Returns the node backing the wallet.
    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Returns the pending PSBTs.
    pub fn psbts(&self) -> &[Psbt] {
        &self.psbts
    }

    /// Returns the wallet's transaction history.
    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    /// Returns the wallet's unspent outputs.
    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    /// Returns the pending PSBT at `index`.
    pub fn psbt(&self, index: usize) -> Option<&Psbt> {
        self.psbts.get(index)
    }

    /// Returns the wallet type.
    pub fn wallet_type(&self) -> Option<WalletType> {
        self.wallet_type
    }

    /// Returns the script type.
    pub fn script_type(&self) -> Option<ScriptType> {
        self.script_type
    }

    /// Whether the wallet is synced with its node.
    pub fn synced(&self) -> bool {
        self.synced
    }

    /// Returns the next receive address index.
    pub fn address_index(&self) -> Option<u32> {
        self.address_index
    }

    /// Whether all `n` signers are attached.
    pub fn is_ready(&self) -> bool {
        self.signers.len() >= self.n_usize()
    }

    /// Returns the number of signer slots still free.
    pub fn open_signer_slots(&self) -> usize {
        self.n_usize().saturating_sub(self.signers.len())
    }

    /// Returns the signer whose fingerprint is `fingerprint`.
    pub fn signer_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&Signer> {
        self.signers.iter().find(|signer| signer.fingerprint == *fingerprint)
    }

    /// Returns the devices that could still be added to this wallet as signers.
    ///
    /// An unlocked device is a candidate unless its fingerprint already belongs to
    /// one of the wallet's signers. Locked and errored devices are always
    /// candidates because their fingerprint is not yet known. The input order is
    /// preserved.
    pub fn candidate_devices<'d>(&self, devices: &'d [Device]) -> Vec<&'d Device> {
        devices
            .iter()
            .filter(|device| match device.fingerprint() {
                Some(fingerprint) => self.signer_by_fingerprint(fingerprint).is_none(),
                None => true,
            })
            .collect()
    }

    /// Returns how many more signatures `psbt` needs before it may be broadcast.
    pub fn signatures_remaining(&self, psbt: &Psbt, counting: SignatureCounting) -> u32 {
        let count = u32::try_from(psbt.signature_count(counting)).unwrap_or(u32::MAX);
        self.m.get().saturating_sub(count)
    }

    /// Returns the signing stage of `psbt` under this wallet's threshold.
    pub fn psbt_stage(&self, psbt: &Psbt, counting: SignatureCounting) -> PsbtStage {
        PsbtStage::from_signatures(psbt.signature_count(counting), self.m_usize())
    }

    fn m_usize(&self) -> usize {
        usize::try_from(self.m.get()).unwrap_or(usize::MAX)
    }

    fn n_usize(&self) -> usize {
        usize::try_from(self.n.get()).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::{
        device::{ErrorDevice, LockedDevice},
        psbt::{Bip32Deriv, PsbtInput},
    };

    fn signer(name: &str, fingerprint: &str) -> Signer {
        Signer::builder()
            .name(name)
            .device_type(DeviceType::Ledger)
            .fingerprint(fingerprint)
            .xpub("tpubD6NzVbkrYhZ4")
            .build()
    }

    fn wallet(m: u32, n: u32, signers: Vec<Signer>) -> Wallet {
        Wallet::builder()
            .name("vault")
            .m(NonZeroU32::new(m).unwrap())
            .n(NonZeroU32::new(n).unwrap())
            .signers(signers)
            .build()
    }

    fn unlocked(path: &str, fingerprint: &str) -> Device {
        UnlockedDevice::builder()
            .path(path)
            .device_type(DeviceType::Ledger)
            .fingerprint(fingerprint)
            .build()
            .into()
    }

    fn locked(path: &str) -> Device {
        LockedDevice::builder()
            .path(path)
            .device_type(DeviceType::Trezor)
            .needs_pin_sent(true)
            .needs_passphrase_sent(true)
            .build()
            .into()
    }

    #[test]
    fn registered_device_is_not_a_candidate() {
        let wallet = wallet(2, 3, vec![signer("alice", "123")]);
        let devices = vec![locked("usb:1"), unlocked("usb:2", "123")];

        let candidates = wallet.candidate_devices(&devices);

        assert_eq!(candidates, vec![&devices[0]]);
    }

    #[test]
    fn errored_and_unknown_devices_are_candidates() {
        let wallet = wallet(1, 2, vec![signer("alice", "123")]);
        let devices = vec![
            ErrorDevice::builder()
                .path("usb:9")
                .device_type(DeviceType::Coldcard)
                .message("could not open")
                .build()
                .into(),
            unlocked("usb:3", "456"),
        ];

        assert_eq!(wallet.candidate_devices(&devices).len(), 2);
        assert_eq!(wallet.candidate_devices(&devices), wallet.candidate_devices(&devices));
    }

    #[test]
    fn signer_matches_only_unlocked_device_with_same_fingerprint() {
        let alice = signer("alice", "123");
        let devices = vec![locked("usb:1"), unlocked("usb:2", "999"), unlocked("usb:3", "123")];

        let device = alice.available_device(&devices).unwrap();

        assert_eq!(device.path(), "usb:3");
        assert!(alice.available_device(&devices[..2]).is_none());
    }

    #[test]
    fn one_signature_on_first_input_leaves_one_remaining_in_two_of_three() {
        let wallet = wallet(2, 3, vec![signer("alice", "aa"), signer("bob", "bb")]);
        let psbt = Psbt::builder()
            .inputs(vec![
                PsbtInput::builder()
                    .bip32_derivs(vec![
                        Bip32Deriv::builder().pubkey("02a0").master_fingerprint("aa").build(),
                    ])
                    .partial_signatures([("02a0".into(), "3044".into())].into_iter().collect())
                    .build(),
            ])
            .build();

        assert_eq!(wallet.signatures_remaining(&psbt, SignatureCounting::FirstInput), 1);
        assert_eq!(
            wallet.psbt_stage(&psbt, SignatureCounting::FirstInput),
            PsbtStage::PartiallySigned
        );
        assert!(wallet.signers()[0].has_signed(&psbt));
        assert!(!wallet.signers()[1].has_signed(&psbt));
    }

    #[test]
    fn remaining_never_goes_below_zero() {
        let wallet = wallet(1, 2, vec![]);
        let psbt = Psbt::builder()
            .inputs(vec![
                PsbtInput::builder()
                    .partial_signatures(
                        [("02a0".into(), "3044".into()), ("02b0".into(), "3045".into())]
                            .into_iter()
                            .collect(),
                    )
                    .build(),
            ])
            .build();

        assert_eq!(wallet.signatures_remaining(&psbt, SignatureCounting::FirstInput), 0);
    }

    #[test]
    fn wallet_is_ready_once_all_slots_are_filled() {
        let partial = wallet(2, 2, vec![signer("alice", "aa")]);
        let full = wallet(2, 2, vec![signer("alice", "aa"), signer("bob", "bb")]);

        assert!(!partial.is_ready());
        assert_eq!(partial.open_signer_slots(), 1);
        assert!(full.is_ready());
        assert_eq!(full.open_signer_slots(), 0);
    }
}
