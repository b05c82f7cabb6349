use core::num::NonZeroU32;
use std::collections::BTreeMap;

use dissolve_derive::Dissolve;
use itertools::Itertools;
use junction_wallet_domain::{
    activity::{Coin, Transaction},
    device::{Device, DeviceType, ErrorDevice, LockedDevice, UnlockedDevice},
    psbt::{Bip32Deriv, MalformedPsbtError, Psbt, PsbtInput, TxOutput},
    settings::{Nodes, RpcSettings, Settings},
    wallet::{Balances, Network, Node, ScriptType, Signer, Wallet, WalletType},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

const MISSING_FINGERPRINT: &str = "device reported no fingerprint";

#[derive(Debug, Deserialize, Dissolve)]
pub struct DevicePayload {
    path: String,

    #[serde(rename = "type")]
    device_type: DeviceType,

    #[serde(default)]
    fingerprint: Option<String>,

    #[serde(default)]
    needs_pin_sent: Option<bool>,

    #[serde(default)]
    needs_passphrase_sent: Option<bool>,

    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    code: Option<i64>,
}

#[derive(Deserialize)]
pub struct WalletPayload {
    name: String,
    m: NonZeroU32,
    n: NonZeroU32,

    #[serde(default)]
    network: Option<Network>,

    #[serde(default)]
    signers: Vec<Signer>,

    #[serde(default)]
    balances: Option<Value>,

    #[serde(default)]
    node: Option<NodePayload>,

    #[serde(default)]
    psbts: Option<Vec<Value>>,

    /// Older backends keep a single pending PSBT under this key.
    #[serde(default)]
    psbt: Option<Value>,

    #[serde(default)]
    history: Option<Vec<Value>>,

    #[serde(default)]
    coins: Option<Vec<Value>>,

    #[serde(default)]
    wallet_type: Option<WalletType>,

    #[serde(default)]
    script_type: Option<ScriptType>,

    #[serde(default)]
    synced: bool,

    #[serde(default, alias = "receiving_address_index")]
    address_index: Option<u32>,
}

/// An entry of the node's transaction list.
#[derive(Debug, Deserialize)]
struct TransactionPayload {
    txid: String,

    #[serde(default)]
    address: Option<String>,

    #[serde(default, alias = "blocktime")]
    time: Option<i64>,

    #[serde(default)]
    confirmations: i64,

    amount: f64,
}

/// An entry of the node's unspent output list.
#[derive(Debug, Deserialize)]
struct CoinPayload {
    txid: String,
    vout: u32,

    #[serde(default)]
    address: Option<String>,

    #[serde(default)]
    confirmations: u64,

    amount: f64,
}

#[derive(Deserialize)]
pub struct NodePayload {
    host: String,
    port: Port,

    #[serde(default)]
    user: String,

    #[serde(default)]
    password: String,

    #[serde(default)]
    wallet_name: Option<String>,

    #[serde(default)]
    network: Option<Network>,

    #[serde(default)]
    rpc_error: Option<String>,
}

/// Ports arrive as strings from some endpoints and as numbers from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Port {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
pub struct PsbtPayload {
    #[serde(default)]
    inputs: Option<Vec<Value>>,

    #[serde(default)]
    tx: Option<TxPayload>,

    #[serde(default)]
    fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TxPayload {
    #[serde(default)]
    txid: Option<String>,

    #[serde(default)]
    vout: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct PsbtInputPayload {
    #[serde(default)]
    bip32_derivs: Option<Vec<Bip32Deriv>>,

    #[serde(default)]
    partial_signatures: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TxOutputPayload {
    n: u32,
    value: f64,

    #[serde(default, rename = "scriptPubKey")]
    script_pub_key: Option<ScriptPubKeyPayload>,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKeyPayload {
    #[serde(default)]
    addresses: Vec<String>,

    #[serde(default)]
    address: Option<String>,
}

#[derive(Deserialize)]
pub struct SettingsResponse {
    rpc: RpcSettingsPayload,
}

#[derive(Deserialize)]
struct RpcSettingsPayload {
    #[serde(default)]
    user: String,

    #[serde(default)]
    password: String,

    #[serde(default)]
    host: String,

    port: Port,

    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct NodesPayload {
    #[serde(default)]
    bitcoin: Vec<NodePayload>,
}

/// The outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Dissolve)]
#[serde(from = "BroadcastAnswer")]
pub struct BroadcastReceipt {
    txid: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BroadcastAnswer {
    Receipt {
        #[serde(default)]
        txid: Option<String>,
    },
    Txid(String),
    Other(Value),
}

#[derive(Debug, Deserialize)]
pub struct AddressPayload {
    pub address: String,
}

impl BroadcastReceipt {
    /// Returns the id of the broadcast transaction, when the backend reported one.
    pub fn txid(&self) -> Option<&str> {
        self.txid.as_deref()
    }
}

impl From<BroadcastAnswer> for BroadcastReceipt {
    fn from(payload: BroadcastAnswer) -> Self {
        let txid = match payload {
            BroadcastAnswer::Receipt { txid } => txid,
            BroadcastAnswer::Txid(txid) => Some(txid),
            BroadcastAnswer::Other(_) => None,
        };

        Self { txid: txid.filter(|txid| !txid.is_empty()) }
    }
}

impl From<Port> for String {
    fn from(port: Port) -> Self {
        match port {
            Port::Text(port) => port,
            Port::Number(port) => port.to_string(),
        }
    }
}

impl From<DevicePayload> for Device {
    fn from(payload: DevicePayload) -> Self {
        let DevicePayloadDissolved {
            path,
            device_type,
            fingerprint,
            needs_pin_sent,
            needs_passphrase_sent,
            error,
            code,
        } = payload.dissolve();

        let needs_pin_sent = needs_pin_sent.unwrap_or_default();
        let needs_passphrase_sent = needs_passphrase_sent.unwrap_or_default();

        if needs_pin_sent || needs_passphrase_sent {
            return LockedDevice::builder()
                .path(path)
                .device_type(device_type)
                .needs_pin_sent(needs_pin_sent)
                .needs_passphrase_sent(needs_passphrase_sent)
                .maybe_error(error)
                .build()
                .into();
        }

        if let Some(message) = error {
            return ErrorDevice::builder()
                .path(path)
                .device_type(device_type)
                .maybe_code(code)
                .message(message)
                .build()
                .into();
        }

        match fingerprint.filter(|fingerprint| !fingerprint.is_empty()) {
            Some(fingerprint) => UnlockedDevice::builder()
                .path(path)
                .device_type(device_type)
                .fingerprint(fingerprint)
                .build()
                .into(),
            None => ErrorDevice::builder()
                .path(path)
                .device_type(device_type)
                .maybe_code(code)
                .message(MISSING_FINGERPRINT)
                .build()
                .into(),
        }
    }
}

impl TryFrom<WalletPayload> for Wallet {
    type Error = MalformedPsbtError;

    fn try_from(payload: WalletPayload) -> Result<Self, Self::Error> {
        let WalletPayload {
            name,
            m,
            n,
            network,
            signers,
            balances,
            node,
            psbts,
            psbt,
            history,
            coins,
            wallet_type,
            script_type,
            synced,
            address_index,
        } = payload;

        let psbts = match psbts {
            Some(psbts) => psbts,
            None => psbt.filter(Value::is_object).into_iter().collect(),
        };
        let psbts: Vec<_> = psbts.into_iter().map(psbt_from_value).try_collect()?;
        let history = lenient_entries::<TransactionPayload, _>(&name, "history", history);
        let coins = lenient_entries::<CoinPayload, _>(&name, "coins", coins);

        Ok(Wallet::builder()
            .name(name)
            .m(m)
            .n(n)
            .network(network.unwrap_or_default())
            .signers(signers)
            .balances(balances.as_ref().map(balances_from_value).unwrap_or_default())
            .maybe_node(node.map(Node::from))
            .psbts(psbts)
            .history(history)
            .coins(coins)
            .maybe_wallet_type(wallet_type)
            .maybe_script_type(script_type)
            .synced(synced)
            .maybe_address_index(address_index)
            .build())
    }
}

/// Decodes the activity lists of a wallet. A missing list is empty, and entries
/// that do not decode are skipped.
fn lenient_entries<P, T>(wallet: &str, field: &str, entries: Option<Vec<Value>>) -> Vec<T>
where
    P: DeserializeOwned,
    T: From<P>,
{
    entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            serde_json::from_value::<P>(entry)
                .inspect_err(|e| tracing::warn!(wallet, field, "skipping undecodable entry: {e}"))
                .ok()
        })
        .map(T::from)
        .collect()
}

impl From<TransactionPayload> for Transaction {
    fn from(payload: TransactionPayload) -> Self {
        let TransactionPayload { txid, address, time, confirmations, amount } = payload;

        Transaction::builder()
            .txid(txid)
            .maybe_address(address)
            .maybe_time(time)
            .confirmations(confirmations)
            .amount(amount)
            .build()
    }
}

impl From<CoinPayload> for Coin {
    fn from(payload: CoinPayload) -> Self {
        let CoinPayload { txid, vout, address, confirmations, amount } = payload;

        Coin::builder()
            .txid(txid)
            .vout(vout)
            .maybe_address(address)
            .confirmations(confirmations)
            .amount(amount)
            .build()
    }
}

fn balances_from_value(value: &Value) -> Balances {
    let field = |key: &str| value.get(key).and_then(Value::as_f64);

    Balances::builder()
        .maybe_confirmed(field("confirmed"))
        .maybe_unconfirmed(field("unconfirmed"))
        .build()
}

impl From<NodePayload> for Node {
    fn from(payload: NodePayload) -> Self {
        let NodePayload { host, port, user, password, wallet_name, network, rpc_error } = payload;

        Node::builder()
            .host(host)
            .port(String::from(port))
            .user(user)
            .password(password)
            .maybe_wallet_name(wallet_name)
            .maybe_network(network)
            .maybe_rpc_error(rpc_error)
            .build()
    }
}

/// Decodes a PSBT out of an arbitrary JSON value, naming the first missing or
/// malformed part.
pub fn psbt_from_value(value: Value) -> Result<Psbt, MalformedPsbtError> {
    let payload = serde_json::from_value::<PsbtPayload>(value)
        .map_err(|err| MalformedPsbtError::Invalid(err.to_string().into()))?;

    Psbt::try_from(payload)
}

impl TryFrom<PsbtPayload> for Psbt {
    type Error = MalformedPsbtError;

    fn try_from(payload: PsbtPayload) -> Result<Self, Self::Error> {
        let PsbtPayload { inputs, tx, fee } = payload;

        let inputs = inputs.ok_or(MalformedPsbtError::MissingInputs)?;
        let TxPayload { txid, vout } = tx.ok_or(MalformedPsbtError::MissingTx)?;
        let vout = vout.ok_or(MalformedPsbtError::MissingOutputs)?;

        let inputs: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| psbt_input(index, input))
            .try_collect()?;

        let outputs: Vec<_> = vout
            .into_iter()
            .enumerate()
            .map(|(index, output)| tx_output(index, output))
            .try_collect()?;

        Ok(Psbt::builder().maybe_txid(txid).inputs(inputs).outputs(outputs).maybe_fee(fee).build())
    }
}

fn psbt_input(index: usize, value: Value) -> Result<PsbtInput, MalformedPsbtError> {
    let PsbtInputPayload { bip32_derivs, partial_signatures } = serde_json::from_value(value)
        .map_err(|err| MalformedPsbtError::Input { index, reason: err.to_string().into() })?;

    let bip32_derivs = bip32_derivs
        .ok_or(MalformedPsbtError::Input { index, reason: "missing bip32_derivs".into() })?;

    Ok(PsbtInput::builder()
        .bip32_derivs(bip32_derivs)
        .maybe_partial_signatures(partial_signatures)
        .build())
}

fn tx_output(index: usize, value: Value) -> Result<TxOutput, MalformedPsbtError> {
    let TxOutputPayload { n, value, script_pub_key } = serde_json::from_value(value)
        .map_err(|err| MalformedPsbtError::Output { index, reason: err.to_string().into() })?;

    let addresses = match script_pub_key {
        Some(ScriptPubKeyPayload { addresses, address: None }) => addresses,
        Some(ScriptPubKeyPayload { mut addresses, address: Some(address) }) => {
            if !addresses.contains(&address) {
                addresses.insert(0, address);
            }
            addresses
        },
        None => Vec::new(),
    };

    Ok(TxOutput::builder().n(n).value(value).addresses(addresses).build())
}

impl From<SettingsResponse> for Settings {
    fn from(payload: SettingsResponse) -> Self {
        let RpcSettingsPayload { user, password, host, port, error } = payload.rpc;

        let rpc = RpcSettings::builder()
            .user(user)
            .password(password)
            .host(host)
            .port(String::from(port))
            .maybe_error(error)
            .build();

        Settings::builder().rpc(rpc).build()
    }
}

impl From<NodesPayload> for Nodes {
    fn from(payload: NodesPayload) -> Self {
        Nodes::builder().bitcoin(payload.bitcoin.into_iter().map(Node::from).collect()).build()
    }
}

/// Reads the PSBT a mutating endpoint may echo back.
///
/// Bodies that do not look like a PSBT at all yield `None`. Bodies that do but are
/// missing parts are an error.
pub fn echoed_psbt(value: Value) -> Result<Option<Psbt>, MalformedPsbtError> {
    let value = match value {
        Value::Object(mut object) if !object.contains_key("inputs") => {
            object.remove("psbt").unwrap_or_default()
        },
        value => value,
    };

    if value.get("inputs").is_some() { psbt_from_value(value).map(Some) } else { Ok(None) }
}

/// Reads the wallet a mutating endpoint may echo back, with the same leniency as
/// [`echoed_psbt`].
pub fn echoed_wallet(value: Value) -> crate::Result<Option<Wallet>> {
    if value.get("name").is_none() || value.get("m").is_none() {
        return Ok(None);
    }

    let payload = serde_json::from_value::<WalletPayload>(value)?;

    Ok(Some(Wallet::try_from(payload)?))
}
