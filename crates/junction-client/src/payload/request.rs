use bon::Builder;
use junction_wallet_domain::settings::{RpcSettings, RpcSettingsDissolved};
use serde::Serialize;

use crate::request::{
    AddSignerRequest, AddSignerRequestDissolved, BroadcastRequest, BroadcastRequestDissolved,
    CreatePsbtRequest, CreatePsbtRequestDissolved, CreateWalletRequest,
    CreateWalletRequestDissolved, EnterPinRequest, EnterPinRequestDissolved, NodeCredentials,
    NodeCredentialsDissolved, PromptTarget, PsbtOutput, PsbtOutputDissolved, SignPsbtRequest,
    SignPsbtRequestDissolved,
};

#[derive(Debug, Serialize)]
pub struct CreateWalletPayload {
    name: String,
    m: u32,
    n: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<NodeCredentialsPayload>,
}

#[derive(Serialize)]
pub struct NodeCredentialsPayload {
    user: String,
    password: String,
    host: String,
    port: String,
}

#[derive(Debug, Serialize)]
pub struct AddSignerPayload {
    wallet_name: String,
    signer_name: String,
    device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PromptPayload {
    Wallet { wallet_name: String },
    Device { path: String },
}

#[derive(Serialize)]
pub struct UnlockPayload {
    pin: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePsbtPayload {
    wallet_name: String,
    outputs: Vec<PsbtOutputPayload>,
}

#[derive(Debug, Serialize)]
pub struct PsbtOutputPayload {
    address: String,
    btc: f64,
    subtract_fees: bool,
}

#[derive(Debug, Serialize)]
pub struct SignPsbtPayload {
    wallet_name: String,
    device_id: String,
    index: usize,
}

#[derive(Debug, Serialize)]
pub struct BroadcastPayload {
    wallet_name: String,
    index: usize,
}

#[derive(Debug, Builder, Serialize)]
pub struct GenerateAddressPayload {
    #[builder(into)]
    wallet_name: String,
}

#[derive(Serialize)]
pub struct SettingsPayload {
    rpc: RpcSettingsPayload,
}

#[derive(Serialize)]
pub struct RpcSettingsPayload {
    user: String,
    password: String,
    host: String,
    port: String,
}

impl core::fmt::Debug for NodeCredentialsPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeCredentialsPayload").finish_non_exhaustive()
    }
}

impl From<CreateWalletRequest> for CreateWalletPayload {
    fn from(request: CreateWalletRequest) -> Self {
        let CreateWalletRequestDissolved { name, m, n, network, node } = request.dissolve();

        Self {
            name,
            m: m.get(),
            n: n.get(),
            network: network.map(Into::into),
            node: node.map(From::from),
        }
    }
}

impl From<NodeCredentials> for NodeCredentialsPayload {
    fn from(node: NodeCredentials) -> Self {
        let NodeCredentialsDissolved { host, port, user, password } = node.dissolve();
        Self { user, password, host, port }
    }
}

impl From<AddSignerRequest> for AddSignerPayload {
    fn from(request: AddSignerRequest) -> Self {
        let AddSignerRequestDissolved { wallet_name, signer_name, device_id } = request.dissolve();
        Self { wallet_name, signer_name, device_id: device_id.into() }
    }
}

impl From<PromptTarget> for PromptPayload {
    fn from(target: PromptTarget) -> Self {
        match target {
            PromptTarget::Wallet(wallet_name) => Self::Wallet { wallet_name },
            PromptTarget::Device(path) => Self::Device { path },
        }
    }
}

impl From<EnterPinRequest> for UnlockPayload {
    fn from(request: EnterPinRequest) -> Self {
        let EnterPinRequestDissolved { pin } = request.dissolve();
        Self { pin }
    }
}

impl From<CreatePsbtRequest> for CreatePsbtPayload {
    fn from(request: CreatePsbtRequest) -> Self {
        let CreatePsbtRequestDissolved { wallet_name, outputs } = request.dissolve();
        Self {
            wallet_name,
            outputs: outputs.into_iter().map(From::from).collect(),
        }
    }
}

impl From<PsbtOutput> for PsbtOutputPayload {
    fn from(output: PsbtOutput) -> Self {
        let PsbtOutputDissolved { address, btc, subtract_fees } = output.dissolve();
        Self { address, btc, subtract_fees }
    }
}

impl From<SignPsbtRequest> for SignPsbtPayload {
    fn from(request: SignPsbtRequest) -> Self {
        let SignPsbtRequestDissolved { wallet_name, device_id, index } = request.dissolve();
        Self { wallet_name, device_id: device_id.into(), index }
    }
}

impl From<BroadcastRequest> for BroadcastPayload {
    fn from(request: BroadcastRequest) -> Self {
        let BroadcastRequestDissolved { wallet_name, index } = request.dissolve();
        Self { wallet_name, index }
    }
}

impl From<RpcSettings> for SettingsPayload {
    fn from(rpc: RpcSettings) -> Self {
        let RpcSettingsDissolved { user, password, host, port, .. } = rpc.dissolve();
        Self { rpc: RpcSettingsPayload { user, password, host, port } }
    }
}
