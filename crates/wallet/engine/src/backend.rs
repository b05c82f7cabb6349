use core::future::Future;

use junction_client::{
    BackendClient, BackendClientError, BroadcastReceipt,
    request::{
        AddSignerRequest, BroadcastRequest, CreatePsbtRequest, CreateWalletRequest,
        EnterPinRequest, PromptTarget, SignPsbtRequest,
    },
};
use junction_wallet_domain::{
    device::Device,
    psbt::Psbt,
    settings::{Nodes, RpcSettings, Settings},
    wallet::Wallet,
};

type Result<T> = core::result::Result<T, BackendClientError>;

/// The wallet backend as seen by the [`WalletEngine`](crate::WalletEngine).
///
/// [`BackendClient`] is the production implementation. Each method maps to one backend
/// endpoint and has the same semantics as the client method of the same name.
pub trait Backend: Send + Sync + 'static {
    /// `GET /devices`
    fn get_devices(&self) -> impl Future<Output = Result<Vec<Device>>> + Send;

    /// `GET /wallets`
    fn get_wallets(&self) -> impl Future<Output = Result<Vec<Wallet>>> + Send;

    /// `POST /wallets`
    fn create_wallet(
        &self,
        request: CreateWalletRequest,
    ) -> impl Future<Output = Result<Option<Wallet>>> + Send;

    /// `POST /signers`
    fn add_signer(
        &self,
        request: AddSignerRequest,
    ) -> impl Future<Output = Result<Option<Wallet>>> + Send;

    /// `POST /prompt`
    fn prompt_pin(&self, target: PromptTarget) -> impl Future<Output = Result<()>> + Send;

    /// `POST /unlock`
    fn enter_pin(&self, request: EnterPinRequest) -> impl Future<Output = Result<()>> + Send;

    /// `DELETE /prompt`
    fn cancel_prompt(&self) -> impl Future<Output = Result<()>> + Send;

    /// `POST /psbt`
    fn create_psbt(
        &self,
        request: CreatePsbtRequest,
    ) -> impl Future<Output = Result<Option<Psbt>>> + Send;

    /// `POST /sign`
    fn sign_psbt(
        &self,
        request: SignPsbtRequest,
    ) -> impl Future<Output = Result<Option<Psbt>>> + Send;

    /// `POST /broadcast`
    fn broadcast(
        &self,
        request: BroadcastRequest,
    ) -> impl Future<Output = Result<BroadcastReceipt>> + Send;

    /// `GET /settings`
    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send;

    /// `PUT /settings`
    fn update_settings(&self, rpc: RpcSettings) -> impl Future<Output = Result<()>> + Send;

    /// `GET /nodes`
    fn get_nodes(&self) -> impl Future<Output = Result<Nodes>> + Send;

    /// `POST /addresses`
    fn generate_address(&self, wallet_name: &str) -> impl Future<Output = Result<String>> + Send;
}

impl Backend for BackendClient {
    fn get_devices(&self) -> impl Future<Output = Result<Vec<Device>>> + Send {
        BackendClient::get_devices(self)
    }

    fn get_wallets(&self) -> impl Future<Output = Result<Vec<Wallet>>> + Send {
        BackendClient::get_wallets(self)
    }

    fn create_wallet(
        &self,
        request: CreateWalletRequest,
    ) -> impl Future<Output = Result<Option<Wallet>>> + Send {
        BackendClient::create_wallet(self, request)
    }

    fn add_signer(
        &self,
        request: AddSignerRequest,
    ) -> impl Future<Output = Result<Option<Wallet>>> + Send {
        BackendClient::add_signer(self, request)
    }

    fn prompt_pin(&self, target: PromptTarget) -> impl Future<Output = Result<()>> + Send {
        BackendClient::prompt_pin(self, target)
    }

    fn enter_pin(&self, request: EnterPinRequest) -> impl Future<Output = Result<()>> + Send {
        BackendClient::enter_pin(self, request)
    }

    fn cancel_prompt(&self) -> impl Future<Output = Result<()>> + Send {
        BackendClient::cancel_prompt(self)
    }

    fn create_psbt(
        &self,
        request: CreatePsbtRequest,
    ) -> impl Future<Output = Result<Option<Psbt>>> + Send {
        BackendClient::create_psbt(self, request)
    }

    fn sign_psbt(
        &self,
        request: SignPsbtRequest,
    ) -> impl Future<Output = Result<Option<Psbt>>> + Send {
        BackendClient::sign_psbt(self, request)
    }

    fn broadcast(
        &self,
        request: BroadcastRequest,
    ) -> impl Future<Output = Result<BroadcastReceipt>> + Send {
        BackendClient::broadcast(self, request)
    }

    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send {
        BackendClient::get_settings(self)
    }

    fn update_settings(&self, rpc: RpcSettings) -> impl Future<Output = Result<()>> + Send {
        BackendClient::update_settings(self, rpc)
    }

    fn get_nodes(&self) -> impl Future<Output = Result<Nodes>> + Send {
        BackendClient::get_nodes(self)
    }

    fn generate_address(&self, wallet_name: &str) -> impl Future<Output = Result<String>> + Send {
        BackendClient::generate_address(self, wallet_name)
    }
}
