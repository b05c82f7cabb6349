//! A typed HTTP client for the junction wallet backend.
//!
//! The backend owns every piece of wallet state: it enumerates hardware devices,
//! stores wallets, builds and signs PSBTs and talks to the bitcoin node. This client
//! only issues JSON requests to it and decodes the answers into the domain types of
//! [`junction_wallet_domain`].
//!
//! Every request carries `Accept: application/json` and is bounded by the timeout
//! given to [`BackendClient::new`]. Non-success responses are mapped through
//! [`BackendClientError::Backend`], whose message is the backend's `error` field when
//! present and the `"<status>: <reason>"` line otherwise.

mod error;
mod payload;

pub mod request;

pub use self::{
    error::{BackendClientError, Result},
    payload::BroadcastReceipt,
};

use core::time::Duration;

use itertools::Itertools;
use junction_wallet_domain::{
    device::Device,
    psbt::Psbt,
    settings::{Nodes, RpcSettings, Settings},
    wallet::Wallet,
};
use reqwest::{Method, header::ACCEPT};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use self::{
    payload::{
        AddSignerPayload, AddressPayload, BroadcastPayload, CreatePsbtPayload,
        CreateWalletPayload, DevicePayload, GenerateAddressPayload, NodesPayload, PromptPayload,
        SettingsPayload, SettingsResponse, SignPsbtPayload, UnlockPayload, WalletPayload,
    },
    request::{
        AddSignerRequest, BroadcastRequest, CreatePsbtRequest, CreateWalletRequest,
        EnterPinRequest, PromptTarget, SignPsbtRequest,
    },
};

/// The address the backend listens on by default.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:37128";

/// The default bound on every backend request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the wallet backend's JSON API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    inner: reqwest::Client,
    endpoint: Url,
}

impl BackendClient {
    /// Builds a client for the backend at `endpoint`, bounding every request by `timeout`.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendClientError::other(e.to_string()))?;

        Ok(Self { inner, endpoint })
    }

    /// Returns the backend endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Lists the attached hardware devices.
    #[tracing::instrument(skip_all)]
    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        let devices: Vec<DevicePayload> = self.get("devices").await?;

        Ok(devices.into_iter().map(Device::from).collect())
    }

    /// Lists the configured wallets.
    #[tracing::instrument(skip_all)]
    pub async fn get_wallets(&self) -> Result<Vec<Wallet>> {
        let wallets: Vec<WalletPayload> = self.get("wallets").await?;

        wallets
            .into_iter()
            .map(Wallet::try_from)
            .try_collect()
            .map_err(BackendClientError::from)
            .inspect_err(|e| tracing::error!("failed to decode wallets: {e}"))
    }

    /// Creates a wallet, returning it when the backend echoes it back.
    #[tracing::instrument(skip_all, fields(wallet = request.name()))]
    pub async fn create_wallet(&self, request: CreateWalletRequest) -> Result<Option<Wallet>> {
        let body = self.send(Method::POST, "wallets", Some(&CreateWalletPayload::from(request))).await?;

        payload::echoed_wallet(decode_or_null(&body)?)
    }

    /// Attaches a device to a wallet as a new signer, returning the updated wallet when
    /// the backend echoes it back.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name(), device = %request.device_id()))]
    pub async fn add_signer(&self, request: AddSignerRequest) -> Result<Option<Wallet>> {
        let body = self.send(Method::POST, "signers", Some(&AddSignerPayload::from(request))).await?;

        payload::echoed_wallet(decode_or_null(&body)?)
    }

    /// Asks a locked device to show its PIN matrix.
    #[tracing::instrument(skip_all)]
    pub async fn prompt_pin(&self, target: PromptTarget) -> Result<()> {
        self.send(Method::POST, "prompt", Some(&PromptPayload::from(target))).await?;
        Ok(())
    }

    /// Sends the PIN for the device that is currently prompting.
    #[tracing::instrument(skip_all)]
    pub async fn enter_pin(&self, request: EnterPinRequest) -> Result<()> {
        self.send(Method::POST, "unlock", Some(&UnlockPayload::from(request))).await?;
        Ok(())
    }

    /// Cancels a pending PIN prompt.
    #[tracing::instrument(skip_all)]
    pub async fn cancel_prompt(&self) -> Result<()> {
        self.send::<()>(Method::DELETE, "prompt", None).await?;
        Ok(())
    }

    /// Creates a PSBT, returning it when the backend echoes it back.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name()))]
    pub async fn create_psbt(&self, request: CreatePsbtRequest) -> Result<Option<Psbt>> {
        let body = self.send(Method::POST, "psbt", Some(&CreatePsbtPayload::from(request))).await?;

        Ok(payload::echoed_psbt(decode_or_null(&body)?)?)
    }

    /// Signs a pending PSBT with a device, returning the updated PSBT when the backend
    /// echoes it back.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name(), index = request.index()))]
    pub async fn sign_psbt(&self, request: SignPsbtRequest) -> Result<Option<Psbt>> {
        let body = self.send(Method::POST, "sign", Some(&SignPsbtPayload::from(request))).await?;

        Ok(payload::echoed_psbt(decode_or_null(&body)?)?)
    }

    /// Broadcasts a fully signed PSBT.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name(), index = request.index()))]
    pub async fn broadcast(&self, request: BroadcastRequest) -> Result<BroadcastReceipt> {
        let body = self.send(Method::POST, "broadcast", Some(&BroadcastPayload::from(request))).await?;

        Ok(serde_json::from_value(decode_or_null(&body)?)?)
    }

    /// Fetches the backend settings.
    #[tracing::instrument(skip_all)]
    pub async fn get_settings(&self) -> Result<Settings> {
        let settings: SettingsResponse = self.get("settings").await?;

        Ok(settings.into())
    }

    /// Replaces the node connection settings.
    #[tracing::instrument(skip_all)]
    pub async fn update_settings(&self, rpc: RpcSettings) -> Result<()> {
        self.send(Method::PUT, "settings", Some(&SettingsPayload::from(rpc))).await?;
        Ok(())
    }

    /// Lists the nodes known to the backend.
    #[tracing::instrument(skip_all)]
    pub async fn get_nodes(&self) -> Result<Nodes> {
        let nodes: NodesPayload = self.get("nodes").await?;

        Ok(nodes.into())
    }

    /// Derives the next receive address of a wallet.
    #[tracing::instrument(skip_all, fields(wallet = wallet_name))]
    pub async fn generate_address(&self, wallet_name: &str) -> Result<String> {
        let request = GenerateAddressPayload::builder().wallet_name(wallet_name).build();
        let body = self.send(Method::POST, "addresses", Some(&request)).await?;

        let AddressPayload { address } = serde_json::from_slice(&body)?;
        Ok(address)
    }

    async fn get<R>(&self, path: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let body = self.send::<()>(Method::GET, path, None).await?;

        Ok(serde_json::from_slice(&body)?)
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .inner
            .request(method, self.url(path))
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(BackendClientError::transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(BackendClientError::transport)?;

        if !status.is_success() {
            return Err(BackendClientError::from_status(status, &body))
                .inspect_err(|e| tracing::error!("backend rejected request: {e}"));
        }

        Ok(body.to_vec())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint.as_str().trim_end_matches('/'))
    }
}

/// Decodes a success body, reading an empty one as `null`.
fn decode_or_null(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_slice(body)?)
}
