#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use junction_client::{
    BackendClientError, BroadcastReceipt,
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
use junction_wallet_engine::Backend;
use reqwest::StatusCode;

/// An in-memory backend recording every call.
///
/// Endpoints answer from the configured data. An endpoint registered with
/// [`FakeBackend::fail`] answers a `400` with the given message instead, and one
/// registered with [`FakeBackend::delay`] sleeps before answering, and a hook
/// registered with [`FakeBackend::on_answer`] runs just before the answer.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    devices: Vec<Device>,
    wallets: Vec<Wallet>,
    wallets_after_mutation: Option<Vec<Wallet>>,
    settings: Option<Settings>,
    nodes: Nodes,
    txid: Option<String>,
    failures: HashMap<&'static str, String>,
    delays: HashMap<&'static str, Duration>,
    hooks: HashMap<&'static str, Box<dyn FnOnce() + Send>>,
    calls: Vec<&'static str>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        self.inner.lock().unwrap().devices = devices;
        self
    }

    pub fn with_wallets(self, wallets: Vec<Wallet>) -> Self {
        self.inner.lock().unwrap().wallets = wallets;
        self
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        self.inner.lock().unwrap().settings = Some(settings);
        self
    }

    pub fn with_txid(self, txid: &str) -> Self {
        self.inner.lock().unwrap().txid = Some(txid.to_owned());
        self
    }

    /// Wallets reported once any mutating call succeeded.
    pub fn after_mutation(self, wallets: Vec<Wallet>) -> Self {
        self.inner.lock().unwrap().wallets_after_mutation = Some(wallets);
        self
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        self.inner.lock().unwrap().devices = devices;
    }

    pub fn fail(&self, endpoint: &'static str, message: &str) {
        self.inner.lock().unwrap().failures.insert(endpoint, message.to_owned());
    }

    pub fn delay(&self, endpoint: &'static str, delay: Duration) {
        self.inner.lock().unwrap().delays.insert(endpoint, delay);
    }

    /// Runs `hook` once, while the next call to `endpoint` is answering.
    pub fn on_answer(&self, endpoint: &'static str, hook: impl FnOnce() + Send + 'static) {
        self.inner.lock().unwrap().hooks.insert(endpoint, Box::new(hook));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls().into_iter().filter(|call| *call == endpoint).count()
    }

    async fn call<T>(
        &self,
        endpoint: &'static str,
        answer: impl FnOnce(&mut FakeState) -> T,
    ) -> Result<T, BackendClientError> {
        let delay = {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(endpoint);
            state.delays.get(endpoint).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let hook = self.inner.lock().unwrap().hooks.remove(endpoint);
        if let Some(hook) = hook {
            hook();
        }

        let mut state = self.inner.lock().unwrap();
        if let Some(message) = state.failures.get(endpoint) {
            return Err(BackendClientError::Backend { status: StatusCode::BAD_REQUEST, message: message.clone() });
        }

        Ok(answer(&mut state))
    }

    async fn mutate<T>(
        &self,
        endpoint: &'static str,
        answer: impl FnOnce(&mut FakeState) -> T,
    ) -> Result<T, BackendClientError> {
        self.call(endpoint, |state| {
            if let Some(wallets) = state.wallets_after_mutation.take() {
                state.wallets = wallets;
            }
            answer(state)
        })
        .await
    }
}

impl Backend for FakeBackend {
    async fn get_devices(&self) -> Result<Vec<Device>, BackendClientError> {
        self.call("get_devices", |state| state.devices.clone()).await
    }

    async fn get_wallets(&self) -> Result<Vec<Wallet>, BackendClientError> {
        self.call("get_wallets", |state| state.wallets.clone()).await
    }

    async fn create_wallet(&self, _request: CreateWalletRequest) -> Result<Option<Wallet>, BackendClientError> {
        self.mutate("create_wallet", |_| None).await
    }

    async fn add_signer(&self, _request: AddSignerRequest) -> Result<Option<Wallet>, BackendClientError> {
        self.mutate("add_signer", |_| None).await
    }

    async fn prompt_pin(&self, _target: PromptTarget) -> Result<(), BackendClientError> {
        self.call("prompt_pin", |_| ()).await
    }

    async fn enter_pin(&self, _request: EnterPinRequest) -> Result<(), BackendClientError> {
        self.mutate("enter_pin", |_| ()).await
    }

    async fn cancel_prompt(&self) -> Result<(), BackendClientError> {
        self.call("cancel_prompt", |_| ()).await
    }

    async fn create_psbt(&self, _request: CreatePsbtRequest) -> Result<Option<Psbt>, BackendClientError> {
        self.mutate("create_psbt", |_| None).await
    }

    async fn sign_psbt(&self, _request: SignPsbtRequest) -> Result<Option<Psbt>, BackendClientError> {
        self.mutate("sign_psbt", |_| None).await
    }

    async fn broadcast(&self, _request: BroadcastRequest) -> Result<BroadcastReceipt, BackendClientError> {
        self.mutate("broadcast", |state| {
            let receipt = match &state.txid {
                Some(txid) => serde_json::json!({ "txid": txid }),
                None => serde_json::json!({}),
            };
            serde_json::from_value(receipt)
        })
        .await?
        .map_err(BackendClientError::from)
    }

    async fn get_settings(&self) -> Result<Settings, BackendClientError> {
        self.call("get_settings", |state| state.settings.clone())
            .await?
            .ok_or_else(|| BackendClientError::other("no settings configured"))
    }

    async fn update_settings(&self, _rpc: RpcSettings) -> Result<(), BackendClientError> {
        self.call("update_settings", |_| ()).await
    }

    async fn get_nodes(&self) -> Result<Nodes, BackendClientError> {
        self.call("get_nodes", |state| state.nodes.clone()).await
    }

    async fn generate_address(&self, wallet_name: &str) -> Result<String, BackendClientError> {
        let address = format!("tb1q{wallet_name}");
        self.mutate("generate_address", |_| address).await
    }
}
