//! Transaction lifecycle controller of the junction wallet client.
//!
//! The [`WalletEngine`] drives wallet creation, signer enrollment, PIN prompts and the
//! create, sign and broadcast lifecycle of PSBTs against a [`Backend`]. All state it
//! learns lives in a single immutable [`AppState`] owned by a store task; operations
//! talk to that task over channels and subscribers observe snapshots through
//! [`WalletEngine::subscribe`].
//!
//! The backend stays the source of truth: every mutating call is followed by a refetch
//! of what it touched, and a failed call leaves the local state as it was, apart from
//! releasing the operation slot it claimed.

mod backend;
mod error;
mod poller;
mod store;

pub mod state;
pub mod view;

pub use self::{
    backend::Backend,
    error::{WalletEngineError, WalletEngineErrorKind},
    poller::DevicePoller,
    state::AppState,
};

use core::{future::Future, time::Duration};
use std::sync::Arc;

use bon::Builder;
use junction_client::{
    BackendClientError, BroadcastReceipt,
    request::{
        AddSignerRequest, BroadcastRequest, CreatePsbtRequest, CreateWalletRequest,
        EnterPinRequest, PromptTarget, SignPsbtRequest,
    },
};
use junction_wallet_domain::{
    device::Device,
    psbt::{Psbt, PsbtStage, SignatureCounting},
    settings::{Nodes, RpcSettings, Settings},
    wallet::Wallet,
};
use tokio::{sync::watch, task::JoinHandle};

use self::{
    state::{Broadcasting, Event, Signing},
    store::StoreHandle,
    view::PsbtStatus,
};

type Result<T, E = WalletEngineError> = core::result::Result<T, E>;

/// Default interval between two device enumerations of the [`DevicePoller`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration of the [`WalletEngine`].
#[derive(Debug, Clone, Copy, Builder)]
pub struct WalletEngineConfig {
    /// Interval between two device enumerations.
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    poll_interval: Duration,

    /// How signatures are counted against the wallet threshold.
    #[builder(default)]
    signature_counting: SignatureCounting,
}

/// The lifecycle controller. See the [crate docs](crate).
pub struct WalletEngine<B, R> {
    backend: Arc<B>,
    config: WalletEngineConfig,
    runtime: R,
}

/// A [`WalletEngine`] whose state store is not running.
pub struct Stopped;

/// A [`WalletEngine`] whose state store is running.
pub struct Started {
    store: StoreHandle,
    handle: JoinHandle<()>,
}

impl Default for WalletEngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WalletEngineConfig {
    /// Returns the device polling interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the signature counting policy.
    pub fn signature_counting(&self) -> SignatureCounting {
        self.signature_counting
    }
}

impl<B, R> WalletEngine<B, R> {
    /// Returns the engine configuration.
    pub fn config(&self) -> &WalletEngineConfig {
        &self.config
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B> WalletEngine<B, Stopped>
where
    B: Backend,
{
    /// Creates a stopped engine.
    pub fn new(backend: B, config: WalletEngineConfig) -> Self {
        Self { backend: Arc::new(backend), config, runtime: Stopped }
    }

    /// Spawns the state store on the current tokio runtime.
    pub fn start(self) -> WalletEngine<B, Started> {
        let (store, handle) = store::spawn_new(AppState::default());

        WalletEngine { backend: self.backend, config: self.config, runtime: Started { store, handle } }
    }
}

impl<B> WalletEngine<B, Started>
where
    B: Backend,
{
    /// Returns the current state snapshot.
    pub fn state(&self) -> Arc<AppState> {
        self.store().state()
    }

    /// Returns a receiver notified with every state change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.store().subscribe()
    }

    /// Enumerates the attached devices.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_devices(&self) -> Result<Vec<Device>> {
        self.refresh(
            Event::DevicesRequested,
            self.backend.get_devices(),
            Event::DevicesLoaded,
            Event::DevicesFailed,
        )
        .await
        .inspect_err(|e| tracing::error!("failed to refresh devices: {e}"))
    }

    /// Fetches the wallets, keeping the active wallet when it still exists.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_wallets(&self) -> Result<Vec<Wallet>> {
        self.refresh(
            Event::WalletsRequested,
            self.backend.get_wallets(),
            Event::WalletsLoaded,
            Event::WalletsFailed,
        )
        .await
        .inspect_err(|e| tracing::error!("failed to refresh wallets: {e}"))
    }

    /// Fetches the backend settings.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_settings(&self) -> Result<Settings> {
        self.refresh(
            Event::SettingsRequested,
            self.backend.get_settings(),
            Event::SettingsLoaded,
            Event::SettingsFailed,
        )
        .await
        .inspect_err(|e| tracing::error!("failed to refresh settings: {e}"))
    }

    /// Fetches the nodes known to the backend.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_nodes(&self) -> Result<Nodes> {
        self.refresh(Event::NodesRequested, self.backend.get_nodes(), Event::NodesLoaded, Event::NodesFailed)
            .await
            .inspect_err(|e| tracing::error!("failed to refresh nodes: {e}"))
    }

    /// Loads devices, wallets, nodes and settings, in that order.
    ///
    /// Every load is attempted; the first failure is returned.
    #[tracing::instrument(skip_all)]
    pub async fn bootstrap(&self) -> Result<()> {
        let devices = self.refresh_devices().await.map(drop);
        let wallets = self.refresh_wallets().await.map(drop);
        let nodes = self.refresh_nodes().await.map(drop);
        let settings = self.refresh_settings().await.map(drop);

        devices.and(wallets).and(nodes).and(settings)
    }

    /// Makes `name` the active wallet.
    #[tracing::instrument(skip_all, fields(wallet = name))]
    pub async fn select_wallet(&self, name: &str) -> Result<()> {
        self.store().dispatch(Event::WalletSelected(name.to_owned())).await?;
        Ok(())
    }

    /// Creates a wallet and makes it the active one.
    #[tracing::instrument(skip_all, fields(wallet = request.name()))]
    pub async fn create_wallet(&self, request: CreateWalletRequest) -> Result<Wallet> {
        let name = request.name().to_owned();

        let echoed = self
            .backend
            .create_wallet(request)
            .await
            .inspect_err(|e| tracing::error!("failed to create wallet: {e}"))?;

        self.refresh_wallets().await?;

        let wallet = self.state().wallet(&name).cloned();
        if wallet.is_some() {
            self.select_wallet(&name).await?;
        }

        wallet
            .or(echoed)
            .ok_or_else(|| WalletEngineErrorKind::not_found(format!("created wallet {name} not listed")).into())
    }

    /// Adds an attached, unlocked device to a wallet as a signer.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name(), device = %request.device_id()))]
    pub async fn add_signer(&self, request: AddSignerRequest) -> Result<Wallet> {
        let state = self.state();
        let wallet_name = request.wallet_name().to_owned();
        let fingerprint = request.device_id().clone();

        let wallet = state
            .wallet(&wallet_name)
            .ok_or_else(|| WalletEngineErrorKind::not_found(format!("wallet {wallet_name} not found")))?;

        state
            .device_list()
            .iter()
            .filter_map(Device::as_unlocked)
            .find(|device| *device.fingerprint() == fingerprint)
            .ok_or_else(|| WalletEngineErrorKind::DeviceUnavailable(fingerprint.clone()))?;

        if wallet.signer_by_fingerprint(&fingerprint).is_some() {
            return Err(WalletEngineErrorKind::AlreadySigner(fingerprint).into());
        }
        if wallet.open_signer_slots() == 0 {
            return Err(WalletEngineErrorKind::WalletFull(wallet_name).into());
        }

        self.store().dispatch(Event::SignerAddStarted(fingerprint)).await?;

        let outcome = self.backend.add_signer(request).await.map_err(WalletEngineError::from);

        self.release(Event::SignerAddFinished).await;

        let echoed = outcome.inspect_err(|e| tracing::error!("failed to add signer: {e}"))?;
        self.refresh_wallets().await?;

        self.state()
            .wallet(&wallet_name)
            .cloned()
            .or(echoed)
            .ok_or_else(|| WalletEngineErrorKind::not_found(format!("wallet {wallet_name} not found")).into())
    }

    /// Asks the backend to show the PIN matrix on a locked device.
    #[tracing::instrument(skip_all, fields(?target))]
    pub async fn prompt_pin(&self, target: PromptTarget) -> Result<()> {
        self.backend
            .prompt_pin(target.clone())
            .await
            .inspect_err(|e| tracing::error!("failed to prompt for pin: {e}"))?;

        self.store().dispatch(Event::PromptOpened(target)).await?;
        Ok(())
    }

    /// Sends the PIN for the prompted device, then re-enumerates devices.
    #[tracing::instrument(skip_all)]
    pub async fn enter_pin(&self, request: EnterPinRequest) -> Result<Vec<Device>> {
        self.backend
            .enter_pin(request)
            .await
            .inspect_err(|e| tracing::error!("failed to enter pin: {e}"))?;

        self.store().dispatch(Event::PromptClosed).await?;
        self.refresh_devices().await
    }

    /// Cancels the pending PIN prompt.
    #[tracing::instrument(skip_all)]
    pub async fn cancel_prompt(&self) -> Result<()> {
        self.backend
            .cancel_prompt()
            .await
            .inspect_err(|e| tracing::error!("failed to cancel prompt: {e}"))?;

        self.store().dispatch(Event::PromptClosed).await?;
        Ok(())
    }

    /// Creates a PSBT spending from a wallet.
    ///
    /// Returns the PSBT echoed by the backend, or else the newest PSBT of the wallet.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name()))]
    pub async fn create_psbt(&self, request: CreatePsbtRequest) -> Result<Option<Psbt>> {
        let wallet_name = request.wallet_name().to_owned();

        let echoed = self
            .backend
            .create_psbt(request)
            .await
            .inspect_err(|e| tracing::error!("failed to create psbt: {e}"))?;

        self.refresh_wallets().await?;

        let newest = self.state().wallet(&wallet_name).and_then(|wallet| wallet.psbts().last().cloned());
        Ok(echoed.or(newest))
    }

    /// Signs a PSBT with an attached, unlocked device.
    ///
    /// The device must belong to one of the wallet's signers and the PSBT must still
    /// be missing signatures. Only one device signs at a time; a request arriving
    /// while the signing slot is taken fails with [`WalletEngineErrorKind::Busy`]
    /// without reaching the backend.
    #[tracing::instrument(
        skip_all,
        fields(wallet = request.wallet_name(), device = %request.device_id(), index = request.index()),
    )]
    pub async fn sign(&self, request: SignPsbtRequest) -> Result<PsbtStatus> {
        let state = self.state();
        let wallet_name = request.wallet_name().to_owned();
        let fingerprint = request.device_id().clone();
        let index = request.index();

        let psbt = self.ensure_pending_psbt(&state, &wallet_name, index)?;
        let wallet = state
            .wallet(&wallet_name)
            .ok_or_else(|| WalletEngineErrorKind::not_found(format!("wallet {wallet_name} not found")))?;

        if wallet.signer_by_fingerprint(&fingerprint).is_none() {
            return Err(WalletEngineErrorKind::NotASigner(fingerprint).into());
        }

        if wallet.psbt_stage(psbt, self.config.signature_counting) == PsbtStage::FullySigned {
            return Err(WalletEngineErrorKind::AlreadyFullySigned { wallet: wallet_name, index }.into());
        }

        state
            .device_list()
            .iter()
            .filter_map(Device::as_unlocked)
            .find(|device| *device.fingerprint() == fingerprint)
            .ok_or_else(|| WalletEngineErrorKind::DeviceUnavailable(fingerprint.clone()))?;

        let signing = Signing { wallet: wallet_name.clone(), fingerprint, index };
        self.store().dispatch(Event::SigningStarted(signing)).await?;

        let outcome = self.backend.sign_psbt(request).await.map_err(WalletEngineError::from);

        self.release(Event::SigningFinished).await;

        outcome.inspect_err(|e| tracing::error!("failed to sign psbt: {e}"))?;
        self.refresh_wallets().await?;

        view::psbt_status(&self.state(), &wallet_name, index, self.config.signature_counting).ok_or_else(|| {
            WalletEngineErrorKind::not_found(format!("psbt {index} of wallet {wallet_name} not found")).into()
        })
    }

    /// Broadcasts a fully signed PSBT.
    ///
    /// A PSBT still missing signatures fails with
    /// [`WalletEngineErrorKind::ThresholdNotMet`] without reaching the backend.
    #[tracing::instrument(skip_all, fields(wallet = request.wallet_name(), index = request.index()))]
    pub async fn broadcast(&self, request: BroadcastRequest) -> Result<BroadcastReceipt> {
        let state = self.state();
        let wallet_name = request.wallet_name().to_owned();
        let index = request.index();

        let psbt = self.ensure_pending_psbt(&state, &wallet_name, index)?;
        let remaining = state
            .wallet(&wallet_name)
            .map_or(0, |wallet| wallet.signatures_remaining(psbt, self.config.signature_counting));

        if remaining > 0 {
            return Err(WalletEngineErrorKind::ThresholdNotMet { remaining }.into());
        }

        let txid = psbt.txid().map(ToOwned::to_owned);
        self.store()
            .dispatch(Event::BroadcastStarted(Broadcasting { wallet: wallet_name, index }))
            .await?;

        let outcome = self.backend.broadcast(request).await.map_err(WalletEngineError::from);

        let consumed = outcome.as_ref().ok().and_then(|receipt| receipt.txid().map(ToOwned::to_owned).or(txid));
        self.release(Event::BroadcastFinished(consumed)).await;

        let receipt = outcome.inspect_err(|e| tracing::error!("failed to broadcast psbt: {e}"))?;
        self.refresh_wallets().await?;

        Ok(receipt)
    }

    /// Derives the next receive address of a wallet.
    #[tracing::instrument(skip_all, fields(wallet = wallet_name))]
    pub async fn generate_address(&self, wallet_name: &str) -> Result<String> {
        let address = self
            .backend
            .generate_address(wallet_name)
            .await
            .inspect_err(|e| tracing::error!("failed to generate address: {e}"))?;

        self.refresh_wallets().await?;
        Ok(address)
    }

    /// Replaces the node connection settings, then reloads them.
    ///
    /// The reloaded settings carry the backend's verdict on the new connection.
    #[tracing::instrument(skip_all)]
    pub async fn update_settings(&self, rpc: RpcSettings) -> Result<Settings> {
        self.backend
            .update_settings(rpc)
            .await
            .inspect_err(|e| tracing::error!("failed to update settings: {e}"))?;

        self.refresh_settings().await
    }

    /// Starts re-enumerating devices every configured poll interval.
    pub fn start_device_poller(&self) -> DevicePoller {
        DevicePoller::spawn(self.backend.clone(), self.store().clone(), self.config.poll_interval)
    }

    /// Stops the state store, dropping the state.
    pub async fn stop(self) -> Result<WalletEngine<B, Stopped>> {
        self.store().shutdown()?;

        self.runtime
            .handle
            .await
            .map_err(|e| WalletEngineErrorKind::other(format!("state store misbehavior: {e}")))?;

        Ok(WalletEngine { backend: self.backend, config: self.config, runtime: Stopped })
    }

    fn store(&self) -> &StoreHandle {
        &self.runtime.store
    }

    async fn refresh<T, F>(
        &self,
        requested: Event,
        fetch: F,
        loaded: fn(T) -> Event,
        failed: fn(String) -> Event,
    ) -> Result<T>
    where
        T: Clone,
        F: Future<Output = Result<T, BackendClientError>>,
    {
        self.store().dispatch(requested).await?;

        match fetch.await {
            Ok(data) => {
                self.store().dispatch(loaded(data.clone())).await?;
                Ok(data)
            },
            Err(e) => {
                self.store().dispatch(failed(e.to_string())).await?;
                Err(e.into())
            },
        }
    }

    async fn release(&self, finished: Event) {
        let _ = self
            .store()
            .dispatch(finished)
            .await
            .inspect_err(|e| tracing::error!("failed to release operation slot: {e}"));
    }

    fn ensure_pending_psbt<'s>(&self, state: &'s AppState, wallet_name: &str, index: usize) -> Result<&'s Psbt> {
        let psbt = state
            .wallet(wallet_name)
            .ok_or_else(|| WalletEngineErrorKind::not_found(format!("wallet {wallet_name} not found")))?
            .psbt(index)
            .ok_or_else(|| WalletEngineErrorKind::not_found(format!("psbt {index} of wallet {wallet_name} not found")))?;

        if psbt.txid().is_some_and(|txid| state.is_broadcast(txid)) {
            return Err(WalletEngineErrorKind::PsbtConsumed { wallet: wallet_name.to_owned(), index }.into());
        }

        Ok(psbt)
    }
}
