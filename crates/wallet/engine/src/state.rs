//! Application state and its transition function.
//!
//! [`AppState`] is an immutable value. Every change is expressed as an [`Event`] and
//! applied by [`reduce`], which either returns the next state or rejects the event with
//! a [`TransitionError`] and leaves the current state untouched.

use std::collections::BTreeSet;

use junction_client::request::PromptTarget;
use junction_wallet_domain::{
    Fingerprint,
    device::Device,
    settings::{Nodes, Settings},
    wallet::Wallet,
};
use strum::{Display, IntoStaticStr};

/// A remote resource together with its loading status.
#[derive(Debug, Clone, PartialEq)]
pub struct Loadable<T> {
    data: Option<T>,
    has_loaded: bool,
    is_loading: bool,
    error: Option<String>,
}

/// An operation the engine runs at most once at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum Slot {
    /// A device is signing a PSBT.
    #[strum(serialize = "signing")]
    Signing,
    /// A device is being added to a wallet as a signer.
    #[strum(serialize = "signer addition")]
    AddingSigner,
    /// A PSBT is being broadcast.
    #[strum(serialize = "broadcast")]
    Broadcasting,
}

/// The signing operation in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signing {
    /// The wallet owning the PSBT.
    pub wallet: String,
    /// The device signing.
    pub fingerprint: Fingerprint,
    /// The PSBT index.
    pub index: usize,
}

/// The broadcast in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcasting {
    /// The wallet owning the PSBT.
    pub wallet: String,
    /// The PSBT index.
    pub index: usize,
}

/// Everything the wallet client knows.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    devices: Loadable<Vec<Device>>,
    wallets: Loadable<Vec<Wallet>>,
    active_wallet: Option<String>,
    settings: Loadable<Settings>,
    nodes: Loadable<Nodes>,
    signing: Option<Signing>,
    adding_signer: Option<Fingerprint>,
    broadcasting: Option<Broadcasting>,
    broadcast_txids: BTreeSet<String>,
    pin_prompt: Option<PromptTarget>,
}

/// A change to the [`AppState`].
#[derive(Debug, Clone)]
pub enum Event {
    /// A device enumeration started.
    DevicesRequested,
    /// A device enumeration finished.
    DevicesLoaded(Vec<Device>),
    /// A device enumeration failed.
    DevicesFailed(String),

    /// A wallet fetch started.
    WalletsRequested,
    /// A wallet fetch finished.
    WalletsLoaded(Vec<Wallet>),
    /// A wallet fetch failed.
    WalletsFailed(String),

    /// A settings fetch started.
    SettingsRequested,
    /// A settings fetch finished.
    SettingsLoaded(Settings),
    /// A settings fetch failed.
    SettingsFailed(String),

    /// A node fetch started.
    NodesRequested,
    /// A node fetch finished.
    NodesLoaded(Nodes),
    /// A node fetch failed.
    NodesFailed(String),

    /// The user picked a wallet.
    WalletSelected(String),

    /// A device started signing.
    SigningStarted(Signing),
    /// The signing operation ended, successfully or not.
    SigningFinished,

    /// A device started being added as a signer.
    SignerAddStarted(Fingerprint),
    /// The signer addition ended, successfully or not.
    SignerAddFinished,

    /// A broadcast started.
    BroadcastStarted(Broadcasting),
    /// The broadcast ended. Carries the id of the broadcast transaction on success.
    BroadcastFinished(Option<String>),

    /// A device is showing its PIN matrix.
    PromptOpened(PromptTarget),
    /// The PIN prompt was answered or cancelled.
    PromptClosed,
}

/// Errors raised by [`reduce`] for events that do not apply to the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The slot the event claims is taken.
    #[error("{0} already in progress")]
    SlotOccupied(Slot),

    /// The event releases a slot nobody holds.
    #[error("no {0} in progress")]
    SlotNotHeld(Slot),

    /// The selected wallet is not loaded.
    #[error("unknown wallet {0}")]
    UnknownWallet(String),
}

impl<T> Default for Loadable<T> {
    fn default() -> Self {
        Self { data: None, has_loaded: false, is_loading: false, error: None }
    }
}

impl<T> Loadable<T> {
    /// Returns the last loaded value.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Whether a value was loaded at least once.
    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    /// Whether a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Returns the error of the last load, if it failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn requested(self) -> Self {
        Self { is_loading: true, ..self }
    }

    fn loaded(data: T) -> Self {
        Self { data: Some(data), has_loaded: true, is_loading: false, error: None }
    }

    fn failed(self, error: String) -> Self {
        Self { is_loading: false, error: Some(error), ..self }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            devices: Loadable::default(),
            wallets: Loadable::default(),
            active_wallet: None,
            settings: Loadable::default(),
            nodes: Loadable::default(),
            signing: None,
            adding_signer: None,
            broadcasting: None,
            broadcast_txids: BTreeSet::new(),
            pin_prompt: None,
        }
    }
}

impl AppState {
    /// Returns the device enumeration.
    pub fn devices(&self) -> &Loadable<Vec<Device>> {
        &self.devices
    }

    /// Returns the enumerated devices, empty until the first enumeration.
    pub fn device_list(&self) -> &[Device] {
        self.devices.data().map_or(&[], Vec::as_slice)
    }

    /// Returns the wallets.
    pub fn wallets(&self) -> &Loadable<Vec<Wallet>> {
        &self.wallets
    }

    /// Returns the wallet with the given name.
    pub fn wallet(&self, name: &str) -> Option<&Wallet> {
        self.wallets.data()?.iter().find(|wallet| wallet.name() == name)
    }

    /// Returns the name of the active wallet.
    pub fn active_wallet_name(&self) -> Option<&str> {
        self.active_wallet.as_deref()
    }

    /// Returns the active wallet.
    pub fn active_wallet(&self) -> Option<&Wallet> {
        self.wallet(self.active_wallet.as_deref()?)
    }

    /// Returns the backend settings.
    pub fn settings(&self) -> &Loadable<Settings> {
        &self.settings
    }

    /// Returns the known nodes.
    pub fn nodes(&self) -> &Loadable<Nodes> {
        &self.nodes
    }

    /// Returns the signing operation in flight.
    pub fn signing(&self) -> Option<&Signing> {
        self.signing.as_ref()
    }

    /// Returns the device being added as a signer.
    pub fn adding_signer(&self) -> Option<&Fingerprint> {
        self.adding_signer.as_ref()
    }

    /// Returns the broadcast in flight.
    pub fn broadcasting(&self) -> Option<&Broadcasting> {
        self.broadcasting.as_ref()
    }

    /// Whether the transaction with this id was broadcast by this client.
    pub fn is_broadcast(&self, txid: &str) -> bool {
        self.broadcast_txids.contains(txid)
    }

    /// Returns the pending PIN prompt.
    pub fn pin_prompt(&self) -> Option<&PromptTarget> {
        self.pin_prompt.as_ref()
    }

    /// Whether the slot is taken.
    pub fn is_busy(&self, slot: Slot) -> bool {
        match slot {
            Slot::Signing => self.signing.is_some(),
            Slot::AddingSigner => self.adding_signer.is_some(),
            Slot::Broadcasting => self.broadcasting.is_some(),
        }
    }
}

/// Applies `event` to `state`, returning the next state.
pub fn reduce(state: &AppState, event: Event) -> Result<AppState, TransitionError> {
    let state = state.clone();

    let next = match event {
        Event::DevicesRequested => AppState { devices: state.devices.requested(), ..state },
        Event::DevicesLoaded(devices) => AppState { devices: Loadable::loaded(devices), ..state },
        Event::DevicesFailed(error) => AppState { devices: state.devices.failed(error), ..state },

        Event::WalletsRequested => AppState { wallets: state.wallets.requested(), ..state },
        Event::WalletsLoaded(wallets) => {
            let active_wallet = state
                .active_wallet
                .filter(|name| wallets.iter().any(|wallet| wallet.name() == name))
                .or_else(|| wallets.first().map(|wallet| wallet.name().to_owned()));

            AppState { wallets: Loadable::loaded(wallets), active_wallet, ..state }
        },
        Event::WalletsFailed(error) => AppState { wallets: state.wallets.failed(error), ..state },

        Event::SettingsRequested => AppState { settings: state.settings.requested(), ..state },
        Event::SettingsLoaded(settings) => AppState { settings: Loadable::loaded(settings), ..state },
        Event::SettingsFailed(error) => AppState { settings: state.settings.failed(error), ..state },

        Event::NodesRequested => AppState { nodes: state.nodes.requested(), ..state },
        Event::NodesLoaded(nodes) => AppState { nodes: Loadable::loaded(nodes), ..state },
        Event::NodesFailed(error) => AppState { nodes: state.nodes.failed(error), ..state },

        Event::WalletSelected(name) => {
            if state.wallet(&name).is_none() {
                return Err(TransitionError::UnknownWallet(name));
            }
            AppState { active_wallet: Some(name), ..state }
        },

        Event::SigningStarted(signing) => {
            claim(&state, Slot::Signing)?;
            AppState { signing: Some(signing), ..state }
        },
        Event::SigningFinished => {
            release(&state, Slot::Signing)?;
            AppState { signing: None, ..state }
        },

        Event::SignerAddStarted(fingerprint) => {
            claim(&state, Slot::AddingSigner)?;
            AppState { adding_signer: Some(fingerprint), ..state }
        },
        Event::SignerAddFinished => {
            release(&state, Slot::AddingSigner)?;
            AppState { adding_signer: None, ..state }
        },

        Event::BroadcastStarted(broadcasting) => {
            claim(&state, Slot::Broadcasting)?;
            AppState { broadcasting: Some(broadcasting), ..state }
        },
        Event::BroadcastFinished(txid) => {
            release(&state, Slot::Broadcasting)?;
            let mut broadcast_txids = state.broadcast_txids;
            broadcast_txids.extend(txid);
            AppState { broadcasting: None, broadcast_txids, ..state }
        },

        Event::PromptOpened(target) => AppState { pin_prompt: Some(target), ..state },
        Event::PromptClosed => AppState { pin_prompt: None, ..state },
    };

    Ok(next)
}

fn claim(state: &AppState, slot: Slot) -> Result<(), TransitionError> {
    if state.is_busy(slot) { Err(TransitionError::SlotOccupied(slot)) } else { Ok(()) }
}

fn release(state: &AppState, slot: Slot) -> Result<(), TransitionError> {
    if state.is_busy(slot) { Ok(()) } else { Err(TransitionError::SlotNotHeld(slot)) }
}
