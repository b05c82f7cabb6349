use std::borrow::Cow;

use junction_client::{BackendClientError, request::RequestError};
use junction_wallet_domain::Fingerprint;
use tokio::sync::oneshot;

use crate::state::{Slot, TransitionError};

/// Error returned by [`WalletEngine`](crate::WalletEngine) operations.
///
/// Use [`WalletEngineError::kind`] to branch on what went wrong.
#[derive(Debug, thiserror::Error)]
#[error("wallet engine error: {0}")]
pub struct WalletEngineError(#[from] WalletEngineErrorKind);

/// What went wrong in a [`WalletEngine`](crate::WalletEngine) operation.
#[derive(Debug, thiserror::Error)]
pub enum WalletEngineErrorKind {
    /// The backend call failed: unreachable, timed out, rejected or answered garbage.
    #[error(transparent)]
    Backend(#[from] BackendClientError),

    /// The action targets a device that is not currently enumerated and unlocked.
    #[error("device {0} is not available")]
    DeviceUnavailable(Fingerprint),

    /// Broadcast was attempted before enough signatures were collected.
    #[error("threshold not met: {remaining} more signature(s) required")]
    ThresholdNotMet {
        /// Signatures still missing.
        remaining: u32,
    },

    /// The wallet or PSBT does not exist.
    #[error("not found error: {0}")]
    NotFound(Cow<'static, str>),

    /// Another operation occupies the slot this one needs.
    #[error("{0} already in progress")]
    Busy(Slot),

    /// The device is already one of the wallet's signers.
    #[error("device {0} is already a signer of this wallet")]
    AlreadySigner(Fingerprint),

    /// The wallet already has all of its signers.
    #[error("wallet {0} has no free signer slot")]
    WalletFull(String),

    /// The PSBT was already broadcast.
    #[error("psbt {index} of wallet {wallet} was already broadcast")]
    PsbtConsumed {
        /// The wallet name.
        wallet: String,
        /// The PSBT index.
        index: usize,
    },

    /// The device does not belong to any signer of the wallet.
    #[error("device {0} is not a signer of this wallet")]
    NotASigner(Fingerprint),

    /// The PSBT already carries enough signatures to be broadcast.
    #[error("psbt {index} of wallet {wallet} is already fully signed")]
    AlreadyFullySigned {
        /// The wallet name.
        wallet: String,
        /// The PSBT index.
        index: usize,
    },

    /// The request failed validation before reaching the backend.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The state store rejected an event.
    #[error("state transition error: {0}")]
    Transition(TransitionError),

    /// The state store is gone.
    #[error("mpsc sender error: {0}")]
    MpscSender(Cow<'static, str>),

    /// The state store dropped a reply.
    #[error("oneshot receive error: {0}")]
    OneshotReceive(#[from] oneshot::error::RecvError),

    /// Any other engine failure.
    #[error("other error: {0}")]
    Other(Cow<'static, str>),
}

impl WalletEngineError {
    /// Returns what went wrong.
    pub fn kind(&self) -> &WalletEngineErrorKind {
        &self.0
    }

    /// Consumes the error, returning what went wrong.
    pub fn into_kind(self) -> WalletEngineErrorKind {
        self.0
    }
}

impl WalletEngineErrorKind {
    pub(crate) fn mpsc_sender<E>(err: E) -> Self
    where
        Cow<'static, str>: From<E>,
    {
        Self::MpscSender(err.into())
    }

    pub(crate) fn not_found<E>(err: E) -> Self
    where
        Cow<'static, str>: From<E>,
    {
        Self::NotFound(err.into())
    }

    pub(crate) fn other<E>(err: E) -> Self
    where
        Cow<'static, str>: From<E>,
    {
        Self::Other(err.into())
    }

    /// Whether the state store runtime is gone, as opposed to the operation failing.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::MpscSender(_) | Self::OneshotReceive(_) | Self::Other(_))
    }
}

impl From<TransitionError> for WalletEngineErrorKind {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::SlotOccupied(slot) => Self::Busy(slot),
            TransitionError::UnknownWallet(name) => Self::not_found(format!("wallet {name} not found")),
            err => Self::Transition(err),
        }
    }
}

impl From<BackendClientError> for WalletEngineError {
    fn from(err: BackendClientError) -> Self {
        Self(err.into())
    }
}
