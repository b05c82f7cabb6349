//! Read-only projections of an [`AppState`] for presentation.

use junction_wallet_domain::{
    device::{Device, UnlockedDevice},
    psbt::{PsbtStage, SignatureCounting},
    wallet::Signer,
};
use strum::{Display, IntoStaticStr};

use crate::state::AppState;

/// How a locked signer device gets unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UnlockMethod {
    /// The PIN is typed on a matrix prompted through the backend.
    PinPrompt,
    /// The user follows the instructions on the device itself.
    DeviceInstructions,
}

/// Where one signer stands with respect to a PSBT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerStatus {
    /// The signer has signed every input.
    Signed,
    /// The threshold was reached without this signer.
    DidNotSign,
    /// The signer's device is signing right now.
    Signing,
    /// The signer's device is attached and unlocked.
    Ready(UnlockedDevice),
    /// No unlocked device with the signer's fingerprint is attached.
    NeedsUnlock(UnlockMethod),
}

/// A signer of a wallet together with its [`SignerStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerRow {
    /// The signer.
    pub signer: Signer,
    /// Its status for the PSBT.
    pub status: SignerStatus,
}

/// Signature progress of one PSBT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsbtStatus {
    /// The lifecycle stage.
    pub stage: PsbtStage,
    /// Signatures still missing before broadcast.
    pub signatures_remaining: u32,
}

/// Returns one row per signer of `wallet_name`, in wallet order, for its PSBT `index`.
///
/// `None` when the wallet or the PSBT does not exist.
pub fn signer_statuses(
    state: &AppState,
    wallet_name: &str,
    index: usize,
    counting: SignatureCounting,
) -> Option<Vec<SignerRow>> {
    let wallet = state.wallet(wallet_name)?;
    let psbt = wallet.psbt(index)?;
    let remaining = wallet.signatures_remaining(psbt, counting);

    let rows = wallet
        .signers()
        .iter()
        .map(|signer| {
            let status = if signer.has_signed(psbt) {
                SignerStatus::Signed
            } else if remaining == 0 {
                SignerStatus::DidNotSign
            } else if let Some(device) = signer.available_device(state.device_list()) {
                let signing = state.signing().is_some_and(|signing| {
                    signing.wallet == wallet_name
                        && signing.index == index
                        && signing.fingerprint == *signer.fingerprint()
                });

                if signing { SignerStatus::Signing } else { SignerStatus::Ready(device.clone()) }
            } else if signer.device_type().unlocks_via_pin_prompt() {
                SignerStatus::NeedsUnlock(UnlockMethod::PinPrompt)
            } else {
                SignerStatus::NeedsUnlock(UnlockMethod::DeviceInstructions)
            };

            SignerRow { signer: signer.clone(), status }
        })
        .collect();

    Some(rows)
}

/// Returns the lifecycle stage of a PSBT, including whether this client broadcast it.
pub fn psbt_stage(
    state: &AppState,
    wallet_name: &str,
    index: usize,
    counting: SignatureCounting,
) -> Option<PsbtStage> {
    let wallet = state.wallet(wallet_name)?;
    let psbt = wallet.psbt(index)?;

    if psbt.txid().is_some_and(|txid| state.is_broadcast(txid)) {
        return Some(PsbtStage::Broadcast);
    }

    Some(wallet.psbt_stage(psbt, counting))
}

/// Returns the stage and missing signature count of a PSBT.
pub fn psbt_status(
    state: &AppState,
    wallet_name: &str,
    index: usize,
    counting: SignatureCounting,
) -> Option<PsbtStatus> {
    let wallet = state.wallet(wallet_name)?;
    let signatures_remaining = wallet.signatures_remaining(wallet.psbt(index)?, counting);
    let stage = psbt_stage(state, wallet_name, index, counting)?;

    Some(PsbtStatus { stage, signatures_remaining })
}

/// Whether the PSBT may be broadcast now.
pub fn broadcast_permitted(
    state: &AppState,
    wallet_name: &str,
    index: usize,
    counting: SignatureCounting,
) -> bool {
    state.broadcasting().is_none()
        && psbt_stage(state, wallet_name, index, counting).is_some_and(PsbtStage::is_broadcastable)
}

/// Returns the attached devices that could be added to the active wallet.
pub fn candidate_devices(state: &AppState) -> Vec<&Device> {
    state
        .active_wallet()
        .map(|wallet| wallet.candidate_devices(state.device_list()))
        .unwrap_or_default()
}

/// Whether settings are loaded and the backend reached its node with them.
pub fn settings_valid(state: &AppState) -> bool {
    state.settings().data().is_some_and(|settings| settings.is_valid())
}
