//! Validated requests accepted by [`BackendClient`](crate::BackendClient).

mod error;

pub use self::error::RequestError;

use core::num::NonZeroU32;

use bon::Builder;
use dissolve_derive::Dissolve;
use junction_wallet_domain::{Fingerprint, wallet::Network};

/// Request to create a new multisig wallet.
///
/// # Validation
///
/// The request validates that:
/// - `name` is not blank
/// - `m` does not exceed `n`
#[derive(Debug, Clone, Dissolve)]
pub struct CreateWalletRequest {
    /// The unique wallet name
    name: String,

    /// Number of signatures required to spend
    m: NonZeroU32,

    /// Total number of signers
    n: NonZeroU32,

    /// The network, backend default when absent
    network: Option<Network>,

    /// Node connection details, backend default when absent
    node: Option<NodeCredentials>,
}

/// Node connection details sent along with a new wallet.
#[derive(Clone, Builder, Dissolve)]
pub struct NodeCredentials {
    #[builder(into)]
    host: String,

    #[builder(into)]
    port: String,

    #[builder(into)]
    user: String,

    #[builder(into)]
    password: String,
}

/// Request to attach a device to a wallet as a new signer.
#[derive(Debug, Clone, Dissolve)]
pub struct AddSignerRequest {
    /// The wallet to extend
    wallet_name: String,

    /// The display name of the new signer
    signer_name: String,

    /// The device to read the xpub from, addressed by fingerprint
    device_id: Fingerprint,
}

/// What a PIN prompt should be shown for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptTarget {
    /// The locked device of a wallet, chosen by the backend.
    Wallet(String),
    /// The device at this connection handle.
    Device(String),
}

/// A PIN typed on the prompt matrix of a locked device.
#[derive(Clone, Dissolve)]
pub struct EnterPinRequest {
    pin: String,
}

/// One output of a new PSBT.
#[derive(Debug, Clone, PartialEq, Builder, Dissolve)]
pub struct PsbtOutput {
    /// The destination address
    #[builder(into)]
    address: String,

    /// The amount in BTC
    btc: f64,

    /// Whether the fee is deducted from this output
    #[builder(default)]
    subtract_fees: bool,
}

/// Request to create a PSBT spending from a wallet.
///
/// # Validation
///
/// The request validates that there is at least one output, and that every output
/// has an address and a positive, finite amount.
#[derive(Debug, Clone, Dissolve)]
pub struct CreatePsbtRequest {
    /// The wallet to spend from
    wallet_name: String,

    /// The outputs to pay
    outputs: Vec<PsbtOutput>,
}

/// Request to sign a pending PSBT with a device.
#[derive(Debug, Clone, Builder, Dissolve)]
pub struct SignPsbtRequest {
    /// The wallet owning the PSBT
    #[builder(into)]
    wallet_name: String,

    /// The signing device, addressed by fingerprint
    #[builder(into)]
    device_id: Fingerprint,

    /// The position of the PSBT in the wallet's pending list
    index: usize,
}

/// Request to broadcast a fully signed PSBT.
#[derive(Debug, Clone, Builder, Dissolve)]
pub struct BroadcastRequest {
    /// The wallet owning the PSBT
    #[builder(into)]
    wallet_name: String,

    /// The position of the PSBT in the wallet's pending list
    index: usize,
}

#[bon::bon]
impl CreateWalletRequest {
    /// Creates a new wallet creation request with validation.
    ///
    /// Returns an error if validation fails.
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        m: NonZeroU32,
        n: NonZeroU32,
        network: Option<Network>,
        node: Option<NodeCredentials>,
    ) -> Result<Self, RequestError> {
        if name.trim().is_empty() {
            return Err(RequestError::EmptyName("wallet name"));
        }

        if m > n {
            return Err(RequestError::ExcessThreshold);
        }

        Ok(Self { name, m, n, network, node })
    }

    /// Returns the wallet name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[bon::bon]
impl AddSignerRequest {
    /// Creates a new add-signer request with validation.
    #[builder]
    pub fn new(
        #[builder(into)] wallet_name: String,
        #[builder(into)] signer_name: String,
        #[builder(into)] device_id: Fingerprint,
    ) -> Result<Self, RequestError> {
        if signer_name.trim().is_empty() {
            return Err(RequestError::EmptyName("signer name"));
        }

        Ok(Self { wallet_name, signer_name, device_id })
    }

    /// Returns the wallet name.
    pub fn wallet_name(&self) -> &str {
        &self.wallet_name
    }

    /// Returns the signer name.
    pub fn signer_name(&self) -> &str {
        &self.signer_name
    }

    /// Returns the device fingerprint.
    pub fn device_id(&self) -> &Fingerprint {
        &self.device_id
    }
}

impl EnterPinRequest {
    /// Creates a new PIN request, rejecting an empty PIN.
    pub fn new<S>(pin: S) -> Result<Self, RequestError>
    where
        S: Into<String>,
    {
        let pin = pin.into();

        if pin.is_empty() {
            return Err(RequestError::EmptyPin);
        }

        Ok(Self { pin })
    }
}

impl core::fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl core::fmt::Debug for EnterPinRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnterPinRequest").field("pin", &"<redacted>").finish()
    }
}

#[bon::bon]
impl CreatePsbtRequest {
    /// Creates a new PSBT request with validation.
    #[builder]
    pub fn new(
        #[builder(into)] wallet_name: String,
        outputs: Vec<PsbtOutput>,
    ) -> Result<Self, RequestError> {
        if outputs.is_empty() {
            return Err(RequestError::NoOutputs);
        }

        for (index, output) in outputs.iter().enumerate() {
            if output.address.trim().is_empty() {
                return Err(RequestError::EmptyAddress(index));
            }

            if !output.btc.is_finite() || output.btc <= 0.0 {
                return Err(RequestError::InvalidAmount(index));
            }
        }

        Ok(Self { wallet_name, outputs })
    }

    /// Returns the wallet name.
    pub fn wallet_name(&self) -> &str {
        &self.wallet_name
    }

    /// Returns the outputs to pay.
    pub fn outputs(&self) -> &[PsbtOutput] {
        &self.outputs
    }
}

impl SignPsbtRequest {
    /// Returns the wallet name.
    pub fn wallet_name(&self) -> &str {
        &self.wallet_name
    }

    /// Returns the signing device fingerprint.
    pub fn device_id(&self) -> &Fingerprint {
        &self.device_id
    }

    /// Returns the PSBT index.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl BroadcastRequest {
    /// Returns the wallet name.
    pub fn wallet_name(&self) -> &str {
        &self.wallet_name
    }

    /// Returns the PSBT index.
    pub fn index(&self) -> usize {
        self.index
    }
}
