/// Errors that can occur when validating a backend request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// A required name is empty.
    #[error("empty {0} error")]
    EmptyName(&'static str),

    /// The number of required signatures exceeds the number of signers.
    #[error("excess threshold error: m exceeds n")]
    ExcessThreshold,

    /// A PSBT request without outputs.
    #[error("psbt request has no outputs")]
    NoOutputs,

    /// An output without an address.
    #[error("output {0} has no address")]
    EmptyAddress(usize),

    /// An output whose amount is not a positive finite number.
    #[error("output {0} has an invalid amount")]
    InvalidAmount(usize),

    /// An empty PIN.
    #[error("empty pin error")]
    EmptyPin,
}
