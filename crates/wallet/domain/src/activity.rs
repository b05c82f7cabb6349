//! What a wallet's node reports about its past transactions and spendable coins.

use alloc::string::String;

use bon::Builder;
use dissolve_derive::Dissolve;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A transaction that touched the wallet.
///
/// `amount` is signed: receives are positive, sends negative.
#[derive(Debug, Clone, PartialEq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transaction {
    /// The transaction id.
    #[builder(into)]
    txid: String,

    /// The wallet address involved, when the node reports one.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    address: Option<String>,

    /// Block or first-seen time, in seconds since the unix epoch.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    time: Option<i64>,

    /// Confirmations; negative when the transaction conflicts with the chain.
    #[builder(default)]
    confirmations: i64,

    /// The amount in BTC.
    amount: f64,
}

/// An unspent output the wallet can spend.
#[derive(Debug, Clone, PartialEq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coin {
    /// The id of the transaction that created the output.
    #[builder(into)]
    txid: String,

    /// The output index within that transaction.
    vout: u32,

    /// The address holding the output.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    address: Option<String>,

    /// Confirmations of the creating transaction.
    #[builder(default)]
    confirmations: u64,

    /// The amount in BTC.
    amount: f64,
}

impl Transaction {
    /// Returns the transaction id.
    pub fn txid(&self) -> &str {
        &self.txid
    }

    /// Returns the address involved.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Returns the transaction time.
    pub fn time(&self) -> Option<i64> {
        self.time
    }

    /// Returns the number of confirmations.
    pub fn confirmations(&self) -> i64 {
        self.confirmations
    }

    /// Returns the amount in BTC.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Whether the transaction is not yet in a block.
    pub fn is_pending(&self) -> bool {
        self.confirmations <= 0
    }
}

impl Coin {
    /// Returns the creating transaction id.
    pub fn txid(&self) -> &str {
        &self.txid
    }

    /// Returns the output index.
    pub fn vout(&self) -> u32 {
        self.vout
    }

    /// Returns the holding address.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Returns the number of confirmations.
    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Returns the amount in BTC.
    pub fn amount(&self) -> f64 {
        self.amount
    }
}
