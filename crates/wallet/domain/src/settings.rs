//! Backend settings and known nodes.

use alloc::{string::String, vec::Vec};
use core::fmt;

use bon::Builder;
use dissolve_derive::Dissolve;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::wallet::Node;

/// RPC connection settings of the node the backend talks to.
#[derive(Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RpcSettings {
    /// The RPC user.
    #[builder(into)]
    user: String,

    /// The RPC password. Never serialized.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing, default))]
    password: String,

    /// The node host.
    #[builder(into)]
    host: String,

    /// The node RPC port.
    #[builder(into)]
    port: String,

    /// Set by the backend when it cannot reach the node with these settings.
    #[builder(into)]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    error: Option<String>,
}

/// The backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    /// The node connection settings.
    rpc: RpcSettings,
}

/// Nodes known to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Dissolve)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Nodes {
    /// Bitcoin nodes.
    #[builder(default)]
    bitcoin: Vec<Node>,
}

impl RpcSettings {
    /// Returns the RPC user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the RPC password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the node host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the node RPC port.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns the connectivity error reported by the backend.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl fmt::Debug for RpcSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("error", &self.error)
            .finish()
    }
}

impl Settings {
    /// Returns the node connection settings.
    pub fn rpc(&self) -> &RpcSettings {
        &self.rpc
    }

    /// Whether the backend can reach its node with these settings.
    ///
    /// Views that need a node (sending, signing, history) are gated on this.
    pub fn is_valid(&self) -> bool {
        self.rpc.error.is_none()
    }
}

impl Nodes {
    /// Returns the bitcoin nodes.
    pub fn bitcoin(&self) -> &[Node] {
        &self.bitcoin
    }
}
