//! Wire types shared by the primary, secondary and push endpoints.
//!
//! Decoding is lenient: unknown fields are ignored and missing display
//! fields fall back to zero/empty, since the backends echo whatever their
//! tunnel process reports.

use serde::{Deserialize, Serialize};

/// Tunnel parameters echoed for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(default)]
    pub mtu: u32,
}

/// Routing information echoed for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(default)]
    pub vpn_network: String,
}

/// Currently active exit node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub country: String,
}

impl NodeRef {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
        }
    }
}

/// One selectable exit country in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerEntry {
    pub country: String,
}

impl ServerEntry {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
        }
    }
}

/// Body of `GET /status`, also embedded in secondary replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    #[serde(default)]
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub routing_table: RoutingTable,
    #[serde(default)]
    pub current_node: Option<NodeRef>,
    /// Only present in secondary-backend replies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerEntry>,
}

/// Body of `POST /connect` on the primary backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub country: String,
}

/// Secondary backend action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcAction {
    Status,
    Connect,
    Disconnect,
}

impl std::fmt::Display for RpcAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcAction::Status => write!(f, "status"),
            RpcAction::Connect => write!(f, "connect"),
            RpcAction::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Request body for the secondary backend's single endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub action: RpcAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl RpcRequest {
    pub fn status() -> Self {
        Self {
            action: RpcAction::Status,
            country: None,
        }
    }

    pub fn connect(country: Option<&str>) -> Self {
        Self {
            action: RpcAction::Connect,
            country: country.map(str::to_string),
        }
    }

    pub fn disconnect() -> Self {
        Self {
            action: RpcAction::Disconnect,
            country: None,
        }
    }
}

/// Reply from the secondary backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub success: bool,
    #[serde(default)]
    pub status: Option<StatusReport>,
    /// Some deployments put the catalog next to `status` instead of inside it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse {
    /// Catalog entries in backend order, wherever the backend put them.
    pub fn servers(&self) -> &[ServerEntry] {
        if !self.servers.is_empty() {
            return &self.servers;
        }
        self.status
            .as_ref()
            .map(|s| s.servers.as_slice())
            .unwrap_or(&[])
    }
}

/// Unsolicited message on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushMessage {
    /// Bytes moved since the last event and current throughput (bytes/s)
    Traffic { size: f64, speed: f64 },
    /// Free-form status line for the status log
    Status { message: String },
}
