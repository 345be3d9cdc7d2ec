//! vpnctl Network Layer
//!
//! HTTP and WebSocket plumbing for the tunnel control plane.
//!
//! Architecture:
//! 1. `HttpClient` → hyper/tokio, every call bounded by a timeout
//! 2. `PrimaryBackend` → `/connect`, `/disconnect`, `/status`
//! 3. `SecondaryBackend` → single JSON-RPC style action endpoint
//! 4. `PushClient` → optional WebSocket carrying traffic/status events

mod backend;
mod client;
mod push;
mod wire;

pub use backend::{BackendError, PrimaryBackend, SecondaryBackend};
pub use client::{ClientStatsSnapshot, HttpClient, HttpClientConfig, HttpError, Response};
pub use push::{PushClient, PushError, PushStream};
pub use wire::{
    ConnectRequest, Fingerprint, NodeRef, PushMessage, RoutingTable, RpcAction, RpcRequest,
    RpcResponse, ServerEntry, StatusReport,
};
