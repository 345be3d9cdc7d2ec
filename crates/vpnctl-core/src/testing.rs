//! In-memory backend used by the unit tests.

use crate::backend::{ActionApi, CatalogApi, CatalogReport, StatusApi};
use crate::state::lock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vpnctl_net::{
    BackendError, Fingerprint, HttpError, NodeRef, RoutingTable, ServerEntry, StatusReport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(Option<String>),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Perform the action and report success
    Accept,
    /// Report `false` / `success: false`
    Reject,
    /// Fail at the transport level
    Unreachable,
    /// Report success without changing the tunnel
    AcceptNoop,
}

struct Remote {
    running: bool,
    country: Option<String>,
}

pub struct FakeBackend {
    remote: Mutex<Remote>,
    calls: Mutex<Vec<Call>>,
    connect_reply: Mutex<Reply>,
    disconnect_reply: Mutex<Reply>,
    action_delay: Mutex<Duration>,
    catalog_running: Mutex<Option<Option<bool>>>,
    status_calls: AtomicUsize,
    fail_status: AtomicBool,
    fail_catalog: AtomicBool,
}

impl FakeBackend {
    fn with_remote(running: bool, country: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(Remote {
                running,
                country: country.map(str::to_string),
            }),
            calls: Mutex::new(Vec::new()),
            connect_reply: Mutex::new(Reply::Accept),
            disconnect_reply: Mutex::new(Reply::Accept),
            action_delay: Mutex::new(Duration::ZERO),
            catalog_running: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            fail_status: AtomicBool::new(false),
            fail_catalog: AtomicBool::new(false),
        })
    }

    pub fn idle() -> Arc<Self> {
        Self::with_remote(false, None)
    }

    pub fn connected(country: &str) -> Arc<Self> {
        Self::with_remote(true, Some(country))
    }

    pub fn set_remote(&self, running: bool, country: &str) {
        let mut remote = lock(&self.remote);
        remote.running = running;
        remote.country = Some(country.to_string());
    }

    pub fn remote_running(&self) -> bool {
        lock(&self.remote).running
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn set_connect_reply(&self, reply: Reply) {
        *lock(&self.connect_reply) = reply;
    }

    pub fn set_disconnect_reply(&self, reply: Reply) {
        *lock(&self.disconnect_reply) = reply;
    }

    pub fn set_action_delay(&self, delay: Duration) {
        *lock(&self.action_delay) = delay;
    }

    pub fn set_catalog_running(&self, running: Option<bool>) {
        *lock(&self.catalog_running) = Some(running);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn fail_catalog(&self, fail: bool) {
        self.fail_catalog.store(fail, Ordering::SeqCst);
    }

    pub fn report(&self) -> StatusReport {
        let remote = lock(&self.remote);
        StatusReport {
            running: remote.running,
            fingerprint: Fingerprint { mtu: 1400 },
            port: 51820,
            routing_table: RoutingTable {
                vpn_network: "10.8.0.0/24".to_string(),
            },
            current_node: remote.country.as_deref().map(NodeRef::new),
            servers: Vec::new(),
        }
    }

    async fn act(&self, call: Call) -> Result<(), BackendError> {
        let delay = *lock(&self.action_delay);
        lock(&self.calls).push(call.clone());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = match call {
            Call::Connect(_) => *lock(&self.connect_reply),
            Call::Disconnect => *lock(&self.disconnect_reply),
        };
        match reply {
            Reply::Accept => {
                let mut remote = lock(&self.remote);
                match call {
                    Call::Connect(country) => {
                        remote.running = true;
                        remote.country = country.or_else(|| Some("US".to_string()));
                    }
                    Call::Disconnect => remote.running = false,
                }
                Ok(())
            }
            Reply::AcceptNoop => Ok(()),
            Reply::Reject => Err(BackendError::Rejected("backend reported failure".into())),
            Reply::Unreachable => Err(HttpError::ConnectionFailed("connection refused".into()).into()),
        }
    }
}

impl StatusApi for FakeBackend {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(HttpError::Timeout(Duration::from_secs(10)).into());
        }
        Ok(self.report())
    }
}

impl ActionApi for FakeBackend {
    async fn connect(&self, country: Option<&str>) -> Result<(), BackendError> {
        self.act(Call::Connect(country.map(str::to_string))).await
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        self.act(Call::Disconnect).await
    }
}

impl CatalogApi for FakeBackend {
    async fn fetch_catalog(&self) -> Result<CatalogReport, BackendError> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(HttpError::ConnectionFailed("secondary down".into()).into());
        }
        let reported = *lock(&self.catalog_running);
        let running = reported.unwrap_or_else(|| Some(self.remote_running()));
        Ok(CatalogReport {
            servers: ["US", "UK", "DE", "FR", "JP"]
                .into_iter()
                .map(ServerEntry::new)
                .collect(),
            running,
        })
    }
}
