//! Status Poller
//!
//! Keeps the [`StateStore`] in line with the backends:
//!
//! - **Primary**: `GET /status` once immediately, then every `status_interval`.
//!   A successful reply replaces the snapshot; a failure is logged and
//!   the snapshot is left alone until the next tick.
//! - **Secondary** (optional): catalog-bearing status query on its own
//!   interval. Its failures never touch the primary poll.
//!
//! The primary backend is authoritative for the connection state; the
//! secondary is only trusted for the country catalog.

use crate::backend::{CatalogApi, StatusApi};
use crate::catalog::ServerCatalog;
use crate::error::PollError;
use crate::state::{ApplyOutcome, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Poll periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub status_interval: Duration,
    pub catalog_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(5),
            catalog_interval: Duration::from_secs(5),
        }
    }
}

/// Background poll tasks; aborted on [`stop`](Self::stop) or drop
pub struct PollerHandle {
    status: JoinHandle<()>,
    catalog: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.status.abort();
        if let Some(ref catalog) = self.catalog {
            catalog.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.status.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reconciles backend status into the store
pub struct StatusPoller<S, C> {
    source: S,
    store: Arc<StateStore>,
    catalog: Arc<ServerCatalog<C>>,
    config: PollerConfig,
}

impl<S: StatusApi, C: CatalogApi> StatusPoller<S, C> {
    pub fn new(
        source: S,
        store: Arc<StateStore>,
        catalog: Arc<ServerCatalog<C>>,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            store,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<ServerCatalog<C>> {
        &self.catalog
    }

    /// One primary status query
    pub async fn poll_once(&self) -> Result<ApplyOutcome, PollError> {
        let request = self.store.begin_request();
        let report = self
            .source
            .fetch_status()
            .await
            .map_err(PollError::Status)?;

        debug!("{} status: running={}", request, report.running);
        Ok(self.store.apply(request, report))
    }

    /// One secondary catalog query
    pub async fn refresh_catalog(&self) -> Result<usize, PollError> {
        let (servers, running) = self.catalog.refresh().await?;

        if let Some(running) = running {
            let local = self.store.is_running();
            if running != local {
                debug!(
                    "Backends disagree on tunnel state (primary: {}, secondary: {}); keeping primary",
                    local, running
                );
            }
        }
        Ok(servers.len())
    }

    /// Start the background loops
    pub fn spawn(self: &Arc<Self>) -> PollerHandle {
        let poller = Arc::clone(self);
        let status = tokio::spawn(async move {
            let mut ticker = time::interval(poller.config.status_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = poller.poll_once().await {
                    warn!("{}", e);
                }
            }
        });

        let catalog = self.catalog.is_configured().then(|| {
            let poller = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = time::interval(poller.config.catalog_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(e) = poller.refresh_catalog().await {
                        warn!("{}", e);
                    }
                }
            })
        });

        PollerHandle { status, catalog }
    }
}
